use std::fmt::{self, Debug, Display, Formatter, Write};

use crate::{Metadata, Shared, Type, Value, ast::node::Expr, keys};

use super::node::{Node, TypeArg};

/// Structural cache key of an expression tree.
///
/// Two trees have equal signatures when they are structurally equal, with
/// one exception: binding members contribute only their index, path and
/// type, never the instance they captured. Object-like constants are keyed by
/// identity.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Signature(Shared<str>);

impl Signature {
    pub fn of(node: &Node) -> Self {
        let mut buf = String::with_capacity(64);
        write_node(&mut buf, node);
        Signature(Shared::from(buf))
    }

    /// Signature of `node` compiled under `metadata`. Only metadata that
    /// changes what the builders produce takes part in the key.
    pub fn with_metadata(node: &Node, metadata: &Metadata) -> Self {
        let mut buf = String::with_capacity(64);
        write_node(&mut buf, node);
        if let Some(signature) = metadata.get(&keys::LAMBDA_SIGNATURE) {
            let _ = write!(buf, "|lambda:{}", Type::Function(Shared::clone(signature)));
        }
        Signature(Shared::from(buf))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for Signature {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Debug for Signature {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "Signature({})", self.0)
    }
}

fn write_value(buf: &mut String, value: &Value) {
    let _ = match value {
        Value::Null => write!(buf, "null"),
        Value::Bool(b) => write!(buf, "{}", b),
        Value::Int(n) => write!(buf, "{}", n),
        Value::Single(n) => write!(buf, "f{:x}", n.to_bits()),
        Value::Double(n) => write!(buf, "d{:x}", n.to_bits()),
        Value::Decimal(n) => write!(buf, "{}m", n),
        Value::BigInt(n) => write!(buf, "{}n", n),
        Value::String(s) => write!(buf, "{:?}", s.as_str()),
        Value::Array(items) => write!(buf, "[]@{:p}", Shared::as_ptr(items)),
        Value::Object(o) => write!(buf, "{}@{:x}", o.class(), o.address()),
        Value::Type(t) => write!(buf, "typeof({})", t),
        Value::Function(f) => write!(buf, "{:?}@{:x}", f, f.address()),
        Value::Metadata(m) => write!(buf, "{:?}", m),
    };
}

fn write_children(buf: &mut String, nodes: &[Node]) {
    for (i, node) in nodes.iter().enumerate() {
        if i > 0 {
            buf.push(',');
        }
        write_node(buf, node);
    }
}

fn write_node(buf: &mut String, node: &Node) {
    match &**node {
        Expr::Constant { value, ty } => {
            let _ = write!(buf, "C<{}>(", ty);
            write_value(buf, value);
            buf.push(')');
        }
        Expr::Parameter { name, ty } => {
            let _ = match ty {
                Some(ty) => write!(buf, "P({}:{})", name, ty),
                None => write!(buf, "P({})", name),
            };
        }
        Expr::Member { target, name } => {
            buf.push_str("M(");
            write_node(buf, target);
            let _ = write!(buf, ".{})", name);
        }
        Expr::Unary { op, operand } => {
            let _ = write!(buf, "U{}(", op);
            write_node(buf, operand);
            buf.push(')');
        }
        Expr::Binary { op, left, right } => {
            let _ = write!(buf, "B{}(", op);
            write_node(buf, left);
            buf.push(',');
            write_node(buf, right);
            buf.push(')');
        }
        Expr::Condition {
            condition,
            if_true,
            if_false,
        } => {
            buf.push_str("Q(");
            write_children(buf, &[condition.clone(), if_true.clone(), if_false.clone()]);
            buf.push(')');
        }
        Expr::MethodCall {
            target,
            name,
            args,
            type_args,
        } => {
            buf.push_str("CALL(");
            write_node(buf, target);
            let _ = write!(buf, ".{}", name);
            if !type_args.is_empty() {
                buf.push('<');
                for (i, arg) in type_args.iter().enumerate() {
                    if i > 0 {
                        buf.push(',');
                    }
                    let _ = match arg {
                        TypeArg::Type(ty) => write!(buf, "{}", ty),
                        TypeArg::Name(name) => write!(buf, "'{}", name),
                    };
                }
                buf.push('>');
            }
            buf.push('(');
            write_children(buf, args);
            buf.push_str("))");
        }
        Expr::Index { target, args } => {
            buf.push_str("IDX(");
            write_node(buf, target);
            buf.push('[');
            write_children(buf, args);
            buf.push_str("])");
        }
        Expr::Lambda { body, parameters } => {
            buf.push_str("L(");
            write_children(buf, parameters);
            buf.push_str("=>");
            write_node(buf, body);
            buf.push(')');
        }
        Expr::NullConditional { inner } => {
            buf.push_str("NC(");
            write_node(buf, inner);
            buf.push(')');
        }
        Expr::BindingMember { index, path, ty, .. } => {
            let _ = write!(buf, "BM({}:{:?}:{})", index, path.as_str(), ty);
        }
    }
}
