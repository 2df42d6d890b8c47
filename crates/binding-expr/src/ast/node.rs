use std::fmt::{self, Display, Formatter};

use itertools::Itertools;
use smallvec::SmallVec;
use smol_str::SmolStr;

use crate::{Shared, Type, Value};

/// Shared handle to an immutable expression node.
pub type Node = Shared<Expr>;
pub type Args = SmallVec<[Node; 4]>;

/// Identity of a node instance. Used for memoization while building; never
/// stored beyond a single compilation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(usize);

impl NodeId {
    pub fn of(node: &Node) -> Self {
        NodeId(Shared::as_ptr(node) as usize)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnaryOp {
    Minus,
    Plus,
    LogicalNegation,
    BitwiseNegation,
}

impl Display for UnaryOp {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let op = match self {
            UnaryOp::Minus => "-",
            UnaryOp::Plus => "+",
            UnaryOp::LogicalNegation => "!",
            UnaryOp::BitwiseNegation => "~",
        };
        write!(f, "{}", op)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    Multiplication,
    Division,
    Remainder,
    Addition,
    Subtraction,
    LeftShift,
    RightShift,
    LessThan,
    GreaterThan,
    LessThanOrEqual,
    GreaterThanOrEqual,
    Equality,
    NotEqual,
    LogicalAnd,
    ExclusiveOr,
    LogicalOr,
    ConditionalAnd,
    ConditionalOr,
    NullCoalescing,
}

impl BinaryOp {
    pub fn symbol(&self) -> &'static str {
        match self {
            BinaryOp::Multiplication => "*",
            BinaryOp::Division => "/",
            BinaryOp::Remainder => "%",
            BinaryOp::Addition => "+",
            BinaryOp::Subtraction => "-",
            BinaryOp::LeftShift => "<<",
            BinaryOp::RightShift => ">>",
            BinaryOp::LessThan => "<",
            BinaryOp::GreaterThan => ">",
            BinaryOp::LessThanOrEqual => "<=",
            BinaryOp::GreaterThanOrEqual => ">=",
            BinaryOp::Equality => "==",
            BinaryOp::NotEqual => "!=",
            BinaryOp::LogicalAnd => "&",
            BinaryOp::ExclusiveOr => "^",
            BinaryOp::LogicalOr => "|",
            BinaryOp::ConditionalAnd => "&&",
            BinaryOp::ConditionalOr => "||",
            BinaryOp::NullCoalescing => "??",
        }
    }
}

impl Display for BinaryOp {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.symbol())
    }
}

/// Explicit generic type argument of a method call.
#[derive(Debug, Clone, PartialEq)]
pub enum TypeArg {
    Type(Type),
    /// Resolved through the compiler's type resolver.
    Name(SmolStr),
}

impl Display for TypeArg {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            TypeArg::Type(ty) => write!(f, "{}", ty),
            TypeArg::Name(name) => write!(f, "{}", name),
        }
    }
}

/// Expression tree produced by the binding parser.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Constant {
        value: Value,
        ty: Type,
    },
    /// Lambda parameter reference.
    Parameter {
        name: SmolStr,
        ty: Option<Type>,
    },
    Member {
        target: Node,
        name: SmolStr,
    },
    Unary {
        op: UnaryOp,
        operand: Node,
    },
    Binary {
        op: BinaryOp,
        left: Node,
        right: Node,
    },
    Condition {
        condition: Node,
        if_true: Node,
        if_false: Node,
    },
    MethodCall {
        target: Node,
        name: SmolStr,
        args: Args,
        type_args: Vec<TypeArg>,
    },
    Index {
        target: Node,
        args: Args,
    },
    Lambda {
        body: Node,
        parameters: Vec<Node>,
    },
    /// Marks `inner` as the start of a `?.` chain.
    NullConditional {
        inner: Node,
    },
    /// Placeholder for a source-bound value. `instance` is the value the parser
    /// observed; compiled code reads `args[index]` instead.
    BindingMember {
        index: usize,
        path: SmolStr,
        ty: Type,
        instance: Option<Value>,
    },
}

impl Expr {
    pub fn constant(value: impl Into<Value>, ty: Type) -> Node {
        Shared::new(Expr::Constant {
            value: value.into(),
            ty,
        })
    }

    pub fn null(ty: Type) -> Node {
        Self::constant(Value::Null, ty)
    }

    pub fn parameter(name: impl Into<SmolStr>, ty: Option<Type>) -> Node {
        Shared::new(Expr::Parameter {
            name: name.into(),
            ty,
        })
    }

    pub fn member(target: Node, name: impl Into<SmolStr>) -> Node {
        Shared::new(Expr::Member {
            target,
            name: name.into(),
        })
    }

    pub fn unary(op: UnaryOp, operand: Node) -> Node {
        Shared::new(Expr::Unary { op, operand })
    }

    pub fn binary(op: BinaryOp, left: Node, right: Node) -> Node {
        Shared::new(Expr::Binary { op, left, right })
    }

    pub fn condition(condition: Node, if_true: Node, if_false: Node) -> Node {
        Shared::new(Expr::Condition {
            condition,
            if_true,
            if_false,
        })
    }

    pub fn method_call(target: Node, name: impl Into<SmolStr>, args: impl IntoIterator<Item = Node>) -> Node {
        Self::generic_method_call(target, name, args, Vec::new())
    }

    pub fn generic_method_call(
        target: Node,
        name: impl Into<SmolStr>,
        args: impl IntoIterator<Item = Node>,
        type_args: Vec<TypeArg>,
    ) -> Node {
        Shared::new(Expr::MethodCall {
            target,
            name: name.into(),
            args: args.into_iter().collect(),
            type_args,
        })
    }

    pub fn index(target: Node, args: impl IntoIterator<Item = Node>) -> Node {
        Shared::new(Expr::Index {
            target,
            args: args.into_iter().collect(),
        })
    }

    pub fn lambda(parameters: Vec<Node>, body: Node) -> Node {
        Shared::new(Expr::Lambda { body, parameters })
    }

    pub fn null_conditional(inner: Node) -> Node {
        Shared::new(Expr::NullConditional { inner })
    }

    pub fn binding_member(index: usize, path: impl Into<SmolStr>, ty: Type) -> Node {
        Shared::new(Expr::BindingMember {
            index,
            path: path.into(),
            ty,
            instance: None,
        })
    }

    /// A binding member that also carries the instance seen at parse time.
    pub fn bound_member(index: usize, path: impl Into<SmolStr>, ty: Type, instance: Value) -> Node {
        Shared::new(Expr::BindingMember {
            index,
            path: path.into(),
            ty,
            instance: Some(instance),
        })
    }

    /// Target of a member access, method call or index; `None` for other
    /// nodes.
    pub fn target(&self) -> Option<&Node> {
        match self {
            Expr::Member { target, .. } | Expr::MethodCall { target, .. } | Expr::Index { target, .. } => {
                Some(target)
            }
            _ => None,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Expr::Constant { .. } => "constant",
            Expr::Parameter { .. } => "parameter",
            Expr::Member { .. } => "member",
            Expr::Unary { .. } => "unary",
            Expr::Binary { .. } => "binary",
            Expr::Condition { .. } => "condition",
            Expr::MethodCall { .. } => "method_call",
            Expr::Index { .. } => "index",
            Expr::Lambda { .. } => "lambda",
            Expr::NullConditional { .. } => "null_conditional",
            Expr::BindingMember { .. } => "binding_member",
        }
    }
}

impl Display for Expr {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Constant { value: Value::String(s), .. } => write!(f, "{:?}", s.as_str()),
            Expr::Constant { value: Value::Null, .. } => write!(f, "null"),
            Expr::Constant { value, .. } => write!(f, "{}", value),
            Expr::Parameter { name, .. } => write!(f, "{}", name),
            Expr::Member { target, name } => write!(f, "{}.{}", target, name),
            Expr::Unary { op, operand } => write!(f, "{}{}", op, operand),
            Expr::Binary { op, left, right } => write!(f, "({} {} {})", left, op, right),
            Expr::Condition {
                condition,
                if_true,
                if_false,
            } => write!(f, "({} ? {} : {})", condition, if_true, if_false),
            Expr::MethodCall {
                target,
                name,
                args,
                type_args,
            } => {
                write!(f, "{}.{}", target, name)?;
                if !type_args.is_empty() {
                    write!(f, "<{}>", type_args.iter().join(", "))?;
                }
                write!(f, "({})", args.iter().join(", "))
            }
            Expr::Index { target, args } => write!(f, "{}[{}]", target, args.iter().join(", ")),
            Expr::Lambda { body, parameters } => {
                write!(f, "({}) => {}", parameters.iter().join(", "), body)
            }
            Expr::NullConditional { inner } => write!(f, "{}?", inner),
            Expr::BindingMember { path, .. } => write!(f, "{}", path),
        }
    }
}
