//! Compiled expression artifact.

use std::fmt::{self, Debug, Formatter};

use super::{Executable, Frame};
use crate::{Metadata, Type, Value, ast::signature::Signature, error::runtime::RuntimeError};

/// Output of [`Compiler::compile`](super::Compiler::compile).
///
/// Owns the built executable tree and nothing else: no input nodes, no
/// compiler state. Invoking it is side-effect-free with respect to the
/// compiler and safe from any number of threads.
///
/// ## Example
///
/// ```rust
/// use binding_expr::{Compiler, Expr, Metadata, Type, Value};
///
/// let compiler = Compiler::default();
/// let node = Expr::member(Expr::binding_member(0, "Name", Type::String), "Length");
/// let compiled = compiler.compile(&node, &Metadata::default()).unwrap();
///
/// assert_eq!(compiled.result_type(), &Type::Int);
/// assert_eq!(compiled.invoke(&[Value::from("abc")], &Metadata::default()), Ok(Value::Int(3)));
/// ```
pub struct CompiledExpression {
    root: Executable,
    builders: Vec<&'static str>,
    signature: Signature,
}

impl CompiledExpression {
    pub(crate) fn new(root: Executable, builders: Vec<&'static str>, signature: Signature) -> Self {
        Self {
            root,
            builders,
            signature,
        }
    }

    /// Evaluates the expression. `args[i]` supplies the value of the binding
    /// member with index `i`.
    pub fn invoke(&self, args: &[Value], metadata: &Metadata) -> Result<Value, RuntimeError> {
        self.root.eval(&Frame::new(args, metadata))
    }

    pub fn result_type(&self) -> &Type {
        self.root.ty()
    }

    /// Names of the builders that claimed at least one node.
    pub fn builders(&self) -> &[&'static str] {
        &self.builders
    }

    pub fn is_constant(&self) -> bool {
        self.root.is_constant()
    }

    pub fn signature(&self) -> &Signature {
        &self.signature
    }
}

impl Debug for CompiledExpression {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompiledExpression")
            .field("root", &self.root)
            .field("builders", &self.builders)
            .field("signature", &self.signature)
            .finish()
    }
}
