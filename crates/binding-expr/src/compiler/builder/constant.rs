use super::{ExpressionBuilder, priority};
use crate::{
    ast::node::{Expr, Node},
    compiler::{BuildContext, Executable},
    error::compile::CompileError,
};

/// Builds literals with their declared static type, so a `null` constant
/// declared `int?` stays `int?` for the operator builders.
#[derive(Debug, Default, Clone, Copy)]
pub struct ConstantBuilder;

impl ExpressionBuilder for ConstantBuilder {
    fn name(&self) -> &'static str {
        "constant"
    }

    fn priority(&self) -> i32 {
        priority::CONSTANT
    }

    fn try_build(&self, _ctx: &mut BuildContext<'_>, node: &Node) -> Result<Option<Executable>, CompileError> {
        match &**node {
            Expr::Constant { value, ty } => Ok(Some(Executable::constant(value.clone(), ty.clone()))),
            _ => Ok(None),
        }
    }
}
