use tracing::debug;

use super::{BuildContext, Executable, Frame, builder::{ExpressionBuilder, priority}};
use crate::{Metadata, ast::node::{Expr, Node}, error::compile::CompileError};

/// Constant folding for closed subtrees.
///
/// Runs before every other builder: it builds the node through the rest of
/// the chain and, when the result has no free variables, evaluates it once.
/// The node is marked in flight while it is being built so the nested build
/// skips the optimizer instead of recursing into it.
#[derive(Debug, Default, Clone, Copy)]
pub struct Optimizer;

impl ExpressionBuilder for Optimizer {
    fn name(&self) -> &'static str {
        "optimizer"
    }

    fn priority(&self) -> i32 {
        priority::OPTIMIZER
    }

    fn try_build(&self, ctx: &mut BuildContext<'_>, node: &Node) -> Result<Option<Executable>, CompileError> {
        if !ctx.options().optimize || matches!(&**node, Expr::Constant { .. }) {
            return Ok(None);
        }

        if !ctx.enter(node) {
            return Ok(None);
        }
        let built = ctx.try_build(node);
        ctx.exit(node);

        let Some(expr) = built? else {
            return Ok(None);
        };

        if expr.is_constant() || !expr.is_closed() {
            return Ok(Some(expr));
        }

        let metadata = Metadata::default();
        match expr.eval(&Frame::new(&[], &metadata)) {
            Ok(value) => {
                debug!(node = %node, value = ?value, "Folded constant expression");
                Ok(Some(Executable::constant(value, expr.ty().clone())))
            }
            Err(e) => {
                debug!(node = %node, error = %e, "Constant folding failed, expression left unfolded");
                Ok(Some(expr))
            }
        }
    }
}
