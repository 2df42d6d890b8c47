use super::{ExpressionBuilder, priority};
use crate::{
    Shared, Value,
    ast::node::{Expr, Node, NodeId},
    compiler::{BuildContext, Executable},
    error::compile::CompileError,
};

/// Builds `?.` chains.
///
/// Claims a member access, call or index whose target spine reaches an
/// unbound [`Expr::NullConditional`]. The wrapped expression is evaluated
/// once; `null` ends the whole chain with `null`, anything else is stored in
/// a local slot that the wrapper node is bound to while the chain is rebuilt.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullConditionalBuilder;

fn find_wrapper<'n>(ctx: &BuildContext<'_>, node: &'n Node) -> Option<&'n Node> {
    let mut current = node.target()?;
    loop {
        match &**current {
            Expr::NullConditional { .. } if ctx.is_bound(current) => return None,
            Expr::NullConditional { .. } => return Some(current),
            _ => current = current.target()?,
        }
    }
}

impl ExpressionBuilder for NullConditionalBuilder {
    fn name(&self) -> &'static str {
        "null_conditional"
    }

    fn priority(&self) -> i32 {
        priority::NULL_CONDITIONAL
    }

    fn try_build(&self, ctx: &mut BuildContext<'_>, node: &Node) -> Result<Option<Executable>, CompileError> {
        match &**node {
            Expr::NullConditional { inner } => return ctx.build(inner).map(Some),
            Expr::Member { .. } | Expr::MethodCall { .. } | Expr::Index { .. } => {}
            _ => return Ok(None),
        }

        let Some(wrapper) = find_wrapper(ctx, node).map(Shared::clone) else {
            return Ok(None);
        };
        let Expr::NullConditional { inner } = &*wrapper else {
            return Ok(None);
        };

        let inner = ctx.build(inner)?;
        let slot = ctx.allocate_slot();
        let placeholder = Executable::new(inner.ty().underlying().clone(), false, move |frame| {
            Ok(frame.local(slot))
        });

        let chain = ctx.with_bindings([(NodeId::of(&wrapper), placeholder)], |ctx| ctx.build(node))?;

        Ok(Some(Executable::new(chain.ty().clone().nullable(), false, move |frame| {
            let value = inner.eval(frame)?;
            if value.is_null() {
                return Ok(Value::Null);
            }

            let locals = frame.extend_locals(slot, value);
            chain.eval(&frame.with_locals(&locals))
        })))
    }
}
