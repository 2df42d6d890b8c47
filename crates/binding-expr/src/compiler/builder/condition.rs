use super::{ExpressionBuilder, priority};
use crate::{
    Type, Value,
    ast::node::{Expr, Node},
    compiler::{BuildContext, Executable},
    error::{compile::CompileError, runtime::RuntimeError},
};

/// Builds `condition ? if_true : if_false`. Only the selected branch is
/// evaluated.
#[derive(Debug, Default, Clone, Copy)]
pub struct ConditionBuilder;

impl ExpressionBuilder for ConditionBuilder {
    fn name(&self) -> &'static str {
        "condition"
    }

    fn priority(&self) -> i32 {
        priority::CONDITION
    }

    fn try_build(&self, ctx: &mut BuildContext<'_>, node: &Node) -> Result<Option<Executable>, CompileError> {
        let Expr::Condition {
            condition,
            if_true,
            if_false,
        } = &**node
        else {
            return Ok(None);
        };

        let condition = ctx.build(condition)?;
        if !matches!(condition.ty(), Type::Bool | Type::Object) {
            return Err(CompileError::invalid_types("?:", [condition.ty().name()]));
        }

        let if_true = ctx.build(if_true)?;
        let if_false = ctx.build(if_false)?;
        let unified = if if_true.is_null_constant() {
            Some(if_false.ty().clone().nullable())
        } else if if_false.is_null_constant() {
            Some(if_true.ty().clone().nullable())
        } else {
            Type::unify(if_true.ty(), if_false.ty())
        };
        let ty = unified.ok_or_else(|| CompileError::invalid_types("?:", [if_true.ty().name(), if_false.ty().name()]))?;

        let if_true = if_true
            .convert(&ty)
            .ok_or_else(|| CompileError::invalid_types("?:", [ty.name()]))?;
        let if_false = if_false
            .convert(&ty)
            .ok_or_else(|| CompileError::invalid_types("?:", [ty.name()]))?;

        let closed = condition.is_closed() && if_true.is_closed() && if_false.is_closed();
        Ok(Some(Executable::new(ty, closed, move |frame| {
            match condition.eval(frame)? {
                Value::Bool(true) => if_true.eval(frame),
                Value::Bool(false) => if_false.eval(frame),
                v => Err(RuntimeError::invalid_types("?:", [v.type_name()])),
            }
        })))
    }
}
