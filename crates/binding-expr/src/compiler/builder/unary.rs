use rustc_hash::FxHashMap;

use super::{ExpressionBuilder, priority};
use crate::{
    Type,
    ast::node::{Expr, Node, UnaryOp},
    compiler::{BuildContext, Executable, ops},
    error::compile::CompileError,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnaryOperation {
    Negate,
    UnaryPlus,
    Not,
    OnesComplement,
}

impl UnaryOperation {
    fn accepts(&self, ty: &Type) -> bool {
        match self {
            UnaryOperation::Negate | UnaryOperation::UnaryPlus => ty.is_numeric(),
            UnaryOperation::Not => ty == &Type::Bool,
            UnaryOperation::OnesComplement => ty.is_integral(),
        }
    }
}

/// Builds unary operators whose op appears in the mapping table.
#[derive(Debug, Clone)]
pub struct UnaryBuilder {
    mapping: FxHashMap<UnaryOp, UnaryOperation>,
}

impl Default for UnaryBuilder {
    fn default() -> Self {
        Self {
            mapping: [
                (UnaryOp::Minus, UnaryOperation::Negate),
                (UnaryOp::Plus, UnaryOperation::UnaryPlus),
                (UnaryOp::LogicalNegation, UnaryOperation::Not),
                (UnaryOp::BitwiseNegation, UnaryOperation::OnesComplement),
            ]
            .into_iter()
            .collect(),
        }
    }
}

impl UnaryBuilder {
    pub fn mapping(&self) -> &FxHashMap<UnaryOp, UnaryOperation> {
        &self.mapping
    }

    pub fn mapping_mut(&mut self) -> &mut FxHashMap<UnaryOp, UnaryOperation> {
        &mut self.mapping
    }
}

impl ExpressionBuilder for UnaryBuilder {
    fn name(&self) -> &'static str {
        "unary"
    }

    fn priority(&self) -> i32 {
        priority::UNARY
    }

    fn try_build(&self, ctx: &mut BuildContext<'_>, node: &Node) -> Result<Option<Executable>, CompileError> {
        let Expr::Unary { op, operand } = &**node else {
            return Ok(None);
        };
        let Some(operation) = self.mapping.get(op) else {
            return Ok(None);
        };

        let operand = ctx.build(operand)?;
        let ty = operand.ty().clone();

        if !ty.is_dynamic() && !operation.accepts(ty.underlying()) {
            return Err(CompileError::invalid_types(op.to_string(), [ty.name()]));
        }

        let op = *op;
        let closed = operand.is_closed();
        Ok(Some(Executable::new(ty, closed, move |frame| {
            ops::unary(op, &operand.eval(frame)?)
        })))
    }
}
