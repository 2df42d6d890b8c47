//! Expression builders.
//!
//! Each builder claims one family of nodes. [`BuildContext::build`] hands a
//! node to the builders in descending [`ExpressionBuilder::priority`] order;
//! the first one that returns `Some` wins.

use std::fmt::Debug;

use super::{BuildContext, Executable, Optimizer};
use crate::{Shared, ast::node::Node, error::compile::CompileError};

mod binary;
mod binding_member;
mod condition;
mod constant;
mod lambda;
mod member;
mod method_call;
mod null_conditional;
mod unary;

pub use binary::{BinaryBuilder, BinaryOperation};
pub use binding_member::BindingMemberBuilder;
pub use condition::ConditionBuilder;
pub use constant::ConstantBuilder;
pub use lambda::LambdaBuilder;
pub use member::MemberBuilder;
pub use method_call::MethodCallBuilder;
pub use null_conditional::NullConditionalBuilder;
pub use unary::{UnaryBuilder, UnaryOperation};

/// Priorities of the default builders. Higher runs first.
pub mod priority {
    pub const OPTIMIZER: i32 = 1000;
    pub const NULL_CONDITIONAL: i32 = 100;
    pub const LAMBDA: i32 = 90;
    pub const BINDING_MEMBER: i32 = 80;
    pub const CONSTANT: i32 = 70;
    pub const CONDITION: i32 = 60;
    pub const UNARY: i32 = 50;
    pub const BINARY: i32 = 40;
    pub const METHOD_CALL: i32 = 30;
    pub const MEMBER: i32 = 20;
}

/// Strategy that builds one family of nodes.
///
/// Builders must not mutate nodes and must leave the context as they found it
/// when they decline or fail.
pub trait ExpressionBuilder: Send + Sync + Debug {
    fn name(&self) -> &'static str;

    fn priority(&self) -> i32;

    /// Returns `Ok(None)` to let the next builder try `node`.
    fn try_build(&self, ctx: &mut BuildContext<'_>, node: &Node) -> Result<Option<Executable>, CompileError>;
}

/// The optimizer followed by one builder per node kind.
pub fn default_builders() -> Vec<Shared<dyn ExpressionBuilder>> {
    vec![
        Shared::new(Optimizer),
        Shared::new(NullConditionalBuilder),
        Shared::new(LambdaBuilder),
        Shared::new(BindingMemberBuilder),
        Shared::new(ConstantBuilder),
        Shared::new(ConditionBuilder),
        Shared::new(UnaryBuilder::default()),
        Shared::new(BinaryBuilder::default()),
        Shared::new(MethodCallBuilder),
        Shared::new(MemberBuilder),
    ]
}
