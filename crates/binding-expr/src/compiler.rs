//! Builder-chain compiler for binding expressions.
//!
//! A [`Compiler`] turns an [`Expr`](crate::Expr) tree into an [`Executable`]
//! tree by handing every node to its registered [`ExpressionBuilder`]s in
//! priority order. The first builder that claims a node produces its
//! executable, recursing into children through [`BuildContext::build`].
//!
//! ## Design
//!
//! Each executable is either a constant or a shared closure over a [`Frame`]
//! (invocation arguments, invocation metadata and lambda locals). Closures
//! capture the executables of their children, so the finished tree has no
//! reference back to the input nodes or to the compiler.
//!
//! The [`Optimizer`] runs before every other builder. It builds the node
//! through the rest of the chain and, when the result has no free variables,
//! evaluates it once and keeps the value.
//!
//! Whole compilations are cached by [`Signature`](crate::Signature) in a
//! [`CompilerCache`].
//!
//! [`ExpressionBuilder`]: builder::ExpressionBuilder

pub mod builder;
mod cache;
mod compile;
mod compiled;
mod context;
mod executable;
mod ops;
mod optimizer;
#[cfg(test)]
mod test_compiler;

pub use cache::{CacheMode, CompilerCache};
pub use compile::{Compiler, Options};
pub use compiled::CompiledExpression;
pub use context::BuildContext;
pub use executable::{Executable, Frame};
pub use optimizer::Optimizer;
