//! `binding-expr` compiles immutable data-binding expression trees into cached,
//! thread-safe evaluators.
//!
//! The input tree ([`Node`]) is produced by an upstream parser. [`Compiler`]
//! walks it through an ordered chain of [`ExpressionBuilder`]s, folds closed
//! subtrees into constants, and stores the result in a cache keyed by the
//! structural [`Signature`] of the tree. Binding placeholders
//! ([`Expr::BindingMember`]) only contribute their index and path to that
//! signature, so trees that differ only in the instance they captured share a
//! single [`CompiledExpression`], and the cache never keeps those instances
//! alive.
//!
//! ## Examples
//!
//! ```rust
//! use binding_expr::{BinaryOp, Compiler, Expr, Metadata, Type, Value};
//!
//! let compiler = Compiler::default();
//! let node = Expr::binary(
//!     BinaryOp::Multiplication,
//!     Expr::binding_member(0, "Count", Type::Int),
//!     Expr::constant(10, Type::Int),
//! );
//!
//! let compiled = compiler.compile(&node, &Metadata::default()).unwrap();
//! let result = compiled.invoke(&[Value::Int(5)], &Metadata::default()).unwrap();
//!
//! assert_eq!(result, Value::Int(50));
//! ```
mod ast;
mod compiler;
mod convert;
mod error;
mod member;
mod metadata;
mod types;
mod value;

pub use ast::node::{BinaryOp, Expr, Node, NodeId, TypeArg, UnaryOp};
pub use ast::signature::Signature;
pub use compiler::builder::{
    BinaryBuilder, BinaryOperation, BindingMemberBuilder, ConditionBuilder, ConstantBuilder,
    ExpressionBuilder, LambdaBuilder, MemberBuilder, MethodCallBuilder, NullConditionalBuilder,
    UnaryBuilder, UnaryOperation, default_builders, priority,
};
pub use compiler::{
    BuildContext, CacheMode, CompiledExpression, Compiler, CompilerCache, Executable, Frame,
    Optimizer, Options,
};
pub use convert::{
    ConvertError, DefaultValueConverter, TypeRegistry, TypeResolver, ValueConverter,
};
pub use error::Error;
pub use error::compile::CompileError;
pub use error::runtime::RuntimeError;
pub use member::registry::{DelegateMethod, MemberRegistry, PropertyAccessor};
pub use member::{
    AccessorMember, Getter, INDEXER_GETTER_NAME, Member, MemberError, MemberFlags, MemberKind,
    MemberManager, MethodMember, ParameterInfo,
};
pub use metadata::{Metadata, MetadataKey, keys};
pub use types::{LambdaSignature, Type};
pub use value::{Function, HostObject, Value};

/// Reference-counted pointer used for every value shared between compiled
/// expressions and threads.
pub type Shared<T> = std::sync::Arc<T>;
