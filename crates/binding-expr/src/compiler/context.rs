use rustc_hash::FxHashSet;
use smallvec::SmallVec;
use tracing::trace;

use super::{Compiler, Executable, Options};
use crate::{
    Metadata, Shared, Type, Value,
    ast::node::{Node, NodeId},
    convert::{TypeResolver, ValueConverter},
    error::compile::CompileError,
    member::MemberManager,
};

/// Default maximum node nesting depth of a compilation.
///
/// Each level costs several builder frames, so this is sized for a 2 MiB
/// thread stack in unoptimized builds. Raise it through
/// [`Options::max_build_depth`] only together with a larger stack.
pub const DEFAULT_MAX_BUILD_DEPTH: u32 = 128;

/// Scratch state of a single compilation.
///
/// Holds the node→executable bindings used by lambdas and null-conditional
/// chains, the compile-time metadata, the slot allocator for locals and the
/// optimizer's in-flight set. Dropped when the compilation finishes.
pub struct BuildContext<'a> {
    compiler: &'a Compiler,
    metadata: Metadata,
    bindings: Vec<(NodeId, Executable)>,
    in_flight: FxHashSet<NodeId>,
    next_slot: usize,
    depth: u32,
    contributors: SmallVec<[&'static str; 8]>,
}

impl<'a> BuildContext<'a> {
    pub(crate) fn new(compiler: &'a Compiler, metadata: Metadata) -> Self {
        Self {
            compiler,
            metadata,
            bindings: Vec::new(),
            in_flight: FxHashSet::default(),
            next_slot: 0,
            depth: 0,
            contributors: SmallVec::new(),
        }
    }

    /// Builds `node`, failing with [`CompileError::Unsupported`] when no
    /// builder claims it.
    pub fn build(&mut self, node: &Node) -> Result<Executable, CompileError> {
        self.try_build(node)?
            .ok_or_else(|| CompileError::Unsupported(node.to_string()))
    }

    /// Returns the bound executable for `node` if there is one, otherwise the
    /// result of the first builder that claims it.
    pub fn try_build(&mut self, node: &Node) -> Result<Option<Executable>, CompileError> {
        if let Some(bound) = self.bound_expression(node) {
            return Ok(Some(bound));
        }

        // The optimizer rebuilds the node it is folding; that is not a new level.
        if self.in_flight.contains(&NodeId::of(node)) {
            return self.run_builders(node);
        }

        let max_depth = self.compiler.options().max_build_depth;
        if self.depth >= max_depth {
            return Err(CompileError::RecursionError(max_depth));
        }

        self.depth += 1;
        let result = self.run_builders(node);
        self.depth -= 1;
        result
    }

    fn run_builders(&mut self, node: &Node) -> Result<Option<Executable>, CompileError> {
        let compiler = self.compiler;

        for builder in compiler.builders() {
            if let Some(expr) = builder.try_build(self, node)? {
                trace!(builder = builder.name(), kind = node.kind(), ty = %expr.ty(), "Node claimed");
                if !self.contributors.contains(&builder.name()) {
                    self.contributors.push(builder.name());
                }
                return Ok(Some(expr));
            }
        }

        Ok(None)
    }

    /// Binds `node` to `expr` until [`BuildContext::clear_expression`].
    pub fn set_expression(&mut self, node: &Node, expr: Executable) {
        self.bindings.push((NodeId::of(node), expr));
    }

    pub fn clear_expression(&mut self, node: &Node) {
        let id = NodeId::of(node);
        if let Some(pos) = self.bindings.iter().rposition(|(bound, _)| *bound == id) {
            self.bindings.remove(pos);
        }
    }

    pub fn bound_expression(&self, node: &Node) -> Option<Executable> {
        let id = NodeId::of(node);
        self.bindings
            .iter()
            .rev()
            .find(|(bound, _)| *bound == id)
            .map(|(_, expr)| expr.clone())
    }

    pub fn is_bound(&self, node: &Node) -> bool {
        let id = NodeId::of(node);
        self.bindings.iter().any(|(bound, _)| *bound == id)
    }

    /// Runs `f` with `bindings` in scope. The scope is popped even when `f`
    /// fails.
    pub fn with_bindings<R>(
        &mut self,
        bindings: impl IntoIterator<Item = (NodeId, Executable)>,
        f: impl FnOnce(&mut Self) -> R,
    ) -> R {
        let mark = self.bindings.len();
        self.bindings.extend(bindings);
        let result = f(self);
        self.bindings.truncate(mark);
        result
    }

    /// Runs `f` with `metadata` as the compile-time metadata.
    pub fn with_metadata<R>(&mut self, metadata: Metadata, f: impl FnOnce(&mut Self) -> R) -> R {
        let previous = std::mem::replace(&mut self.metadata, metadata);
        let result = f(self);
        self.metadata = previous;
        result
    }

    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    /// Reserves a local slot for a lambda parameter or a null-conditional
    /// value.
    pub fn allocate_slot(&mut self) -> usize {
        let slot = self.next_slot;
        self.next_slot += 1;
        slot
    }

    /// Placeholder that evaluates to the invocation metadata.
    pub fn metadata_expression(&self) -> Executable {
        Executable::new(Type::Metadata, false, |frame| {
            Ok(Value::Metadata(frame.metadata().clone()))
        })
    }

    /// Marks `node` as being built by the optimizer. Returns `false` if it
    /// already is.
    pub(crate) fn enter(&mut self, node: &Node) -> bool {
        self.in_flight.insert(NodeId::of(node))
    }

    pub(crate) fn exit(&mut self, node: &Node) {
        self.in_flight.remove(&NodeId::of(node));
    }

    pub fn member_manager(&self) -> &'a Shared<dyn MemberManager> {
        self.compiler.member_manager()
    }

    pub fn type_resolver(&self) -> &'a Shared<dyn TypeResolver> {
        self.compiler.type_resolver()
    }

    pub fn value_converter(&self) -> &'a Shared<dyn ValueConverter> {
        self.compiler.value_converter()
    }

    pub fn options(&self) -> &'a Options {
        self.compiler.options()
    }

    pub(crate) fn into_contributors(self) -> Vec<&'static str> {
        self.contributors.into_vec()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{BinaryOp, Expr, compiler::Frame};
    use rstest::rstest;

    fn nested(levels: usize) -> Node {
        (1..levels).fold(Expr::binding_member(0, "A", Type::Int), |acc, _| {
            Expr::binary(BinaryOp::Addition, acc, Expr::binding_member(0, "A", Type::Int))
        })
    }

    #[test]
    fn test_bindings_are_scoped() {
        let compiler = Compiler::default();
        let mut ctx = compiler.context(&Metadata::default());
        let node = Expr::parameter("x", None);
        let one = Executable::constant(Value::Int(1), Type::Int);
        let two = Executable::constant(Value::Int(2), Type::Int);

        ctx.set_expression(&node, one);
        ctx.with_bindings([(NodeId::of(&node), two)], |ctx| {
            assert_eq!(ctx.bound_expression(&node).and_then(|e| e.as_constant().cloned()), Some(Value::Int(2)));
        });

        assert_eq!(ctx.bound_expression(&node).and_then(|e| e.as_constant().cloned()), Some(Value::Int(1)));
        ctx.clear_expression(&node);
        assert!(!ctx.is_bound(&node));
    }

    #[test]
    fn test_with_metadata_restores() {
        const KEY: crate::MetadataKey<i32> = crate::MetadataKey::new("key");

        let compiler = Compiler::default();
        let mut ctx = compiler.context(&Metadata::default());

        ctx.with_metadata(Metadata::new().with(&KEY, 1), |ctx| {
            assert_eq!(ctx.metadata().get(&KEY), Some(&1));
        });
        assert!(!ctx.metadata().contains(&KEY));
    }

    #[test]
    fn test_metadata_expression() {
        let compiler = Compiler::default();
        let ctx = compiler.context(&Metadata::default());
        let metadata = Metadata::default();
        let expr = ctx.metadata_expression();

        assert!(!expr.is_closed());
        assert_eq!(expr.eval(&Frame::new(&[], &metadata)), Ok(Value::Metadata(metadata.clone())));
    }

    #[test]
    fn test_unsupported_node() {
        let compiler = Compiler::default();
        let mut ctx = compiler.context(&Metadata::default());

        assert_eq!(
            ctx.build(&Expr::parameter("x", None)).err(),
            Some(CompileError::Unsupported("x".to_string()))
        );
    }

    #[rstest]
    #[case::at_limit(16, true)]
    #[case::over_limit(17, false)]
    fn test_depth_counts_each_node_once(#[case] levels: usize, #[case] ok: bool) {
        let mut compiler = Compiler::default();
        compiler.set_options(Options {
            max_build_depth: 16,
            ..Options::default()
        });

        let result = compiler.compile(&nested(levels), &Metadata::default());

        if ok {
            assert_eq!(result.unwrap().invoke(&[Value::Int(1)], &Metadata::default()), Ok(Value::Int(levels as i32)));
        } else {
            assert_eq!(result.err(), Some(CompileError::RecursionError(16)));
        }
    }

    #[test]
    fn test_deep_tree_fails_instead_of_overflowing() {
        let compiler = Compiler::default();

        assert_eq!(
            compiler.compile(&nested(400), &Metadata::default()).err(),
            Some(CompileError::RecursionError(DEFAULT_MAX_BUILD_DEPTH))
        );
        assert!(compiler.compile(&nested(100), &Metadata::default()).is_ok());
    }
}
