//! Orchestration of builders, collaborators and the cache.

use std::cmp::Reverse;

use tracing::debug;

use super::{
    BuildContext, CacheMode, CompiledExpression, CompilerCache,
    builder::{ExpressionBuilder, default_builders},
    context::DEFAULT_MAX_BUILD_DEPTH,
};
use crate::{
    Metadata, Shared, Value,
    ast::{node::Node, signature::Signature},
    convert::{DefaultValueConverter, TypeRegistry, TypeResolver, ValueConverter},
    error::{Error, compile::CompileError},
    member::{MemberManager, registry::MemberRegistry},
};

/// Compiler configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Options {
    /// Fold closed subtrees into constants.
    pub optimize: bool,
    pub cache: CacheMode,
    /// Fail at build time instead of falling back to late-bound member
    /// resolution when a statically typed target has no such member.
    pub strict_members: bool,
    pub max_build_depth: u32,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            optimize: true,
            cache: CacheMode::default(),
            strict_members: false,
            max_build_depth: DEFAULT_MAX_BUILD_DEPTH,
        }
    }
}

/// Compiles expression trees through a priority-ordered chain of
/// [`ExpressionBuilder`]s and caches the results.
///
/// `Compiler` is `Send + Sync`; share it behind an `Arc` to compile from
/// several threads. Configuration setters take `&mut self` and clear the
/// cache, since cached results depend on the configuration.
#[derive(Debug)]
pub struct Compiler {
    builders: Vec<Shared<dyn ExpressionBuilder>>,
    member_manager: Shared<dyn MemberManager>,
    type_resolver: Shared<dyn TypeResolver>,
    value_converter: Shared<dyn ValueConverter>,
    cache: CompilerCache,
    options: Options,
}

impl Default for Compiler {
    fn default() -> Self {
        Self::new()
    }
}

impl Compiler {
    /// A compiler with the default builders, the built-in member registry,
    /// the primitive type registry and the default value converter.
    pub fn new() -> Self {
        Self::with_builders(default_builders())
    }

    pub fn with_builders(builders: impl IntoIterator<Item = Shared<dyn ExpressionBuilder>>) -> Self {
        let mut compiler = Self {
            builders: builders.into_iter().collect(),
            member_manager: Shared::new(MemberRegistry::with_builtins()),
            type_resolver: Shared::new(TypeRegistry::new()),
            value_converter: Shared::new(DefaultValueConverter),
            cache: CompilerCache::new(),
            options: Options::default(),
        };
        compiler.sort_builders();
        compiler
    }

    fn sort_builders(&mut self) {
        // Stable: equal priorities keep registration order.
        self.builders.sort_by_key(|builder| Reverse(builder.priority()));
    }

    pub fn add_builder(&mut self, builder: Shared<dyn ExpressionBuilder>) {
        self.builders.push(builder);
        self.sort_builders();
        self.cache.clear();
    }

    pub fn set_member_manager(&mut self, member_manager: Shared<dyn MemberManager>) {
        self.member_manager = member_manager;
        self.cache.clear();
    }

    pub fn set_type_resolver(&mut self, type_resolver: Shared<dyn TypeResolver>) {
        self.type_resolver = type_resolver;
        self.cache.clear();
    }

    pub fn set_value_converter(&mut self, value_converter: Shared<dyn ValueConverter>) {
        self.value_converter = value_converter;
        self.cache.clear();
    }

    pub fn set_options(&mut self, options: Options) {
        self.options = options;
        self.cache.clear();
    }

    pub fn set_optimize(&mut self, optimize: bool) {
        self.set_options(Options { optimize, ..self.options });
    }

    pub fn set_cache_mode(&mut self, cache: CacheMode) {
        self.set_options(Options { cache, ..self.options });
    }

    pub fn set_strict_members(&mut self, strict_members: bool) {
        self.set_options(Options {
            strict_members,
            ..self.options
        });
    }

    pub fn builders(&self) -> &[Shared<dyn ExpressionBuilder>] {
        &self.builders
    }

    pub fn member_manager(&self) -> &Shared<dyn MemberManager> {
        &self.member_manager
    }

    pub fn type_resolver(&self) -> &Shared<dyn TypeResolver> {
        &self.type_resolver
    }

    pub fn value_converter(&self) -> &Shared<dyn ValueConverter> {
        &self.value_converter
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    pub fn cache(&self) -> &CompilerCache {
        &self.cache
    }

    /// A fresh build context for a manual, uncached build.
    pub fn context(&self, metadata: &Metadata) -> BuildContext<'_> {
        BuildContext::new(self, metadata.clone())
    }

    /// Compiles `node`, returning the cached artifact when a structurally
    /// equal tree was compiled before and is still alive.
    ///
    /// # Errors
    ///
    /// Returns the first [`CompileError`] raised by a builder. Nothing is
    /// cached in that case.
    pub fn compile(&self, node: &Node, metadata: &Metadata) -> Result<Shared<CompiledExpression>, CompileError> {
        let signature = Signature::with_metadata(node, metadata);

        if self.options.cache != CacheMode::Disabled
            && let Some(compiled) = self.cache.get(&signature)
        {
            debug!(%signature, "Compiled expression cache hit");
            return Ok(compiled);
        }

        let generation = self.cache.generation();
        let mut ctx = self.context(metadata);
        let root = ctx.build(node)?;
        let builders = ctx.into_contributors();

        debug!(%signature, ty = %root.ty(), constant = root.is_constant(), ?builders, "Compiled expression");

        let compiled = Shared::new(CompiledExpression::new(root, builders, signature.clone()));
        Ok(self.cache.insert(signature, compiled, generation, self.options.cache))
    }

    /// Invalidates the cache entry of `node`, or the whole cache for `None`.
    /// Returns `true` if an entry was removed.
    pub fn try_invalidate_cache(&self, node: Option<&Node>) -> bool {
        match node {
            Some(node) => self.cache.remove(&Signature::of(node)),
            None => self.cache.clear(),
        }
    }

    /// Compiles and invokes `node` in one step.
    pub fn evaluate(&self, node: &Node, args: &[Value], metadata: &Metadata) -> Result<Value, Error> {
        let compiled = self.compile(node, metadata)?;
        Ok(compiled.invoke(args, metadata)?)
    }
}
