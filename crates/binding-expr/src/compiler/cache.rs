use std::sync::{
    RwLock, Weak,
    atomic::{AtomicU64, AtomicUsize, Ordering},
};

use dashmap::DashMap;
use rustc_hash::FxBuildHasher;
use tracing::debug;

use super::CompiledExpression;
use crate::{Shared, ast::signature::Signature};

/// Initial entry count above which an insert drops dead weak entries. The
/// mark doubles when more than half of the entries survive a purge.
pub(crate) const PURGE_HIGH_WATER_MARK: usize = 256;

/// Retention policy of cached compilations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CacheMode {
    Disabled,
    /// Entries live only as long as some caller holds the compiled
    /// expression.
    #[default]
    Weak,
    Strong,
}

#[derive(Debug)]
enum Entry {
    Weak(Weak<CompiledExpression>),
    Strong(Shared<CompiledExpression>),
}

impl Entry {
    fn new(compiled: &Shared<CompiledExpression>, mode: CacheMode) -> Self {
        match mode {
            CacheMode::Strong => Entry::Strong(Shared::clone(compiled)),
            _ => Entry::Weak(Shared::downgrade(compiled)),
        }
    }

    fn upgrade(&self) -> Option<Shared<CompiledExpression>> {
        match self {
            Entry::Weak(weak) => weak.upgrade(),
            Entry::Strong(strong) => Some(Shared::clone(strong)),
        }
    }

    fn is_alive(&self) -> bool {
        match self {
            Entry::Weak(weak) => weak.strong_count() > 0,
            Entry::Strong(_) => true,
        }
    }
}

/// Signature-keyed store of compiled expressions.
///
/// Keys never reference nodes or bound instances, and weak entries do not
/// keep the compiled expression alive.
///
/// Every invalidation bumps a generation counter. A compilation records the
/// generation before it starts building and only publishes its result if no
/// invalidation happened in between.
///
/// Dead weak entries are dropped on lookup of their signature and in bulk
/// whenever an insert pushes the cache past its high-water mark.
#[derive(Debug)]
pub struct CompilerCache {
    entries: DashMap<Signature, Entry, FxBuildHasher>,
    generation: AtomicU64,
    gate: RwLock<()>,
    high_water_mark: AtomicUsize,
}

impl Default for CompilerCache {
    fn default() -> Self {
        Self {
            entries: DashMap::default(),
            generation: AtomicU64::default(),
            gate: RwLock::default(),
            high_water_mark: AtomicUsize::new(PURGE_HIGH_WATER_MARK),
        }
    }
}

impl CompilerCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, signature: &Signature) -> Option<Shared<CompiledExpression>> {
        let compiled = self.entries.get(signature).and_then(|entry| entry.upgrade());
        if compiled.is_none() {
            self.entries.remove_if(signature, |_, entry| !entry.is_alive());
        }
        compiled
    }

    pub(crate) fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    /// Publishes `compiled` unless the cache was invalidated after
    /// `generation` was read. Returns the entry callers should use: the live
    /// entry another thread stored first, or `compiled` itself.
    pub(crate) fn insert(
        &self,
        signature: Signature,
        compiled: Shared<CompiledExpression>,
        generation: u64,
        mode: CacheMode,
    ) -> Shared<CompiledExpression> {
        if mode == CacheMode::Disabled {
            return compiled;
        }

        let Ok(_gate) = self.gate.read() else {
            return compiled;
        };

        if self.generation() != generation {
            debug!(%signature, "Cache invalidated during compilation, result not stored");
            return compiled;
        }

        let stored = {
            let mut entry = self
                .entries
                .entry(signature)
                .or_insert_with(|| Entry::new(&compiled, mode));

            match entry.upgrade() {
                Some(existing) => existing,
                None => {
                    *entry = Entry::new(&compiled, mode);
                    compiled
                }
            }
        };

        self.purge_above_high_water_mark();
        stored
    }

    fn purge_above_high_water_mark(&self) {
        let mark = self.high_water_mark.load(Ordering::Relaxed);
        if self.entries.len() <= mark {
            return;
        }

        let removed = self.purge();
        let len = self.entries.len();
        let next = if len > mark / 2 { mark.saturating_mul(2) } else { mark };
        self.high_water_mark.store(next, Ordering::Relaxed);

        debug!(removed, len, high_water_mark = next, "Purged dead cache entries");
    }

    /// Removes `signature` and every variant of it compiled under different
    /// metadata.
    pub fn remove(&self, signature: &Signature) -> bool {
        let _gate = self.gate.write();
        self.generation.fetch_add(1, Ordering::AcqRel);

        let prefix = signature.as_str();
        let before = self.entries.len();
        self.entries.retain(|key, _| {
            let key = key.as_str();
            !(key == prefix || key.strip_prefix(prefix).is_some_and(|rest| rest.starts_with('|')))
        });
        let removed = before != self.entries.len();

        debug!(%signature, removed, "Cache entry invalidated");
        removed
    }

    pub fn clear(&self) -> bool {
        let _gate = self.gate.write();
        self.generation.fetch_add(1, Ordering::AcqRel);

        let removed = !self.entries.is_empty();
        self.entries.clear();
        self.high_water_mark.store(PURGE_HIGH_WATER_MARK, Ordering::Relaxed);

        debug!(removed, "Cache cleared");
        removed
    }

    /// Drops entries whose compiled expression has been freed.
    pub fn purge(&self) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.is_alive());
        before.saturating_sub(self.entries.len())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
