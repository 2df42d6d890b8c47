use std::{
    any::Any,
    fmt::{self, Debug, Formatter},
    marker::PhantomData,
};

use itertools::Itertools;
use rustc_hash::FxHashMap;

use crate::Shared;

/// Typed key into a [`Metadata`] bag.
pub struct MetadataKey<T> {
    name: &'static str,
    _phantom_data: PhantomData<fn() -> T>,
}

impl<T> MetadataKey<T> {
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            _phantom_data: PhantomData,
        }
    }

    pub const fn name(&self) -> &'static str {
        self.name
    }
}

impl<T> Debug for MetadataKey<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "MetadataKey({})", self.name)
    }
}

/// Open, immutable-by-default bag of typed values.
///
/// Used both for compile-time hints (see [`keys`]) and as the ambient
/// invocation context handed to members at run time. Cloning is cheap; writes
/// copy the underlying map only when it is shared.
#[derive(Clone, Default)]
pub struct Metadata {
    entries: Shared<FxHashMap<&'static str, Shared<dyn Any + Send + Sync>>>,
}

impl Metadata {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get<T: Any + Send + Sync>(&self, key: &MetadataKey<T>) -> Option<&T> {
        self.entries
            .get(key.name)
            .and_then(|value| value.downcast_ref::<T>())
    }

    pub fn contains<T>(&self, key: &MetadataKey<T>) -> bool {
        self.entries.contains_key(key.name)
    }

    pub fn set<T: Any + Send + Sync>(&mut self, key: &MetadataKey<T>, value: T) {
        Shared::make_mut(&mut self.entries).insert(key.name, Shared::new(value));
    }

    pub fn remove<T>(&mut self, key: &MetadataKey<T>) -> bool {
        if !self.entries.contains_key(key.name) {
            return false;
        }

        Shared::make_mut(&mut self.entries).remove(key.name).is_some()
    }

    pub fn with<T: Any + Send + Sync>(mut self, key: &MetadataKey<T>, value: T) -> Self {
        self.set(key, value);
        self
    }

    pub fn without<T>(mut self, key: &MetadataKey<T>) -> Self {
        self.remove(key);
        self
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn ptr_eq(&self, other: &Metadata) -> bool {
        Shared::ptr_eq(&self.entries, &other.entries)
    }
}

impl Debug for Metadata {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "Metadata {{{}}}", self.entries.keys().sorted().join(", "))
    }
}

/// Well-known compile-time metadata keys.
pub mod keys {
    use super::MetadataKey;
    use crate::{LambdaSignature, Shared};

    /// Expected parameter list of a lambda node being compiled. Without it the
    /// lambda builder declines the node.
    pub const LAMBDA_SIGNATURE: MetadataKey<Shared<LambdaSignature>> =
        MetadataKey::new("lambda_signature");
}
