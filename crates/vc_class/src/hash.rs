//! Hash containers used by the registries and the context caches.
//!
//! String keyed tables use [`hashbrown`] with a fixed [`foldhash`] seed, so that
//! iteration order only depends on the inserted keys. [`TypeId`] keyed tables skip
//! hashing entirely, a `TypeId` is already a well distributed hash.

use core::any::TypeId;
use core::fmt::Debug;
use core::hash::{BuildHasher, Hasher};

use foldhash::fast::{FixedState, FoldHasher};
use hashbrown::hash_map::Entry;

// -----------------------------------------------------------------------------
// FixedHashState

const SEEDED: FixedState = FixedState::with_seed(0x95EE04C4F326B271);

/// Seeded [`BuildHasher`] of the string keyed tables.
#[derive(Copy, Clone, Default, Debug)]
pub struct FixedHashState;

impl BuildHasher for FixedHashState {
    type Hasher = FoldHasher<'static>;

    #[inline]
    fn build_hasher(&self) -> FoldHasher<'static> {
        SEEDED.build_hasher()
    }
}

/// Accessor and class-name tables.
pub type HashMap<K, V> = hashbrown::HashMap<K, V, FixedHashState>;

// -----------------------------------------------------------------------------
// NoOpHashState

/// Hasher for keys that already are hashes.
///
/// A [`TypeId`] hashes itself with a single `write_u64`, which is kept as is.
#[derive(Copy, Clone, Default, Debug)]
pub struct NoOpHasher(u64);

impl Hasher for NoOpHasher {
    #[inline]
    fn finish(&self) -> u64 {
        self.0
    }

    // Required by `Hasher`, only reached by keys other than `TypeId`.
    fn write(&mut self, bytes: &[u8]) {
        self.0 = bytes
            .iter()
            .fold(self.0, |acc, &byte| acc.rotate_left(8) ^ u64::from(byte));
    }

    #[inline]
    fn write_u64(&mut self, i: u64) {
        self.0 = i;
    }
}

/// [`BuildHasher`] of [`NoOpHasher`].
#[derive(Copy, Clone, Default, Debug)]
pub struct NoOpHashState;

impl BuildHasher for NoOpHashState {
    type Hasher = NoOpHasher;

    #[inline]
    fn build_hasher(&self) -> NoOpHasher {
        NoOpHasher(0)
    }
}

// -----------------------------------------------------------------------------
// TypeIdMap

/// Per-type storage for class metadata, translators and concrete contexts.
///
/// Keys are not rehashed, see [`NoOpHasher`].
pub struct TypeIdMap<V>(hashbrown::HashMap<TypeId, V, NoOpHashState>);

impl<V> TypeIdMap<V> {
    #[inline]
    pub const fn new() -> Self {
        Self(hashbrown::HashMap::with_hasher(NoOpHashState))
    }

    #[inline]
    pub fn get(&self, type_id: &TypeId) -> Option<&V> {
        self.0.get(type_id)
    }

    /// Replaces the value of `type_id`, returning the previous one.
    #[inline]
    pub fn insert(&mut self, type_id: TypeId, v: V) -> Option<V> {
        self.0.insert(type_id, v)
    }

    /// Inserts `v` only if the key is vacant.
    ///
    /// Returns the value that ends up stored under the key, which is the
    /// previous occupant when the key was already present.
    #[inline]
    pub fn get_or_insert(&mut self, type_id: TypeId, v: V) -> &mut V {
        match self.0.entry(type_id) {
            Entry::Vacant(entry) => entry.insert(v),
            Entry::Occupied(entry) => entry.into_mut(),
        }
    }

    #[inline]
    pub fn contains(&self, type_id: &TypeId) -> bool {
        self.0.contains_key(type_id)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// An iterator visiting all values in arbitrary order.
    #[inline]
    pub fn values(&self) -> impl ExactSizeIterator<Item = &V> {
        self.0.values()
    }
}

impl<V> Default for TypeIdMap<V> {
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}

impl<V: Clone> Clone for TypeIdMap<V> {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

impl<V: Debug> Debug for TypeIdMap<V> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        Debug::fmt(&self.0, f)
    }
}

#[cfg(test)]
mod tests {
    use super::{NoOpHashState, TypeIdMap};
    use core::any::TypeId;
    use core::hash::{BuildHasher, Hash, Hasher};

    #[test]
    fn no_op_passes_u64_through() {
        let mut hasher = NoOpHashState.build_hasher();
        3_u64.hash(&mut hasher);
        assert_eq!(hasher.finish(), 3);
    }

    #[test]
    fn byte_writes_fold_into_the_state() {
        let mut hasher = NoOpHashState.build_hasher();
        hasher.write(&[1, 2]);
        assert_eq!(hasher.finish(), 0x0102);
    }

    #[test]
    fn get_or_insert_keeps_first() {
        let mut map = TypeIdMap::new();
        map.get_or_insert(TypeId::of::<u8>(), 1);
        let kept = *map.get_or_insert(TypeId::of::<u8>(), 2);
        assert_eq!(kept, 1);
        assert_eq!(map.get(&TypeId::of::<u8>()), Some(&1));
        assert_eq!(map.len(), 1);
    }
}
