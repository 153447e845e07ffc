//! Hashing utilities.

use indexmap::{IndexMap, IndexSet};
use std::hash::{Hash, Hasher};
use xxhash_rust::xxh3::{Xxh3Builder, Xxh3Default};

pub(crate) type HashMap<K, V, S = Xxh3Builder> = std::collections::HashMap<K, V, S>;
pub(crate) type HashSet<K, S = Xxh3Builder> = std::collections::HashSet<K, S>;
pub(crate) type OrderedMap<K, V> = IndexMap<K, V, Xxh3Builder>;
pub(crate) type OrderedSet<K> = IndexSet<K, Xxh3Builder>;

/// Default hashing function used for structural hashes of field nodes and
/// values.
pub fn default_hash<T: Hash + ?Sized>(x: &T) -> u64 {
    let mut hasher = Xxh3Default::new();
    x.hash(&mut hasher);
    hasher.finish()
}

/// Hash of the address behind a pointer, used for identity-based hashing.
pub(crate) fn address_hash<T: ?Sized>(x: &T) -> u64 {
    default_hash(&(x as *const T as *const () as usize))
}
