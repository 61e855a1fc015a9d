//! Hash collections for transient lookup tables
//!
//! With the default `gxhash` feature these are gxhash-backed; without it they
//! fall back to the std collections so the crate builds on CPUs lacking the
//! AES/SSE2 intrinsics gxhash needs. Anything persisted or printed uses
//! ordered `BTreeMap`/`BTreeSet` instead.

#[cfg(feature = "gxhash")]
pub use gxhash::{HashMap, HashMapExt, HashSet, HashSetExt};

#[cfg(not(feature = "gxhash"))]
pub use std::collections::{HashMap, HashSet};

/// Constructors matching gxhash's extension traits
#[cfg(not(feature = "gxhash"))]
pub trait HashMapExt {
    /// Creates an empty map
    fn new() -> Self;

    /// Creates an empty map with room for `capacity` entries
    fn with_capacity(capacity: usize) -> Self;
}

#[cfg(not(feature = "gxhash"))]
impl<K, V> HashMapExt for HashMap<K, V> {
    fn new() -> Self {
        HashMap::default()
    }

    fn with_capacity(capacity: usize) -> Self {
        HashMap::with_capacity_and_hasher(capacity, Default::default())
    }
}

/// Constructors matching gxhash's extension traits
#[cfg(not(feature = "gxhash"))]
pub trait HashSetExt {
    /// Creates an empty set
    fn new() -> Self;

    /// Creates an empty set with room for `capacity` entries
    fn with_capacity(capacity: usize) -> Self;
}

#[cfg(not(feature = "gxhash"))]
impl<T> HashSetExt for HashSet<T> {
    fn new() -> Self {
        HashSet::default()
    }

    fn with_capacity(capacity: usize) -> Self {
        HashSet::with_capacity_and_hasher(capacity, Default::default())
    }
}
