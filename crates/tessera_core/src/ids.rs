//! Object identifiers
//!
//! Object ids are opaque 64-bit handles. They are globally unique for the
//! lifetime of a store and are never reused once allocated.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Identifier of a distributed object (master entity plus its sub-objects).
///
/// `ObjectId::NONE` is reserved and never handed out by an allocator.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ObjectId(u64);

impl ObjectId {
    pub const NONE: ObjectId = ObjectId(0);

    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub const fn raw(&self) -> u64 {
        self.0
    }

    pub const fn is_none(&self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "oid:{}", self.0)
    }
}

impl From<u64> for ObjectId {
    fn from(raw: u64) -> Self {
        Self(raw)
    }
}

/// Hands out fresh object ids.
///
/// Seed the allocator above the highest id present in the persistence store
/// so a restarted server never collides with saved objects.
#[derive(Debug)]
pub struct ObjectIdAllocator {
    next: AtomicU64,
}

impl ObjectIdAllocator {
    pub fn new() -> Self {
        Self::starting_at(1)
    }

    pub fn starting_at(first: u64) -> Self {
        Self {
            next: AtomicU64::new(first.max(1)),
        }
    }

    pub fn allocate(&self) -> ObjectId {
        ObjectId(self.next.fetch_add(1, Ordering::Relaxed))
    }

    /// Make sure ids at or below `seen` are never allocated.
    pub fn observe(&self, seen: ObjectId) {
        self.next.fetch_max(seen.0 + 1, Ordering::Relaxed);
    }

    pub fn peek(&self) -> ObjectId {
        ObjectId(self.next.load(Ordering::Relaxed))
    }
}

impl Default for ObjectIdAllocator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocator_never_returns_none() {
        let alloc = ObjectIdAllocator::starting_at(0);
        assert!(!alloc.allocate().is_none());
    }

    #[test]
    fn observe_skips_past_seen_ids() {
        let alloc = ObjectIdAllocator::new();
        alloc.observe(ObjectId::from_raw(41));
        assert_eq!(alloc.allocate(), ObjectId::from_raw(42));

        // Observing an older id does not move the counter backwards
        alloc.observe(ObjectId::from_raw(3));
        assert_eq!(alloc.allocate(), ObjectId::from_raw(43));
    }
}
