//! Namespaces and namespace bitmasks
//!
//! A namespace names one facet of a distributed object and is owned by
//! exactly one plugin. Namespaces are small integers so that the declared and
//! loaded sets of a master entity fit in a single `u64`.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Maximum number of distinct namespaces (bits in a [`NamespaceSet`]).
pub const MAX_NAMESPACES: u8 = 64;

/// One facet of a composite object.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Namespace(u8);

impl Namespace {
    /// The master-entity record itself.
    pub const OBJECT_MANAGER: Namespace = Namespace(0);
    /// Control namespace; only carries the persistence flag in templates.
    pub const TRANSIENT: Namespace = Namespace(1);
    /// World position facet.
    pub const WORLD_MANAGER: Namespace = Namespace(2);
    /// Instance (world partition) facet.
    pub const INSTANCE: Namespace = Namespace(3);
    pub const INVENTORY: Namespace = Namespace(4);
    pub const COMBAT: Namespace = Namespace(5);
    pub const VOICE: Namespace = Namespace(6);

    /// First bit available to deployment-specific namespaces.
    pub const FIRST_CUSTOM: u8 = 16;

    /// Declare a deployment-specific namespace.
    ///
    /// Returns `None` when `bit` collides with a built-in namespace or does
    /// not fit in a [`NamespaceSet`].
    pub const fn custom(bit: u8) -> Option<Namespace> {
        if bit < Self::FIRST_CUSTOM || bit >= MAX_NAMESPACES {
            None
        } else {
            Some(Namespace(bit))
        }
    }

    /// Any valid bit: a built-in namespace or a custom one.
    pub fn from_bit(bit: u8) -> Option<Namespace> {
        let ns = Namespace(bit);
        if ns.name().is_some() {
            Some(ns)
        } else {
            Self::custom(bit)
        }
    }

    pub const fn bit(&self) -> u8 {
        self.0
    }

    pub const fn mask(&self) -> u64 {
        1u64 << self.0
    }

    pub fn name(&self) -> Option<&'static str> {
        match self.0 {
            0 => Some("ObjectManager"),
            1 => Some("Transient"),
            2 => Some("WorldManager"),
            3 => Some("Instance"),
            4 => Some("Inventory"),
            5 => Some("Combat"),
            6 => Some("Voice"),
            _ => None,
        }
    }

    /// Lookup by the names printed in logs and used in world files.
    pub fn from_name(name: &str) -> Option<Namespace> {
        (0..Self::FIRST_CUSTOM)
            .map(Namespace)
            .find(|ns| ns.name() == Some(name))
    }
}

impl fmt::Debug for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => f.write_str(name),
            None => write!(f, "ns#{}", self.0),
        }
    }
}

/// Set of namespaces stored as a bitmask.
#[derive(Copy, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NamespaceSet(u64);

impl NamespaceSet {
    pub const EMPTY: NamespaceSet = NamespaceSet(0);

    pub const fn from_bits(bits: u64) -> Self {
        Self(bits)
    }

    pub const fn bits(&self) -> u64 {
        self.0
    }

    pub fn insert(&mut self, ns: Namespace) {
        self.0 |= ns.mask();
    }

    pub fn remove(&mut self, ns: Namespace) {
        self.0 &= !ns.mask();
    }

    pub const fn contains(&self, ns: Namespace) -> bool {
        self.0 & ns.mask() != 0
    }

    pub const fn is_empty(&self) -> bool {
        self.0 == 0
    }

    pub const fn len(&self) -> usize {
        self.0.count_ones() as usize
    }

    /// True when every member of `self` is also in `other`.
    pub const fn is_subset_of(&self, other: NamespaceSet) -> bool {
        self.0 & !other.0 == 0
    }

    pub const fn union(&self, other: NamespaceSet) -> NamespaceSet {
        NamespaceSet(self.0 | other.0)
    }

    pub const fn intersection(&self, other: NamespaceSet) -> NamespaceSet {
        NamespaceSet(self.0 & other.0)
    }

    pub const fn difference(&self, other: NamespaceSet) -> NamespaceSet {
        NamespaceSet(self.0 & !other.0)
    }

    /// Members in ascending bit order.
    pub fn iter(&self) -> impl Iterator<Item = Namespace> + '_ {
        let bits = self.0;
        (0..MAX_NAMESPACES)
            .filter(move |bit| bits & (1u64 << bit) != 0)
            .map(Namespace)
    }

    pub fn to_vec(&self) -> Vec<Namespace> {
        self.iter().collect()
    }
}

impl FromIterator<Namespace> for NamespaceSet {
    fn from_iter<I: IntoIterator<Item = Namespace>>(iter: I) -> Self {
        let mut set = NamespaceSet::EMPTY;
        for ns in iter {
            set.insert(ns);
        }
        set
    }
}

impl fmt::Debug for NamespaceSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}
