//! Entity registry
//!
//! In-memory directory from (object id, namespace) to the in-memory
//! representation of that facet. The same id may be registered under several
//! namespaces at once, each entry pointing at a different value: the master
//! entity lives under `OBJECT_MANAGER` while plugins keep their sub-objects
//! under their own namespaces.

use crate::{MasterEntity, Namespace, NamespaceSet, ObjectId};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::any::Any;
use std::sync::Arc;

type Stored = Arc<dyn Any + Send + Sync>;

#[derive(Default)]
pub struct EntityRegistry {
    entries: DashMap<(ObjectId, Namespace), Stored>,
}

impl EntityRegistry {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    /// Register `entity` for `oid` under `ns`.
    ///
    /// Returns `false` and leaves the existing entry alone when the slot is
    /// already taken.
    pub fn register<T>(&self, oid: ObjectId, ns: Namespace, entity: Arc<T>) -> bool
    where
        T: Any + Send + Sync,
    {
        match self.entries.entry((oid, ns)) {
            Entry::Occupied(_) => false,
            Entry::Vacant(v) => {
                v.insert(entity);
                true
            }
        }
    }

    /// Register `entity` unless something of type `T` is already there, and
    /// return whichever value ends up registered.
    pub fn register_or_get<T>(&self, oid: ObjectId, ns: Namespace, entity: Arc<T>) -> Arc<T>
    where
        T: Any + Send + Sync,
    {
        let stored = self
            .entries
            .entry((oid, ns))
            .or_insert_with(|| entity.clone() as Stored)
            .value()
            .clone();
        stored.downcast::<T>().unwrap_or(entity)
    }

    /// Replace whatever is registered under the slot.
    pub fn replace<T>(&self, oid: ObjectId, ns: Namespace, entity: Arc<T>)
    where
        T: Any + Send + Sync,
    {
        self.entries.insert((oid, ns), entity);
    }

    pub fn unregister(&self, oid: ObjectId, ns: Namespace) -> bool {
        self.entries.remove(&(oid, ns)).is_some()
    }

    /// Typed lookup. Returns `None` when absent or registered with another type.
    pub fn lookup<T>(&self, oid: ObjectId, ns: Namespace) -> Option<Arc<T>>
    where
        T: Any + Send + Sync,
    {
        let stored = self.entries.get(&(oid, ns))?.value().clone();
        stored.downcast::<T>().ok()
    }

    pub fn contains(&self, oid: ObjectId, ns: Namespace) -> bool {
        self.entries.contains_key(&(oid, ns))
    }

    /// The master entity registered under `OBJECT_MANAGER`.
    pub fn master(&self, oid: ObjectId) -> Option<Arc<MasterEntity>> {
        self.lookup::<MasterEntity>(oid, Namespace::OBJECT_MANAGER)
    }

    /// Every value of type `T` registered under `ns`.
    pub fn all_of_namespace<T>(&self, ns: Namespace) -> Vec<Arc<T>>
    where
        T: Any + Send + Sync,
    {
        self.entries
            .iter()
            .filter(|entry| entry.key().1 == ns)
            .filter_map(|entry| entry.value().clone().downcast::<T>().ok())
            .collect()
    }

    pub fn ids_in_namespace(&self, ns: Namespace) -> Vec<ObjectId> {
        let mut ids: Vec<ObjectId> = self
            .entries
            .iter()
            .filter(|entry| entry.key().1 == ns)
            .map(|entry| entry.key().0)
            .collect();
        ids.sort_unstable();
        ids
    }

    /// Namespaces under which `oid` currently has a registration.
    pub fn namespaces_of(&self, oid: ObjectId) -> NamespaceSet {
        self.entries
            .iter()
            .filter(|entry| entry.key().0 == oid)
            .map(|entry| entry.key().1)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
