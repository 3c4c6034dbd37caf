//! Persistence contract
//!
//! How the coordinators load and save bytes. Master records and sub-object
//! payloads are opaque to the store; world locations are kept beside them as
//! plain columns so an instance's content can be found without decoding
//! anything.

use crate::messages::{InstanceEntry, WorldNodeUpdate};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use tessera_core::glam::{Quat, Vec3};
use tessera_core::{LifecycleError, MasterRecord, Namespace, ObjectId, ObjectType};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("stored record for {oid} is unreadable: {reason}")]
    Corrupt { oid: ObjectId, reason: String },

    #[error("key '{key}' already belongs to {owner}")]
    KeyInUse { key: String, owner: ObjectId },

    #[error("storage backend: {0}")]
    Backend(String),
}

impl From<PersistenceError> for LifecycleError {
    fn from(err: PersistenceError) -> Self {
        LifecycleError::Persistence(err.to_string())
    }
}

/// Indexable location of a persisted world object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorldLocation {
    pub instance: ObjectId,
    pub loc: Vec3,
    pub orient: Quat,
    /// Where instance-entry pops return the object to, most recent last.
    #[serde(default)]
    pub restore_stack: Vec<InstanceEntry>,
}

impl WorldLocation {
    pub fn new(instance: ObjectId, loc: Vec3, orient: Quat) -> Self {
        Self {
            instance,
            loc,
            orient,
            restore_stack: Vec::new(),
        }
    }

    pub fn apply(&mut self, update: &WorldNodeUpdate) {
        if let Some(instance) = update.instance {
            self.instance = instance;
        }
        if let Some(loc) = update.loc {
            self.loc = loc;
        }
        if let Some(orient) = update.orient {
            self.orient = orient;
        }
    }

    pub fn entry(&self) -> InstanceEntry {
        InstanceEntry {
            instance: self.instance,
            loc: self.loc,
            orient: self.orient,
        }
    }
}

pub trait PersistenceStore: Send + Sync {
    fn save_master(&self, record: &MasterRecord) -> Result<(), PersistenceError>;

    fn load_master(&self, oid: ObjectId) -> Result<Option<MasterRecord>, PersistenceError>;

    fn lookup_key(&self, key: &str) -> Result<Option<ObjectId>, PersistenceError>;

    /// Bind `key` to `oid`. Rebinding a key to its current owner is a no-op.
    fn bind_key(&self, key: &str, oid: ObjectId) -> Result<(), PersistenceError>;

    fn save_data(&self, oid: ObjectId, ns: Namespace, data: &[u8]) -> Result<(), PersistenceError>;

    fn load_data(&self, oid: ObjectId, ns: Namespace) -> Result<Option<Vec<u8>>, PersistenceError>;

    /// Remove the master record, every namespace payload, the key binding and
    /// the world location. Returns `false` when nothing was stored.
    fn delete_object(&self, oid: ObjectId) -> Result<bool, PersistenceError>;

    fn save_location(&self, oid: ObjectId, location: &WorldLocation) -> Result<(), PersistenceError>;

    fn load_location(&self, oid: ObjectId) -> Result<Option<WorldLocation>, PersistenceError>;

    /// Ids whose stored location is inside `instance`.
    fn objects_in_instance(&self, instance: ObjectId) -> Result<Vec<ObjectId>, PersistenceError>;

    /// First stored master record with this name (and type, when given).
    fn find_named(
        &self,
        name: &str,
        object_type: Option<ObjectType>,
    ) -> Result<Option<ObjectId>, PersistenceError>;

    /// Highest id with a stored master record.
    fn max_oid(&self) -> Result<Option<ObjectId>, PersistenceError>;
}

/// In-memory store, used by tests and single-process deployments.
#[derive(Default)]
pub struct MemoryStore {
    masters: DashMap<ObjectId, Vec<u8>>,
    data: DashMap<ObjectId, HashMap<Namespace, Vec<u8>>>,
    keys: DashMap<String, ObjectId>,
    locations: DashMap<ObjectId, WorldLocation>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn master_count(&self) -> usize {
        self.masters.len()
    }

    /// Every stored payload namespace for `oid`, sorted.
    pub fn stored_namespaces(&self, oid: ObjectId) -> Vec<Namespace> {
        let mut namespaces: Vec<Namespace> = self
            .data
            .get(&oid)
            .map(|d| d.keys().copied().collect())
            .unwrap_or_default();
        namespaces.sort();
        namespaces
    }

    fn decode(&self, oid: ObjectId, bytes: &[u8]) -> Result<MasterRecord, PersistenceError> {
        MasterRecord::from_bytes(oid, bytes).map_err(|e| PersistenceError::Corrupt {
            oid,
            reason: e.to_string(),
        })
    }
}

impl PersistenceStore for MemoryStore {
    fn save_master(&self, record: &MasterRecord) -> Result<(), PersistenceError> {
        let bytes = record
            .to_bytes()
            .map_err(|e| PersistenceError::Backend(e.to_string()))?;
        if let Some(key) = &record.key {
            self.bind_key(key, record.oid)?;
        }
        self.masters.insert(record.oid, bytes);
        Ok(())
    }

    fn load_master(&self, oid: ObjectId) -> Result<Option<MasterRecord>, PersistenceError> {
        // Decode outside the shard lock
        let bytes = self.masters.get(&oid).map(|b| b.clone());
        bytes.map(|b| self.decode(oid, &b)).transpose()
    }

    fn lookup_key(&self, key: &str) -> Result<Option<ObjectId>, PersistenceError> {
        Ok(self.keys.get(key).map(|oid| *oid))
    }

    fn bind_key(&self, key: &str, oid: ObjectId) -> Result<(), PersistenceError> {
        match self.keys.entry(key.to_string()) {
            dashmap::mapref::entry::Entry::Occupied(e) if *e.get() != oid => {
                Err(PersistenceError::KeyInUse {
                    key: key.to_string(),
                    owner: *e.get(),
                })
            }
            dashmap::mapref::entry::Entry::Occupied(_) => Ok(()),
            dashmap::mapref::entry::Entry::Vacant(v) => {
                v.insert(oid);
                Ok(())
            }
        }
    }

    fn save_data(&self, oid: ObjectId, ns: Namespace, data: &[u8]) -> Result<(), PersistenceError> {
        self.data.entry(oid).or_default().insert(ns, data.to_vec());
        Ok(())
    }

    fn load_data(&self, oid: ObjectId, ns: Namespace) -> Result<Option<Vec<u8>>, PersistenceError> {
        Ok(self.data.get(&oid).and_then(|d| d.get(&ns).cloned()))
    }

    fn delete_object(&self, oid: ObjectId) -> Result<bool, PersistenceError> {
        let master = self.masters.remove(&oid).is_some();
        let data = self.data.remove(&oid).is_some();
        let location = self.locations.remove(&oid).is_some();
        self.keys.retain(|_, owner| *owner != oid);
        Ok(master || data || location)
    }

    fn save_location(&self, oid: ObjectId, location: &WorldLocation) -> Result<(), PersistenceError> {
        self.locations.insert(oid, location.clone());
        Ok(())
    }

    fn load_location(&self, oid: ObjectId) -> Result<Option<WorldLocation>, PersistenceError> {
        Ok(self.locations.get(&oid).map(|l| l.clone()))
    }

    fn objects_in_instance(&self, instance: ObjectId) -> Result<Vec<ObjectId>, PersistenceError> {
        let mut ids: Vec<ObjectId> = self
            .locations
            .iter()
            .filter(|l| l.instance == instance)
            .map(|l| *l.key())
            .collect();
        ids.sort();
        Ok(ids)
    }

    fn find_named(
        &self,
        name: &str,
        object_type: Option<ObjectType>,
    ) -> Result<Option<ObjectId>, PersistenceError> {
        let snapshot: BTreeMap<ObjectId, Vec<u8>> = self
            .masters
            .iter()
            .map(|e| (*e.key(), e.value().clone()))
            .collect();
        for (oid, bytes) in snapshot {
            let record = self.decode(oid, &bytes)?;
            if record.name == name && object_type.map_or(true, |t| t == record.object_type) {
                return Ok(Some(oid));
            }
        }
        Ok(None)
    }

    fn max_oid(&self) -> Result<Option<ObjectId>, PersistenceError> {
        Ok(self.masters.iter().map(|e| *e.key()).max())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(raw: u64, name: &str, object_type: ObjectType) -> MasterRecord {
        let mut record = MasterRecord::new(ObjectId::from_raw(raw), name);
        record.object_type = object_type;
        record.persistent = true;
        record
    }

    #[test]
    fn object_data_round_trips_per_namespace() {
        let store = MemoryStore::new();
        let oid = ObjectId::from_raw(9);
        store.save_data(oid, Namespace::INVENTORY, b"sword,shield").unwrap();
        store.save_data(oid, Namespace::COMBAT, b"hp=10").unwrap();

        assert_eq!(
            store.load_data(oid, Namespace::INVENTORY).unwrap().as_deref(),
            Some(&b"sword,shield"[..])
        );
        assert!(store.load_data(oid, Namespace::VOICE).unwrap().is_none());
        assert_eq!(
            store.stored_namespaces(oid),
            vec![Namespace::INVENTORY, Namespace::COMBAT]
        );
    }

    #[test]
    fn keys_are_exclusive() {
        let store = MemoryStore::new();
        let mut first = record(1, "alice", ObjectType::Player);
        first.key = Some("account:alice".into());
        store.save_master(&first).unwrap();
        assert_eq!(
            store.lookup_key("account:alice").unwrap(),
            Some(ObjectId::from_raw(1))
        );

        let err = store.bind_key("account:alice", ObjectId::from_raw(2)).unwrap_err();
        assert!(matches!(err, PersistenceError::KeyInUse { .. }));
        store.bind_key("account:alice", ObjectId::from_raw(1)).unwrap();
    }

    #[test]
    fn find_named_filters_by_type() {
        let store = MemoryStore::new();
        store.save_master(&record(3, "crypt", ObjectType::Mob)).unwrap();
        store.save_master(&record(4, "crypt", ObjectType::Instance)).unwrap();

        assert_eq!(
            store.find_named("crypt", Some(ObjectType::Instance)).unwrap(),
            Some(ObjectId::from_raw(4))
        );
        assert_eq!(store.find_named("crypt", None).unwrap(), Some(ObjectId::from_raw(3)));
        assert_eq!(store.max_oid().unwrap(), Some(ObjectId::from_raw(4)));
    }

    #[test]
    fn delete_removes_everything() {
        let store = MemoryStore::new();
        let oid = ObjectId::from_raw(5);
        let mut rec = record(5, "chest", ObjectType::Structure);
        rec.key = Some("chest-5".into());
        store.save_master(&rec).unwrap();
        store.save_data(oid, Namespace::INVENTORY, b"x").unwrap();
        store
            .save_location(oid, &WorldLocation::new(ObjectId::from_raw(7), Vec3::ZERO, Quat::IDENTITY))
            .unwrap();
        assert_eq!(store.objects_in_instance(ObjectId::from_raw(7)).unwrap(), vec![oid]);

        assert!(store.delete_object(oid).unwrap());
        assert!(store.load_master(oid).unwrap().is_none());
        assert!(store.lookup_key("chest-5").unwrap().is_none());
        assert!(store.objects_in_instance(ObjectId::from_raw(7)).unwrap().is_empty());
        assert!(!store.delete_object(oid).unwrap());
    }

    #[test]
    fn location_updates_are_partial() {
        let mut location = WorldLocation::new(ObjectId::from_raw(1), Vec3::ZERO, Quat::IDENTITY);
        location.apply(&WorldNodeUpdate {
            loc: Some(Vec3::new(1.0, 2.0, 3.0)),
            ..Default::default()
        });
        assert_eq!(location.instance, ObjectId::from_raw(1));
        assert_eq!(location.loc, Vec3::new(1.0, 2.0, 3.0));
    }
}
