//! Master entity
//!
//! The master entity is the root record of a distributed object. It knows
//! which namespaces the object declares and which of them are currently
//! loaded, but nothing about the sub-object payloads themselves.

use crate::{LifecycleError, Namespace, NamespaceSet, ObjectId};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Type tag of a distributed object.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ObjectType {
    #[default]
    Generic,
    Player,
    Mob,
    Structure,
    Item,
    Instance,
}

impl ObjectType {
    pub fn from_name(name: &str) -> Option<ObjectType> {
        match name {
            "Generic" => Some(ObjectType::Generic),
            "Player" => Some(ObjectType::Player),
            "Mob" => Some(ObjectType::Mob),
            "Structure" => Some(ObjectType::Structure),
            "Item" => Some(ObjectType::Item),
            "Instance" => Some(ObjectType::Instance),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ObjectType::Generic => "Generic",
            ObjectType::Player => "Player",
            ObjectType::Mob => "Mob",
            ObjectType::Structure => "Structure",
            ObjectType::Item => "Item",
            ObjectType::Instance => "Instance",
        }
    }

    pub fn is_player(&self) -> bool {
        matches!(self, ObjectType::Player)
    }
}

impl fmt::Display for ObjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Persisted form of a master entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MasterRecord {
    pub oid: ObjectId,
    pub name: String,
    pub object_type: ObjectType,
    pub persistent: bool,
    pub namespaces: NamespaceSet,
    pub instance: Option<ObjectId>,
    pub key: Option<String>,
    pub template_name: Option<String>,
}

impl MasterRecord {
    pub fn new(oid: ObjectId, name: impl Into<String>) -> Self {
        Self {
            oid,
            name: name.into(),
            object_type: ObjectType::Generic,
            persistent: false,
            namespaces: NamespaceSet::EMPTY,
            instance: None,
            key: None,
            template_name: None,
        }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, LifecycleError> {
        serde_json::to_vec(self).map_err(|e| LifecycleError::Codec {
            oid: self.oid,
            reason: e.to_string(),
        })
    }

    pub fn from_bytes(oid: ObjectId, bytes: &[u8]) -> Result<Self, LifecycleError> {
        serde_json::from_slice(bytes).map_err(|e| LifecycleError::Codec {
            oid,
            reason: e.to_string(),
        })
    }
}

#[derive(Debug)]
struct MasterState {
    record: MasterRecord,
    loaded: NamespaceSet,
    deleted: bool,
    dirty: bool,
}

/// Root record of a distributed object, shared through the entity registry.
///
/// All field access goes through a per-entity lock that each accessor takes
/// and releases internally, so the lock is never held across a bus call.
#[derive(Debug)]
pub struct MasterEntity {
    oid: ObjectId,
    state: Mutex<MasterState>,
}

impl MasterEntity {
    pub fn new(record: MasterRecord) -> Self {
        Self {
            oid: record.oid,
            state: Mutex::new(MasterState {
                record,
                loaded: NamespaceSet::EMPTY,
                deleted: false,
                dirty: false,
            }),
        }
    }

    pub fn oid(&self) -> ObjectId {
        self.oid
    }

    /// Snapshot of the persisted fields.
    pub fn record(&self) -> MasterRecord {
        self.state.lock().record.clone()
    }

    pub fn name(&self) -> String {
        self.state.lock().record.name.clone()
    }

    pub fn object_type(&self) -> ObjectType {
        self.state.lock().record.object_type
    }

    pub fn is_player(&self) -> bool {
        self.object_type().is_player()
    }

    pub fn is_persistent(&self) -> bool {
        self.state.lock().record.persistent
    }

    /// Returns the previous value.
    pub fn set_persistent(&self, persistent: bool) -> bool {
        let mut state = self.state.lock();
        let previous = state.record.persistent;
        if previous != persistent {
            state.record.persistent = persistent;
            state.dirty = true;
        }
        previous
    }

    pub fn instance(&self) -> Option<ObjectId> {
        self.state.lock().record.instance
    }

    pub fn set_instance(&self, instance: Option<ObjectId>) {
        let mut state = self.state.lock();
        if state.record.instance != instance {
            state.record.instance = instance;
            state.dirty = true;
        }
    }

    pub fn key(&self) -> Option<String> {
        self.state.lock().record.key.clone()
    }

    pub fn set_key(&self, key: Option<String>) {
        let mut state = self.state.lock();
        state.record.key = key;
        state.dirty = true;
    }

    pub fn namespaces(&self) -> NamespaceSet {
        self.state.lock().record.namespaces
    }

    pub fn loaded(&self) -> NamespaceSet {
        self.state.lock().loaded
    }

    pub fn is_fully_loaded(&self) -> bool {
        let state = self.state.lock();
        state.loaded == state.record.namespaces
    }

    /// Record a namespace as loaded. Namespaces the entity does not declare
    /// are rejected so the loaded set stays a subset of the declared set.
    pub fn mark_loaded(&self, ns: Namespace) -> bool {
        let mut state = self.state.lock();
        if !state.record.namespaces.contains(ns) {
            tracing::warn!(oid = %self.oid, namespace = %ns, "loaded namespace is not declared");
            return false;
        }
        state.loaded.insert(ns);
        true
    }

    pub fn mark_unloaded(&self, ns: Namespace) {
        self.state.lock().loaded.remove(ns);
    }

    pub fn is_deleted(&self) -> bool {
        self.state.lock().deleted
    }

    /// Check-and-set the deleted flag. Returns `false` when it was already set.
    pub fn mark_deleted(&self) -> bool {
        let mut state = self.state.lock();
        if state.deleted {
            return false;
        }
        state.deleted = true;
        true
    }

    pub fn is_dirty(&self) -> bool {
        self.state.lock().dirty
    }

    pub fn set_dirty(&self, dirty: bool) {
        self.state.lock().dirty = dirty;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entity() -> MasterEntity {
        let mut record = MasterRecord::new(ObjectId::from_raw(5), "chest");
        record.namespaces = [Namespace::WORLD_MANAGER, Namespace::INVENTORY]
            .into_iter()
            .collect();
        MasterEntity::new(record)
    }

    #[test]
    fn loaded_set_tracks_declared_set() {
        let e = entity();
        assert!(!e.is_fully_loaded());
        assert!(e.mark_loaded(Namespace::WORLD_MANAGER));
        assert!(!e.mark_loaded(Namespace::VOICE));
        assert!(e.loaded().is_subset_of(e.namespaces()));
        assert!(e.mark_loaded(Namespace::INVENTORY));
        assert!(e.is_fully_loaded());
    }

    #[test]
    fn deleted_flag_is_set_once() {
        let e = entity();
        assert!(e.mark_deleted());
        assert!(!e.mark_deleted());
    }

    #[test]
    fn persistence_change_marks_dirty() {
        let e = entity();
        assert!(!e.is_dirty());
        assert!(!e.set_persistent(true));
        assert!(e.is_dirty());
    }

    #[test]
    fn record_bytes_round_trip() {
        let record = entity().record();
        let bytes = record.to_bytes().expect("encode");
        let back = MasterRecord::from_bytes(record.oid, &bytes).expect("decode");
        assert_eq!(back, record);
    }
}
