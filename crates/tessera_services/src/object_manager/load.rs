use super::gates::Admission;
use super::{InstanceStatus, ObjectManager};
use crate::messages::{InstanceLoadResult, LifecycleMessage, LifecycleReply, ObjectRef};
use rayon::prelude::*;
use std::sync::Arc;
use tessera_core::{
    LifecycleError, LifecycleResult, MasterEntity, Namespace, NamespaceSet, ObjectId,
};

impl ObjectManager {
    /// Load an object and the requested namespaces (all declared ones by
    /// default). Loading something already fully resident succeeds at once.
    ///
    /// Concurrent loads of one id run one after another. A load issued from
    /// inside a running load of the same id (a plugin loading its own object
    /// back) does not wait: it returns the id of the master being loaded.
    pub fn load(&self, target: &ObjectRef, namespaces: Option<NamespaceSet>) -> LifecycleResult<ObjectId> {
        let result = self
            .profiler
            .time_operation("load", || self.load_inner(target, namespaces));
        match &result {
            Ok(_) => self.counters.increment("load.ok", 1),
            Err(err) => {
                self.counters.increment("load.failed", 1);
                tracing::error!(?target, error = %err, "load failed");
            }
        }
        result
    }

    pub(crate) fn resolve(&self, target: &ObjectRef) -> LifecycleResult<ObjectId> {
        match target {
            ObjectRef::Oid(oid) => Ok(*oid),
            ObjectRef::Key(key) => self
                .store
                .lookup_key(key)?
                .ok_or_else(|| LifecycleError::UnknownKey { key: key.clone() }),
        }
    }

    fn load_inner(&self, target: &ObjectRef, namespaces: Option<NamespaceSet>) -> LifecycleResult<ObjectId> {
        let oid = self.resolve(target)?;

        let _claim = match self.load_gates.admit(oid) {
            Admission::Claimed(claim) => claim,
            Admission::Reentrant => {
                tracing::debug!(%oid, "load re-entered from its own chain");
                return match self.registry.master(oid) {
                    Some(master) if !master.is_deleted() => Ok(oid),
                    _ => Err(LifecycleError::LoadInProgress { oid }),
                };
            }
        };

        let master = match self.registry.master(oid) {
            Some(master) if master.is_deleted() => {
                return Err(LifecycleError::UnknownObject { oid });
            }
            Some(master) => master,
            None => self.hydrate(oid)?,
        };

        let declared = master.namespaces();
        let requested = namespaces.map_or(declared, |n| n.intersection(declared));
        let missing = requested.difference(master.loaded());
        if missing.is_empty() {
            tracing::debug!(%oid, "already loaded");
            return Ok(oid);
        }

        if missing.contains(Namespace::WORLD_MANAGER) {
            if let Some(instance) = master.instance().filter(|i| *i != oid) {
                self.ensure_instance_loaded(instance)?;
            }
        }

        tracing::info!(%oid, namespaces = ?missing, "loading object");
        for ns in missing.iter() {
            let data = self.store.load_data(oid, ns)?;
            let ok = self.call_ack(LifecycleMessage::LoadSubObject {
                oid,
                namespace: ns,
                data,
            });
            if !ok {
                return Err(LifecycleError::SubObjectLoadFailed { oid, namespace: ns });
            }
            master.mark_loaded(ns);
        }

        self.track_membership(&master);
        Ok(oid)
    }

    /// Read the master record from the store and register it.
    fn hydrate(&self, oid: ObjectId) -> LifecycleResult<Arc<MasterEntity>> {
        if self.registry.contains(oid, Namespace::OBJECT_MANAGER) {
            // Something other than a master entity sits in the master slot
            return Err(LifecycleError::NotMaster { oid });
        }
        let record = self
            .store
            .load_master(oid)?
            .ok_or(LifecycleError::UnknownObject { oid })?;
        if record.oid != oid {
            return Err(LifecycleError::NotMaster { oid });
        }

        self.ids.observe(oid);
        let master = Arc::new(MasterEntity::new(record));
        Ok(self
            .registry
            .register_or_get(oid, Namespace::OBJECT_MANAGER, master))
    }

    /// Precondition for loading world content: the containing instance is
    /// resident and not being torn down.
    pub(crate) fn ensure_instance_loaded(&self, instance: ObjectId) -> LifecycleResult<()> {
        if self.registry.master(instance).is_some() {
            return match self.instances.status(instance) {
                Some(status @ (InstanceStatus::Unloading | InstanceStatus::Deleting)) => {
                    Err(LifecycleError::InstanceBusy {
                        instance,
                        status: status.to_string(),
                    })
                }
                _ => Ok(()),
            };
        }

        tracing::debug!(%instance, "loading containing instance first");
        let result = self
            .bus
            .send(LifecycleMessage::LoadInstance { oid: instance })
            .map(LifecycleReply::into_instance_load)
            .map_err(|e| LifecycleError::NoResponder {
                topic: e.to_string(),
            })?;
        match result {
            InstanceLoadResult::Ok => Ok(()),
            other => {
                tracing::warn!(%instance, result = ?other, "containing instance did not load");
                Err(LifecycleError::InstanceNotLoaded { instance })
            }
        }
    }

    /// Load every persisted non-player object whose stored location is in
    /// `instance`. Returns how many loaded.
    pub fn load_instance_content(&self, instance: ObjectId) -> LifecycleResult<usize> {
        let candidates: Vec<ObjectId> = self
            .store
            .objects_in_instance(instance)?
            .into_iter()
            .filter(|oid| self.registry.master(*oid).is_none())
            .collect();

        let loaded = candidates
            .par_iter()
            .filter(|oid| match self.store.load_master(**oid) {
                Ok(Some(record)) => !record.object_type.is_player(),
                Ok(None) => false,
                Err(err) => {
                    tracing::warn!(oid = %oid, error = %err, "unreadable content record");
                    false
                }
            })
            .filter(|oid| self.load(&ObjectRef::Oid(**oid), None).is_ok())
            .count();

        tracing::info!(%instance, loaded, candidates = candidates.len(), "instance content loaded");
        Ok(loaded)
    }
}
