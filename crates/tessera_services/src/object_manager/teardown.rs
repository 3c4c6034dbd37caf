use super::{InstanceStatus, ObjectManager};
use crate::messages::LifecycleMessage;
use rayon::prelude::*;
use tessera_core::{LifecycleError, LifecycleResult, Namespace, NamespaceSet, ObjectId};

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum Teardown {
    Unload,
    Delete,
}

impl ObjectManager {
    /// Unload the given namespaces (every loaded one by default).
    ///
    /// Best-effort: every namespace is attempted and failures are counted. A
    /// full unload saves a dirty persistent object first and then drops the
    /// master from the registry, unless a namespace refused to unload; the
    /// master then stays to track the sub-objects still resident.
    pub fn unload(&self, oid: ObjectId, namespaces: Option<NamespaceSet>) -> LifecycleResult<()> {
        let result = self
            .profiler
            .time_operation("unload", || self.unload_inner(oid, namespaces));
        self.counters
            .increment(if result.is_ok() { "unload.ok" } else { "unload.failed" }, 1);
        result
    }

    fn unload_inner(&self, oid: ObjectId, namespaces: Option<NamespaceSet>) -> LifecycleResult<()> {
        let master = self
            .registry
            .master(oid)
            .ok_or(LifecycleError::UnknownObject { oid })?;

        let loaded = master.loaded();
        let targets = namespaces.map_or(loaded, |n| n.intersection(loaded));
        let full = targets == loaded;

        if full && master.is_persistent() && master.is_dirty() {
            if let Err(err) = self.save_master(&master) {
                tracing::warn!(%oid, error = %err, "save before unload failed");
            }
        }

        tracing::info!(%oid, namespaces = ?targets, full, "unloading object");
        let mut failed = 0;
        for ns in targets.iter() {
            if self.call_ack(LifecycleMessage::UnloadSubObject { oid, namespace: ns }) {
                master.mark_unloaded(ns);
            } else {
                failed += 1;
                self.counters.increment("unload.namespace_failures", 1);
            }
        }

        if full && failed == 0 {
            self.registry.unregister(oid, Namespace::OBJECT_MANAGER);
            if let Some(instance) = master.instance() {
                self.instances.remove_content(instance, oid);
            }
            if master.namespaces().contains(Namespace::INSTANCE) {
                self.instances.retire(oid);
            }
        } else {
            self.track_membership(&master);
        }

        if failed > 0 {
            return Err(LifecycleError::PartialFailure {
                oid,
                failed,
                attempted: targets.len(),
            });
        }
        Ok(())
    }

    /// Delete an object everywhere. Deleting something already deleted is a
    /// no-op; an object that is only in the store is removed from the store.
    pub fn delete(&self, oid: ObjectId) -> LifecycleResult<()> {
        let result = self
            .profiler
            .time_operation("delete", || self.delete_inner(oid));
        self.counters
            .increment(if result.is_ok() { "delete.ok" } else { "delete.failed" }, 1);
        result
    }

    fn delete_inner(&self, oid: ObjectId) -> LifecycleResult<()> {
        let Some(master) = self.registry.master(oid) else {
            return if self.store.delete_object(oid)? {
                tracing::info!(%oid, "deleted stored object");
                Ok(())
            } else {
                Err(LifecycleError::UnknownObject { oid })
            };
        };

        if !master.mark_deleted() {
            tracing::debug!(%oid, "already deleted");
            return Ok(());
        }

        let declared = master.namespaces();
        tracing::info!(%oid, namespaces = ?declared, "deleting object");
        let mut failed = 0;
        for ns in declared.iter() {
            if self.call_ack(LifecycleMessage::DeleteSubObject { oid, namespace: ns }) {
                master.mark_unloaded(ns);
            } else {
                failed += 1;
                self.counters.increment("delete.namespace_failures", 1);
            }
        }

        if let Err(err) = self.store.delete_object(oid) {
            tracing::error!(%oid, error = %err, "could not delete stored object");
        }
        self.registry.unregister(oid, Namespace::OBJECT_MANAGER);
        if let Some(instance) = master.instance() {
            self.instances.remove_content(instance, oid);
        }
        if declared.contains(Namespace::INSTANCE) {
            self.instances.retire(oid);
        }

        if failed > 0 {
            return Err(LifecycleError::PartialFailure {
                oid,
                failed,
                attempted: declared.len(),
            });
        }
        Ok(())
    }

    /// Unload an instance: its non-player content first, then a broadcast
    /// every interested service acknowledges, then the instance object.
    pub fn unload_instance(&self, instance: ObjectId) -> LifecycleResult<()> {
        self.teardown_instance(instance, Teardown::Unload)
    }

    /// Delete an instance, its non-player content included.
    pub fn delete_instance(&self, instance: ObjectId) -> LifecycleResult<()> {
        self.teardown_instance(instance, Teardown::Delete)
    }

    fn teardown_instance(&self, instance: ObjectId, mode: Teardown) -> LifecycleResult<()> {
        let status = match mode {
            Teardown::Unload => InstanceStatus::Unloading,
            Teardown::Delete => InstanceStatus::Deleting,
        };
        self.instances.begin(instance, status)?;
        tracing::info!(%instance, ?mode, "instance teardown started");

        // Players are relocated elsewhere, never torn down with the instance
        let targets: Vec<ObjectId> = self
            .instances
            .content(instance)
            .into_iter()
            .filter(|oid| !self.registry.master(*oid).is_some_and(|m| m.is_player()))
            .collect();

        let failed = targets
            .par_iter()
            .filter(|oid| {
                let result = match mode {
                    Teardown::Unload => self.unload(**oid, None),
                    Teardown::Delete => self.delete(**oid),
                };
                if let Err(err) = &result {
                    tracing::warn!(%instance, oid = %oid, error = %err, "content teardown failed");
                }
                result.is_err()
            })
            .count();
        for oid in &targets {
            self.instances.remove_content(instance, *oid);
        }

        let notice = match mode {
            Teardown::Unload => LifecycleMessage::InstanceUnloaded { instance },
            Teardown::Delete => LifecycleMessage::InstanceDeleted { instance },
        };
        let acks = self.bus.broadcast(notice);
        tracing::debug!(%instance, acknowledged = acks.replies.len(), delivered = acks.delivered, "teardown broadcast done");

        let result = match mode {
            Teardown::Unload => self.unload(instance, None),
            Teardown::Delete => self.delete(instance),
        };
        // Covers a master that was never registered or failed to unload
        self.instances.retire(instance);

        result?;
        if failed > 0 {
            return Err(LifecycleError::PartialFailure {
                oid: instance,
                failed,
                attempted: targets.len(),
            });
        }
        tracing::info!(%instance, ?mode, "instance teardown finished");
        Ok(())
    }
}
