use super::ObjectManager;
use crate::messages::{
    EntryFlag, InstanceEntry, LifecycleMessage, LifecycleReply, ObjectRef, ObjectStatus,
    WorldNodeUpdate,
};
use crate::persistence::WorldLocation;
use tessera_core::glam::{Quat, Vec3};
use tessera_core::{
    LifecycleError, LifecycleResult, MasterEntity, Namespace, NamespaceSet, ObjectId, ObjectType,
};

impl ObjectManager {
    /// Write the master record and every loaded sub-object to the store.
    pub(crate) fn save_master(&self, master: &MasterEntity) -> LifecycleResult<()> {
        let oid = master.oid();
        self.store.save_master(&master.record())?;

        let loaded = master.loaded();
        let mut failed = 0;
        for ns in loaded.iter() {
            match self.call(LifecycleMessage::SaveSubObject { oid, namespace: ns }) {
                Some(LifecycleReply::Data(Some(bytes))) => {
                    if let Err(err) = self.store.save_data(oid, ns, &bytes) {
                        tracing::warn!(%oid, namespace = %ns, error = %err, "could not store sub-object");
                        failed += 1;
                    }
                }
                // Nothing worth persisting
                Some(LifecycleReply::Data(None)) => {}
                _ => {
                    tracing::warn!(%oid, namespace = %ns, "sub-object save failed");
                    failed += 1;
                }
            }
        }
        self.counters.increment("save.namespace_failures", failed as u64);

        if failed > 0 {
            return Err(LifecycleError::PartialFailure {
                oid,
                failed,
                attempted: loaded.len(),
            });
        }
        master.set_dirty(false);
        tracing::debug!(%oid, namespaces = ?loaded, "object saved");
        Ok(())
    }

    fn registered(&self, oid: ObjectId) -> LifecycleResult<std::sync::Arc<MasterEntity>> {
        self.registry
            .master(oid)
            .filter(|m| !m.is_deleted())
            .ok_or(LifecycleError::UnknownObject { oid })
    }

    /// Turning persistence on saves the object; turning it off drops the
    /// stored copy.
    pub fn set_persistence(&self, oid: ObjectId, persistent: bool) -> LifecycleResult<()> {
        let master = self.registered(oid)?;
        let previous = master.set_persistent(persistent);
        if previous == persistent {
            return Ok(());
        }
        tracing::info!(%oid, persistent, "persistence changed");
        if persistent {
            self.save_master(&master)
        } else {
            self.store.delete_object(oid)?;
            Ok(())
        }
    }

    /// Save an object now, optionally binding it to a lookup key first.
    pub fn save_object(&self, oid: ObjectId, key: Option<String>) -> LifecycleResult<()> {
        let master = self.registered(oid)?;
        if let Some(key) = key {
            self.store.bind_key(&key, oid)?;
            master.set_key(Some(key));
        }
        self.save_master(&master)
    }

    /// Raw stored bytes of one namespace.
    pub fn load_object_data(
        &self,
        target: &ObjectRef,
        namespace: Namespace,
    ) -> LifecycleResult<Option<Vec<u8>>> {
        let oid = self.resolve(target)?;
        Ok(self.store.load_data(oid, namespace)?)
    }

    /// Store raw bytes for one namespace without involving its plugin.
    pub fn save_object_data(
        &self,
        oid: ObjectId,
        key: Option<&str>,
        namespace: Namespace,
        data: &[u8],
    ) -> LifecycleResult<()> {
        if let Some(key) = key {
            self.store.bind_key(key, oid)?;
            if let Some(master) = self.registry.master(oid) {
                master.set_key(Some(key.to_string()));
            }
        }
        self.store.save_data(oid, namespace, data)?;
        Ok(())
    }

    /// Patch the stored world location of an object. Returns `false` when
    /// the object has no stored location.
    pub fn fix_world_node(&self, oid: ObjectId, update: &WorldNodeUpdate) -> LifecycleResult<bool> {
        let Some(mut location) = self.store.load_location(oid)? else {
            return Ok(false);
        };
        location.apply(update);
        self.store.save_location(oid, &location)?;
        if let (Some(master), Some(instance)) = (self.registry.master(oid), update.instance) {
            master.set_instance(Some(instance));
        }
        Ok(true)
    }

    /// Find an object by name, resident objects first.
    pub fn get_named_object(
        &self,
        instance: Option<ObjectId>,
        name: &str,
        object_type: Option<ObjectType>,
    ) -> LifecycleResult<Option<ObjectId>> {
        let type_matches = |t: ObjectType| object_type.map_or(true, |wanted| wanted == t);
        let resident = self
            .registry
            .all_of_namespace::<MasterEntity>(Namespace::OBJECT_MANAGER)
            .into_iter()
            .filter(|m| !m.is_deleted() && m.name() == name && type_matches(m.object_type()))
            .filter(|m| instance.map_or(true, |i| m.instance() == Some(i)))
            .map(|m| m.oid())
            .min();
        if resident.is_some() {
            return Ok(resident);
        }

        let Some(oid) = self.store.find_named(name, object_type)? else {
            return Ok(None);
        };
        match instance {
            None => Ok(Some(oid)),
            Some(instance) => Ok(self
                .store
                .load_master(oid)?
                .filter(|r| r.instance == Some(instance))
                .map(|r| r.oid)),
        }
    }

    /// Status of a resident object, or of a stored one with nothing loaded.
    pub fn object_status(&self, oid: ObjectId) -> LifecycleResult<Option<ObjectStatus>> {
        if let Some(master) = self.registry.master(oid) {
            return Ok(Some(ObjectStatus {
                oid,
                name: master.name(),
                object_type: master.object_type(),
                persistent: master.is_persistent(),
                namespaces: master.namespaces(),
                loaded_namespaces: master.loaded(),
            }));
        }
        Ok(self.store.load_master(oid)?.map(|record| ObjectStatus {
            oid,
            name: record.name,
            object_type: record.object_type,
            persistent: record.persistent,
            namespaces: record.namespaces,
            loaded_namespaces: NamespaceSet::EMPTY,
        }))
    }

    /// Move a resident object into an instance, loading the instance first if
    /// needed. `Push` remembers where the object came from; `Pop` returns it
    /// there unless a destination is given.
    pub fn object_instance_entry(
        &self,
        oid: ObjectId,
        destination: Option<InstanceEntry>,
        flag: EntryFlag,
        restore: Option<InstanceEntry>,
    ) -> LifecycleResult<()> {
        let master = self.registered(oid)?;
        let previous = master.instance();

        let mut location = match self.store.load_location(oid)? {
            Some(location) => location,
            None => WorldLocation::new(
                previous.unwrap_or(ObjectId::NONE),
                Vec3::ZERO,
                Quat::IDENTITY,
            ),
        };

        let target = match flag {
            EntryFlag::None => destination,
            EntryFlag::Push => {
                let here = restore.unwrap_or_else(|| location.entry());
                if !here.instance.is_none() {
                    location.restore_stack.push(here);
                }
                destination
            }
            EntryFlag::Pop => {
                let popped = location.restore_stack.pop();
                destination.or(popped)
            }
        }
        .ok_or_else(|| LifecycleError::Internal(format!("no destination for {oid}")))?;

        self.ensure_instance_loaded(target.instance)?;

        location.instance = target.instance;
        location.loc = target.loc;
        location.orient = target.orient;
        if master.is_persistent() {
            self.store.save_location(oid, &location)?;
        }
        master.set_instance(Some(target.instance));
        master.set_dirty(true);

        let object_type = master.object_type();
        if let Some(old) = previous.filter(|old| *old != target.instance) {
            self.instances.remove_content(old, oid);
            self.bus.publish(LifecycleMessage::Despawned {
                oid,
                instance: old,
                object_type,
            });
        }
        if previous != Some(target.instance) {
            self.instances.add_content(target.instance, oid);
            self.bus.publish(LifecycleMessage::Spawned {
                oid,
                instance: target.instance,
                object_type,
            });
        }
        tracing::info!(%oid, instance = %target.instance, ?flag, "instance entry");
        Ok(())
    }
}
