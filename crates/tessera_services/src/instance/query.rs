use super::InstanceCoordinator;
use crate::messages::{info_fields, InstanceInfo, InstanceRef};
use tessera_asset::{FieldMask, MarkerInfo, RegionInfo};
use tessera_core::{LifecycleResult, ObjectId, ObjectType};

impl InstanceCoordinator {
    /// A marker of a loaded instance, projected onto `mask`.
    pub fn get_marker(&self, instance: ObjectId, name: &str, mask: FieldMask) -> Option<MarkerInfo> {
        self.record(instance)?.world()?.marker_info(name, mask)
    }

    pub fn get_region(&self, instance: ObjectId, name: &str, mask: FieldMask) -> Option<RegionInfo> {
        self.record(instance)?.world()?.region_info(name, mask)
    }

    /// Id of an instance by id or name; loaded instances first, then the store.
    pub fn resolve_instance(&self, target: &InstanceRef) -> LifecycleResult<Option<ObjectId>> {
        match target {
            InstanceRef::Oid(oid) => Ok(Some(*oid)),
            InstanceRef::Name(name) => match self.find_loaded(name) {
                Some(record) => Ok(Some(record.oid())),
                None => Ok(self
                    .objects
                    .store()
                    .find_named(name, Some(ObjectType::Instance))?),
            },
        }
    }

    /// Describe an instance. Fields outside `mask` stay `None`; an instance
    /// that is only stored reports `loaded: false` and its stored name.
    pub fn get_instance_info(
        &self,
        target: &InstanceRef,
        mask: FieldMask,
    ) -> LifecycleResult<Option<InstanceInfo>> {
        let Some(oid) = self.resolve_instance(target)? else {
            return Ok(None);
        };
        let wants = |field| mask.contains(field);

        let Some(record) = self.record(oid) else {
            return Ok(self.objects.store().load_master(oid)?.map(|stored| InstanceInfo {
                oid,
                loaded: false,
                name: wants(info_fields::NAME).then_some(stored.name),
                template_name: stored.template_name.filter(|_| wants(info_fields::TEMPLATE_NAME)),
                ..InstanceInfo::default()
            }));
        };

        let props = record.props();
        Ok(Some(InstanceInfo {
            oid,
            loaded: true,
            name: props.name.filter(|_| wants(info_fields::NAME)),
            template_name: props.template_name.filter(|_| wants(info_fields::TEMPLATE_NAME)),
            phase: wants(info_fields::PHASE).then(|| record.phase()),
            world_file: props.world_file.filter(|_| wants(info_fields::WORLD_FILE)),
            worker: props.worker.filter(|_| wants(info_fields::WORKER)),
            population: wants(info_fields::POPULATION).then(|| record.population()),
            content: wants(info_fields::CONTENT)
                .then(|| self.objects.instances().content(oid).len()),
        }))
    }

    /// Apply a spawn (+1) or despawn (-1) of a player to `instance`.
    pub fn apply_population(&self, instance: ObjectId, delta: i64) -> Option<i64> {
        let record = self.record(instance)?;
        let population = record.add_population(delta);
        if let Some(worker) = record.props().worker {
            self.workers.track(&worker, delta);
        }
        tracing::debug!(%instance, population, "population changed");
        let callback = self.population_callback.read().clone();
        if let Some(callback) = callback {
            callback(instance, population);
        }
        Some(population)
    }
}
