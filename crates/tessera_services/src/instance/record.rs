//! Plugin-side instance record
//!
//! The `INSTANCE` namespace of an instance object. Holds the properties the
//! instance was created with, its phase, the parsed world file once loaded,
//! and the player population. Only the properties are persisted.

use crate::messages::InstancePhase;
use crate::plugin::{Deleter, Generator, Loader, Saver, Unloader};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use tessera_asset::WorldFile;
use tessera_core::{
    props, EntityRegistry, LifecycleError, LifecycleResult, Namespace, ObjectId, PropertyValue,
    Template,
};

/// Persisted instance properties, paths already expanded.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InstanceProps {
    pub name: Option<String>,
    pub template_name: Option<String>,
    pub world_file: Option<String>,
    pub init_script: Option<String>,
    pub load_script: Option<String>,
    pub loader_override: Option<String>,
    pub worker: Option<String>,
}

impl InstanceProps {
    pub fn from_template(template: &Template) -> Self {
        let text = |key| {
            template
                .prop(key)
                .and_then(PropertyValue::as_str)
                .map(String::from)
        };
        Self {
            name: text(props::INSTANCE_NAME),
            template_name: text(props::TEMPLATE_NAME),
            world_file: text(props::WORLD_FILE),
            init_script: text(props::INIT_SCRIPT),
            load_script: text(props::LOAD_SCRIPT),
            loader_override: text(props::LOADER_OVERRIDE),
            worker: text(props::HOSTING_WORKER),
        }
    }
}

pub struct InstanceRecord {
    oid: ObjectId,
    props: Mutex<InstanceProps>,
    phase: Mutex<InstancePhase>,
    world: RwLock<Option<Arc<WorldFile>>>,
    population: AtomicI64,
}

impl InstanceRecord {
    pub fn new(oid: ObjectId, props: InstanceProps, phase: InstancePhase) -> Self {
        Self {
            oid,
            props: Mutex::new(props),
            phase: Mutex::new(phase),
            world: RwLock::new(None),
            population: AtomicI64::new(0),
        }
    }

    pub fn oid(&self) -> ObjectId {
        self.oid
    }

    pub fn props(&self) -> InstanceProps {
        self.props.lock().clone()
    }

    pub fn name(&self) -> Option<String> {
        self.props.lock().name.clone()
    }

    pub fn set_worker(&self, worker: Option<String>) {
        self.props.lock().worker = worker;
    }

    pub fn phase(&self) -> InstancePhase {
        *self.phase.lock()
    }

    pub fn set_phase(&self, phase: InstancePhase) {
        *self.phase.lock() = phase;
    }

    /// Move from `from` to `to` atomically; `false` if the phase was not `from`.
    pub fn transition(&self, from: InstancePhase, to: InstancePhase) -> bool {
        let mut phase = self.phase.lock();
        if *phase != from {
            return false;
        }
        *phase = to;
        true
    }

    pub fn world(&self) -> Option<Arc<WorldFile>> {
        self.world.read().clone()
    }

    pub fn set_world(&self, world: Option<WorldFile>) {
        *self.world.write() = world.map(Arc::new);
    }

    pub fn population(&self) -> i64 {
        self.population.load(Ordering::Acquire)
    }

    /// Apply a signed delta and return the new population.
    pub fn add_population(&self, delta: i64) -> i64 {
        self.population.fetch_add(delta, Ordering::AcqRel) + delta
    }
}

/// Owner of the `INSTANCE` namespace.
pub struct InstancePlugin {
    registry: Arc<EntityRegistry>,
}

impl InstancePlugin {
    pub fn new(registry: Arc<EntityRegistry>) -> Self {
        Self { registry }
    }

    fn record(&self, oid: ObjectId) -> LifecycleResult<Arc<InstanceRecord>> {
        self.registry
            .lookup::<InstanceRecord>(oid, Namespace::INSTANCE)
            .ok_or(LifecycleError::NotInstance { oid })
    }

    fn install(&self, record: InstanceRecord) {
        let oid = record.oid;
        if !self.registry.register(oid, Namespace::INSTANCE, Arc::new(record)) {
            tracing::debug!(%oid, "instance record already resident");
        }
    }
}

impl Generator for InstancePlugin {
    fn generate(
        &self,
        oid: ObjectId,
        _namespace: Namespace,
        template: &Template,
        _persistent: bool,
    ) -> LifecycleResult<Vec<Namespace>> {
        let props = InstanceProps::from_template(template);
        tracing::debug!(%oid, name = ?props.name, "instance record created");
        self.install(InstanceRecord::new(oid, props, InstancePhase::Generate));
        Ok(Vec::new())
    }
}

impl Loader for InstancePlugin {
    fn load(&self, oid: ObjectId, _namespace: Namespace, data: Option<&[u8]>) -> LifecycleResult<()> {
        let props = match data {
            Some(bytes) => serde_json::from_slice(bytes).map_err(|e| LifecycleError::Codec {
                oid,
                reason: e.to_string(),
            })?,
            None => InstanceProps::default(),
        };
        self.install(InstanceRecord::new(oid, props, InstancePhase::Load));
        Ok(())
    }
}

impl Unloader for InstancePlugin {
    fn unload(&self, oid: ObjectId, namespace: Namespace) -> LifecycleResult<()> {
        self.registry.unregister(oid, namespace);
        Ok(())
    }
}

impl Deleter for InstancePlugin {
    fn delete(&self, oid: ObjectId, namespace: Namespace) -> LifecycleResult<()> {
        self.registry.unregister(oid, namespace);
        Ok(())
    }
}

impl Saver for InstancePlugin {
    fn save(&self, oid: ObjectId, _namespace: Namespace) -> LifecycleResult<Option<Vec<u8>>> {
        let props = self.record(oid)?.props();
        let bytes = serde_json::to_vec(&props).map_err(|e| LifecycleError::Codec {
            oid,
            reason: e.to_string(),
        })?;
        Ok(Some(bytes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn props_read_instance_namespace() {
        let template = Template::named("Dungeon")
            .with(Namespace::INSTANCE, "name", "Crypt")
            .with(Namespace::INSTANCE, "worldFile", "/worlds/crypt.json")
            .with(Namespace::INSTANCE, "worldManager", "wm-2");
        let props = InstanceProps::from_template(&template);
        assert_eq!(props.name.as_deref(), Some("Crypt"));
        assert_eq!(props.world_file.as_deref(), Some("/worlds/crypt.json"));
        assert_eq!(props.worker.as_deref(), Some("wm-2"));
        assert!(props.init_script.is_none());
    }

    #[test]
    fn phase_transition_is_check_and_set() {
        let record = InstanceRecord::new(ObjectId::from_raw(1), InstanceProps::default(), InstancePhase::Available);
        assert!(record.transition(InstancePhase::Available, InstancePhase::Unload));
        assert!(!record.transition(InstancePhase::Available, InstancePhase::Delete));
        assert_eq!(record.phase(), InstancePhase::Unload);
    }

    #[test]
    fn population_deltas_accumulate() {
        let record = InstanceRecord::new(ObjectId::from_raw(1), InstanceProps::default(), InstancePhase::Available);
        assert_eq!(record.add_population(1), 1);
        assert_eq!(record.add_population(1), 2);
        assert_eq!(record.add_population(-1), 1);
        assert_eq!(record.population(), 1);
    }

    #[test]
    fn saved_props_reload() {
        let registry = Arc::new(EntityRegistry::new());
        let plugin = InstancePlugin::new(registry.clone());
        let oid = ObjectId::from_raw(4);
        let template = Template::new().with(Namespace::INSTANCE, "name", "Keep");

        plugin.generate(oid, Namespace::INSTANCE, &template, true).unwrap();
        let bytes = plugin.save(oid, Namespace::INSTANCE).unwrap().unwrap();
        plugin.unload(oid, Namespace::INSTANCE).unwrap();
        assert!(plugin.record(oid).is_err());

        plugin.load(oid, Namespace::INSTANCE, Some(&bytes)).unwrap();
        let record = plugin.record(oid).unwrap();
        assert_eq!(record.name().as_deref(), Some("Keep"));
        assert_eq!(record.phase(), InstancePhase::Load);
    }
}
