//! Instance lifecycle coordinator
//!
//! An instance is an object that declares the `INSTANCE` namespace: a world
//! partition with a world file, optional scripts, spawn generators and a set
//! of content objects. This module drives its state machine on top of the
//! object coordinator:
//!
//! ```text
//! GENERATE -> AVAILABLE <-> LOAD
//!             AVAILABLE  -> UNLOAD | DELETE -> gone
//! ```
//!
//! Only one busy transition runs per instance; conflicting requests get
//! `Retry` or `false` instead of waiting.

mod lifecycle;
mod names;
mod query;
mod record;
mod registries;
mod service;

pub use names::{NameReservation, NameReservations};
pub use record::{InstancePlugin, InstanceProps, InstanceRecord};
pub use registries::{
    JsonWorldLoader, ObjectSpawner, SpawnContext, SpawnGenerator, SpawnGeneratorFactory,
    SpawnGeneratorRegistry, WorldLoader, WorldLoaderRegistry,
};

use crate::messages::LifecycleMessage;
use crate::object_manager::ObjectManager;
use crate::plugin::PluginHost;
use crate::workers::WorkerDirectory;
use dashmap::DashMap;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::Arc;
use tessera_asset::PathVariables;
use tessera_bus::MessageBus;
use tessera_core::{LifecycleError, LifecycleResult, Namespace, ObjectId, Template};

/// Called with the instance and its new player population.
pub type PopulationCallback = Arc<dyn Fn(ObjectId, i64) + Send + Sync>;

pub struct InstanceCoordinator {
    objects: Arc<ObjectManager>,
    workers: Arc<WorkerDirectory>,
    worker_kind: String,
    paths: PathVariables,
    templates: RwLock<BTreeMap<String, Template>>,
    names: NameReservations,
    spawn_generators: SpawnGeneratorRegistry,
    world_loaders: WorldLoaderRegistry,
    spawners: DashMap<ObjectId, Vec<Box<dyn SpawnGenerator>>>,
    population_callback: RwLock<Option<PopulationCallback>>,
}

impl InstanceCoordinator {
    pub fn new(
        objects: Arc<ObjectManager>,
        workers: Arc<WorkerDirectory>,
        worker_kind: impl Into<String>,
        paths: PathVariables,
        spawn_generators: SpawnGeneratorRegistry,
        world_loaders: WorldLoaderRegistry,
    ) -> Arc<Self> {
        Arc::new(Self {
            objects,
            workers,
            worker_kind: worker_kind.into(),
            paths,
            templates: RwLock::new(BTreeMap::new()),
            names: NameReservations::new(),
            spawn_generators,
            world_loaders,
            spawners: DashMap::new(),
            population_callback: RwLock::new(None),
        })
    }

    /// Make `host` answer the `INSTANCE` namespace with this coordinator's
    /// records.
    pub fn register_plugin(&self, host: &PluginHost) {
        let plugin = Arc::new(InstancePlugin::new(self.objects.registry().clone()));
        host.register(Namespace::INSTANCE, plugin);
    }

    pub fn objects(&self) -> &Arc<ObjectManager> {
        &self.objects
    }

    pub fn workers(&self) -> &Arc<WorkerDirectory> {
        &self.workers
    }

    pub fn paths(&self) -> &PathVariables {
        &self.paths
    }

    pub fn spawn_generators(&self) -> &SpawnGeneratorRegistry {
        &self.spawn_generators
    }

    pub fn world_loaders(&self) -> &WorldLoaderRegistry {
        &self.world_loaders
    }

    pub fn set_population_callback(&self, callback: Option<PopulationCallback>) {
        *self.population_callback.write() = callback;
    }

    fn bus(&self) -> &MessageBus<LifecycleMessage> {
        self.objects.bus()
    }

    pub fn register_template(&self, template: Template) -> LifecycleResult<()> {
        let name = template
            .name()
            .ok_or_else(|| LifecycleError::Internal("instance template has no name".into()))?
            .to_string();
        let mut templates = self.templates.write();
        if templates.contains_key(&name) {
            return Err(LifecycleError::DuplicateTemplate { name });
        }
        tracing::debug!(template = %name, "instance template registered");
        templates.insert(name, template);
        Ok(())
    }

    pub fn get_template(&self, name: &str) -> Option<Template> {
        self.templates.read().get(name).cloned()
    }

    /// Resident record of a loaded instance.
    pub fn record(&self, instance: ObjectId) -> Option<Arc<InstanceRecord>> {
        self.objects
            .registry()
            .lookup::<InstanceRecord>(instance, Namespace::INSTANCE)
    }

    /// Hosting worker: the requested one, else the least-loaded worker of
    /// the configured kind in the current epoch.
    fn select_worker(&self, requested: Option<&str>) -> LifecycleResult<String> {
        if let Some(worker) = requested {
            return Ok(worker.to_string());
        }
        self.workers
            .least_loaded(&self.worker_kind)
            .ok_or_else(|| LifecycleError::NoWorkerAvailable {
                kind: self.worker_kind.clone(),
            })
    }
}
