//! Service wiring
//!
//! Builds one running set of coordinators from [`Settings`]: the bus, the
//! entity registry, the plugin host, both coordinators and the worker
//! directory, all attached to the bus.

use crate::instance::{InstanceCoordinator, SpawnGeneratorRegistry, WorldLoaderRegistry};
use crate::messages::LifecycleMessage;
use crate::object_manager::ObjectManager;
use crate::persistence::{MemoryStore, PersistenceStore};
use crate::plugin::PluginHost;
use crate::property_bag::PropertyBagPlugin;
use crate::settings::Settings;
use crate::workers::WorkerDirectory;
use std::sync::Arc;
use tessera_bus::{BusError, MessageBus, SubscriptionId};
use tessera_core::{EntityRegistry, LifecycleError, Namespace};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StartError {
    #[error(transparent)]
    Bus(#[from] BusError),

    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),
}

pub struct Services {
    pub bus: MessageBus<LifecycleMessage>,
    pub registry: Arc<EntityRegistry>,
    pub store: Arc<dyn PersistenceStore>,
    pub plugins: PluginHost,
    pub workers: Arc<WorkerDirectory>,
    pub objects: Arc<ObjectManager>,
    pub instances: Arc<InstanceCoordinator>,
    subscriptions: Vec<SubscriptionId>,
}

impl Services {
    /// Start with an in-memory store and empty registries.
    pub fn start(settings: &Settings) -> Result<Self, StartError> {
        Self::start_with(
            settings,
            Arc::new(MemoryStore::new()),
            SpawnGeneratorRegistry::new(),
            WorldLoaderRegistry::new(),
        )
    }

    pub fn start_with(
        settings: &Settings,
        store: Arc<dyn PersistenceStore>,
        spawn_generators: SpawnGeneratorRegistry,
        world_loaders: WorldLoaderRegistry,
    ) -> Result<Self, StartError> {
        let bus = MessageBus::new(settings.bus.clone())?;
        let registry = Arc::new(EntityRegistry::new());

        let epoch = settings.epoch();
        let workers = Arc::new(WorkerDirectory::new(epoch));
        for name in &settings.workers.local {
            workers.register(name.as_str(), settings.workers.hosting_kind.as_str(), epoch);
        }

        let objects = ObjectManager::new(
            bus.clone(),
            registry.clone(),
            store.clone(),
            settings.objects.first_object_id,
        )?;
        let instances = InstanceCoordinator::new(
            objects.clone(),
            workers.clone(),
            settings.workers.hosting_kind.clone(),
            settings.path_variables(),
            spawn_generators,
            world_loaders,
        );

        let plugins = PluginHost::new(bus.clone());
        instances.register_plugin(&plugins);

        let mut subscriptions = vec![objects.attach()];
        subscriptions.extend(instances.attach());

        tracing::info!(
            epoch,
            workers = settings.workers.local.len(),
            world = %settings.world.world_name,
            "services started"
        );
        Ok(Self {
            bus,
            registry,
            store,
            plugins,
            workers,
            objects,
            instances,
            subscriptions,
        })
    }

    /// Host `ns` with the generic property-bag plugin.
    pub fn host_property_bag(&self, ns: Namespace) -> Arc<PropertyBagPlugin> {
        let plugin = Arc::new(PropertyBagPlugin::new(ns, self.registry.clone()));
        self.plugins.register(ns, plugin.clone());
        plugin
    }

    /// Log counters and operation timings collected so far.
    pub fn report_metrics(&self) {
        for (name, value) in self.objects.counters().snapshot() {
            tracing::info!(counter = name, value, "lifecycle counter");
        }
        for (name, timing) in self.objects.profiler().snapshot() {
            tracing::info!(
                operation = name,
                calls = timing.calls,
                mean_us = timing.mean().as_micros() as u64,
                max_us = timing.max.as_micros() as u64,
                "lifecycle timing"
            );
        }
    }

    /// Detach both coordinators from the bus.
    pub fn shutdown(mut self) {
        for id in self.subscriptions.drain(..) {
            self.bus.unsubscribe(id);
        }
        for ns in self.plugins.namespaces() {
            self.plugins.unregister(ns);
        }
        tracing::info!("services stopped");
    }
}
