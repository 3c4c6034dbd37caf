//! Object lifecycle coordinator
//!
//! Drives generate, load, unload and delete of a distributed object across
//! every namespace it declares. Each namespace is owned by a plugin reached
//! only through per-namespace bus requests; the coordinator itself keeps the
//! master entity, the template registry and the per-instance bookkeeping.
//!
//! Partial failures are reported, never compensated: a failed generate
//! leaves the sub-objects created before the failure in place, and unload
//! and delete keep going past a failing namespace.

mod data;
mod dependency;
mod gates;
mod generate;
mod instances;
mod load;
mod service;
mod teardown;

pub use dependency::{DependencyTable, Resolution};
use gates::LoadGates;
pub use instances::{InstanceDirectory, InstanceState, InstanceStatus};

use crate::messages::{LifecycleMessage, LifecycleReply};
use crate::persistence::PersistenceStore;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::Arc;
use tessera_bus::MessageBus;
use tessera_core::{
    EntityRegistry, LifecycleError, LifecycleResult, MasterEntity, Namespace, ObjectId,
    ObjectIdAllocator, Template,
};
use tessera_metrics::{Counter, OperationProfiler};

pub struct ObjectManager {
    bus: MessageBus<LifecycleMessage>,
    registry: Arc<EntityRegistry>,
    store: Arc<dyn PersistenceStore>,
    templates: RwLock<BTreeMap<String, Template>>,
    ids: ObjectIdAllocator,
    instances: InstanceDirectory,
    load_gates: LoadGates,
    counters: Counter,
    profiler: OperationProfiler,
}

impl ObjectManager {
    /// Build a coordinator. Ids are allocated from `first_object_id` or from
    /// just past the highest id in the store, whichever is larger.
    pub fn new(
        bus: MessageBus<LifecycleMessage>,
        registry: Arc<EntityRegistry>,
        store: Arc<dyn PersistenceStore>,
        first_object_id: u64,
    ) -> LifecycleResult<Arc<Self>> {
        let stored = store.max_oid()?.map_or(0, |oid| oid.raw());
        let first = first_object_id.max(stored + 1);
        tracing::info!(first_object_id = first, "object manager ready");

        Ok(Arc::new(Self {
            bus,
            registry,
            store,
            templates: RwLock::new(BTreeMap::new()),
            ids: ObjectIdAllocator::starting_at(first),
            instances: InstanceDirectory::new(),
            load_gates: LoadGates::new(),
            counters: Counter::new(),
            profiler: OperationProfiler::new(),
        }))
    }

    pub fn bus(&self) -> &MessageBus<LifecycleMessage> {
        &self.bus
    }

    pub fn registry(&self) -> &Arc<EntityRegistry> {
        &self.registry
    }

    pub fn store(&self) -> &Arc<dyn PersistenceStore> {
        &self.store
    }

    pub fn instances(&self) -> &InstanceDirectory {
        &self.instances
    }

    pub fn counters(&self) -> &Counter {
        &self.counters
    }

    pub fn profiler(&self) -> &OperationProfiler {
        &self.profiler
    }

    pub fn master(&self, oid: ObjectId) -> Option<Arc<MasterEntity>> {
        self.registry.master(oid)
    }

    // ------------------------------------------------------------------------
    // Templates
    // ------------------------------------------------------------------------

    pub fn register_template(&self, template: Template) -> LifecycleResult<()> {
        let name = template
            .name()
            .ok_or_else(|| LifecycleError::Internal("template has no name".into()))?
            .to_string();
        let mut templates = self.templates.write();
        if templates.contains_key(&name) {
            return Err(LifecycleError::DuplicateTemplate { name });
        }
        tracing::debug!(template = %name, "template registered");
        templates.insert(name, template);
        Ok(())
    }

    pub fn get_template(&self, name: &str) -> Option<Template> {
        self.templates.read().get(name).cloned()
    }

    pub fn template_names(&self) -> Vec<String> {
        self.templates.read().keys().cloned().collect()
    }

    // ------------------------------------------------------------------------
    // Plugin calls
    // ------------------------------------------------------------------------

    /// Send a fan-out request; a bus failure reads as no reply.
    fn call(&self, message: LifecycleMessage) -> Option<LifecycleReply> {
        let kind = message.kind();
        let namespace = message.namespace();
        match self.bus.send(message) {
            Ok(reply) => Some(reply),
            Err(err) => {
                tracing::warn!(?kind, ?namespace, error = %err, "plugin request failed");
                None
            }
        }
    }

    fn call_ack(&self, message: LifecycleMessage) -> bool {
        self.call(message).is_some_and(|r| r.is_ack())
    }

    /// Loads currently running.
    pub fn loads_in_flight(&self) -> usize {
        self.load_gates.in_flight()
    }

    /// Keep instance bookkeeping in step with a master's current namespaces.
    fn track_membership(&self, master: &MasterEntity) {
        let oid = master.oid();
        if master.namespaces().contains(Namespace::INSTANCE) {
            self.instances.ensure(oid);
        }
        let Some(instance) = master.instance() else {
            return;
        };
        if instance == oid || master.is_player() {
            return;
        }
        if master.loaded().contains(Namespace::WORLD_MANAGER) {
            if !self.instances.add_content(instance, oid) {
                tracing::debug!(%oid, %instance, "containing instance is not tracked");
            }
        } else {
            self.instances.remove_content(instance, oid);
        }
    }
}
