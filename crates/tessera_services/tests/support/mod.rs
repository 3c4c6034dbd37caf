#![allow(dead_code)]

use parking_lot::Mutex;
use std::sync::Arc;
use tessera_core::{LifecycleResult, Namespace, ObjectId, Template};
use tessera_services::plugin::{Deleter, Generator, Loader, Saver, Unloader};
use tessera_services::{PropertyBagPlugin, Services, Settings};

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Phase {
    Generate,
    DepsReady,
    Load,
    Unload,
    Delete,
    Save,
}

pub type EventLog = Arc<Mutex<Vec<(Phase, Namespace, ObjectId)>>>;

/// Property-bag plugin that records every call it answers.
pub struct RecordingPlugin {
    inner: PropertyBagPlugin,
    log: EventLog,
}

impl RecordingPlugin {
    fn record(&self, phase: Phase, ns: Namespace, oid: ObjectId) {
        self.log.lock().push((phase, ns, oid));
    }
}

impl Generator for RecordingPlugin {
    fn generate(
        &self,
        oid: ObjectId,
        namespace: Namespace,
        template: &Template,
        persistent: bool,
    ) -> LifecycleResult<Vec<Namespace>> {
        self.record(Phase::Generate, namespace, oid);
        self.inner.generate(oid, namespace, template, persistent)
    }

    fn dependencies_ready(&self, oid: ObjectId, namespace: Namespace) -> LifecycleResult<()> {
        self.record(Phase::DepsReady, namespace, oid);
        self.inner.dependencies_ready(oid, namespace)
    }
}

impl Loader for RecordingPlugin {
    fn load(&self, oid: ObjectId, namespace: Namespace, data: Option<&[u8]>) -> LifecycleResult<()> {
        self.record(Phase::Load, namespace, oid);
        self.inner.load(oid, namespace, data)
    }
}

impl Unloader for RecordingPlugin {
    fn unload(&self, oid: ObjectId, namespace: Namespace) -> LifecycleResult<()> {
        self.record(Phase::Unload, namespace, oid);
        self.inner.unload(oid, namespace)
    }
}

impl Deleter for RecordingPlugin {
    fn delete(&self, oid: ObjectId, namespace: Namespace) -> LifecycleResult<()> {
        self.record(Phase::Delete, namespace, oid);
        self.inner.delete(oid, namespace)
    }
}

impl Saver for RecordingPlugin {
    fn save(&self, oid: ObjectId, namespace: Namespace) -> LifecycleResult<Option<Vec<u8>>> {
        self.record(Phase::Save, namespace, oid);
        self.inner.save(oid, namespace)
    }
}

pub fn settings() -> Settings {
    let mut settings = Settings::default();
    settings.workers.epoch = Some(1);
    settings.bus.broadcast_timeout_ms = Some(5_000);
    settings.world.home_dir = std::env::temp_dir();
    settings
}

/// Services with recording plugins on the given namespaces.
pub fn services(namespaces: &[Namespace]) -> (Services, EventLog) {
    let services = Services::start(&settings()).expect("services start");
    let log: EventLog = Arc::new(Mutex::new(Vec::new()));
    for ns in namespaces {
        let plugin = RecordingPlugin {
            inner: PropertyBagPlugin::new(*ns, services.registry.clone()),
            log: log.clone(),
        };
        services.plugins.register(*ns, Arc::new(plugin));
    }
    (services, log)
}

pub fn count(log: &EventLog, phase: Phase, ns: Namespace, oid: ObjectId) -> usize {
    log.lock()
        .iter()
        .filter(|event| **event == (phase, ns, oid))
        .count()
}

pub fn position(log: &EventLog, phase: Phase, ns: Namespace, oid: ObjectId) -> Option<usize> {
    log.lock().iter().position(|event| *event == (phase, ns, oid))
}

/// Poll `check` for up to two seconds.
pub fn eventually(mut check: impl FnMut() -> bool) -> bool {
    for _ in 0..200 {
        if check() {
            return true;
        }
        std::thread::sleep(std::time::Duration::from_millis(10));
    }
    false
}
