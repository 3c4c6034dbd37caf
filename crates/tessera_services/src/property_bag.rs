//! Generic in-memory plugin
//!
//! Keeps each sub-object as the namespace-restricted template it was created
//! from and persists it as JSON. Enough for namespaces whose owning service
//! only needs its properties back after a restart; richer plugins implement
//! the capability traits themselves.
//!
//! A sub-object declares dependencies through a `dependsOn` list property of
//! namespace names or numbers.

use crate::plugin::{Deleter, Generator, Loader, Saver, Unloader};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tessera_core::{
    EntityRegistry, LifecycleError, LifecycleResult, Namespace, ObjectId, PropertyValue, Template,
};

pub const DEPENDS_ON: &str = "dependsOn";

/// Sub-object kept by a [`PropertyBagPlugin`].
#[derive(Debug)]
pub struct PropertyBag {
    pub oid: ObjectId,
    pub namespace: Namespace,
    properties: Mutex<Template>,
    ready: AtomicBool,
}

impl PropertyBag {
    fn new(oid: ObjectId, namespace: Namespace, properties: Template, ready: bool) -> Self {
        Self {
            oid,
            namespace,
            properties: Mutex::new(properties),
            ready: AtomicBool::new(ready),
        }
    }

    pub fn properties(&self) -> Template {
        self.properties.lock().clone()
    }

    pub fn get(&self, key: &str) -> Option<PropertyValue> {
        self.properties.lock().get(self.namespace, key).cloned()
    }

    pub fn set(&self, key: &str, value: impl Into<PropertyValue>) {
        self.properties.lock().put(self.namespace, key, value);
    }

    /// Whether every declared dependency has been resolved.
    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }
}

pub struct PropertyBagPlugin {
    namespace: Namespace,
    registry: Arc<EntityRegistry>,
}

impl PropertyBagPlugin {
    pub fn new(namespace: Namespace, registry: Arc<EntityRegistry>) -> Self {
        Self {
            namespace,
            registry,
        }
    }

    pub fn namespace(&self) -> Namespace {
        self.namespace
    }

    pub fn get(&self, oid: ObjectId) -> Option<Arc<PropertyBag>> {
        self.registry.lookup::<PropertyBag>(oid, self.namespace)
    }

    fn install(&self, bag: PropertyBag) -> LifecycleResult<()> {
        let oid = bag.oid;
        if !self.registry.register(oid, self.namespace, Arc::new(bag)) {
            // A reload of something already resident keeps the resident copy
            tracing::debug!(%oid, namespace = %self.namespace, "sub-object already resident");
        }
        Ok(())
    }
}

pub fn declared_dependencies(template: &Template, ns: Namespace) -> Vec<Namespace> {
    let Some(PropertyValue::List(items)) = template.get(ns, DEPENDS_ON) else {
        return Vec::new();
    };
    items
        .iter()
        .filter_map(|item| match item {
            PropertyValue::Str(name) => Namespace::from_name(name),
            PropertyValue::Int(bit) => u8::try_from(*bit).ok().and_then(Namespace::from_bit),
            _ => None,
        })
        .collect()
}

impl Generator for PropertyBagPlugin {
    fn generate(
        &self,
        oid: ObjectId,
        namespace: Namespace,
        template: &Template,
        _persistent: bool,
    ) -> LifecycleResult<Vec<Namespace>> {
        let deps = declared_dependencies(template, namespace);
        let bag = PropertyBag::new(oid, namespace, template.restrict(namespace), deps.is_empty());
        self.install(bag)?;
        tracing::debug!(%oid, %namespace, deps = ?deps, "sub-object generated");
        Ok(deps)
    }

    fn dependencies_ready(&self, oid: ObjectId, namespace: Namespace) -> LifecycleResult<()> {
        let bag = self
            .get(oid)
            .ok_or(LifecycleError::UnknownObject { oid })?;
        bag.ready.store(true, Ordering::Release);
        tracing::debug!(%oid, %namespace, "sub-object dependencies ready");
        Ok(())
    }
}

impl Loader for PropertyBagPlugin {
    fn load(&self, oid: ObjectId, namespace: Namespace, data: Option<&[u8]>) -> LifecycleResult<()> {
        let properties = match data {
            Some(bytes) => serde_json::from_slice(bytes).map_err(|e| LifecycleError::Codec {
                oid,
                reason: e.to_string(),
            })?,
            None => Template::new(),
        };
        self.install(PropertyBag::new(oid, namespace, properties, true))
    }
}

impl Unloader for PropertyBagPlugin {
    fn unload(&self, oid: ObjectId, namespace: Namespace) -> LifecycleResult<()> {
        self.registry.unregister(oid, namespace);
        Ok(())
    }
}

impl Deleter for PropertyBagPlugin {
    fn delete(&self, oid: ObjectId, namespace: Namespace) -> LifecycleResult<()> {
        self.registry.unregister(oid, namespace);
        Ok(())
    }
}

impl Saver for PropertyBagPlugin {
    fn save(&self, oid: ObjectId, _namespace: Namespace) -> LifecycleResult<Option<Vec<u8>>> {
        let bag = self
            .get(oid)
            .ok_or(LifecycleError::UnknownObject { oid })?;
        let bytes = serde_json::to_vec(&bag.properties()).map_err(|e| LifecycleError::Codec {
            oid,
            reason: e.to_string(),
        })?;
        Ok(Some(bytes))
    }
}
