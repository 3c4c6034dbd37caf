//! Creation templates
//!
//! A template is an ordered property bag keyed by (namespace, property name).
//! Coordinators merge a caller-supplied override onto a registered base
//! template and hand each plugin only the slice for its own namespace.

use crate::{Namespace, NamespaceSet, ObjectId};
use glam::{Quat, Vec3};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Well-known property names.
pub mod props {
    use crate::Namespace;

    /// `TRANSIENT`: bool, store the object.
    pub const PERSISTENT: (Namespace, &str) = (Namespace::TRANSIENT, "persistent");
    /// `OBJECT_MANAGER`: display name of the master entity.
    pub const NAME: (Namespace, &str) = (Namespace::OBJECT_MANAGER, "name");
    /// `OBJECT_MANAGER`: [`crate::ObjectType`] name.
    pub const OBJECT_TYPE: (Namespace, &str) = (Namespace::OBJECT_MANAGER, "objectType");
    /// `WORLD_MANAGER`: containing instance id.
    pub const INSTANCE: (Namespace, &str) = (Namespace::WORLD_MANAGER, "instance");
    pub const LOC: (Namespace, &str) = (Namespace::WORLD_MANAGER, "loc");
    pub const ORIENT: (Namespace, &str) = (Namespace::WORLD_MANAGER, "orient");

    pub const WORLD_FILE: (Namespace, &str) = (Namespace::INSTANCE, "worldFile");
    pub const INIT_SCRIPT: (Namespace, &str) = (Namespace::INSTANCE, "initScript");
    pub const LOAD_SCRIPT: (Namespace, &str) = (Namespace::INSTANCE, "loadScript");
    pub const INSTANCE_NAME: (Namespace, &str) = (Namespace::INSTANCE, "name");
    pub const UNIQUE_NAME: (Namespace, &str) = (Namespace::INSTANCE, "uniqueName");
    /// `INSTANCE`: name of the hosting world-manager worker.
    pub const HOSTING_WORKER: (Namespace, &str) = (Namespace::INSTANCE, "worldManager");
    pub const LOADER_OVERRIDE: (Namespace, &str) = (Namespace::INSTANCE, "loaderOverride");
    pub const TEMPLATE_NAME: (Namespace, &str) = (Namespace::INSTANCE, "templateName");
}

/// Typed template value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value")]
pub enum PropertyValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Point(Vec3),
    Orient(Quat),
    Oid(ObjectId),
    List(Vec<PropertyValue>),
}

impl From<bool> for PropertyValue {
    fn from(v: bool) -> Self {
        PropertyValue::Bool(v)
    }
}

impl From<i64> for PropertyValue {
    fn from(v: i64) -> Self {
        PropertyValue::Int(v)
    }
}

impl From<f64> for PropertyValue {
    fn from(v: f64) -> Self {
        PropertyValue::Float(v)
    }
}

impl From<&str> for PropertyValue {
    fn from(v: &str) -> Self {
        PropertyValue::Str(v.to_string())
    }
}

impl From<String> for PropertyValue {
    fn from(v: String) -> Self {
        PropertyValue::Str(v)
    }
}

impl From<Vec3> for PropertyValue {
    fn from(v: Vec3) -> Self {
        PropertyValue::Point(v)
    }
}

impl From<Quat> for PropertyValue {
    fn from(v: Quat) -> Self {
        PropertyValue::Orient(v)
    }
}

impl From<ObjectId> for PropertyValue {
    fn from(v: ObjectId) -> Self {
        PropertyValue::Oid(v)
    }
}

impl PropertyValue {
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            PropertyValue::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            PropertyValue::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            PropertyValue::Str(v) => Some(v.as_str()),
            _ => None,
        }
    }

    pub fn as_point(&self) -> Option<Vec3> {
        match self {
            PropertyValue::Point(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_orient(&self) -> Option<Quat> {
        match self {
            PropertyValue::Orient(v) => Some(*v),
            _ => None,
        }
    }

    /// Object ids may be written either as `Oid` or as a raw `Int`.
    pub fn as_oid(&self) -> Option<ObjectId> {
        match self {
            PropertyValue::Oid(v) => Some(*v),
            PropertyValue::Int(v) if *v > 0 => Some(ObjectId::from_raw(*v as u64)),
            _ => None,
        }
    }
}

type PropertyMap = BTreeMap<String, PropertyValue>;

/// Namespace-scoped property bag used to parametrize object creation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Template {
    name: Option<String>,
    properties: BTreeMap<Namespace, PropertyMap>,
}

impl Template {
    /// Anonymous template, typically used as an override.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            properties: BTreeMap::new(),
        }
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = Some(name.into());
    }

    /// Builder-style [`Template::put`].
    pub fn with(mut self, ns: Namespace, key: &str, value: impl Into<PropertyValue>) -> Self {
        self.put(ns, key, value);
        self
    }

    pub fn put(&mut self, ns: Namespace, key: &str, value: impl Into<PropertyValue>) {
        self.properties
            .entry(ns)
            .or_default()
            .insert(key.to_string(), value.into());
    }

    /// Declare a namespace without giving it any properties.
    pub fn declare(&mut self, ns: Namespace) {
        self.properties.entry(ns).or_default();
    }

    pub fn remove(&mut self, ns: Namespace, key: &str) -> Option<PropertyValue> {
        self.properties.get_mut(&ns)?.remove(key)
    }

    pub fn get(&self, ns: Namespace, key: &str) -> Option<&PropertyValue> {
        self.properties.get(&ns)?.get(key)
    }

    pub fn get_bool(&self, ns: Namespace, key: &str) -> Option<bool> {
        self.get(ns, key)?.as_bool()
    }

    pub fn get_int(&self, ns: Namespace, key: &str) -> Option<i64> {
        self.get(ns, key)?.as_int()
    }

    pub fn get_str(&self, ns: Namespace, key: &str) -> Option<&str> {
        self.get(ns, key)?.as_str()
    }

    pub fn get_point(&self, ns: Namespace, key: &str) -> Option<Vec3> {
        self.get(ns, key)?.as_point()
    }

    pub fn get_orient(&self, ns: Namespace, key: &str) -> Option<Quat> {
        self.get(ns, key)?.as_orient()
    }

    pub fn get_oid(&self, ns: Namespace, key: &str) -> Option<ObjectId> {
        self.get(ns, key)?.as_oid()
    }

    /// Shorthand for the `(namespace, key)` constants in [`props`].
    pub fn prop(&self, key: (Namespace, &str)) -> Option<&PropertyValue> {
        self.get(key.0, key.1)
    }

    pub fn properties(&self, ns: Namespace) -> impl Iterator<Item = (&str, &PropertyValue)> {
        self.properties
            .get(&ns)
            .into_iter()
            .flat_map(|map| map.iter().map(|(k, v)| (k.as_str(), v)))
    }

    /// Namespaces present in the template, whether or not they carry properties.
    pub fn namespaces(&self) -> NamespaceSet {
        self.properties.keys().copied().collect()
    }

    pub fn has_namespace(&self, ns: Namespace) -> bool {
        self.properties.contains_key(&ns)
    }

    pub fn is_empty(&self) -> bool {
        self.properties.is_empty()
    }

    /// Overlay `overrides` on a copy of `self`; override values win per property.
    ///
    /// The result keeps this template's name.
    pub fn merge(&self, overrides: &Template) -> Template {
        let mut merged = self.clone();
        for (ns, props) in &overrides.properties {
            let target = merged.properties.entry(*ns).or_default();
            for (key, value) in props {
                target.insert(key.clone(), value.clone());
            }
        }
        merged
    }

    /// Project onto one namespace. The namespace is kept (possibly empty)
    /// even when this template has no properties for it.
    pub fn restrict(&self, ns: Namespace) -> Template {
        let mut properties = BTreeMap::new();
        properties.insert(ns, self.properties.get(&ns).cloned().unwrap_or_default());
        Template {
            name: self.name.clone(),
            properties,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chest() -> Template {
        Template::named("Chest")
            .with(Namespace::WORLD_MANAGER, "loc", Vec3::ZERO)
            .with(Namespace::INVENTORY, "slots", 12i64)
            .with(Namespace::TRANSIENT, "persistent", true)
    }

    #[test]
    fn merge_prefers_override() {
        let overrides = Template::new()
            .with(Namespace::WORLD_MANAGER, "loc", Vec3::new(10.0, 0.0, 10.0))
            .with(Namespace::WORLD_MANAGER, "instance", ObjectId::from_raw(7));

        let merged = chest().merge(&overrides);
        assert_eq!(merged.name(), Some("Chest"));
        assert_eq!(
            merged.get_point(Namespace::WORLD_MANAGER, "loc"),
            Some(Vec3::new(10.0, 0.0, 10.0))
        );
        assert_eq!(merged.get_oid(Namespace::WORLD_MANAGER, "instance"), Some(ObjectId::from_raw(7)));
        assert_eq!(merged.get_int(Namespace::INVENTORY, "slots"), Some(12));
    }

    #[test]
    fn restrict_keeps_only_one_namespace() {
        let only_inv = chest().restrict(Namespace::INVENTORY);
        assert_eq!(only_inv.namespaces().to_vec(), vec![Namespace::INVENTORY]);
        assert!(only_inv.get(Namespace::WORLD_MANAGER, "loc").is_none());

        let absent = chest().restrict(Namespace::VOICE);
        assert!(absent.has_namespace(Namespace::VOICE));
        assert_eq!(absent.properties(Namespace::VOICE).count(), 0);
    }

    #[test]
    fn oid_accepts_raw_integers() {
        let t = Template::new().with(Namespace::WORLD_MANAGER, "instance", 9i64);
        assert_eq!(t.get_oid(Namespace::WORLD_MANAGER, "instance"), Some(ObjectId::from_raw(9)));
    }

    #[test]
    fn serializes_through_json() {
        let json = serde_json::to_string(&chest()).expect("serialize");
        let back: Template = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, chest());
    }
}
