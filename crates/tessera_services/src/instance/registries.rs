//! Spawn-generator and world-loader registries
//!
//! Both are plain values handed to the instance coordinator when it is
//! built, so two coordinators in one process never see each other's
//! classes.

use crate::object_manager::ObjectManager;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tessera_asset::{SpawnData, WorldFile, WorldFileError};
use tessera_core::{props, LifecycleResult, ObjectId, PropertyValue, Template};

/// Populates an instance from one world-file spawn entry.
pub trait SpawnGenerator: Send + Sync {
    /// Start spawning. Returns how many objects were created right away.
    fn activate(&mut self) -> LifecycleResult<usize>;

    /// Stop spawning; the instance is going away.
    fn deactivate(&mut self) {}
}

/// What a factory needs to build a generator.
pub struct SpawnContext<'a> {
    pub instance: ObjectId,
    pub spawn: &'a SpawnData,
    pub objects: &'a Arc<ObjectManager>,
}

pub type SpawnGeneratorFactory =
    Arc<dyn Fn(&SpawnContext<'_>) -> Box<dyn SpawnGenerator> + Send + Sync>;

/// Generator class name → factory. The empty name selects
/// [`ObjectSpawner`].
#[derive(Default)]
pub struct SpawnGeneratorRegistry {
    factories: RwLock<HashMap<String, SpawnGeneratorFactory>>,
}

impl SpawnGeneratorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, class: impl Into<String>, factory: SpawnGeneratorFactory) {
        self.factories.write().insert(class.into(), factory);
    }

    pub fn contains(&self, class: &str) -> bool {
        class.is_empty() || self.factories.read().contains_key(class)
    }

    /// Build the generator for `context.spawn`, or `None` for an unknown
    /// class.
    pub fn create(&self, context: &SpawnContext<'_>) -> Option<Box<dyn SpawnGenerator>> {
        let class = context.spawn.generator.as_str();
        if class.is_empty() {
            return Some(Box::new(ObjectSpawner::new(context)));
        }
        let factory = self.factories.read().get(class).cloned()?;
        Some(factory(context))
    }
}

/// Default generator: creates `count` transient objects from the spawn's
/// template at the spawn point.
pub struct ObjectSpawner {
    objects: Arc<ObjectManager>,
    instance: ObjectId,
    spawn: SpawnData,
    spawned: Vec<ObjectId>,
}

impl ObjectSpawner {
    pub fn new(context: &SpawnContext<'_>) -> Self {
        Self {
            objects: context.objects.clone(),
            instance: context.instance,
            spawn: context.spawn.clone(),
            spawned: Vec::new(),
        }
    }

    pub fn spawned(&self) -> &[ObjectId] {
        &self.spawned
    }

    fn overrides(&self) -> Template {
        let mut overrides = Template::new();
        for ((ns, key), value) in [
            (props::PERSISTENT, PropertyValue::Bool(false)),
            (props::INSTANCE, PropertyValue::Oid(self.instance)),
            (props::LOC, PropertyValue::Point(self.spawn.loc)),
            (props::ORIENT, PropertyValue::Orient(self.spawn.orient)),
        ] {
            overrides.put(ns, key, value);
        }
        overrides
    }
}

impl SpawnGenerator for ObjectSpawner {
    fn activate(&mut self) -> LifecycleResult<usize> {
        let overrides = self.overrides();
        for _ in 0..self.spawn.count {
            let oid = self.objects.generate(&self.spawn.template, &overrides)?;
            self.spawned.push(oid);
        }
        tracing::debug!(
            instance = %self.instance,
            spawn = %self.spawn.name,
            count = self.spawned.len(),
            "spawn generator active"
        );
        Ok(self.spawned.len())
    }
}

/// Reads a world file into memory.
pub trait WorldLoader: Send + Sync {
    fn load(&self, path: &Path) -> Result<WorldFile, WorldFileError>;
}

/// The JSON world-file format.
pub struct JsonWorldLoader;

impl WorldLoader for JsonWorldLoader {
    fn load(&self, path: &Path) -> Result<WorldFile, WorldFileError> {
        WorldFile::load(path)
    }
}

/// Loader-override name → loader. Templates without an override use
/// [`JsonWorldLoader`].
pub struct WorldLoaderRegistry {
    loaders: RwLock<HashMap<String, Arc<dyn WorldLoader>>>,
    default: Arc<dyn WorldLoader>,
}

impl Default for WorldLoaderRegistry {
    fn default() -> Self {
        Self {
            loaders: RwLock::new(HashMap::new()),
            default: Arc::new(JsonWorldLoader),
        }
    }
}

impl WorldLoaderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, name: impl Into<String>, loader: Arc<dyn WorldLoader>) {
        self.loaders.write().insert(name.into(), loader);
    }

    /// Loader for `name`; `None` only for a named override that is not
    /// registered.
    pub fn get(&self, name: Option<&str>) -> Option<Arc<dyn WorldLoader>> {
        match name {
            None => Some(self.default.clone()),
            Some(name) => self.loaders.read().get(name).cloned(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    struct Fixed;

    impl WorldLoader for Fixed {
        fn load(&self, path: &Path) -> Result<WorldFile, WorldFileError> {
            WorldFile::from_json(path, r#"{ "name": "fixed" }"#)
        }
    }

    #[test]
    fn loader_overrides_are_per_registry() {
        let loaders = WorldLoaderRegistry::new();
        loaders.register("fixed", Arc::new(Fixed));

        let world = loaders
            .get(Some("fixed"))
            .unwrap()
            .load(&PathBuf::from("unused.json"))
            .unwrap();
        assert_eq!(world.name, "fixed");
        assert!(loaders.get(Some("missing")).is_none());
        assert!(WorldLoaderRegistry::new().get(Some("fixed")).is_none());
        assert!(loaders.get(None).is_some());
    }

    #[test]
    fn default_spawn_class_is_always_known() {
        let spawners = SpawnGeneratorRegistry::new();
        assert!(spawners.contains(""));
        assert!(!spawners.contains("Patrol"));
    }
}
