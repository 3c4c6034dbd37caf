use super::{InstanceCoordinator, InstanceRecord, SpawnContext};
use crate::messages::{InstanceLoadResult, InstancePhase, LifecycleMessage, ObjectRef};
use crate::object_manager::InstanceStatus;
use std::path::Path;
use std::sync::Arc;
use tessera_asset::{WorldFile, WorldFileError};
use tessera_core::{
    props, LifecycleError, LifecycleResult, Namespace, ObjectId, PropertyValue, Template,
};
use tessera_script::{run_instance_script, InstanceScriptContext, ScriptPhase};

fn put(template: &mut Template, (ns, key): (Namespace, &str), value: impl Into<PropertyValue>) {
    template.put(ns, key, value);
}

fn text(template: &Template, key: (Namespace, &str)) -> Option<String> {
    template
        .prop(key)
        .and_then(PropertyValue::as_str)
        .map(String::from)
}

impl InstanceCoordinator {
    /// Create an instance from a registered instance template.
    pub fn create(&self, template_name: &str, overrides: &Template) -> LifecycleResult<ObjectId> {
        let base = self
            .get_template(template_name)
            .ok_or_else(|| LifecycleError::TemplateNotFound {
                name: template_name.to_string(),
            })?;
        let mut template = base.merge(overrides);
        template.declare(Namespace::INSTANCE);

        let worker = self.select_worker(text(&template, props::HOSTING_WORKER).as_deref())?;
        put(&mut template, props::HOSTING_WORKER, worker.clone());
        put(&mut template, props::TEMPLATE_NAME, template_name);
        if template.prop(props::OBJECT_TYPE).is_none() {
            put(&mut template, props::OBJECT_TYPE, "Instance");
        }

        let name = text(&template, props::INSTANCE_NAME);
        if let Some(name) = &name {
            if template.prop(props::NAME).is_none() {
                put(&mut template, props::NAME, name.as_str());
            }
        }

        let unique = template
            .prop(props::UNIQUE_NAME)
            .and_then(PropertyValue::as_bool)
            .unwrap_or(false);
        let _reservation = match (unique, &name) {
            (false, _) => None,
            (true, None) => {
                return Err(LifecycleError::Internal(format!(
                    "instance template '{template_name}' wants a unique name but has none"
                )));
            }
            (true, Some(name)) => Some(
                self.names
                    .reserve(name, || self.name_in_use(name))
                    .ok_or_else(|| LifecycleError::DuplicateName { name: name.clone() })?,
            ),
        };

        self.expand_paths(&mut template)?;

        let oid = self.objects.generate_from(&template)?;
        let record = self
            .record(oid)
            .ok_or(LifecycleError::NotInstance { oid })?;

        if let Some(world) = self.load_world(&record)? {
            self.start_spawners(oid, &world);
        }
        self.run_script(&record, ScriptPhase::Init);
        record.set_phase(InstancePhase::Available);

        tracing::info!(instance = %oid, name = ?name, %worker, "instance created");
        Ok(oid)
    }

    /// Load a stored instance. Already available is `Ok`; a load, unload or
    /// delete in flight is `Retry`.
    pub fn load(&self, oid: ObjectId) -> InstanceLoadResult {
        let directory = self.objects.instances();
        if let Some(record) = self.record(oid) {
            let idle = matches!(directory.status(oid), None | Some(InstanceStatus::Ok));
            return if record.phase() == InstancePhase::Available && idle {
                InstanceLoadResult::Ok
            } else {
                InstanceLoadResult::Retry
            };
        }
        if directory.status(oid).is_some_and(|s| s != InstanceStatus::Ok) {
            return InstanceLoadResult::Retry;
        }

        match self.declares_instance(oid) {
            Ok(true) => {}
            Ok(false) => return InstanceLoadResult::UnknownObject,
            Err(err) => {
                tracing::error!(instance = %oid, error = %err, "instance lookup failed");
                return InstanceLoadResult::InternalError;
            }
        }

        let Ok(worker) = self.select_worker(None) else {
            tracing::warn!(instance = %oid, kind = %self.worker_kind, "no worker to host instance");
            return InstanceLoadResult::NoWorkerAvailable;
        };

        if let Err(err) = directory.begin(oid, InstanceStatus::Loading) {
            tracing::debug!(instance = %oid, error = %err, "instance busy");
            return InstanceLoadResult::Retry;
        }
        let result = self.load_begun(oid, worker);
        directory.finish(oid);

        match result {
            Ok(()) => {
                tracing::info!(instance = %oid, "instance loaded");
                InstanceLoadResult::Ok
            }
            Err(err) => {
                tracing::error!(instance = %oid, error = %err, "instance load failed");
                if self.objects.master(oid).is_none() {
                    directory.retire(oid);
                }
                InstanceLoadResult::InternalError
            }
        }
    }

    fn declares_instance(&self, oid: ObjectId) -> LifecycleResult<bool> {
        if let Some(master) = self.objects.master(oid) {
            return Ok(master.namespaces().contains(Namespace::INSTANCE));
        }
        Ok(self
            .objects
            .store()
            .load_master(oid)?
            .is_some_and(|r| r.namespaces.contains(Namespace::INSTANCE)))
    }

    fn load_begun(&self, oid: ObjectId, worker: String) -> LifecycleResult<()> {
        self.objects.load(&ObjectRef::Oid(oid), None)?;
        let record = self
            .record(oid)
            .ok_or(LifecycleError::NotInstance { oid })?;
        record.set_worker(Some(worker));
        record.set_phase(InstancePhase::Load);

        let world = self.load_world(&record)?;
        self.request_content(oid);
        if let Some(world) = world {
            self.start_spawners(oid, &world);
        }
        self.run_script(&record, ScriptPhase::Load);
        record.set_phase(InstancePhase::Available);
        Ok(())
    }

    pub fn unload(&self, oid: ObjectId) -> LifecycleResult<()> {
        self.teardown(oid, InstancePhase::Unload)
    }

    pub fn delete(&self, oid: ObjectId) -> LifecycleResult<()> {
        self.teardown(oid, InstancePhase::Delete)
    }

    fn teardown(&self, oid: ObjectId, phase: InstancePhase) -> LifecycleResult<()> {
        let record = self
            .record(oid)
            .ok_or(LifecycleError::InstanceNotLoaded { instance: oid })?;
        if !record.transition(InstancePhase::Available, phase) {
            return Err(LifecycleError::InstanceBusy {
                instance: oid,
                status: format!("{:?}", record.phase()),
            });
        }

        self.stop_spawners(oid);
        let result = match phase {
            InstancePhase::Delete => self.objects.delete_instance(oid),
            _ => self.objects.unload_instance(oid),
        };
        if result.is_err() && self.record(oid).is_some() {
            record.set_phase(InstancePhase::Available);
        }
        result
    }

    /// Whether a loaded or stored instance already carries `name`.
    pub(super) fn name_in_use(&self, name: &str) -> bool {
        if self.find_loaded(name).is_some() {
            return true;
        }
        match self
            .objects
            .store()
            .find_named(name, Some(tessera_core::ObjectType::Instance))
        {
            Ok(found) => found.is_some(),
            Err(err) => {
                tracing::warn!(name, error = %err, "stored instance lookup failed, treating name as taken");
                true
            }
        }
    }

    pub(super) fn find_loaded(&self, name: &str) -> Option<Arc<InstanceRecord>> {
        self.objects
            .registry()
            .all_of_namespace::<InstanceRecord>(Namespace::INSTANCE)
            .into_iter()
            .find(|record| record.name().as_deref() == Some(name))
    }

    fn expand_paths(&self, template: &mut Template) -> LifecycleResult<()> {
        for key in [props::WORLD_FILE, props::INIT_SCRIPT, props::LOAD_SCRIPT] {
            let Some(raw) = text(template, key) else {
                continue;
            };
            let path = self
                .paths
                .resolve_readable(&raw)
                .map_err(|e| LifecycleError::UnreadableFile {
                    path: e.path().display().to_string(),
                })?;
            put(template, key, path.to_string_lossy().into_owned());
        }
        Ok(())
    }

    fn load_world(&self, record: &InstanceRecord) -> LifecycleResult<Option<Arc<WorldFile>>> {
        let props = record.props();
        let Some(path) = props.world_file.as_deref() else {
            return Ok(None);
        };
        let loader = self
            .world_loaders
            .get(props.loader_override.as_deref())
            .ok_or_else(|| {
                LifecycleError::Internal(format!(
                    "unknown world loader '{}'",
                    props.loader_override.as_deref().unwrap_or_default()
                ))
            })?;
        let world = loader.load(Path::new(path)).map_err(|e| match e {
            WorldFileError::Unreadable { path, .. } => LifecycleError::UnreadableFile {
                path: path.display().to_string(),
            },
            other => LifecycleError::Internal(other.to_string()),
        })?;
        tracing::debug!(
            instance = %record.oid(),
            world = %world.name,
            spawns = world.spawns().len(),
            "world file loaded"
        );
        record.set_world(Some(world));
        Ok(record.world())
    }

    fn request_content(&self, instance: ObjectId) {
        self.bus().send_async(
            LifecycleMessage::LoadInstanceContent { instance },
            move |reply| match reply {
                Ok(reply) if reply.is_ack() => {
                    tracing::debug!(%instance, "instance content requested");
                }
                Ok(_) => tracing::warn!(%instance, "instance content load failed"),
                Err(err) => tracing::warn!(%instance, error = %err, "instance content request failed"),
            },
        );
    }

    fn start_spawners(&self, instance: ObjectId, world: &WorldFile) {
        let mut active = Vec::new();
        for spawn in world.spawns() {
            let context = SpawnContext {
                instance,
                spawn,
                objects: &self.objects,
            };
            let Some(mut generator) = self.spawn_generators.create(&context) else {
                tracing::warn!(%instance, spawn = %spawn.name, class = %spawn.generator, "unknown spawn generator class");
                continue;
            };
            if let Err(err) = generator.activate() {
                tracing::warn!(%instance, spawn = %spawn.name, error = %err, "spawn generator failed to start");
            }
            active.push(generator);
        }
        if !active.is_empty() {
            self.spawners.insert(instance, active);
        }
    }

    fn stop_spawners(&self, instance: ObjectId) {
        if let Some((_, mut generators)) = self.spawners.remove(&instance) {
            for generator in &mut generators {
                generator.deactivate();
            }
        }
    }

    pub fn active_spawners(&self, instance: ObjectId) -> usize {
        self.spawners.get(&instance).map_or(0, |g| g.len())
    }

    fn run_script(&self, record: &InstanceRecord, phase: ScriptPhase) {
        let props = record.props();
        let script = match phase {
            ScriptPhase::Init => props.init_script,
            ScriptPhase::Load => props.load_script,
        };
        let Some(script) = script else {
            return;
        };
        let context = InstanceScriptContext {
            instance: record.oid(),
            name: props.name.unwrap_or_default(),
            phase,
        };
        if let Err(err) = run_instance_script(Path::new(&script), &context) {
            tracing::warn!(instance = %record.oid(), %script, phase = phase.name(), error = %err, "instance script failed");
        }
    }
}
