use super::{DependencyTable, ObjectManager};
use crate::messages::LifecycleMessage;
use crate::persistence::WorldLocation;
use std::sync::Arc;
use tessera_core::glam::Quat;
use tessera_core::{
    props, LifecycleError, LifecycleResult, MasterEntity, MasterRecord, Namespace, NamespaceSet,
    ObjectId, ObjectType, PropertyValue, Template,
};

impl ObjectManager {
    /// Create a new object from a registered template with `overrides`
    /// applied on top.
    pub fn generate(&self, template_name: &str, overrides: &Template) -> LifecycleResult<ObjectId> {
        let base = self
            .get_template(template_name)
            .ok_or_else(|| LifecycleError::TemplateNotFound {
                name: template_name.to_string(),
            })?;
        self.generate_from(&base.merge(overrides))
    }

    /// Create a new object from an already merged template.
    pub fn generate_from(&self, template: &Template) -> LifecycleResult<ObjectId> {
        let result = self
            .profiler
            .time_operation("generate", || self.generate_inner(template));
        match &result {
            Ok(_) => self.counters.increment("generate.ok", 1),
            Err(err) => {
                self.counters.increment("generate.failed", 1);
                tracing::error!(template = ?template.name(), error = %err, "generate failed");
            }
        }
        result
    }

    fn generate_inner(&self, template: &Template) -> LifecycleResult<ObjectId> {
        let oid = self.ids.allocate();
        let record = master_record(oid, template);
        let persistent = record.persistent;
        let namespaces = record.namespaces;

        let master = Arc::new(MasterEntity::new(record));
        if !self.registry.register(oid, Namespace::OBJECT_MANAGER, master.clone()) {
            return Err(LifecycleError::Internal(format!("{oid} allocated twice")));
        }
        tracing::info!(%oid, name = %master.name(), namespaces = ?namespaces, persistent, "generating object");

        let mut table = DependencyTable::new();
        for ns in namespaces.iter() {
            tracing::debug!(%oid, namespace = %ns, "generate sub-object");
            let deps = self
                .call(LifecycleMessage::GenerateSubObject {
                    oid,
                    namespace: ns,
                    template: template.restrict(ns),
                    persistent,
                })
                .and_then(|reply| reply.into_dependencies())
                .ok_or(LifecycleError::SubObjectCreationFailed { oid, namespace: ns })?;
            master.mark_loaded(ns);
            table.insert(ns, deps);
        }

        self.resolve_dependencies(oid, table)?;

        if persistent {
            self.save_initial_location(oid, template)?;
            self.save_master(&master)?;
        }
        self.track_membership(&master);

        tracing::info!(%oid, "object generated");
        Ok(oid)
    }

    fn resolve_dependencies(&self, oid: ObjectId, table: DependencyTable) -> LifecycleResult<()> {
        let resolution = table.resolve(oid);
        for ns in &resolution.notify {
            let ok = self.call_ack(LifecycleMessage::SubObjectDepsReady {
                oid,
                namespace: *ns,
            });
            if !ok {
                // Siblings still get their notification
                tracing::warn!(%oid, namespace = %ns, "dependencies-ready notification failed");
            }
        }
        if resolution.cycle.is_empty() {
            Ok(())
        } else {
            Err(LifecycleError::DependencyCycle {
                oid,
                namespaces: resolution.cycle,
            })
        }
    }

    fn save_initial_location(&self, oid: ObjectId, template: &Template) -> LifecycleResult<()> {
        let (Some(instance), Some(loc)) = (
            template.prop(props::INSTANCE).and_then(PropertyValue::as_oid),
            template.prop(props::LOC).and_then(PropertyValue::as_point),
        ) else {
            return Ok(());
        };
        let orient = template
            .prop(props::ORIENT)
            .and_then(PropertyValue::as_orient)
            .unwrap_or(Quat::IDENTITY);
        self.store
            .save_location(oid, &WorldLocation::new(instance, loc, orient))?;
        Ok(())
    }
}

/// Master record described by a merged template.
fn master_record(oid: ObjectId, template: &Template) -> MasterRecord {
    let name = template
        .prop(props::NAME)
        .and_then(PropertyValue::as_str)
        .or(template.name())
        .unwrap_or_default();

    let mut record = MasterRecord::new(oid, name);
    record.object_type = template
        .prop(props::OBJECT_TYPE)
        .and_then(PropertyValue::as_str)
        .and_then(ObjectType::from_name)
        .unwrap_or_default();
    record.persistent = template
        .prop(props::PERSISTENT)
        .and_then(PropertyValue::as_bool)
        .unwrap_or(false);
    record.instance = template.prop(props::INSTANCE).and_then(PropertyValue::as_oid);
    record.template_name = template.name().map(String::from);

    let mut namespaces: NamespaceSet = template.namespaces();
    namespaces.remove(Namespace::TRANSIENT);
    namespaces.remove(Namespace::OBJECT_MANAGER);
    record.namespaces = namespaces;
    record
}

#[cfg(test)]
mod tests {
    use super::*;
    use tessera_core::glam::Vec3;

    #[test]
    fn record_reads_control_properties() {
        let template = Template::named("Chest")
            .with(Namespace::TRANSIENT, "persistent", true)
            .with(Namespace::OBJECT_MANAGER, "objectType", "Structure")
            .with(Namespace::WORLD_MANAGER, "loc", Vec3::new(10.0, 0.0, 10.0))
            .with(Namespace::WORLD_MANAGER, "instance", ObjectId::from_raw(7))
            .with(Namespace::INVENTORY, "slots", 4i64);

        let record = master_record(ObjectId::from_raw(2), &template);
        assert!(record.persistent);
        assert_eq!(record.name, "Chest");
        assert_eq!(record.object_type, ObjectType::Structure);
        assert_eq!(record.instance, Some(ObjectId::from_raw(7)));
        assert_eq!(
            record.namespaces.to_vec(),
            vec![Namespace::WORLD_MANAGER, Namespace::INVENTORY]
        );
    }
}
