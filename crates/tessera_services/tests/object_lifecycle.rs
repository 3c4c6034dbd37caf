mod support;

use parking_lot::Mutex;
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::Duration;
use support::{count, position, services, Phase};
use tessera_bus::MessageBus;
use tessera_core::glam::Vec3;
use tessera_core::{
    ErrorKind, LifecycleError, LifecycleResult, Namespace, ObjectId, PropertyValue, Template,
};
use tessera_services::messages::{ObjectRef, WorldNodeUpdate};
use tessera_services::plugin::{Deleter, Generator, Loader, Unloader};
use tessera_services::{LifecycleMessage, LifecycleReply, PersistenceStore};

fn chest(persistent: bool) -> Template {
    Template::named("Chest")
        .with(Namespace::WORLD_MANAGER, "loc", Vec3::ZERO)
        .with(
            Namespace::INVENTORY,
            "dependsOn",
            PropertyValue::List(vec!["WorldManager".into()]),
        )
        .with(Namespace::INVENTORY, "slots", 12i64)
        .with(Namespace::TRANSIENT, "persistent", persistent)
}

#[test]
fn chest_inventory_waits_for_world_position() {
    let (services, log) = services(&[Namespace::WORLD_MANAGER, Namespace::INVENTORY]);
    services.objects.register_template(chest(false)).unwrap();

    let overrides = Template::new()
        .with(Namespace::WORLD_MANAGER, "loc", Vec3::new(10.0, 0.0, 10.0))
        .with(Namespace::WORLD_MANAGER, "instance", ObjectId::from_raw(7));
    let oid = services.objects.generate("Chest", &overrides).unwrap();

    let world = position(&log, Phase::Generate, Namespace::WORLD_MANAGER, oid).unwrap();
    let ready = position(&log, Phase::DepsReady, Namespace::INVENTORY, oid).unwrap();
    assert!(ready > world);
    // Only namespaces that declared dependencies are notified
    assert_eq!(count(&log, Phase::DepsReady, Namespace::WORLD_MANAGER, oid), 0);

    let master = services.objects.master(oid).unwrap();
    assert_eq!(master.loaded(), master.namespaces());
    assert!(master.namespaces().contains(Namespace::INVENTORY));
    assert!(services.registry.contains(oid, Namespace::WORLD_MANAGER));
    assert!(services.registry.contains(oid, Namespace::INVENTORY));
    assert_eq!(master.instance(), Some(ObjectId::from_raw(7)));
}

#[test]
fn dependency_cycle_is_reported() {
    let (services, _log) = services(&[Namespace::INVENTORY, Namespace::COMBAT]);
    let template = Template::named("Knot")
        .with(Namespace::INVENTORY, "dependsOn", PropertyValue::List(vec!["Combat".into()]))
        .with(Namespace::COMBAT, "dependsOn", PropertyValue::List(vec!["Inventory".into()]));
    services.objects.register_template(template).unwrap();

    let err = services.objects.generate("Knot", &Template::new()).unwrap_err();
    match err {
        LifecycleError::DependencyCycle { namespaces, .. } => {
            assert_eq!(namespaces.len(), 2);
        }
        other => panic!("expected a cycle, got {other}"),
    }
}

#[test]
fn unknown_template_fails_generate() {
    let (services, _log) = services(&[]);
    let err = services.objects.generate("Nothing", &Template::new()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);

    let reply = services
        .bus
        .send(LifecycleMessage::GenerateObject {
            template_name: "Nothing".into(),
            overrides: Template::new(),
        })
        .unwrap();
    assert_eq!(reply, LifecycleReply::Oid(None));
}

#[test]
fn duplicate_template_is_rejected() {
    let (services, _log) = services(&[]);
    services.objects.register_template(chest(false)).unwrap();
    let err = services.objects.register_template(chest(true)).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::AlreadyExists);
    assert_eq!(services.objects.template_names(), vec!["Chest".to_string()]);
}

#[test]
fn concurrent_loads_load_each_namespace_once() {
    let (services, log) = services(&[Namespace::WORLD_MANAGER, Namespace::INVENTORY]);
    services.objects.register_template(chest(true)).unwrap();
    let oid = services.objects.generate("Chest", &Template::new()).unwrap();
    services.objects.unload(oid, None).unwrap();
    assert!(services.objects.master(oid).is_none());

    let objects = services.objects.clone();
    let handles: Vec<_> = (0..8)
        .map(|_| {
            let objects = Arc::clone(&objects);
            thread::spawn(move || objects.load(&ObjectRef::Oid(oid), None))
        })
        .collect();
    for handle in handles {
        assert_eq!(handle.join().unwrap().unwrap(), oid);
    }

    assert_eq!(count(&log, Phase::Load, Namespace::WORLD_MANAGER, oid), 1);
    assert_eq!(count(&log, Phase::Load, Namespace::INVENTORY, oid), 1);
    assert!(services.objects.master(oid).unwrap().is_fully_loaded());
}

#[test]
fn partial_unload_keeps_master() {
    let (services, log) = services(&[Namespace::WORLD_MANAGER, Namespace::INVENTORY]);
    services.objects.register_template(chest(false)).unwrap();
    let oid = services.objects.generate("Chest", &Template::new()).unwrap();

    let mut only_inventory = tessera_core::NamespaceSet::EMPTY;
    only_inventory.insert(Namespace::INVENTORY);
    services.objects.unload(oid, Some(only_inventory)).unwrap();

    let master = services.objects.master(oid).unwrap();
    assert!(!master.loaded().contains(Namespace::INVENTORY));
    assert!(master.loaded().contains(Namespace::WORLD_MANAGER));
    assert_eq!(count(&log, Phase::Unload, Namespace::WORLD_MANAGER, oid), 0);
}

#[test]
fn delete_is_idempotent_and_clears_the_store() {
    let (services, log) = services(&[Namespace::WORLD_MANAGER, Namespace::INVENTORY]);
    services.objects.register_template(chest(true)).unwrap();
    let oid = services.objects.generate("Chest", &Template::new()).unwrap();
    assert!(services.store.load_master(oid).unwrap().is_some());

    services.objects.delete(oid).unwrap();
    assert!(services.objects.master(oid).is_none());
    assert!(services.store.load_master(oid).unwrap().is_none());
    assert_eq!(count(&log, Phase::Delete, Namespace::INVENTORY, oid), 1);

    let err = services.objects.delete(oid).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert_eq!(count(&log, Phase::Delete, Namespace::INVENTORY, oid), 1);
}

#[test]
fn object_data_round_trips_by_key() {
    let (services, _log) = services(&[Namespace::INVENTORY]);
    let oid = ObjectId::from_raw(500);

    let saved = services
        .bus
        .send(LifecycleMessage::SaveObjectData {
            oid,
            key: Some("player-bank".into()),
            namespace: Namespace::INVENTORY,
            data: b"gold=20".to_vec(),
        })
        .unwrap();
    assert!(saved.is_ack());

    let loaded = services
        .bus
        .send(LifecycleMessage::LoadObjectData {
            target: ObjectRef::Key("player-bank".into()),
            namespace: Namespace::INVENTORY,
        })
        .unwrap();
    assert_eq!(loaded.into_data().as_deref(), Some(&b"gold=20"[..]));

    let missing = services
        .bus
        .send(LifecycleMessage::LoadObjectData {
            target: ObjectRef::Key("nobody".into()),
            namespace: Namespace::INVENTORY,
        })
        .unwrap();
    assert_eq!(missing, LifecycleReply::Data(None));
}

#[test]
fn persistence_toggle_and_world_node_fix() {
    let (services, _log) = services(&[Namespace::WORLD_MANAGER, Namespace::INVENTORY]);
    services.objects.register_template(chest(false)).unwrap();
    let instance = ObjectId::from_raw(40);
    let overrides = Template::new().with(Namespace::WORLD_MANAGER, "instance", instance);
    let oid = services.objects.generate("Chest", &overrides).unwrap();

    assert!(services.store.load_master(oid).unwrap().is_none());
    services.objects.set_persistence(oid, true).unwrap();
    assert!(services.store.load_master(oid).unwrap().is_some());

    // No location row was written for a transient generate
    let update = WorldNodeUpdate {
        loc: Some(Vec3::new(1.0, 2.0, 3.0)),
        ..WorldNodeUpdate::default()
    };
    assert!(!services.objects.fix_world_node(oid, &update).unwrap());

    services.objects.set_persistence(oid, false).unwrap();
    assert!(services.store.load_master(oid).unwrap().is_none());
}

#[test]
fn named_lookup_prefers_resident_objects() {
    let (services, _log) = services(&[Namespace::INVENTORY]);
    let template = Template::named("Crate")
        .with(Namespace::OBJECT_MANAGER, "name", "Supply Crate")
        .with(Namespace::OBJECT_MANAGER, "objectType", "Item")
        .with(Namespace::INVENTORY, "slots", 4i64);
    services.objects.register_template(template).unwrap();
    let oid = services.objects.generate("Crate", &Template::new()).unwrap();

    let found = services
        .objects
        .get_named_object(None, "Supply Crate", Some(tessera_core::ObjectType::Item))
        .unwrap();
    assert_eq!(found, Some(oid));
    let wrong_type = services
        .objects
        .get_named_object(None, "Supply Crate", Some(tessera_core::ObjectType::Mob))
        .unwrap();
    assert_eq!(wrong_type, None);

    let status = services.objects.object_status(oid).unwrap().unwrap();
    assert_eq!(status.name, "Supply Crate");
    assert_eq!(status.loaded_namespaces, status.namespaces);
}

/// Refuses whichever phase it is registered for.
struct Refusing;

impl Generator for Refusing {
    fn generate(&self, oid: ObjectId, _: Namespace, _: &Template, _: bool) -> LifecycleResult<Vec<Namespace>> {
        Err(LifecycleError::Internal(format!("{oid} refused")))
    }
}

impl Unloader for Refusing {
    fn unload(&self, oid: ObjectId, _: Namespace) -> LifecycleResult<()> {
        Err(LifecycleError::Internal(format!("{oid} refused")))
    }
}

impl Deleter for Refusing {
    fn delete(&self, oid: ObjectId, _: Namespace) -> LifecycleResult<()> {
        Err(LifecycleError::Internal(format!("{oid} refused")))
    }
}

/// Generates fine but fails its dependencies-ready notification.
struct FailsWhenReady;

impl Generator for FailsWhenReady {
    fn generate(&self, _: ObjectId, _: Namespace, _: &Template, _: bool) -> LifecycleResult<Vec<Namespace>> {
        Ok(vec![Namespace::WORLD_MANAGER])
    }

    fn dependencies_ready(&self, oid: ObjectId, _: Namespace) -> LifecycleResult<()> {
        Err(LifecycleError::Internal(format!("{oid} not ready")))
    }
}

/// Loads its own object back through the bus while being loaded.
struct LoadsItselfBack {
    bus: MessageBus<LifecycleMessage>,
    replies: Mutex<Vec<LifecycleReply>>,
}

impl Loader for LoadsItselfBack {
    fn load(&self, oid: ObjectId, _: Namespace, _: Option<&[u8]>) -> LifecycleResult<()> {
        let reply = self
            .bus
            .send(LifecycleMessage::LoadObject {
                target: ObjectRef::Oid(oid),
                namespaces: None,
            })
            .map_err(|e| LifecycleError::Internal(e.to_string()))?;
        self.replies.lock().push(reply);
        Ok(())
    }
}

#[test]
fn plugin_may_load_its_own_object_during_load() {
    let (services, _log) = services(&[Namespace::WORLD_MANAGER, Namespace::INVENTORY]);
    services.objects.register_template(chest(true)).unwrap();
    let oid = services.objects.generate("Chest", &Template::new()).unwrap();
    services.objects.unload(oid, None).unwrap();

    let loader = Arc::new(LoadsItselfBack {
        bus: services.bus.clone(),
        replies: Mutex::new(Vec::new()),
    });
    services
        .plugins
        .register_loader(Namespace::INVENTORY, loader.clone());

    let (tx, rx) = mpsc::channel();
    let objects = services.objects.clone();
    thread::spawn(move || {
        tx.send(objects.load(&ObjectRef::Oid(oid), None)).ok();
    });
    let outcome = rx
        .recv_timeout(Duration::from_secs(5))
        .expect("load finishes");
    assert_eq!(outcome.unwrap(), oid);

    assert_eq!(loader.replies.lock().as_slice(), &[LifecycleReply::Oid(Some(oid))]);
    assert!(services.objects.master(oid).unwrap().is_fully_loaded());
    assert_eq!(services.objects.loads_in_flight(), 0);
}

#[test]
fn failed_loads_leave_nothing_in_flight() {
    let (services, _log) = services(&[Namespace::INVENTORY]);
    for raw in 1000..1100 {
        let err = services
            .objects
            .load(&ObjectRef::Oid(ObjectId::from_raw(raw)), None)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }
    assert_eq!(services.objects.loads_in_flight(), 0);
}

#[test]
fn failed_generate_keeps_earlier_sub_objects() {
    let (services, log) = services(&[Namespace::WORLD_MANAGER, Namespace::INVENTORY]);
    services
        .plugins
        .register_generator(Namespace::INVENTORY, Arc::new(Refusing));
    services.objects.register_template(chest(false)).unwrap();

    let err = services.objects.generate("Chest", &Template::new()).unwrap_err();
    let LifecycleError::SubObjectCreationFailed { oid, namespace } = err else {
        panic!("expected a creation failure, got {err}");
    };
    assert_eq!(namespace, Namespace::INVENTORY);

    assert_eq!(count(&log, Phase::Generate, Namespace::WORLD_MANAGER, oid), 1);
    assert!(services.registry.contains(oid, Namespace::WORLD_MANAGER));
    let master = services.objects.master(oid).unwrap();
    assert!(master.loaded().contains(Namespace::WORLD_MANAGER));
    assert!(!master.loaded().contains(Namespace::INVENTORY));
}

#[test]
fn unload_continues_past_a_refusing_namespace() {
    let (services, log) = services(&[Namespace::WORLD_MANAGER, Namespace::INVENTORY]);
    services
        .plugins
        .register_unloader(Namespace::INVENTORY, Arc::new(Refusing));
    services.objects.register_template(chest(false)).unwrap();
    let oid = services.objects.generate("Chest", &Template::new()).unwrap();

    let err = services.objects.unload(oid, None).unwrap_err();
    assert!(matches!(
        err,
        LifecycleError::PartialFailure { failed: 1, attempted: 2, .. }
    ));
    assert_eq!(count(&log, Phase::Unload, Namespace::WORLD_MANAGER, oid), 1);
    assert!(!services.registry.contains(oid, Namespace::WORLD_MANAGER));

    // The master stays to track the sub-object that would not unload
    let master = services.objects.master(oid).unwrap();
    assert!(master.loaded().contains(Namespace::INVENTORY));
    assert!(!master.loaded().contains(Namespace::WORLD_MANAGER));
}

#[test]
fn delete_continues_past_a_refusing_namespace() {
    let (services, log) = services(&[Namespace::WORLD_MANAGER, Namespace::INVENTORY]);
    services
        .plugins
        .register_deleter(Namespace::INVENTORY, Arc::new(Refusing));
    services.objects.register_template(chest(true)).unwrap();
    let oid = services.objects.generate("Chest", &Template::new()).unwrap();

    let err = services.objects.delete(oid).unwrap_err();
    assert!(matches!(err, LifecycleError::PartialFailure { failed: 1, .. }));
    assert_eq!(count(&log, Phase::Delete, Namespace::WORLD_MANAGER, oid), 1);
    assert!(services.objects.master(oid).is_none());
    assert!(services.store.load_master(oid).unwrap().is_none());
}

#[test]
fn failed_ready_notification_does_not_stop_siblings() {
    let (services, log) = services(&[Namespace::WORLD_MANAGER, Namespace::COMBAT]);
    services
        .plugins
        .register_generator(Namespace::INVENTORY, Arc::new(FailsWhenReady));
    let template = Template::named("Guard")
        .with(Namespace::WORLD_MANAGER, "loc", Vec3::ZERO)
        .with(Namespace::INVENTORY, "slots", 2i64)
        .with(Namespace::COMBAT, "dependsOn", PropertyValue::List(vec!["WorldManager".into()]));
    services.objects.register_template(template).unwrap();

    let oid = services.objects.generate("Guard", &Template::new()).unwrap();
    assert_eq!(count(&log, Phase::DepsReady, Namespace::COMBAT, oid), 1);
    assert!(services.objects.master(oid).unwrap().is_fully_loaded());
}
