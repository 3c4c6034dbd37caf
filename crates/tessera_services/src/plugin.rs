//! Plugin capabilities and dispatch
//!
//! A plugin owns one namespace and implements whichever lifecycle phases it
//! takes part in. The host keeps a namespace → capability map per phase and
//! answers the per-namespace fan-out requests on the bus by map lookup; a
//! phase the namespace did not register for is answered with a failure.

use crate::messages::{LifecycleMessage, LifecycleReply, MessageKind, Topic};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::Arc;
use tessera_bus::{MessageBus, Request, Responder, Role, SubscriptionId, TopicFilter};
use tessera_core::{LifecycleResult, Namespace, ObjectId, Template};

pub trait Generator: Send + Sync + 'static {
    /// Create the sub-object from the namespace-restricted template and
    /// return the namespaces it has to wait on.
    fn generate(
        &self,
        oid: ObjectId,
        namespace: Namespace,
        template: &Template,
        persistent: bool,
    ) -> LifecycleResult<Vec<Namespace>>;

    fn dependencies_ready(&self, _oid: ObjectId, _namespace: Namespace) -> LifecycleResult<()> {
        Ok(())
    }
}

pub trait Loader: Send + Sync + 'static {
    /// `data` is the payload last saved for this namespace, if any.
    fn load(&self, oid: ObjectId, namespace: Namespace, data: Option<&[u8]>) -> LifecycleResult<()>;
}

pub trait Unloader: Send + Sync + 'static {
    fn unload(&self, oid: ObjectId, namespace: Namespace) -> LifecycleResult<()>;
}

pub trait Deleter: Send + Sync + 'static {
    fn delete(&self, oid: ObjectId, namespace: Namespace) -> LifecycleResult<()>;
}

pub trait Saver: Send + Sync + 'static {
    /// Payload to persist; `None` when the namespace keeps nothing.
    fn save(&self, oid: ObjectId, namespace: Namespace) -> LifecycleResult<Option<Vec<u8>>>;
}

#[derive(Default, Clone)]
struct Capabilities {
    generator: Option<Arc<dyn Generator>>,
    loader: Option<Arc<dyn Loader>>,
    unloader: Option<Arc<dyn Unloader>>,
    deleter: Option<Arc<dyn Deleter>>,
    saver: Option<Arc<dyn Saver>>,
}

type CapabilityMap = RwLock<HashMap<Namespace, Capabilities>>;

pub struct PluginHost {
    bus: MessageBus<LifecycleMessage>,
    capabilities: Arc<CapabilityMap>,
    subscriptions: Mutex<HashMap<Namespace, SubscriptionId>>,
}

impl PluginHost {
    pub fn new(bus: MessageBus<LifecycleMessage>) -> Self {
        Self {
            bus,
            capabilities: Arc::new(RwLock::new(HashMap::new())),
            subscriptions: Mutex::new(HashMap::new()),
        }
    }

    pub fn register_generator(&self, ns: Namespace, generator: Arc<dyn Generator>) {
        self.update(ns, |c| c.generator = Some(generator));
    }

    pub fn register_loader(&self, ns: Namespace, loader: Arc<dyn Loader>) {
        self.update(ns, |c| c.loader = Some(loader));
    }

    pub fn register_unloader(&self, ns: Namespace, unloader: Arc<dyn Unloader>) {
        self.update(ns, |c| c.unloader = Some(unloader));
    }

    pub fn register_deleter(&self, ns: Namespace, deleter: Arc<dyn Deleter>) {
        self.update(ns, |c| c.deleter = Some(deleter));
    }

    pub fn register_saver(&self, ns: Namespace, saver: Arc<dyn Saver>) {
        self.update(ns, |c| c.saver = Some(saver));
    }

    /// Register one plugin for every phase.
    pub fn register<P>(&self, ns: Namespace, plugin: Arc<P>)
    where
        P: Generator + Loader + Unloader + Deleter + Saver,
    {
        self.update(ns, |c| {
            *c = Capabilities {
                generator: Some(plugin.clone()),
                loader: Some(plugin.clone()),
                unloader: Some(plugin.clone()),
                deleter: Some(plugin.clone()),
                saver: Some(plugin),
            }
        });
    }

    /// Drop every capability for `ns` and stop answering its requests.
    pub fn unregister(&self, ns: Namespace) {
        self.capabilities.write().remove(&ns);
        if let Some(id) = self.subscriptions.lock().remove(&ns) {
            self.bus.unsubscribe(id);
        }
    }

    pub fn namespaces(&self) -> Vec<Namespace> {
        let mut namespaces: Vec<Namespace> = self.capabilities.read().keys().copied().collect();
        namespaces.sort();
        namespaces
    }

    fn update(&self, ns: Namespace, f: impl FnOnce(&mut Capabilities)) {
        f(self.capabilities.write().entry(ns).or_default());

        let mut subscriptions = self.subscriptions.lock();
        if subscriptions.contains_key(&ns) {
            return;
        }
        let capabilities = self.capabilities.clone();
        let filter = TopicFilter::new(
            MessageKind::SUB_OBJECT
                .iter()
                .map(|kind| Topic::sub_object(*kind, ns)),
        );
        let id = self.bus.subscribe(
            filter,
            move |request: Request<LifecycleMessage>, responder: Responder<LifecycleReply>| {
                let reply = dispatch(&capabilities, request.message());
                responder.reply(reply);
            },
            Role::Responder,
        );
        subscriptions.insert(ns, id);
        tracing::debug!(namespace = %ns, "plugin namespace attached");
    }
}

fn dispatch(capabilities: &CapabilityMap, message: &LifecycleMessage) -> LifecycleReply {
    use LifecycleMessage as M;

    let Some(ns) = message.namespace() else {
        return LifecycleReply::Ack(false);
    };
    // Clone the entry so no map lock is held while the plugin runs
    let Some(caps) = capabilities.read().get(&ns).cloned() else {
        tracing::warn!(namespace = %ns, kind = ?message.kind(), "no plugin for namespace");
        return failure_reply(message);
    };

    match message {
        M::GenerateSubObject {
            oid,
            template,
            persistent,
            ..
        } => match &caps.generator {
            Some(g) => LifecycleReply::Generated(
                logged(*oid, ns, "generate", g.generate(*oid, ns, template, *persistent)),
            ),
            None => missing(ns, message),
        },
        M::SubObjectDepsReady { oid, .. } => match &caps.generator {
            Some(g) => ack(logged(*oid, ns, "dependencies ready", g.dependencies_ready(*oid, ns))),
            None => missing(ns, message),
        },
        M::LoadSubObject { oid, data, .. } => match &caps.loader {
            Some(l) => ack(logged(*oid, ns, "load", l.load(*oid, ns, data.as_deref()))),
            None => missing(ns, message),
        },
        M::UnloadSubObject { oid, .. } => match &caps.unloader {
            Some(u) => ack(logged(*oid, ns, "unload", u.unload(*oid, ns))),
            None => missing(ns, message),
        },
        M::DeleteSubObject { oid, .. } => match &caps.deleter {
            Some(d) => ack(logged(*oid, ns, "delete", d.delete(*oid, ns))),
            None => missing(ns, message),
        },
        M::SaveSubObject { oid, .. } => match &caps.saver {
            Some(s) => LifecycleReply::Data(logged(*oid, ns, "save", s.save(*oid, ns)).flatten()),
            None => missing(ns, message),
        },
        _ => LifecycleReply::Ack(false),
    }
}

fn logged<T>(oid: ObjectId, ns: Namespace, phase: &str, result: LifecycleResult<T>) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(err) => {
            tracing::warn!(%oid, namespace = %ns, phase, error = %err, "plugin phase failed");
            None
        }
    }
}

fn ack(result: Option<()>) -> LifecycleReply {
    LifecycleReply::Ack(result.is_some())
}

fn missing(ns: Namespace, message: &LifecycleMessage) -> LifecycleReply {
    tracing::warn!(namespace = %ns, kind = ?message.kind(), "plugin does not implement phase");
    failure_reply(message)
}

fn failure_reply(message: &LifecycleMessage) -> LifecycleReply {
    match message {
        LifecycleMessage::GenerateSubObject { .. } => LifecycleReply::Generated(None),
        LifecycleMessage::SaveSubObject { .. } => LifecycleReply::Data(None),
        _ => LifecycleReply::Ack(false),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tessera_bus::BusConfig;

    struct Refusing;

    impl Loader for Refusing {
        fn load(&self, oid: ObjectId, _ns: Namespace, _data: Option<&[u8]>) -> LifecycleResult<()> {
            Err(tessera_core::LifecycleError::UnknownObject { oid })
        }
    }

    struct Echo;

    impl Loader for Echo {
        fn load(&self, _oid: ObjectId, _ns: Namespace, data: Option<&[u8]>) -> LifecycleResult<()> {
            assert_eq!(data, Some(&b"payload"[..]));
            Ok(())
        }
    }

    fn load(bus: &MessageBus<LifecycleMessage>, ns: Namespace) -> LifecycleReply {
        bus.send(LifecycleMessage::LoadSubObject {
            oid: ObjectId::from_raw(1),
            namespace: ns,
            data: Some(b"payload".to_vec()),
        })
        .unwrap()
    }

    #[test]
    fn dispatches_by_namespace() {
        let bus = MessageBus::new(BusConfig::default()).unwrap();
        let host = PluginHost::new(bus.clone());
        host.register_loader(Namespace::INVENTORY, Arc::new(Echo));
        host.register_loader(Namespace::COMBAT, Arc::new(Refusing));

        assert!(load(&bus, Namespace::INVENTORY).is_ack());
        assert!(!load(&bus, Namespace::COMBAT).is_ack());
        assert_eq!(host.namespaces(), vec![Namespace::INVENTORY, Namespace::COMBAT]);
    }

    #[test]
    fn missing_phase_is_a_failure() {
        let bus = MessageBus::new(BusConfig::default()).unwrap();
        let host = PluginHost::new(bus.clone());
        host.register_loader(Namespace::INVENTORY, Arc::new(Echo));

        let reply = bus
            .send(LifecycleMessage::GenerateSubObject {
                oid: ObjectId::from_raw(1),
                namespace: Namespace::INVENTORY,
                template: Template::new(),
                persistent: false,
            })
            .unwrap();
        assert_eq!(reply, LifecycleReply::Generated(None));
    }

    #[test]
    fn unregister_stops_answering() {
        let bus = MessageBus::new(BusConfig::default()).unwrap();
        let host = PluginHost::new(bus.clone());
        host.register_loader(Namespace::INVENTORY, Arc::new(Echo));
        host.unregister(Namespace::INVENTORY);
        assert!(bus
            .send(LifecycleMessage::UnloadSubObject {
                oid: ObjectId::from_raw(1),
                namespace: Namespace::INVENTORY,
            })
            .is_err());
    }
}
