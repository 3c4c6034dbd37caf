use super::ObjectManager;
use crate::messages::{LifecycleMessage, LifecycleReply, MessageKind, Topic};
use std::sync::{Arc, Weak};
use tessera_bus::{Request, Responder, Role, SubscriptionId, TopicFilter};
use tessera_core::LifecycleResult;

impl ObjectManager {
    /// Answer the object-level requests on the bus. The subscription holds
    /// the coordinator weakly; once it is dropped every request fails.
    pub fn attach(self: &Arc<Self>) -> SubscriptionId {
        let manager: Weak<ObjectManager> = Arc::downgrade(self);
        let filter = TopicFilter::new(MessageKind::OBJECT_SURFACE.into_iter().map(Topic::of));
        self.bus.subscribe(
            filter,
            move |request: Request<LifecycleMessage>, responder: Responder<LifecycleReply>| {
                let reply = match manager.upgrade() {
                    Some(manager) => manager.handle(request.message()),
                    None => LifecycleReply::Ack(false),
                };
                responder.reply(reply);
            },
            Role::Responder,
        )
    }

    fn handle(&self, message: &LifecycleMessage) -> LifecycleReply {
        use LifecycleMessage as M;

        match message {
            M::RegisterTemplate { template } => {
                LifecycleReply::Ack(logged("register template", self.register_template(template.clone())).is_some())
            }
            M::GetTemplate { name } => LifecycleReply::Template(self.get_template(name)),
            M::GetTemplateNames => LifecycleReply::Names(self.template_names()),
            M::GenerateObject {
                template_name,
                overrides,
            } => LifecycleReply::Oid(self.generate(template_name, overrides).ok()),
            M::LoadObject { target, namespaces } => {
                LifecycleReply::Oid(self.load(target, *namespaces).ok())
            }
            M::UnloadObject { oid, namespaces } => {
                LifecycleReply::Ack(logged("unload", self.unload(*oid, *namespaces)).is_some())
            }
            M::DeleteObject { oid } => {
                LifecycleReply::Ack(logged("delete", self.delete(*oid)).is_some())
            }
            M::SetPersistence { oid, persistent } => LifecycleReply::Ack(
                logged("set persistence", self.set_persistence(*oid, *persistent)).is_some(),
            ),
            M::SaveObject { oid, key } => {
                LifecycleReply::Ack(logged("save", self.save_object(*oid, key.clone())).is_some())
            }
            M::LoadObjectData { target, namespace } => LifecycleReply::Data(
                logged("load data", self.load_object_data(target, *namespace)).flatten(),
            ),
            M::SaveObjectData {
                oid,
                key,
                namespace,
                data,
            } => LifecycleReply::Ack(
                logged(
                    "save data",
                    self.save_object_data(*oid, key.as_deref(), *namespace, data),
                )
                .is_some(),
            ),
            M::FixWorldNode { oid, update } => LifecycleReply::Ack(
                logged("fix world node", self.fix_world_node(*oid, update)).unwrap_or(false),
            ),
            M::GetNamedObject {
                instance,
                name,
                object_type,
            } => LifecycleReply::Oid(
                logged("named lookup", self.get_named_object(*instance, name, *object_type)).flatten(),
            ),
            M::GetObjectStatus { oid } => {
                LifecycleReply::Status(logged("status", self.object_status(*oid)).flatten())
            }
            M::ObjectInstanceEntry {
                oid,
                destination,
                flag,
                restore,
            } => LifecycleReply::Ack(
                logged(
                    "instance entry",
                    self.object_instance_entry(*oid, destination.clone(), *flag, restore.clone()),
                )
                .is_some(),
            ),
            M::LoadInstanceContent { instance } => LifecycleReply::Ack(
                logged("load instance content", self.load_instance_content(*instance)).is_some(),
            ),
            other => {
                tracing::warn!(kind = ?other.kind(), "not an object request");
                LifecycleReply::Ack(false)
            }
        }
    }
}

fn logged<T>(operation: &str, result: LifecycleResult<T>) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(err) => {
            tracing::warn!(operation, error = %err, kind = ?err.kind(), "object request failed");
            None
        }
    }
}
