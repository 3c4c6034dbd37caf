use super::InstanceCoordinator;
use crate::messages::{InstanceLoadResult, LifecycleMessage, LifecycleReply, MessageKind, Topic};
use std::sync::{Arc, Weak};
use tessera_bus::{Request, Responder, Role, SubscriptionId, TopicFilter};
use tessera_core::LifecycleResult;

impl InstanceCoordinator {
    /// Answer instance requests and follow player spawns for population
    /// counts. Returns the responder and listener subscriptions.
    pub fn attach(self: &Arc<Self>) -> [SubscriptionId; 2] {
        let bus = self.bus();

        let coordinator: Weak<InstanceCoordinator> = Arc::downgrade(self);
        let requests = bus.subscribe(
            TopicFilter::new(MessageKind::INSTANCE_SURFACE.into_iter().map(Topic::of)),
            move |request: Request<LifecycleMessage>, responder: Responder<LifecycleReply>| {
                let reply = match coordinator.upgrade() {
                    Some(coordinator) => coordinator.handle(request.message()),
                    None => LifecycleReply::Ack(false),
                };
                responder.reply(reply);
            },
            Role::Responder,
        );

        let coordinator: Weak<InstanceCoordinator> = Arc::downgrade(self);
        let population = bus.subscribe(
            TopicFilter::new([
                Topic::of(MessageKind::Spawned),
                Topic::of(MessageKind::Despawned),
            ]),
            move |request: Request<LifecycleMessage>, responder: Responder<LifecycleReply>| {
                if let Some(coordinator) = coordinator.upgrade() {
                    coordinator.observe_spawn(request.message());
                }
                responder.reply(LifecycleReply::Ack(true));
            },
            Role::Listener,
        );

        [requests, population]
    }

    fn observe_spawn(&self, message: &LifecycleMessage) {
        let (instance, delta) = match message {
            LifecycleMessage::Spawned {
                instance,
                object_type,
                ..
            } if object_type.is_player() => (*instance, 1),
            LifecycleMessage::Despawned {
                instance,
                object_type,
                ..
            } if object_type.is_player() => (*instance, -1),
            _ => return,
        };
        self.apply_population(instance, delta);
    }

    fn handle(&self, message: &LifecycleMessage) -> LifecycleReply {
        use LifecycleMessage as M;

        match message {
            M::RegisterInstanceTemplate { template } => LifecycleReply::Ack(
                logged("register instance template", self.register_template(template.clone()))
                    .is_some(),
            ),
            M::CreateInstance {
                template_name,
                overrides,
            } => LifecycleReply::Oid(logged("create instance", self.create(template_name, overrides))),
            M::LoadInstance { oid } => {
                let result = self.load(*oid);
                if result != InstanceLoadResult::Ok {
                    tracing::debug!(instance = %oid, ?result, "instance load not done");
                }
                LifecycleReply::InstanceLoad(result)
            }
            M::UnloadInstance { oid } => {
                LifecycleReply::Ack(logged("unload instance", self.unload(*oid)).is_some())
            }
            M::DeleteInstance { oid } => {
                LifecycleReply::Ack(logged("delete instance", self.delete(*oid)).is_some())
            }
            M::GetInstanceInfo { target, mask } => LifecycleReply::InstanceInfo(
                logged("instance info", self.get_instance_info(target, *mask)).flatten(),
            ),
            M::GetMarker {
                instance,
                name,
                mask,
            } => LifecycleReply::Marker(self.get_marker(*instance, name, *mask)),
            M::GetRegion {
                instance,
                name,
                mask,
            } => LifecycleReply::Region(self.get_region(*instance, name, *mask)),
            other => {
                tracing::warn!(kind = ?other.kind(), "not an instance request");
                LifecycleReply::Ack(false)
            }
        }
    }
}

fn logged<T>(operation: &str, result: LifecycleResult<T>) -> Option<T> {
    result
        .map_err(|err| tracing::warn!(operation, error = %err, kind = ?err.kind(), "instance request failed"))
        .ok()
}
