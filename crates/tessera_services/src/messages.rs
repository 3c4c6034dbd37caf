//! Lifecycle message surface
//!
//! Every request the coordinators and plugins exchange, routed on the bus by
//! [`Topic`]. Object- and instance-level requests are addressed by kind
//! alone; per-namespace fan-out requests also carry the namespace so each
//! plugin only sees its own facet.

use serde::{Deserialize, Serialize};
use tessera_asset::{FieldMask, MarkerInfo, RegionInfo};
use tessera_bus::Message;
use tessera_core::glam::{Quat, Vec3};
use tessera_core::{Namespace, NamespaceSet, ObjectId, ObjectType, Template};

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum MessageKind {
    RegisterTemplate,
    GetTemplate,
    GetTemplateNames,
    GenerateObject,
    LoadObject,
    UnloadObject,
    DeleteObject,
    SetPersistence,
    SaveObject,
    LoadObjectData,
    SaveObjectData,
    FixWorldNode,
    GetNamedObject,
    GetObjectStatus,
    ObjectInstanceEntry,
    LoadInstanceContent,

    GenerateSubObject,
    LoadSubObject,
    UnloadSubObject,
    DeleteSubObject,
    SaveSubObject,
    SubObjectDepsReady,

    RegisterInstanceTemplate,
    CreateInstance,
    LoadInstance,
    UnloadInstance,
    DeleteInstance,
    GetInstanceInfo,
    GetMarker,
    GetRegion,

    InstanceUnloaded,
    InstanceDeleted,
    Spawned,
    Despawned,
}

impl MessageKind {
    /// Requests answered by the object coordinator.
    pub const OBJECT_SURFACE: [MessageKind; 16] = [
        MessageKind::RegisterTemplate,
        MessageKind::GetTemplate,
        MessageKind::GetTemplateNames,
        MessageKind::GenerateObject,
        MessageKind::LoadObject,
        MessageKind::UnloadObject,
        MessageKind::DeleteObject,
        MessageKind::SetPersistence,
        MessageKind::SaveObject,
        MessageKind::LoadObjectData,
        MessageKind::SaveObjectData,
        MessageKind::FixWorldNode,
        MessageKind::GetNamedObject,
        MessageKind::GetObjectStatus,
        MessageKind::ObjectInstanceEntry,
        MessageKind::LoadInstanceContent,
    ];

    /// Per-namespace requests answered by plugins.
    pub const SUB_OBJECT: [MessageKind; 6] = [
        MessageKind::GenerateSubObject,
        MessageKind::LoadSubObject,
        MessageKind::UnloadSubObject,
        MessageKind::DeleteSubObject,
        MessageKind::SaveSubObject,
        MessageKind::SubObjectDepsReady,
    ];

    /// Requests answered by the instance coordinator.
    pub const INSTANCE_SURFACE: [MessageKind; 8] = [
        MessageKind::RegisterInstanceTemplate,
        MessageKind::CreateInstance,
        MessageKind::LoadInstance,
        MessageKind::UnloadInstance,
        MessageKind::DeleteInstance,
        MessageKind::GetInstanceInfo,
        MessageKind::GetMarker,
        MessageKind::GetRegion,
    ];
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct Topic {
    pub kind: MessageKind,
    pub namespace: Option<Namespace>,
}

impl Topic {
    pub const fn of(kind: MessageKind) -> Self {
        Self {
            kind,
            namespace: None,
        }
    }

    pub const fn sub_object(kind: MessageKind, namespace: Namespace) -> Self {
        Self {
            kind,
            namespace: Some(namespace),
        }
    }
}

/// An object addressed by id or by its persistence key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ObjectRef {
    Oid(ObjectId),
    Key(String),
}

impl From<ObjectId> for ObjectRef {
    fn from(oid: ObjectId) -> Self {
        ObjectRef::Oid(oid)
    }
}

/// An instance addressed by id or by name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstanceRef {
    Oid(ObjectId),
    Name(String),
}

/// Partial update of a persisted world location.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorldNodeUpdate {
    pub instance: Option<ObjectId>,
    pub loc: Option<Vec3>,
    pub orient: Option<Quat>,
}

/// A position inside an instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstanceEntry {
    pub instance: ObjectId,
    pub loc: Vec3,
    #[serde(default)]
    pub orient: Quat,
}

/// What an instance entry does to the object's restore stack.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum EntryFlag {
    /// Move without touching the stack.
    None,
    /// Remember where the object was (or the supplied restore point), then move.
    Push,
    /// Return to the top of the stack, or to the destination if one is given.
    Pop,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectStatus {
    pub oid: ObjectId,
    pub name: String,
    pub object_type: ObjectType,
    pub persistent: bool,
    pub namespaces: NamespaceSet,
    pub loaded_namespaces: NamespaceSet,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum InstanceLoadResult {
    Ok,
    UnknownObject,
    NoWorkerAvailable,
    Retry,
    InternalError,
}

/// Lifecycle phase of an instance as seen by its hosting plugin.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum InstancePhase {
    Generate,
    Load,
    Available,
    Unload,
    Delete,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct InstanceInfo {
    pub oid: ObjectId,
    pub loaded: bool,
    pub name: Option<String>,
    pub template_name: Option<String>,
    pub phase: Option<InstancePhase>,
    pub world_file: Option<String>,
    pub worker: Option<String>,
    pub population: Option<i64>,
    pub content: Option<usize>,
}

/// Field selection for [`InstanceInfo`]; reuses the world-file mask bits for
/// the name and adds instance-specific ones above them.
pub mod info_fields {
    use tessera_asset::FieldMask;

    pub const NAME: FieldMask = FieldMask::NAME;
    pub const TEMPLATE_NAME: FieldMask = FieldMask(1 << 8);
    pub const PHASE: FieldMask = FieldMask(1 << 9);
    pub const WORLD_FILE: FieldMask = FieldMask(1 << 10);
    pub const WORKER: FieldMask = FieldMask(1 << 11);
    pub const POPULATION: FieldMask = FieldMask(1 << 12);
    pub const CONTENT: FieldMask = FieldMask(1 << 13);
}

#[derive(Debug, Clone)]
pub enum LifecycleMessage {
    RegisterTemplate {
        template: Template,
    },
    GetTemplate {
        name: String,
    },
    GetTemplateNames,
    GenerateObject {
        template_name: String,
        overrides: Template,
    },
    LoadObject {
        target: ObjectRef,
        namespaces: Option<NamespaceSet>,
    },
    UnloadObject {
        oid: ObjectId,
        namespaces: Option<NamespaceSet>,
    },
    DeleteObject {
        oid: ObjectId,
    },
    SetPersistence {
        oid: ObjectId,
        persistent: bool,
    },
    SaveObject {
        oid: ObjectId,
        key: Option<String>,
    },
    LoadObjectData {
        target: ObjectRef,
        namespace: Namespace,
    },
    SaveObjectData {
        oid: ObjectId,
        key: Option<String>,
        namespace: Namespace,
        data: Vec<u8>,
    },
    FixWorldNode {
        oid: ObjectId,
        update: WorldNodeUpdate,
    },
    GetNamedObject {
        instance: Option<ObjectId>,
        name: String,
        object_type: Option<ObjectType>,
    },
    GetObjectStatus {
        oid: ObjectId,
    },
    ObjectInstanceEntry {
        oid: ObjectId,
        destination: Option<InstanceEntry>,
        flag: EntryFlag,
        restore: Option<InstanceEntry>,
    },
    LoadInstanceContent {
        instance: ObjectId,
    },

    GenerateSubObject {
        oid: ObjectId,
        namespace: Namespace,
        template: Template,
        persistent: bool,
    },
    LoadSubObject {
        oid: ObjectId,
        namespace: Namespace,
        data: Option<Vec<u8>>,
    },
    UnloadSubObject {
        oid: ObjectId,
        namespace: Namespace,
    },
    DeleteSubObject {
        oid: ObjectId,
        namespace: Namespace,
    },
    SaveSubObject {
        oid: ObjectId,
        namespace: Namespace,
    },
    SubObjectDepsReady {
        oid: ObjectId,
        namespace: Namespace,
    },

    RegisterInstanceTemplate {
        template: Template,
    },
    CreateInstance {
        template_name: String,
        overrides: Template,
    },
    LoadInstance {
        oid: ObjectId,
    },
    UnloadInstance {
        oid: ObjectId,
    },
    DeleteInstance {
        oid: ObjectId,
    },
    GetInstanceInfo {
        target: InstanceRef,
        mask: FieldMask,
    },
    GetMarker {
        instance: ObjectId,
        name: String,
        mask: FieldMask,
    },
    GetRegion {
        instance: ObjectId,
        name: String,
        mask: FieldMask,
    },

    InstanceUnloaded {
        instance: ObjectId,
    },
    InstanceDeleted {
        instance: ObjectId,
    },
    Spawned {
        oid: ObjectId,
        instance: ObjectId,
        object_type: ObjectType,
    },
    Despawned {
        oid: ObjectId,
        instance: ObjectId,
        object_type: ObjectType,
    },
}

impl LifecycleMessage {
    pub fn kind(&self) -> MessageKind {
        use LifecycleMessage as M;
        match self {
            M::RegisterTemplate { .. } => MessageKind::RegisterTemplate,
            M::GetTemplate { .. } => MessageKind::GetTemplate,
            M::GetTemplateNames => MessageKind::GetTemplateNames,
            M::GenerateObject { .. } => MessageKind::GenerateObject,
            M::LoadObject { .. } => MessageKind::LoadObject,
            M::UnloadObject { .. } => MessageKind::UnloadObject,
            M::DeleteObject { .. } => MessageKind::DeleteObject,
            M::SetPersistence { .. } => MessageKind::SetPersistence,
            M::SaveObject { .. } => MessageKind::SaveObject,
            M::LoadObjectData { .. } => MessageKind::LoadObjectData,
            M::SaveObjectData { .. } => MessageKind::SaveObjectData,
            M::FixWorldNode { .. } => MessageKind::FixWorldNode,
            M::GetNamedObject { .. } => MessageKind::GetNamedObject,
            M::GetObjectStatus { .. } => MessageKind::GetObjectStatus,
            M::ObjectInstanceEntry { .. } => MessageKind::ObjectInstanceEntry,
            M::LoadInstanceContent { .. } => MessageKind::LoadInstanceContent,
            M::GenerateSubObject { .. } => MessageKind::GenerateSubObject,
            M::LoadSubObject { .. } => MessageKind::LoadSubObject,
            M::UnloadSubObject { .. } => MessageKind::UnloadSubObject,
            M::DeleteSubObject { .. } => MessageKind::DeleteSubObject,
            M::SaveSubObject { .. } => MessageKind::SaveSubObject,
            M::SubObjectDepsReady { .. } => MessageKind::SubObjectDepsReady,
            M::RegisterInstanceTemplate { .. } => MessageKind::RegisterInstanceTemplate,
            M::CreateInstance { .. } => MessageKind::CreateInstance,
            M::LoadInstance { .. } => MessageKind::LoadInstance,
            M::UnloadInstance { .. } => MessageKind::UnloadInstance,
            M::DeleteInstance { .. } => MessageKind::DeleteInstance,
            M::GetInstanceInfo { .. } => MessageKind::GetInstanceInfo,
            M::GetMarker { .. } => MessageKind::GetMarker,
            M::GetRegion { .. } => MessageKind::GetRegion,
            M::InstanceUnloaded { .. } => MessageKind::InstanceUnloaded,
            M::InstanceDeleted { .. } => MessageKind::InstanceDeleted,
            M::Spawned { .. } => MessageKind::Spawned,
            M::Despawned { .. } => MessageKind::Despawned,
        }
    }

    /// Namespace a fan-out request is addressed to.
    pub fn namespace(&self) -> Option<Namespace> {
        use LifecycleMessage as M;
        match self {
            M::GenerateSubObject { namespace, .. }
            | M::LoadSubObject { namespace, .. }
            | M::UnloadSubObject { namespace, .. }
            | M::DeleteSubObject { namespace, .. }
            | M::SaveSubObject { namespace, .. }
            | M::SubObjectDepsReady { namespace, .. } => Some(*namespace),
            _ => None,
        }
    }
}

impl Message for LifecycleMessage {
    type Topic = Topic;
    type Reply = LifecycleReply;

    fn topic(&self) -> Topic {
        Topic {
            kind: self.kind(),
            namespace: self.namespace(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum LifecycleReply {
    Ack(bool),
    Oid(Option<ObjectId>),
    /// Sub-object created; lists the namespaces it waits on.
    Generated(Option<Vec<Namespace>>),
    Template(Option<Template>),
    Names(Vec<String>),
    Data(Option<Vec<u8>>),
    Status(Option<ObjectStatus>),
    InstanceLoad(InstanceLoadResult),
    InstanceInfo(Option<InstanceInfo>),
    Marker(Option<MarkerInfo>),
    Region(Option<RegionInfo>),
}

impl LifecycleReply {
    /// `true` only for a positive acknowledgement.
    pub fn is_ack(&self) -> bool {
        matches!(self, LifecycleReply::Ack(true))
    }

    pub fn into_oid(self) -> Option<ObjectId> {
        match self {
            LifecycleReply::Oid(oid) => oid,
            _ => None,
        }
    }

    pub fn into_dependencies(self) -> Option<Vec<Namespace>> {
        match self {
            LifecycleReply::Generated(deps) => deps,
            _ => None,
        }
    }

    pub fn into_data(self) -> Option<Vec<u8>> {
        match self {
            LifecycleReply::Data(data) => data,
            _ => None,
        }
    }

    pub fn into_template(self) -> Option<Template> {
        match self {
            LifecycleReply::Template(template) => template,
            _ => None,
        }
    }

    pub fn into_instance_load(self) -> InstanceLoadResult {
        match self {
            LifecycleReply::InstanceLoad(result) => result,
            _ => InstanceLoadResult::InternalError,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fan_out_topics_carry_namespace() {
        let msg = LifecycleMessage::LoadSubObject {
            oid: ObjectId::from_raw(1),
            namespace: Namespace::INVENTORY,
            data: None,
        };
        assert_eq!(
            msg.topic(),
            Topic::sub_object(MessageKind::LoadSubObject, Namespace::INVENTORY)
        );

        let msg = LifecycleMessage::DeleteObject {
            oid: ObjectId::from_raw(1),
        };
        assert_eq!(msg.topic(), Topic::of(MessageKind::DeleteObject));
    }

    #[test]
    fn mismatched_replies_read_as_failure() {
        assert!(!LifecycleReply::Oid(None).is_ack());
        assert_eq!(LifecycleReply::Ack(true).into_oid(), None);
        assert_eq!(
            LifecycleReply::Ack(true).into_instance_load(),
            InstanceLoadResult::InternalError
        );
    }
}
