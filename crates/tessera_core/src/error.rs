use crate::{Namespace, ObjectId};
use thiserror::Error;

/// Coarse classification of lifecycle failures.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Unknown id, key, name, or template.
    NotFound,
    /// Duplicate unique name or duplicate registration.
    AlreadyExists,
    /// A conflicting instance operation is in flight; retry later.
    Busy,
    /// No hosting worker or no responder.
    Unavailable,
    /// Some fanned-out namespace operations failed while others succeeded.
    PartialFailure,
    Internal,
}

/// Errors raised by the lifecycle coordinators.
///
/// These never cross the message boundary; handlers log them and reply with
/// `None`, `false`, or a result code.
#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("template '{name}' is not registered")]
    TemplateNotFound { name: String },

    #[error("template '{name}' is already registered")]
    DuplicateTemplate { name: String },

    #[error("unknown object {oid}")]
    UnknownObject { oid: ObjectId },

    #[error("unknown object key '{key}'")]
    UnknownKey { key: String },

    #[error("{oid} is not a master object")]
    NotMaster { oid: ObjectId },

    #[error("{oid} is not an instance")]
    NotInstance { oid: ObjectId },

    #[error("failed to create sub-object {namespace} for {oid}")]
    SubObjectCreationFailed { oid: ObjectId, namespace: Namespace },

    #[error("failed to load sub-object {namespace} for {oid}")]
    SubObjectLoadFailed { oid: ObjectId, namespace: Namespace },

    #[error("dependency cycle among {namespaces:?} for {oid}")]
    DependencyCycle {
        oid: ObjectId,
        namespaces: Vec<Namespace>,
    },

    #[error("{failed} of {attempted} namespace operations failed for {oid}")]
    PartialFailure {
        oid: ObjectId,
        failed: usize,
        attempted: usize,
    },

    #[error("instance name '{name}' is already in use")]
    DuplicateName { name: String },

    #[error("instance {instance} is busy ({status})")]
    InstanceBusy { instance: ObjectId, status: String },

    #[error("{oid} is already being loaded by this request")]
    LoadInProgress { oid: ObjectId },

    #[error("instance {instance} is not loaded")]
    InstanceNotLoaded { instance: ObjectId },

    #[error("no hosting worker of kind '{kind}' is available")]
    NoWorkerAvailable { kind: String },

    #[error("no responder for {topic}")]
    NoResponder { topic: String },

    #[error("file '{path}' is not readable")]
    UnreadableFile { path: String },

    #[error("could not encode or decode {oid}: {reason}")]
    Codec { oid: ObjectId, reason: String },

    #[error("persistence error: {0}")]
    Persistence(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl LifecycleError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            LifecycleError::TemplateNotFound { .. }
            | LifecycleError::UnknownObject { .. }
            | LifecycleError::UnknownKey { .. }
            | LifecycleError::NotMaster { .. }
            | LifecycleError::NotInstance { .. }
            | LifecycleError::InstanceNotLoaded { .. }
            | LifecycleError::UnreadableFile { .. } => ErrorKind::NotFound,
            LifecycleError::DuplicateTemplate { .. } | LifecycleError::DuplicateName { .. } => {
                ErrorKind::AlreadyExists
            }
            LifecycleError::InstanceBusy { .. } | LifecycleError::LoadInProgress { .. } => {
                ErrorKind::Busy
            }
            LifecycleError::NoWorkerAvailable { .. } | LifecycleError::NoResponder { .. } => {
                ErrorKind::Unavailable
            }
            LifecycleError::PartialFailure { .. } => ErrorKind::PartialFailure,
            LifecycleError::SubObjectCreationFailed { .. }
            | LifecycleError::SubObjectLoadFailed { .. }
            | LifecycleError::DependencyCycle { .. }
            | LifecycleError::Codec { .. }
            | LifecycleError::Persistence(_)
            | LifecycleError::Internal(_) => ErrorKind::Internal,
        }
    }
}

pub type LifecycleResult<T> = Result<T, LifecycleError>;
