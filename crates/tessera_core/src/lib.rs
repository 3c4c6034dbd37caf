//! Tessera Core
//!
//! Shared vocabulary of the lifecycle coordinators:
//! - Object ids and namespaces
//! - Creation templates
//! - Master entities and the namespace-scoped entity registry
//! - The lifecycle error taxonomy

pub mod entity;
pub mod error;
pub mod ids;
pub mod math;
pub mod namespace;
pub mod registry;
pub mod template;

pub use entity::{MasterEntity, MasterRecord, ObjectType};
pub use error::{ErrorKind, LifecycleError, LifecycleResult};
pub use ids::{ObjectId, ObjectIdAllocator};
pub use namespace::{Namespace, NamespaceSet, MAX_NAMESPACES};
pub use registry::EntityRegistry;
pub use template::{props, PropertyValue, Template};

pub use glam;

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
