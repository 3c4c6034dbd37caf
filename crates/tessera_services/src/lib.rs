//! Tessera Services
//!
//! Lifecycle coordination for distributed objects:
//! - Object coordinator: generate, load, unload, delete across namespaces
//! - Instance coordinator: world partitions, placement and unique names
//! - Plugin host: per-namespace capability dispatch
//! - Persistence contract, settings and the hosting-worker directory

pub mod instance;
pub mod messages;
pub mod object_manager;
pub mod persistence;
pub mod plugin;
pub mod property_bag;
pub mod server;
pub mod settings;
pub mod workers;

pub use instance::InstanceCoordinator;
pub use messages::{LifecycleMessage, LifecycleReply, MessageKind, Topic};
pub use object_manager::ObjectManager;
pub use persistence::{MemoryStore, PersistenceError, PersistenceStore};
pub use plugin::PluginHost;
pub use property_bag::PropertyBagPlugin;
pub use server::{Services, StartError};
pub use settings::Settings;
pub use workers::WorkerDirectory;
