//! Tessera message bus
//!
//! Topic-routed request/response, broadcast RPC with reply aggregation, and
//! fire-and-forget publication between decoupled services in one process.

mod bus;
mod chain;
mod config;
mod error;
mod message;
mod responder;
mod subscription;

pub use bus::{BroadcastReplies, MessageBus};
pub use chain::ChainId;
pub use config::BusConfig;
pub use error::BusError;
pub use message::{Message, MessageId, Request};
pub use responder::Responder;
pub use subscription::{replying, Handler, Role, SubscriptionId, TopicFilter};
