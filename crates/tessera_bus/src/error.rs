use crate::MessageId;
use thiserror::Error;

/// Errors surfaced to callers of the bus.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BusError {
    #[error("no responder subscribed for {topic}")]
    NoRecipients { topic: String },

    #[error("responder for {id} went away without replying")]
    ResponderDropped { id: MessageId },

    #[error("bus runtime unavailable: {reason}")]
    Runtime { reason: String },
}
