//! Message trait and request envelopes

use std::fmt;
use std::hash::Hash;
use std::sync::Arc;

/// A message the bus can route.
///
/// The topic selects subscribers; the reply type is what a responder (or a
/// broadcast subscriber) answers with.
pub trait Message: Send + Sync + 'static {
    type Topic: Copy + Eq + Hash + fmt::Debug + Send + Sync + 'static;
    type Reply: Send + 'static;

    fn topic(&self) -> Self::Topic;
}

/// Unique id of one delivery. Replies are matched back to the waiting caller
/// by this id.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MessageId(pub u64);

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "msg#{}", self.0)
    }
}

/// A message as seen by a handler.
pub struct Request<M> {
    id: MessageId,
    message: Arc<M>,
}

impl<M: Message> Request<M> {
    pub(crate) fn new(id: MessageId, message: Arc<M>) -> Self {
        Self { id, message }
    }

    pub fn id(&self) -> MessageId {
        self.id
    }

    pub fn message(&self) -> &M {
        &self.message
    }

    pub fn topic(&self) -> M::Topic {
        self.message.topic()
    }
}

impl<M> Clone for Request<M> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            message: self.message.clone(),
        }
    }
}

impl<M: fmt::Debug> fmt::Debug for Request<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Request")
            .field("id", &self.id)
            .field("message", &self.message)
            .finish()
    }
}
