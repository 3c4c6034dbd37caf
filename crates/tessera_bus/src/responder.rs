//! Reply correlation
//!
//! Every delivery that expects an answer parks a reply slot in the pending
//! table under its [`MessageId`]. The handler gets a [`Responder`] carrying
//! the same id; answering removes the slot and completes it. A responder
//! dropped without answering completes the slot with an error, so a waiting
//! caller never hangs on a handler that gave up.

use crate::{BusError, MessageId};
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::oneshot;

pub(crate) type ReplyCallback<R> = Box<dyn FnOnce(Result<R, BusError>) + Send + Sync>;

pub(crate) enum ReplySlot<R> {
    /// A caller blocked in `send` or `broadcast`.
    Waiting(oneshot::Sender<Result<R, BusError>>),
    /// A `send_async` callback, run on whichever thread completes the slot.
    Callback(ReplyCallback<R>),
}

impl<R> ReplySlot<R> {
    fn complete(self, outcome: Result<R, BusError>) {
        match self {
            ReplySlot::Waiting(tx) => {
                // The caller may have timed out and gone away
                let _ = tx.send(outcome);
            }
            ReplySlot::Callback(callback) => callback(outcome),
        }
    }
}

pub(crate) struct PendingTable<R> {
    slots: DashMap<MessageId, ReplySlot<R>>,
}

impl<R> PendingTable<R> {
    pub fn new() -> Self {
        Self {
            slots: DashMap::new(),
        }
    }

    pub fn park(&self, id: MessageId, slot: ReplySlot<R>) {
        self.slots.insert(id, slot);
    }

    /// Drop a slot without completing it (used when a broadcast times out).
    pub fn abandon(&self, id: MessageId) -> bool {
        self.slots.remove(&id).is_some()
    }

    fn complete(&self, id: MessageId, outcome: Result<R, BusError>) -> bool {
        // Remove before completing: the callback may re-enter the bus
        match self.slots.remove(&id) {
            Some((_, slot)) => {
                slot.complete(outcome);
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }
}

/// Handle a subscriber uses to answer one delivery.
///
/// May be moved to another thread and answered later.
pub struct Responder<R> {
    id: MessageId,
    pending: Arc<PendingTable<R>>,
    answered: bool,
}

impl<R> Responder<R> {
    pub(crate) fn new(id: MessageId, pending: Arc<PendingTable<R>>) -> Self {
        Self {
            id,
            pending,
            answered: false,
        }
    }

    pub fn request_id(&self) -> MessageId {
        self.id
    }

    /// Answer the delivery. Returns `false` when nobody is waiting any more
    /// (fire-and-forget publish, or a broadcast that already timed out).
    pub fn reply(mut self, reply: R) -> bool {
        self.answered = true;
        let delivered = self.pending.complete(self.id, Ok(reply));
        if !delivered {
            tracing::trace!(id = %self.id, "reply discarded, no caller waiting");
        }
        delivered
    }
}

impl<R> Drop for Responder<R> {
    fn drop(&mut self) {
        if !self.answered {
            self.pending
                .complete(self.id, Err(BusError::ResponderDropped { id: self.id }));
        }
    }
}
