//! Subscriptions and handlers

use crate::{Message, Request, Responder};
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

/// Handle returned by `subscribe`, used to unsubscribe.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct SubscriptionId(pub(crate) u64);

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub#{}", self.0)
    }
}

/// Whether a subscriber answers point-to-point requests or only listens to
/// broadcasts and publications.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Role {
    /// The single subscriber expected to answer `send`/`send_async`.
    Responder,
    /// Receives `broadcast` and `publish` deliveries.
    Listener,
}

/// Set of topics a subscription matches.
#[derive(Debug, Clone)]
pub struct TopicFilter<T> {
    topics: HashSet<T>,
}

impl<T> TopicFilter<T>
where
    T: Copy + Eq + std::hash::Hash,
{
    pub fn new<I: IntoIterator<Item = T>>(topics: I) -> Self {
        Self {
            topics: topics.into_iter().collect(),
        }
    }

    pub fn single(topic: T) -> Self {
        Self::new([topic])
    }

    pub fn matches(&self, topic: &T) -> bool {
        self.topics.contains(topic)
    }

    pub fn topics(&self) -> impl Iterator<Item = &T> {
        self.topics.iter()
    }
}

/// Something that processes deliveries of `M`.
///
/// Handlers run on the bus's blocking pool and may themselves issue blocking
/// `send` calls.
pub trait Handler<M: Message>: Send + Sync + 'static {
    fn handle(&self, request: Request<M>, responder: Responder<M::Reply>);
}

impl<M, F> Handler<M> for F
where
    M: Message,
    F: Fn(Request<M>, Responder<M::Reply>) + Send + Sync + 'static,
{
    fn handle(&self, request: Request<M>, responder: Responder<M::Reply>) {
        self(request, responder)
    }
}

/// Adapt a plain function into a handler that answers synchronously.
pub fn replying<M, F>(f: F) -> impl Handler<M>
where
    M: Message,
    F: Fn(&M) -> M::Reply + Send + Sync + 'static,
{
    move |request: Request<M>, responder: Responder<M::Reply>| {
        let reply = f(request.message());
        responder.reply(reply);
    }
}

pub(crate) struct Subscription<M: Message> {
    pub id: SubscriptionId,
    pub filter: TopicFilter<M::Topic>,
    pub role: Role,
    pub handler: Arc<dyn Handler<M>>,
}
