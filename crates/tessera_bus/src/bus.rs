//! In-process message bus
//!
//! Request/response correlation, topic subscription, and broadcast-RPC
//! aggregation. Every delivery runs its handler on the bus runtime's blocking
//! pool, so a handler can block in a nested `send` without starving other
//! deliveries. The synchronous entry points (`send`, `broadcast`) block the
//! calling thread and must not be used from inside an async task. Handlers
//! run on the sender's [`ChainId`].

use crate::chain;
use crate::responder::{PendingTable, ReplySlot};
use crate::subscription::Subscription;
use crate::{
    BusConfig, BusError, ChainId, Handler, Message, MessageId, Request, Responder, Role, SubscriptionId,
    TopicFilter,
};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::runtime::{Handle, Runtime};
use tokio::sync::oneshot;

/// Outcome of a broadcast.
#[derive(Debug)]
pub struct BroadcastReplies<R> {
    /// Replies in subscriber order; subscribers that failed are absent.
    pub replies: Vec<R>,
    /// Subscribers the broadcast was delivered to.
    pub delivered: usize,
    /// Subscribers that did not answer before the timeout.
    pub timed_out: usize,
    /// Subscribers that dropped their responder without answering.
    pub failed: usize,
}

impl<R> BroadcastReplies<R> {
    /// True when every subscriber answered.
    pub fn all_replied(&self) -> bool {
        self.replies.len() == self.delivered
    }
}

struct BusInner<M: Message> {
    config: BusConfig,
    runtime: Option<Runtime>,
    handle: Handle,
    subscriptions: RwLock<Vec<Arc<Subscription<M>>>>,
    pending: Arc<PendingTable<M::Reply>>,
    next_message_id: AtomicU64,
    next_subscription_id: AtomicU64,
}

impl<M: Message> Drop for BusInner<M> {
    fn drop(&mut self) {
        // The last handle may be released on one of the runtime's own threads
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_background();
        }
    }
}

/// Cheaply clonable handle to a bus.
pub struct MessageBus<M: Message> {
    inner: Arc<BusInner<M>>,
}

impl<M: Message> Clone for MessageBus<M> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<M: Message> MessageBus<M> {
    pub fn new(config: BusConfig) -> Result<Self, BusError> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(config.worker_threads.max(1))
            .max_blocking_threads(config.max_handler_threads.max(1))
            .thread_name("tessera-bus")
            .enable_all()
            .build()
            .map_err(|e| BusError::Runtime {
                reason: e.to_string(),
            })?;
        let handle = runtime.handle().clone();

        tracing::debug!(
            broadcast_timeout_ms = ?config.broadcast_timeout_ms,
            max_handler_threads = config.max_handler_threads,
            "message bus started"
        );

        Ok(Self {
            inner: Arc::new(BusInner {
                config,
                runtime: Some(runtime),
                handle,
                subscriptions: RwLock::new(Vec::new()),
                pending: Arc::new(PendingTable::new()),
                next_message_id: AtomicU64::new(1),
                next_subscription_id: AtomicU64::new(1),
            }),
        })
    }

    pub fn config(&self) -> &BusConfig {
        &self.inner.config
    }

    /// Register `handler` for every topic in `filter`.
    ///
    /// Only one responder per topic is consulted; if several are registered
    /// the earliest subscription wins.
    pub fn subscribe<H>(&self, filter: TopicFilter<M::Topic>, handler: H, role: Role) -> SubscriptionId
    where
        H: Handler<M>,
    {
        let id = SubscriptionId(self.inner.next_subscription_id.fetch_add(1, Ordering::Relaxed));
        let subscription = Arc::new(Subscription {
            id,
            filter,
            role,
            handler: Arc::new(handler),
        });
        self.inner.subscriptions.write().push(subscription);
        tracing::trace!(subscription = %id, ?role, "subscribed");
        id
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subscriptions = self.inner.subscriptions.write();
        let before = subscriptions.len();
        subscriptions.retain(|s| s.id != id);
        before != subscriptions.len()
    }

    pub fn has_responder(&self, topic: M::Topic) -> bool {
        self.responder_for(&topic).is_some()
    }

    /// Number of replies still outstanding.
    pub fn pending_replies(&self) -> usize {
        self.inner.pending.len()
    }

    /// Deliver to the topic's responder and block until it answers.
    pub fn send(&self, message: M) -> Result<M::Reply, BusError> {
        let topic = message.topic();
        let subscription = self
            .responder_for(&topic)
            .ok_or_else(|| no_recipients(&topic))?;

        let id = self.next_id();
        let (tx, rx) = oneshot::channel();
        self.inner.pending.park(id, ReplySlot::Waiting(tx));
        self.dispatch(&subscription, Request::new(id, Arc::new(message)));

        match rx.blocking_recv() {
            Ok(outcome) => outcome,
            Err(_) => Err(BusError::ResponderDropped { id }),
        }
    }

    /// Deliver to the topic's responder and return at once.
    ///
    /// `callback` runs exactly once: with the reply on the thread that
    /// answered, or with the error. With no responder it runs immediately on
    /// the calling thread.
    pub fn send_async<F>(&self, message: M, callback: F) -> Option<MessageId>
    where
        F: FnOnce(Result<M::Reply, BusError>) + Send + Sync + 'static,
    {
        let topic = message.topic();
        let Some(subscription) = self.responder_for(&topic) else {
            callback(Err(no_recipients(&topic)));
            return None;
        };

        let id = self.next_id();
        self.inner
            .pending
            .park(id, ReplySlot::Callback(Box::new(callback)));
        self.dispatch(&subscription, Request::new(id, Arc::new(message)));
        Some(id)
    }

    /// Deliver to every listener of the topic and wait for all of them, or
    /// until the configured per-subscriber timeout elapses.
    pub fn broadcast(&self, message: M) -> BroadcastReplies<M::Reply> {
        let topic = message.topic();
        let listeners = self.listeners_for(&topic);
        let message = Arc::new(message);

        let mut waiting = Vec::with_capacity(listeners.len());
        for subscription in &listeners {
            let id = self.next_id();
            let (tx, rx) = oneshot::channel();
            self.inner.pending.park(id, ReplySlot::Waiting(tx));
            self.dispatch(subscription, Request::new(id, message.clone()));
            waiting.push((id, rx));
        }

        let delivered = waiting.len();
        let timeout = self.inner.config.broadcast_timeout();
        let pending = self.inner.pending.clone();

        let (replies, timed_out, failed) = self.inner.handle.block_on(async move {
            let deadline = timeout.map(|t| tokio::time::Instant::now() + t);
            let mut replies = Vec::with_capacity(waiting.len());
            let mut timed_out = 0usize;
            let mut failed = 0usize;

            for (id, rx) in waiting {
                let outcome = match deadline {
                    Some(deadline) => match tokio::time::timeout_at(deadline, rx).await {
                        Ok(outcome) => outcome,
                        Err(_) => {
                            pending.abandon(id);
                            timed_out += 1;
                            continue;
                        }
                    },
                    None => rx.await,
                };
                match outcome {
                    Ok(Ok(reply)) => replies.push(reply),
                    _ => failed += 1,
                }
            }
            (replies, timed_out, failed)
        });

        if timed_out > 0 || failed > 0 {
            tracing::warn!(?topic, delivered, timed_out, failed, "broadcast incomplete");
        }

        BroadcastReplies {
            replies,
            delivered,
            timed_out,
            failed,
        }
    }

    /// Fire-and-forget delivery to every listener. Replies are discarded.
    pub fn publish(&self, message: M) -> usize {
        let topic = message.topic();
        let listeners = self.listeners_for(&topic);
        let message = Arc::new(message);
        for subscription in &listeners {
            let id = self.next_id();
            self.dispatch(subscription, Request::new(id, message.clone()));
        }
        listeners.len()
    }

    fn dispatch(&self, subscription: &Arc<Subscription<M>>, request: Request<M>) {
        let handler = subscription.handler.clone();
        let responder = Responder::new(request.id(), self.inner.pending.clone());
        let origin = ChainId::current();
        tracing::trace!(id = %request.id(), subscription = %subscription.id, chain = %origin, "dispatch");
        self.inner
            .handle
            .spawn_blocking(move || chain::within(origin, || handler.handle(request, responder)));
    }

    fn responder_for(&self, topic: &M::Topic) -> Option<Arc<Subscription<M>>> {
        self.inner
            .subscriptions
            .read()
            .iter()
            .find(|s| s.role == Role::Responder && s.filter.matches(topic))
            .cloned()
    }

    fn listeners_for(&self, topic: &M::Topic) -> Vec<Arc<Subscription<M>>> {
        self.inner
            .subscriptions
            .read()
            .iter()
            .filter(|s| s.role == Role::Listener && s.filter.matches(topic))
            .cloned()
            .collect()
    }

    fn next_id(&self) -> MessageId {
        MessageId(self.inner.next_message_id.fetch_add(1, Ordering::Relaxed))
    }
}

fn no_recipients<T: std::fmt::Debug>(topic: &T) -> BusError {
    BusError::NoRecipients {
        topic: format!("{:?}", topic),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::replying;
    use std::sync::mpsc;
    use std::time::Duration;

    #[derive(Debug)]
    enum Ping {
        Echo(u32),
        Double(u32),
        Announce,
    }

    impl Message for Ping {
        type Topic = &'static str;
        type Reply = u32;

        fn topic(&self) -> &'static str {
            match self {
                Ping::Echo(_) => "echo",
                Ping::Double(_) => "double",
                Ping::Announce => "announce",
            }
        }
    }

    fn bus(timeout_ms: Option<u64>) -> MessageBus<Ping> {
        MessageBus::new(BusConfig {
            broadcast_timeout_ms: timeout_ms,
            ..BusConfig::default()
        })
        .expect("bus")
    }

    #[test]
    fn send_returns_correlated_reply() {
        let bus = bus(None);
        bus.subscribe(
            TopicFilter::single("echo"),
            replying(|m: &Ping| match m {
                Ping::Echo(v) => *v,
                _ => 0,
            }),
            Role::Responder,
        );
        assert_eq!(bus.send(Ping::Echo(5)), Ok(5));
        assert_eq!(bus.pending_replies(), 0);
    }

    #[test]
    fn send_without_responder_fails_fast() {
        let bus = bus(None);
        bus.subscribe(TopicFilter::single("echo"), replying(|_: &Ping| 1), Role::Listener);
        assert!(matches!(bus.send(Ping::Echo(1)), Err(BusError::NoRecipients { .. })));
    }

    #[test]
    fn handlers_may_reenter_the_bus() {
        let bus = bus(None);
        bus.subscribe(
            TopicFilter::single("echo"),
            replying(|m: &Ping| match m {
                Ping::Echo(v) => *v,
                _ => 0,
            }),
            Role::Responder,
        );
        let inner = bus.clone();
        bus.subscribe(
            TopicFilter::single("double"),
            move |request: Request<Ping>, responder: Responder<u32>| {
                if let Ping::Double(v) = request.message() {
                    let echoed = inner.send(Ping::Echo(*v)).unwrap_or(0);
                    responder.reply(echoed * 2);
                }
            },
            Role::Responder,
        );
        assert_eq!(bus.send(Ping::Double(21)), Ok(42));
    }

    #[test]
    fn nested_deliveries_stay_on_the_senders_chain() {
        let bus = bus(None);
        let (tx, rx) = mpsc::channel();
        let tx = parking_lot::Mutex::new(tx);
        bus.subscribe(
            TopicFilter::single("echo"),
            move |_: Request<Ping>, responder: Responder<u32>| {
                tx.lock().send(ChainId::current()).ok();
                responder.reply(0);
            },
            Role::Responder,
        );
        let inner = bus.clone();
        bus.subscribe(
            TopicFilter::single("double"),
            move |_: Request<Ping>, responder: Responder<u32>| {
                responder.reply(inner.send(Ping::Echo(0)).unwrap_or(1));
            },
            Role::Responder,
        );

        assert_eq!(bus.send(Ping::Double(0)), Ok(0));
        assert_eq!(rx.recv_timeout(Duration::from_secs(5)), Ok(ChainId::current()));

        let other = std::thread::spawn({
            let bus = bus.clone();
            move || {
                bus.send(Ping::Echo(0)).ok();
                ChainId::current()
            }
        })
        .join()
        .unwrap();
        assert_eq!(rx.recv_timeout(Duration::from_secs(5)), Ok(other));
        assert_ne!(other, ChainId::current());
    }

    #[test]
    fn dropped_responder_fails_the_call() {
        let bus = bus(None);
        bus.subscribe(
            TopicFilter::single("echo"),
            |_: Request<Ping>, responder: Responder<u32>| drop(responder),
            Role::Responder,
        );
        assert!(matches!(bus.send(Ping::Echo(1)), Err(BusError::ResponderDropped { .. })));
    }

    #[test]
    fn send_async_invokes_callback_once() {
        let bus = bus(None);
        bus.subscribe(TopicFilter::single("echo"), replying(|_: &Ping| 9), Role::Responder);

        let (tx, rx) = mpsc::channel();
        let id = bus.send_async(Ping::Echo(0), move |r| {
            tx.send(r).ok();
        });
        assert!(id.is_some());
        assert_eq!(rx.recv_timeout(Duration::from_secs(5)).expect("callback"), Ok(9));
        assert!(rx.recv_timeout(Duration::from_millis(50)).is_err());
    }

    #[test]
    fn send_async_without_responder_calls_back_with_error() {
        let bus = bus(None);
        let (tx, rx) = mpsc::channel();
        assert!(bus
            .send_async(Ping::Echo(0), move |r| {
                tx.send(r).ok();
            })
            .is_none());
        assert!(matches!(rx.recv(), Ok(Err(BusError::NoRecipients { .. }))));
    }

    #[test]
    fn broadcast_waits_for_every_listener() {
        let bus = bus(None);
        for n in 1..=3u32 {
            bus.subscribe(
                TopicFilter::single("announce"),
                move |_: Request<Ping>, responder: Responder<u32>| {
                    std::thread::sleep(Duration::from_millis(10 * n as u64));
                    responder.reply(n);
                },
                Role::Listener,
            );
        }
        // Responders are not broadcast targets
        bus.subscribe(TopicFilter::single("announce"), replying(|_: &Ping| 99), Role::Responder);

        let result = bus.broadcast(Ping::Announce);
        assert_eq!(result.delivered, 3);
        assert!(result.all_replied());
        let mut replies = result.replies;
        replies.sort_unstable();
        assert_eq!(replies, vec![1, 2, 3]);
    }

    #[test]
    fn broadcast_times_out_slow_listeners() {
        let bus = bus(Some(50));
        bus.subscribe(TopicFilter::single("announce"), replying(|_: &Ping| 1), Role::Listener);
        bus.subscribe(
            TopicFilter::single("announce"),
            |_: Request<Ping>, responder: Responder<u32>| {
                std::thread::sleep(Duration::from_millis(500));
                responder.reply(2);
            },
            Role::Listener,
        );

        let result = bus.broadcast(Ping::Announce);
        assert_eq!(result.replies, vec![1]);
        assert_eq!(result.timed_out, 1);
    }

    #[test]
    fn unsubscribe_removes_handler() {
        let bus = bus(None);
        let id = bus.subscribe(TopicFilter::single("echo"), replying(|_: &Ping| 1), Role::Responder);
        assert!(bus.has_responder("echo"));
        assert!(bus.unsubscribe(id));
        assert!(!bus.has_responder("echo"));
        assert!(!bus.unsubscribe(id));
    }

    #[test]
    fn publish_reaches_listeners() {
        let bus = bus(None);
        let (tx, rx) = mpsc::channel();
        let tx = parking_lot::Mutex::new(tx);
        bus.subscribe(
            TopicFilter::single("announce"),
            move |_: Request<Ping>, _: Responder<u32>| {
                tx.lock().send(()).ok();
            },
            Role::Listener,
        );
        assert_eq!(bus.publish(Ping::Announce), 1);
        assert!(rx.recv_timeout(Duration::from_secs(5)).is_ok());
    }
}
