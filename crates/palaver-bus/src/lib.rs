//! In-process publish/subscribe bus with per-subscriber filter predicates.
//!
//! The bus is a pure relay: best-effort, in-memory, no durable log and no
//! redelivery. A subscriber that disconnects or lags simply misses events
//! and resynchronizes with a full refetch. Per-topic delivery order matches
//! publish order for every subscriber; no ordering holds across topics.

mod filters;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, warn};

use palaver_core::{Event, Topic};

pub use filters::{GroupAddedFilter, MembershipSource, MessageAddedFilter};

const TOPIC_CHANNEL_DEPTH: usize = 64;

/// Failure raised by a filter predicate. Treated as "reject" for that one
/// subscriber; never propagated to the publisher or other subscribers.
#[derive(Debug, Error)]
#[error("subscription filter failed: {0}")]
pub struct FilterError(String);

impl FilterError {
    pub fn new(message: impl Into<String>) -> Self {
        FilterError(message.into())
    }
}

/// Asynchronous delivery gate evaluated once per event per subscriber. The
/// predicate may suspend (for example to resolve the subscriber's identity
/// or membership) without blocking delivery to anyone else, because it runs
/// on the subscriber's own receive path.
#[async_trait]
pub trait SubscriptionFilter: Send + Sync {
    async fn accept(&self, event: &Event) -> Result<bool, FilterError>;
}

/// The bus itself. One broadcast channel per topic; publishing clones the
/// event into every live receiver and returns immediately.
#[derive(Default)]
pub struct NotificationBus {
    topics: parking_lot::RwLock<HashMap<Topic, broadcast::Sender<Event>>>,
}

impl NotificationBus {
    pub fn new() -> Self {
        Self::default()
    }

    fn sender_for(&self, topic: Topic) -> broadcast::Sender<Event> {
        let mut guard = self.topics.write();
        guard
            .entry(topic)
            .or_insert_with(|| broadcast::channel(TOPIC_CHANNEL_DEPTH).0)
            .clone()
    }

    /// Publishes `event` on its topic. Fire-and-forget: returns the number
    /// of live subscribers the event was handed to, which is zero (not an
    /// error) when nobody is listening.
    pub fn publish(&self, event: Event) -> usize {
        let topic = event.topic();
        let sender = self.sender_for(topic);
        match sender.send(event) {
            Ok(receivers) => {
                debug!(%topic, receivers, "published event");
                receivers
            }
            Err(_) => {
                debug!(%topic, "published event with no subscribers");
                0
            }
        }
    }

    /// Registers a filtered subscription on `topic`. The subscription lives
    /// until dropped or explicitly unsubscribed.
    pub fn subscribe<F>(&self, topic: Topic, filter: F) -> Subscription
    where
        F: SubscriptionFilter + 'static,
    {
        Subscription {
            topic,
            receiver: Some(self.sender_for(topic).subscribe()),
            filter: Arc::new(filter),
        }
    }
}

/// A live registration on one topic. `recv` yields only events the filter
/// accepts, in publish order.
pub struct Subscription {
    topic: Topic,
    receiver: Option<broadcast::Receiver<Event>>,
    filter: Arc<dyn SubscriptionFilter>,
}

impl Subscription {
    /// Waits for the next accepted event. Returns `None` once the
    /// subscription is unsubscribed or the bus side is gone. Lagged events
    /// are dropped silently, matching the bus's best-effort contract.
    pub async fn recv(&mut self) -> Option<Event> {
        loop {
            let receiver = self.receiver.as_mut()?;
            match receiver.recv().await {
                Ok(event) => match self.filter.accept(&event).await {
                    Ok(true) => return Some(event),
                    Ok(false) => continue,
                    Err(err) => {
                        debug!(topic = %self.topic, %err, "filter error, event rejected");
                        continue;
                    }
                },
                Err(RecvError::Lagged(skipped)) => {
                    warn!(topic = %self.topic, skipped, "subscriber lagged, events dropped");
                    continue;
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }

    /// Tears the registration down. Idempotent: further calls (and a later
    /// drop) are no-ops, and already-enqueued deliveries to other
    /// subscribers are unaffected.
    pub fn unsubscribe(&mut self) {
        self.receiver = None;
    }

    pub fn topic(&self) -> Topic {
        self.topic
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use palaver_core::{GroupId, Message, MessageId, UserId};

    struct AcceptAll;

    #[async_trait]
    impl SubscriptionFilter for AcceptAll {
        async fn accept(&self, _event: &Event) -> Result<bool, FilterError> {
            Ok(true)
        }
    }

    struct AlwaysFails;

    #[async_trait]
    impl SubscriptionFilter for AlwaysFails {
        async fn accept(&self, _event: &Event) -> Result<bool, FilterError> {
            Err(FilterError::new("identity lookup failed"))
        }
    }

    fn message(id: i64) -> Message {
        Message {
            id: MessageId(id),
            group_id: GroupId(1),
            author_id: UserId(1),
            text: format!("message {id}"),
            created_at: chrono::Utc::now(),
        }
    }

    #[tokio::test]
    async fn delivers_in_publish_order() {
        let bus = NotificationBus::new();
        let mut sub = bus.subscribe(Topic::MessageAdded, AcceptAll);

        for id in 1..=3 {
            bus.publish(Event::MessageAdded {
                message: message(id),
            });
        }

        for expected in 1..=3 {
            match sub.recv().await {
                Some(Event::MessageAdded { message }) => {
                    assert_eq!(message.id, MessageId(expected));
                }
                other => panic!("unexpected delivery: {other:?}"),
            }
        }
    }

    #[tokio::test]
    async fn filter_error_rejects_only_that_subscriber() {
        let bus = NotificationBus::new();
        let mut failing = bus.subscribe(Topic::MessageAdded, AlwaysFails);
        let mut healthy = bus.subscribe(Topic::MessageAdded, AcceptAll);

        bus.publish(Event::MessageAdded {
            message: message(7),
        });

        let delivered = healthy.recv().await.expect("healthy subscriber delivery");
        assert_eq!(delivered.topic(), Topic::MessageAdded);

        let silence =
            tokio::time::timeout(std::time::Duration::from_millis(50), failing.recv()).await;
        assert!(silence.is_err(), "failing filter must reject silently");
    }

    #[tokio::test]
    async fn unsubscribe_is_idempotent() {
        let bus = NotificationBus::new();
        let mut sub = bus.subscribe(Topic::GroupAdded, AcceptAll);
        sub.unsubscribe();
        sub.unsubscribe();
        assert!(sub.recv().await.is_none());
    }

    #[tokio::test]
    async fn topics_do_not_cross_deliver() {
        let bus = NotificationBus::new();
        let mut groups = bus.subscribe(Topic::GroupAdded, AcceptAll);

        bus.publish(Event::MessageAdded {
            message: message(1),
        });
        let silence =
            tokio::time::timeout(std::time::Duration::from_millis(50), groups.recv()).await;
        assert!(silence.is_err(), "message events must not reach group feed");
    }

    #[tokio::test]
    async fn publish_without_subscribers_is_not_an_error() {
        let bus = NotificationBus::new();
        let event = Event::MessageAdded {
            message: message(1),
        };
        assert_eq!(bus.publish(event), 0);
    }
}
