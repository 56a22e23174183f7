// SPDX-License-Identifier: Apache-2.0
//! [`RealtimeHub`]: the subscriber registry and dispatcher.

use async_trait::async_trait;
use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use theatreos_storage::EventSink;
use theatreos_types::{Event, StageId, TheatreId, UserId};
use tokio::sync::{Mutex, Notify};
use tokio::time::{interval, Duration};
use tracing::info;

/// Default bound on a subscriber's pending-event queue (spec §4.9
/// "bounded per-subscriber queue"). Once full, the oldest queued event is
/// dropped to make room for the newest: a stale event is worse to deliver
/// late than to lose.
pub const DEFAULT_QUEUE_CAPACITY: usize = 256;

/// Heartbeat cadence (spec §4.9).
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

/// Opaque handle identifying one live subscriber connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriberId(u64);

/// What a subscriber wants delivered (spec §4.9). A connection may carry
/// a `user_id` (for `target_users` delivery), a home `theatre_id`, and any
/// number of stage subscriptions picked up over its lifetime.
#[derive(Debug, Clone, Default)]
pub struct Subscription {
    /// This connection's user, if authenticated.
    pub user_id: Option<UserId>,
    /// The theatre this connection is attached to, if any.
    pub theatre_id: Option<TheatreId>,
    /// Stages this connection has subscribed to.
    pub stage_ids: HashSet<StageId>,
}

struct RingBuffer {
    queue: Mutex<VecDeque<Event>>,
    notify: Notify,
    capacity: usize,
}

impl RingBuffer {
    fn new(capacity: usize) -> Self {
        Self {
            queue: Mutex::new(VecDeque::with_capacity(capacity.min(64))),
            notify: Notify::new(),
            capacity,
        }
    }

    async fn push(&self, event: Event) {
        let mut queue = self.queue.lock().await;
        if queue.len() >= self.capacity {
            queue.pop_front();
        }
        queue.push_back(event);
        drop(queue);
        self.notify.notify_one();
    }

    async fn recv(&self) -> Event {
        loop {
            {
                let mut queue = self.queue.lock().await;
                if let Some(event) = queue.pop_front() {
                    return event;
                }
            }
            self.notify.notified().await;
        }
    }
}

/// The receiving half handed back to a caller after [`RealtimeHub::subscribe`].
/// Dropping it does not automatically unsubscribe; call
/// [`RealtimeHub::unsubscribe`] with the paired [`SubscriberId`] on
/// disconnect.
pub struct Subscriber {
    id: SubscriberId,
    buffer: Arc<RingBuffer>,
}

impl Subscriber {
    /// This subscriber's id, for a later `unsubscribe` call.
    #[must_use]
    pub fn id(&self) -> SubscriberId {
        self.id
    }

    /// Wait for the next event queued for this subscriber. Never returns
    /// `None`; the queue is unbounded in lifetime, only in depth.
    pub async fn recv(&mut self) -> Event {
        self.buffer.recv().await
    }
}

struct ConnEntry {
    subscription: Subscription,
    buffer: Arc<RingBuffer>,
}

struct HubState {
    next_id: AtomicU64,
    conns: Mutex<std::collections::HashMap<SubscriberId, ConnEntry>>,
}

/// The realtime fanout registry (spec §4.9). Cloneable handle backed by an
/// `Arc<Mutex<_>>`-guarded connection registry.
#[derive(Clone)]
pub struct RealtimeHub {
    state: Arc<HubState>,
}

impl Default for RealtimeHub {
    fn default() -> Self {
        Self::new()
    }
}

impl RealtimeHub {
    /// Construct an empty hub.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Arc::new(HubState {
                next_id: AtomicU64::new(1),
                conns: Mutex::new(std::collections::HashMap::new()),
            }),
        }
    }

    /// Register a new connection with the given initial subscription and
    /// a bounded delivery queue, returning the receiving half.
    pub async fn subscribe(&self, subscription: Subscription) -> Subscriber {
        self.subscribe_with_capacity(subscription, DEFAULT_QUEUE_CAPACITY).await
    }

    /// As [`Self::subscribe`], with an explicit queue depth.
    pub async fn subscribe_with_capacity(&self, subscription: Subscription, capacity: usize) -> Subscriber {
        let id = SubscriberId(self.state.next_id.fetch_add(1, Ordering::Relaxed));
        let buffer = Arc::new(RingBuffer::new(capacity));
        self.state.conns.lock().await.insert(
            id,
            ConnEntry {
                subscription,
                buffer: buffer.clone(),
            },
        );
        Subscriber { id, buffer }
    }

    /// Add a stage to a live connection's subscription set (spec §4.9
    /// "subscribe_stage").
    pub async fn subscribe_stage(&self, id: SubscriberId, stage_id: StageId) {
        if let Some(entry) = self.state.conns.lock().await.get_mut(&id) {
            entry.subscription.stage_ids.insert(stage_id);
        }
    }

    /// Remove a stage from a live connection's subscription set.
    pub async fn unsubscribe_stage(&self, id: SubscriberId, stage_id: &StageId) {
        if let Some(entry) = self.state.conns.lock().await.get_mut(&id) {
            entry.subscription.stage_ids.remove(stage_id);
        }
    }

    /// Drop a connection's registry entry (spec §4.9 "disconnect").
    pub async fn unsubscribe(&self, id: SubscriberId) {
        self.state.conns.lock().await.remove(&id);
    }

    /// Current number of live connections, for `/stats`-style reporting
    /// (spec §4.9).
    pub async fn connection_count(&self) -> usize {
        self.state.conns.lock().await.len()
    }

    /// Spawn the 30-second heartbeat loop. Returns the `JoinHandle` so the
    /// caller (the server binary's background-driver set) can abort it on
    /// shutdown.
    pub fn spawn_heartbeat(self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = interval(HEARTBEAT_INTERVAL);
            loop {
                ticker.tick().await;
                self.broadcast_heartbeat().await;
            }
        })
    }

    async fn broadcast_heartbeat(&self) {
        let conns = self.state.conns.lock().await;
        let count = conns.len();
        for entry in conns.values() {
            entry
                .buffer
                .push(heartbeat_event(entry.subscription.theatre_id.clone()))
                .await;
        }
        drop(conns);
        info!(connections = count, "heartbeat broadcast");
    }
}

#[async_trait]
impl EventSink for RealtimeHub {
    /// Dispatch one event to its most specific live audience (spec §4.9):
    /// `target_users`, then `target_stage`, then `target_theatre`, then a
    /// broadcast to every connection if none are populated.
    async fn publish(&self, event: Event) {
        let target = event.target.clone().unwrap_or_default();
        let conns = self.state.conns.lock().await;

        if !target.target_users.is_empty() {
            for entry in conns.values() {
                if let Some(user_id) = &entry.subscription.user_id {
                    if target.target_users.contains(user_id) {
                        entry.buffer.push(event.clone()).await;
                    }
                }
            }
        } else if let Some(stage_id) = &target.target_stage {
            for entry in conns.values() {
                if entry.subscription.stage_ids.contains(stage_id) {
                    entry.buffer.push(event.clone()).await;
                }
            }
        } else if let Some(theatre_id) = &target.target_theatre {
            for entry in conns.values() {
                if entry.subscription.theatre_id.as_ref() == Some(theatre_id) {
                    entry.buffer.push(event.clone()).await;
                }
            }
        } else {
            for entry in conns.values() {
                entry.buffer.push(event.clone()).await;
            }
        }
    }
}

fn heartbeat_event(theatre_id: Option<TheatreId>) -> Event {
    Event {
        event_id: uuid::Uuid::new_v4().to_string().into(),
        theatre_id: theatre_id.unwrap_or_else(|| TheatreId::from("global")),
        at: chrono::Utc::now(),
        kind: theatreos_types::EventKind::Heartbeat,
        target: None,
        payload: serde_json::json!({}),
        produced_by_delta: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use theatreos_types::EventKind;

    fn event(kind: EventKind, target: Option<theatreos_types::EventTarget>) -> Event {
        Event {
            event_id: uuid::Uuid::new_v4().to_string().into(),
            theatre_id: "t1".into(),
            at: chrono::Utc::now(),
            kind,
            target,
            payload: serde_json::json!({}),
            produced_by_delta: None,
        }
    }

    #[tokio::test]
    async fn delivers_to_targeted_user_only() {
        let hub = RealtimeHub::new();
        let mut alice = hub
            .subscribe(Subscription {
                user_id: Some("alice".into()),
                ..Default::default()
            })
            .await;
        let mut bob = hub
            .subscribe(Subscription {
                user_id: Some("bob".into()),
                ..Default::default()
            })
            .await;

        hub.publish(event(
            EventKind::EvidenceGranted,
            Some(theatreos_types::EventTarget::user("alice".into())),
        ))
        .await;

        let received = tokio::time::timeout(Duration::from_millis(50), alice.recv())
            .await
            .unwrap();
        assert_eq!(received.kind, EventKind::EvidenceGranted);

        let none_for_bob = tokio::time::timeout(Duration::from_millis(20), bob.recv()).await;
        assert!(none_for_bob.is_err());
    }

    #[tokio::test]
    async fn stage_dispatch_prefers_stage_over_theatre() {
        let hub = RealtimeHub::new();
        let mut on_stage = hub
            .subscribe(Subscription {
                theatre_id: Some("t1".into()),
                stage_ids: HashSet::from(["s1".into()]),
                ..Default::default()
            })
            .await;
        let mut in_theatre_only = hub
            .subscribe(Subscription {
                theatre_id: Some("t1".into()),
                ..Default::default()
            })
            .await;

        hub.publish(event(
            EventKind::TraceDiscovered,
            Some(theatreos_types::EventTarget::stage("s1".into())),
        ))
        .await;

        tokio::time::timeout(Duration::from_millis(50), on_stage.recv())
            .await
            .unwrap();
        let missed = tokio::time::timeout(Duration::from_millis(20), in_theatre_only.recv()).await;
        assert!(missed.is_err());
    }

    #[tokio::test]
    async fn broadcast_with_no_target_reaches_everyone() {
        let hub = RealtimeHub::new();
        let mut a = hub.subscribe(Subscription::default()).await;
        let mut b = hub.subscribe(Subscription::default()).await;

        hub.publish(event(EventKind::Notification, None)).await;

        tokio::time::timeout(Duration::from_millis(50), a.recv()).await.unwrap();
        tokio::time::timeout(Duration::from_millis(50), b.recv()).await.unwrap();
    }

    #[tokio::test]
    async fn queue_drops_oldest_once_full() {
        let hub = RealtimeHub::new();
        let mut sub = hub.subscribe_with_capacity(Subscription::default(), 2).await;

        for i in 0..5 {
            hub.publish(event(EventKind::Tick, None)).await;
            let _ = i;
        }

        // Only the two most recent survive; draining should not block.
        let first = tokio::time::timeout(Duration::from_millis(50), sub.recv()).await.unwrap();
        let second = tokio::time::timeout(Duration::from_millis(50), sub.recv()).await.unwrap();
        assert_ne!(first.event_id, second.event_id);
        let empty = tokio::time::timeout(Duration::from_millis(20), sub.recv()).await;
        assert!(empty.is_err());
    }

    #[tokio::test]
    async fn unsubscribe_stops_delivery() {
        let hub = RealtimeHub::new();
        let sub = hub
            .subscribe(Subscription {
                user_id: Some("alice".into()),
                ..Default::default()
            })
            .await;
        let id = sub.id();
        hub.unsubscribe(id).await;
        assert_eq!(hub.connection_count().await, 0);
    }
}
