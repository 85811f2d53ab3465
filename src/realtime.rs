//! Realtime fan-out.
//!
//! Services never talk to the broker. A committed mutation hands its events
//! to a [`RealtimeHub`], which only enqueues them; a worker draining the
//! matching [`EventQueue`] calls the [`Transport`]. Delivery is best-effort:
//! a transport failure is logged and dropped, and clients reconcile through
//! the query engine.
//!
//! The queue is a single bounded FIFO consumed by a single worker, so events
//! on any one channel reach the transport in commit order. When the worker
//! falls behind and the queue is full, new events are dropped.

use std::fmt;

use serde::Serialize;
use serde_json::Value;
use tokio::sync::mpsc::{
    self, Receiver, Sender,
    error::{TryRecvError, TrySendError},
};
use tracing::{debug, warn};
use uuid::Uuid;

pub mod broker;
pub mod transport;
pub mod worker;

pub use broker::LocalBroker;
pub use transport::{LogTransport, Transport, TransportError};
pub use worker::{WorkerStats, run_worker};

/// A channel clients subscribe to while viewing something.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Scope {
    Organization(Uuid),
    Project(Uuid),
    Task(Uuid),
    User(Uuid),
}

impl Scope {
    pub fn channel_name(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scope::Organization(id) => write!(f, "org:{id}"),
            Scope::Project(id) => write!(f, "project:{id}"),
            Scope::Task(id) => write!(f, "task:{id}"),
            Scope::User(id) => write!(f, "user:{id}"),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EventKind {
    TaskCreated,
    TaskUpdated,
    TaskDeleted,
    TaskMoved,
    CommentCreated,
    CommentUpdated,
    CommentDeleted,
    TimeEntryStarted,
    TimeEntryStopped,
    NotificationCreated,
    ProjectCreated,
    ProjectUpdated,
    UserPresence,
    UserJoined,
    UserLeft,
}

impl EventKind {
    /// Event name on the wire.
    pub fn wire_name(self) -> &'static str {
        match self {
            EventKind::TaskCreated => "task:created",
            EventKind::TaskUpdated => "task:updated",
            EventKind::TaskDeleted => "task:deleted",
            EventKind::TaskMoved => "task:moved",
            EventKind::CommentCreated => "comment:created",
            EventKind::CommentUpdated => "comment:updated",
            EventKind::CommentDeleted => "comment:deleted",
            EventKind::TimeEntryStarted => "time:started",
            EventKind::TimeEntryStopped => "time:stopped",
            EventKind::NotificationCreated => "notification:created",
            EventKind::ProjectCreated => "project:created",
            EventKind::ProjectUpdated => "project:updated",
            EventKind::UserPresence => "user:presence",
            EventKind::UserJoined => "user:joined",
            EventKind::UserLeft => "user:left",
        }
    }
}

/// One event bound for one channel.
#[derive(Clone, Debug)]
pub struct Dispatch {
    pub scope: Scope,
    pub kind: EventKind,
    pub payload: Value,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PresenceChange {
    Joined,
    Left,
    /// Free-form status such as "viewing" or "editing"
    Active(String),
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PresencePayload<'a> {
    user_id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    status: Option<&'a str>,
    timestamp: jiff::Timestamp,
}

/// Events held for the worker before new ones are dropped.
pub const DEFAULT_QUEUE_CAPACITY: usize = 4096;

/// Publishing side of the fan-out. Cheap to clone; never blocks.
#[derive(Clone, Debug)]
pub struct RealtimeHub {
    tx: Option<Sender<Dispatch>>,
}

impl RealtimeHub {
    /// A hub plus the queue a worker (or a test) drains.
    pub fn channel() -> (Self, EventQueue) {
        Self::bounded(DEFAULT_QUEUE_CAPACITY)
    }

    /// Like [`RealtimeHub::channel`] with room for `capacity` pending events.
    pub fn bounded(capacity: usize) -> (Self, EventQueue) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx: Some(tx) }, EventQueue { rx })
    }

    /// A hub that drops everything.
    pub fn disabled() -> Self {
        Self { tx: None }
    }

    pub fn is_enabled(&self) -> bool {
        self.tx.is_some()
    }

    pub fn publish(&self, scope: Scope, kind: EventKind, payload: Value) {
        self.dispatch(Dispatch {
            scope,
            kind,
            payload,
        });
    }

    pub fn dispatch(&self, dispatch: Dispatch) {
        let Some(tx) = &self.tx else {
            return;
        };

        let channel = dispatch.scope;
        let event = dispatch.kind.wire_name();
        match tx.try_send(dispatch) {
            Ok(()) => debug!(%channel, event, "Event queued"),
            Err(TrySendError::Full(_)) => {
                warn!(%channel, event, "Realtime queue full, dropping event")
            }
            Err(TrySendError::Closed(_)) => {
                warn!(%channel, event, "Realtime worker gone, dropping event")
            }
        }
    }

    pub fn announce_presence(&self, scope: Scope, user_id: Uuid, change: PresenceChange) {
        let (kind, status) = match &change {
            PresenceChange::Joined => (EventKind::UserJoined, None),
            PresenceChange::Left => (EventKind::UserLeft, None),
            PresenceChange::Active(status) => (EventKind::UserPresence, Some(status.as_str())),
        };

        let payload = PresencePayload {
            user_id,
            status,
            timestamp: jiff::Timestamp::now(),
        };

        match serde_json::to_value(&payload) {
            Ok(payload) => self.publish(scope, kind, payload),
            Err(e) => warn!(error = %e, "Failed to encode presence payload"),
        }
    }
}

/// Receiving side of the fan-out.
pub struct EventQueue {
    rx: Receiver<Dispatch>,
}

impl EventQueue {
    /// Waits for the next event. `None` once every hub has been dropped.
    pub async fn recv(&mut self) -> Option<Dispatch> {
        self.rx.recv().await
    }

    /// Everything queued right now, without waiting.
    pub fn try_drain(&mut self) -> Vec<Dispatch> {
        let mut drained = Vec::new();
        loop {
            match self.rx.try_recv() {
                Ok(dispatch) => drained.push(dispatch),
                Err(TryRecvError::Empty | TryRecvError::Disconnected) => break,
            }
        }
        drained
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_names() {
        let id = Uuid::nil();
        assert_eq!(
            Scope::Organization(id).channel_name(),
            format!("org:{id}")
        );
        assert_eq!(Scope::Project(id).channel_name(), format!("project:{id}"));
        assert_eq!(Scope::Task(id).channel_name(), format!("task:{id}"));
        assert_eq!(Scope::User(id).channel_name(), format!("user:{id}"));
    }

    #[test]
    fn test_queue_preserves_publish_order() {
        let (hub, mut queue) = RealtimeHub::channel();
        let scope = Scope::Project(Uuid::new_v4());

        for n in 0..10 {
            hub.publish(scope, EventKind::TaskUpdated, serde_json::json!({ "n": n }));
        }

        let drained = queue.try_drain();
        let order: Vec<i64> = drained
            .iter()
            .map(|d| d.payload["n"].as_i64().unwrap())
            .collect();
        assert_eq!(order, (0..10).collect::<Vec<_>>());
    }

    #[test]
    fn test_full_queue_drops_newest_events() {
        let (hub, mut queue) = RealtimeHub::bounded(3);
        let scope = Scope::Task(Uuid::new_v4());

        for n in 0..5 {
            hub.publish(scope, EventKind::TaskUpdated, serde_json::json!({ "n": n }));
        }

        let order: Vec<i64> = queue
            .try_drain()
            .iter()
            .map(|d| d.payload["n"].as_i64().unwrap())
            .collect();
        assert_eq!(order, vec![0, 1, 2]);

        hub.publish(scope, EventKind::TaskUpdated, serde_json::json!({ "n": 5 }));
        assert_eq!(queue.try_drain().len(), 1);
    }

    #[test]
    fn test_disabled_hub_swallows_events() {
        let hub = RealtimeHub::disabled();
        assert!(!hub.is_enabled());
        hub.publish(
            Scope::User(Uuid::new_v4()),
            EventKind::NotificationCreated,
            Value::Null,
        );
    }

    #[test]
    fn test_publish_after_queue_dropped_does_not_panic() {
        let (hub, queue) = RealtimeHub::channel();
        drop(queue);
        hub.publish(Scope::Task(Uuid::new_v4()), EventKind::TaskDeleted, Value::Null);
    }

    #[test]
    fn test_presence_events() {
        let (hub, mut queue) = RealtimeHub::channel();
        let org = Scope::Organization(Uuid::new_v4());
        let user = Uuid::new_v4();

        hub.announce_presence(org, user, PresenceChange::Joined);
        hub.announce_presence(org, user, PresenceChange::Active("editing".into()));
        hub.announce_presence(org, user, PresenceChange::Left);

        let kinds: Vec<EventKind> = queue.try_drain().into_iter().map(|d| d.kind).collect();
        assert_eq!(
            kinds,
            vec![
                EventKind::UserJoined,
                EventKind::UserPresence,
                EventKind::UserLeft
            ]
        );
    }
}
