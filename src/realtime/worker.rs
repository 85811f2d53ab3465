use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::realtime::{
    EventQueue,
    transport::{Transport, TransportError},
};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct WorkerStats {
    pub delivered: u64,
    pub failed: u64,
}

/// Drains `queue` into `transport` one event at a time until every hub is
/// gone. A failed or slow delivery is logged and skipped; it never stops the
/// loop and never reaches the code that published the event.
pub async fn run_worker(
    mut queue: EventQueue,
    transport: Arc<dyn Transport>,
    delivery_timeout: Duration,
) -> WorkerStats {
    let mut stats = WorkerStats::default();
    let transport_name = transport.name();

    while let Some(dispatch) = queue.recv().await {
        let channel = dispatch.scope.channel_name();
        let event = dispatch.kind.wire_name();

        let result = tokio::time::timeout(
            delivery_timeout,
            transport.trigger(&channel, event, &dispatch.payload),
        )
        .await
        .unwrap_or_else(|_| {
            Err(TransportError::TimedOut {
                channel: channel.clone(),
            })
        });

        match result {
            Ok(()) => {
                stats.delivered += 1;
                debug!(transport = transport_name, %channel, event, "Event delivered");
            }
            Err(e) => {
                stats.failed += 1;
                warn!(
                    transport = transport_name,
                    %channel,
                    event,
                    error = %e,
                    "Failed to deliver realtime event"
                );
            }
        }
    }

    info!(
        transport = transport_name,
        delivered = stats.delivered,
        failed = stats.failed,
        "Realtime worker stopped"
    );
    stats
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use serde_json::Value;
    use uuid::Uuid;

    use super::*;
    use crate::realtime::{EventKind, RealtimeHub, Scope};

    #[derive(Default)]
    struct Recording {
        seen: Mutex<Vec<(String, String)>>,
    }

    #[async_trait]
    impl Transport for Recording {
        fn name(&self) -> &'static str {
            "recording"
        }

        async fn trigger(
            &self,
            channel: &str,
            event: &str,
            _payload: &Value,
        ) -> Result<(), TransportError> {
            self.seen.lock().push((channel.to_string(), event.to_string()));
            Ok(())
        }
    }

    struct Down;

    #[async_trait]
    impl Transport for Down {
        fn name(&self) -> &'static str {
            "down"
        }

        async fn trigger(&self, _: &str, _: &str, _: &Value) -> Result<(), TransportError> {
            Err(TransportError::Unavailable("connection refused".into()))
        }
    }

    struct Stalled;

    #[async_trait]
    impl Transport for Stalled {
        fn name(&self) -> &'static str {
            "stalled"
        }

        async fn trigger(&self, _: &str, _: &str, _: &Value) -> Result<(), TransportError> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_delivers_in_publish_order() {
        let (hub, queue) = RealtimeHub::channel();
        let transport = Arc::new(Recording::default());
        let project = Scope::Project(Uuid::new_v4());

        hub.publish(project, EventKind::TaskCreated, Value::Null);
        hub.publish(project, EventKind::TaskUpdated, Value::Null);
        hub.publish(project, EventKind::TaskDeleted, Value::Null);
        drop(hub);

        let stats = run_worker(queue, transport.clone(), Duration::from_secs(1)).await;
        assert_eq!(stats.delivered, 3);

        let events: Vec<String> = transport.seen.lock().iter().map(|(_, e)| e.clone()).collect();
        assert_eq!(events, vec!["task:created", "task:updated", "task:deleted"]);
    }

    #[tokio::test]
    async fn test_failures_are_counted_not_propagated() {
        let (hub, queue) = RealtimeHub::channel();
        hub.publish(Scope::User(Uuid::new_v4()), EventKind::NotificationCreated, Value::Null);
        hub.publish(Scope::User(Uuid::new_v4()), EventKind::NotificationCreated, Value::Null);
        drop(hub);

        let stats = run_worker(queue, Arc::new(Down), Duration::from_secs(1)).await;
        assert_eq!(stats, WorkerStats { delivered: 0, failed: 2 });
    }

    #[tokio::test]
    async fn test_stalled_transport_times_out() {
        let (hub, queue) = RealtimeHub::channel();
        hub.publish(Scope::Task(Uuid::new_v4()), EventKind::TaskMoved, Value::Null);
        drop(hub);

        let stats = run_worker(queue, Arc::new(Stalled), Duration::from_millis(50)).await;
        assert_eq!(stats.failed, 1);
    }
}
