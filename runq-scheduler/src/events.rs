//! Lifecycle event bus
//!
//! The scheduler only publishes; anything interested in run events subscribes
//! to the broadcast channel.

use runq_core::domain::event::{RunEvent, RunEventKind};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

pub trait EventBus: Send + Sync {
    /// Fire-and-forget publication of one event
    fn publish(&self, event: RunEvent);
}

/// Event bus backed by a `tokio::sync::broadcast` channel
///
/// Slow subscribers lag and lose the oldest events instead of blocking the
/// scheduler.
pub struct BroadcastEventBus {
    sender: broadcast::Sender<RunEvent>,
}

impl BroadcastEventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RunEvent> {
        self.sender.subscribe()
    }
}

impl EventBus for BroadcastEventBus {
    fn publish(&self, event: RunEvent) {
        // An error only means nobody is subscribed right now
        let _ = self.sender.send(event);
    }
}

/// Log every event received on `receiver` until the bus is dropped
pub fn spawn_event_logger(mut receiver: broadcast::Receiver<RunEvent>) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match receiver.recv().await {
                Ok(event) if event.kind == RunEventKind::LogLine => {
                    tracing::trace!("[task {}] {}", event.task_id, event.message.unwrap_or_default());
                }
                Ok(event) => match &event.message {
                    Some(message) => tracing::info!(
                        "Task {} ({}:{}) {}: {}",
                        event.task_id,
                        event.workspace,
                        event.project,
                        event.kind,
                        message
                    ),
                    None => tracing::info!(
                        "Task {} ({}:{}) {}",
                        event.task_id,
                        event.workspace,
                        event.project,
                        event.kind
                    ),
                },
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!("Event logger lagged, {} events skipped", skipped);
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_subscribers_receive_published_events() {
        let bus = BroadcastEventBus::new(16);
        let mut receiver = bus.subscribe();

        bus.publish(RunEvent::new(RunEventKind::Queued, 1, "ws1", "/app"));
        bus.publish(RunEvent::new(RunEventKind::Started, 1, "ws1", "/app"));

        assert_eq!(receiver.recv().await.unwrap().kind, RunEventKind::Queued);
        assert_eq!(receiver.recv().await.unwrap().kind, RunEventKind::Started);
    }

    #[test]
    fn test_publish_without_subscribers() {
        let bus = BroadcastEventBus::new(16);
        bus.publish(RunEvent::new(RunEventKind::Queued, 1, "ws1", "/app"));
    }

    #[tokio::test]
    async fn test_logger_stops_when_bus_is_dropped() {
        let bus = BroadcastEventBus::new(16);
        let logger = spawn_event_logger(bus.subscribe());

        bus.publish(RunEvent::new(RunEventKind::Error, 3, "ws1", "/app").with_message("boom"));
        drop(bus);

        logger.await.unwrap();
    }
}
