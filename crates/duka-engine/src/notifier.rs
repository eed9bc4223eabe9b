//! # Notification Dispatcher
//!
//! Moves committed-change events from the engine to subscribers without
//! ever holding up, or failing, the transaction that produced them.
//!
//! ## Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                     Notification Pipeline                               │
//! │                                                                         │
//! │  Engine op ── commit ──► EventQueue::publish (try_send, never waits)    │
//! │                               │                                         │
//! │                               │ bounded mpsc; full → warn + drop        │
//! │                               ▼                                         │
//! │                     NotificationDispatcher::run (spawned task)          │
//! │                               │                                         │
//! │                               ▼                                         │
//! │                      broadcast hub ──► Subscription(branch:nbo)         │
//! │                                    ──► Subscription(branch:msa)         │
//! │                                    ──► Subscription(global)             │
//! │                                                                         │
//! │  Each Subscription filters the hub down to its own channel.             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};

use crate::events::{Channel, EngineEvent};

/// Creates the queue, its dispatcher, and the handle used to subscribe and
/// stop it.
pub fn pipeline(
    queue_capacity: usize,
    broadcast_capacity: usize,
) -> (EventQueue, NotificationDispatcher, DispatcherHandle) {
    let (events_tx, events_rx) = mpsc::channel(queue_capacity.max(1));
    let (hub, _) = broadcast::channel(broadcast_capacity.max(1));
    let (shutdown_tx, shutdown_rx) = mpsc::channel(1);

    let queue = EventQueue { tx: events_tx };
    let dispatcher = NotificationDispatcher {
        events_rx,
        hub: hub.clone(),
        shutdown_rx,
    };
    let handle = DispatcherHandle { shutdown_tx, hub };

    (queue, dispatcher, handle)
}

// =============================================================================
// Event Queue
// =============================================================================

/// Producer side. Cheap to clone.
#[derive(Debug, Clone)]
pub struct EventQueue {
    tx: mpsc::Sender<EngineEvent>,
}

impl EventQueue {
    /// Queues an event without waiting. Returns false when it was dropped.
    pub fn publish(&self, event: EngineEvent) -> bool {
        match self.tx.try_send(event) {
            Ok(()) => true,
            Err(TrySendError::Full(event)) => {
                warn!(topic = event.topic(), "Event queue full, dropping event");
                false
            }
            Err(TrySendError::Closed(event)) => {
                warn!(topic = event.topic(), "Event queue closed, dropping event");
                false
            }
        }
    }

    /// Queues each event in order.
    pub fn publish_all(&self, events: impl IntoIterator<Item = EngineEvent>) {
        for event in events {
            self.publish(event);
        }
    }
}

// =============================================================================
// Dispatcher
// =============================================================================

/// Consumer side; spawn [`NotificationDispatcher::run`] as a task.
pub struct NotificationDispatcher {
    events_rx: mpsc::Receiver<EngineEvent>,
    hub: broadcast::Sender<EngineEvent>,
    shutdown_rx: mpsc::Receiver<()>,
}

impl NotificationDispatcher {
    /// Drains the queue into the broadcast hub until shut down or every
    /// producer is gone.
    pub async fn run(mut self) {
        info!("Notification dispatcher starting");

        loop {
            tokio::select! {
                event = self.events_rx.recv() => match event {
                    Some(event) => self.deliver(event),
                    None => break,
                },

                _ = self.shutdown_rx.recv() => {
                    // Deliver what was already committed and queued.
                    while let Ok(event) = self.events_rx.try_recv() {
                        self.deliver(event);
                    }
                    break;
                }
            }
        }

        info!("Notification dispatcher stopped");
    }

    fn deliver(&self, event: EngineEvent) {
        let topic = event.topic();
        match self.hub.send(event) {
            Ok(receivers) => debug!(topic, receivers, "Event delivered"),
            Err(_) => debug!(topic, "No subscribers for event"),
        }
    }
}

/// Handle for subscribing to and stopping the dispatcher.
#[derive(Debug, Clone)]
pub struct DispatcherHandle {
    shutdown_tx: mpsc::Sender<()>,
    hub: broadcast::Sender<EngineEvent>,
}

impl DispatcherHandle {
    /// Subscribes to events addressed to `channel`.
    pub fn subscribe(&self, channel: Channel) -> Subscription {
        Subscription {
            channel,
            rx: self.hub.subscribe(),
        }
    }

    /// Triggers graceful shutdown.
    pub async fn shutdown(&self) {
        let _ = self.shutdown_tx.send(()).await;
    }
}

// =============================================================================
// Subscription
// =============================================================================

/// Events for one channel.
pub struct Subscription {
    channel: Channel,
    rx: broadcast::Receiver<EngineEvent>,
}

impl Subscription {
    pub fn channel(&self) -> &Channel {
        &self.channel
    }

    /// Next event for this channel; `None` once the dispatcher is gone.
    pub async fn recv(&mut self) -> Option<EngineEvent> {
        loop {
            match self.rx.recv().await {
                Ok(event) if event.is_for(&self.channel) => return Some(event),
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(channel = ?self.channel, skipped, "Subscriber lagged, events skipped");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Next already-delivered event for this channel, without waiting.
    pub fn try_recv(&mut self) -> Option<EngineEvent> {
        loop {
            match self.rx.try_recv() {
                Ok(event) if event.is_for(&self.channel) => return Some(event),
                Ok(_) => continue,
                Err(broadcast::error::TryRecvError::Lagged(skipped)) => {
                    warn!(channel = ?self.channel, skipped, "Subscriber lagged, events skipped");
                }
                Err(_) => return None,
            }
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::ReversalRequested;

    fn requested(branch: &str) -> EngineEvent {
        EngineEvent::ReversalRequested(ReversalRequested {
            sale_id: format!("sale-{branch}"),
            receipt_number: "RCP-20260101-000001".into(),
            branch_id: branch.into(),
            reason: "wrong item".into(),
            requested_by: "user-1".into(),
        })
    }

    #[tokio::test]
    async fn test_branch_subscription_filters() {
        let (queue, dispatcher, handle) = pipeline(8, 8);
        let mut nairobi = handle.subscribe(Channel::Branch("nbo".into()));
        let mut overseer = handle.subscribe(Channel::Global);
        let task = tokio::spawn(dispatcher.run());

        assert!(queue.publish(requested("msa")));
        assert!(queue.publish(requested("nbo")));

        let event = nairobi.recv().await.unwrap();
        assert!(matches!(event, EngineEvent::ReversalRequested(ref e) if e.branch_id == "nbo"));

        let first = overseer.recv().await.unwrap();
        let second = overseer.recv().await.unwrap();
        assert!(matches!(first, EngineEvent::ReversalRequested(ref e) if e.branch_id == "msa"));
        assert!(matches!(second, EngineEvent::ReversalRequested(ref e) if e.branch_id == "nbo"));

        handle.shutdown().await;
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_full_queue_drops() {
        let (queue, _dispatcher, _handle) = pipeline(1, 8);
        assert!(queue.publish(requested("nbo")));
        assert!(!queue.publish(requested("nbo")));
    }

    #[tokio::test]
    async fn test_closed_queue_drops() {
        let (queue, dispatcher, _handle) = pipeline(4, 8);
        drop(dispatcher);
        assert!(!queue.publish(requested("nbo")));
    }

    #[tokio::test]
    async fn test_shutdown_flushes_queue() {
        let (queue, dispatcher, handle) = pipeline(8, 8);
        let mut overseer = handle.subscribe(Channel::Global);

        queue.publish(requested("nbo"));
        handle.shutdown().await;
        dispatcher.run().await;

        assert!(overseer.try_recv().is_some());
        assert!(overseer.try_recv().is_none());
    }
}
