use crate::errors::Result;
use crate::metrics::{BROADCASTS_TOTAL, SUBSCRIBERS, SUBSCRIBERS_PRUNED_TOTAL};
use crate::model::OutboundMessage;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info, warn};
use uuid::Uuid;

pub type SubscriberId = Uuid;

/// Serialized frame shared by every recipient of one broadcast.
pub type Frame = Arc<str>;

/// Send side of one subscriber's outbound queue.
#[derive(Debug, Clone)]
pub struct SubscriberHandle {
    pub id: SubscriberId,
    tx: mpsc::Sender<Frame>,
}

impl SubscriberHandle {
    /// Creates a handle with a bounded queue; the receiver belongs to the connection.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<Frame>) {
        let (tx, rx) = mpsc::channel(capacity);
        (
            Self {
                id: Uuid::new_v4(),
                tx,
            },
            rx,
        )
    }

    /// Never waits: a closed or full queue is a failed delivery.
    pub fn try_send(&self, frame: Frame) -> bool {
        self.tx.try_send(frame).is_ok()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    pub delivered: usize,
    pub pruned: usize,
}

/// Set of live subscriber queues.
///
/// Broadcast copies the membership under the lock, sends outside it, and
/// re-locks only to drop the handles that failed.
#[derive(Debug, Default)]
pub struct SubscriberRegistry {
    handles: Mutex<HashMap<SubscriberId, SubscriberHandle>>,
}

impl SubscriberRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn register(&self, handle: SubscriberHandle) {
        let mut handles = self.handles.lock().await;
        info!("Subscriber {} registered", handle.id);
        handles.insert(handle.id, handle);
        SUBSCRIBERS.set(handles.len() as f64);
    }

    /// Returns whether the id was still registered.
    pub async fn unregister(&self, id: &SubscriberId) -> bool {
        let mut handles = self.handles.lock().await;
        let removed = handles.remove(id).is_some();
        if removed {
            info!("Subscriber {} unregistered", id);
        }
        SUBSCRIBERS.set(handles.len() as f64);
        removed
    }

    pub async fn contains(&self, id: &SubscriberId) -> bool {
        self.handles.lock().await.contains_key(id)
    }

    pub async fn len(&self) -> usize {
        self.handles.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.handles.lock().await.is_empty()
    }

    pub async fn broadcast(&self, message: &OutboundMessage) -> Result<BroadcastReport> {
        let frame: Frame = serde_json::to_string(message)?.into();
        Ok(self.broadcast_frame(frame).await)
    }

    pub async fn broadcast_frame(&self, frame: Frame) -> BroadcastReport {
        let targets: Vec<SubscriberHandle> = self.handles.lock().await.values().cloned().collect();

        let mut report = BroadcastReport::default();
        let mut dead = Vec::new();
        for handle in &targets {
            if handle.try_send(frame.clone()) {
                report.delivered += 1;
            } else {
                dead.push(handle.id);
            }
        }

        if !dead.is_empty() {
            let mut handles = self.handles.lock().await;
            for id in &dead {
                if handles.remove(id).is_some() {
                    warn!("Dropping subscriber {} after failed send", id);
                    report.pruned += 1;
                }
            }
            SUBSCRIBERS.set(handles.len() as f64);
            SUBSCRIBERS_PRUNED_TOTAL.inc_by(report.pruned as f64);
        }

        BROADCASTS_TOTAL.inc();
        debug!(
            "Broadcast delivered to {} subscribers, pruned {}",
            report.delivered, report.pruned
        );
        report
    }
}
