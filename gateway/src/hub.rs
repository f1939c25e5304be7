use crate::errors::{Error, Result};
use crate::model::OutboundMessage;
use crate::state::StateTable;
use crate::subscribers::{Frame, SubscriberHandle, SubscriberId, SubscriberRegistry};
use tokio::sync::mpsc;

pub const DEFAULT_SUBSCRIBER_BUFFER: usize = 256;

/// Process-wide telemetry context shared by the poller and connection handlers.
#[derive(Debug)]
pub struct TelemetryHub {
    pub state: StateTable,
    pub subscribers: SubscriberRegistry,
    subscriber_buffer: usize,
}

impl TelemetryHub {
    pub fn new(subscriber_buffer: usize) -> Self {
        Self {
            state: StateTable::new(),
            subscribers: SubscriberRegistry::new(),
            subscriber_buffer,
        }
    }

    /// Registers a new subscriber with its `snapshot` message already queued.
    ///
    /// The state lock is held across snapshot and registration, so any update
    /// merged after the snapshot is guaranteed to be broadcast to this
    /// subscriber as well.
    pub async fn subscribe(&self) -> Result<(SubscriberId, mpsc::Receiver<Frame>)> {
        let (handle, rx) = SubscriberHandle::channel(self.subscriber_buffer);
        let id = handle.id;

        let state = self.state.lock().await;
        let snapshot = OutboundMessage::Snapshot {
            devices: state.records(),
        };
        let frame: Frame = serde_json::to_string(&snapshot)?.into();
        if !handle.try_send(frame) {
            return Err(Error::ChannelSend);
        }
        self.subscribers.register(handle).await;
        drop(state);

        Ok((id, rx))
    }

    pub async fn unsubscribe(&self, id: &SubscriberId) -> bool {
        self.subscribers.unregister(id).await
    }

    pub async fn snapshot_message(&self) -> OutboundMessage {
        OutboundMessage::Snapshot {
            devices: self.state.snapshot().await,
        }
    }
}

impl Default for TelemetryHub {
    fn default() -> Self {
        Self::new(DEFAULT_SUBSCRIBER_BUFFER)
    }
}
