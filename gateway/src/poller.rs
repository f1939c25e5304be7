use crate::errors::Result;
use crate::hub::TelemetryHub;
use crate::metrics::{
    DEVICES_UPDATED_TOTAL, FETCH_LATENCY_SECONDS, POLL_CYCLES_TOTAL, POLL_FAILURES_TOTAL,
    RECORDS_SKIPPED_TOTAL, TRACKED_DEVICES,
};
use crate::model::{DeviceRecord, OutboundMessage};
use crate::normalize::normalize;
use crate::upstream::UpstreamClient;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// What a single poll cycle ended up doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Devices were merged and a delta was broadcast
    Updated { devices: usize },
    /// Nothing to merge; no broadcast
    Idle,
    /// Upstream failed; an `error` message was broadcast and state left untouched
    Failed,
}

pub struct Poller {
    hub: Arc<TelemetryHub>,
    upstream: UpstreamClient,
    interval: Duration,
}

impl Poller {
    pub fn new(hub: Arc<TelemetryHub>, upstream: UpstreamClient, interval: Duration) -> Self {
        Self {
            hub,
            upstream,
            interval,
        }
    }

    /// Runs cycles back to back, sleeping `interval` between them, until
    /// `cancel` fires. An in-flight fetch is dropped on cancellation.
    ///
    /// Returns `Err` only for internal failures; upstream trouble is reported
    /// to subscribers and the loop carries on.
    pub async fn run(self, cancel: CancellationToken) -> Result<()> {
        info!(
            "Starting poller against {} every {:?}",
            self.upstream.url(),
            self.interval
        );

        loop {
            if cancel.is_cancelled() {
                break;
            }

            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                outcome = self.run_cycle() => {
                    debug!("Poll cycle finished: {:?}", outcome?);
                }
            }

            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(self.interval) => {}
            }
        }

        info!("Poller stopped");
        Ok(())
    }

    /// Fetch, normalize, merge and broadcast exactly once.
    pub async fn run_cycle(&self) -> Result<CycleOutcome> {
        POLL_CYCLES_TOTAL.inc();

        let start = Instant::now();
        let fetched = self.upstream.fetch_nodes().await;
        FETCH_LATENCY_SECONDS.observe(start.elapsed().as_secs_f64());

        let nodes = match fetched {
            Ok(nodes) => nodes,
            Err(e) if e.is_upstream() => {
                POLL_FAILURES_TOTAL.inc();
                warn!("Poll cycle failed: {}", e);
                self.hub
                    .subscribers
                    .broadcast(&OutboundMessage::Error {
                        message: e.to_string(),
                    })
                    .await?;
                return Ok(CycleOutcome::Failed);
            }
            Err(e) => return Err(e),
        };

        let updates = normalize_batch(&nodes);
        if updates.is_empty() {
            debug!("No device updates in {} nodes", nodes.len());
            return Ok(CycleOutcome::Idle);
        }

        let devices: Vec<DeviceRecord> = updates.values().cloned().collect();
        let count = devices.len();
        let tracked = self.hub.state.merge(updates).await;
        DEVICES_UPDATED_TOTAL.inc_by(count as f64);
        TRACKED_DEVICES.set(tracked as f64);

        self.hub
            .subscribers
            .broadcast(&OutboundMessage::TelemetryUpdate { devices })
            .await?;

        debug!("Merged {} devices, {} tracked", count, tracked);
        Ok(CycleOutcome::Updated { devices: count })
    }
}

/// Normalizes every node, keeping the last record seen per id.
pub fn normalize_batch(nodes: &[Value]) -> HashMap<String, DeviceRecord> {
    let mut updates = HashMap::with_capacity(nodes.len());
    for node in nodes {
        match normalize(node) {
            Some(record) => {
                updates.insert(record.id.clone(), record);
            }
            None => RECORDS_SKIPPED_TOTAL.inc(),
        }
    }
    updates
}
