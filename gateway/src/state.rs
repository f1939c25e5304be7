use crate::model::DeviceRecord;
use std::collections::HashMap;
use tokio::sync::{Mutex, MutexGuard};

/// Latest known record per device id.
///
/// Entries are only ever replaced, never removed: a device that drops out of
/// the upstream feed keeps its last record and its `updated_at` goes stale.
#[derive(Debug, Default)]
pub struct StateTable {
    devices: Mutex<HashMap<String, DeviceRecord>>,
}

impl StateTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces each id's entry wholesale. Returns the table size afterwards.
    pub async fn merge(&self, batch: HashMap<String, DeviceRecord>) -> usize {
        let mut devices = self.devices.lock().await;
        devices.extend(batch);
        devices.len()
    }

    pub async fn snapshot(&self) -> Vec<DeviceRecord> {
        self.devices.lock().await.values().cloned().collect()
    }

    pub async fn get(&self, id: &str) -> Option<DeviceRecord> {
        self.devices.lock().await.get(id).cloned()
    }

    pub async fn len(&self) -> usize {
        self.devices.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.devices.lock().await.is_empty()
    }

    /// Holds the table lock; merges wait until the guard is dropped.
    pub(crate) async fn lock(&self) -> StateGuard<'_> {
        StateGuard(self.devices.lock().await)
    }
}

pub(crate) struct StateGuard<'a>(MutexGuard<'a, HashMap<String, DeviceRecord>>);

impl StateGuard<'_> {
    pub fn records(&self) -> Vec<DeviceRecord> {
        self.0.values().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn record(id: &str, lat: Option<f64>, battery: Option<f64>) -> DeviceRecord {
        DeviceRecord {
            id: id.to_string(),
            display_name: id.to_string(),
            online: true,
            latitude: lat,
            longitude: lat,
            altitude: None,
            heading: None,
            battery_percent: battery,
            flight_state: None,
            updated_at: Utc::now(),
        }
    }

    fn batch(records: Vec<DeviceRecord>) -> HashMap<String, DeviceRecord> {
        records.into_iter().map(|r| (r.id.clone(), r)).collect()
    }

    #[tokio::test]
    async fn test_merge_replaces_whole_record() {
        let table = StateTable::new();
        table
            .merge(batch(vec![record("X", Some(1.0), Some(90.0))]))
            .await;
        table.merge(batch(vec![record("X", Some(2.0), None)])).await;

        let x = table.get("X").await.unwrap();
        assert_eq!(x.latitude, Some(2.0));
        // no leakage of the previous battery value
        assert_eq!(x.battery_percent, None);
        assert_eq!(table.len().await, 1);
    }

    #[tokio::test]
    async fn test_unreported_devices_are_kept() {
        let table = StateTable::new();
        table
            .merge(batch(vec![record("A", None, None), record("B", None, None)]))
            .await;
        let size = table.merge(batch(vec![record("A", Some(1.0), None)])).await;

        assert_eq!(size, 2);
        assert!(table.get("B").await.is_some());
    }

    #[tokio::test]
    async fn test_empty_merge_is_noop() {
        let table = StateTable::new();
        assert!(table.is_empty().await);
        table.merge(HashMap::new()).await;
        assert!(table.is_empty().await);

        table.merge(batch(vec![record("A", None, None)])).await;
        let before = table.snapshot().await;

        table.merge(HashMap::new()).await;

        assert_eq!(table.snapshot().await, before);
    }
}
