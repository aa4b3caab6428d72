use crate::sync::types::ErrorRecord;
use std::collections::VecDeque;
use tokio::sync::Mutex;

/// Bounded, newest-first store of recent failures
#[derive(Debug)]
pub struct ErrorHistory {
    capacity: usize,
    records: Mutex<VecDeque<ErrorRecord>>,
}

impl ErrorHistory {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            records: Mutex::new(VecDeque::with_capacity(capacity)),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Insert a record, evicting the oldest entries beyond capacity
    pub async fn record(&self, record: ErrorRecord) {
        let mut records = self.records.lock().await;
        records.push_front(record);
        records.truncate(self.capacity);
    }

    /// Up to `max` records, most recent first
    pub async fn recent(&self, max: usize) -> Vec<ErrorRecord> {
        let records = self.records.lock().await;
        records.iter().take(max).cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.records.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.lock().await.is_empty()
    }

    pub async fn clear(&self) {
        self.records.lock().await.clear();
    }
}
