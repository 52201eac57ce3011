//! Asynchronous forwarding of log entries to a remote log-aggregation sink.
//!
//! Producers ([`LogExporter`]) never wait: `enqueue` is a `try_send` on a
//! bounded channel and a full or closed queue drops the entry. A single
//! consumer ([`LogQueue::run`]) pushes entries one by one through a
//! [`RemoteLogTransport`]. Delivery is at-most-once and best effort; a failed
//! push is counted and the worker moves on to the next entry.

use std::{
    collections::BTreeMap,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::{SystemTime, UNIX_EPOCH},
};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::{
    sync::mpsc::{self, error::TrySendError},
    task::JoinHandle,
};
use tracing::debug;

use crate::error::ExportError;

#[cfg(test)]
use mockall::automock;

/// One log line handed to the exporter. Never mutated after enqueue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    pub labels: BTreeMap<String, String>,
    pub message: String,
    pub timestamp_nanos: i64,
}

impl LogEntry {
    pub fn new(labels: BTreeMap<String, String>, message: impl Into<String>) -> Self {
        Self {
            labels,
            message: message.into(),
            timestamp_nanos: now_nanos(),
        }
    }
}

fn now_nanos() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| i64::try_from(d.as_nanos()).unwrap_or(i64::MAX))
        .unwrap_or_default()
}

#[cfg_attr(test, automock)]
#[async_trait]
pub trait RemoteLogTransport: Send + Sync {
    async fn push(&self, entry: &LogEntry) -> Result<(), ExportError>;
}

/// Counters shared between producers and the worker.
#[derive(Debug, Default)]
pub struct ExportStats {
    enqueued: AtomicU64,
    dropped: AtomicU64,
    sent: AtomicU64,
    failed: AtomicU64,
}

impl ExportStats {
    pub fn enqueued(&self) -> u64 {
        self.enqueued.load(Ordering::Relaxed)
    }

    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    pub fn sent(&self) -> u64 {
        self.sent.load(Ordering::Relaxed)
    }

    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }
}

/// Producer side of the export queue. Cheap to clone.
#[derive(Debug, Clone)]
pub struct LogExporter {
    tx: mpsc::Sender<LogEntry>,
    capacity: usize,
    stats: Arc<ExportStats>,
}

/// Consumer side of the export queue.
#[derive(Debug)]
pub struct LogQueue {
    rx: mpsc::Receiver<LogEntry>,
    stats: Arc<ExportStats>,
}

impl LogExporter {
    /// Creates the queue without starting a worker. `capacity` is clamped to
    /// at least one slot.
    pub fn bounded(capacity: usize) -> (Self, LogQueue) {
        let capacity = capacity.max(1);
        let (tx, rx) = mpsc::channel(capacity);
        let stats = Arc::new(ExportStats::default());
        (
            Self {
                tx,
                capacity,
                stats: stats.clone(),
            },
            LogQueue { rx, stats },
        )
    }

    /// Creates the queue and spawns its worker on the current Tokio runtime.
    pub fn spawn(
        transport: Arc<dyn RemoteLogTransport>,
        capacity: usize,
    ) -> (Self, JoinHandle<()>) {
        let (exporter, queue) = Self::bounded(capacity);
        let worker = tokio::spawn(queue.run(transport));
        (exporter, worker)
    }

    /// Queues `entry` without waiting. Returns `false` when it was dropped.
    pub fn enqueue(&self, entry: LogEntry) -> bool {
        match self.tx.try_send(entry) {
            Ok(()) => {
                self.stats.enqueued.fetch_add(1, Ordering::Relaxed);
                true
            }
            Err(TrySendError::Full(_)) => {
                self.stats.dropped.fetch_add(1, Ordering::Relaxed);
                debug!("remote log queue full, dropping entry");
                false
            }
            Err(TrySendError::Closed(_)) => {
                self.stats.dropped.fetch_add(1, Ordering::Relaxed);
                debug!("remote log queue closed, dropping entry");
                false
            }
        }
    }

    /// Entries waiting for the worker.
    pub fn pending(&self) -> usize {
        self.capacity - self.tx.capacity()
    }

    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn stats(&self) -> &ExportStats {
        &self.stats
    }
}

impl LogQueue {
    #[cfg(test)]
    pub(crate) fn try_recv(&mut self) -> Option<LogEntry> {
        self.rx.try_recv().ok()
    }

    /// Drains the queue until every producer is gone.
    pub async fn run(mut self, transport: Arc<dyn RemoteLogTransport>) {
        while let Some(entry) = self.rx.recv().await {
            match transport.push(&entry).await {
                Ok(()) => {
                    self.stats.sent.fetch_add(1, Ordering::Relaxed);
                }
                Err(e) => {
                    self.stats.failed.fetch_add(1, Ordering::Relaxed);
                    debug!("remote log push failed: {}", e);
                }
            }
        }
        debug!("remote log queue closed, worker exiting");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockall::Sequence;

    fn entry(message: &str) -> LogEntry {
        let mut labels = BTreeMap::new();
        labels.insert("level".to_string(), "info".to_string());
        LogEntry::new(labels, message)
    }

    #[test]
    fn test_entry_timestamp_is_set() {
        assert!(entry("x").timestamp_nanos > 0);
    }

    #[test]
    fn test_enqueue_drops_when_full() {
        let (exporter, _queue) = LogExporter::bounded(2);
        assert!(exporter.enqueue(entry("a")));
        assert!(exporter.enqueue(entry("b")));
        assert!(!exporter.enqueue(entry("c")));

        assert_eq!(exporter.pending(), 2);
        assert_eq!(exporter.stats().enqueued(), 2);
        assert_eq!(exporter.stats().dropped(), 1);
    }

    #[test]
    fn test_enqueue_drops_when_closed() {
        let (exporter, queue) = LogExporter::bounded(4);
        drop(queue);
        assert!(!exporter.enqueue(entry("late")));
        assert_eq!(exporter.stats().dropped(), 1);
    }

    #[tokio::test]
    async fn test_worker_continues_after_failed_push() {
        let mut transport = MockRemoteLogTransport::new();
        let mut seq = Sequence::new();
        transport
            .expect_push()
            .withf(|e| e.message == "first")
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Err(ExportError::Status(503)));
        transport
            .expect_push()
            .withf(|e| e.message == "second")
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(()));

        let (exporter, queue) = LogExporter::bounded(8);
        exporter.enqueue(entry("first"));
        exporter.enqueue(entry("second"));
        let stats = exporter.stats.clone();
        drop(exporter);

        queue.run(Arc::new(transport)).await;

        assert_eq!(stats.failed(), 1);
        assert_eq!(stats.sent(), 1);
    }

    #[tokio::test]
    async fn test_spawned_worker_drains_queue() {
        let mut transport = MockRemoteLogTransport::new();
        transport.expect_push().times(3).returning(|_| Ok(()));

        let (exporter, worker) = LogExporter::spawn(Arc::new(transport), 16);
        for i in 0..3 {
            assert!(exporter.enqueue(entry(&format!("line {i}"))));
        }
        let stats = exporter.stats.clone();
        drop(exporter);

        worker.await.unwrap();
        assert_eq!(stats.sent(), 3);
        assert_eq!(stats.enqueued(), 3);
    }
}
