use diskforge_core::DeviceCatalog;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// One record from the OS device-change subscription. The record carries
/// no letter: the consumer re-enumerates and diffs, so a missed detail in
/// the event itself cannot lose an arrival.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceChange {
    Arrival,
    Removal,
    Update,
}

/// Feeds device-change records into a bounded channel until canceled.
/// When the channel is full the record is dropped; the periodic poll is
/// the correctness backstop, so eventual consistency holds regardless.
#[async_trait::async_trait]
pub trait DeviceChangeSource: Send + Sync {
    async fn run(&self, tx: mpsc::Sender<DeviceChange>, cancel: CancellationToken);
}

/// Default subscription: a short-cadence catalog diff behind the source
/// trait. An OS-native event source implements the same trait without
/// touching the monitor.
pub struct CatalogDiffSource {
    catalog: Arc<dyn DeviceCatalog>,
    period: Duration,
}

impl CatalogDiffSource {
    pub fn new(catalog: Arc<dyn DeviceCatalog>, period: Duration) -> Self {
        CatalogDiffSource { catalog, period }
    }
}

#[async_trait::async_trait]
impl DeviceChangeSource for CatalogDiffSource {
    async fn run(&self, tx: mpsc::Sender<DeviceChange>, cancel: CancellationToken) {
        let mut last: Option<BTreeSet<char>> = None;
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(self.period) => {}
            }
            let letters: BTreeSet<char> = self
                .catalog
                .list_volumes()
                .await
                .into_iter()
                .filter(|v| v.is_removable)
                .filter_map(|v| v.letter)
                .collect();
            if let Some(prev) = &last {
                for _ in letters.difference(prev) {
                    let _ = tx.try_send(DeviceChange::Arrival);
                }
                for _ in prev.difference(&letters) {
                    let _ = tx.try_send(DeviceChange::Removal);
                }
            }
            last = Some(letters);
        }
    }
}
