//! Live view of removable volumes: an event subscription feeding a
//! bounded channel, a periodic poll backstop, and a power check that
//! suspends only the subscription under battery/energy-saver pressure.

pub mod watch;

pub use watch::{CatalogDiffSource, DeviceChange, DeviceChangeSource};

use diskforge_core::{DeviceCatalog, EventSink, ForgeError, PowerProbe, SessionProbe, StageEvent};
use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone)]
pub struct MonitorConfig {
    /// Settle time after an arrival event before re-enumerating, so the
    /// volume finishes mounting.
    pub debounce: Duration,
    /// Cadence of the unconditional re-enumeration backstop.
    pub poll_interval: Duration,
    /// Cadence of the battery/energy-saver check.
    pub power_check_interval: Duration,
    pub channel_capacity: usize,
    /// Attempts for the best-effort marker write on arrival.
    pub marker_attempts: u32,
    pub marker_filename: String,
    /// Overrides the per-letter volume root, for tests.
    pub marker_root: Option<PathBuf>,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        MonitorConfig {
            debounce: Duration::from_millis(400),
            poll_interval: Duration::from_secs(30),
            power_check_interval: Duration::from_secs(300),
            channel_capacity: 64,
            marker_attempts: 3,
            marker_filename: "diskforge-marker.json".to_string(),
            marker_root: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorState {
    Stopped,
    Starting,
    Running,
    Stopping,
}

struct Subscription {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

struct Inner {
    cfg: MonitorConfig,
    catalog: Arc<dyn DeviceCatalog>,
    source: Arc<dyn DeviceChangeSource>,
    power: Arc<dyn PowerProbe>,
    session: Arc<dyn SessionProbe>,
    sink: Arc<dyn EventSink>,
    state: Mutex<MonitorState>,
    known: Mutex<BTreeSet<char>>,
    refresh_busy: AtomicBool,
    tx: Mutex<Option<mpsc::Sender<DeviceChange>>>,
    sub: tokio::sync::Mutex<Option<Subscription>>,
    root_cancel: Mutex<Option<CancellationToken>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

/// Owns the watcher handle, the last-known volume set, and the background
/// tasks. External callers only ever see immutable snapshots.
pub struct DeviceMonitor {
    inner: Arc<Inner>,
}

impl DeviceMonitor {
    pub fn new(
        catalog: Arc<dyn DeviceCatalog>,
        source: Arc<dyn DeviceChangeSource>,
        power: Arc<dyn PowerProbe>,
        session: Arc<dyn SessionProbe>,
        sink: Arc<dyn EventSink>,
        cfg: MonitorConfig,
    ) -> Self {
        DeviceMonitor {
            inner: Arc::new(Inner {
                cfg,
                catalog,
                source,
                power,
                session,
                sink,
                state: Mutex::new(MonitorState::Stopped),
                known: Mutex::new(BTreeSet::new()),
                refresh_busy: AtomicBool::new(false),
                tx: Mutex::new(None),
                sub: tokio::sync::Mutex::new(None),
                root_cancel: Mutex::new(None),
                tasks: Mutex::new(Vec::new()),
            }),
        }
    }

    pub fn state(&self) -> MonitorState {
        *self.inner.state.lock().unwrap()
    }

    /// Letters of the last-known removable volume set.
    pub fn known_letters(&self) -> Vec<char> {
        self.inner.known.lock().unwrap().iter().copied().collect()
    }

    pub async fn subscription_active(&self) -> bool {
        self.inner.sub.lock().await.is_some()
    }

    /// Moves Stopped -> Starting -> Running. With energy saver already
    /// active the initial enumeration runs but no event subscription is
    /// registered; the power check resumes it later if conditions allow.
    pub async fn start(&self) -> Result<(), ForgeError> {
        {
            let mut state = self.inner.state.lock().unwrap();
            if *state != MonitorState::Stopped {
                return Err(ForgeError::Validation(format!(
                    "monitor cannot start from {:?}",
                    *state
                )));
            }
            *state = MonitorState::Starting;
        }

        let cancel = CancellationToken::new();
        *self.inner.root_cancel.lock().unwrap() = Some(cancel.clone());

        // Initial enumeration seeds the known set without firing callbacks.
        self.inner.refresh(false).await;

        let (tx, rx) = mpsc::channel(self.inner.cfg.channel_capacity);
        *self.inner.tx.lock().unwrap() = Some(tx);

        let consumer = tokio::spawn(consumer_loop(
            Arc::clone(&self.inner),
            rx,
            cancel.clone(),
        ));
        let poll = tokio::spawn(poll_loop(Arc::clone(&self.inner), cancel.clone()));
        let power = tokio::spawn(power_loop(Arc::clone(&self.inner), cancel.clone()));
        self.inner.tasks.lock().unwrap().extend([consumer, poll, power]);

        if self.inner.power.power_state().await.should_conserve() {
            self.inner.sink.emit(StageEvent::new(
                "subscription-skipped",
                serde_json::json!({ "reason": "energy saver active at start" }),
            ));
        } else {
            self.inner.start_subscription(&cancel).await;
        }

        *self.inner.state.lock().unwrap() = MonitorState::Running;
        Ok(())
    }

    /// Idempotent and reentrant-safe: a second concurrent call observes
    /// Stopping or Stopped and returns immediately.
    pub async fn stop(&self) {
        {
            let mut state = self.inner.state.lock().unwrap();
            if *state != MonitorState::Running {
                return;
            }
            *state = MonitorState::Stopping;
        }
        if let Some(cancel) = self.inner.root_cancel.lock().unwrap().take() {
            cancel.cancel();
        }
        self.inner.stop_subscription().await;
        *self.inner.tx.lock().unwrap() = None;
        let tasks: Vec<JoinHandle<()>> = self.inner.tasks.lock().unwrap().drain(..).collect();
        for task in tasks {
            let _ = task.await;
        }
        *self.inner.state.lock().unwrap() = MonitorState::Stopped;
    }

    /// One-shot gated refresh for list consumers; a request arriving while
    /// another is in flight is coalesced, not queued.
    pub async fn refresh(&self) {
        self.inner.refresh(true).await;
    }
}

impl Inner {
    async fn start_subscription(self: &Arc<Self>, root: &CancellationToken) {
        let mut sub = self.sub.lock().await;
        if sub.is_some() {
            return;
        }
        let Some(tx) = self.tx.lock().unwrap().clone() else {
            return;
        };
        let token = root.child_token();
        let source = Arc::clone(&self.source);
        let task_token = token.clone();
        let task = tokio::spawn(async move {
            source.run(tx, task_token).await;
        });
        *sub = Some(Subscription { cancel: token, task });
    }

    async fn stop_subscription(&self) {
        let sub = self.sub.lock().await.take();
        if let Some(sub) = sub {
            sub.cancel.cancel();
            let _ = sub.task.await;
        }
    }

    /// Re-enumerates, diffs against the last-known letter set, and fires
    /// the arrival side effects for newly added letters only.
    async fn refresh(self: &Arc<Self>, fire_callbacks: bool) {
        if self.refresh_busy.swap(true, Ordering::SeqCst) {
            return;
        }
        let letters: BTreeSet<char> = self
            .catalog
            .list_volumes()
            .await
            .into_iter()
            .filter(|v| v.is_removable)
            .filter_map(|v| v.letter)
            .collect();
        let (added, removed) = {
            let mut known = self.known.lock().unwrap();
            let added: Vec<char> = letters.difference(&known).copied().collect();
            let removed: Vec<char> = known.difference(&letters).copied().collect();
            *known = letters;
            (added, removed)
        };
        if fire_callbacks {
            for letter in added {
                self.on_arrival(letter).await;
            }
            for letter in removed {
                self.sink.emit(StageEvent::new(
                    "volume-removed",
                    serde_json::json!({ "letter": letter }),
                ));
            }
        }
        self.refresh_busy.store(false, Ordering::SeqCst);
    }

    async fn on_arrival(&self, letter: char) {
        self.sink.emit(StageEvent::new(
            "volume-arrival",
            serde_json::json!({ "letter": letter }),
        ));

        let root = self
            .cfg
            .marker_root
            .clone()
            .unwrap_or_else(|| PathBuf::from(format!("{letter}:\\")));
        let path = root.join(&self.cfg.marker_filename);
        let payload = serde_json::json!({
            "letter": letter,
            "seen_at": chrono::Utc::now().to_rfc3339(),
        })
        .to_string();
        for attempt in 1..=self.cfg.marker_attempts {
            match tokio::fs::write(&path, &payload).await {
                Ok(()) => break,
                Err(e) if attempt < self.cfg.marker_attempts => {
                    tracing::debug!(%letter, attempt, error = %e, "marker write failed, retrying");
                }
                Err(e) => {
                    // Abandoned silently after the last attempt.
                    tracing::debug!(%letter, error = %e, "marker write abandoned");
                }
            }
        }

        if self.session.interactive_session_present().await {
            self.sink.emit(StageEvent::new(
                "volume-arrival-notification",
                serde_json::json!({ "letter": letter }),
            ));
        }
    }
}

/// Single consumer of the bounded change channel: debounces arrivals,
/// drains the burst, then re-enumerates once.
async fn consumer_loop(
    inner: Arc<Inner>,
    mut rx: mpsc::Receiver<DeviceChange>,
    cancel: CancellationToken,
) {
    loop {
        let change = tokio::select! {
            _ = cancel.cancelled() => break,
            change = rx.recv() => change,
        };
        let Some(change) = change else { break };
        if change == DeviceChange::Arrival {
            tokio::time::sleep(inner.cfg.debounce).await;
            while rx.try_recv().is_ok() {}
        }
        inner.refresh(true).await;
    }
}

/// Unconditional re-enumeration backstop for missed events.
async fn poll_loop(inner: Arc<Inner>, cancel: CancellationToken) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(inner.cfg.poll_interval) => {}
        }
        inner.refresh(true).await;
    }
}

/// Suspends only the event subscription under power pressure; the poll
/// keeps running. Resumes the subscription when conditions improve.
async fn power_loop(inner: Arc<Inner>, cancel: CancellationToken) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(inner.cfg.power_check_interval) => {}
        }
        let state = inner.power.power_state().await;
        if state.should_conserve() {
            if inner.sub.lock().await.is_some() {
                inner.stop_subscription().await;
                inner.sink.emit(StageEvent::new(
                    "subscription-suspended",
                    serde_json::json!({ "on_battery": state.on_battery, "energy_saver": state.energy_saver }),
                ));
            }
        } else {
            let running = *inner.state.lock().unwrap() == MonitorState::Running;
            if running && inner.sub.lock().await.is_none() {
                inner.start_subscription(&cancel).await;
                inner.sink.emit(StageEvent::new(
                    "subscription-resumed",
                    serde_json::json!({}),
                ));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use diskforge_core::test_utils::{
        fixed_volume, usb_volume, MockCatalog, MockPowerProbe, MockSessionProbe, RecordingSink,
    };
    use diskforge_core::PowerState;

    struct PushSource {
        feed: tokio::sync::Mutex<Option<mpsc::Receiver<DeviceChange>>>,
    }

    impl PushSource {
        fn new() -> (Arc<Self>, mpsc::Sender<DeviceChange>) {
            let (tx, rx) = mpsc::channel(16);
            (
                Arc::new(PushSource {
                    feed: tokio::sync::Mutex::new(Some(rx)),
                }),
                tx,
            )
        }
    }

    #[async_trait::async_trait]
    impl DeviceChangeSource for PushSource {
        async fn run(&self, tx: mpsc::Sender<DeviceChange>, cancel: CancellationToken) {
            let Some(mut rx) = self.feed.lock().await.take() else {
                cancel.cancelled().await;
                return;
            };
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    change = rx.recv() => match change {
                        Some(change) => {
                            let _ = tx.try_send(change);
                        }
                        None => break,
                    },
                }
            }
        }
    }

    fn test_config(marker_root: &std::path::Path) -> MonitorConfig {
        MonitorConfig {
            marker_root: Some(marker_root.to_path_buf()),
            ..MonitorConfig::default()
        }
    }

    struct Fixture {
        monitor: DeviceMonitor,
        catalog: Arc<MockCatalog>,
        sink: Arc<RecordingSink>,
        power: Arc<MockPowerProbe>,
        push: mpsc::Sender<DeviceChange>,
    }

    fn fixture(marker_root: &std::path::Path, session_present: bool) -> Fixture {
        let catalog = Arc::new(MockCatalog::new(vec![fixed_volume('C')], vec![]));
        let sink = Arc::new(RecordingSink::default());
        let power = Arc::new(MockPowerProbe::default());
        let (source, push) = PushSource::new();
        let monitor = DeviceMonitor::new(
            catalog.clone(),
            source,
            power.clone(),
            Arc::new(MockSessionProbe {
                present: session_present,
            }),
            sink.clone(),
            test_config(marker_root),
        );
        Fixture {
            monitor,
            catalog,
            sink,
            power,
            push,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn arrival_event_debounces_then_fires_callback_and_marker() {
        let dir = tempfile::tempdir().unwrap();
        let f = fixture(dir.path(), true);
        f.monitor.start().await.unwrap();
        assert_eq!(f.monitor.state(), MonitorState::Running);

        f.catalog.add_volume(usb_volume('E'));
        f.push.send(DeviceChange::Arrival).await.unwrap();
        tokio::time::sleep(Duration::from_millis(600)).await;

        assert_eq!(f.monitor.known_letters(), vec!['E']);
        assert!(dir.path().join("diskforge-marker.json").exists());
        let kinds = f.sink.kinds();
        assert!(kinds.contains(&"volume-arrival"));
        assert!(kinds.contains(&"volume-arrival-notification"));

        f.monitor.stop().await;
        assert_eq!(f.monitor.state(), MonitorState::Stopped);
    }

    #[tokio::test(start_paused = true)]
    async fn no_notification_without_an_interactive_session() {
        let dir = tempfile::tempdir().unwrap();
        let f = fixture(dir.path(), false);
        f.monitor.start().await.unwrap();

        f.catalog.add_volume(usb_volume('E'));
        f.push.send(DeviceChange::Arrival).await.unwrap();
        tokio::time::sleep(Duration::from_millis(600)).await;

        let kinds = f.sink.kinds();
        assert!(kinds.contains(&"volume-arrival"));
        assert!(!kinds.contains(&"volume-arrival-notification"));
        f.monitor.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn a_burst_of_arrivals_coalesces_into_one_enumeration() {
        let dir = tempfile::tempdir().unwrap();
        let f = fixture(dir.path(), false);
        f.monitor.start().await.unwrap();
        let baseline = f.catalog.volume_call_count();

        f.catalog.add_volume(usb_volume('E'));
        for _ in 0..5 {
            f.push.send(DeviceChange::Arrival).await.unwrap();
        }
        tokio::time::sleep(Duration::from_millis(600)).await;

        assert_eq!(f.catalog.volume_call_count(), baseline + 1);
        f.monitor.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn readding_a_known_letter_is_a_no_op() {
        let dir = tempfile::tempdir().unwrap();
        let f = fixture(dir.path(), false);
        f.monitor.start().await.unwrap();

        f.catalog.add_volume(usb_volume('E'));
        f.push.send(DeviceChange::Arrival).await.unwrap();
        tokio::time::sleep(Duration::from_millis(600)).await;
        f.push.send(DeviceChange::Arrival).await.unwrap();
        tokio::time::sleep(Duration::from_millis(600)).await;

        let arrivals = f
            .sink
            .kinds()
            .iter()
            .filter(|k| **k == "volume-arrival")
            .count();
        assert_eq!(arrivals, 1);
        f.monitor.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn energy_saver_at_start_skips_the_subscription_but_polls() {
        let dir = tempfile::tempdir().unwrap();
        let f = fixture(dir.path(), false);
        f.power.set(PowerState {
            energy_saver: true,
            ..Default::default()
        });
        f.monitor.start().await.unwrap();
        assert!(!f.monitor.subscription_active().await);

        // The 30-second poll still notices the arrival.
        f.catalog.add_volume(usb_volume('F'));
        tokio::time::sleep(Duration::from_secs(31)).await;
        assert_eq!(f.monitor.known_letters(), vec!['F']);
        f.monitor.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn power_transition_suspends_subscription_and_keeps_polling() {
        let dir = tempfile::tempdir().unwrap();
        let f = fixture(dir.path(), false);
        f.monitor.start().await.unwrap();
        assert!(f.monitor.subscription_active().await);

        f.power.set(PowerState {
            on_battery: true,
            low_charge: true,
            ..Default::default()
        });
        tokio::time::sleep(Duration::from_secs(301)).await;
        assert!(!f.monitor.subscription_active().await);
        assert!(f.sink.kinds().contains(&"subscription-suspended"));

        f.catalog.add_volume(usb_volume('G'));
        tokio::time::sleep(Duration::from_secs(31)).await;
        assert!(f.monitor.known_letters().contains(&'G'));

        // Conditions improve: the next power check resumes the subscription.
        f.power.set(PowerState::default());
        tokio::time::sleep(Duration::from_secs(301)).await;
        assert!(f.monitor.subscription_active().await);
        f.monitor.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn stop_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let f = fixture(dir.path(), false);
        f.monitor.start().await.unwrap();
        f.monitor.stop().await;
        f.monitor.stop().await;
        assert_eq!(f.monitor.state(), MonitorState::Stopped);
        // A stopped monitor can start again.
        f.monitor.start().await.unwrap();
        f.monitor.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn marker_failure_is_abandoned_silently() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("does-not-exist");
        let f = fixture(&missing, true);
        f.monitor.start().await.unwrap();

        f.catalog.add_volume(usb_volume('E'));
        f.push.send(DeviceChange::Arrival).await.unwrap();
        tokio::time::sleep(Duration::from_millis(600)).await;

        // The arrival flow completes despite the failed marker writes.
        assert!(f.sink.kinds().contains(&"volume-arrival-notification"));
        f.monitor.stop().await;
    }
}
