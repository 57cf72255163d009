//! Mock implementations of every trait seam, for tests that must never
//! touch real hardware.

use crate::device::{DeviceCatalog, DiskLayout, LayoutProbe, PhysicalDevice, Volume};
use crate::error::ForgeError;
use crate::events::{EventSink, StageEvent};
use crate::power::{PowerProbe, PowerState, SessionProbe};
use crate::process::{CommandRunner, RunOutput, ScriptRunner};
use crate::safety::{PrivilegeOutcome, SafetyGuard};
use crate::sanitize::SectorSampler;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;

pub fn usb_volume(letter: char) -> Volume {
    Volume {
        letter: Some(letter),
        filesystem: "FAT32".to_string(),
        capacity_bytes: 16 * 1_073_741_824,
        free_bytes: 8 * 1_073_741_824,
        is_removable: true,
    }
}

pub fn fixed_volume(letter: char) -> Volume {
    Volume {
        letter: Some(letter),
        filesystem: "NTFS".to_string(),
        capacity_bytes: 500 * 1_073_741_824,
        free_bytes: 120 * 1_073_741_824,
        is_removable: false,
    }
}

pub fn usb_drive(index: u32) -> PhysicalDevice {
    PhysicalDevice {
        index,
        model: format!("Mock USB Drive {index}"),
        size_bytes: 16 * 1_073_741_824,
        is_removable: true,
    }
}

pub fn fixed_drive(index: u32) -> PhysicalDevice {
    PhysicalDevice {
        index,
        model: format!("Mock Fixed Drive {index}"),
        size_bytes: 500 * 1_073_741_824,
        is_removable: false,
    }
}

/// Catalog over an in-memory device table. The volume set can be swapped
/// mid-test to simulate arrivals and removals.
pub struct MockCatalog {
    volumes: Mutex<Vec<Volume>>,
    drives: Mutex<Vec<PhysicalDevice>>,
    volume_calls: Mutex<usize>,
}

impl Default for MockCatalog {
    fn default() -> Self {
        Self::new(vec![fixed_volume('C')], vec![fixed_drive(0), usb_drive(1)])
    }
}

impl MockCatalog {
    pub fn new(volumes: Vec<Volume>, drives: Vec<PhysicalDevice>) -> Self {
        MockCatalog {
            volumes: Mutex::new(volumes),
            drives: Mutex::new(drives),
            volume_calls: Mutex::new(0),
        }
    }

    pub fn set_volumes(&self, volumes: Vec<Volume>) {
        *self.volumes.lock().unwrap() = volumes;
    }

    pub fn add_volume(&self, volume: Volume) {
        self.volumes.lock().unwrap().push(volume);
    }

    pub fn volume_call_count(&self) -> usize {
        *self.volume_calls.lock().unwrap()
    }
}

#[async_trait::async_trait]
impl DeviceCatalog for MockCatalog {
    async fn list_volumes(&self) -> Vec<Volume> {
        *self.volume_calls.lock().unwrap() += 1;
        self.volumes.lock().unwrap().clone()
    }

    async fn list_physical_drives(
        &self,
        removable_first: bool,
    ) -> Result<Vec<PhysicalDevice>, ForgeError> {
        let mut drives = self.drives.lock().unwrap().clone();
        crate::device::sort_drives(&mut drives, removable_first);
        Ok(drives)
    }
}

pub struct MockLayoutProbe {
    pub layout: DiskLayout,
}

#[async_trait::async_trait]
impl LayoutProbe for MockLayoutProbe {
    async fn partition_layout(&self, disk: u32) -> Result<DiskLayout, ForgeError> {
        if disk == self.layout.disk {
            Ok(self.layout.clone())
        } else {
            Err(ForgeError::DeviceNotFound(disk))
        }
    }
}

/// Guard with configurable system volumes/disks and a fixed privilege
/// outcome; records every `ensure_privilege` call.
pub struct MockSafetyGuard {
    pub system_letters: Vec<char>,
    pub system_disks: Vec<u32>,
    pub privilege: PrivilegeOutcome,
    ensure_calls: Mutex<Vec<String>>,
}

impl Default for MockSafetyGuard {
    fn default() -> Self {
        Self::granting()
    }
}

impl MockSafetyGuard {
    pub fn granting() -> Self {
        MockSafetyGuard {
            system_letters: vec!['C'],
            system_disks: vec![0],
            privilege: PrivilegeOutcome::Granted,
            ensure_calls: Mutex::new(Vec::new()),
        }
    }

    pub fn with_privilege(privilege: PrivilegeOutcome) -> Self {
        MockSafetyGuard {
            privilege,
            ..Self::granting()
        }
    }

    pub fn ensure_calls(&self) -> Vec<String> {
        self.ensure_calls.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl SafetyGuard for MockSafetyGuard {
    fn is_system_volume(&self, letter: char) -> bool {
        self.system_letters
            .iter()
            .any(|l| l.eq_ignore_ascii_case(&letter))
    }

    async fn is_system_disk(&self, index: u32) -> Result<bool, ForgeError> {
        Ok(self.system_disks.contains(&index))
    }

    async fn ensure_privilege(&self, operation: &str) -> Result<PrivilegeOutcome, ForgeError> {
        self.ensure_calls.lock().unwrap().push(operation.to_string());
        Ok(self.privilege)
    }
}

/// Sink that keeps every event for later assertions.
#[derive(Default)]
pub struct RecordingSink {
    events: Mutex<Vec<StageEvent>>,
}

impl RecordingSink {
    pub fn events(&self) -> Vec<StageEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn kinds(&self) -> Vec<&'static str> {
        self.events.lock().unwrap().iter().map(|e| e.kind).collect()
    }
}

impl EventSink for RecordingSink {
    fn emit(&self, event: StageEvent) {
        self.events.lock().unwrap().push(event);
    }
}

/// Script runner that records scripts instead of spawning anything.
/// `failing` simulates a non-zero exit; `hanging` parks until canceled.
pub struct MockScriptRunner {
    scripts: Mutex<Vec<String>>,
    failing: AtomicBool,
    hanging: AtomicBool,
}

impl Default for MockScriptRunner {
    fn default() -> Self {
        MockScriptRunner {
            scripts: Mutex::new(Vec::new()),
            failing: AtomicBool::new(false),
            hanging: AtomicBool::new(false),
        }
    }
}

impl MockScriptRunner {
    pub fn failing() -> Self {
        let runner = Self::default();
        runner.failing.store(true, Ordering::SeqCst);
        runner
    }

    pub fn hanging() -> Self {
        let runner = Self::default();
        runner.hanging.store(true, Ordering::SeqCst);
        runner
    }

    pub fn scripts(&self) -> Vec<String> {
        self.scripts.lock().unwrap().clone()
    }

    pub fn run_count(&self) -> usize {
        self.scripts.lock().unwrap().len()
    }
}

#[async_trait::async_trait]
impl ScriptRunner for MockScriptRunner {
    async fn run_script(
        &self,
        script: &str,
        cancel: &CancellationToken,
    ) -> Result<RunOutput, ForgeError> {
        if self.hanging.load(Ordering::SeqCst) {
            cancel.cancelled().await;
            return Err(ForgeError::Canceled);
        }
        self.scripts.lock().unwrap().push(script.to_string());
        if self.failing.load(Ordering::SeqCst) {
            return Err(ForgeError::external(
                "mock-diskpart",
                "DiskPart has encountered an error.",
            ));
        }
        Ok(RunOutput {
            exit_code: 0,
            stdout: "DiskPart successfully completed the operation.".to_string(),
            stderr: String::new(),
        })
    }

    fn tool_name(&self) -> &str {
        "mock-diskpart"
    }
}

/// Command runner that records (program, args) pairs.
pub struct MockCommandRunner {
    calls: Mutex<Vec<(String, Vec<String>)>>,
    failing: AtomicBool,
    hanging: AtomicBool,
}

impl Default for MockCommandRunner {
    fn default() -> Self {
        MockCommandRunner {
            calls: Mutex::new(Vec::new()),
            failing: AtomicBool::new(false),
            hanging: AtomicBool::new(false),
        }
    }
}

impl MockCommandRunner {
    pub fn failing() -> Self {
        let runner = Self::default();
        runner.failing.store(true, Ordering::SeqCst);
        runner
    }

    pub fn hanging() -> Self {
        let runner = Self::default();
        runner.hanging.store(true, Ordering::SeqCst);
        runner
    }

    pub fn calls(&self) -> Vec<(String, Vec<String>)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl CommandRunner for MockCommandRunner {
    async fn run_command(
        &self,
        program: &str,
        args: &[String],
        cancel: &CancellationToken,
    ) -> Result<RunOutput, ForgeError> {
        if self.hanging.load(Ordering::SeqCst) {
            cancel.cancelled().await;
            return Err(ForgeError::Canceled);
        }
        self.calls
            .lock()
            .unwrap()
            .push((program.to_string(), args.to_vec()));
        if self.failing.load(Ordering::SeqCst) {
            return Err(ForgeError::external(program, "exit status 1"));
        }
        Ok(RunOutput {
            exit_code: 0,
            stdout: String::new(),
            stderr: String::new(),
        })
    }
}

/// Sampler returning a fixed byte pattern.
pub struct MockSectorSampler {
    pub bytes: Vec<u8>,
}

impl MockSectorSampler {
    pub fn zeroed(len: usize) -> Self {
        MockSectorSampler { bytes: vec![0; len] }
    }

    pub fn dirty(len: usize) -> Self {
        MockSectorSampler {
            bytes: vec![0xA5; len],
        }
    }
}

#[async_trait::async_trait]
impl SectorSampler for MockSectorSampler {
    async fn sample(&self, _disk: u32) -> Result<Vec<u8>, ForgeError> {
        Ok(self.bytes.clone())
    }
}

/// Probe over a shared, mutable power state.
#[derive(Default)]
pub struct MockPowerProbe {
    state: Arc<Mutex<PowerState>>,
}

impl MockPowerProbe {
    pub fn handle(&self) -> Arc<Mutex<PowerState>> {
        Arc::clone(&self.state)
    }

    pub fn set(&self, state: PowerState) {
        *self.state.lock().unwrap() = state;
    }
}

#[async_trait::async_trait]
impl PowerProbe for MockPowerProbe {
    async fn power_state(&self) -> PowerState {
        *self.state.lock().unwrap()
    }
}

pub struct MockSessionProbe {
    pub present: bool,
}

#[async_trait::async_trait]
impl SessionProbe for MockSessionProbe {
    async fn interactive_session_present(&self) -> bool {
        self.present
    }
}
