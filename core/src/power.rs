/// Host power condition at a point in time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PowerState {
    pub on_battery: bool,
    pub low_charge: bool,
    pub energy_saver: bool,
}

impl PowerState {
    /// True when the monitor should drop its event subscription to save
    /// power. The 30-second poll keeps running regardless.
    pub fn should_conserve(&self) -> bool {
        self.energy_saver || (self.on_battery && self.low_charge)
    }
}

/// Battery/energy-saver probe. Never fails: probes that cannot read the
/// host report a default (mains-powered) state and log the condition.
#[async_trait::async_trait]
pub trait PowerProbe: Send + Sync {
    async fn power_state(&self) -> PowerState;
}

/// Judges whether an interactive user session is present, gating arrival
/// notifications.
#[async_trait::async_trait]
pub trait SessionProbe: Send + Sync {
    async fn interactive_session_present(&self) -> bool;
}
