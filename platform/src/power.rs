use diskforge_core::{PowerProbe, PowerState, SessionProbe};

const LOW_CHARGE_PERCENT: u32 = 20;

/// Host battery/energy-saver probe. Failures degrade to the default
/// (mains-powered) state so the monitor keeps running.
pub struct HostPowerProbe;

#[cfg(target_os = "windows")]
mod host {
    use super::LOW_CHARGE_PERCENT;
    use diskforge_core::PowerState;
    use serde::Deserialize;
    use std::os::windows::process::CommandExt;
    use tokio::process::Command;

    #[derive(Debug, Deserialize)]
    struct Battery {
        #[serde(rename = "BatteryStatus")]
        battery_status: Option<u32>,
        #[serde(rename = "EstimatedChargeRemaining")]
        charge: Option<u32>,
    }

    pub async fn power_state() -> PowerState {
        let mut state = PowerState::default();
        let battery = Command::new("powershell")
            .args([
                "-NoProfile",
                "-Command",
                "Get-CimInstance Win32_Battery | \
                 Select-Object BatteryStatus,EstimatedChargeRemaining | ConvertTo-Json",
            ])
            .creation_flags(0x08000000)
            .output()
            .await;
        if let Ok(output) = battery {
            let text = String::from_utf8_lossy(&output.stdout);
            if let Ok(value) = serde_json::from_str::<serde_json::Value>(text.trim()) {
                if let Some(b) = crate::parse::json_objects(value)
                    .into_iter()
                    .next()
                    .and_then(|v| serde_json::from_value::<Battery>(v).ok())
                {
                    // BatteryStatus 1 is "discharging" in Win32_Battery.
                    state.on_battery = b.battery_status == Some(1);
                    state.low_charge = b.charge.is_some_and(|c| c < LOW_CHARGE_PERCENT);
                }
            }
        }
        let scheme = Command::new("powercfg")
            .arg("/getactivescheme")
            .creation_flags(0x08000000)
            .output()
            .await;
        if let Ok(output) = scheme {
            let text = String::from_utf8_lossy(&output.stdout).to_lowercase();
            state.energy_saver = text.contains("power saver");
        }
        state
    }

    pub fn interactive_session_present() -> bool {
        std::env::var("SESSIONNAME").is_ok()
    }
}

#[cfg(target_os = "linux")]
mod host {
    use super::LOW_CHARGE_PERCENT;
    use diskforge_core::PowerState;
    use std::fs;

    pub async fn power_state() -> PowerState {
        let mut state = PowerState::default();
        if let Ok(entries) = fs::read_dir("/sys/class/power_supply") {
            for entry in entries.flatten() {
                let dir = entry.path();
                let kind = fs::read_to_string(dir.join("type")).unwrap_or_default();
                if kind.trim() != "Battery" {
                    continue;
                }
                let status = fs::read_to_string(dir.join("status")).unwrap_or_default();
                if status.trim() == "Discharging" {
                    state.on_battery = true;
                }
                if let Ok(capacity) = fs::read_to_string(dir.join("capacity")) {
                    if capacity.trim().parse::<u32>().is_ok_and(|c| c < LOW_CHARGE_PERCENT) {
                        state.low_charge = true;
                    }
                }
            }
        }
        if let Ok(profile) = fs::read_to_string("/sys/firmware/acpi/platform_profile") {
            state.energy_saver = profile.trim() == "low-power";
        }
        state
    }

    pub fn interactive_session_present() -> bool {
        std::env::var("DISPLAY").is_ok() || std::env::var("WAYLAND_DISPLAY").is_ok()
    }
}

#[cfg(not(any(target_os = "windows", target_os = "linux")))]
mod host {
    use diskforge_core::PowerState;

    pub async fn power_state() -> PowerState {
        PowerState::default()
    }

    pub fn interactive_session_present() -> bool {
        false
    }
}

#[async_trait::async_trait]
impl PowerProbe for HostPowerProbe {
    async fn power_state(&self) -> PowerState {
        host::power_state().await
    }
}

/// Judges an interactive session from the login environment.
pub struct HostSessionProbe;

#[async_trait::async_trait]
impl SessionProbe for HostSessionProbe {
    async fn interactive_session_present(&self) -> bool {
        host::interactive_session_present()
    }
}
