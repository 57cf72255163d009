pub mod guard;
pub mod parse;
pub mod power;
pub mod runner;

#[cfg(target_os = "linux")]
pub mod linux;

#[cfg(target_os = "windows")]
pub mod windows;

pub use guard::HostSafetyGuard;
pub use power::{HostPowerProbe, HostSessionProbe};
pub use runner::{DiskpartRunner, ShellCommandRunner};

#[cfg(target_os = "linux")]
pub use linux::catalog::LinuxCatalog as PlatformCatalog;

#[cfg(target_os = "windows")]
pub use windows::catalog::WindowsCatalog as PlatformCatalog;
