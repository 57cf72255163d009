use diskforge_core::{ForgeError, PrivilegeOutcome, SafetyGuard};

/// Host-backed [`SafetyGuard`]: resolves the system volume letter from the
/// environment, the system disk from the OS device table, and privileges
/// from the process token (with a one-shot elevated relaunch on Windows).
pub struct HostSafetyGuard {
    system_letter: Option<char>,
}

impl Default for HostSafetyGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl HostSafetyGuard {
    pub fn new() -> Self {
        // "C:" on stock installs, but the environment is authoritative.
        let system_letter = std::env::var("SystemDrive")
            .ok()
            .as_deref()
            .and_then(crate::parse::drive_letter);
        HostSafetyGuard { system_letter }
    }

    #[cfg(test)]
    fn with_letter(letter: char) -> Self {
        HostSafetyGuard {
            system_letter: Some(letter),
        }
    }
}

#[async_trait::async_trait]
impl SafetyGuard for HostSafetyGuard {
    fn is_system_volume(&self, letter: char) -> bool {
        self.system_letter
            .is_some_and(|sys| sys.eq_ignore_ascii_case(&letter))
    }

    #[cfg(target_os = "windows")]
    async fn is_system_disk(&self, index: u32) -> Result<bool, ForgeError> {
        crate::windows::catalog::system_flags(index).await
    }

    #[cfg(target_os = "linux")]
    async fn is_system_disk(&self, index: u32) -> Result<bool, ForgeError> {
        crate::linux::catalog::is_root_disk(index)
    }

    #[cfg(not(any(target_os = "windows", target_os = "linux")))]
    async fn is_system_disk(&self, _index: u32) -> Result<bool, ForgeError> {
        Err(ForgeError::Unsupported(
            "system-disk resolution on this platform".to_string(),
        ))
    }

    async fn ensure_privilege(&self, operation: &str) -> Result<PrivilegeOutcome, ForgeError> {
        #[cfg(target_os = "windows")]
        {
            if crate::windows::elevation::is_elevated() {
                return Ok(PrivilegeOutcome::Granted);
            }
            log::info!("'{}' needs elevation, requesting relaunch", operation);
            // One attempt only; the caller abandons this operation either way.
            return match crate::windows::elevation::relaunch_elevated()? {
                true => Ok(PrivilegeOutcome::Relaunched),
                false => Ok(PrivilegeOutcome::Denied),
            };
        }
        #[cfg(target_os = "linux")]
        {
            if crate::linux::elevation::is_elevated() {
                return Ok(PrivilegeOutcome::Granted);
            }
            log::warn!("'{}' needs root; rerun under sudo", operation);
            return Ok(PrivilegeOutcome::Denied);
        }
        #[cfg(not(any(target_os = "windows", target_os = "linux")))]
        {
            let _ = operation;
            Ok(PrivilegeOutcome::Denied)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_volume_check_ignores_case() {
        let guard = HostSafetyGuard::with_letter('C');
        assert!(guard.is_system_volume('c'));
        assert!(guard.is_system_volume('C'));
        assert!(!guard.is_system_volume('E'));
    }
}
