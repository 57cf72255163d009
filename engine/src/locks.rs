use diskforge_core::ForgeError;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};

/// Per-device-index serialization for destructive work. Acquisition is
/// try-only: a second operation on a held index fails fast with
/// [`ForgeError::DeviceBusy`] instead of queueing.
#[derive(Debug, Default)]
pub struct DeviceLocks {
    held: Mutex<HashSet<u32>>,
}

impl DeviceLocks {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Acquires all of `disks` atomically, or none of them.
    pub fn try_acquire(self: &Arc<Self>, disks: &[u32]) -> Result<DeviceLockGuard, ForgeError> {
        let mut held = self.held.lock().unwrap();
        if let Some(&busy) = disks.iter().find(|d| held.contains(d)) {
            return Err(ForgeError::DeviceBusy(busy));
        }
        for disk in disks {
            held.insert(*disk);
        }
        Ok(DeviceLockGuard {
            locks: Arc::clone(self),
            disks: disks.to_vec(),
        })
    }
}

/// Releases its device indices on drop.
#[derive(Debug)]
pub struct DeviceLockGuard {
    locks: Arc<DeviceLocks>,
    disks: Vec<u32>,
}

impl Drop for DeviceLockGuard {
    fn drop(&mut self) {
        let mut held = self.locks.held.lock().unwrap();
        for disk in &self.disks {
            held.remove(disk);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_acquire_on_same_disk_is_busy() {
        let locks = DeviceLocks::new();
        let _guard = locks.try_acquire(&[1]).expect("first acquire");
        let err = locks.try_acquire(&[1]).expect_err("second acquire");
        assert!(matches!(err, ForgeError::DeviceBusy(1)));
    }

    #[test]
    fn release_on_drop_allows_reacquire() {
        let locks = DeviceLocks::new();
        drop(locks.try_acquire(&[2]).expect("first acquire"));
        assert!(locks.try_acquire(&[2]).is_ok());
    }

    #[test]
    fn multi_disk_acquire_is_all_or_nothing() {
        let locks = DeviceLocks::new();
        let _guard = locks.try_acquire(&[3]).expect("hold 3");
        assert!(locks.try_acquire(&[2, 3]).is_err());
        // 2 must not have been left behind by the failed acquire.
        assert!(locks.try_acquire(&[2]).is_ok());
    }
}
