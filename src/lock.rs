//! Single-instance guard: a non-blocking exclusive `flock(2)` on a fixed path.
//!
//! The lock lives as long as the returned [`InstanceLock`]; the kernel drops
//! it when the process exits, however that happens.

use std::fs::{self, File, OpenOptions};
use std::path::Path;

use nix::errno::Errno;
use nix::fcntl::{Flock, FlockArg};

use crate::error::{MonitorError, Result};

/// Held advisory lock.  Released on drop.
pub struct InstanceLock {
    _flock: Flock<File>,
}

impl InstanceLock {
    /// Try to take the lock at `path`.
    ///
    /// Returns `Ok(None)` if another process already holds it.  The file is
    /// created if missing and its content is never touched.
    pub fn try_acquire(path: &Path) -> Result<Option<Self>> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;

        match Flock::lock(file, FlockArg::LockExclusiveNonblock) {
            Ok(flock) => Ok(Some(Self { _flock: flock })),
            Err((_, errno)) if errno == Errno::EWOULDBLOCK => Ok(None),
            Err((_, errno)) => Err(MonitorError::Lock(format!(
                "flock {}: {errno}",
                path.display()
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_holder_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ogm_monitor.lock");

        let first = InstanceLock::try_acquire(&path).unwrap();
        assert!(first.is_some());
        assert!(InstanceLock::try_acquire(&path).unwrap().is_none());

        drop(first);
        assert!(InstanceLock::try_acquire(&path).unwrap().is_some());
    }

    #[test]
    fn contention_does_not_touch_lock_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run").join("ogm_monitor.lock");

        let _held = InstanceLock::try_acquire(&path).unwrap().unwrap();
        fs::write(&path, b"owner").unwrap();
        assert!(InstanceLock::try_acquire(&path).unwrap().is_none());
        assert_eq!(fs::read(&path).unwrap(), b"owner");
    }

    #[test]
    fn refused_instance_leaves_directory_alone() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ogm_monitor.lock");

        let _held = InstanceLock::try_acquire(&path).unwrap().unwrap();
        assert!(InstanceLock::try_acquire(&path).unwrap().is_none());

        let entries: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(entries, ["ogm_monitor.lock"]);
        assert!(!dir.path().join("node_status.json").exists());
    }
}
