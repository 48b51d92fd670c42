//! Single-owner lock for the monitoring record.
//!
//! Two daemons sharing one state file would race each other's writes, so the
//! process holds a Unix socket next to that file (`state.json.lock`) for its
//! lifetime. Daemons with different state files never contend. The OS
//! releases the socket when the process dies; a leftover socket file nobody
//! listens on is stale and gets replaced.

use crate::error::{AlarmError, Result};
use log::debug;
use std::io;
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::{Path, PathBuf};

/// Held for as long as the process owns the deployment.
pub struct InstanceLock {
    _listener: UnixListener,
    path: PathBuf,
}

impl InstanceLock {
    /// Acquire the lock guarding `state_file`.
    pub fn acquire_for(state_file: impl AsRef<Path>) -> Result<Self> {
        let path = lock_path_for(state_file.as_ref());
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        Self::acquire_at(path)
    }

    pub fn acquire_at(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        if path.exists() {
            if UnixStream::connect(&path).is_ok() {
                return Err(AlarmError::AlreadyRunning);
            }
            debug!("Removing stale instance socket {:?}", path);
            let _ = std::fs::remove_file(&path);
        }

        match UnixListener::bind(&path) {
            Ok(listener) => Ok(Self {
                _listener: listener,
                path,
            }),
            Err(e) if e.kind() == io::ErrorKind::AddrInUse => Err(AlarmError::AlreadyRunning),
            Err(e) => Err(e.into()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

}

/// `<state file>.lock`, beside the record it guards.
pub fn lock_path_for(state_file: &Path) -> PathBuf {
    let mut name = state_file.as_os_str().to_owned();
    name.push(".lock");
    PathBuf::from(name)
}

impl Drop for InstanceLock {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lock_path_follows_state_file() {
        assert_eq!(
            lock_path_for(Path::new("/var/lib/door-alarm/state.json")),
            PathBuf::from("/var/lib/door-alarm/state.json.lock")
        );
        assert_ne!(
            lock_path_for(Path::new("/srv/front/state.json")),
            lock_path_for(Path::new("/srv/back/state.json"))
        );
    }

    #[test]
    fn test_separate_state_files_run_side_by_side() {
        let dir = tempfile::tempdir().unwrap();
        let front = dir.path().join("front").join("state.json");
        let back = dir.path().join("back").join("state.json");

        let _front = InstanceLock::acquire_for(&front).unwrap();
        let _back = InstanceLock::acquire_for(&back).unwrap();
        assert!(matches!(
            InstanceLock::acquire_for(&front),
            Err(AlarmError::AlreadyRunning)
        ));
    }

    #[test]
    fn test_second_acquire_fails_while_held() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lock.sock");

        let lock = InstanceLock::acquire_at(&path).unwrap();
        assert!(matches!(
            InstanceLock::acquire_at(&path),
            Err(AlarmError::AlreadyRunning)
        ));

        drop(lock);
        assert!(!path.exists());
        assert!(InstanceLock::acquire_at(&path).is_ok());
    }

    #[test]
    fn test_stale_socket_is_replaced() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lock.sock");
        std::fs::write(&path, b"").unwrap();

        let lock = InstanceLock::acquire_at(&path).unwrap();
        assert_eq!(lock.path(), path.as_path());
    }
}
