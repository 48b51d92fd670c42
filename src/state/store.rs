use super::MonitoringState;
use crate::error::{AlarmError, Result};
use log::{debug, error, warn};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

/// JSON file holding the monitoring record.
///
/// Saves go to a sibling temp file that is renamed over the target, so a
/// reader never observes a half-written record.
#[derive(Debug, Clone)]
pub struct StateStore {
    path: PathBuf,
}

impl StateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Load the record. Missing or unreadable files yield the zero value.
    pub fn load(&self) -> MonitoringState {
        match fs::read(&self.path) {
            Ok(bytes) => match serde_json::from_slice::<MonitoringState>(&bytes) {
                Ok(state) => state,
                Err(e) => {
                    warn!("[Store] Failed to parse {:?}: {}", self.path, e);
                    MonitoringState::default()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("[Store] No state file at {:?}", self.path);
                MonitoringState::default()
            }
            Err(e) => {
                error!("[Store] Failed to read {:?}: {}", self.path, e);
                MonitoringState::default()
            }
        }
    }

    pub fn save(&self, state: &MonitoringState) -> Result<()> {
        let data = serde_json::to_vec_pretty(state)?;
        self.write_atomic(&data)
            .map_err(|source| AlarmError::StateWriteFailed {
                path: self.path.display().to_string(),
                source,
            })?;
        debug!("[Store] Saved state to {:?}", self.path);
        Ok(())
    }

    fn write_atomic(&self, data: &[u8]) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)?;
        }

        let mut tmp_name = self.path.file_name().unwrap_or_default().to_os_string();
        tmp_name.push(".tmp");
        let tmp_path = self.path.with_file_name(tmp_name);

        let mut file = fs::File::create(&tmp_path)?;
        file.write_all(data)?;
        file.sync_all()?;
        drop(file);

        if let Err(e) = fs::rename(&tmp_path, &self.path) {
            let _ = fs::remove_file(&tmp_path);
            return Err(e);
        }
        Ok(())
    }
}
