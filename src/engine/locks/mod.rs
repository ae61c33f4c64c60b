//! Operation Lock System
//!
//! Keeps a flash in progress from racing a config save in the same
//! working directory, across processes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Lock types for different operations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LockType {
    Flash,
    ConfigSave,
}

impl LockType {
    pub const ALL: [LockType; 2] = [LockType::Flash, LockType::ConfigSave];

    pub fn filename(&self) -> &'static str {
        match self {
            LockType::Flash => "flash.lock",
            LockType::ConfigSave => "config_save.lock",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            LockType::Flash => "Firmware update in progress",
            LockType::ConfigSave => "Configuration is being saved",
        }
    }

    /// Lock types that must not be held while this one is taken
    fn blocked_by(&self) -> &'static [LockType] {
        match self {
            LockType::Flash => &[LockType::ConfigSave],
            LockType::ConfigSave => &[LockType::Flash],
        }
    }
}

/// Information stored in a lock file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockInfo {
    pub lock_type: LockType,
    pub pid: u32,
    pub started_at: DateTime<Utc>,
    pub description: String,
}

impl LockInfo {
    pub fn new(lock_type: LockType) -> Self {
        Self {
            lock_type,
            pid: std::process::id(),
            started_at: Utc::now(),
            description: lock_type.description().to_string(),
        }
    }

    pub fn with_description(mut self, desc: &str) -> Self {
        self.description = desc.to_string();
        self
    }

    /// Check if the process that created the lock is still running
    pub fn is_process_alive(&self) -> bool {
        if self.pid == std::process::id() {
            return true;
        }

        #[cfg(unix)]
        {
            use std::process::Command;
            Command::new("kill")
                .args(["-0", &self.pid.to_string()])
                .output()
                .map(|o| o.status.success())
                .unwrap_or(false)
        }

        #[cfg(windows)]
        {
            use std::process::Command;
            Command::new("tasklist")
                .args(["/FI", &format!("PID eq {}", self.pid)])
                .output()
                .map(|o| String::from_utf8_lossy(&o.stdout).contains(&self.pid.to_string()))
                .unwrap_or(false)
        }

        #[cfg(not(any(unix, windows)))]
        true
    }
}

#[derive(Error, Debug, Clone)]
pub enum LockError {
    #[error("{lock_type:?} lock held by PID {pid}: {description}")]
    AlreadyLocked {
        lock_type: LockType,
        pid: u32,
        description: String,
    },
    #[error("Cannot acquire {requested:?} lock: blocked by {blocking:?} ({description})")]
    BlockedBy {
        requested: LockType,
        blocking: LockType,
        description: String,
    },
    #[error("IO error: {0}")]
    IoError(String),
    #[error("Serialize error: {0}")]
    SerializeError(String),
}

/// Operation lock manager for one working directory
pub struct OperationLock {
    locks_dir: PathBuf,
}

impl OperationLock {
    pub fn new(dir: &Path) -> Self {
        Self {
            locks_dir: dir.join(".otaflow").join("locks"),
        }
    }

    fn lock_path(&self, lock_type: LockType) -> PathBuf {
        self.locks_dir.join(lock_type.filename())
    }

    pub fn acquire(&self, lock_type: LockType) -> Result<LockGuard, LockError> {
        self.acquire_with(LockInfo::new(lock_type))
    }

    /// Acquire a lock recording the given info
    pub fn acquire_with(&self, info: LockInfo) -> Result<LockGuard, LockError> {
        let lock_type = info.lock_type;
        if let Some((blocking, held)) = self.first_held(lock_type.blocked_by()) {
            return Err(LockError::BlockedBy {
                requested: lock_type,
                blocking,
                description: held.description,
            });
        }

        fs::create_dir_all(&self.locks_dir).map_err(|e| LockError::IoError(e.to_string()))?;

        let lock_path = self.lock_path(lock_type);
        if let Some(existing) = self.read_lock(&lock_path) {
            if existing.is_process_alive() {
                return Err(LockError::AlreadyLocked {
                    lock_type,
                    pid: existing.pid,
                    description: existing.description,
                });
            }
            // Stale lock, remove it
            let _ = fs::remove_file(&lock_path);
        }

        let content = serde_json::to_string_pretty(&info)
            .map_err(|e| LockError::SerializeError(e.to_string()))?;
        fs::write(&lock_path, content).map_err(|e| LockError::IoError(e.to_string()))?;

        Ok(LockGuard {
            lock_path,
            lock_type,
        })
    }

    fn read_lock(&self, path: &Path) -> Option<LockInfo> {
        fs::read_to_string(path)
            .ok()
            .and_then(|s| serde_json::from_str(&s).ok())
    }

    fn first_held(&self, types: &[LockType]) -> Option<(LockType, LockInfo)> {
        types.iter().find_map(|&lock_type| {
            self.read_lock(&self.lock_path(lock_type))
                .filter(LockInfo::is_process_alive)
                .map(|info| (lock_type, info))
        })
    }

    /// Locks held by live processes
    pub fn get_active_locks(&self) -> Vec<LockInfo> {
        LockType::ALL
            .iter()
            .filter_map(|&t| self.first_held(&[t]).map(|(_, info)| info))
            .collect()
    }

    /// Description of the flash holding this directory, if any
    pub fn flash_in_progress(&self) -> Option<String> {
        self.first_held(&[LockType::Flash])
            .map(|(_, info)| info.description)
    }
}

/// RAII guard that releases lock on drop
pub struct LockGuard {
    lock_path: PathBuf,
    lock_type: LockType,
}

impl LockGuard {
    pub fn lock_type(&self) -> LockType {
        self.lock_type
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.lock_path);
    }
}
