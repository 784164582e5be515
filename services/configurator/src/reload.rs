//! Broker reload.
//!
//! The broker writes its pid to a file and re-reads its configuration on
//! SIGHUP. A reload is always: write the config, then signal. The signal is
//! never sent if the write failed.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use tracing::info;

use crate::document::ConfigDocument;
use crate::error::{ConfiguratorError, Result};

/// Read the broker's pid from `path`.
pub fn read_broker_pid(path: &Path) -> Result<i32> {
    let pid_err = |detail: String| ConfiguratorError::PidRead {
        path: path.to_path_buf(),
        detail,
    };

    let raw = fs::read_to_string(path).map_err(|e| pid_err(format!("read: {e}")))?;
    let trimmed = raw.trim();

    let pid: i32 = trimmed
        .parse()
        .map_err(|e| pid_err(format!("parse {trimmed:?}: {e}")))?;

    // 0 and negative values address process groups.
    if pid <= 0 {
        return Err(pid_err(format!("not a process id: {pid}")));
    }

    Ok(pid)
}

/// Delivers the reload request to the broker.
pub trait ReloadSignaler: Send + Sync {
    fn reload(&self, pid: i32) -> Result<()>;
}

/// Sends SIGHUP.
#[derive(Debug, Default, Clone, Copy)]
pub struct SighupSignaler;

impl ReloadSignaler for SighupSignaler {
    fn reload(&self, pid: i32) -> Result<()> {
        kill(Pid::from_raw(pid), Signal::SIGHUP).map_err(|e| ConfiguratorError::Signal {
            pid,
            detail: e.to_string(),
        })
    }
}

/// Writes the broker configuration and asks the broker to reload it.
pub struct ReloadCoordinator {
    config_path: PathBuf,
    pid_file: PathBuf,
    signaler: Arc<dyn ReloadSignaler>,
}

impl ReloadCoordinator {
    pub fn new(config_path: PathBuf, pid_file: PathBuf, signaler: Arc<dyn ReloadSignaler>) -> Self {
        Self {
            config_path,
            pid_file,
            signaler,
        }
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    pub fn read_broker_pid(&self) -> Result<i32> {
        read_broker_pid(&self.pid_file)
    }

    /// Persist `doc`, then signal `pid`.
    pub fn apply_and_reload(&self, doc: &ConfigDocument, pid: i32) -> Result<()> {
        doc.persist(&self.config_path)?;
        self.signaler.reload(pid)?;

        info!(
            pid,
            path = %self.config_path.display(),
            "broker reload requested"
        );
        Ok(())
    }
}
