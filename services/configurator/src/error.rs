//! Error types for the configurator.

use std::path::PathBuf;

use thiserror::Error;

/// Configurator errors, split into recoverable (skip the cycle) and fatal
/// (stop the process) tiers by [`ConfiguratorError::is_recoverable`].
#[derive(Debug, Error)]
pub enum ConfiguratorError {
    /// Template unreadable or not a JSON object.
    #[error("config_load_failed: {path}: {detail}")]
    ConfigLoad { path: PathBuf, detail: String },

    /// Document has no `cluster` object to hold routes.
    #[error("config_shape_invalid: {0}")]
    ConfigShape(String),

    /// Could not serialize or write the output configuration.
    #[error("config_write_failed: {path}: {detail}")]
    ConfigWrite { path: PathBuf, detail: String },

    /// Broker pid file missing or malformed.
    #[error("pid_read_failed: {path}: {detail}")]
    PidRead { path: PathBuf, detail: String },

    /// Listing peers failed.
    #[error("discovery_failed: {0}")]
    Discovery(String),

    /// Could not establish a session with the discovery backend.
    #[error("discovery_setup_failed: {0}")]
    DiscoverySetup(String),

    /// Reload signal could not be delivered.
    #[error("signal_failed: pid {pid}: {detail}")]
    Signal { pid: i32, detail: String },
}

impl ConfiguratorError {
    /// Get the standardized reason code for this error.
    pub fn reason_code(&self) -> &'static str {
        match self {
            ConfiguratorError::ConfigLoad { .. } => "config_load_failed",
            ConfiguratorError::ConfigShape(_) => "config_shape_invalid",
            ConfiguratorError::ConfigWrite { .. } => "config_write_failed",
            ConfiguratorError::PidRead { .. } => "pid_read_failed",
            ConfiguratorError::Discovery(_) => "discovery_failed",
            ConfiguratorError::DiscoverySetup(_) => "discovery_setup_failed",
            ConfiguratorError::Signal { .. } => "signal_failed",
        }
    }

    /// Whether the loop may skip this cycle and try again on the next tick.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            ConfiguratorError::PidRead { .. } | ConfiguratorError::Discovery(_)
        )
    }
}

pub type Result<T, E = ConfiguratorError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recoverable_tier() {
        let pid = ConfiguratorError::PidRead {
            path: PathBuf::from("/var/run/nats.pid"),
            detail: "missing".to_string(),
        };
        let discovery = ConfiguratorError::Discovery("timeout".to_string());

        assert!(pid.is_recoverable());
        assert!(discovery.is_recoverable());
    }

    #[test]
    fn test_fatal_tier() {
        let fatal = [
            ConfiguratorError::ConfigShape("no cluster".to_string()),
            ConfiguratorError::ConfigWrite {
                path: PathBuf::from("/etc/nats/nats.json"),
                detail: "read-only".to_string(),
            },
            ConfiguratorError::Signal {
                pid: 42,
                detail: "ESRCH".to_string(),
            },
            ConfiguratorError::DiscoverySetup("no service account".to_string()),
        ];

        for err in fatal {
            assert!(!err.is_recoverable(), "{} should be fatal", err.reason_code());
        }
    }

    #[test]
    fn test_display_carries_reason_code() {
        let err = ConfiguratorError::Signal {
            pid: 7,
            detail: "ESRCH".to_string(),
        };
        assert_eq!(err.to_string(), "signal_failed: pid 7: ESRCH");
        assert_eq!(err.reason_code(), "signal_failed");
    }
}
