//! Configurator configuration.
//!
//! Every setting is a command-line flag with an environment fallback, so the
//! sidecar can be wired from a pod spec through either `args` or `env`
//! (the downward API exposes `POD_IP`, `POD_NAME` and `POD_NAMESPACE`).

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use nats_configurator_reconcile::{DiffPolicy, DEFAULT_CLUSTER_PORT};

/// Shortest accepted poll interval.
pub const MIN_REFRESH_INTERVAL: Duration = Duration::from_millis(50);

/// Longest accepted poll interval.
pub const MAX_REFRESH_INTERVAL: Duration = Duration::from_secs(24 * 3600);

/// Keeps NATS cluster routes in sync with the pods of a Kubernetes workload.
#[derive(Debug, Clone, Parser)]
#[command(name = "nats-configurator")]
#[command(version, about, long_about = None)]
pub struct Config {
    /// This pod's IP address; excluded from the route list.
    #[arg(long, env = "POD_IP")]
    pub pod_ip: String,

    /// This pod's name; written as the broker's `server_name`.
    #[arg(long, env = "POD_NAME")]
    pub pod_name: String,

    /// Namespace to list peer pods in.
    #[arg(long, env = "POD_NAMESPACE", default_value = "default")]
    pub namespace: String,

    /// Label selector matching every pod that belongs to the mesh.
    #[arg(long, env = "POD_LABEL", default_value = "")]
    pub pod_label: String,

    /// Port used for cluster traffic between brokers.
    #[arg(long, env = "NATS_ROUTES_PORT", default_value_t = DEFAULT_CLUSTER_PORT)]
    pub nats_routes_port: u16,

    /// Broker configuration template (JSON).
    #[arg(long, env = "NATS_CONFIG_TEMPLATE")]
    pub nats_config_template: PathBuf,

    /// Broker configuration file to write.
    #[arg(long, env = "NATS_CONFIG")]
    pub nats_config: PathBuf,

    /// Pid file written by the broker; the reload signal goes to this pid.
    #[arg(long, env = "NATS_PID_FILE")]
    pub nats_pid_file: PathBuf,

    /// Pod list refresh interval (e.g. 500ms, 3s, 1m).
    #[arg(long, env = "REFRESH_INTERVAL", default_value = "3s", value_parser = parse_duration)]
    pub refresh_interval: Duration,

    /// How route lists are compared: `exact` (order matters) or `unordered`.
    #[arg(long, env = "ROUTE_DIFF", default_value = "exact")]
    pub route_diff: DiffPolicy,

    /// Log level when RUST_LOG is unset (trace, debug, info, warn, error).
    #[arg(long, env = "CONFIGURATOR_LOG_LEVEL", default_value = "info")]
    pub log_level: String,
}

/// Parse a duration such as `3s`, `250ms`, `1m30s` or `1h`.
///
/// Bare integers are read as seconds. Results are clamped to
/// [`MIN_REFRESH_INTERVAL`]..=[`MAX_REFRESH_INTERVAL`]; values that overflow
/// while summing are rejected.
pub fn parse_duration(raw: &str) -> Result<Duration, String> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err("duration is empty".to_string());
    }

    if let Ok(secs) = raw.parse::<u64>() {
        return Ok(clamp_interval(Duration::from_secs(secs)));
    }

    let mut total = Duration::ZERO;
    let mut rest = raw;
    while !rest.is_empty() {
        let digits = rest
            .find(|c: char| !c.is_ascii_digit())
            .ok_or_else(|| format!("missing unit in duration '{raw}'"))?;
        if digits == 0 {
            return Err(format!("invalid duration '{raw}'"));
        }
        let value: u64 = rest[..digits]
            .parse()
            .map_err(|e| format!("invalid duration '{raw}': {e}"))?;
        rest = &rest[digits..];

        let unit_len = rest
            .find(|c: char| c.is_ascii_digit())
            .unwrap_or(rest.len());
        let secs = |factor: u64| {
            value
                .checked_mul(factor)
                .map(Duration::from_secs)
                .ok_or_else(|| format!("duration '{raw}' is too large"))
        };
        let part = match &rest[..unit_len] {
            "ms" => Duration::from_millis(value),
            "s" => Duration::from_secs(value),
            "m" => secs(60)?,
            "h" => secs(3600)?,
            unit => return Err(format!("unknown unit '{unit}' in duration '{raw}'")),
        };
        total = total
            .checked_add(part)
            .ok_or_else(|| format!("duration '{raw}' is too large"))?;
        rest = &rest[unit_len..];
    }

    Ok(clamp_interval(total))
}

fn clamp_interval(interval: Duration) -> Duration {
    interval.clamp(MIN_REFRESH_INTERVAL, MAX_REFRESH_INTERVAL)
}
