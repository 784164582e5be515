//! Broker configuration document.
//!
//! Only two fields are typed: `server_name` and `cluster.routes`. Every other
//! key, at the top level and inside `cluster`, is carried through as raw JSON
//! so the rewritten file matches the template apart from formatting.
//!
//! Writes are atomic (write to temp, rename) so the broker never reloads a
//! half-written file.

use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};

use nats_configurator_reconcile::RouteSet;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use crate::error::{ConfiguratorError, Result};

/// The `cluster` block when it has the expected shape.
///
/// `routes` distinguishes an absent key (`None`) from an explicit `null`
/// (`Some(None)`) so both are written back as the template had them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterBlock {
    #[serde(
        default,
        deserialize_with = "present",
        skip_serializing_if = "Option::is_none"
    )]
    pub routes: Option<Option<RouteSet>>,

    #[serde(flatten)]
    pub rest: Map<String, Value>,
}

/// Whatever the template put under `cluster`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ClusterSection {
    Block(ClusterBlock),
    /// Present but not an object with a string-array `routes`.
    Opaque(Value),
}

/// In-memory broker configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigDocument {
    // Any JSON value is accepted here; it is overwritten at startup.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    server_name: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    cluster: Option<ClusterSection>,

    #[serde(flatten)]
    rest: Map<String, Value>,
}

impl ConfigDocument {
    /// Read and parse a template file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| ConfiguratorError::ConfigLoad {
            path: path.to_path_buf(),
            detail: format!("read: {e}"),
        })?;

        Self::from_json(&content).map_err(|e| match e {
            ConfiguratorError::ConfigLoad { detail, .. } => ConfiguratorError::ConfigLoad {
                path: path.to_path_buf(),
                detail,
            },
            other => other,
        })
    }

    /// Parse a document from JSON text.
    pub fn from_json(content: &str) -> Result<Self> {
        serde_json::from_str(content).map_err(|e| ConfiguratorError::ConfigLoad {
            path: PathBuf::new(),
            detail: format!("parse: {e}"),
        })
    }

    /// `server_name`, when it is a string.
    pub fn identity(&self) -> Option<&str> {
        self.server_name.as_ref().and_then(Value::as_str)
    }

    /// Set the broker's `server_name`.
    pub fn set_identity(&mut self, name: impl Into<String>) {
        self.server_name = Some(Value::String(name.into()));
    }

    /// Current `cluster.routes`, if the block is well-formed and has any.
    pub fn routes(&self) -> Option<&[String]> {
        match &self.cluster {
            Some(ClusterSection::Block(block)) => block
                .routes
                .as_ref()
                .and_then(Option::as_ref)
                .map(RouteSet::as_slice),
            _ => None,
        }
    }

    /// Untyped fields carried through from the template.
    pub fn passthrough(&self) -> &Map<String, Value> {
        &self.rest
    }

    /// Replace `cluster.routes`.
    ///
    /// Fails when the template has no `cluster` object; routes cannot be
    /// injected into such a document.
    pub fn set_routes(&mut self, routes: &RouteSet) -> Result<()> {
        match &mut self.cluster {
            Some(ClusterSection::Block(block)) => {
                block.routes = Some(Some(routes.clone()));
                Ok(())
            }
            Some(ClusterSection::Opaque(value)) => Err(ConfiguratorError::ConfigShape(format!(
                "`cluster` must be an object with a string array `routes`, found {}",
                json_kind(value)
            ))),
            None => Err(ConfiguratorError::ConfigShape(
                "`cluster` is missing from the configuration".to_string(),
            )),
        }
    }

    /// Serialize the whole document.
    pub fn to_json(&self) -> Result<Vec<u8>, serde_json::Error> {
        let mut out = Vec::new();
        let formatter = serde_json::ser::PrettyFormatter::with_indent(b" ");
        let mut ser = serde_json::Serializer::with_formatter(&mut out, formatter);
        self.serialize(&mut ser)?;
        Ok(out)
    }

    /// Write the whole document to `path`, replacing prior content.
    ///
    /// Uses write-to-temp + rename pattern for atomicity.
    pub fn persist(&self, path: &Path) -> Result<()> {
        let write_err = |detail: String| ConfiguratorError::ConfigWrite {
            path: path.to_path_buf(),
            detail,
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .map_err(|e| write_err(format!("create {}: {e}", parent.display())))?;
        }

        let content = self.to_json().map_err(|e| write_err(format!("encode: {e}")))?;

        let tmp_path = temp_path(path);
        fs::write(&tmp_path, &content)
            .map_err(|e| write_err(format!("write {}: {e}", tmp_path.display())))?;

        fs::rename(&tmp_path, path).map_err(|e| {
            let _ = fs::remove_file(&tmp_path);
            write_err(format!("rename {}: {e}", tmp_path.display()))
        })?;

        debug!(
            path = %path.display(),
            bytes = content.len(),
            route_count = self.routes().map_or(0, <[String]>::len),
            "configuration written"
        );

        Ok(())
    }
}

/// `<path>.tmp`, next to the target so the rename stays on one filesystem.
fn temp_path(path: &Path) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(".tmp");
    PathBuf::from(name)
}

/// Deserialize a key that is present, keeping an explicit `null` as `Some(None)`.
fn present<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object with a malformed `routes`",
    }
}
