//! Build metadata logged when the configurator starts and stops.
//!
//! The git hash and build date are injected by the release build through
//! `NATS_CONFIGURATOR_GIT_HASH` and `NATS_CONFIGURATOR_BUILD_DATE`.

use std::fmt;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub const GIT_HASH: &str = match option_env!("NATS_CONFIGURATOR_GIT_HASH") {
    Some(hash) => hash,
    None => "unknown",
};

pub const BUILD_DATE: &str = match option_env!("NATS_CONFIGURATOR_BUILD_DATE") {
    Some(date) => date,
    None => "unknown",
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BuildInfo {
    pub version: &'static str,
    pub git_hash: &'static str,
    pub build_date: &'static str,
}

pub const BUILD_INFO: BuildInfo = BuildInfo {
    version: VERSION,
    git_hash: GIT_HASH,
    build_date: BUILD_DATE,
};

impl fmt::Display for BuildInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "version: {}, build date: {}, hash: {}",
            self.version, self.build_date, self.git_hash
        )
    }
}
