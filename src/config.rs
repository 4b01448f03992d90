//! Runtime configuration loaded from JSON, every field optional.

use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::decompiler::DecompileOptions;

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub liveness: LivenessConfig,
    pub decompile: DecompileOptions,
}

impl Config {
    pub fn from_path(path: &Path) -> Result<Config> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        serde_json::from_str(&text)
            .with_context(|| format!("failed to parse config {}", path.display()))
    }

    /// Load `path` when given, else the defaults.
    pub fn load(path: Option<&Path>) -> Result<Config> {
        match path {
            Some(path) => Config::from_path(path),
            None => Ok(Config::default()),
        }
    }
}

/// Policy for endpoint liveness probing and tracing.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct LivenessConfig {
    pub online_ttl_ms: u64,
    pub offline_ttl_ms: u64,
    pub ping_timeout_ms: u64,
    pub relay_ping_timeout_ms: u64,
    /// Well-known relays that get the longer ping timeout.
    pub relays: Vec<String>,
    pub trace_timeout_ms: u64,
    /// Node that is always treated as online.
    pub main_node: Option<String>,
    /// Interface descriptor recorded in trace hops.
    pub interface: String,
}

impl Default for LivenessConfig {
    fn default() -> Self {
        Self {
            online_ttl_ms: 15_000,
            offline_ttl_ms: 3_000,
            ping_timeout_ms: 2_000,
            relay_ping_timeout_ms: 5_000,
            relays: vec!["@+unyt1".into(), "@+unyt2".into(), "@+unyt3".into()],
            trace_timeout_ms: 60_000,
            main_node: None,
            interface: "local".into(),
        }
    }
}

impl LivenessConfig {
    pub fn ttl(&self, online: bool) -> Duration {
        Duration::from_millis(if online {
            self.online_ttl_ms
        } else {
            self.offline_ttl_ms
        })
    }

    pub fn trace_timeout(&self) -> Duration {
        Duration::from_millis(self.trace_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn partial_file_keeps_defaults() -> Result<()> {
        let mut file = tempfile::NamedTempFile::new()?;
        write!(
            file,
            r#"{{"liveness": {{"offline_ttl_ms": 500, "main_node": "@+home"}}, "decompile": {{"formatted": true}}}}"#
        )?;
        let config = Config::from_path(file.path())?;
        assert_eq!(config.liveness.offline_ttl_ms, 500);
        assert_eq!(config.liveness.online_ttl_ms, 15_000);
        assert_eq!(config.liveness.main_node.as_deref(), Some("@+home"));
        assert_eq!(config.liveness.relays.len(), 3);
        assert!(config.decompile.formatted);
        assert!(config.decompile.has_header);
        Ok(())
    }

    #[test]
    fn missing_file_is_an_error() {
        let err = Config::from_path(Path::new("/nonexistent/datex.json")).unwrap_err();
        assert!(err.to_string().contains("failed to read config"));
    }

    #[test]
    fn ttl_depends_on_outcome() {
        let config = LivenessConfig::default();
        assert_eq!(config.ttl(true), Duration::from_secs(15));
        assert_eq!(config.ttl(false), Duration::from_secs(3));
    }
}
