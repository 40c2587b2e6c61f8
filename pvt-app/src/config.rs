use anyhow::{Context, Result};
use pvt_engine::EngineConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Startup configuration: engine timing constants plus the two external
/// boundaries. Loaded from a JSON file when one is given, otherwise all
/// defaults.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub engine: EngineConfig,
    /// Backend base URL. `null` runs the session offline: no registration,
    /// nothing mirrored, the summary stays local.
    #[serde(default = "AppConfig::default_api_url")]
    pub api_url: Option<String>,
    /// Serial path of the trigger device. Absent is a legal configuration:
    /// all triggers become no-ops.
    #[serde(default)]
    pub trigger_port: Option<String>,
    /// Run the channel self-test before the session starts.
    #[serde(default)]
    pub trigger_self_test: bool,
}

impl AppConfig {
    fn default_api_url() -> Option<String> {
        Some("http://127.0.0.1:3000/api".to_string())
    }

    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => {
                let raw = std::fs::read_to_string(path)
                    .with_context(|| format!("reading config {}", path.display()))?;
                serde_json::from_str(&raw)
                    .with_context(|| format!("parsing config {}", path.display()))
            }
            None => Ok(Self {
                api_url: Self::default_api_url(),
                ..Self::default()
            }),
        }
    }
}
