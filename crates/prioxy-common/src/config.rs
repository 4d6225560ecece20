use std::collections::HashSet;
use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::error::{ProxyError, Result};

pub const DEFAULT_OPENAI_API_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_INFLUX_ORG: &str = "openaiorg";
pub const DEFAULT_INFLUX_BUCKET: &str = "proxybucket";

/// Global proxy configuration, loaded from a JSON file.
///
/// Unknown fields are ignored; optional fields left out (or set to the
/// empty string) fall back to their defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub influxdb_url: String,
    #[serde(default)]
    pub influx_token: String,
    #[serde(default)]
    pub influx_org: String,
    #[serde(default)]
    pub influx_bucket: String,
    #[serde(default)]
    pub openai_api_url: String,
    #[serde(default)]
    pub openai_api_key: String,
    #[serde(default)]
    pub endpoints: Vec<Endpoint>,
}

/// One listening port bound to a priority class.
///
/// Lower `priority` means higher priority; 1 is the top class. A preemptive
/// endpoint is allowed to interrupt in-flight requests of lower classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
    pub port: u16,
    pub priority: u32,
    pub preemptive: bool,
}

impl Config {
    pub fn load_from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        Self::from_json(&content)
            .with_context(|| format!("parsing config file {}", path.display()))
    }

    pub fn from_json(content: &str) -> anyhow::Result<Self> {
        let mut config: Config = serde_json::from_str(content)?;
        config.apply_defaults();
        Ok(config)
    }

    fn apply_defaults(&mut self) {
        if self.openai_api_url.is_empty() {
            self.openai_api_url = DEFAULT_OPENAI_API_URL.to_string();
        }
        if self.influx_org.is_empty() {
            self.influx_org = DEFAULT_INFLUX_ORG.to_string();
        }
        if self.influx_bucket.is_empty() {
            self.influx_bucket = DEFAULT_INFLUX_BUCKET.to_string();
        }
    }

    /// Check the endpoint set for contradictions before binding anything.
    ///
    /// Ports and priority ranks must be unique across endpoints, and rank 0
    /// is reserved (1 is the top class).
    pub fn validate(&self) -> Result<()> {
        if self.endpoints.is_empty() {
            return Err(ProxyError::Config("no endpoints configured".to_string()));
        }

        let mut ports = HashSet::new();
        let mut priorities = HashSet::new();
        for ep in &self.endpoints {
            if ep.priority == 0 {
                return Err(ProxyError::Config(format!(
                    "endpoint on port {}: priority must be >= 1",
                    ep.port
                )));
            }
            if !ports.insert(ep.port) {
                return Err(ProxyError::Config(format!(
                    "duplicate endpoint port {}",
                    ep.port
                )));
            }
            if !priorities.insert(ep.priority) {
                return Err(ProxyError::Config(format!(
                    "duplicate endpoint priority {}",
                    ep.priority
                )));
            }
        }
        Ok(())
    }
}
