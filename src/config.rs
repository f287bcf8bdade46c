use crate::error::{LinkError, Result};
use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct LinkConfig {
    /// Address of the tag location server
    pub address: String,
    pub poll_interval_ms: u64,
    /// Name of the tag that drives the selected object
    pub bound_tag: String,
    /// Scale change per scroll tick, in 1/1024ths
    pub wheel_sensitivity: f64,
    /// Multiplier applied to tag translation deltas
    pub initial_scale: f64,
    /// Largest read performed per poll
    pub read_chunk: usize,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            address: "127.0.0.1:30002".to_owned(),
            poll_interval_ms: 25,
            bound_tag: "simple tag".to_owned(),
            wheel_sensitivity: 50.0,
            initial_scale: 0.2,
            read_chunk: 4096,
        }
    }
}

impl LinkConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .map_err(|error| LinkError::Config(format!("{}: {}", path.display(), error)))?;
        Self::from_toml(&content)
    }

    /// Loads `path` when given, otherwise falls back to the defaults.
    pub fn load_or_default<P: AsRef<Path>>(path: Option<P>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Multiplier applied by a single scroll tick.
    pub fn scale_step(&self) -> f64 {
        1.0 + self.wheel_sensitivity / 1024.0
    }
}
