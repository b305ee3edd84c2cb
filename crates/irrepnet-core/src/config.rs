//! Engine configuration
//!
//! Scenario content lives in the YAML document; this only decides how a
//! loaded scenario is executed.

use crate::domain::errors::ConfigError;
use serde::{Deserialize, Serialize};
use std::env;
use tracing::warn;

/// Execution backend for the per-layer gather.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// Single thread
    Serial,
    /// CPU with Rayon parallelism
    Parallel,
}

impl Backend {
    /// Label reported in state exports.
    pub fn label(&self) -> &'static str {
        match self {
            Backend::Serial => "cpu",
            Backend::Parallel => "cpu-rayon",
        }
    }

    /// Whether this build can run the backend.
    pub fn is_available(&self) -> bool {
        match self {
            Backend::Serial => true,
            Backend::Parallel => cfg!(feature = "parallel"),
        }
    }

    /// Accepts `serial`/`cpu` and `parallel`/`cpu-rayon`/`rayon`.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "serial" | "cpu" => Some(Backend::Serial),
            "parallel" | "cpu-rayon" | "rayon" => Some(Backend::Parallel),
            _ => None,
        }
    }
}

impl std::fmt::Display for Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// How a simulation executes its layers.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub backend: Backend,
    /// Layers with fewer edges are gathered serially even on `Parallel`
    pub parallel_min_edges: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            backend: if cfg!(feature = "parallel") {
                Backend::Parallel
            } else {
                Backend::Serial
            },
            parallel_min_edges: 64,
        }
    }
}

impl EngineConfig {
    /// Create configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `IRREPNET_BACKEND`: `serial` or `parallel` (default: parallel when built with it)
    /// - `IRREPNET_PARALLEL_MIN_EDGES`: gather threshold (default: 64)
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();

        let backend = match lookup("IRREPNET_BACKEND") {
            Some(raw) => Backend::parse(&raw).unwrap_or_else(|| {
                warn!(value = %raw, "Unknown IRREPNET_BACKEND, using default");
                defaults.backend
            }),
            None => defaults.backend,
        };

        Self {
            backend,
            parallel_min_edges: lookup("IRREPNET_PARALLEL_MIN_EDGES")
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.parallel_min_edges),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.parallel_min_edges == 0 {
            return Err(ConfigError::EngineConfig(
                "parallel_min_edges must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Backend actually used; falls back to `Serial` when `Parallel` is compiled out.
    pub fn effective_backend(&self) -> Backend {
        if self.backend.is_available() {
            self.backend
        } else {
            Backend::Serial
        }
    }
}
