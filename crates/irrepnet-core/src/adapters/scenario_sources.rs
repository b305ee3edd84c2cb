//! Scenario source adapters
//!
//! Implements `ScenarioSource` for files on disk, in-memory documents and
//! already-resolved scenarios.

use crate::domain::entities::Scenario;
use crate::domain::errors::ConfigError;
use crate::loader;
use crate::ports::outbound::ScenarioSource;
use std::path::{Path, PathBuf};

/// Re-reads a YAML file on every load, so `reset` picks up edits.
#[derive(Debug, Clone)]
pub struct FileScenarioSource {
    path: PathBuf,
}

impl FileScenarioSource {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ScenarioSource for FileScenarioSource {
    fn load_scenario(&self) -> Result<Scenario, ConfigError> {
        loader::load(&self.path)
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

/// Scenario document held as text; parsed again on every load.
#[derive(Debug, Clone)]
pub struct InlineScenarioSource {
    document: String,
}

impl InlineScenarioSource {
    pub fn new(document: impl Into<String>) -> Self {
        Self {
            document: document.into(),
        }
    }
}

impl ScenarioSource for InlineScenarioSource {
    fn load_scenario(&self) -> Result<Scenario, ConfigError> {
        loader::load_str(&self.document)
    }

    fn describe(&self) -> String {
        format!("<inline, {} bytes>", self.document.len())
    }
}

/// Hands out clones of a resolved scenario.
#[derive(Debug, Clone)]
pub struct StaticScenarioSource {
    scenario: Scenario,
}

impl StaticScenarioSource {
    pub fn new(scenario: Scenario) -> Self {
        Self { scenario }
    }
}

impl ScenarioSource for StaticScenarioSource {
    fn load_scenario(&self) -> Result<Scenario, ConfigError> {
        Ok(self.scenario.clone())
    }

    fn describe(&self) -> String {
        "<static>".to_string()
    }
}
