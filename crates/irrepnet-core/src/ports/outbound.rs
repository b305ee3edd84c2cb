//! Outbound Ports (Driven Ports / SPI)

use crate::domain::entities::Scenario;
use crate::domain::errors::ConfigError;

/// Where a simulation gets its scenario from, at construction and on reset.
pub trait ScenarioSource: Send + Sync {
    fn load_scenario(&self) -> Result<Scenario, ConfigError>;

    /// Human-readable origin for logs.
    fn describe(&self) -> String;
}
