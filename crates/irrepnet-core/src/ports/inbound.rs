//! Inbound Ports (Driving Ports / API)

use crate::domain::errors::{ConfigError, StepError};
use crate::domain::value_objects::StateExport;
use std::collections::BTreeMap;

/// Primary simulation API
pub trait SimulationApi {
    /// Advance one full schedule: every layer, `repeat` times.
    ///
    /// A failure is fatal; later calls return `StepError::Poisoned` until reset.
    fn step(&mut self) -> Result<(), StepError>;

    /// Reload the scenario from its source and rebuild all state.
    fn reset(&mut self) -> Result<(), ConfigError>;

    /// Readout name -> character power.
    fn measure(&self) -> BTreeMap<String, f64>;

    fn export_state(&self) -> StateExport;
}
