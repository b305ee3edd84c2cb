//! Application layer: the simulation service and sweeps built on it.

pub mod simulation;
pub mod sweep;

pub use simulation::Simulation;
pub use sweep::{scan_gauge_phase, GaugeScanPoint, SweepError};
