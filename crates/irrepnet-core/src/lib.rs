//! # IRREPnet: Z_k gauge token propagation
//!
//! Integer token counts live on directed edges, indexed by channel and by a
//! phase in Z_k. Each step walks a layered DAG schedule: mass crossing an
//! edge is shifted by the gauge difference and edge offset, filtered by a
//! fusion mask, broadcast to the destination's outgoing edges, and converted
//! by node-local coupling rules. Readouts project phase histograms onto the
//! fundamental character of Z_k.
//!
//! ## Architecture
//!
//! - **Domain**: Scenario, count tensor, phase group, errors, invariants
//! - **Loader**: YAML document parsing and load-time validation
//! - **Algorithms**: Layer propagation, coupling rules, measurement
//! - **Ports**: Inbound (`SimulationApi`) and Outbound (`ScenarioSource`)
//! - **Adapters**: File, inline and static scenario sources
//! - **Application**: `Simulation` and the gauge phase sweep
//!
//! ```rust,ignore
//! use irrepnet_core::Simulation;
//!
//! let mut sim = Simulation::construct("scenarios/two_path.yaml")?;
//! sim.step()?;
//! for (name, value) in sim.measure() {
//!     println!("{name}: {value}");
//! }
//! println!("{}", sim.export_state().to_json()?);
//! ```

pub mod adapters;
pub mod algorithms;
pub mod application;
pub mod config;
pub mod domain;
pub mod loader;
pub mod ports;
pub mod telemetry;

pub use adapters::{FileScenarioSource, InlineScenarioSource, StaticScenarioSource};
pub use application::{scan_gauge_phase, GaugeScanPoint, Simulation, SweepError};
pub use config::{Backend, EngineConfig};
pub use domain::entities::*;
pub use domain::errors::{ConfigError, StepError};
pub use domain::value_objects::*;
pub use loader::{load, load_str};
pub use ports::inbound::SimulationApi;
pub use ports::outbound::ScenarioSource;
pub use telemetry::{init_logging, LoggingConfig};
