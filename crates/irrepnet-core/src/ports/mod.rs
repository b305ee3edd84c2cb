//! Ports module for IRREPnet
//!
//! Defines inbound (API) and outbound (SPI) port traits.

pub mod inbound;
pub mod outbound;

pub use inbound::SimulationApi;
pub use outbound::ScenarioSource;
