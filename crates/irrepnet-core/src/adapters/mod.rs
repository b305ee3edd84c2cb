//! # Adapters Layer (Hexagonal Architecture)
//!
//! Implements outbound port traits.

mod scenario_sources;

pub use scenario_sources::{FileScenarioSource, InlineScenarioSource, StaticScenarioSource};
