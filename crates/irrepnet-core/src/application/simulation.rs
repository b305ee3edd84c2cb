//! Simulation service
//!
//! Owns the live and scratch count buffers and drives the DAG schedule:
//! 1. For each repeat, for each non-empty layer
//! 2. Propagate and couple into scratch
//! 3. Swap buffers and zero the new scratch

use crate::adapters::{FileScenarioSource, StaticScenarioSource};
use crate::algorithms::measurement::measure_counts;
use crate::algorithms::propagation::{apply_layer, LayerContext};
use crate::config::{Backend, EngineConfig};
use crate::domain::entities::{CountTensor, Scenario};
use crate::domain::errors::{ConfigError, StepError};
use crate::domain::invariants::invariant_counts_shape;
use crate::domain::value_objects::StateExport;
use crate::ports::inbound::SimulationApi;
use crate::ports::outbound::ScenarioSource;
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{debug, error, info, trace};

/// A loaded scenario plus its evolving token counts.
pub struct Simulation {
    source: Box<dyn ScenarioSource>,
    config: EngineConfig,
    backend: Backend,
    scenario: Scenario,
    outgoing: Vec<Vec<usize>>,
    gauge: Vec<usize>,
    counts: CountTensor,
    scratch: CountTensor,
    steps_taken: u64,
    poisoned: bool,
}

impl Simulation {
    /// Load a scenario file with the default engine configuration.
    pub fn construct(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        Self::from_source(
            Box::new(FileScenarioSource::new(path)),
            EngineConfig::default(),
        )
    }

    pub fn from_source(
        source: Box<dyn ScenarioSource>,
        config: EngineConfig,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let scenario = source.load_scenario()?;
        Self::build(source, config, scenario)
    }

    /// Run an already-resolved scenario; `reset` restores this scenario.
    pub fn from_scenario(scenario: Scenario) -> Result<Self, ConfigError> {
        let source = Box::new(StaticScenarioSource::new(scenario.clone()));
        Self::build(source, EngineConfig::default(), scenario)
    }

    pub fn with_config(scenario: Scenario, config: EngineConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let source = Box::new(StaticScenarioSource::new(scenario.clone()));
        Self::build(source, config, scenario)
    }

    fn build(
        source: Box<dyn ScenarioSource>,
        config: EngineConfig,
        scenario: Scenario,
    ) -> Result<Self, ConfigError> {
        let backend = config.effective_backend();
        let mut simulation = Self {
            source,
            config,
            backend,
            outgoing: Vec::new(),
            gauge: Vec::new(),
            counts: CountTensor::zeros(0, 0, 0),
            scratch: CountTensor::zeros(0, 0, 0),
            scenario,
            steps_taken: 0,
            poisoned: false,
        };
        simulation.rebuild_state()?;

        info!(
            source = %simulation.source.describe(),
            backend = %simulation.backend,
            shape = ?simulation.counts.shape(),
            "Simulation ready"
        );
        Ok(simulation)
    }

    fn rebuild_state(&mut self) -> Result<(), ConfigError> {
        let [edges, channels, k] = [
            self.scenario.edge_count(),
            self.scenario.channel_count(),
            self.scenario.k(),
        ];
        self.outgoing = self.scenario.outgoing_index();
        self.gauge = self.scenario.gauge_phases();
        self.counts = CountTensor::zeros(edges, channels, k);
        self.scratch = CountTensor::zeros(edges, channels, k);
        for init in &self.scenario.counts_init {
            self.counts
                .add(init.edge, init.channel, init.phase, init.value)
                .map_err(|_| ConfigError::CountsInitOverflow {
                    edge: self.scenario.directed_edges[init.edge].id,
                    channel: self.scenario.channels[init.channel].name.clone(),
                })?;
        }
        self.steps_taken = 0;
        self.poisoned = false;
        debug_assert!(invariant_counts_shape(&self.counts, &self.scenario));
        Ok(())
    }

    /// Reload from the source and discard all state, gauge overrides included.
    pub fn reset(&mut self) -> Result<(), ConfigError> {
        self.scenario = self.source.load_scenario()?;
        self.rebuild_state()?;
        info!(source = %self.source.describe(), "Simulation reset");
        Ok(())
    }

    /// Advance one full schedule.
    pub fn step(&mut self) -> Result<(), StepError> {
        if self.poisoned {
            return Err(StepError::Poisoned);
        }

        if let Err(err) = self.run_schedule() {
            self.poisoned = true;
            error!(code = err.code(), error = %err, step = self.steps_taken, "Step failed");
            return Err(err);
        }

        self.steps_taken += 1;
        debug!(
            step = self.steps_taken,
            checksum = self.counts.checksum(),
            "Step complete"
        );
        Ok(())
    }

    fn run_schedule(&mut self) -> Result<(), StepError> {
        let ctx = LayerContext {
            scenario: &self.scenario,
            outgoing: &self.outgoing,
            gauge: &self.gauge,
        };

        for _ in 0..self.scenario.dag.repeat {
            for (index, layer) in self.scenario.dag.layers.iter().enumerate() {
                if layer.is_empty() {
                    continue;
                }
                let report = apply_layer(
                    &ctx,
                    layer,
                    &self.counts,
                    &mut self.scratch,
                    self.backend,
                    self.config.parallel_min_edges,
                )?;
                std::mem::swap(&mut self.counts, &mut self.scratch);
                debug_assert!(invariant_counts_shape(&self.counts, &self.scenario));
                self.scratch.clear();
                trace!(layer = index, active_nodes = report.active_nodes, "Buffers swapped");
            }
        }
        Ok(())
    }

    /// Readout name -> character power.
    pub fn measure(&self) -> BTreeMap<String, f64> {
        self.measure_ordered().into_iter().collect()
    }

    /// Readouts in declaration order.
    pub fn measure_ordered(&self) -> Vec<(String, f64)> {
        self.scenario
            .measurement
            .iter()
            .map(|readout| {
                let value = measure_counts(&self.counts, &readout.edges, readout.channels.as_deref());
                (readout.name.clone(), value)
            })
            .collect()
    }

    /// Value of one readout; the last declaration wins on duplicate names.
    pub fn measure_readout(&self, name: &str) -> Option<f64> {
        self.scenario
            .measurement
            .iter()
            .rev()
            .find(|readout| readout.name == name)
            .map(|readout| measure_counts(&self.counts, &readout.edges, readout.channels.as_deref()))
    }

    pub fn export_state(&self) -> StateExport {
        StateExport {
            k: self.scenario.k(),
            counts_shape: self.counts.shape(),
            counts_checksum: self.counts.checksum(),
            backend_label: self.backend.label().to_string(),
        }
    }

    /// Override a node's gauge phase until the next reset.
    pub fn set_gauge_phase(&mut self, node: usize, phase: i64) -> Result<(), ConfigError> {
        if node >= self.gauge.len() {
            return Err(ConfigError::NodeUnknown { node: node as i64 });
        }
        if !self.scenario.phase_group.contains(phase) {
            return Err(ConfigError::GaugePhaseRange {
                node: node as i64,
                phase,
                k: self.scenario.k(),
            });
        }
        self.gauge[node] = phase as usize;
        debug!(node, phase, "Gauge phase overridden");
        Ok(())
    }

    pub fn gauge_phase(&self, node: usize) -> Option<usize> {
        self.gauge.get(node).copied()
    }

    pub fn counts(&self) -> &CountTensor {
        &self.counts
    }

    pub fn scenario(&self) -> &Scenario {
        &self.scenario
    }

    pub fn k(&self) -> usize {
        self.scenario.k()
    }

    pub fn steps_taken(&self) -> u64 {
        self.steps_taken
    }

    pub fn backend(&self) -> Backend {
        self.backend
    }

    pub fn is_poisoned(&self) -> bool {
        self.poisoned
    }
}

impl SimulationApi for Simulation {
    fn step(&mut self) -> Result<(), StepError> {
        Simulation::step(self)
    }

    fn reset(&mut self) -> Result<(), ConfigError> {
        Simulation::reset(self)
    }

    fn measure(&self) -> BTreeMap<String, f64> {
        Simulation::measure(self)
    }

    fn export_state(&self) -> StateExport {
        Simulation::export_state(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::CountInit;
    use crate::loader::load_str;
    use crate::ports::outbound::mocks::CountingSource;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    // 0 -e0-> 1 -e1-> 2 -e2-> 0, offset 1 on every edge
    const RING: &str = r#"
irrepnet_dm: "0.2"
phase_group: { kind: Zk, k: 4 }
nodes: [{ id: 0 }, { id: 1 }, { id: 2 }]
edges: [{ id: 0, phase_offset: 1 }]
directed_edges:
  - { id: 0, src: 0, dst: 1, edge_ref: 0 }
  - { id: 1, src: 1, dst: 2, edge_ref: 0 }
  - { id: 2, src: 2, dst: 0, edge_ref: 0 }
channels: [{ name: A }]
fusion_mask:
  - [[1, 1, 1, 1]]
  - [[1, 1, 1, 1]]
  - [[1, 1, 1, 1]]
counts_init: [{ edge: 0, channel: A, phase: 0, value: 2 }]
dag: { layers: [{ edges: [0] }, { edges: [1] }] }
measurement:
  outputs:
    - { name: tail, readout_edges: [2] }
    - { name: head, readout_edges: [0] }
"#;

    fn ring() -> Simulation {
        Simulation::with_config(
            load_str(RING).unwrap(),
            EngineConfig {
                backend: Backend::Serial,
                parallel_min_edges: 64,
            },
        )
        .unwrap()
    }

    #[test]
    fn test_step_moves_mass_through_layers() {
        let mut sim = ring();
        sim.step().unwrap();

        // Two hops, +1 each; mass is now queued on e2
        assert_eq!(sim.counts().lane(2, 0), &[0, 0, 2, 0]);
        assert_eq!(sim.counts().lane(0, 0), &[0, 0, 0, 0]);
        assert_eq!(sim.steps_taken(), 1);
        assert_eq!(sim.export_state().counts_checksum, 2);
    }

    #[test]
    fn test_mass_outside_layer_vanishes_on_swap() {
        let mut sim = ring();
        sim.step().unwrap();
        // e2 is never scheduled, so the next layer drops what sits there
        sim.step().unwrap();
        assert_eq!(sim.counts().total(), 0);
    }

    #[test]
    fn test_measure_named_readouts() {
        let mut sim = ring();
        let before = sim.measure();
        assert!((before["head"] - 4.0).abs() < 1e-9);
        assert_eq!(before["tail"], 0.0);

        sim.step().unwrap();
        let ordered = sim.measure_ordered();
        assert_eq!(ordered[0].0, "tail");
        assert!((ordered[0].1 - 4.0).abs() < 1e-9);
        assert_eq!(sim.measure_readout("missing"), None);
    }

    #[test]
    fn test_export_state_reports_backend() {
        let sim = ring();
        let export = sim.export_state();
        assert_eq!(export.k, 4);
        assert_eq!(export.counts_shape, [3, 1, 4]);
        assert_eq!(export.backend_label, "cpu");
    }

    #[test]
    fn test_gauge_override_and_reset() {
        let mut sim = ring();
        sim.set_gauge_phase(1, 3).unwrap();
        assert_eq!(sim.gauge_phase(1), Some(3));

        assert_eq!(sim.set_gauge_phase(1, 4).unwrap_err().code(), "E_GAUGE_PHASE_RANGE");
        assert_eq!(sim.set_gauge_phase(9, 0).unwrap_err().code(), "E_NODE_UNKNOWN");

        sim.step().unwrap();
        sim.reset().unwrap();
        assert_eq!(sim.gauge_phase(1), Some(0));
        assert_eq!(sim.steps_taken(), 0);
        assert_eq!(sim.counts().get(0, 0, 0), 2);
    }

    #[test]
    fn test_reset_goes_back_to_source() {
        let loads = Arc::new(AtomicUsize::new(0));
        let source = CountingSource {
            scenario: load_str(RING).unwrap(),
            loads: Arc::clone(&loads),
        };
        let mut sim = Simulation::from_source(Box::new(source), EngineConfig::default()).unwrap();
        sim.reset().unwrap();
        sim.reset().unwrap();
        assert_eq!(loads.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_invalid_engine_config_rejected() {
        let result = Simulation::with_config(
            load_str(RING).unwrap(),
            EngineConfig {
                backend: Backend::Serial,
                parallel_min_edges: 0,
            },
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_initial_counts_past_u64_rejected() {
        let mut scenario = load_str(RING).unwrap();
        scenario.counts_init.push(CountInit {
            edge: 0,
            channel: 0,
            phase: 0,
            value: u64::MAX,
        });

        let err = Simulation::from_scenario(scenario).err().unwrap();
        assert_eq!(err.code(), "E_COUNTS_INIT_OVERFLOW");
    }

    #[test]
    fn test_count_overflow_poisons_until_reset() {
        // both self-loops feed node 0, which broadcasts to both: mass doubles per step
        let doubling = r#"
irrepnet_dm: "0.2"
phase_group: { kind: Zk, k: 2 }
nodes: [{ id: 0 }]
edges: [{ id: 0 }]
directed_edges:
  - { id: 0, src: 0, dst: 0, edge_ref: 0 }
  - { id: 1, src: 0, dst: 0, edge_ref: 0 }
channels: [{ name: A }]
fusion_mask: [[[1, 1]], [[1, 1]]]
counts_init: [{ edge: 0, channel: A, value: 1 }]
dag: { layers: [{ edges: [0, 1] }] }
"#;
        let mut sim = Simulation::from_scenario(load_str(doubling).unwrap()).unwrap();
        let err = (0..70)
            .find_map(|_| sim.step().err())
            .expect("doubling must overflow within 70 steps");

        assert_eq!(err.code(), "E_COUNT_OVERFLOW");
        assert_eq!(sim.steps_taken(), 64);
        assert!(sim.is_poisoned());
        assert_eq!(sim.step().unwrap_err(), StepError::Poisoned);

        sim.reset().unwrap();
        assert_eq!(sim.counts().total(), 1);
        assert!(sim.step().is_ok());
    }
}
