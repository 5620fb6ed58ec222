use config::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::{debug, info};

use crate::attacker::{AttackerKind, AttackerSpec};
use crate::constants::{DEFAULT_ATTACKER_HOP_PERIOD, DEFAULT_SEED, DEFAULT_TICKS, ENV_PREFIX};
use crate::error::Result;
use crate::flow::FlowSpec;
use crate::node::NodeId;
use crate::simulation::Simulation;
use crate::topology::{Topology, PARALLEL_SINK, PARALLEL_SOURCE};

/// Topology to simulate over.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TopologySpec {
    /// `paths` parallel source→sink paths with `path_length` relays each.
    Parallel { paths: usize, path_length: usize },
    /// Complete graph on `nodes` nodes.
    Complete { nodes: u32 },
}

impl TopologySpec {
    pub fn build(&self) -> Topology {
        match *self {
            TopologySpec::Parallel { paths, path_length } => Topology::parallel_paths(paths, path_length),
            TopologySpec::Complete { nodes } => Topology::complete(nodes),
        }
    }
}

/// Everything needed to set up one run.
///
/// Loaded from a TOML file and `PATHHOP_*` environment variables, e.g.
/// `PATHHOP_SEED=7` or `PATHHOP_FLOW__K=3`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    pub seed: u64,
    pub ticks: u64,
    /// Flow endpoints. Without them the flow runs between the parallel
    /// topology's source and sink, or between random nodes otherwise.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_node: Option<NodeId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sink_node: Option<NodeId>,
    pub topology: TopologySpec,
    pub flow: FlowSpec,
    pub attackers: Vec<AttackerSpec>,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        SimulationConfig {
            seed: DEFAULT_SEED,
            ticks: DEFAULT_TICKS,
            source_node: None,
            sink_node: None,
            topology: TopologySpec::Complete { nodes: 10 },
            flow: FlowSpec::default(),
            attackers: AttackerKind::ALL
                .iter()
                .map(|&kind| AttackerSpec::new(kind, DEFAULT_ATTACKER_HOP_PERIOD))
                .collect(),
        }
    }
}

impl SimulationConfig {
    /// Loads the config at `path`, writing the defaults there first if the
    /// file does not exist yet.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            SimulationConfig::default().write(path)?;
            info!("📝 Wrote default config to {}", path.display());
        }

        debug!("📝 Loading config at path: {}", path.display());
        let settings = Config::builder()
            .add_source(File::new(&path.to_string_lossy(), FileFormat::Toml))
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        Ok(settings.try_deserialize()?)
    }

    /// Writes this config as TOML, creating parent directories as needed.
    pub fn write(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, toml::to_string_pretty(self)?)?;
        Ok(())
    }

    /// Keeps only attackers of the given kinds. An empty list keeps them all.
    pub fn retain_attackers(&mut self, kinds: &[AttackerKind]) {
        if !kinds.is_empty() {
            self.attackers.retain(|spec| kinds.contains(&spec.kind));
        }
    }

    /// Builds the topology, the flow and every configured attacker.
    pub fn build_simulation(&self) -> Result<Simulation> {
        let mut sim = Simulation::new(self.topology.build(), self.seed);

        let endpoints = match (self.source_node, self.sink_node, &self.topology) {
            (Some(source), Some(sink), _) => Some((source, sink)),
            (None, None, TopologySpec::Parallel { .. }) => Some((PARALLEL_SOURCE, PARALLEL_SINK)),
            _ => None,
        };
        let flow_id = match endpoints {
            Some((source, sink)) => sim.add_flow_between(source, sink, self.flow)?,
            None => sim.add_random_flow(self.flow)?,
        };

        for &spec in &self.attackers {
            sim.add_attacker(spec, flow_id)?;
        }
        Ok(sim)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SimulationError;
    use std::path::PathBuf;

    fn scratch_path(name: &str) -> PathBuf {
        std::env::temp_dir()
            .join(format!("pathhop-config-{}-{}", name, std::process::id()))
            .join("pathhop.toml")
    }

    #[test]
    fn test_missing_file_is_created_with_defaults() {
        let path = scratch_path("defaults");
        let _ = fs::remove_file(&path);

        let config = SimulationConfig::load(&path).unwrap();
        assert!(path.exists());
        assert_eq!(config.topology, TopologySpec::Complete { nodes: 10 });
        assert_eq!(config.flow.n, 9);
        assert_eq!(config.flow.k, 5);
        assert_eq!(config.attackers.len(), 7);

        let _ = fs::remove_dir_all(path.parent().unwrap());
    }

    #[test]
    fn test_written_config_loads_back() {
        let path = scratch_path("roundtrip");
        let config = SimulationConfig {
            seed: 12,
            ticks: 40,
            source_node: None,
            sink_node: None,
            topology: TopologySpec::Parallel { paths: 5, path_length: 2 },
            flow: FlowSpec::new(5, 2).with_hop_period(3),
            attackers: vec![
                AttackerSpec::new(AttackerKind::Fixed, 1),
                AttackerSpec::new(AttackerKind::Planned, 4).with_budget(3),
            ],
        };
        config.write(&path).unwrap();

        let loaded = SimulationConfig::load(&path).unwrap();
        assert_eq!(loaded.topology, config.topology);
        assert_eq!(loaded.flow, config.flow);
        assert_eq!(loaded.attackers, config.attackers);
        assert_eq!(loaded.ticks, 40);

        let _ = fs::remove_dir_all(path.parent().unwrap());
    }

    #[test]
    fn test_partial_file_falls_back_to_defaults() {
        let path = scratch_path("partial");
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, "ticks = 25\n\n[flow]\nn = 4\nk = 2\n").unwrap();

        let loaded = SimulationConfig::load(&path).unwrap();
        assert_eq!(loaded.ticks, 25);
        assert_eq!(loaded.flow.n, 4);
        assert_eq!(loaded.flow.hop_period, 1);
        assert_eq!(loaded.attackers.len(), 7);

        let _ = fs::remove_dir_all(path.parent().unwrap());
    }

    #[test]
    fn test_parallel_config_builds_between_endpoints() {
        let config = SimulationConfig {
            topology: TopologySpec::Parallel { paths: 5, path_length: 2 },
            flow: FlowSpec::new(5, 2),
            ..SimulationConfig::default()
        };
        let sim = config.build_simulation().unwrap();
        let flow = &sim.flows()[0];
        assert_eq!(flow.source_node(), PARALLEL_SOURCE);
        assert_eq!(flow.sink_node(), PARALLEL_SINK);
        assert_eq!(sim.attackers().len(), 7);
    }

    #[test]
    fn test_attacker_filter() {
        let mut config = SimulationConfig::default();
        config.retain_attackers(&[]);
        assert_eq!(config.attackers.len(), 7);

        config.retain_attackers(&[AttackerKind::Planned, AttackerKind::Total]);
        let kinds: Vec<AttackerKind> = config.attackers.iter().map(|spec| spec.kind).collect();
        assert_eq!(kinds, vec![AttackerKind::Planned, AttackerKind::Total]);
    }

    #[test]
    fn test_oversized_flow_is_a_config_error() {
        let config = SimulationConfig {
            topology: TopologySpec::Parallel { paths: 3, path_length: 2 },
            flow: FlowSpec::new(5, 2),
            ..SimulationConfig::default()
        };
        assert!(matches!(
            config.build_simulation(),
            Err(SimulationError::InsufficientDisjointPaths { .. })
        ));
    }
}
