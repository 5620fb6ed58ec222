use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::attacker::{AttackerKind, AttackerSpec};
use crate::constants::{SWEEP_K, SWEEP_N, SWEEP_TICKS};
use crate::error::Result;
use crate::flow::FlowSpec;
use crate::report::SimulationReport;
use crate::simulation::Simulation;
use crate::topology::{Topology, PARALLEL_SINK, PARALLEL_SOURCE};

/// Ticks for the path count sweep, which needs longer runs.
const PATH_COUNT_TICKS: u64 = 100_000;

/// Parameter sweeps run against parallel-path topologies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum TrialSweep {
    /// Path lengths 1..=10, attackers hop every tick.
    PathLengthFastHops,
    /// Path lengths 1..=10, attackers hop every 10 ticks.
    PathLengthSlowHops,
    /// Attacker hop periods 1..=10 on paths with 10 relays.
    HopPeriodLongPaths,
    /// Attacker hop periods 1..=10 on paths with a single relay.
    HopPeriodShortPaths,
    /// 10..=100 paths with K = N / 2.
    PathCount,
}

impl TrialSweep {
    pub fn name(self) -> &'static str {
        match self {
            TrialSweep::PathLengthFastHops => "sim-path-length-fast-hops",
            TrialSweep::PathLengthSlowHops => "sim-path-length-slow-hops",
            TrialSweep::HopPeriodLongPaths => "sim-hop-period-long-paths",
            TrialSweep::HopPeriodShortPaths => "sim-hop-period-short-paths",
            TrialSweep::PathCount => "sim-number-of-paths-slow-hops",
        }
    }

    fn varying(self, value: usize) -> TrialParameters {
        let base = TrialParameters {
            title: String::new(),
            run_idx: 0,
            k: SWEEP_K,
            n: SWEEP_N,
            path_length: 1,
            attacker_hop_period: 1,
            ticks: SWEEP_TICKS,
            seed: 0,
        };
        match self {
            TrialSweep::PathLengthFastHops => TrialParameters {
                title: format!("path-length-{}", value),
                path_length: value,
                ..base
            },
            TrialSweep::PathLengthSlowHops => TrialParameters {
                title: format!("path-length-{}", value),
                path_length: value,
                attacker_hop_period: 10,
                ..base
            },
            TrialSweep::HopPeriodLongPaths => TrialParameters {
                title: format!("hop-period-{}", value),
                path_length: 10,
                attacker_hop_period: value as u64,
                ..base
            },
            TrialSweep::HopPeriodShortPaths => TrialParameters {
                title: format!("hop-period-{}", value),
                attacker_hop_period: value as u64,
                ..base
            },
            TrialSweep::PathCount => TrialParameters {
                title: format!("number-of-paths-{}", value),
                k: value / 2,
                n: value,
                path_length: 5,
                attacker_hop_period: 10,
                ticks: PATH_COUNT_TICKS,
                ..base
            },
        }
    }

    fn values(self) -> Vec<usize> {
        match self {
            TrialSweep::PathCount => (1..=10).map(|i| i * 10).collect(),
            _ => (1..=10).collect(),
        }
    }

    /// Every trial of the sweep: each swept value is run once per seed, and
    /// the same `runs` seeds are reused across values.
    pub fn trials<R: Rng + ?Sized>(self, runs: usize, ticks: Option<u64>, rng: &mut R) -> Vec<TrialParameters> {
        let seeds: Vec<u64> = (0..runs).map(|_| rng.gen_range(0..=u64::from(u32::MAX))).collect();
        let mut trials = Vec::with_capacity(runs * self.values().len());
        for value in self.values() {
            for &seed in &seeds {
                let mut trial = self.varying(value);
                trial.run_idx = trials.len();
                trial.title = format!("{}-run-{}", trial.title, trial.run_idx);
                trial.seed = seed;
                if let Some(ticks) = ticks {
                    trial.ticks = ticks;
                }
                trials.push(trial);
            }
        }
        trials
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrialParameters {
    pub title: String,
    pub run_idx: usize,
    pub k: usize,
    pub n: usize,
    pub path_length: usize,
    pub attacker_hop_period: u64,
    pub ticks: u64,
    pub seed: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrialReport {
    pub parameters: TrialParameters,
    pub report: SimulationReport,
}

/// Runs one flow over `n` parallel paths against one attacker of every kind.
pub fn run_trial(parameters: &TrialParameters) -> Result<TrialReport> {
    let topology = Topology::parallel_paths(parameters.n, parameters.path_length);
    let mut sim = Simulation::new(topology, parameters.seed);
    let flow_id = sim.add_flow_between(
        PARALLEL_SOURCE,
        PARALLEL_SINK,
        FlowSpec::new(parameters.n, parameters.k),
    )?;
    for kind in AttackerKind::ALL {
        sim.add_attacker(AttackerSpec::new(kind, parameters.attacker_hop_period), flow_id)?;
    }

    sim.run(parameters.ticks);
    info!("✅ Finished trial {}", parameters.title);
    sim.log_state();

    Ok(TrialReport {
        parameters: parameters.clone(),
        report: sim.report(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    #[test]
    fn test_sweep_sizes_and_titles() {
        let mut rng = ChaCha8Rng::seed_from_u64(0);
        let trials = TrialSweep::PathLengthFastHops.trials(3, None, &mut rng);

        assert_eq!(trials.len(), 30);
        assert_eq!(trials[0].title, "path-length-1-run-0");
        assert_eq!(trials[29].title, "path-length-10-run-29");
        assert!(trials.iter().all(|t| t.k == 5 && t.n == 10 && t.ticks == 10_000));
        // Seeds repeat across swept values.
        assert_eq!(trials[0].seed, trials[3].seed);
    }

    #[test]
    fn test_path_count_sweep_halves_threshold() {
        let mut rng = ChaCha8Rng::seed_from_u64(0);
        let trials = TrialSweep::PathCount.trials(1, Some(20), &mut rng);

        assert_eq!(trials.len(), 10);
        assert_eq!((trials[9].n, trials[9].k), (100, 50));
        assert!(trials.iter().all(|t| t.path_length == 5 && t.attacker_hop_period == 10 && t.ticks == 20));
    }

    #[test]
    fn test_run_trial_reports_every_attacker() {
        let mut rng = ChaCha8Rng::seed_from_u64(4);
        let trial = &TrialSweep::HopPeriodShortPaths.trials(1, Some(200), &mut rng)[2];
        let result = run_trial(trial).unwrap();

        assert_eq!(result.report.ticks, 200);
        assert_eq!(result.report.attackers.len(), AttackerKind::ALL.len());
        let total = result.report.attacker(AttackerKind::Total).unwrap();
        assert_eq!(total.recovered_messages.len(), 200);
        for attacker in &result.report.attackers {
            assert!(attacker.recovered_messages.len() <= 200);
        }
    }
}
