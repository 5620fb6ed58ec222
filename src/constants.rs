/// Seed used when neither the config file nor the command line provides one.
pub const DEFAULT_SEED: u64 = 0xCAFE_BABE;

/// Number of ticks in a run when none is configured.
pub const DEFAULT_TICKS: u64 = 1_000;

/// Default number of disjoint paths per flow.
pub const DEFAULT_N: usize = 9;

/// Default share threshold per flow.
pub const DEFAULT_K: usize = 5;

/// Flows re-roll their active paths every tick unless told otherwise.
pub const DEFAULT_FLOW_HOP_PERIOD: u64 = 1;

/// Attackers re-select monitored nodes every tick unless told otherwise.
pub const DEFAULT_ATTACKER_HOP_PERIOD: u64 = 1;

/// Inclusive bounds for randomly generated flow data volumes.
pub const MIN_DATA_VOLUME: u64 = 1;
pub const MAX_DATA_VOLUME: u64 = 100;

/// Default config file name, resolved relative to the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "pathhop.toml";

/// Environment prefix for config overrides, e.g. `PATHHOP_SEED=7`.
pub const ENV_PREFIX: &str = "PATHHOP";

/// Trial sweep defaults.
pub const SWEEP_RUNS: usize = 10;
pub const SWEEP_TICKS: u64 = 10_000;
pub const SWEEP_K: usize = 5;
pub const SWEEP_N: usize = 10;
