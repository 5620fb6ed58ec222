use clap::{crate_version, Parser, Subcommand};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::error::Error;
use std::io::{self, Write};
use std::path::PathBuf;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use pathhop::attacker::AttackerKind;
use pathhop::config::SimulationConfig;
use pathhop::constants::{DEFAULT_CONFIG_FILE, DEFAULT_SEED, SWEEP_RUNS};
use pathhop::trial::{run_trial, TrialSweep};

#[derive(Debug, Subcommand)]
enum CliArgument {
    /// Run one simulation described by a config file.
    Run {
        /// Config file, created with defaults if missing.
        #[clap(long, short)]
        config: Option<PathBuf>,

        /// Override the configured seed.
        #[clap(long, short)]
        seed: Option<u64>,

        /// Override the configured number of ticks.
        #[clap(long, short)]
        ticks: Option<u64>,

        /// Only run these attackers (repeatable). Defaults to every configured attacker.
        #[clap(long, short, value_enum)]
        attacker: Vec<AttackerKind>,

        /// Include every captured share in the report
        #[clap(long)]
        captures: bool,

        /// Pretty-print the report
        #[clap(long, short)]
        pretty: bool,
    },
    /// Run a parameter sweep against parallel-path topologies, one JSON report per line.
    Sweep {
        /// Which parameter to sweep.
        #[clap(long, short, value_enum)]
        sweep: TrialSweep,

        /// Runs (seeds) per swept value.
        #[clap(long, short, default_value_t = SWEEP_RUNS)]
        runs: usize,

        /// Override the number of ticks per trial.
        #[clap(long, short)]
        ticks: Option<u64>,

        /// Seed used to draw the per-run seeds.
        #[clap(long)]
        seed: Option<u64>,
    },
    /// Write the default config file.
    InitConfig {
        /// Where to write it.
        #[clap(long, short)]
        path: Option<PathBuf>,

        /// Overwrite an existing file.
        #[clap(long, short)]
        force: bool,
    },
}

#[derive(Parser, Debug)]
#[command(name = "pathhop")]
#[command(version = crate_version!())]
#[command(
    about = "PATHHOP - path hopping threshold share simulator",
    long_about = "PATHHOP simulates a source splitting every message into K shares sent over K of N node-disjoint paths, re-rolling which paths carry traffic each tick, while eavesdroppers that can watch only a few relays per tick try to collect complete share sets. Every run is deterministic for a given seed. Reports are written to stdout as JSON; logging goes to stderr and is controlled with RUST_LOG."
)]
struct Opt {
    /// Subcommand to run.
    #[clap(subcommand)]
    argument: CliArgument,
}

fn main() -> Result<(), Box<dyn Error>> {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .try_init();

    let opt = Opt::parse();
    debug!("Arguments: {:?}", opt);

    match opt.argument {
        CliArgument::Run {
            config,
            seed,
            ticks,
            attacker,
            captures,
            pretty,
        } => {
            let path = config.unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));
            let mut settings = SimulationConfig::load(&path)?;
            if let Some(seed) = seed {
                settings.seed = seed;
            }
            if let Some(ticks) = ticks {
                settings.ticks = ticks;
            }
            settings.retain_attackers(&attacker);

            let mut sim = settings.build_simulation()?;
            info!("▶️ Running {} ticks with seed {}", settings.ticks, settings.seed);
            sim.run(settings.ticks);
            sim.log_state();

            let report = if captures {
                sim.report_with_captures()
            } else {
                sim.report()
            };
            let json = if pretty {
                serde_json::to_string_pretty(&report)?
            } else {
                serde_json::to_string(&report)?
            };
            println!("{}", json);
        }
        CliArgument::Sweep {
            sweep,
            runs,
            ticks,
            seed,
        } => {
            let mut rng = ChaCha8Rng::seed_from_u64(seed.unwrap_or(DEFAULT_SEED));
            let trials = sweep.trials(runs, ticks, &mut rng);
            info!("🧪 Sweep {} with {} trials", sweep.name(), trials.len());

            let stdout = io::stdout();
            let mut out = stdout.lock();
            for trial in &trials {
                let result = run_trial(trial)?;
                writeln!(out, "{}", serde_json::to_string(&result)?)?;
            }
        }
        CliArgument::InitConfig { path, force } => {
            let path = path.unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));
            if path.exists() && !force {
                return Err(format!("{} already exists, pass --force to overwrite", path.display()).into());
            }
            SimulationConfig::default().write(&path)?;
            println!("📝 Wrote default config to {}", path.display());
        }
    }

    Ok(())
}
