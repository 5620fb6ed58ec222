//! # Path Hopping over Threshold Shares
//!
//! This library simulates a communication scheme that combines threshold secret sharing with
//! path hopping, together with a family of eavesdroppers that try to defeat it by watching a
//! handful of relay nodes at a time.
//!
//! ## The Scheme
//!
//! A source splits every message into shares with a (K,N)-threshold scheme: any `K` shares
//! rebuild the message, fewer reveal nothing. The source is connected to the sink by `N`
//! node-disjoint paths. For each message it picks `K` of those paths and sends one share down
//! each. The set of active paths is re-drawn ("hops") every tick, so an observer that does not
//! know the schedule cannot tell which relays will carry the next message.
//!
//! ## The Attackers
//!
//! An attacker can watch only a limited number of relays per tick. It records every share it sees
//! in transit and, at the end of a run, counts a message as recovered when it holds shares of
//! that message for `K` distinct paths. Seven strategies differ only in how they choose which
//! relays to watch:
//!
//! ```text
//! random-node-hopping        K random relays anywhere
//! random-path-hopping        K random first hops of the flow
//! ideal-random-path-hopping  every relay of K random paths
//! one-node-per-path          one random relay on each of K random paths
//! fixed                      one-node-per-path, chosen once
//! planned                    deterministic sweep over hop positions
//! total                      every first hop, all the time
//! ```
//!
//! ## Time
//!
//! The simulation is a single-threaded, discrete-time loop. Each call to
//! [`simulation::Simulation::step`] emits one message per flow, moves every share one hop,
//! delivers shares that reached their sink, lets flows hop, and finally lets attackers watch
//! and re-select. All sampling draws from one seeded generator owned by the simulation, so a
//! seed fully determines a run.
//!
//! ### Example: Total vs. Fixed
//!
//! ```rust
//! use pathhop::attacker::{AttackerKind, AttackerSpec};
//! use pathhop::flow::FlowSpec;
//! use pathhop::simulation::Simulation;
//! use pathhop::topology::{Topology, PARALLEL_SINK, PARALLEL_SOURCE};
//!
//! // Five parallel three-hop paths, K = 2 of N = 5.
//! let mut sim = Simulation::new(Topology::parallel_paths(5, 2), 7);
//! let flow = sim
//!     .add_flow_between(PARALLEL_SOURCE, PARALLEL_SINK, FlowSpec::new(5, 2))
//!     .unwrap();
//! sim.add_attacker(AttackerSpec::new(AttackerKind::Total, 1), flow).unwrap();
//! sim.add_attacker(AttackerSpec::new(AttackerKind::Fixed, 1), flow).unwrap();
//! sim.run(1_000);
//!
//! let report = sim.report();
//! let total = report.attacker(AttackerKind::Total).unwrap();
//! let fixed = report.attacker(AttackerKind::Fixed).unwrap();
//! assert_eq!(total.recovered_messages.len(), 1_000);
//! assert!(fixed.recovered_messages.len() < total.recovered_messages.len());
//! ```
//!
//! ## Modules
//!
//! - `share`: The opaque share token.
//! - `node`: Relay nodes that hold shares for one tick.
//! - `topology`: Graphs, topology builders and node-disjoint path search.
//! - `flow`: Source→sink flows that emit, route and reconstruct shares.
//! - `attacker`: The eavesdropping strategies.
//! - `simulation`: The tick driver.
//! - `report`: Serializable run results.
//! - `config`: File and environment configuration.
//! - `trial`: Parameter sweeps.

/// The `share` module defines the share token: which flow and message it belongs to, and which
/// path it was created for.
pub mod share;

/// The `node` module defines relay nodes. A node holds the shares that arrived this tick and
/// exposes the ones an eavesdropper could intercept.
pub mod node;

/// The `topology` module holds the undirected network graph, builders for the topologies used in
/// experiments, and the node-disjoint path search flows are routed with.
pub mod topology;

/// The `flow` module implements the honest parties: share emission, per-share routing along a
/// bound path, threshold reconstruction at the sink and the hopping schedule.
pub mod flow;

/// The `attacker` module implements the seven eavesdropping strategies behind one type, and the
/// reconstruction rule that decides which messages an attacker recovered.
pub mod attacker;

/// The `simulation` module owns nodes, flows, attackers and the random generator, and advances
/// them one tick at a time in a fixed order.
pub mod simulation;

/// The `report` module defines the serializable summaries produced at the end of a run.
pub mod report;

/// The `config` module loads run settings from a TOML file and the environment.
pub mod config;

/// The `trial` module generates parameter sweeps and runs them.
pub mod trial;

/// The `error` module defines the crate's error type.
pub mod error;

/// The `constants` module defines various constants used in the library.
pub mod constants;
