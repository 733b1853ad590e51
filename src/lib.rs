//! # AdhocSim - Discrete-event simulator for wireless ad-hoc networks
//!
//! This library simulates a single-hop wireless ad-hoc network: nodes on a
//! grid, a shared medium arbitrated by CSMA/CA, IPv4 addressing in one flat
//! subnet, UDP echo traffic and per-flow statistics written after the run.
//!
//! ## Architecture
//!
//! The library is organized into several modules:
//!
//! - `sim`: simulation time and the deterministic event scheduler
//! - `topology`: nodes, placement strategies and mobility models
//! - `wifi`: channel, frames, PHY reception tracking, rate control and the MAC
//! - `ip`: address assignment, datagrams and the UDP stack
//! - `apps`: echo server and echo client
//! - `flowmon`: passive flow monitor, statistics output and post-run analysis
//! - `config`: scenario configuration with documented defaults
//! - `config_loader`: YAML scenario loading and CLI overrides
//! - `scenario`: assembles a `Simulation` and dispatches its events
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use adhocsim::config::ScenarioConfig;
//! use adhocsim::scenario::Simulation;
//!
//! let mut config = ScenarioConfig::default();
//! config.general.node_count = 2;
//!
//! let mut sim = Simulation::new(config)?;
//! sim.run();
//! sim.serialize(std::path::Path::new("Data.yaml"))?;
//! # Ok::<(), color_eyre::eyre::Error>(())
//! ```
//!
//! ## Scenario Format
//!
//! Scenarios use YAML. Every section is optional and falls back to its
//! defaults:
//!
//! ```yaml
//! general:
//!   node_count: 30
//!   stop_time: "15s"
//!   seed: 1
//! mac:
//!   rts_cts_threshold: 0
//! channel:
//!   loss:
//!     type: Range
//!     max_range: 50.0
//! rate:
//!   type: Constant
//!   data_rate: 6000000
//!   control_rate: 6000000
//! client:
//!   max_packets: 10
//!   interval: "1s"
//!   packet_size: 1024
//! ```
//!
//! ## Error Handling
//!
//! Library components report typed errors (`thiserror`). The binaries and
//! file I/O use `color_eyre` for reporting with context. Simulated network
//! failures are never errors: they show up as drop counters in the flow
//! statistics.

pub mod apps;
pub mod config;
pub mod config_loader;
pub mod flowmon;
pub mod ip;
pub mod scenario;
pub mod sim;
pub mod topology;
pub mod wifi;
