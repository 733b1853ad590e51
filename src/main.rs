use clap::Parser;
use color_eyre::eyre::WrapErr;
use color_eyre::Result;
use env_logger::Env;
use log::info;
use std::path::PathBuf;
use std::time::Duration;

use adhocsim::apps::{CLIENT_LOG_TARGET, SERVER_LOG_TARGET};
use adhocsim::config::ScenarioConfig;
use adhocsim::config_loader::{self, CliOverrides};
use adhocsim::scenario::Simulation;

/// Discrete-event simulation of a wireless ad-hoc network with UDP echo traffic
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Number of nodes (default 30)
    #[arg(long = "numNodes", visible_alias = "num-nodes")]
    num_nodes: Option<u32>,

    /// Log echo application activity (default true)
    #[arg(long)]
    verbose: Option<bool>,

    /// Optional YAML scenario file; command-line values take precedence
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Statistics file (default Data.yaml; a .json extension writes JSON)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Seed for backoff and random loss (default 1)
    #[arg(long)]
    seed: Option<u64>,

    /// Simulated stop time, e.g. "15s" (default 15s)
    #[arg(long, value_parser = humantime_serde::re::humantime::parse_duration)]
    stop_time: Option<Duration>,
}

impl Args {
    fn overrides(&self) -> CliOverrides {
        CliOverrides {
            node_count: self.num_nodes,
            verbose: self.verbose,
            seed: self.seed,
            stop_time: self.stop_time,
            output: self.output.clone(),
        }
    }
}

/// Default log filter. Verbose runs show the echo applications only;
/// `RUST_LOG` still takes precedence.
fn log_filter(verbose: bool) -> String {
    if verbose {
        format!("warn,{}=info,{}=info", CLIENT_LOG_TARGET, SERVER_LOG_TARGET)
    } else {
        "warn".to_string()
    }
}

fn main() -> Result<()> {
    // Initialize error handling
    color_eyre::install()?;

    let args = Args::parse();

    env_logger::Builder::from_env(Env::default().default_filter_or(log_filter(args.verbose.unwrap_or(true)))).init();

    let mut config = match &args.config {
        Some(path) => config_loader::load_config(path)?,
        None => ScenarioConfig::default(),
    };
    config_loader::apply_overrides(&mut config, &args.overrides()).wrap_err("Invalid scenario")?;

    info!("Nodes: {}", config.general.node_count);
    info!("Statistics file: {:?}", config.general.output);

    let output = config.general.output.clone();
    let mut sim = Simulation::new(config).wrap_err("Failed to set up the simulation")?;
    sim.run();
    sim.serialize(&output)?;

    for client in sim.clients() {
        log::debug!("{} ({}) sent {} received {}", client.node, client.address, client.sent, client.received);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parsing() {
        let args = Args::parse_from(["adhocsim", "--numNodes=2", "--verbose=false"]);
        assert_eq!(args.num_nodes, Some(2));
        assert_eq!(args.verbose, Some(false));
        assert!(args.config.is_none());
        assert!(args.output.is_none());
    }

    #[test]
    fn test_cli_alias_and_durations() {
        let args = Args::parse_from([
            "adhocsim",
            "--num-nodes", "5",
            "--stop-time", "20s",
            "--output", "stats.json",
            "--seed", "7",
        ]);
        let overrides = args.overrides();
        assert_eq!(overrides.node_count, Some(5));
        assert_eq!(overrides.stop_time, Some(Duration::from_secs(20)));
        assert_eq!(overrides.output, Some(PathBuf::from("stats.json")));
        assert_eq!(overrides.seed, Some(7));
        assert_eq!(overrides.verbose, None);
    }

    #[test]
    fn test_verbose_enables_echo_targets_only() {
        assert_eq!(log_filter(true), "warn,udp_echo_client=info,udp_echo_server=info");
        assert_eq!(log_filter(false), "warn");
    }

    #[test]
    fn test_malformed_values_are_rejected() {
        assert!(Args::try_parse_from(["adhocsim", "--numNodes=abc"]).is_err());
        assert!(Args::try_parse_from(["adhocsim", "--verbose=maybe"]).is_err());
        assert!(Args::try_parse_from(["adhocsim", "--stop-time", "soon"]).is_err());
    }
}
