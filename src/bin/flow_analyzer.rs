//! Flow statistics analyzer.
//!
//! Reads statistics files written by `adhocsim` and reports per-flow
//! results and the lost-clients ratio. The `sweep` subcommand runs the
//! default scenario for a range of node counts in parallel.

use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use color_eyre::eyre::{bail, Context, Result};
use rayon::prelude::*;

use adhocsim::config::ScenarioConfig;
use adhocsim::flowmon::report::{client_loss, client_loss_csv, generate_text_report, read_report, summarize};
use adhocsim::scenario::Simulation;

#[derive(Parser)]
#[command(name = "flow-analyzer")]
#[command(about = "Flow statistics analysis for adhocsim runs")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Server port; flows from this port are echo replies, not clients
    #[arg(long, default_value = "9", global = true)]
    server_port: u16,

    /// Log level
    #[arg(long, default_value = "info", global = true)]
    log_level: String,

    /// Number of threads for sweeps (0 = auto)
    #[arg(short = 'j', long, default_value = "0", global = true)]
    threads: usize,
}

#[derive(Subcommand)]
enum Commands {
    /// Print per-flow results and the lost-clients ratio
    Summary {
        /// Statistics file (YAML or JSON)
        file: PathBuf,
    },

    /// Write a text report and CSV of the cumulative lost-clients ratio
    Report {
        /// Statistics file (YAML or JSON)
        file: PathBuf,

        /// Output directory
        #[arg(short, long, default_value = "analysis_output")]
        output: PathBuf,
    },

    /// Run the default scenario for every node count from 2 to max-nodes
    Sweep {
        #[arg(long, default_value = "30")]
        max_nodes: u32,

        /// Output directory for statistics files and the summary CSV
        #[arg(short, long, default_value = "sweep_output")]
        output: PathBuf,

        /// Base seed; every run uses the same seed
        #[arg(long, default_value = "1")]
        seed: u64,
    },
}

fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();

    // Initialize logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(&cli.log_level)).init();

    // Set thread pool size
    if cli.threads > 0 {
        rayon::ThreadPoolBuilder::new()
            .num_threads(cli.threads)
            .build_global()
            .context("Failed to configure thread pool")?;
    }

    match &cli.command {
        Commands::Summary { file } => run_summary(file, cli.server_port),
        Commands::Report { file, output } => run_report(file, output, cli.server_port),
        Commands::Sweep { max_nodes, output, seed } => run_sweep(*max_nodes, output, *seed, cli.server_port),
    }
}

fn run_summary(file: &Path, server_port: u16) -> Result<()> {
    let report = read_report(file).wrap_err_with(|| format!("Failed to load {}", file.display()))?;
    for flow in summarize(&report) {
        println!("Flow {} ({} --> {}): ", flow.flow_id, flow.source, flow.destination);
        println!("\tNumber of transmitted packets: {}", flow.tx_packets);
        println!("\tNumber of received packets: {}", flow.rx_packets);
        match flow.mean_delay_ms {
            Some(ms) => println!("\tMean Delay: {:.2} ms", ms),
            None => println!("\tMean Delay: None"),
        }
        println!("\tPacket Loss Ratio: {:.2} %", flow.packet_loss_percent);
    }
    let loss = client_loss(&report, server_port);
    println!(
        "Lost Clients Ratio: {:.2}% ({}/{})",
        loss.ratio_percent(),
        loss.lost_clients.len(),
        loss.total_clients
    );
    Ok(())
}

fn run_report(file: &Path, output: &Path, server_port: u16) -> Result<()> {
    let report = read_report(file).wrap_err_with(|| format!("Failed to load {}", file.display()))?;
    fs::create_dir_all(output).with_context(|| format!("Failed to create {}", output.display()))?;

    let text_path = output.join("flow_report.txt");
    fs::write(&text_path, generate_text_report(&report, server_port))
        .with_context(|| format!("Failed to write {}", text_path.display()))?;
    log::info!("Text report written to {}", text_path.display());

    let csv_path = output.join("lost_clients_ratio.csv");
    fs::write(&csv_path, client_loss_csv(&client_loss(&report, server_port)))
        .with_context(|| format!("Failed to write {}", csv_path.display()))?;
    log::info!("CSV written to {}", csv_path.display());
    Ok(())
}

fn run_sweep(max_nodes: u32, output: &Path, seed: u64, server_port: u16) -> Result<()> {
    if max_nodes < 2 {
        bail!("max-nodes must be at least 2, got {}", max_nodes);
    }
    fs::create_dir_all(output).with_context(|| format!("Failed to create {}", output.display()))?;

    log::info!("Sweeping {} node counts...", max_nodes - 1);
    let results: Vec<(u32, f64)> = (2..=max_nodes)
        .into_par_iter()
        .map(|nodes| -> Result<(u32, f64)> {
            let mut config = ScenarioConfig::default();
            config.general.node_count = nodes;
            config.general.seed = seed;
            config.general.verbose = false;
            config.server.port = server_port;

            let mut sim = Simulation::new(config).wrap_err_with(|| format!("Failed to set up {} nodes", nodes))?;
            sim.run();
            let path = output.join(format!("Data-{}.yaml", nodes));
            sim.serialize(&path)?;
            Ok((nodes, client_loss(&sim.report(), server_port).ratio_percent()))
        })
        .collect::<Result<Vec<_>>>()?;

    let mut csv = String::from("nodes,lost_clients_ratio_percent\n");
    for (nodes, ratio) in &results {
        let _ = writeln!(csv, "{},{:.2}", nodes, ratio);
    }
    let csv_path = output.join("sweep.csv");
    fs::write(&csv_path, csv).with_context(|| format!("Failed to write {}", csv_path.display()))?;
    log::info!("Sweep summary written to {}", csv_path.display());
    Ok(())
}
