//! Post-run analysis of a statistics file.
//!
//! Reads a document written by [`write_report`](super::write_report) and
//! derives per-flow summaries and the lost-clients ratio: the share of
//! echo clients with at least one lost request. Generates a plain text
//! report and CSV rows of the ratio as flows are added one by one.

use std::collections::BTreeSet;
use std::fmt::Write as _;
use std::fs;
use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};

use super::monitor::{FlowMonitorReport, FlowRecord};

#[derive(Debug, thiserror::Error)]
pub enum ReportError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse YAML statistics: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("failed to parse JSON statistics: {0}")]
    Json(#[from] serde_json::Error),
}

/// Load a statistics file, choosing the format by extension.
pub fn read_report(path: &Path) -> Result<FlowMonitorReport, ReportError> {
    let contents = fs::read_to_string(path).map_err(|source| ReportError::Io { path: path.to_path_buf(), source })?;
    if path.extension().is_some_and(|ext| ext.eq_ignore_ascii_case("json")) {
        Ok(serde_json::from_str(&contents)?)
    } else {
        Ok(serde_yaml::from_str(&contents)?)
    }
}

/// One line of the flow summary.
#[derive(Debug, Clone, PartialEq)]
pub struct FlowSummary {
    pub flow_id: u32,
    pub source: String,
    pub destination: String,
    pub tx_packets: u64,
    pub rx_packets: u64,
    pub mean_delay_ms: Option<f64>,
    pub packet_loss_percent: f64,
}

impl FlowSummary {
    fn from_record(record: &FlowRecord) -> Self {
        let key = &record.key;
        let stats = &record.stats;
        Self {
            flow_id: record.flow_id,
            source: format!("{}/{}", key.source_address, key.source_port),
            destination: format!("{}/{}", key.destination_address, key.destination_port),
            tx_packets: stats.tx_packets,
            rx_packets: stats.rx_packets,
            mean_delay_ms: record.metrics.mean_delay_secs.map(|s| s * 1e3),
            packet_loss_percent: record.metrics.loss_ratio * 100.0,
        }
    }
}

pub fn summarize(report: &FlowMonitorReport) -> Vec<FlowSummary> {
    report.flows.iter().map(FlowSummary::from_record).collect()
}

/// Lost-clients ratio after each flow, in flow id order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClientLoss {
    /// `(flow_id, percent)` starting from the second flow.
    pub cumulative: Vec<(u32, f64)>,
    pub lost_clients: BTreeSet<Ipv4Addr>,
    pub total_clients: usize,
}

impl ClientLoss {
    pub fn ratio_percent(&self) -> f64 {
        if self.total_clients == 0 {
            0.0
        } else {
            self.lost_clients.len() as f64 / self.total_clients as f64 * 100.0
        }
    }
}

/// Count request flows (source port other than `server_port`) and the
/// distinct client addresses among them that lost packets.
pub fn client_loss(report: &FlowMonitorReport, server_port: u16) -> ClientLoss {
    let mut loss = ClientLoss::default();
    for (seen, record) in report.flows.iter().enumerate() {
        if record.key.source_port != server_port {
            loss.total_clients += 1;
            if record.stats.lost_packets != 0 {
                loss.lost_clients.insert(record.key.source_address);
            }
        }
        if seen >= 1 && loss.total_clients > 0 {
            loss.cumulative.push((record.flow_id, loss.ratio_percent()));
        }
    }
    loss
}

/// CSV rows of the cumulative lost-clients ratio, header first.
pub fn client_loss_csv(loss: &ClientLoss) -> String {
    let mut out = String::from("flow_id,lost_clients_ratio_percent\n");
    for (flow_id, ratio) in &loss.cumulative {
        let _ = writeln!(out, "{},{:.2}", flow_id, ratio);
    }
    out
}

/// Human readable report.
pub fn generate_text_report(report: &FlowMonitorReport, server_port: u16) -> String {
    let mut lines: Vec<String> = Vec::new();

    lines.push("=".repeat(80));
    lines.push("                       AD-HOC NETWORK FLOW STATISTICS".to_string());
    lines.push("=".repeat(80));
    lines.push(String::new());

    let meta = &report.metadata;
    lines.push(format!("Generated: {}", meta.generated_at.to_rfc3339()));
    lines.push(format!("Simulator: adhocsim {}", meta.simulator_version));
    lines.push(format!("Nodes: {}", meta.node_count));
    lines.push(format!("Seed: {}", meta.seed));
    lines.push(format!("Stop time: {}", meta.stop_time));
    lines.push(format!("Flows: {}", report.flows.len()));
    lines.push(String::new());

    lines.push("-".repeat(80));
    lines.push("Per-flow results".to_string());
    lines.push("-".repeat(80));
    for flow in summarize(report) {
        lines.push(format!("Flow {} ({} --> {}):", flow.flow_id, flow.source, flow.destination));
        lines.push(format!("\tNumber of transmitted packets: {}", flow.tx_packets));
        lines.push(format!("\tNumber of received packets: {}", flow.rx_packets));
        match flow.mean_delay_ms {
            Some(ms) => lines.push(format!("\tMean Delay: {:.2} ms", ms)),
            None => lines.push("\tMean Delay: None".to_string()),
        }
        lines.push(format!("\tPacket Loss Ratio: {:.2} %", flow.packet_loss_percent));
    }
    lines.push(String::new());

    let loss = client_loss(report, server_port);
    lines.push("-".repeat(80));
    lines.push("Lost clients".to_string());
    lines.push("-".repeat(80));
    lines.push(format!(
        "Lost Clients Ratio: {:.2}% ({}/{})",
        loss.ratio_percent(),
        loss.lost_clients.len(),
        loss.total_clients
    ));
    let lost: Vec<String> = loss.lost_clients.iter().map(|a| a.to_string()).collect();
    lines.push(format!("Lost clients: [{}]", lost.join(", ")));
    lines.push(String::new());

    lines.join("\n")
}
