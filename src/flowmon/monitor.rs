//! Per-flow statistics.
//!
//! The monitor classifies every datagram by its five-tuple, assigns flow
//! ids in order of first observation and accumulates counters as the
//! stack reports sends, receives and drops. Flows are never removed;
//! after the run the table is finalized and written out once.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::net::Ipv4Addr;
use std::path::Path;
use std::time::Duration;

use color_eyre::eyre::{Result, WrapErr};

use super::probe::{DropReason, PacketTap};
use crate::ip::Datagram;
use crate::sim::SimTime;

/// Flow identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct FlowKey {
    pub source_address: Ipv4Addr,
    pub destination_address: Ipv4Addr,
    pub source_port: u16,
    pub destination_port: u16,
    pub protocol: u8,
}

impl FlowKey {
    pub fn of(datagram: &Datagram) -> Self {
        Self {
            source_address: *datagram.src.ip(),
            destination_address: *datagram.dst.ip(),
            source_port: datagram.src.port(),
            destination_port: datagram.dst.port(),
            protocol: datagram.protocol(),
        }
    }
}

/// Drops of one reason within a flow.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DropCount {
    pub packets: u64,
    pub bytes: u64,
}

/// Fixed-width histogram. Only non-empty bins are kept; bin `i` covers
/// `[i * bin_width, (i + 1) * bin_width)`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Histogram {
    pub bin_width: u64,
    pub bins: BTreeMap<u64, u64>,
}

impl Histogram {
    pub fn new(bin_width: u64) -> Self {
        Self { bin_width, bins: BTreeMap::new() }
    }

    pub fn add(&mut self, value: u64) {
        *self.bins.entry(value / self.bin_width.max(1)).or_default() += 1;
    }

    /// Count in the bin that holds `value`.
    pub fn count_at(&self, value: u64) -> u64 {
        self.bins.get(&(value / self.bin_width.max(1))).copied().unwrap_or(0)
    }

    pub fn total(&self) -> u64 {
        self.bins.values().sum()
    }
}

/// Histogram bin widths for every flow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FlowMonitorConfig {
    /// Delay bin width (default 1ms).
    #[serde(with = "humantime_serde")]
    pub delay_bin_width: Duration,
    /// Jitter bin width (default 1ms).
    #[serde(with = "humantime_serde")]
    pub jitter_bin_width: Duration,
    /// Packet size bin width in bytes (default 20).
    pub packet_size_bin_width: u32,
}

impl Default for FlowMonitorConfig {
    fn default() -> Self {
        Self {
            delay_bin_width: Duration::from_millis(1),
            jitter_bin_width: Duration::from_millis(1),
            packet_size_bin_width: 20,
        }
    }
}

/// Raw counters. Times are nanoseconds of simulated time.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowStats {
    pub tx_packets: u64,
    pub rx_packets: u64,
    pub tx_bytes: u64,
    pub rx_bytes: u64,
    pub lost_packets: u64,
    pub delay_sum: SimTime,
    pub jitter_sum: SimTime,
    pub last_delay: Option<SimTime>,
    pub time_first_tx: Option<SimTime>,
    pub time_last_tx: Option<SimTime>,
    pub time_first_rx: Option<SimTime>,
    pub time_last_rx: Option<SimTime>,
    pub drops: BTreeMap<DropReason, DropCount>,
    /// Delay of received packets, in nanoseconds.
    #[serde(default)]
    pub delay_histogram: Histogram,
    /// Jitter between consecutive received packets, in nanoseconds.
    #[serde(default)]
    pub jitter_histogram: Histogram,
    /// IP size of received packets, in bytes.
    #[serde(default)]
    pub packet_size_histogram: Histogram,
}

/// Values computed from [`FlowStats`] at serialization time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct FlowMetrics {
    /// Received bits per second over first transmit to last receive.
    pub throughput_bps: f64,
    pub mean_delay_secs: Option<f64>,
    pub mean_jitter_secs: Option<f64>,
    /// Fraction of transmitted packets never received.
    pub loss_ratio: f64,
}

impl FlowStats {
    fn with_histograms(config: &FlowMonitorConfig) -> Self {
        let nanos = |d: Duration| u64::try_from(d.as_nanos()).unwrap_or(u64::MAX);
        Self {
            delay_histogram: Histogram::new(nanos(config.delay_bin_width)),
            jitter_histogram: Histogram::new(nanos(config.jitter_bin_width)),
            packet_size_histogram: Histogram::new(u64::from(config.packet_size_bin_width)),
            ..Self::default()
        }
    }

    pub fn metrics(&self) -> FlowMetrics {
        let throughput_bps = match (self.time_first_tx, self.time_last_rx) {
            (Some(first), Some(last)) if last > first => {
                self.rx_bytes as f64 * 8.0 / (last - first).as_secs_f64()
            }
            _ => 0.0,
        };
        let mean_delay_secs = (self.rx_packets > 0).then(|| self.delay_sum.as_secs_f64() / self.rx_packets as f64);
        let mean_jitter_secs =
            (self.rx_packets > 1).then(|| self.jitter_sum.as_secs_f64() / (self.rx_packets - 1) as f64);
        let loss_ratio = if self.tx_packets == 0 {
            0.0
        } else {
            self.tx_packets.saturating_sub(self.rx_packets) as f64 / self.tx_packets as f64
        };
        FlowMetrics { throughput_bps, mean_delay_secs, mean_jitter_secs, loss_ratio }
    }
}

/// One entry of the serialized flow list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowRecord {
    pub flow_id: u32,
    pub key: FlowKey,
    pub stats: FlowStats,
    pub metrics: FlowMetrics,
}

/// Run-level information written alongside the flows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunMetadata {
    pub generated_at: DateTime<Utc>,
    pub simulator_version: String,
    pub node_count: u32,
    pub seed: u64,
    pub stop_time: SimTime,
    pub events_executed: u64,
}

/// The whole statistics document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowMonitorReport {
    pub metadata: RunMetadata,
    pub flows: Vec<FlowRecord>,
}

#[derive(Debug, Clone, Copy)]
struct InFlight {
    flow: usize,
    sent_at: SimTime,
}

/// Passive flow statistics collector.
#[derive(Debug, Default)]
pub struct FlowMonitor {
    config: FlowMonitorConfig,
    classifier: HashMap<FlowKey, usize>,
    flows: Vec<(FlowKey, FlowStats)>,
    in_flight: HashMap<u64, InFlight>,
}

impl FlowMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: FlowMonitorConfig) -> Self {
        Self { config, ..Self::default() }
    }

    fn classify(&mut self, datagram: &Datagram) -> usize {
        let key = FlowKey::of(datagram);
        if let Some(&index) = self.classifier.get(&key) {
            return index;
        }
        let index = self.flows.len();
        self.flows.push((key, FlowStats::with_histograms(&self.config)));
        self.classifier.insert(key, index);
        log::trace!("New flow {}: {:?}", index + 1, key);
        index
    }

    pub fn flow_count(&self) -> usize {
        self.flows.len()
    }

    /// Flows in id order. Ids start at 1.
    pub fn flows(&self) -> impl Iterator<Item = (u32, &FlowKey, &FlowStats)> {
        self.flows.iter().enumerate().map(|(i, (key, stats))| (i as u32 + 1, key, stats))
    }

    /// Settle loss counters. Packets still in flight count as lost.
    pub fn finalize(&mut self, now: SimTime) {
        for (_, stats) in &mut self.flows {
            stats.lost_packets = stats.tx_packets.saturating_sub(stats.rx_packets);
        }
        log::debug!(
            "Flow monitor finalized at {}: {} flows, {} packets still in flight",
            now,
            self.flows.len(),
            self.in_flight.len()
        );
    }

    pub fn records(&self) -> Vec<FlowRecord> {
        self.flows()
            .map(|(flow_id, key, stats)| FlowRecord { flow_id, key: *key, stats: stats.clone(), metrics: stats.metrics() })
            .collect()
    }

    pub fn report(&self, metadata: RunMetadata) -> FlowMonitorReport {
        FlowMonitorReport { metadata, flows: self.records() }
    }
}

impl PacketTap for FlowMonitor {
    fn on_send(&mut self, now: SimTime, datagram: &Datagram) {
        let flow = self.classify(datagram);
        let stats = &mut self.flows[flow].1;
        stats.tx_packets += 1;
        stats.tx_bytes += u64::from(datagram.ip_size());
        stats.time_first_tx.get_or_insert(now);
        stats.time_last_tx = Some(now);
        self.in_flight.insert(datagram.uid, InFlight { flow, sent_at: now });
    }

    fn on_receive(&mut self, now: SimTime, datagram: &Datagram) {
        // Unknown or duplicate uids carry no send time to measure against.
        let Some(InFlight { flow, sent_at }) = self.in_flight.remove(&datagram.uid) else {
            return;
        };
        let stats = &mut self.flows[flow].1;
        let delay = now - sent_at;
        stats.rx_packets += 1;
        stats.rx_bytes += u64::from(datagram.ip_size());
        stats.delay_sum += delay;
        stats.delay_histogram.add(delay.as_nanos());
        if let Some(last) = stats.last_delay {
            let jitter = if delay > last { delay - last } else { last - delay };
            stats.jitter_sum += jitter;
            stats.jitter_histogram.add(jitter.as_nanos());
        }
        stats.packet_size_histogram.add(u64::from(datagram.ip_size()));
        stats.last_delay = Some(delay);
        stats.time_first_rx.get_or_insert(now);
        stats.time_last_rx = Some(now);
    }

    fn on_drop(&mut self, _now: SimTime, datagram: &Datagram, reason: DropReason) {
        let flow = self.classify(datagram);
        if reason.is_loss() {
            self.in_flight.remove(&datagram.uid);
        }
        let count = self.flows[flow].1.drops.entry(reason).or_default();
        count.packets += 1;
        count.bytes += u64::from(datagram.ip_size());
    }
}

/// Write `report` to `path`: JSON if the path ends in `.json`, YAML
/// otherwise.
pub fn write_report(report: &FlowMonitorReport, path: &Path) -> Result<()> {
    let is_json = path.extension().is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
    let contents = if is_json {
        serde_json::to_string_pretty(report).wrap_err("Failed to serialize flow statistics to JSON")?
    } else {
        serde_yaml::to_string(report).wrap_err("Failed to serialize flow statistics to YAML")?
    };
    fs::write(path, contents).wrap_err_with(|| format!("Failed to write flow statistics to {}", path.display()))?;
    log::info!("Flow statistics for {} flows written to {}", report.flows.len(), path.display());
    Ok(())
}
