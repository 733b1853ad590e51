//! Scenario configuration.
//!
//! Every component gets an explicit configuration struct with documented
//! defaults. The defaults reproduce the reference scenario: 30 nodes on a
//! 3-wide grid, an echo server on node 0 and an echo client on every other
//! node, run for 15 simulated seconds.

use serde::{Deserialize, Serialize};
use std::net::{Ipv4Addr, SocketAddrV4};
use std::path::PathBuf;
use std::time::Duration;

use crate::flowmon::FlowMonitorConfig;
use crate::ip::Ipv4AddressAllocator;
use crate::topology::Placement;
use crate::wifi::{ChannelConfig, LossModel, MacParameters, RateControl};

/// Top-level configuration structure that mirrors the YAML scenario file.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ScenarioConfig {
    pub general: GeneralConfig,
    pub topology: TopologyConfig,
    pub channel: ChannelConfig,
    pub mac: MacParameters,
    pub rate: RateControl,
    pub addressing: AddressingConfig,
    pub server: ServerConfig,
    pub client: ClientConfig,
    pub flow_monitor: FlowMonitorConfig,
}

/// Run-wide settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Number of nodes, ids 0..node_count.
    pub node_count: u32,
    /// Simulated time at which the run stops (e.g. "15s").
    #[serde(with = "humantime_serde")]
    pub stop_time: Duration,
    /// Seed for backoff draws and random loss.
    pub seed: u64,
    /// Log echo application activity at info level.
    pub verbose: bool,
    /// Statistics file. `.json` selects JSON, anything else YAML.
    pub output: PathBuf,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            node_count: 30,
            stop_time: Duration::from_secs(15),
            seed: 1,
            verbose: true,
            output: PathBuf::from("Data.yaml"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TopologyConfig {
    pub placement: Placement,
}

/// Subnet all devices are numbered from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AddressingConfig {
    pub base: Ipv4Addr,
    pub mask: Ipv4Addr,
}

impl Default for AddressingConfig {
    fn default() -> Self {
        Self { base: Ipv4Addr::new(10, 1, 1, 0), mask: Ipv4Addr::new(255, 255, 255, 0) }
    }
}

/// Echo server placement and activity window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub node: u32,
    pub port: u16,
    #[serde(with = "humantime_serde")]
    pub start: Duration,
    #[serde(with = "humantime_serde")]
    pub stop: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { node: 0, port: 9, start: Duration::from_secs(1), stop: Duration::from_secs(10) }
    }
}

/// Echo client settings, shared by every node other than the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// 0 sends until the client stops.
    pub max_packets: u32,
    #[serde(with = "humantime_serde")]
    pub interval: Duration,
    /// UDP payload bytes.
    pub packet_size: u32,
    #[serde(with = "humantime_serde")]
    pub start: Duration,
    #[serde(with = "humantime_serde")]
    pub stop: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            max_packets: 10,
            interval: Duration::from_secs(1),
            packet_size: 1024,
            start: Duration::from_secs(2),
            stop: Duration::from_secs(10),
        }
    }
}

/// Largest UDP payload that fits an IPv4 packet.
pub const MAX_UDP_PAYLOAD: u32 = 65_507;

/// Configuration validation errors
#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    #[error("Invalid general configuration: {0}")]
    InvalidGeneral(String),
    #[error("Invalid topology configuration: {0}")]
    InvalidTopology(String),
    #[error("Invalid channel configuration: {0}")]
    InvalidChannel(String),
    #[error("Invalid MAC configuration: {0}")]
    InvalidMac(String),
    #[error("Invalid addressing configuration: {0}")]
    InvalidAddressing(String),
    #[error("Invalid application configuration: {0}")]
    InvalidApplication(String),
    #[error("Invalid flow monitor configuration: {0}")]
    InvalidFlowMonitor(String),
}

impl ScenarioConfig {
    /// Server address once addresses are assigned in node order.
    pub fn server_address(&self) -> SocketAddrV4 {
        let host = u32::from(self.addressing.base) + self.server.node + 1;
        SocketAddrV4::new(Ipv4Addr::from(host), self.server.port)
    }

    /// Check the configuration before any simulation is built.
    pub fn validate(&self) -> Result<(), ValidationError> {
        let general = &self.general;
        if general.node_count == 0 {
            return Err(ValidationError::InvalidGeneral("node_count must be at least 1".to_string()));
        }
        if general.stop_time.is_zero() {
            return Err(ValidationError::InvalidGeneral("stop_time must be positive".to_string()));
        }
        if general.output.as_os_str().is_empty() {
            return Err(ValidationError::InvalidGeneral("output path cannot be empty".to_string()));
        }

        match &self.topology.placement {
            Placement::Grid(grid) => {
                if grid.grid_width == 0 {
                    return Err(ValidationError::InvalidTopology("grid_width must be at least 1".to_string()));
                }
            }
            Placement::List { positions } => {
                if positions.len() < general.node_count as usize {
                    return Err(ValidationError::InvalidTopology(format!(
                        "{} positions listed for {} nodes",
                        positions.len(),
                        general.node_count
                    )));
                }
            }
        }

        self.validate_channel()?;
        self.validate_mac()?;

        Ipv4AddressAllocator::new(self.addressing.base, self.addressing.mask)
            .map_err(|e| ValidationError::InvalidAddressing(e.to_string()))?;

        if self.server.node >= general.node_count {
            return Err(ValidationError::InvalidApplication(format!(
                "server node {} does not exist in a {}-node scenario",
                self.server.node, general.node_count
            )));
        }
        if self.server.start >= self.server.stop {
            return Err(ValidationError::InvalidApplication("server start must be before stop".to_string()));
        }
        let client = &self.client;
        if client.start >= client.stop {
            return Err(ValidationError::InvalidApplication("client start must be before stop".to_string()));
        }
        if client.interval.is_zero() {
            return Err(ValidationError::InvalidApplication("client interval must be positive".to_string()));
        }
        if client.packet_size > MAX_UDP_PAYLOAD {
            return Err(ValidationError::InvalidApplication(format!(
                "packet_size {} exceeds the UDP maximum of {}",
                client.packet_size, MAX_UDP_PAYLOAD
            )));
        }

        let monitor = &self.flow_monitor;
        if monitor.delay_bin_width.is_zero() || monitor.jitter_bin_width.is_zero() || monitor.packet_size_bin_width == 0 {
            return Err(ValidationError::InvalidFlowMonitor("histogram bin widths must be positive".to_string()));
        }

        Ok(())
    }

    fn validate_channel(&self) -> Result<(), ValidationError> {
        let crate::wifi::PropagationDelayModel::ConstantSpeed { speed } = self.channel.propagation_delay;
        if !(speed.is_finite() && speed > 0.0) {
            return Err(ValidationError::InvalidChannel(format!("propagation speed {} must be positive", speed)));
        }
        match self.channel.loss {
            LossModel::Lossless => {}
            LossModel::Range { max_range } => {
                if !(max_range.is_finite() && max_range >= 0.0) {
                    return Err(ValidationError::InvalidChannel(format!("max_range {} is not a distance", max_range)));
                }
            }
            LossModel::Random { drop_probability } => {
                if !(0.0..=1.0).contains(&drop_probability) {
                    return Err(ValidationError::InvalidChannel(format!(
                        "drop_probability {} outside [0, 1]",
                        drop_probability
                    )));
                }
            }
        }
        Ok(())
    }

    fn validate_mac(&self) -> Result<(), ValidationError> {
        let mac = &self.mac;
        if mac.slot.is_zero() {
            return Err(ValidationError::InvalidMac("slot must be positive".to_string()));
        }
        if mac.cw_min > mac.cw_max {
            return Err(ValidationError::InvalidMac(format!(
                "cw_min {} is larger than cw_max {}",
                mac.cw_min, mac.cw_max
            )));
        }
        if mac.retry_limit == 0 {
            return Err(ValidationError::InvalidMac("retry_limit must be at least 1".to_string()));
        }
        if mac.queue_limit == 0 {
            return Err(ValidationError::InvalidMac("queue_limit must be at least 1".to_string()));
        }
        let RateControl::Constant { data_rate, control_rate } = self.rate;
        if data_rate == 0 || control_rate == 0 {
            return Err(ValidationError::InvalidMac("rates must be positive".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::topology::GridPositionAllocator;

    #[test]
    fn test_defaults_match_reference_scenario() {
        let config = ScenarioConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.general.node_count, 30);
        assert_eq!(config.general.stop_time, Duration::from_secs(15));
        assert_eq!(config.mac.rts_cts_threshold, 0);
        assert_eq!(config.server_address(), "10.1.1.1:9".parse().unwrap());
        assert_eq!(config.client.max_packets, 10);
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let yaml = r#"
general:
  node_count: 5
  stop_time: "20s"
mac:
  rts_cts_threshold: 500
  slot: "20us"
channel:
  loss:
    type: Range
    max_range: 25.0
topology:
  placement:
    type: Grid
    grid_width: 5
"#;
        let config: ScenarioConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.general.node_count, 5);
        assert_eq!(config.general.stop_time, Duration::from_secs(20));
        assert_eq!(config.general.seed, 1);
        assert_eq!(config.mac.rts_cts_threshold, 500);
        assert_eq!(config.mac.slot, Duration::from_micros(20));
        assert_eq!(config.mac.cw_min, 15);
        assert_eq!(config.channel.loss, LossModel::Range { max_range: 25.0 });
        assert_eq!(
            config.topology.placement,
            Placement::Grid(GridPositionAllocator { grid_width: 5, ..GridPositionAllocator::default() })
        );
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validation_errors() {
        let mut config = ScenarioConfig::default();
        config.general.node_count = 0;
        assert!(matches!(config.validate(), Err(ValidationError::InvalidGeneral(_))));

        let mut config = ScenarioConfig::default();
        config.client.interval = Duration::ZERO;
        assert!(matches!(config.validate(), Err(ValidationError::InvalidApplication(_))));

        let mut config = ScenarioConfig::default();
        config.general.node_count = 1;
        config.server.node = 1;
        assert!(matches!(config.validate(), Err(ValidationError::InvalidApplication(_))));

        let mut config = ScenarioConfig::default();
        config.addressing.mask = Ipv4Addr::new(255, 0, 255, 0);
        assert!(matches!(config.validate(), Err(ValidationError::InvalidAddressing(_))));

        let mut config = ScenarioConfig::default();
        config.topology.placement = Placement::Grid(GridPositionAllocator { grid_width: 0, ..Default::default() });
        assert!(matches!(config.validate(), Err(ValidationError::InvalidTopology(_))));

        let mut config = ScenarioConfig::default();
        config.channel.loss = LossModel::Random { drop_probability: 1.5 };
        assert!(matches!(config.validate(), Err(ValidationError::InvalidChannel(_))));

        let mut config = ScenarioConfig::default();
        config.mac.cw_min = 2048;
        assert!(matches!(config.validate(), Err(ValidationError::InvalidMac(_))));

        let mut config = ScenarioConfig::default();
        config.flow_monitor.packet_size_bin_width = 0;
        assert!(matches!(config.validate(), Err(ValidationError::InvalidFlowMonitor(_))));
    }

    #[test]
    fn test_flow_monitor_bin_widths_from_yaml() {
        let yaml = "flow_monitor:\n  delay_bin_width: \"500us\"\n  packet_size_bin_width: 64\n";
        let config: ScenarioConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.flow_monitor.delay_bin_width, Duration::from_micros(500));
        assert_eq!(config.flow_monitor.jitter_bin_width, Duration::from_millis(1));
        assert_eq!(config.flow_monitor.packet_size_bin_width, 64);
        assert!(config.validate().is_ok());
    }
}
