use crate::config::ScenarioConfig;
use color_eyre::eyre::WrapErr;
use color_eyre::Result;
use log::info;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Load and parse a scenario from a YAML file
pub fn load_config(config_path: &Path) -> Result<ScenarioConfig> {
    info!("Loading scenario from: {:?}", config_path);

    let file = File::open(config_path)
        .wrap_err_with(|| format!("Failed to open scenario file {}", config_path.display()))?;

    let config: ScenarioConfig = serde_yaml::from_reader(file)
        .wrap_err_with(|| format!("Failed to parse scenario file {}", config_path.display()))?;

    config.validate()?;

    Ok(config)
}

/// Command-line values that take precedence over the scenario file
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub node_count: Option<u32>,
    pub verbose: Option<bool>,
    pub seed: Option<u64>,
    pub stop_time: Option<Duration>,
    pub output: Option<PathBuf>,
}

/// Apply CLI overrides to a scenario and validate the result
pub fn apply_overrides(config: &mut ScenarioConfig, overrides: &CliOverrides) -> Result<()> {
    if let Some(nodes) = overrides.node_count {
        info!("Overriding node count: {}", nodes);
        config.general.node_count = nodes;
    }
    if let Some(verbose) = overrides.verbose {
        config.general.verbose = verbose;
    }
    if let Some(seed) = overrides.seed {
        info!("Overriding seed: {}", seed);
        config.general.seed = seed;
    }
    if let Some(stop_time) = overrides.stop_time {
        info!("Overriding stop time: {}", humantime_serde::re::humantime::format_duration(stop_time));
        config.general.stop_time = stop_time;
    }
    if let Some(output) = &overrides.output {
        config.general.output = output.clone();
    }

    config.validate()?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_load_scenario() {
        let yaml = r#"
general:
  node_count: 4
  stop_time: "12s"
client:
  max_packets: 3
"#;

        let mut temp_file = NamedTempFile::new().unwrap();
        write!(temp_file, "{}", yaml).unwrap();

        let config = load_config(temp_file.path()).unwrap();
        assert_eq!(config.general.node_count, 4);
        assert_eq!(config.client.max_packets, 3);
        assert_eq!(config.client.packet_size, 1024);
    }

    #[test]
    fn test_load_channel_and_rate_models() {
        use crate::wifi::{LossModel, PropagationDelayModel, RateControl};

        let yaml = r#"
channel:
  propagation_delay:
    type: ConstantSpeed
    speed: 200000000.0
  loss:
    type: Random
    drop_probability: 0.25
rate:
  type: Constant
  data_rate: 12000000
  control_rate: 6000000
"#;

        let mut temp_file = NamedTempFile::new().unwrap();
        write!(temp_file, "{}", yaml).unwrap();

        let config = load_config(temp_file.path()).unwrap();
        assert_eq!(config.channel.propagation_delay, PropagationDelayModel::ConstantSpeed { speed: 2.0e8 });
        assert_eq!(config.channel.loss, LossModel::Random { drop_probability: 0.25 });
        assert_eq!(config.rate, RateControl::Constant { data_rate: 12_000_000, control_rate: 6_000_000 });

        let mut temp_file = NamedTempFile::new().unwrap();
        write!(temp_file, "channel:\n  loss:\n    type: Lossless\n").unwrap();
        assert_eq!(load_config(temp_file.path()).unwrap().channel.loss, LossModel::Lossless);
    }

    #[test]
    fn test_invalid_scenario_is_rejected() {
        let mut temp_file = NamedTempFile::new().unwrap();
        write!(temp_file, "general:\n  node_count: 0\n").unwrap();
        assert!(load_config(temp_file.path()).is_err());

        let mut temp_file = NamedTempFile::new().unwrap();
        write!(temp_file, "general: [not, a, map]\n").unwrap();
        assert!(load_config(temp_file.path()).is_err());
    }

    #[test]
    fn test_apply_overrides() {
        let mut config = ScenarioConfig::default();
        let overrides = CliOverrides {
            node_count: Some(2),
            verbose: Some(false),
            stop_time: Some(Duration::from_secs(20)),
            ..CliOverrides::default()
        };
        apply_overrides(&mut config, &overrides).unwrap();
        assert_eq!(config.general.node_count, 2);
        assert!(!config.general.verbose);
        assert_eq!(config.general.stop_time, Duration::from_secs(20));
        assert_eq!(config.general.seed, 1);

        let bad = CliOverrides { node_count: Some(0), ..CliOverrides::default() };
        assert!(apply_overrides(&mut config, &bad).is_err());
    }
}
