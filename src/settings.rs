//! Layered configuration: defaults, optional TOML file, environment, CLI.
//!
//! ```toml
//! [pipeline]
//! frame_interval = "33ms"
//! history_capacity = 30
//!
//! [thresholds]
//! medium = 5.0
//! high = 15.0
//!
//! [dwell]
//! green_high = "15s"
//! red_high = "35s"
//!
//! [server]
//! listen_addr = "0.0.0.0:8765"
//! wire_format = "cbor"
//! ```
//!
//! Environment variables use the `SIGNALWATCH` prefix and `__` between
//! sections, e.g. `SIGNALWATCH__SERVER__LISTEN_ADDR=0.0.0.0:9000`.

use std::path::Path;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use config::{Config, Environment, File};
use serde::{Deserialize, Deserializer};
use signalwatch_core::{
    CongestionThresholds, DwellTimes, LevelDurations, PipelineConfig, WireFormat,
    DEFAULT_HISTORY_CAPACITY,
};

use crate::duration;

pub const ENV_PREFIX: &str = "SIGNALWATCH";

#[derive(Debug, Clone, PartialEq, Deserialize, Default)]
#[serde(default)]
pub struct Settings {
    pub pipeline: PipelineSettings,
    pub thresholds: ThresholdSettings,
    pub dwell: DwellSettings,
    pub server: ServerSettings,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct PipelineSettings {
    #[serde(deserialize_with = "duration::deserialize")]
    pub frame_interval: Duration,
    pub history_capacity: usize,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        let defaults = PipelineConfig::default();
        Self {
            frame_interval: defaults.frame_interval,
            history_capacity: DEFAULT_HISTORY_CAPACITY,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ThresholdSettings {
    pub medium: f64,
    pub high: f64,
}

impl Default for ThresholdSettings {
    fn default() -> Self {
        let defaults = CongestionThresholds::default();
        Self {
            medium: defaults.medium,
            high: defaults.high,
        }
    }
}

/// Dwell time per phase and congestion level.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct DwellSettings {
    #[serde(deserialize_with = "duration::deserialize")]
    pub green_low: Duration,
    #[serde(deserialize_with = "duration::deserialize")]
    pub green_medium: Duration,
    #[serde(deserialize_with = "duration::deserialize")]
    pub green_high: Duration,
    #[serde(deserialize_with = "duration::deserialize")]
    pub yellow: Duration,
    #[serde(deserialize_with = "duration::deserialize")]
    pub red_low: Duration,
    #[serde(deserialize_with = "duration::deserialize")]
    pub red_medium: Duration,
    #[serde(deserialize_with = "duration::deserialize")]
    pub red_high: Duration,
}

impl Default for DwellSettings {
    fn default() -> Self {
        let d = DwellTimes::default();
        Self {
            green_low: d.green.low,
            green_medium: d.green.medium,
            green_high: d.green.high,
            yellow: d.yellow,
            red_low: d.red.low,
            red_medium: d.red.medium,
            red_high: d.red.high,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub listen_addr: String,
    /// Payloads buffered per subscriber before it is dropped.
    pub subscriber_buffer: usize,
    #[serde(deserialize_with = "deserialize_wire_format")]
    pub wire_format: WireFormat,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            listen_addr: "127.0.0.1:8765".to_string(),
            subscriber_buffer: 64,
            wire_format: WireFormat::Json,
        }
    }
}

fn deserialize_wire_format<'de, D>(deserializer: D) -> std::result::Result<WireFormat, D::Error>
where
    D: Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    s.parse().map_err(serde::de::Error::custom)
}

impl Settings {
    /// Load settings from an optional file, the process environment and
    /// `overrides` (dotted keys such as `server.listen_addr`), in that order.
    pub fn load(path: Option<&Path>, overrides: &[(&str, String)]) -> Result<Self> {
        Self::build(path, Environment::with_prefix(ENV_PREFIX).separator("__"), overrides)
    }

    fn build(
        path: Option<&Path>,
        environment: Environment,
        overrides: &[(&str, String)],
    ) -> Result<Self> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(File::from(path));
        }
        builder = builder.add_source(environment);
        for (key, value) in overrides {
            builder = builder
                .set_override(*key, value.as_str())
                .with_context(|| format!("invalid override for {}", key))?;
        }

        let config = builder.build().context("failed to load configuration")?;
        let settings: Settings = config
            .try_deserialize()
            .context("invalid configuration")?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        let ThresholdSettings { medium, high } = self.thresholds;
        if !(medium.is_finite() && high.is_finite()) || medium < 0.0 {
            bail!("congestion thresholds must be finite and non-negative");
        }
        if medium > high {
            bail!(
                "medium threshold ({}) must not exceed high threshold ({})",
                medium,
                high
            );
        }
        if self.pipeline.frame_interval.is_zero() {
            bail!("pipeline.frame_interval must be greater than zero");
        }
        Ok(())
    }

    pub fn pipeline_config(&self) -> PipelineConfig {
        let dwell = &self.dwell;
        PipelineConfig::builder()
            .frame_interval(self.pipeline.frame_interval)
            .history_capacity(self.pipeline.history_capacity)
            .thresholds(CongestionThresholds {
                medium: self.thresholds.medium,
                high: self.thresholds.high,
            })
            .dwell(DwellTimes {
                green: LevelDurations {
                    low: dwell.green_low,
                    medium: dwell.green_medium,
                    high: dwell.green_high,
                },
                yellow: dwell.yellow,
                red: LevelDurations {
                    low: dwell.red_low,
                    medium: dwell.red_medium,
                    high: dwell.red_high,
                },
            })
            .build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn env(vars: &[(&str, &str)]) -> Environment {
        let map: config::Map<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Environment::with_prefix(ENV_PREFIX)
            .separator("__")
            .source(Some(map))
    }

    fn toml_file(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn defaults_match_pipeline_defaults() {
        let settings = Settings::build(None, env(&[]), &[]).unwrap();
        assert_eq!(settings, Settings::default());
        assert_eq!(settings.pipeline_config(), PipelineConfig::default());
        assert_eq!(settings.server.wire_format, WireFormat::Json);
    }

    #[test]
    fn file_values_are_applied() {
        let file = toml_file(
            r#"
            [pipeline]
            frame_interval = "100ms"
            history_capacity = 10

            [thresholds]
            medium = 3.0
            high = 9.5

            [dwell]
            red_high = "50s"

            [server]
            wire_format = "cbor"
            "#,
        );

        let settings = Settings::build(Some(file.path()), env(&[]), &[]).unwrap();
        let config = settings.pipeline_config();
        assert_eq!(config.frame_interval, Duration::from_millis(100));
        assert_eq!(config.history_capacity, 10);
        assert_eq!(config.thresholds.medium, 3.0);
        assert_eq!(config.thresholds.high, 9.5);
        assert_eq!(config.dwell.red.high, Duration::from_secs(50));
        assert_eq!(config.dwell.green.low, Duration::from_secs(30));
        assert_eq!(settings.server.wire_format, WireFormat::Cbor);
        assert_eq!(settings.server.listen_addr, "127.0.0.1:8765");
    }

    #[test]
    fn environment_overrides_file() {
        let file = toml_file("[server]\nlisten_addr = \"127.0.0.1:1111\"\n");
        let settings = Settings::build(
            Some(file.path()),
            env(&[
                ("SIGNALWATCH__SERVER__LISTEN_ADDR", "0.0.0.0:2222"),
                ("SIGNALWATCH__DWELL__YELLOW", "4s"),
            ]),
            &[],
        )
        .unwrap();
        assert_eq!(settings.server.listen_addr, "0.0.0.0:2222");
        assert_eq!(settings.dwell.yellow, Duration::from_secs(4));
    }

    #[test]
    fn cli_overrides_win() {
        let settings = Settings::build(
            None,
            env(&[("SIGNALWATCH__PIPELINE__FRAME_INTERVAL", "50ms")]),
            &[
                ("pipeline.frame_interval", "10ms".to_string()),
                ("server.wire_format", "cbor".to_string()),
            ],
        )
        .unwrap();
        assert_eq!(settings.pipeline.frame_interval, Duration::from_millis(10));
        assert_eq!(settings.server.wire_format, WireFormat::Cbor);
    }

    #[test]
    fn rejects_bad_values() {
        let bad_duration = Settings::build(
            None,
            env(&[]),
            &[("pipeline.frame_interval", "soon".to_string())],
        );
        assert!(bad_duration.is_err());

        let bad_format = Settings::build(
            None,
            env(&[]),
            &[("server.wire_format", "xml".to_string())],
        );
        assert!(bad_format.is_err());

        let inverted = toml_file("[thresholds]\nmedium = 20.0\nhigh = 10.0\n");
        let err = Settings::build(Some(inverted.path()), env(&[]), &[]).unwrap_err();
        assert!(err.to_string().contains("must not exceed"));

        let zero = Settings::build(
            None,
            env(&[]),
            &[("pipeline.frame_interval", "0ms".to_string())],
        );
        assert!(zero.is_err());
    }

    #[test]
    fn missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.toml");
        assert!(Settings::build(Some(path.as_path()), env(&[]), &[]).is_err());
    }
}
