use config::Config;
use serde::Deserialize;
use std::path::PathBuf;
use tracing::*;

use crate::{
    driver::ActuatorConfig, error::PorterError, field::FieldConfig, mission::CycleConfig,
    motion::MotionConfig, range_sensor::RangeSensorConfig, simulation::SimulationConfig,
    vision::VisionConfig,
};

#[derive(Deserialize, Debug, Clone)]
pub struct AppConfig {
    #[serde(default)]
    pub field: FieldConfig,
    #[serde(default)]
    pub cycle: CycleConfig,
    #[serde(default)]
    pub motion: MotionConfig,
    pub actuator: ActuatorConfig,
    pub range_sensor: RangeSensorConfig,
    pub vision: VisionConfig,
    #[serde(default)]
    pub simulation: SimulationConfig,
}

impl AppConfig {
    pub fn load_config(config: &Option<PathBuf>) -> anyhow::Result<Self> {
        let settings = if let Some(config) = config {
            info!("Using configuration from {:?}", config);
            Config::builder()
                .add_source(config::Environment::with_prefix("APP"))
                .add_source(config::File::with_name(
                    config
                        .to_str()
                        .ok_or_else(|| anyhow::anyhow!("Failed to convert path"))?,
                ))
                .build()?
        } else {
            info!("Using dev configuration");
            Config::builder()
                .add_source(config::Environment::with_prefix("APP"))
                .add_source(config::File::with_name("config/settings"))
                .add_source(config::File::with_name("config/dev_settings").required(false))
                .build()?
        };

        let app_config: AppConfig = settings.try_deserialize()?;
        app_config.validate()?;
        Ok(app_config)
    }

    pub fn validate(&self) -> Result<(), PorterError> {
        if self.field.pallets.is_empty() {
            return Err(PorterError::InvalidConfig(String::from(
                "field needs at least one pallet",
            )));
        }
        if self.field.pallets.len() > u8::MAX as usize {
            return Err(PorterError::InvalidConfig(format!(
                "{} pallets exceed the supported {}",
                self.field.pallets.len(),
                u8::MAX
            )));
        }
        if self.motion.approach_timeout_ms == 0 {
            return Err(PorterError::InvalidConfig(String::from(
                "motion.approach_timeout_ms must be positive",
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::motion::ForwardSignPolicy;

    static DEFAULT_CONFIG: &str = include_str!("../config/settings.yaml");

    fn load(source: &str) -> AppConfig {
        Config::builder()
            .add_source(config::File::from_str(source, config::FileFormat::Yaml))
            .build()
            .unwrap()
            .try_deserialize::<AppConfig>()
            .unwrap()
    }

    #[test]
    fn test_config() {
        let config = load(DEFAULT_CONFIG);
        config.validate().unwrap();
        assert_eq!(config.field.pallets().len(), 6);
        assert_eq!(config.motion.target_distance, 400);
        assert_eq!(config.motion.forward_sign, ForwardSignPolicy::AlwaysForward);
        assert_eq!(config.cycle.lift_steps, 100);
    }

    #[test]
    fn minimal_config_uses_defaults() {
        let config = load(
            r#"
actuator:
  port: /dev/ttyUSB0
range_sensor:
  port: /dev/ttyS0
vision:
  port: /dev/ttyUSB1
motion:
  forward_sign: signed
"#,
        );
        assert_eq!(config.actuator.baud_rate, 115200);
        assert_eq!(config.range_sensor.baud_rate, 9600);
        assert_eq!(config.vision.max_items, 6);
        assert_eq!(config.motion.poll_interval_ms, 100);
        assert_eq!(config.motion.forward_sign, ForwardSignPolicy::Signed);
        assert_eq!(config.field.pallets.len(), 6);
        assert!(config.simulation.detections.is_empty());
    }

    #[test]
    fn empty_field_is_rejected() {
        let mut config = load(DEFAULT_CONFIG);
        config.field.pallets.clear();
        assert!(config.validate().is_err());
    }
}
