pub mod stepper_driver;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

pub use stepper_driver::StepperDriver;

/// Motor groups of the robot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Axis {
    /// rear drive wheels
    Forward,
    /// front steering
    Steering,
    Lift,
    Grab,
}

impl Axis {
    pub fn wire_id(&self) -> u8 {
        match self {
            Axis::Forward => 0,
            Axis::Steering => 1,
            Axis::Lift => 2,
            Axis::Grab => 3,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Axis::Forward => "forward",
            Axis::Steering => "steering",
            Axis::Lift => "lift",
            Axis::Grab => "grab",
        }
    }
}

/// Positive means forward, steer left, raise and close
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Positive,
    Negative,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StepCommand {
    pub axis: Axis,
    pub direction: Direction,
    pub steps: u32,
}

impl StepCommand {
    pub fn new(axis: Axis, direction: Direction, steps: u32) -> Self {
        Self {
            axis,
            direction,
            steps,
        }
    }

    /// Encode as `[axis, direction, steps (LE)]` COBS frame terminated with zero
    pub(crate) fn encode(&self) -> Vec<u8> {
        let mut buffer = Vec::with_capacity(6);
        buffer.push(self.axis.wire_id());
        buffer.push((self.direction == Direction::Positive) as u8);
        buffer.extend_from_slice(&self.steps.to_le_bytes());

        let mut encoded = postcard_cobs::encode_vec(&buffer);
        encoded.push(0);
        encoded
    }
}

impl fmt::Display for StepCommand {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let sign = match self.direction {
            Direction::Positive => "+",
            Direction::Negative => "-",
        };
        write!(f, "{} {}{}", self.axis.name(), sign, self.steps)
    }
}

/// Stepper motors of the chassis and gripper.
///
/// `drive` returns once the motion physically finished.
#[async_trait]
pub trait ActuatorDriver: Send {
    async fn drive(&mut self, axis: Axis, direction: Direction, steps: u32) -> Result<()>;
}

#[derive(Deserialize, Debug, Clone)]
pub struct ActuatorConfig {
    pub port: String,
    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,
    /// base wait for the acknowledgement of a command
    #[serde(default = "default_ack_timeout_ms")]
    pub ack_timeout_ms: u64,
    /// added to the acknowledgement wait for every commanded step
    #[serde(default = "default_step_time_us")]
    pub step_time_us: u64,
}

impl ActuatorConfig {
    pub fn ack_timeout(&self, steps: u32) -> Duration {
        Duration::from_millis(self.ack_timeout_ms)
            + Duration::from_micros(self.step_time_us.saturating_mul(steps as u64))
    }
}

fn default_baud_rate() -> u32 {
    115200
}

fn default_ack_timeout_ms() -> u64 {
    500
}

fn default_step_time_us() -> u64 {
    1000
}

pub async fn actuator_from_config(config: ActuatorConfig) -> Result<Box<dyn ActuatorDriver>> {
    Ok(Box::new(StepperDriver::new(config)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encoding_adds_trailing_zero() {
        let command = StepCommand::new(Axis::Forward, Direction::Positive, 0);
        let encoded = command.encode();
        assert_eq!(*encoded.last().unwrap(), 0_u8);
        assert!(!encoded[..encoded.len() - 1].contains(&0));
    }

    #[test]
    fn encoding_lift_negative() {
        let command = StepCommand::new(Axis::Lift, Direction::Negative, 100);
        let encoded = command.encode();
        let decoded = postcard_cobs::decode_vec(&encoded[..encoded.len() - 1]).unwrap();
        assert_eq!(decoded, vec![2, 0, 100, 0, 0, 0]);
    }

    #[test]
    fn ack_timeout_scales_with_steps() {
        let config = ActuatorConfig {
            port: String::from("/dev/null"),
            baud_rate: default_baud_rate(),
            ack_timeout_ms: 500,
            step_time_us: 1000,
        };
        assert_eq!(config.ack_timeout(0), Duration::from_millis(500));
        assert_eq!(config.ack_timeout(100), Duration::from_millis(600));
    }

    #[test]
    fn display_command() {
        let command = StepCommand::new(Axis::Steering, Direction::Negative, 50);
        assert_eq!(command.to_string(), "steering -50");
    }
}
