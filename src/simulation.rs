//! Stand-ins for the robot hardware, used for dry runs and tests.

use crate::{
    driver::{ActuatorDriver, Axis, Direction, StepCommand},
    range_sensor::RangeSensor,
    vision::{Detection, Vision},
};
use anyhow::Result;
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::VecDeque;
use tracing::info;

/// Actuator that only remembers what it was asked to do
#[derive(Debug, Default)]
pub struct RecordingActuator {
    commands: Vec<StepCommand>,
}

impl RecordingActuator {
    pub fn commands(&self) -> &[StepCommand] {
        &self.commands
    }

    pub fn into_commands(self) -> Vec<StepCommand> {
        self.commands
    }
}

#[async_trait]
impl ActuatorDriver for RecordingActuator {
    async fn drive(&mut self, axis: Axis, direction: Direction, steps: u32) -> Result<()> {
        let command = StepCommand::new(axis, direction, steps);
        info!("Simulated {}", command);
        self.commands.push(command);
        Ok(())
    }
}

/// Replays a list of readings, then keeps reporting a settled value
#[derive(Debug)]
pub struct ScriptedRangeSensor {
    script: VecDeque<Option<u32>>,
    settled: Option<u32>,
    reads: usize,
}

impl ScriptedRangeSensor {
    pub fn new(script: Vec<Option<u32>>, settled: Option<u32>) -> Self {
        Self {
            script: script.into(),
            settled,
            reads: 0,
        }
    }

    pub fn at_target(distance: u32) -> Self {
        Self::new(vec![], Some(distance))
    }

    pub fn reads(&self) -> usize {
        self.reads
    }
}

#[async_trait]
impl RangeSensor for ScriptedRangeSensor {
    async fn read(&mut self) -> Result<Option<u32>> {
        self.reads += 1;
        Ok(self.script.pop_front().unwrap_or(self.settled))
    }
}

#[derive(Debug, Clone, Default)]
pub struct FixedVision {
    detections: Vec<Detection>,
}

impl FixedVision {
    pub fn new(detections: Vec<Detection>) -> Self {
        Self { detections }
    }
}

#[async_trait]
impl Vision for FixedVision {
    async fn capture_and_identify(&mut self, max_items: usize) -> Result<Vec<Detection>> {
        Ok(self.detections.iter().take(max_items).cloned().collect())
    }
}

#[derive(Deserialize, Debug, Clone, Default)]
pub struct SimulatedDetection {
    pub label: String,
    pub x: i32,
    pub y: i32,
}

#[derive(Deserialize, Debug, Clone, Default)]
pub struct SimulationConfig {
    #[serde(default)]
    pub detections: Vec<SimulatedDetection>,
    /// readings replayed before the sensor settles on the target distance
    #[serde(default)]
    pub range_script: Vec<Option<u32>>,
}

impl SimulationConfig {
    pub fn vision(&self) -> FixedVision {
        FixedVision::new(
            self.detections
                .iter()
                .map(|d| Detection::new(&d.label, d.x, d.y))
                .collect(),
        )
    }

    pub fn range_sensor(&self, target_distance: u32) -> ScriptedRangeSensor {
        ScriptedRangeSensor::new(self.range_script.clone(), Some(target_distance))
    }
}
