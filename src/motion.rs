use crate::{
    driver::{ActuatorDriver, Axis, Direction},
    field::Position,
    range_sensor::RangeSensor,
};
use anyhow::Result;
use async_trait::async_trait;
use nalgebra as na;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use tokio::time::{sleep, timeout_at, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

/// How the forward axis treats a negative x displacement
#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ForwardSignPolicy {
    /// drive forward by `|dx|` whatever the sign, the robot never reverses
    #[default]
    AlwaysForward,
    /// reverse for negative `dx`
    Signed,
}

#[derive(Deserialize, Debug, Clone)]
pub struct MotionConfig {
    /// range reading at which the approach stops
    #[serde(default = "default_target_distance")]
    pub target_distance: u32,
    #[serde(default)]
    pub target_tolerance: u32,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_approach_timeout_ms")]
    pub approach_timeout_ms: u64,
    #[serde(default)]
    pub forward_sign: ForwardSignPolicy,
}

impl MotionConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn approach_timeout(&self) -> Duration {
        Duration::from_millis(self.approach_timeout_ms)
    }

    fn at_target(&self, distance: u32) -> bool {
        distance.abs_diff(self.target_distance) <= self.target_tolerance
    }
}

impl Default for MotionConfig {
    fn default() -> Self {
        Self {
            target_distance: default_target_distance(),
            target_tolerance: 0,
            poll_interval_ms: default_poll_interval_ms(),
            approach_timeout_ms: default_approach_timeout_ms(),
            forward_sign: ForwardSignPolicy::default(),
        }
    }
}

fn default_target_distance() -> u32 {
    400
}

fn default_poll_interval_ms() -> u64 {
    100
}

fn default_approach_timeout_ms() -> u64 {
    30_000
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MotionOutcome {
    Reached,
    /// range sensor never reported the target distance in time
    ObstacleTimeout,
    Cancelled,
}

impl fmt::Display for MotionOutcome {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let s = match self {
            MotionOutcome::Reached => "reached",
            MotionOutcome::ObstacleTimeout => "obstacle timeout",
            MotionOutcome::Cancelled => "cancelled",
        };
        write!(f, "{}", s)
    }
}

/// Moves the chassis to a target on behalf of the mission
#[async_trait]
pub trait MotionStrategy: Send {
    async fn move_to(
        &mut self,
        target: &Position,
        actuator: &mut dyn ActuatorDriver,
        range_sensor: &mut dyn RangeSensor,
        cancel: &CancellationToken,
    ) -> Result<MotionOutcome>;
}

/// Pose the robot believes it has, built from commanded steps only.
///
/// Forward steps move along x and steering steps along y.
#[derive(Debug, Clone)]
pub struct PoseTracker {
    assumed: Position,
}

impl Default for PoseTracker {
    fn default() -> Self {
        Self {
            assumed: Position::origin(),
        }
    }
}

impl PoseTracker {
    pub fn assumed(&self) -> &Position {
        &self.assumed
    }

    pub fn reset(&mut self) {
        self.assumed = Position::origin();
    }

    pub fn displacement_to(&self, target: &Position) -> na::Vector2<i32> {
        target.coords - self.assumed.coords
    }

    /// Saturates at the bounds of the coordinate type
    pub fn record(&mut self, axis: Axis, direction: Direction, steps: u32) {
        let delta = match direction {
            Direction::Positive => i64::from(steps),
            Direction::Negative => -i64::from(steps),
        };
        let shift = |value: i32| {
            (i64::from(value) + delta).clamp(i64::from(i32::MIN), i64::from(i32::MAX)) as i32
        };
        match axis {
            Axis::Forward => self.assumed.x = shift(self.assumed.x),
            Axis::Steering => self.assumed.y = shift(self.assumed.y),
            Axis::Lift | Axis::Grab => (),
        }
    }
}

/// Open loop stepping that treats every target as relative to where the robot stands.
///
/// The assumed pose is zeroed at the start of each move so drift accumulates over
/// a mission. Only the final range gated approach corrects the distance.
pub struct OpenLoopRelativeMotion {
    config: MotionConfig,
    pose: PoseTracker,
}

impl OpenLoopRelativeMotion {
    pub fn new(config: MotionConfig) -> Self {
        Self {
            config,
            pose: PoseTracker::default(),
        }
    }

    pub fn pose(&self) -> &PoseTracker {
        &self.pose
    }

    async fn step(
        &mut self,
        actuator: &mut dyn ActuatorDriver,
        axis: Axis,
        direction: Direction,
        steps: u32,
    ) -> Result<()> {
        if steps == 0 {
            return Ok(());
        }
        actuator.drive(axis, direction, steps).await?;
        self.pose.record(axis, direction, steps);
        Ok(())
    }

    /// Creep forward one step at a time until the sensor reads the target distance
    async fn approach(
        &mut self,
        actuator: &mut dyn ActuatorDriver,
        range_sensor: &mut dyn RangeSensor,
        cancel: &CancellationToken,
    ) -> Result<MotionOutcome> {
        let deadline = Instant::now() + self.config.approach_timeout();
        let mut polls: u32 = 0;
        let mut creep_steps: u32 = 0;
        loop {
            if cancel.is_cancelled() {
                return Ok(MotionOutcome::Cancelled);
            }
            if Instant::now() >= deadline {
                warn!(
                    polls,
                    creep_steps, "Range sensor never read target distance"
                );
                return Ok(MotionOutcome::ObstacleTimeout);
            }
            polls += 1;

            let reading = match timeout_at(deadline, range_sensor.read()).await {
                Err(_) => continue,
                Ok(Ok(reading)) => reading,
                Ok(Err(err)) => {
                    warn!("Range sensor read failed {:?}", err);
                    None
                }
            };

            match reading {
                Some(distance) if self.config.at_target(distance) => {
                    info!(polls, creep_steps, distance, "Reached target distance");
                    return Ok(MotionOutcome::Reached);
                }
                Some(distance) => {
                    trace!(distance, "Approaching");
                    self.step(actuator, Axis::Forward, Direction::Positive, 1)
                        .await?;
                    creep_steps += 1;
                }
                None => debug!("No range reading"),
            }

            tokio::select! {
                _ = cancel.cancelled() => return Ok(MotionOutcome::Cancelled),
                _ = sleep(self.config.poll_interval()) => {}
            }
        }
    }
}

#[async_trait]
impl MotionStrategy for OpenLoopRelativeMotion {
    async fn move_to(
        &mut self,
        target: &Position,
        actuator: &mut dyn ActuatorDriver,
        range_sensor: &mut dyn RangeSensor,
        cancel: &CancellationToken,
    ) -> Result<MotionOutcome> {
        if cancel.is_cancelled() {
            return Ok(MotionOutcome::Cancelled);
        }
        self.pose.reset();
        let displacement = self.pose.displacement_to(target);
        debug!(dx = displacement.x, dy = displacement.y, "Moving");

        let forward_direction = match self.config.forward_sign {
            ForwardSignPolicy::Signed if displacement.x < 0 => Direction::Negative,
            _ => Direction::Positive,
        };
        self.step(
            actuator,
            Axis::Forward,
            forward_direction,
            displacement.x.unsigned_abs(),
        )
        .await?;

        if cancel.is_cancelled() {
            return Ok(MotionOutcome::Cancelled);
        }

        // left for positive dy, right otherwise
        let steering_direction = if displacement.y > 0 {
            Direction::Positive
        } else {
            Direction::Negative
        };
        self.step(
            actuator,
            Axis::Steering,
            steering_direction,
            displacement.y.unsigned_abs(),
        )
        .await?;

        self.approach(actuator, range_sensor, cancel).await
    }
}
