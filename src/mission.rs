use crate::{
    assignment::{destination_pallet, draw, log_assignment, Assignment},
    driver::{ActuatorDriver, Axis, Direction},
    field::{CargoBox, Pallet, Position},
    motion::{MotionOutcome, MotionStrategy},
    range_sensor::RangeSensor,
    vision::{capture_boxes, Vision},
};
use anyhow::Result;
use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Step counts of the gripper mechanism
#[derive(Deserialize, Debug, Clone)]
pub struct CycleConfig {
    #[serde(default = "default_lift_steps")]
    pub lift_steps: u32,
    #[serde(default = "default_grab_steps")]
    pub grab_steps: u32,
}

impl Default for CycleConfig {
    fn default() -> Self {
        Self {
            lift_steps: default_lift_steps(),
            grab_steps: default_grab_steps(),
        }
    }
}

fn default_lift_steps() -> u32 {
    100
}

fn default_grab_steps() -> u32 {
    100
}

/// Where a single box is within its pick and place cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CycleState {
    #[default]
    Idle,
    EnRouteToBox,
    Picking,
    EnRouteToPallet,
    Placing,
    Returning,
}

impl fmt::Display for CycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Idle => "idle",
            Self::EnRouteToBox => "en route to box",
            Self::Picking => "picking",
            Self::EnRouteToPallet => "en route to pallet",
            Self::Placing => "placing",
            Self::Returning => "returning",
        };
        write!(f, "{}", s)
    }
}

#[derive(Error, Debug)]
enum CycleError {
    #[error("range sensor never reported target distance while {0}")]
    ObstacleTimeout(CycleState),
    #[error("cancelled while {0}")]
    Cancelled(CycleState),
    #[error("hardware failure while {stage}: {cause}")]
    Hardware {
        stage: CycleState,
        cause: anyhow::Error,
    },
}

impl CycleError {
    fn stage(&self) -> CycleState {
        match self {
            CycleError::ObstacleTimeout(stage) | CycleError::Cancelled(stage) => *stage,
            CycleError::Hardware { stage, .. } => *stage,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum BoxResult {
    Completed,
    Skipped { reason: String },
    Failed { stage: CycleState, reason: String },
    Cancelled { stage: CycleState },
    NotAttempted,
}

#[derive(Debug, Clone, Serialize)]
pub struct BoxReport {
    pub cargo: CargoBox,
    pub destination: Option<u8>,
    pub result: BoxResult,
}

#[derive(Debug, Clone, Serialize)]
pub struct MissionReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub assignment: Vec<Assignment>,
    pub boxes: Vec<BoxReport>,
    pub cancelled: bool,
}

impl MissionReport {
    pub fn completed(&self) -> usize {
        self.boxes
            .iter()
            .filter(|report| report.result == BoxResult::Completed)
            .count()
    }

    pub fn destination_of(&self, box_id: u8) -> Option<u8> {
        self.boxes
            .iter()
            .find(|report| report.cargo.id() == box_id)
            .and_then(|report| report.destination)
    }
}

/// Everything a single mission works on, dropped when the mission ends
#[derive(Debug)]
struct MissionContext {
    boxes: Vec<CargoBox>,
    pallets: Vec<Pallet>,
    assignment: Vec<Assignment>,
    reports: Vec<BoxReport>,
}

/// Runs the pick, transport, place and return cycle for one box after another
pub struct MissionSequencer<'a, M> {
    motion: M,
    cycle: CycleConfig,
    actuator: &'a mut dyn ActuatorDriver,
    range_sensor: &'a mut dyn RangeSensor,
    state: CycleState,
}

impl<'a, M: MotionStrategy> MissionSequencer<'a, M> {
    pub fn new(
        motion: M,
        cycle: CycleConfig,
        actuator: &'a mut dyn ActuatorDriver,
        range_sensor: &'a mut dyn RangeSensor,
    ) -> Self {
        Self {
            motion,
            cycle,
            actuator,
            range_sensor,
            state: CycleState::Idle,
        }
    }

    pub fn state(&self) -> CycleState {
        self.state
    }

    pub fn motion(&self) -> &M {
        &self.motion
    }

    /// Capture boxes with the camera and run a mission over them
    pub async fn execute<R: Rng + ?Sized>(
        &mut self,
        vision: &mut dyn Vision,
        max_items: usize,
        pallets: Vec<Pallet>,
        rng: &mut R,
        cancel: &CancellationToken,
    ) -> Result<MissionReport> {
        let boxes = capture_boxes(vision, max_items).await?;
        info!("Identified {} boxes", boxes.len());
        Ok(self.run_mission(boxes, pallets, rng, cancel).await)
    }

    /// Cycle every box in detection order.
    ///
    /// A failing box is reported and the mission moves on to the next one.
    pub async fn run_mission<R: Rng + ?Sized>(
        &mut self,
        boxes: Vec<CargoBox>,
        pallets: Vec<Pallet>,
        rng: &mut R,
        cancel: &CancellationToken,
    ) -> MissionReport {
        let started_at = Utc::now();
        let slot_count = pallets.len().min(u8::MAX as usize) as u8;
        let assignment = draw(slot_count, rng);
        log_assignment(&assignment);

        let mut context = MissionContext {
            boxes,
            pallets,
            assignment,
            reports: Vec::new(),
        };
        let mut cancelled = false;

        for cargo in context.boxes.drain(..) {
            if cancelled || cancel.is_cancelled() {
                cancelled = true;
                context.reports.push(BoxReport {
                    cargo,
                    destination: None,
                    result: BoxResult::NotAttempted,
                });
                continue;
            }

            let pallet = match destination_pallet(&cargo, &context.pallets, rng) {
                Ok(pallet) => pallet,
                Err(err) => {
                    error!("Skipping {}: {}", cargo, err);
                    context.reports.push(BoxReport {
                        cargo,
                        destination: None,
                        result: BoxResult::Skipped {
                            reason: err.to_string(),
                        },
                    });
                    continue;
                }
            };
            let destination = pallet.id();
            info!("Moving {} to pallet {}", cargo, destination);

            let result = match self.run_cycle(&cargo, pallet.position(), cancel).await {
                Ok(()) => {
                    info!("Placed {} on pallet {}", cargo, destination);
                    BoxResult::Completed
                }
                Err(CycleError::Cancelled(stage)) => {
                    warn!("Mission cancelled while {}", stage);
                    cancelled = true;
                    BoxResult::Cancelled { stage }
                }
                Err(err) => {
                    error!("Cycle for {} failed: {}", cargo, err);
                    BoxResult::Failed {
                        stage: err.stage(),
                        reason: err.to_string(),
                    }
                }
            };
            self.transition(CycleState::Idle);
            context.reports.push(BoxReport {
                cargo,
                destination: Some(destination),
                result,
            });
        }

        MissionReport {
            started_at,
            finished_at: Utc::now(),
            assignment: context.assignment,
            boxes: context.reports,
            cancelled,
        }
    }

    async fn run_cycle(
        &mut self,
        cargo: &CargoBox,
        pallet: &Position,
        cancel: &CancellationToken,
    ) -> Result<(), CycleError> {
        self.transition(CycleState::EnRouteToBox);
        self.travel(cargo.position(), cancel).await?;

        self.transition(CycleState::Picking);
        self.gripper_cycle(Direction::Positive, cancel).await?;

        self.transition(CycleState::EnRouteToPallet);
        self.travel(pallet, cancel).await?;

        self.transition(CycleState::Placing);
        self.gripper_cycle(Direction::Negative, cancel).await?;

        self.transition(CycleState::Returning);
        self.travel(&Position::origin(), cancel).await?;
        Ok(())
    }

    fn transition(&mut self, next: CycleState) {
        debug!("{} -> {}", self.state, next);
        self.state = next;
    }

    async fn travel(
        &mut self,
        target: &Position,
        cancel: &CancellationToken,
    ) -> Result<(), CycleError> {
        let stage = self.state;
        let outcome = self
            .motion
            .move_to(target, &mut *self.actuator, &mut *self.range_sensor, cancel)
            .await
            .map_err(|cause| CycleError::Hardware { stage, cause })?;
        debug!("Travel while {} finished: {}", stage, outcome);
        match outcome {
            MotionOutcome::Reached => Ok(()),
            MotionOutcome::ObstacleTimeout => Err(CycleError::ObstacleTimeout(stage)),
            MotionOutcome::Cancelled => Err(CycleError::Cancelled(stage)),
        }
    }

    /// Lower, close or open the gripper, then raise it again
    async fn gripper_cycle(
        &mut self,
        grab: Direction,
        cancel: &CancellationToken,
    ) -> Result<(), CycleError> {
        let moves = [
            (Axis::Lift, Direction::Negative, self.cycle.lift_steps),
            (Axis::Grab, grab, self.cycle.grab_steps),
            (Axis::Lift, Direction::Positive, self.cycle.lift_steps),
        ];
        let stage = self.state;
        for (axis, direction, steps) in moves {
            if cancel.is_cancelled() {
                return Err(CycleError::Cancelled(stage));
            }
            if steps == 0 {
                continue;
            }
            self.actuator
                .drive(axis, direction, steps)
                .await
                .map_err(|cause| CycleError::Hardware { stage, cause })?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        driver::StepCommand,
        field::FieldConfig,
        motion::{MotionConfig, OpenLoopRelativeMotion},
        simulation::{RecordingActuator, ScriptedRangeSensor},
    };
    use rand::{rngs::StdRng, SeedableRng};

    #[test]
    fn cycle_error_reports_stage() {
        let err = CycleError::ObstacleTimeout(CycleState::EnRouteToPallet);
        assert_eq!(err.stage(), CycleState::EnRouteToPallet);
        assert_eq!(
            err.to_string(),
            "range sensor never reported target distance while en route to pallet"
        );
    }

    #[tokio::test]
    async fn single_box_command_sequence() {
        let mut actuator = RecordingActuator::default();
        let mut sensor = ScriptedRangeSensor::at_target(400);
        let mut sequencer = MissionSequencer::new(
            OpenLoopRelativeMotion::new(MotionConfig::default()),
            CycleConfig::default(),
            &mut actuator,
            &mut sensor,
        );
        let mut rng = StdRng::seed_from_u64(1);
        let report = sequencer
            .run_mission(
                vec![CargoBox::new(4, (10, 5))],
                FieldConfig::default().pallets(),
                &mut rng,
                &CancellationToken::new(),
            )
            .await;
        assert_eq!(sequencer.state(), CycleState::Idle);
        assert_eq!(report.completed(), 1);
        assert_eq!(report.assignment.len(), 6);
        drop(sequencer);

        let positive = Direction::Positive;
        let negative = Direction::Negative;
        assert_eq!(
            actuator.commands(),
            &[
                StepCommand::new(Axis::Forward, positive, 10),
                StepCommand::new(Axis::Steering, positive, 5),
                StepCommand::new(Axis::Lift, negative, 100),
                StepCommand::new(Axis::Grab, positive, 100),
                StepCommand::new(Axis::Lift, positive, 100),
                // pallet 4 sits at [300, 0]
                StepCommand::new(Axis::Forward, positive, 300),
                StepCommand::new(Axis::Lift, negative, 100),
                StepCommand::new(Axis::Grab, negative, 100),
                StepCommand::new(Axis::Lift, positive, 100),
            ]
        );
    }

    #[tokio::test]
    async fn zero_step_gripper_moves_are_not_sent() {
        let mut actuator = RecordingActuator::default();
        let mut sensor = ScriptedRangeSensor::at_target(400);
        let mut sequencer = MissionSequencer::new(
            OpenLoopRelativeMotion::new(MotionConfig::default()),
            CycleConfig {
                lift_steps: 0,
                grab_steps: 40,
            },
            &mut actuator,
            &mut sensor,
        );
        let mut rng = StdRng::seed_from_u64(1);
        let report = sequencer
            .run_mission(
                vec![CargoBox::new(1, (0, 0))],
                FieldConfig::default().pallets(),
                &mut rng,
                &CancellationToken::new(),
            )
            .await;
        assert_eq!(report.completed(), 1);
        drop(sequencer);

        assert_eq!(
            actuator.commands(),
            &[
                StepCommand::new(Axis::Grab, Direction::Positive, 40),
                StepCommand::new(Axis::Grab, Direction::Negative, 40),
            ]
        );
    }
}
