use serde::Serialize;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

use crate::config::VisionArmConfig;
use crate::devices::DriveChannel;
use crate::error::BridgeError;
use crate::intent::{DriveDirection, EndEffectorState, Joint, JointTargets, MotionIntent, SpeedTier};
use crate::limits::ActuatorLimits;
use crate::parser::ParsedResponse;
use crate::perception::Perceiver;
use crate::session::DeviceSession;
use crate::transform;
use crate::vision_model::VisionModel;

const NOTHING_DETECTED: &str = "Sorry, I can't detect any objects";

/// Outcome of one intent, ready to be spoken back to the user.
#[derive(Debug, Clone, Serialize)]
pub struct DispatchReport {
    pub success: bool,
    pub message: String,
    pub execution_time: Duration,
}

impl DispatchReport {
    fn finish(result: Result<String, BridgeError>, start_time: Instant, session: &mut DeviceSession) -> Self {
        let execution_time = start_time.elapsed();
        match result {
            Ok(message) => {
                info!("Completed in {}ms: {}", execution_time.as_millis(), message);
                Self {
                    success: true,
                    message,
                    execution_time,
                }
            }
            Err(e) => {
                if e.taints_pose() {
                    session.invalidate_pose();
                }
                error!("Command failed: {}", e);
                Self {
                    success: false,
                    message: e.apology(),
                    execution_time,
                }
            }
        }
    }
}

/// Turns intents into device call sequences on a session.
pub struct CommandDispatcher {
    perceiver: Perceiver,
    limits: ActuatorLimits,
    joint_mode: u8,
}

impl CommandDispatcher {
    pub fn new(perceiver: Perceiver, limits: ActuatorLimits, joint_mode: u8) -> Self {
        Self {
            perceiver,
            limits,
            joint_mode,
        }
    }

    pub fn from_config(model: Box<dyn VisionModel>, config: &VisionArmConfig) -> Self {
        Self::new(
            Perceiver::new(model, &config.vision),
            config.limits.clone(),
            config.arm.joint_mode,
        )
    }

    pub fn execute(&self, intent: MotionIntent, session: &mut DeviceSession) -> DispatchReport {
        let start_time = Instant::now();
        debug!("Executing intent: {:?}", intent);

        let result = self.limits.validate(&intent).and_then(|()| match intent {
            MotionIntent::MoveToNamedObject(name) => self.move_to_object(&name, session),
            MotionIntent::MoveJoints {
                targets,
                end_effector_state,
            } => self.move_joints(targets, end_effector_state, session),
            MotionIntent::Drive {
                direction,
                speed,
                duration,
            } => self.drive(direction, speed, duration, session),
            MotionIntent::Stop => stop(session).map(|()| "Stopping".to_string()),
        });

        DispatchReport::finish(result, start_time, session)
    }

    /// Looks through the camera and describes the scene.
    pub fn describe(&self, session: &mut DeviceSession) -> DispatchReport {
        let start_time = Instant::now();
        let result = match self.perceiver.capture(session) {
            Ok(ParsedResponse::Detections(detections)) if detections.is_empty() => {
                Ok(NOTHING_DETECTED.to_string())
            }
            Ok(response) => Ok(format!("Detected Objects: {}", response)),
            Err(BridgeError::CaptureFailed(reason)) => {
                warn!("Capture failed: {}", reason);
                return DispatchReport {
                    success: false,
                    message: NOTHING_DETECTED.to_string(),
                    execution_time: start_time.elapsed(),
                };
            }
            Err(e) => Err(e),
        };
        DispatchReport::finish(result, start_time, session)
    }

    fn move_to_object(&self, name: &str, session: &mut DeviceSession) -> Result<String, BridgeError> {
        // Detections are offsets from where the tool is now.
        let pose = session.refresh_pose()?;
        let response = self.perceiver.capture(session)?;
        let target = transform::locate(response.detections(), name, &pose)
            .ok_or_else(|| BridgeError::ObjectNotFound(name.to_string()))?;

        info!("Moving to {} at ({:.1}, {:.1}, {:.1})", name, target.x, target.y, target.z);
        session
            .arm()?
            .move_to(target.x, target.y, target.z, 0.0, true)
            .map_err(BridgeError::device_fault)?;
        session.refresh_pose()?;

        Ok(format!("Moving robot to {:.1}, {:.1}, {:.1}", target.x, target.y, target.z))
    }

    fn move_joints(
        &self,
        targets: JointTargets,
        end_effector_state: EndEffectorState,
        session: &mut DeviceSession,
    ) -> Result<String, BridgeError> {
        let current = session.pose()?.joints();
        let angles = targets.resolve(current);
        // Held joints keep the live value even when it sits outside the table.
        for (joint, target) in targets.entries() {
            if target.is_none() {
                let held = match joint {
                    Joint::Base => angles.base,
                    Joint::Shoulder => angles.shoulder,
                    Joint::Elbow => angles.elbow,
                    Joint::EndEffector => angles.end_effector,
                };
                if !self.limits.range(joint).contains(held) {
                    warn!("Holding {} at {:.1}, outside its configured range", joint, held);
                }
            }
        }
        info!("Moving joints to {:?}", angles);

        session
            .arm()?
            .set_point_to_point(angles, self.joint_mode, true)
            .map_err(BridgeError::device_fault)?;
        session.refresh_pose()?;

        session
            .arm()?
            .suck(end_effector_state.is_on())
            .map_err(BridgeError::device_fault)?;

        Ok(format!(
            "Moving joints to base {:.1}, shoulder {:.1}, elbow {:.1}, end effector {:.1}",
            angles.base, angles.shoulder, angles.elbow, angles.end_effector
        ))
    }

    fn drive(
        &self,
        direction: DriveDirection,
        speed: SpeedTier,
        seconds: f64,
        session: &mut DeviceSession,
    ) -> Result<String, BridgeError> {
        let duration = ActuatorLimits::check_duration(seconds)?;
        let duty = self.limits.duty(speed);
        info!("Driving {:?} at duty {} for {:?}", direction, duty, duration);

        let run = start_drive(session, direction, duty).map(|()| thread::sleep(duration));

        // The motors are stopped whatever happened above.
        let stopped = stop(session);
        match (run, stopped) {
            (Err(e), Err(stop_err)) => {
                error!("Failed to stop rover after drive error: {}", stop_err);
                Err(e)
            }
            (Err(e), Ok(())) | (Ok(()), Err(e)) => Err(e),
            (Ok(()), Ok(())) => {
                let heading = match direction {
                    DriveDirection::Forward => "forward",
                    DriveDirection::Backward => "backward",
                };
                Ok(format!("Drove {} for {:.1} seconds", heading, seconds))
            }
        }
    }
}

fn start_drive(session: &mut DeviceSession, direction: DriveDirection, duty: u8) -> Result<(), BridgeError> {
    let drive = session.drive()?;
    for channel in [DriveChannel::Left, DriveChannel::Right] {
        drive.set_duty(channel, duty).map_err(BridgeError::device_fault)?;
    }
    drive
        .set_direction(direction.pin_pattern())
        .map_err(BridgeError::device_fault)
}

/// Zero duty on both channels. Both are attempted; the first failure is returned.
fn stop(session: &mut DeviceSession) -> Result<(), BridgeError> {
    let drive = session.drive()?;
    let mut first_error = None;
    for channel in [DriveChannel::Left, DriveChannel::Right] {
        if let Err(e) = drive.set_duty(channel, 0) {
            error!("Failed to stop rover {:?} channel: {:#}", channel, e);
            if first_error.is_none() {
                first_error = Some(e);
            }
        }
    }
    match first_error {
        Some(e) => Err(BridgeError::device_fault(e)),
        None => {
            debug!("Rover stopped");
            Ok(())
        }
    }
}
