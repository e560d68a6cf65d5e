use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::BridgeError;
use crate::intent::{Joint, JointTargets, MotionIntent, SpeedTier};

/// Closed range of accepted values for one joint, in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct JointRange {
    pub min: f64,
    pub max: f64,
}

impl JointRange {
    pub const fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    pub fn contains(&self, value: f64) -> bool {
        value.is_finite() && value >= self.min && value <= self.max
    }
}

/// PWM duty for each drive speed tier (0-255).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpeedTable {
    pub low: u8,
    pub moderate: u8,
    pub high: u8,
}

impl Default for SpeedTable {
    fn default() -> Self {
        Self {
            low: 15,
            moderate: 25,
            high: 50,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ActuatorLimits {
    pub base: JointRange,
    pub shoulder: JointRange,
    pub elbow: JointRange,
    pub end_effector: JointRange,
    pub speeds: SpeedTable,
}

impl Default for ActuatorLimits {
    fn default() -> Self {
        Self {
            base: JointRange::new(-100.0, 100.0),
            shoulder: JointRange::new(0.0, 75.0),
            elbow: JointRange::new(0.0, 65.0),
            end_effector: JointRange::new(0.0, 100.0),
            speeds: SpeedTable::default(),
        }
    }
}

impl ActuatorLimits {
    pub fn range(&self, joint: Joint) -> JointRange {
        match joint {
            Joint::Base => self.base,
            Joint::Shoulder => self.shoulder,
            Joint::Elbow => self.elbow,
            Joint::EndEffector => self.end_effector,
        }
    }

    pub fn duty(&self, speed: SpeedTier) -> u8 {
        match speed {
            SpeedTier::Low => self.speeds.low,
            SpeedTier::Moderate => self.speeds.moderate,
            SpeedTier::High => self.speeds.high,
        }
    }

    pub fn check_joint(&self, joint: Joint, value: f64) -> Result<f64, BridgeError> {
        let range = self.range(joint);
        if range.contains(value) {
            Ok(value)
        } else {
            Err(BridgeError::InvalidCommand(format!(
                "{} angle {} is outside {} to {}",
                joint, value, range.min, range.max
            )))
        }
    }

    /// Checks only the joints that are set; unset joints keep the live value.
    pub fn check_targets(&self, targets: &JointTargets) -> Result<(), BridgeError> {
        for (joint, value) in targets.entries() {
            if let Some(value) = value {
                self.check_joint(joint, value)?;
            }
        }
        Ok(())
    }

    pub fn check_duration(seconds: f64) -> Result<Duration, BridgeError> {
        if !(seconds.is_finite() && seconds > 0.0) {
            return Err(BridgeError::InvalidCommand(format!(
                "drive duration must be more than 0 seconds, got {}",
                seconds
            )));
        }
        Duration::try_from_secs_f64(seconds)
            .map_err(|e| BridgeError::InvalidCommand(format!("drive duration {} is not usable: {}", seconds, e)))
    }

    /// Rejects an intent before any device is touched.
    pub fn validate(&self, intent: &MotionIntent) -> Result<(), BridgeError> {
        match intent {
            MotionIntent::MoveToNamedObject(name) if name.trim().is_empty() => {
                Err(BridgeError::InvalidCommand("no object name given".to_string()))
            }
            MotionIntent::MoveJoints { targets, .. } => self.check_targets(targets),
            MotionIntent::Drive { duration, .. } => Self::check_duration(*duration).map(|_| ()),
            _ => Ok(()),
        }
    }
}
