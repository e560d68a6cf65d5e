use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Joint {
    Base,
    Shoulder,
    Elbow,
    EndEffector,
}

impl fmt::Display for Joint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Base => "base",
            Self::Shoulder => "shoulder",
            Self::Elbow => "elbow",
            Self::EndEffector => "end effector",
        };
        f.write_str(name)
    }
}

/// Suction cup state. Accepts `true`/`false` as well as `"on"`/`"off"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", try_from = "StateRepr")]
pub enum EndEffectorState {
    On,
    #[default]
    Off,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum StateRepr {
    Flag(bool),
    Word(String),
}

impl TryFrom<StateRepr> for EndEffectorState {
    type Error = String;

    fn try_from(repr: StateRepr) -> Result<Self, Self::Error> {
        match repr {
            StateRepr::Flag(true) => Ok(Self::On),
            StateRepr::Flag(false) => Ok(Self::Off),
            StateRepr::Word(word) => match word.trim().to_ascii_lowercase().as_str() {
                "on" | "true" => Ok(Self::On),
                "off" | "false" => Ok(Self::Off),
                other => Err(format!("unknown end effector state '{}'", other)),
            },
        }
    }
}

impl EndEffectorState {
    pub fn is_on(self) -> bool {
        self == Self::On
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DriveDirection {
    Forward,
    Backward,
}

impl DriveDirection {
    /// Levels for IN1..IN4 of the H-bridge.
    pub fn pin_pattern(self) -> [bool; 4] {
        match self {
            Self::Forward => [true, false, false, true],
            Self::Backward => [false, true, true, false],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpeedTier {
    Low,
    Moderate,
    High,
}

/// Resolved joint values, in the order the arm reports them.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct JointAngles {
    pub base: f64,
    pub shoulder: f64,
    pub elbow: f64,
    pub end_effector: f64,
}

/// Requested joint values. `None` holds the joint at its current value.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct JointTargets {
    pub base: Option<f64>,
    pub shoulder: Option<f64>,
    pub elbow: Option<f64>,
    pub end_effector: Option<f64>,
}

impl JointTargets {
    pub const HOME: Self = Self {
        base: Some(1.0),
        shoulder: Some(1.0),
        elbow: Some(1.0),
        end_effector: Some(1.0),
    };

    pub fn entries(&self) -> [(Joint, Option<f64>); 4] {
        [
            (Joint::Base, self.base),
            (Joint::Shoulder, self.shoulder),
            (Joint::Elbow, self.elbow),
            (Joint::EndEffector, self.end_effector),
        ]
    }

    pub fn resolve(&self, current: JointAngles) -> JointAngles {
        JointAngles {
            base: self.base.unwrap_or(current.base),
            shoulder: self.shoulder.unwrap_or(current.shoulder),
            elbow: self.elbow.unwrap_or(current.elbow),
            end_effector: self.end_effector.unwrap_or(current.end_effector),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum MotionIntent {
    MoveToNamedObject(String),
    MoveJoints {
        targets: JointTargets,
        end_effector_state: EndEffectorState,
    },
    Drive {
        direction: DriveDirection,
        speed: SpeedTier,
        /// Seconds.
        duration: f64,
    },
    Stop,
}

impl MotionIntent {
    pub fn home() -> Self {
        Self::MoveJoints {
            targets: JointTargets::HOME,
            end_effector_state: EndEffectorState::Off,
        }
    }
}

/// One unit of work for a device session.
#[derive(Debug, Clone, PartialEq)]
pub enum Operation {
    /// Look through the camera and report what is seen.
    Describe,
    Motion(MotionIntent),
}

/// Intent as delivered by the conversational front end, one JSON object
/// tagged by `action`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ToolCall {
    Describe,
    MoveToObject {
        name: String,
    },
    MoveJoints {
        #[serde(default)]
        base: Option<f64>,
        #[serde(default)]
        shoulder: Option<f64>,
        #[serde(default)]
        elbow: Option<f64>,
        #[serde(default)]
        end_effector: Option<f64>,
        #[serde(default)]
        end_effector_state: EndEffectorState,
    },
    Home,
    Drive {
        direction: DriveDirection,
        speed: SpeedTier,
        duration: f64,
    },
    Stop,
}

impl From<ToolCall> for Operation {
    fn from(call: ToolCall) -> Self {
        match call {
            ToolCall::Describe => Operation::Describe,
            ToolCall::MoveToObject { name } => Operation::Motion(MotionIntent::MoveToNamedObject(name)),
            ToolCall::MoveJoints {
                base,
                shoulder,
                elbow,
                end_effector,
                end_effector_state,
            } => Operation::Motion(MotionIntent::MoveJoints {
                targets: JointTargets {
                    base,
                    shoulder,
                    elbow,
                    end_effector,
                },
                end_effector_state,
            }),
            ToolCall::Home => Operation::Motion(MotionIntent::home()),
            ToolCall::Drive {
                direction,
                speed,
                duration,
            } => Operation::Motion(MotionIntent::Drive {
                direction,
                speed,
                duration,
            }),
            ToolCall::Stop => Operation::Motion(MotionIntent::Stop),
        }
    }
}
