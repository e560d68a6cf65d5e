use thiserror::Error;

use crate::session::SessionState;

/// Failures the bridge can report. Everything except startup failures is
/// converted into a spoken apology by the dispatcher.
#[derive(Error, Debug)]
pub enum BridgeError {
    /// Camera or serial port could not be opened. Fatal to session startup.
    #[error("device unavailable: {device}: {reason}")]
    DeviceUnavailable { device: String, reason: String },

    /// The vision model client could not be constructed.
    #[error("vision client initialization failed: {0}")]
    ClientInitFailed(String),

    /// A single frame read failed; the session stays usable.
    #[error("frame capture failed: {0}")]
    CaptureFailed(String),

    /// The vision model could not be reached or answered with an error.
    #[error("vision model request failed: {0}")]
    VisionRequestFailed(String),

    #[error("object '{0}' not found in the latest detection")]
    ObjectNotFound(String),

    /// Rejected before any device call was made.
    #[error("invalid command: {0}")]
    InvalidCommand(String),

    /// Communication failure while a command was in flight.
    #[error("device fault: {0}")]
    DeviceFault(String),

    #[error("session is {0:?}, operations require an active session")]
    SessionNotActive(SessionState),
}

impl BridgeError {
    pub fn unavailable(device: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        Self::DeviceUnavailable {
            device: device.into(),
            reason: reason.to_string(),
        }
    }

    /// Wraps a device boundary error. The full context chain is kept in the message.
    pub fn device_fault(err: anyhow::Error) -> Self {
        Self::DeviceFault(format!("{:#}", err))
    }

    /// Whether the cached pose must be re-read before the next arm command.
    pub fn taints_pose(&self) -> bool {
        matches!(self, Self::DeviceFault(_))
    }

    /// The message surfaced to the conversational layer.
    pub fn apology(&self) -> String {
        match self {
            Self::DeviceUnavailable { device, .. } => {
                format!("Sorry, the {} is not available right now", device)
            }
            Self::ClientInitFailed(_) | Self::VisionRequestFailed(_) => {
                "Sorry, I couldn't reach the vision service".to_string()
            }
            Self::CaptureFailed(_) => "Sorry, I couldn't capture an image from the camera".to_string(),
            Self::ObjectNotFound(name) => format!("I'm sorry but I can't find {} from the camera", name),
            Self::InvalidCommand(reason) => format!("Sorry, I can't do that: {}", reason),
            Self::DeviceFault(_) => "Sorry, something went wrong while talking to the robot".to_string(),
            Self::SessionNotActive(_) => "Sorry, the robot session is not running".to_string(),
        }
    }
}
