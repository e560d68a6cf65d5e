pub mod camera;
pub mod config;
pub mod devices;
pub mod dispatcher;
pub mod dobot;
pub mod error;
pub mod intent;
pub mod limits;
pub mod logging;
pub mod parser;
pub mod perception;
pub mod rover;
pub mod session;
pub mod transform;
pub mod vision_model;
pub mod worker;

pub use config::VisionArmConfig;
pub use dispatcher::{CommandDispatcher, DispatchReport};
pub use error::BridgeError;
pub use intent::{MotionIntent, Operation};
pub use session::{DeviceSession, RobotPose, SessionState};
pub use worker::{SessionHandle, SessionWorker};
