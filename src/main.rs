use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info, warn};

use visionarm::devices::HardwareProvider;
use visionarm::intent::{DriveDirection, EndEffectorState, JointTargets, SpeedTier, ToolCall};
use visionarm::vision_model::RemoteVisionModel;
use visionarm::{
    logging, CommandDispatcher, DeviceSession, DispatchReport, MotionIntent, Operation, SessionHandle, SessionWorker,
    VisionArmConfig,
};

#[derive(Parser)]
#[command(name = "visionarm")]
#[command(about = "Vision-guided control of a Dobot arm and a Firmata rover")]
struct Args {
    /// Configuration file path
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    /// Camera device index
    #[arg(short = 'd', long)]
    camera_device: Option<u32>,

    /// Serial port of the arm
    #[arg(long)]
    arm_port: Option<String>,

    /// Serial port of the rover board
    #[arg(long)]
    rover_port: Option<String>,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Describe what the camera sees
    Look,
    /// Move the tool onto a named object
    Goto { name: String },
    /// Move the arm joints; joints left out keep their angle
    Joints {
        #[arg(long, allow_hyphen_values = true)]
        base: Option<f64>,
        #[arg(long)]
        shoulder: Option<f64>,
        #[arg(long)]
        elbow: Option<f64>,
        #[arg(long)]
        end_effector: Option<f64>,
        /// Turn the suction cup on after the move
        #[arg(long)]
        suck: bool,
    },
    /// Return the arm to its resting pose
    Home,
    /// Drive the rover for a fixed time, then stop
    Drive {
        #[arg(value_enum)]
        direction: Heading,
        #[arg(short, long, value_enum, default_value = "moderate")]
        speed: Speed,
        /// Seconds
        #[arg(short = 't', long, default_value_t = 1.0)]
        duration: f64,
    },
    /// Stop the rover
    Stop,
    /// Read JSON tool calls from stdin, one per line
    Interactive,
    /// Write the effective configuration to the config path
    InitConfig,
}

#[derive(Clone, Copy, ValueEnum)]
enum Heading {
    Forward,
    Backward,
}

#[derive(Clone, Copy, ValueEnum)]
enum Speed {
    Low,
    Moderate,
    High,
}

impl From<Heading> for DriveDirection {
    fn from(heading: Heading) -> Self {
        match heading {
            Heading::Forward => DriveDirection::Forward,
            Heading::Backward => DriveDirection::Backward,
        }
    }
}

impl From<Speed> for SpeedTier {
    fn from(speed: Speed) -> Self {
        match speed {
            Speed::Low => SpeedTier::Low,
            Speed::Moderate => SpeedTier::Moderate,
            Speed::High => SpeedTier::High,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    logging::init(args.verbose);
    if dotenvy::dotenv().is_ok() {
        info!("Loaded environment from .env");
    }

    info!("Starting visionarm");

    let mut config = VisionArmConfig::load(&args.config)?;
    if let Some(index) = args.camera_device {
        config.camera.index = index;
    }
    if args.arm_port.is_some() {
        config.arm.port = args.arm_port.clone();
    }
    if args.rover_port.is_some() {
        config.rover.port = args.rover_port.clone();
    }
    info!("Configuration loaded successfully");

    let operation = match args.command {
        Command::InitConfig => {
            config.save(&args.config).await?;
            info!("Configuration written to {}", args.config);
            return Ok(());
        }
        Command::Interactive => None,
        Command::Look => Some(Operation::Describe),
        Command::Goto { name } => Some(Operation::Motion(MotionIntent::MoveToNamedObject(name))),
        Command::Joints {
            base,
            shoulder,
            elbow,
            end_effector,
            suck,
        } => Some(Operation::Motion(MotionIntent::MoveJoints {
            targets: JointTargets {
                base,
                shoulder,
                elbow,
                end_effector,
            },
            end_effector_state: if suck {
                EndEffectorState::On
            } else {
                EndEffectorState::Off
            },
        })),
        Command::Home => Some(Operation::Motion(MotionIntent::home())),
        Command::Drive {
            direction,
            speed,
            duration,
        } => Some(Operation::Motion(MotionIntent::Drive {
            direction: direction.into(),
            speed: speed.into(),
            duration,
        })),
        Command::Stop => Some(Operation::Motion(MotionIntent::Stop)),
    };

    let handle = SessionWorker::spawn(config, |config| {
        let model = RemoteVisionModel::new(&config.vision)?;
        let dispatcher = CommandDispatcher::from_config(Box::new(model), config);
        let session = DeviceSession::open(config, &mut HardwareProvider)?;
        Ok((session, dispatcher))
    })
    .await?;

    let outcome = match operation {
        Some(operation) => handle.run(operation).await.map(|report| print_report(&report)),
        None => run_interactive(&handle).await,
    };

    handle.shutdown().await;
    outcome?;
    Ok(())
}

fn print_report(report: &DispatchReport) {
    if report.success {
        println!("{}", report.message);
    } else {
        eprintln!("{}", report.message);
    }
}

async fn run_interactive(handle: &SessionHandle) -> Result<(), visionarm::BridgeError> {
    info!("Reading tool calls from stdin, one JSON object per line");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        let line = tokio::select! {
            line = lines.next_line() => line,
            _ = tokio::signal::ctrl_c() => {
                info!("Received interrupt, shutting down");
                return Ok(());
            }
        };

        let line = match line {
            Ok(Some(line)) => line,
            Ok(None) => return Ok(()),
            Err(e) => {
                error!("Failed to read stdin: {}", e);
                return Ok(());
            }
        };
        if line.trim().is_empty() {
            continue;
        }

        let call = match serde_json::from_str::<ToolCall>(&line) {
            Ok(call) => call,
            Err(e) => {
                warn!("Ignoring malformed tool call: {}", e);
                println!("{}", serde_json::json!({ "success": false, "message": format!("Invalid tool call: {}", e) }));
                continue;
            }
        };

        let report = handle.run(call.into()).await?;
        match serde_json::to_string(&report) {
            Ok(json) => println!("{}", json),
            Err(e) => error!("Failed to serialize report: {}", e),
        }
    }
}
