use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tokio::fs;

use crate::limits::ActuatorLimits;

/// Environment variables named `VISIONARM__<SECTION>__<KEY>` override the file.
pub const ENV_PREFIX: &str = "VISIONARM";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VisionArmConfig {
    pub camera: CameraConfig,
    pub vision: VisionConfig,
    pub arm: ArmConfig,
    pub rover: RoverConfig,
    pub limits: ActuatorLimits,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    /// Camera device index
    pub index: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VisionConfig {
    /// OpenAI-compatible endpoint, without the `/chat/completions` suffix
    pub base_url: String,
    pub model_name: String,
    /// Takes precedence over `api_key_env`
    pub api_key: Option<String>,
    /// Environment variable holding the API key
    pub api_key_env: String,
    /// Low temperature keeps coordinate extraction repeatable
    pub temperature: f32,
    /// Frames are downsampled to fit within this square before upload
    pub max_image_dimension: u32,
    pub jpeg_quality: u8,
    pub timeout_seconds: u64,
    /// System instructions sent with every frame
    pub instructions: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArmConfig {
    /// Serial port of the arm. Vision-only sessions leave this unset.
    pub port: Option<String>,
    pub baud_rate: u32,
    pub read_timeout_ms: u64,
    /// Upper bound on a blocking move before it is treated as a fault
    pub motion_timeout_secs: u64,
    pub poll_interval_ms: u64,
    /// Point-to-point mode used for joint moves (4 = joint-space MOVJ)
    pub joint_mode: u8,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoverConfig {
    /// Serial port of the Firmata board driving the wheels
    pub port: Option<String>,
    pub baud_rate: u32,
    /// The board resets when the port opens
    pub settle_ms: u64,
    pub pins: RoverPins,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoverPins {
    pub in1: u8,
    pub in2: u8,
    pub in3: u8,
    pub in4: u8,
    pub ena: u8,
    pub enb: u8,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self { index: 0 }
    }
}

impl Default for VisionConfig {
    fn default() -> Self {
        Self {
            base_url: "https://generativelanguage.googleapis.com/v1beta/openai".to_string(),
            model_name: "gemini-2.0-flash".to_string(),
            api_key: None,
            api_key_env: "GOOGLE_API_KEY".to_string(),
            temperature: 0.3,
            max_image_dimension: 800,
            jpeg_quality: 85,
            timeout_seconds: 60,
            instructions: include_str!("../prompts/vision_instructions.txt").to_string(),
        }
    }
}

impl Default for ArmConfig {
    fn default() -> Self {
        Self {
            port: None,
            baud_rate: 115_200,
            read_timeout_ms: 500,
            motion_timeout_secs: 60,
            poll_interval_ms: 100,
            joint_mode: 4,
        }
    }
}

impl Default for RoverConfig {
    fn default() -> Self {
        Self {
            port: None,
            baud_rate: 57_600,
            settle_ms: 2_000,
            pins: RoverPins::default(),
        }
    }
}

impl Default for RoverPins {
    fn default() -> Self {
        Self {
            in1: 2,
            in2: 4,
            in3: 7,
            in4: 8,
            ena: 3,
            enb: 5,
        }
    }
}

impl VisionConfig {
    pub fn resolve_api_key(&self) -> Option<String> {
        self.api_key
            .clone()
            .or_else(|| std::env::var(&self.api_key_env).ok())
            .filter(|key| !key.trim().is_empty())
    }
}

impl VisionArmConfig {
    /// Defaults, then the TOML file if it exists, then environment overrides.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let settings = config::Config::builder()
            .add_source(config::File::from(path).format(config::FileFormat::Toml).required(false))
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .with_context(|| format!("Failed to read configuration from {}", path.display()))?;

        settings
            .try_deserialize()
            .with_context(|| format!("Invalid configuration in {}", path.display()))
    }

    pub async fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        fs::write(path, content).await?;
        Ok(())
    }
}
