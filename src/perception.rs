use anyhow::{Context, Result};
use base64::{engine::general_purpose, Engine as _};
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, RgbImage};
use tracing::{debug, info};

use crate::config::VisionConfig;
use crate::error::BridgeError;
use crate::parser::{self, ParsedResponse};
use crate::session::DeviceSession;
use crate::vision_model::{VisionModel, VisionRequest};

/// Captures a frame and asks the vision model where things are.
pub struct Perceiver {
    model: Box<dyn VisionModel>,
    instructions: String,
    temperature: f32,
    max_dimension: u32,
    jpeg_quality: u8,
}

impl Perceiver {
    pub fn new(model: Box<dyn VisionModel>, config: &VisionConfig) -> Self {
        Self {
            model,
            instructions: config.instructions.clone(),
            temperature: config.temperature,
            max_dimension: config.max_image_dimension,
            jpeg_quality: config.jpeg_quality,
        }
    }

    /// One frame, one model call. A failed read never reaches the model.
    pub fn capture(&self, session: &mut DeviceSession) -> Result<ParsedResponse, BridgeError> {
        let frame = session
            .camera()?
            .read_frame()
            .map_err(|e| BridgeError::CaptureFailed(format!("{:#}", e)))?;

        let image = downsample(frame, self.max_dimension);
        let jpeg_base64 = encode_jpeg_base64(&image, self.jpeg_quality)
            .map_err(|e| BridgeError::CaptureFailed(format!("{:#}", e)))?;

        info!(
            "Sending {}x{} frame to vision model ({} base64 bytes)",
            image.width(),
            image.height(),
            jpeg_base64.len()
        );
        let text = self
            .model
            .describe(&VisionRequest {
                instructions: &self.instructions,
                jpeg_base64: &jpeg_base64,
                temperature: self.temperature,
            })
            .map_err(|e| BridgeError::VisionRequestFailed(format!("{:#}", e)))?;
        info!("Received vision model response: {}", text);

        Ok(parser::parse(&text))
    }
}

/// Shrinks the frame to fit within `max_dimension` square, keeping its aspect
/// ratio. Smaller frames are left untouched.
pub fn downsample(frame: RgbImage, max_dimension: u32) -> DynamicImage {
    let image = DynamicImage::ImageRgb8(frame);
    if image.width() <= max_dimension && image.height() <= max_dimension {
        return image;
    }
    debug!(
        "Downsampling {}x{} frame to fit {}x{}",
        image.width(),
        image.height(),
        max_dimension,
        max_dimension
    );
    image.resize(max_dimension, max_dimension, FilterType::Triangle)
}

pub fn encode_jpeg_base64(image: &DynamicImage, quality: u8) -> Result<String> {
    let mut buffer = Vec::new();
    image
        .write_with_encoder(JpegEncoder::new_with_quality(&mut buffer, quality))
        .context("Failed to encode image as JPEG")?;
    Ok(general_purpose::STANDARD.encode(&buffer))
}
