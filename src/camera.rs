use anyhow::{anyhow, Context, Result};
use image::RgbImage;
use nokhwa::pixel_format::RgbFormat;
use nokhwa::utils::{CameraIndex, RequestedFormat, RequestedFormatType};
use nokhwa::Camera;
use tracing::{debug, info, warn};

use crate::config::CameraConfig;
use crate::devices::FrameSource;

pub struct CameraSystem {
    index: u32,
    camera: Option<Camera>,
}

impl CameraSystem {
    /// Opens the camera at the configured index and checks that it delivers a frame.
    pub fn open(config: &CameraConfig) -> Result<Self> {
        info!("Initializing camera {}", config.index);

        let camera_index = CameraIndex::Index(config.index);
        let requested_format = RequestedFormat::new::<RgbFormat>(RequestedFormatType::AbsoluteHighestFrameRate);

        let mut camera = Camera::new(camera_index, requested_format)
            .with_context(|| format!("Failed to open camera at index {}", config.index))?;
        camera
            .open_stream()
            .with_context(|| format!("Failed to start stream on camera {}", config.index))?;

        // Some drivers only fail on the first read.
        let _test_frame = camera
            .frame()
            .with_context(|| format!("Camera {} opened but delivered no frame", config.index))?;

        info!("Camera initialized successfully");
        Ok(Self {
            index: config.index,
            camera: Some(camera),
        })
    }
}

impl FrameSource for CameraSystem {
    fn read_frame(&mut self) -> Result<RgbImage> {
        let camera = self
            .camera
            .as_mut()
            .ok_or_else(|| anyhow!("Camera {} already released", self.index))?;

        let frame = camera.frame().context("Camera frame capture failed")?;
        let decoded = frame.decode_image::<RgbFormat>().context("Failed to decode camera frame")?;
        let (width, height) = (decoded.width(), decoded.height());
        debug!("Captured camera frame: {}x{}", width, height);

        RgbImage::from_raw(width, height, decoded.into_raw())
            .ok_or_else(|| anyhow!("Camera frame buffer does not match {}x{}", width, height))
    }

    fn release(&mut self) -> Result<()> {
        if let Some(mut camera) = self.camera.take() {
            camera.stop_stream().context("Error stopping camera stream")?;
            info!("Camera released");
        }
        Ok(())
    }
}

impl Drop for CameraSystem {
    fn drop(&mut self) {
        if let Some(camera) = self.camera.as_mut() {
            warn!("CameraSystem dropped without release, stopping stream");
            let _ = camera.stop_stream();
        }
    }
}
