use log::{debug, info};
use opencv::core::Mat;
use opencv::prelude::*;
use opencv::videoio;

use crate::error::{Result, VisionError};

/// A source of colour frames, owned exclusively by one `FrameSource`.
pub trait CaptureDevice: Send {
    /// Device index used to open it; reported in `DeviceUnavailable`.
    fn index(&self) -> i32;

    /// Actual (width, height) delivered by the device.
    fn resolution(&self) -> (i32, i32);

    /// Reads one frame. `Ok(None)` means the read produced nothing this time.
    fn read_frame(&mut self) -> Result<Option<Mat>>;

    fn release(&mut self) -> Result<()>;
}

/// Camera opened through OpenCV's `VideoCapture`.
pub struct CameraDevice {
    capture: videoio::VideoCapture,
    index: i32,
    width: i32,
    height: i32,
}

impl CameraDevice {
    pub fn open(index: i32, width: i32, height: i32, fps: f64) -> Result<Self> {
        let mut capture = videoio::VideoCapture::new(index, videoio::CAP_ANY)?;
        if !videoio::VideoCapture::is_opened(&capture)? {
            return Err(VisionError::DeviceUnavailable(index));
        }

        capture.set(videoio::CAP_PROP_FRAME_WIDTH, width as f64)?;
        capture.set(videoio::CAP_PROP_FRAME_HEIGHT, height as f64)?;
        capture.set(videoio::CAP_PROP_FPS, fps)?;

        // Read back what the driver actually accepted
        let width = capture.get(videoio::CAP_PROP_FRAME_WIDTH)? as i32;
        let height = capture.get(videoio::CAP_PROP_FRAME_HEIGHT)? as i32;
        info!("camera {} opened at {}x{}", index, width, height);

        Ok(Self {
            capture,
            index,
            width,
            height,
        })
    }
}

impl CaptureDevice for CameraDevice {
    fn index(&self) -> i32 {
        self.index
    }

    fn resolution(&self) -> (i32, i32) {
        (self.width, self.height)
    }

    fn read_frame(&mut self) -> Result<Option<Mat>> {
        let mut frame = Mat::default();
        if !self.capture.read(&mut frame)? || frame.empty() {
            return Ok(None);
        }
        Ok(Some(frame))
    }

    fn release(&mut self) -> Result<()> {
        self.capture.release()?;
        Ok(())
    }
}

/// A device index that delivered at least one frame.
#[derive(Debug, Clone, PartialEq)]
pub struct DetectedDevice {
    pub index: i32,
    pub width: i32,
    pub height: i32,
}

/// Tries every device index below `limit` and reports the ones that deliver frames.
pub fn scan_devices(limit: i32, width: i32, height: i32) -> Vec<DetectedDevice> {
    let mut found = Vec::new();
    for index in 0..limit {
        let mut device = match CameraDevice::open(index, width, height, 30.0) {
            Ok(device) => device,
            Err(e) => {
                debug!("device {}: {}", index, e);
                continue;
            }
        };
        found.extend(check_device(&mut device));
    }
    found
}

/// Reads one frame, then releases the device whatever the outcome.
fn check_device(device: &mut dyn CaptureDevice) -> Option<DetectedDevice> {
    let index = device.index();
    let detected = match device.read_frame() {
        Ok(Some(_)) => {
            let (width, height) = device.resolution();
            info!("device {} delivers {}x{}", index, width, height);
            Some(DetectedDevice {
                index,
                width,
                height,
            })
        }
        Ok(None) => {
            debug!("device {} opened but returned no frame", index);
            None
        }
        Err(e) => {
            debug!("device {} read failed: {}", index, e);
            None
        }
    };

    if let Err(e) = device.release() {
        debug!("device {} release failed: {}", index, e);
    }
    detected
}
