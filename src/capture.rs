mod device;

pub use device::{CameraDevice, CaptureDevice, DetectedDevice, scan_devices};

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use log::{debug, info, warn};
use opencv::core::{Mat, Vector};
use opencv::imgcodecs;
use opencv::prelude::*;

use crate::error::{Result, VisionError};

const ACQUISITION_YIELD: Duration = Duration::from_millis(1);

/// A colour frame and its position in arrival order.
pub struct Frame {
    pub image: Mat,
    pub sequence: u64,
}

impl Frame {
    pub fn width(&self) -> i32 {
        self.image.cols()
    }

    pub fn height(&self) -> i32 {
        self.image.rows()
    }
}

/// Holds the most recent frame. One writer (the acquisition thread), any number
/// of readers. The lock only guards swapping and cloning the `Arc`, so a reader
/// holding a frame never delays the next store.
#[derive(Default)]
pub struct FrameSlot {
    latest: Mutex<Option<Arc<Frame>>>,
}

impl FrameSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the stored frame, last write wins.
    pub fn store(&self, image: Mat) {
        let mut latest = self.latest.lock().unwrap_or_else(PoisonError::into_inner);
        let sequence = latest.as_ref().map_or(1, |f| f.sequence + 1);
        *latest = Some(Arc::new(Frame { image, sequence }));
    }

    pub fn latest(&self) -> Result<Arc<Frame>> {
        let latest = self.latest.lock().unwrap_or_else(PoisonError::into_inner);
        latest.clone().ok_or(VisionError::FrameUnavailable)
    }

    /// Sequence number of the stored frame.
    pub fn latest_sequence(&self) -> Option<u64> {
        let latest = self.latest.lock().unwrap_or_else(PoisonError::into_inner);
        latest.as_ref().map(|f| f.sequence)
    }
}

/// Owns the capture device and runs the acquisition loop on its own thread.
pub struct FrameSource {
    device: Arc<Mutex<Box<dyn CaptureDevice>>>,
    index: i32,
    resolution: (i32, i32),
    slot: Arc<FrameSlot>,
    running: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
    released: bool,
}

impl FrameSource {
    pub fn new(device: Box<dyn CaptureDevice>) -> Self {
        let index = device.index();
        let resolution = device.resolution();
        Self {
            device: Arc::new(Mutex::new(device)),
            index,
            resolution,
            slot: Arc::new(FrameSlot::new()),
            running: Arc::new(AtomicBool::new(false)),
            handle: None,
            released: false,
        }
    }

    /// Opens camera `index` and configures it for the requested resolution.
    pub fn open_camera(index: i32, width: i32, height: i32, fps: f64) -> Result<Self> {
        let device = CameraDevice::open(index, width, height, fps)?;
        Ok(Self::new(Box::new(device)))
    }

    pub fn resolution(&self) -> (i32, i32) {
        self.resolution
    }

    pub fn is_running(&self) -> bool {
        self.handle.is_some()
    }

    /// Shared handle to the latest-frame slot for consumer loops.
    pub fn slot(&self) -> Arc<FrameSlot> {
        Arc::clone(&self.slot)
    }

    pub fn start(&mut self) -> Result<()> {
        if self.released {
            return Err(VisionError::DeviceUnavailable(self.index));
        }
        if self.handle.is_some() {
            return Ok(());
        }

        info!("starting acquisition on device {}", self.index);
        self.running.store(true, Ordering::Release);

        let device = Arc::clone(&self.device);
        let slot = Arc::clone(&self.slot);
        let running = Arc::clone(&self.running);
        let handle = thread::Builder::new()
            .name("frame-acquisition".to_string())
            .spawn(move || acquisition_loop(device, slot, running))?;
        self.handle = Some(handle);
        Ok(())
    }

    /// Asks the loop to exit and waits for it. An in-flight read is not interrupted.
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::Release);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("acquisition thread panicked");
            }
            info!("acquisition on device {} stopped", self.index);
        }
    }

    pub fn get_latest_frame(&self) -> Result<Arc<Frame>> {
        if self.released {
            return Err(VisionError::DeviceUnavailable(self.index));
        }
        self.slot.latest()
    }

    pub fn save_current_frame(&self, path: &Path) -> Result<()> {
        let frame = self.get_latest_frame()?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let written = imgcodecs::imwrite(&path.to_string_lossy(), &frame.image, &Vector::new())?;
        if !written {
            return Err(VisionError::Io(std::io::Error::other(format!(
                "failed to write {}",
                path.display()
            ))));
        }
        info!("saved frame {} as {}", frame.sequence, path.display());
        Ok(())
    }

    pub fn release(&mut self) -> Result<()> {
        if self.released {
            return Ok(());
        }
        self.stop();
        self.device
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .release()?;
        self.released = true;
        info!("device {} released", self.index);
        Ok(())
    }
}

impl Drop for FrameSource {
    fn drop(&mut self) {
        self.stop();
    }
}

fn acquisition_loop(
    device: Arc<Mutex<Box<dyn CaptureDevice>>>,
    slot: Arc<FrameSlot>,
    running: Arc<AtomicBool>,
) {
    while running.load(Ordering::Acquire) {
        let read = device
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .read_frame();

        match read {
            Ok(Some(image)) => slot.store(image),
            Ok(None) => debug!("empty read skipped"),
            Err(e) => warn!("frame read failed, keeping previous frame: {}", e),
        }

        thread::sleep(ACQUISITION_YIELD);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::time::Instant;

    use opencv::core::{CV_8UC3, Scalar};

    enum Read {
        Frame(u8),
        Fail,
    }

    struct ScriptedDevice {
        reads: VecDeque<Read>,
    }

    impl ScriptedDevice {
        fn boxed(reads: Vec<Read>) -> Box<dyn CaptureDevice> {
            Box::new(Self {
                reads: reads.into(),
            })
        }
    }

    impl CaptureDevice for ScriptedDevice {
        fn index(&self) -> i32 {
            7
        }

        fn resolution(&self) -> (i32, i32) {
            (32, 24)
        }

        fn read_frame(&mut self) -> Result<Option<Mat>> {
            match self.reads.pop_front() {
                Some(Read::Frame(value)) => Ok(Some(filled(value))),
                Some(Read::Fail) => Err(VisionError::FrameUnavailable),
                None => Ok(None),
            }
        }

        fn release(&mut self) -> Result<()> {
            Ok(())
        }
    }

    fn filled(value: u8) -> Mat {
        Mat::new_rows_cols_with_default(24, 32, CV_8UC3, Scalar::all(value as f64)).unwrap()
    }

    fn wait_for_sequence(source: &FrameSource, sequence: u64) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while source.slot().latest_sequence() < Some(sequence) {
            assert!(Instant::now() < deadline, "frame {} never arrived", sequence);
            thread::sleep(Duration::from_millis(5));
        }
    }

    #[test]
    fn slot_is_empty_until_first_store() {
        let slot = FrameSlot::new();
        assert!(matches!(slot.latest(), Err(VisionError::FrameUnavailable)));

        slot.store(filled(10));
        slot.store(filled(20));
        let frame = slot.latest().unwrap();
        assert_eq!(frame.sequence, 2);
        assert_eq!(frame.image.at_2d::<opencv::core::Vec3b>(0, 0).unwrap()[0], 20);
    }

    #[test]
    fn store_proceeds_while_reader_holds_frame() {
        let slot = Arc::new(FrameSlot::new());
        slot.store(filled(1));
        let held = slot.latest().unwrap();

        let writer = {
            let slot = Arc::clone(&slot);
            thread::spawn(move || {
                slot.store(filled(2));
                slot.store(filled(3));
            })
        };
        writer.join().unwrap();

        assert_eq!(held.sequence, 1);
        assert_eq!(held.image.at_2d::<opencv::core::Vec3b>(0, 0).unwrap()[0], 1);
        let latest = slot.latest().unwrap();
        assert_eq!(latest.sequence, 3);
        assert_eq!(latest.image.at_2d::<opencv::core::Vec3b>(0, 0).unwrap()[0], 3);
        assert!(!Arc::ptr_eq(&held, &latest));
    }

    #[test]
    fn readers_share_one_frame() {
        let slot = FrameSlot::new();
        slot.store(filled(5));
        let a = slot.latest().unwrap();
        let b = slot.latest().unwrap();
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn cold_start_then_first_frame() {
        let mut source = FrameSource::new(ScriptedDevice::boxed(vec![Read::Frame(42)]));
        assert!(matches!(
            source.get_latest_frame(),
            Err(VisionError::FrameUnavailable)
        ));

        source.start().unwrap();
        wait_for_sequence(&source, 1);
        source.stop();

        let frame = source.get_latest_frame().unwrap();
        assert_eq!(frame.sequence, 1);
        assert_eq!((frame.width(), frame.height()), (32, 24));
        assert_eq!(frame.image.at_2d::<opencv::core::Vec3b>(5, 5).unwrap()[1], 42);
    }

    #[test]
    fn failed_read_keeps_stale_frame() {
        let mut source = FrameSource::new(ScriptedDevice::boxed(vec![
            Read::Frame(1),
            Read::Fail,
            Read::Fail,
        ]));
        source.start().unwrap();
        wait_for_sequence(&source, 1);
        thread::sleep(Duration::from_millis(50));
        source.stop();

        let frame = source.get_latest_frame().unwrap();
        assert_eq!(frame.sequence, 1);
        assert_eq!(frame.image.at_2d::<opencv::core::Vec3b>(0, 0).unwrap()[2], 1);
    }

    #[test]
    fn latest_frame_wins() {
        let mut source = FrameSource::new(ScriptedDevice::boxed(vec![
            Read::Frame(1),
            Read::Frame(2),
            Read::Frame(3),
        ]));
        source.start().unwrap();
        wait_for_sequence(&source, 3);
        source.stop();

        let frame = source.get_latest_frame().unwrap();
        assert_eq!(frame.sequence, 3);
        assert_eq!(frame.image.at_2d::<opencv::core::Vec3b>(0, 0).unwrap()[0], 3);
    }

    #[test]
    fn stop_joins_the_loop() {
        let mut source = FrameSource::new(ScriptedDevice::boxed(vec![]));
        source.start().unwrap();
        assert!(source.is_running());
        source.stop();
        assert!(!source.is_running());
        // Stopping twice is harmless
        source.stop();
    }

    #[test]
    fn released_source_reports_device_unavailable() {
        let mut source = FrameSource::new(ScriptedDevice::boxed(vec![Read::Frame(9)]));
        source.start().unwrap();
        wait_for_sequence(&source, 1);
        source.release().unwrap();

        assert!(matches!(
            source.get_latest_frame(),
            Err(VisionError::DeviceUnavailable(7))
        ));
        assert!(matches!(
            source.start(),
            Err(VisionError::DeviceUnavailable(7))
        ));
    }

    #[test]
    fn save_current_frame_writes_image() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("shots").join("screenshot_test.png");

        let mut source = FrameSource::new(ScriptedDevice::boxed(vec![Read::Frame(128)]));
        assert!(source.save_current_frame(&path).is_err());

        source.start().unwrap();
        wait_for_sequence(&source, 1);
        source.stop();

        source.save_current_frame(&path).unwrap();
        let loaded = imgcodecs::imread(&path.to_string_lossy(), imgcodecs::IMREAD_COLOR).unwrap();
        assert_eq!((loaded.cols(), loaded.rows()), (32, 24));
    }
}
