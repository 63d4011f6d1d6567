//! Temporal masking of a region across recent frames.
//!
//! A game screen filmed by a camera shimmers: moiré, rolling brightness and
//! blinking cursors flip individual pixels from frame to frame while the text
//! underneath stays put. Keeping only the pixels that agree across the whole
//! window leaves the stable content for OCR.

use std::collections::VecDeque;
use std::sync::Arc;

use opencv::core::{self, Mat};
use opencv::imgproc;
use opencv::prelude::*;

use crate::capture::Frame;
use crate::config::Region;
use crate::error::{Result, VisionError};
use crate::region::{RegionExtractor, to_grayscale};

/// Intersects `frames[0]` with the stable mask of every later frame.
///
/// A pixel survives only if its difference from the base frame stays at or
/// below `diff_threshold` in all frames of the window. Frames are ordered
/// oldest to newest and must share one size.
pub fn temporal_mask(frames: &[Mat], diff_threshold: u8) -> Result<Mat> {
    let (base, rest) = frames.split_first().ok_or(VisionError::EmptyWindow)?;
    let expected = (base.cols(), base.rows());

    let mut stable_image = base.try_clone()?;
    for frame in rest {
        let actual = (frame.cols(), frame.rows());
        if actual != expected {
            return Err(VisionError::FrameSizeMismatch { expected, actual });
        }

        let mut diff = Mat::default();
        core::absdiff(base, frame, &mut diff)?;

        let mut changed = Mat::default();
        imgproc::threshold(
            &diff,
            &mut changed,
            diff_threshold as f64,
            255.0,
            imgproc::THRESH_BINARY,
        )?;

        let mut stable = Mat::default();
        core::bitwise_not(&changed, &mut stable, &core::no_array())?;

        let mut accumulated = Mat::default();
        core::bitwise_and(&stable_image, &stable, &mut accumulated, &core::no_array())?;
        stable_image = accumulated;
    }

    Ok(stable_image)
}

struct WindowEntry {
    frame: Arc<Frame>,
    gray: Mat,
}

/// The most recent `capacity` frames and their grayscale versions.
pub struct FrameWindow {
    capacity: usize,
    entries: VecDeque<WindowEntry>,
}

impl FrameWindow {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            entries: VecDeque::with_capacity(capacity),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Appends `frame`, evicting the oldest entry when full. The frame is shared
    /// with the slot it came from, only its grayscale copy is new.
    pub fn push(&mut self, frame: Arc<Frame>) -> Result<()> {
        let gray = to_grayscale(&frame.image)?;
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(WindowEntry { frame, gray });
        Ok(())
    }

    pub fn oldest(&self) -> Option<&Frame> {
        self.entries.front().map(|e| e.frame.as_ref())
    }

    pub fn newest(&self) -> Option<&Frame> {
        self.entries.back().map(|e| e.frame.as_ref())
    }

    pub fn grays(&self) -> impl Iterator<Item = &Mat> {
        self.entries.iter().map(|e| &e.gray)
    }

    /// Binarizes `region` in every frame of the window and masks the result.
    ///
    /// `Ok(None)` when the region crop is empty, meaning this cycle has nothing to read.
    pub fn masked_region(
        &self,
        extractor: &RegionExtractor,
        region: Region,
        diff_threshold: u8,
    ) -> Result<Option<Mat>> {
        if self.entries.is_empty() {
            return Err(VisionError::EmptyWindow);
        }

        let mut binaries = Vec::with_capacity(self.entries.len());
        for gray in self.grays() {
            let binary = extractor.binary_region(gray, region)?;
            if binary.empty() {
                return Ok(None);
            }
            binaries.push(binary);
        }

        temporal_mask(&binaries, diff_threshold).map(Some)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RegionTable;
    use opencv::core::{CV_8UC1, CV_8UC3, Scalar};

    fn binary_pattern(seed: i32) -> Mat {
        let mut image = Mat::new_rows_cols_with_default(16, 16, CV_8UC1, Scalar::all(0.0)).unwrap();
        for y in 0..16 {
            for x in 0..16 {
                if (x + y + seed) % 3 == 0 {
                    *image.at_2d_mut::<u8>(y, x).unwrap() = 255;
                }
            }
        }
        image
    }

    fn count_white(image: &Mat) -> i32 {
        core::count_non_zero(image).unwrap()
    }

    fn frame(value: f64, sequence: u64) -> Arc<Frame> {
        Arc::new(Frame {
            image: Mat::new_rows_cols_with_default(108, 192, CV_8UC3, Scalar::all(value)).unwrap(),
            sequence,
        })
    }

    #[test]
    fn identical_frames_keep_base() {
        let base = binary_pattern(0);
        let frames: Vec<Mat> = (0..5).map(|_| base.try_clone().unwrap()).collect();

        let masked = temporal_mask(&frames, 30).unwrap();
        let mut diff = Mat::default();
        core::absdiff(&masked, &base, &mut diff).unwrap();
        assert_eq!(count_white(&diff), 0);
        assert_eq!(count_white(&masked), count_white(&base));
    }

    #[test]
    fn single_frame_is_returned_unchanged() {
        let base = binary_pattern(1);
        let masked = temporal_mask(&[base.try_clone().unwrap()], 30).unwrap();
        assert_eq!(count_white(&masked), count_white(&base));
    }

    #[test]
    fn empty_window_is_an_error() {
        assert!(matches!(
            temporal_mask(&[], 30),
            Err(VisionError::EmptyWindow)
        ));
    }

    #[test]
    fn frames_differing_everywhere_blank_out() {
        let white = Mat::new_rows_cols_with_default(8, 8, CV_8UC1, Scalar::all(255.0)).unwrap();
        let black = Mat::new_rows_cols_with_default(8, 8, CV_8UC1, Scalar::all(0.0)).unwrap();

        let masked = temporal_mask(&[white, black], 30).unwrap();
        assert_eq!(count_white(&masked), 0);
    }

    #[test]
    fn flickering_pixel_is_suppressed() {
        let base = Mat::new_rows_cols_with_default(4, 4, CV_8UC1, Scalar::all(255.0)).unwrap();
        let mut flicker = base.try_clone().unwrap();
        *flicker.at_2d_mut::<u8>(2, 1).unwrap() = 0;

        let masked = temporal_mask(&[base.try_clone().unwrap(), flicker, base], 30).unwrap();
        assert_eq!(*masked.at_2d::<u8>(2, 1).unwrap(), 0);
        assert_eq!(count_white(&masked), 15);
    }

    #[test]
    fn size_mismatch_is_reported() {
        let a = Mat::new_rows_cols_with_default(4, 4, CV_8UC1, Scalar::all(0.0)).unwrap();
        let b = Mat::new_rows_cols_with_default(5, 4, CV_8UC1, Scalar::all(0.0)).unwrap();
        assert!(matches!(
            temporal_mask(&[a, b], 30),
            Err(VisionError::FrameSizeMismatch { .. })
        ));
    }

    #[test]
    fn window_evicts_oldest() {
        let mut window = FrameWindow::new(3);
        for sequence in 1..=5 {
            window.push(frame(sequence as f64, sequence)).unwrap();
            assert!(window.len() <= 3);
        }
        assert_eq!(window.len(), 3);
        assert_eq!(window.oldest().unwrap().sequence, 3);
        assert_eq!(window.newest().unwrap().sequence, 5);
        assert!(window.grays().all(|g| g.channels() == 1));
    }

    #[test]
    fn masked_region_over_stable_window() {
        let table = RegionTable::default();
        let extractor = RegionExtractor::new(&table, 192, 108);

        let mut window = FrameWindow::new(4);
        for sequence in 1..=4 {
            window.push(frame(250.0, sequence)).unwrap();
        }

        let masked = window
            .masked_region(&extractor, Region::Message, 30)
            .unwrap()
            .unwrap();
        let rect = extractor.region(Region::Message).rect;
        assert_eq!((masked.cols(), masked.rows()), (rect.width, rect.height));
        assert_eq!(count_white(&masked), rect.width * rect.height);
    }

    #[test]
    fn masked_region_on_empty_window_is_an_error() {
        let table = RegionTable::default();
        let extractor = RegionExtractor::new(&table, 192, 108);
        let window = FrameWindow::new(4);
        assert!(window.masked_region(&extractor, Region::Level, 30).is_err());
    }
}
