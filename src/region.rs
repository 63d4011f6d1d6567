use std::collections::HashMap;

use log::debug;
use opencv::core::{AlgorithmHint, Mat, Rect};
use opencv::imgproc;
use opencv::prelude::*;

use crate::config::{Region, RegionSpec, RegionTable};
use crate::error::Result;

/// A region with its fractions resolved to pixels for one capture resolution.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedRegion {
    pub rect: Rect,
    pub threshold: u8,
    pub language: String,
}

impl ResolvedRegion {
    pub fn resolve(spec: &RegionSpec, width: i32, height: i32) -> Self {
        let top = (height as f64 * spec.top) as i32;
        let bottom = (height as f64 * spec.bottom) as i32;
        let left = (width as f64 * spec.left) as i32;
        let right = (width as f64 * spec.right) as i32;

        Self {
            rect: Rect::new(left, top, (right - left).max(0), (bottom - top).max(0)),
            threshold: spec.threshold,
            language: spec.language.clone(),
        }
    }
}

/// Crops, grayscales and binarizes the named regions of a frame.
pub struct RegionExtractor {
    regions: HashMap<Region, ResolvedRegion>,
}

impl RegionExtractor {
    pub fn new(table: &RegionTable, width: i32, height: i32) -> Self {
        let regions = Region::ALL
            .iter()
            .map(|&region| {
                let resolved = ResolvedRegion::resolve(table.get(region), width, height);
                debug!("region {} resolved to {:?}", region, resolved.rect);
                (region, resolved)
            })
            .collect();
        Self { regions }
    }

    pub fn region(&self, region: Region) -> &ResolvedRegion {
        &self.regions[&region]
    }

    /// Crops `region` out of `frame`, clipped to the frame bounds.
    /// Returns an empty image when nothing of the region lies inside the frame.
    pub fn crop(&self, frame: &Mat, region: Region) -> Result<Mat> {
        crop_clipped(frame, self.region(region).rect)
    }

    /// Crop, grayscale and binarize with the region's own threshold.
    pub fn binary_region(&self, frame: &Mat, region: Region) -> Result<Mat> {
        let cropped = self.crop(frame, region)?;
        if cropped.empty() {
            return Ok(cropped);
        }
        let gray = to_grayscale(&cropped)?;
        binarize(&gray, self.region(region).threshold)
    }
}

/// Intersects `rect` with the image bounds and copies that part out.
pub fn crop_clipped(image: &Mat, rect: Rect) -> Result<Mat> {
    let x0 = rect.x.clamp(0, image.cols());
    let y0 = rect.y.clamp(0, image.rows());
    let x1 = (rect.x + rect.width).clamp(x0, image.cols());
    let y1 = (rect.y + rect.height).clamp(y0, image.rows());

    if x1 == x0 || y1 == y0 {
        debug!("crop {:?} lies outside {}x{}", rect, image.cols(), image.rows());
        return Ok(Mat::default());
    }

    let roi_view = Mat::roi(image, Rect::new(x0, y0, x1 - x0, y1 - y0))?;
    let mut roi = Mat::default();
    opencv::core::copy_to(&roi_view, &mut roi, &opencv::core::no_array())?;
    Ok(roi)
}

/// BGR to single channel. Single-channel input is copied as is.
pub fn to_grayscale(image: &Mat) -> Result<Mat> {
    if image.channels() == 1 {
        return Ok(image.try_clone()?);
    }

    let mut gray = Mat::default();
    imgproc::cvt_color(
        image,
        &mut gray,
        imgproc::COLOR_BGR2GRAY,
        0,
        AlgorithmHint::ALGO_HINT_DEFAULT,
    )?;
    Ok(gray)
}

/// Pixels at or above `threshold` become 255, everything else 0.
pub fn binarize(gray: &Mat, threshold: u8) -> Result<Mat> {
    let mut binary = Mat::default();
    // THRESH_BINARY keeps pixels strictly above the cut, so shift it down by one
    imgproc::threshold(
        gray,
        &mut binary,
        threshold as f64 - 1.0,
        255.0,
        imgproc::THRESH_BINARY,
    )?;
    Ok(binary)
}
