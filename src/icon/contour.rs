use log::debug;
use opencv::core::{Mat, Point, Rect, Vector};
use opencv::imgproc;
use opencv::prelude::*;

use crate::error::{Result, VisionError};
use crate::region::{crop_clipped, to_grayscale};

pub const DEFAULT_THRESHOLD: u8 = 130;
pub const DEFAULT_RETRY_THRESHOLD: u8 = 200;

/// Tightens an icon cell to the bounding box of the sprite inside it.
#[derive(Debug, Clone, Copy)]
pub struct ContourCropper {
    threshold: u8,
    retry_threshold: u8,
}

impl Default for ContourCropper {
    fn default() -> Self {
        Self::new(DEFAULT_THRESHOLD, DEFAULT_RETRY_THRESHOLD)
    }
}

impl ContourCropper {
    /// Pixels at or below a threshold count as sprite. `retry_threshold` should
    /// be the looser (higher) of the two.
    pub fn new(threshold: u8, retry_threshold: u8) -> Self {
        Self {
            threshold,
            retry_threshold,
        }
    }

    /// Crops `icon` to the union of the bounding boxes of all external contours.
    ///
    /// Every contour counts, not just the largest one, so sprites drawn as
    /// several disconnected pieces are kept whole.
    pub fn tighten(&self, icon: &Mat) -> Result<Mat> {
        if icon.empty() {
            return Err(VisionError::EmptyImage);
        }

        let gray = to_grayscale(icon)?;
        let bounds = match silhouette_bounds(&gray, self.threshold)? {
            Some(bounds) => bounds,
            None => {
                debug!(
                    "no contours at {}, retrying at {}",
                    self.threshold, self.retry_threshold
                );
                silhouette_bounds(&gray, self.retry_threshold)?
                    .ok_or(VisionError::NoContoursFound)?
            }
        };

        debug!("icon bounds {:?}", bounds);
        crop_clipped(icon, bounds)
    }
}

fn silhouette_bounds(gray: &Mat, threshold: u8) -> Result<Option<Rect>> {
    let mut binary = Mat::default();
    imgproc::threshold(
        gray,
        &mut binary,
        threshold as f64,
        255.0,
        imgproc::THRESH_BINARY_INV,
    )?;

    let mut contours = Vector::<Vector<Point>>::new();
    imgproc::find_contours(
        &binary,
        &mut contours,
        imgproc::RETR_EXTERNAL,
        imgproc::CHAIN_APPROX_SIMPLE,
        Point::default(),
    )?;

    let mut bounds: Option<Rect> = None;
    for contour in contours.iter() {
        let rect = imgproc::bounding_rect(&contour)?;
        bounds = Some(match bounds {
            Some(current) => union(current, rect),
            None => rect,
        });
    }
    Ok(bounds)
}

fn union(a: Rect, b: Rect) -> Rect {
    let x1 = a.x.min(b.x);
    let y1 = a.y.min(b.y);
    let x2 = (a.x + a.width).max(b.x + b.width);
    let y2 = (a.y + a.height).max(b.y + b.height);
    Rect::new(x1, y1, x2 - x1, y2 - y1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use opencv::core::{CV_8UC3, Scalar, Vec3b};

    fn cell_with(shapes: &[(Rect, f64)]) -> Mat {
        let mut cell =
            Mat::new_rows_cols_with_default(60, 60, CV_8UC3, Scalar::all(255.0)).unwrap();
        for (rect, value) in shapes {
            imgproc::rectangle(
                &mut cell,
                *rect,
                Scalar::all(*value),
                imgproc::FILLED,
                imgproc::LINE_8,
                0,
            )
            .unwrap();
        }
        cell
    }

    #[test]
    fn union_covers_both_rectangles() {
        let merged = union(Rect::new(10, 12, 8, 6), Rect::new(30, 40, 10, 5));
        assert_eq!(merged, Rect::new(10, 12, 30, 33));
    }

    #[test]
    fn tightens_to_single_sprite() {
        let cell = cell_with(&[(Rect::new(20, 15, 12, 18), 0.0)]);
        let icon = ContourCropper::default().tighten(&cell).unwrap();

        assert_eq!((icon.cols(), icon.rows()), (12, 18));
        assert_eq!(icon.at_2d::<Vec3b>(0, 0).unwrap()[0], 0);
    }

    #[test]
    fn keeps_disconnected_fragments() {
        let cell = cell_with(&[
            (Rect::new(10, 12, 8, 6), 0.0),
            (Rect::new(30, 40, 10, 5), 40.0),
        ]);
        let icon = ContourCropper::default().tighten(&cell).unwrap();

        assert_eq!((icon.cols(), icon.rows()), (30, 33));
    }

    #[test]
    fn retries_with_looser_threshold() {
        // 170 is lighter than the primary cut but darker than the retry cut
        let cell = cell_with(&[(Rect::new(5, 6, 20, 10), 170.0)]);
        let icon = ContourCropper::default().tighten(&cell).unwrap();

        assert_eq!((icon.cols(), icon.rows()), (20, 10));
    }

    #[test]
    fn blank_cell_has_no_contours() {
        let cell = cell_with(&[]);
        assert!(matches!(
            ContourCropper::default().tighten(&cell),
            Err(VisionError::NoContoursFound)
        ));
    }

    #[test]
    fn empty_input_is_rejected() {
        assert!(matches!(
            ContourCropper::default().tighten(&Mat::default()),
            Err(VisionError::EmptyImage)
        ));
    }
}
