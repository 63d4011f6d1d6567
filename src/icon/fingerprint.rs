use std::fmt;
use std::str::FromStr;

use opencv::core::{Mat, Size};
use opencv::imgproc;
use opencv::prelude::*;

use crate::error::{Result, VisionError};
use crate::region::to_grayscale;

const HASH_COLUMNS: i32 = 9;
const HASH_ROWS: i32 = 8;

/// 64-bit difference hash of an icon.
///
/// Bit order is row-major: the first character of the string form is the
/// comparison of column 0 against column 1 in row 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fingerprint(u64);

impl Fingerprint {
    pub const BITS: u32 = 64;

    pub fn from_bits(bits: u64) -> Self {
        Self(bits)
    }

    pub fn bits(&self) -> u64 {
        self.0
    }

    /// dHash: grayscale, area-resize to 9x8, then one bit per horizontal
    /// neighbour pair, set when the left pixel is strictly brighter.
    pub fn of_image(image: &Mat) -> Result<Self> {
        if image.empty() {
            return Err(VisionError::EmptyImage);
        }

        let gray = to_grayscale(image)?;
        let mut resized = Mat::default();
        imgproc::resize(
            &gray,
            &mut resized,
            Size::new(HASH_COLUMNS, HASH_ROWS),
            0.0,
            0.0,
            imgproc::INTER_AREA,
        )?;

        let mut bits = 0u64;
        for y in 0..HASH_ROWS {
            for x in 0..HASH_COLUMNS - 1 {
                let left = *resized.at_2d::<u8>(y, x)?;
                let right = *resized.at_2d::<u8>(y, x + 1)?;
                bits = (bits << 1) | u64::from(left > right);
            }
        }
        Ok(Self(bits))
    }

    /// Number of differing bits.
    pub fn distance(&self, other: &Fingerprint) -> u32 {
        (self.0 ^ other.0).count_ones()
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:064b}", self.0)
    }
}

impl FromStr for Fingerprint {
    type Err = VisionError;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.len() != Self::BITS as usize || !s.bytes().all(|b| b == b'0' || b == b'1') {
            return Err(VisionError::InvalidFingerprint(s.to_string()));
        }
        u64::from_str_radix(s, 2)
            .map(Self)
            .map_err(|_| VisionError::InvalidFingerprint(s.to_string()))
    }
}
