use log::{debug, warn};
use opencv::core::{Mat, Rect};
use opencv::prelude::*;

use super::{ContourCropper, Fingerprint, IconMatcher, MatchResult};
use crate::error::{Result, VisionError};
use crate::reference::ReferenceRecord;
use crate::region::crop_clipped;

pub const TEAM_SLOTS: usize = 6;

/// Per-slot results of one team-box scan, as parallel lists of length six.
///
/// A slot whose icon could not be isolated or matched has `None` in `keys`,
/// `distances` and, if cropping failed, `icons`. The same key may appear in
/// several slots.
pub struct TeamRecognition {
    pub keys: Vec<Option<String>>,
    pub distances: Vec<Option<u32>>,
    pub bands: Vec<Mat>,
    pub icons: Vec<Option<Mat>>,
}

impl TeamRecognition {
    fn with_capacity() -> Self {
        Self {
            keys: Vec::with_capacity(TEAM_SLOTS),
            distances: Vec::with_capacity(TEAM_SLOTS),
            bands: Vec::with_capacity(TEAM_SLOTS),
            icons: Vec::with_capacity(TEAM_SLOTS),
        }
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn match_at(&self, slot: usize) -> Option<MatchResult> {
        let key = self.keys.get(slot)?.clone()?;
        let distance = (*self.distances.get(slot)?)?;
        Some(MatchResult { key, distance })
    }
}

/// Splits a team-list crop into six horizontal bands and identifies each icon.
#[derive(Debug, Clone, Copy, Default)]
pub struct TeamRecognizer {
    cropper: ContourCropper,
    matcher: IconMatcher,
}

impl TeamRecognizer {
    pub fn new(cropper: ContourCropper, matcher: IconMatcher) -> Self {
        Self { cropper, matcher }
    }

    pub fn matcher(&self) -> &IconMatcher {
        &self.matcher
    }

    pub fn recognize(&self, team_box: &Mat, records: &[ReferenceRecord]) -> Result<TeamRecognition> {
        if team_box.empty() || team_box.rows() < TEAM_SLOTS as i32 {
            return Err(VisionError::EmptyImage);
        }

        // Remainder rows at the bottom are ignored
        let band_height = team_box.rows() / TEAM_SLOTS as i32;
        let width = team_box.cols();

        let mut recognition = TeamRecognition::with_capacity();
        for slot in 0..TEAM_SLOTS {
            let top = band_height * slot as i32;
            let band = crop_clipped(team_box, Rect::new(0, top, width, band_height))?;

            let (icon, matched) = match self.recognize_slot(&band, records) {
                Ok(result) => result,
                Err(e) => {
                    warn!("slot {} skipped: {}", slot, e);
                    (None, None)
                }
            };

            debug!("slot {} -> {:?}", slot, matched);
            recognition.keys.push(matched.as_ref().map(|m| m.key.clone()));
            recognition.distances.push(matched.as_ref().map(|m| m.distance));
            recognition.bands.push(band);
            recognition.icons.push(icon);
        }

        Ok(recognition)
    }

    fn recognize_slot(
        &self,
        band: &Mat,
        records: &[ReferenceRecord],
    ) -> Result<(Option<Mat>, Option<MatchResult>)> {
        let icon = self.cropper.tighten(band)?;
        let fingerprint = Fingerprint::of_image(&icon)?;
        let matched = self.matcher.find_nearest(&fingerprint, records);
        Ok((Some(icon), matched))
    }
}
