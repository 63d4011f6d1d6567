mod contour;
mod fingerprint;
mod matcher;
mod team;

pub use contour::{ContourCropper, DEFAULT_RETRY_THRESHOLD, DEFAULT_THRESHOLD};
pub use fingerprint::Fingerprint;
pub use matcher::{ACCEPT_DISTANCE, IconMatcher, MatchResult};
pub use team::{TEAM_SLOTS, TeamRecognition, TeamRecognizer};

use opencv::core::Mat;

use crate::error::Result;

/// Fingerprint of a raw icon cell: tighten first, then hash.
///
/// This is the same path `TeamRecognizer` takes per slot, so a fingerprint
/// registered from a cell matches that cell at distance zero.
pub fn icon_fingerprint(cropper: &ContourCropper, cell: &Mat) -> Result<Fingerprint> {
    let icon = cropper.tighten(cell)?;
    Fingerprint::of_image(&icon)
}
