use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use log::debug;
use opencv::core::{Mat, Vector};
use opencv::imgcodecs;
use opencv::imgproc;

use crate::error::{Result, VisionError};
use crate::region::to_grayscale;

/// Threshold for the silhouette copy of each saved icon.
const BINARY_ICON_THRESHOLD: f64 = 200.0;

/// Timestamp used in artifact file names, e.g. `240105101126`.
pub fn timestamp(now: DateTime<Local>) -> String {
    now.format("%y%m%d%H%M%S").to_string()
}

/// Writes screenshots and icon crops under one output directory.
#[derive(Debug, Clone)]
pub struct ArtifactWriter {
    root: PathBuf,
}

impl ArtifactWriter {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn screenshot_path(&self, stamp: &str) -> PathBuf {
        self.root.join(format!("screenshot_{}.jpg", stamp))
    }

    pub fn team_box_path(&self, stamp: &str) -> PathBuf {
        self.root
            .join("battleteam")
            .join(format!("battleteam_{}.png", stamp))
    }

    pub fn icon_path(&self, stamp: &str, slot: usize) -> PathBuf {
        self.root
            .join("icon")
            .join("outline")
            .join(format!("{}_{}.png", stamp, slot))
    }

    pub fn binary_icon_path(&self, stamp: &str, slot: usize) -> PathBuf {
        self.root
            .join("icon")
            .join("binary")
            .join(format!("{}_{}.png", stamp, slot))
    }

    pub fn save_team_box(&self, stamp: &str, team_box: &Mat) -> Result<PathBuf> {
        let path = self.team_box_path(stamp);
        write_image(&path, team_box)?;
        Ok(path)
    }

    /// Saves each tightened icon and its inverted silhouette. Slots without an
    /// icon are skipped.
    pub fn save_icons(&self, stamp: &str, icons: &[Option<Mat>]) -> Result<Vec<PathBuf>> {
        let mut written = Vec::new();
        for (slot, icon) in icons.iter().enumerate() {
            let Some(icon) = icon else {
                continue;
            };

            let path = self.icon_path(stamp, slot);
            write_image(&path, icon)?;
            written.push(path);

            let gray = to_grayscale(icon)?;
            let mut binary = Mat::default();
            imgproc::threshold(
                &gray,
                &mut binary,
                BINARY_ICON_THRESHOLD,
                255.0,
                imgproc::THRESH_BINARY_INV,
            )?;
            write_image(&self.binary_icon_path(stamp, slot), &binary)?;
        }
        Ok(written)
    }
}

fn write_image(path: &Path, image: &Mat) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    if !imgcodecs::imwrite(&path.to_string_lossy(), image, &Vector::new())? {
        return Err(VisionError::Io(std::io::Error::other(format!(
            "failed to write {}",
            path.display()
        ))));
    }
    debug!("wrote {}", path.display());
    Ok(())
}
