use std::fmt;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Result, bail};
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;

/// Current version of the config file. Increment on breaking change and add a migration.
const CONFIG_FILE_VERSION: u32 = 1;

/// A fixed on-screen UI element read by the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Region {
    Message,
    Level,
    NameBox,
    BattleMode,
    TeamBox,
}

impl Region {
    pub const ALL: [Region; 5] = [
        Region::Message,
        Region::Level,
        Region::NameBox,
        Region::BattleMode,
        Region::TeamBox,
    ];
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Region::Message => "message",
            Region::Level => "level",
            Region::NameBox => "namebox",
            Region::BattleMode => "battlemode",
            Region::TeamBox => "teambox",
        };
        f.write_str(name)
    }
}

/// Rectangle expressed as fractions of the capture resolution, plus the
/// binarization threshold and OCR language used for it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegionSpec {
    pub top: f64,
    pub bottom: f64,
    pub left: f64,
    pub right: f64,
    pub threshold: u8,
    pub language: String,
}

impl RegionSpec {
    fn new(top: f64, bottom: f64, left: f64, right: f64, threshold: u8, language: &str) -> Self {
        Self {
            top,
            bottom,
            left,
            right,
            threshold,
            language: language.to_string(),
        }
    }
}

/// Geometry of every named region. Calibrated against a 1920x1080 capture.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegionTable {
    pub message: RegionSpec,
    pub level: RegionSpec,
    pub name_box: RegionSpec,
    pub battle_mode: RegionSpec,
    pub team_box: RegionSpec,
}

impl RegionTable {
    pub fn get(&self, region: Region) -> &RegionSpec {
        match region {
            Region::Message => &self.message,
            Region::Level => &self.level,
            Region::NameBox => &self.name_box,
            Region::BattleMode => &self.battle_mode,
            Region::TeamBox => &self.team_box,
        }
    }
}

impl Default for RegionTable {
    fn default() -> Self {
        Self {
            message: RegionSpec::new(10.0 / 14.0, 12.0 / 14.0, 1.0 / 8.0, 7.0 / 8.0, 200, "jpn"),
            // 1920x1080: top 49, bottom 89, left 1540, right 1690
            level: RegionSpec::new(0.045, 0.082, 0.802, 0.880, 100, "eng"),
            // 1920x1080: top 98, bottom 140, left 1535, right 1825
            name_box: RegionSpec::new(0.091, 0.130, 0.799, 0.951, 180, "jpn+eng"),
            battle_mode: RegionSpec::new(0.020, 0.085, 0.040, 0.250, 200, "jpn"),
            // 1920x1080: top 223, bottom 836, left 1232, right 1338
            team_box: RegionSpec::new(0.206, 0.774, 0.642, 0.697, 220, "jpn"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CameraConfig {
    pub index: i32,
    pub width: i32,
    pub height: i32,
    pub fps: f64,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            index: 0,
            width: 1920,
            height: 1080,
            fps: 30.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    pub camera: CameraConfig,
    pub regions: RegionTable,
    /// Number of recent frames kept for temporal masking.
    pub window_size: usize,
    /// Pixel difference above which a pixel counts as changed between frames.
    pub diff_threshold: u8,
    pub poll_interval_ms: u64,
    pub text_interval_ms: u64,
    pub team_interval_ms: u64,
    /// Team boxes agreeing with the previous one above this fraction are not re-recognized.
    pub team_change_similarity: f64,
    pub contour_threshold: u8,
    pub contour_retry_threshold: u8,
    pub battle_mode_keywords: Vec<String>,
    pub battle_mode_max_distance: usize,
    pub reference_db: PathBuf,
    /// Attack x defense table. The built-in chart is used when unset.
    pub type_chart: Option<PathBuf>,
    pub tessdata_dir: Option<PathBuf>,
    pub output_dir: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            camera: CameraConfig::default(),
            regions: RegionTable::default(),
            window_size: 10,
            diff_threshold: 30,
            poll_interval_ms: 10,
            text_interval_ms: 1000,
            team_interval_ms: 5000,
            team_change_similarity: 0.6,
            contour_threshold: 130,
            contour_retry_threshold: 200,
            battle_mode_keywords: vec!["ランクバトル".to_string(), "カジュアルバトル".to_string()],
            battle_mode_max_distance: 2,
            reference_db: PathBuf::from("reference_db.json"),
            type_chart: None,
            tessdata_dir: None,
            output_dir: PathBuf::from("screenshot"),
        }
    }
}

impl Config {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn text_interval(&self) -> Duration {
        Duration::from_millis(self.text_interval_ms)
    }

    pub fn team_interval(&self) -> Duration {
        Duration::from_millis(self.team_interval_ms)
    }

    /// Loads the config file, writing the defaults out first if it does not exist yet.
    pub fn load_or_create(path: &Path) -> Result<Self> {
        if !path.exists() {
            log::info!("config {} not found, writing defaults", path.display());
            let config = Config::default();
            config.save_to_file(path)?;
            return Ok(config);
        }
        Self::load_from_file(path)
    }

    pub fn load_from_file(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Failed to read config {}: {}", path.display(), e))?;

        let version_info: DetectVersion = serde_json::from_str(&contents)
            .map_err(|e| anyhow::anyhow!("Failed to parse config version: {}", e))?;

        match version_info.version {
            1 => {
                let file: ConfigFileV1 = serde_json::from_str(&contents)?;
                file.config.validate()?;
                Ok(file.config)
            }
            v => bail!("Unsupported config version: {}", v),
        }
    }

    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        let file = ConfigFileV1 {
            version: CONFIG_FILE_VERSION,
            config: self.clone(),
        };
        let json = serde_json::to_string_pretty(&file)?;
        write_atomically(path, json.as_bytes())
    }

    fn validate(&self) -> Result<()> {
        if self.window_size == 0 {
            bail!("window_size must be at least 1");
        }
        for region in Region::ALL {
            let spec = self.regions.get(region);
            if !(0.0..=1.0).contains(&spec.top)
                || !(0.0..=1.0).contains(&spec.bottom)
                || !(0.0..=1.0).contains(&spec.left)
                || !(0.0..=1.0).contains(&spec.right)
            {
                bail!("region {} has fractions outside 0..=1", region);
            }
            if spec.top >= spec.bottom || spec.left >= spec.right {
                bail!("region {} is empty or inverted", region);
            }
        }
        Ok(())
    }
}

/// Any JSON with a top-level "version" field deserializes into this.
#[derive(Debug, Deserialize)]
struct DetectVersion {
    version: u32,
}

#[derive(Debug, Serialize, Deserialize)]
struct ConfigFileV1 {
    version: u32,
    #[serde(flatten)]
    config: Config,
}

/// Writes through a temp file in the same directory and renames over `path`.
pub(crate) fn write_atomically(path: &Path, contents: &[u8]) -> Result<()> {
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    let mut temp_file = NamedTempFile::new_in(&parent)?;
    temp_file.write_all(contents)?;
    temp_file.flush()?;
    temp_file.persist(path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn load_or_create_writes_defaults() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("config.json");

        let config = Config::load_or_create(&path)?;
        assert_eq!(config, Config::default());
        assert!(path.exists());

        let contents = fs::read_to_string(&path)?;
        assert!(contents.contains("\"version\": 1"));
        assert!(contents.contains("\"name_box\""));
        Ok(())
    }

    #[test]
    fn save_then_load_keeps_edits() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("config.json");

        let mut config = Config::default();
        config.camera.index = 3;
        config.window_size = 5;
        config.regions.level.threshold = 120;
        config.save_to_file(&path)?;

        let loaded = Config::load_from_file(&path)?;
        assert_eq!(loaded.camera.index, 3);
        assert_eq!(loaded.window_size, 5);
        assert_eq!(loaded.regions.level.threshold, 120);
        Ok(())
    }

    #[test]
    fn load_rejects_unknown_version() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{ "version": 7 }"#)?;

        assert!(Config::load_from_file(&path).is_err());
        Ok(())
    }

    #[test]
    fn load_rejects_inverted_region() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("config.json");

        let mut config = Config::default();
        config.regions.team_box.top = 0.9;
        config.regions.team_box.bottom = 0.1;
        config.save_to_file(&path)?;

        assert!(Config::load_from_file(&path).is_err());
        Ok(())
    }

    #[test]
    fn region_table_lookup_matches_fields() {
        let table = RegionTable::default();
        assert_eq!(table.get(Region::Level).language, "eng");
        assert_eq!(table.get(Region::NameBox).threshold, 180);
        assert_eq!(table.get(Region::TeamBox), &table.team_box);
    }

    #[test]
    fn region_display_names() {
        assert_eq!(Region::NameBox.to_string(), "namebox");
        assert_eq!(Region::TeamBox.to_string(), "teambox");
    }
}
