use std::fs;
use std::path::Path;

use anyhow::{Result, bail};
use serde::{Deserialize, Serialize};
use serde_with::{DisplayFromStr, serde_as};

use crate::config::write_atomically;
use crate::icon::Fingerprint;
use crate::reference::{BaseStats, ReferenceRecord, ReferenceTable};

/// Current version of the reference file. Increment on breaking change and create migration.
const REFERENCE_FILE_VERSION: u32 = 1;

/// Used for version detection. Any JSON containing a top-level "version" field will deserialize properly into this struct.
#[derive(Debug, Deserialize)]
struct DetectVersion {
    version: u32,
}

fn detect_reference_version(json: &str) -> Result<DetectVersion> {
    serde_json::from_str(json)
        .map_err(|e| anyhow::anyhow!("Failed to parse reference file version: {}", e))
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub(crate) struct ReferenceFileV1 {
    pub version: u32,
    pub records: Vec<RecordV1>,
}

#[serde_as]
#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub(crate) struct RecordV1 {
    pub key: String,
    pub name: String,
    pub form: Option<String>,
    pub type1: String,
    pub type2: Option<String>,
    pub stats: BaseStats,

    #[serde_as(as = "Option<DisplayFromStr>")]
    pub fingerprint: Option<Fingerprint>,
}

impl From<&ReferenceTable> for ReferenceFileV1 {
    fn from(table: &ReferenceTable) -> Self {
        ReferenceFileV1 {
            version: REFERENCE_FILE_VERSION,
            records: table
                .records()
                .iter()
                .map(|r| RecordV1 {
                    key: r.key.clone(),
                    name: r.name.clone(),
                    form: r.form.clone(),
                    type1: r.type1.clone(),
                    type2: r.type2.clone(),
                    stats: r.stats,
                    fingerprint: r.fingerprint,
                })
                .collect(),
        }
    }
}

fn from_v1(file_v1: ReferenceFileV1) -> Result<ReferenceTable> {
    let records = file_v1
        .records
        .into_iter()
        .map(|r| ReferenceRecord {
            key: r.key,
            name: r.name,
            form: r.form,
            type1: r.type1,
            type2: r.type2,
            stats: r.stats,
            fingerprint: r.fingerprint,
        })
        .collect();

    ReferenceTable::new(records)
}

pub fn load_from_file(path: &Path) -> Result<ReferenceTable> {
    let contents = fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("Failed to read file {}: {}", path.display(), e))?;

    let version_info = detect_reference_version(&contents)?;

    match version_info.version {
        1 => {
            let file_v1: ReferenceFileV1 = serde_json::from_str(&contents)?;
            from_v1(file_v1)
        }
        v => bail!("Unsupported version: {}", v),
    }
}

pub fn save_to_file(table: &ReferenceTable, path: &Path) -> Result<()> {
    let file_v1 = ReferenceFileV1::from(table);
    let json = serde_json::to_string_pretty(&file_v1)?;
    write_atomically(path, json.as_bytes())
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::*;

    #[test]
    fn detects_version_successfully() {
        let json = r#"{ "version": 1 }"#;
        let parsed = detect_reference_version(json).expect("Failed to deserialize version");
        assert_eq!(parsed.version, 1);
    }

    #[test]
    fn detect_fails_on_missing_version() {
        assert!(detect_reference_version("{}").is_err());
    }

    #[test]
    fn load_rejects_maximum_version() {
        let json = format!(r#"{{ "version": {} }}"#, u32::MAX);
        let temp_file = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(temp_file.path(), &json).unwrap();

        let result = load_from_file(temp_file.path());
        assert!(result.is_err(), "Should reject max version as too new");
    }

    #[test]
    fn fingerprint_is_stored_as_bit_string() {
        let mut table = ReferenceTable::new(vec![ReferenceRecord::new("0001", "a")]).unwrap();
        table
            .set_fingerprint("0001", Fingerprint::from_bits(u64::MAX))
            .unwrap();

        let json = serde_json::to_string(&ReferenceFileV1::from(&table)).unwrap();
        assert!(json.contains(&format!("\"fingerprint\":\"{}\"", "1".repeat(64))));
    }

    #[test]
    fn missing_or_null_fingerprint_is_none() {
        let json = r#"{
        "version": 1,
        "records": [
            { "key": "0001", "name": "A", "form": null, "type1": "Grass", "type2": "Poison",
              "stats": { "hp": 45, "attack": 49, "defense": 49, "sp_attack": 65, "sp_defense": 65, "speed": 45 } },
            { "key": "0004", "name": "B", "form": null, "type1": "Fire", "type2": null,
              "stats": { "hp": 39, "attack": 52, "defense": 43, "sp_attack": 60, "sp_defense": 50, "speed": 65 },
              "fingerprint": null }
        ]
    }"#;

        let parsed: ReferenceFileV1 = serde_json::from_str(json).unwrap();
        assert!(parsed.records.iter().all(|r| r.fingerprint.is_none()));
        assert_eq!(parsed.records[0].stats.total(), 318);
    }

    #[test]
    fn malformed_fingerprint_fails() {
        let json = r#"{
        "version": 1,
        "records": [
            { "key": "0001", "name": "A", "form": null, "type1": "Grass", "type2": null,
              "stats": { "hp": 1, "attack": 1, "defense": 1, "sp_attack": 1, "sp_defense": 1, "speed": 1 },
              "fingerprint": "0101" }
        ]
    }"#;

        assert!(serde_json::from_str::<ReferenceFileV1>(json).is_err());
    }

    #[test]
    fn duplicate_keys_in_file_fail_to_load() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("reference_db.json");
        let json = r#"{
        "version": 1,
        "records": [
            { "key": "0001", "name": "A", "form": null, "type1": "Grass", "type2": null,
              "stats": { "hp": 1, "attack": 1, "defense": 1, "sp_attack": 1, "sp_defense": 1, "speed": 1 } },
            { "key": "0001", "name": "B", "form": null, "type1": "Grass", "type2": null,
              "stats": { "hp": 1, "attack": 1, "defense": 1, "sp_attack": 1, "sp_defense": 1, "speed": 1 } }
        ]
    }"#;
        fs::write(&path, json)?;

        assert!(load_from_file(&path).is_err());
        Ok(())
    }

    #[test]
    fn save_then_load_keeps_order_and_fields() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("reference_db.json");

        let mut forme = ReferenceRecord::new("0479-w", "ロトム").with_types("Electric", Some("Water"));
        forme.form = Some("ウォッシュ".to_string());
        forme.stats.speed = 86;
        let original = ReferenceTable::new(vec![
            ReferenceRecord::new("0479", "ロトム").with_types("Electric", Some("Ghost")),
            forme,
            ReferenceRecord::new("0001", "フシギダネ")
                .with_fingerprint(Fingerprint::from_bits(0xAAAA_5555_AAAA_5555)),
        ])?;

        save_to_file(&original, &path)?;
        let loaded = load_from_file(&path)?;

        assert_eq!(loaded, original);
        Ok(())
    }
}
