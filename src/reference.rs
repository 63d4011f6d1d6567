mod file_persistency;

pub use file_persistency::{load_from_file, save_to_file};

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock};

use anyhow::bail;
use log::info;
use serde::{Deserialize, Serialize};

use crate::error::VisionError;
use crate::icon::Fingerprint;
use crate::text::{edit_distance, similarity_ratio};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BaseStats {
    pub hp: u16,
    pub attack: u16,
    pub defense: u16,
    pub sp_attack: u16,
    pub sp_defense: u16,
    pub speed: u16,
}

impl BaseStats {
    pub fn total(&self) -> u32 {
        [
            self.hp,
            self.attack,
            self.defense,
            self.sp_attack,
            self.sp_defense,
            self.speed,
        ]
        .iter()
        .map(|&s| u32::from(s))
        .sum()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReferenceRecord {
    pub key: String,
    pub name: String,
    pub form: Option<String>,
    pub type1: String,
    pub type2: Option<String>,
    pub stats: BaseStats,
    pub fingerprint: Option<Fingerprint>,
}

impl ReferenceRecord {
    pub fn new(key: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            name: name.into(),
            form: None,
            type1: String::new(),
            type2: None,
            stats: BaseStats::default(),
            fingerprint: None,
        }
    }

    pub fn with_fingerprint(mut self, fingerprint: Fingerprint) -> Self {
        self.fingerprint = Some(fingerprint);
        self
    }

    pub fn with_types(mut self, type1: &str, type2: Option<&str>) -> Self {
        self.type1 = type1.to_string();
        self.type2 = type2.map(str::to_string);
        self
    }
}

/// Result of a name lookup. `distance` is 0 and `similarity` 1.0 for an exact hit.
#[derive(Debug, Clone, PartialEq)]
pub struct NameMatch {
    pub record: ReferenceRecord,
    /// Edit distance between the query and the record name.
    pub distance: usize,
    pub similarity: f64,
}

/// Ordered reference records with a key index. Table order is the scan order
/// used by `IconMatcher`.
#[derive(Debug, Default, PartialEq)]
pub struct ReferenceTable {
    records: Vec<ReferenceRecord>,
    index: HashMap<String, usize>,
}

impl ReferenceTable {
    pub fn new(records: Vec<ReferenceRecord>) -> anyhow::Result<Self> {
        let mut index = HashMap::with_capacity(records.len());
        for (position, record) in records.iter().enumerate() {
            if index.insert(record.key.clone(), position).is_some() {
                bail!("Duplicate reference key: {}", record.key);
            }
        }
        Ok(Self { records, index })
    }

    pub fn records(&self) -> &[ReferenceRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&ReferenceRecord> {
        self.index.get(key).map(|&i| &self.records[i])
    }

    pub fn set_fingerprint(&mut self, key: &str, fingerprint: Fingerprint) -> Result<(), VisionError> {
        let position = *self
            .index
            .get(key)
            .ok_or_else(|| VisionError::UnknownReference(key.to_string()))?;
        self.records[position].fingerprint = Some(fingerprint);
        Ok(())
    }

    /// Exact name match, else the record with the highest similarity ratio.
    /// Ties keep the earlier record.
    pub fn find_by_name(&self, name: &str) -> Option<NameMatch> {
        if name.is_empty() {
            return None;
        }
        if let Some(record) = self.records.iter().find(|r| r.name == name) {
            return Some(NameMatch {
                record: record.clone(),
                distance: 0,
                similarity: 1.0,
            });
        }

        let mut best: Option<(&ReferenceRecord, f64)> = None;
        for record in &self.records {
            let similarity = similarity_ratio(name, &record.name);
            if best.is_none_or(|(_, best_similarity)| similarity > best_similarity) {
                best = Some((record, similarity));
            }
        }
        best.map(|(record, similarity)| NameMatch {
            record: record.clone(),
            distance: edit_distance(name, &record.name),
            similarity,
        })
    }
}

/// Reference data as seen by the recognition core.
pub trait ReferenceStore: Send + Sync {
    /// All records in table order.
    fn get_all_records(&self) -> Vec<ReferenceRecord>;

    fn get_record(&self, key: &str) -> Option<ReferenceRecord>;

    fn find_by_name(&self, name: &str) -> Option<NameMatch>;

    /// Stores `fingerprint` for `key` and persists it.
    fn update_fingerprint(&self, key: &str, fingerprint: Fingerprint) -> anyhow::Result<()>;
}

/// File-backed reference store.
pub struct ReferenceDb {
    table: RwLock<ReferenceTable>,
    path: Option<PathBuf>,
}

impl ReferenceDb {
    /// An in-memory store that never touches the disk.
    pub fn in_memory(table: ReferenceTable) -> Self {
        Self {
            table: RwLock::new(table),
            path: None,
        }
    }

    pub fn open(path: &Path) -> anyhow::Result<Self> {
        let table = load_from_file(path)?;
        info!(
            "loaded {} reference records ({} with fingerprints) from {}",
            table.len(),
            table.records().iter().filter(|r| r.fingerprint.is_some()).count(),
            path.display()
        );
        Ok(Self {
            table: RwLock::new(table),
            path: Some(path.to_path_buf()),
        })
    }

    pub fn save(&self) -> anyhow::Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let table = self.table.read().unwrap_or_else(PoisonError::into_inner);
        save_to_file(&table, path)
    }
}

impl ReferenceStore for ReferenceDb {
    fn get_all_records(&self) -> Vec<ReferenceRecord> {
        let table = self.table.read().unwrap_or_else(PoisonError::into_inner);
        table.records().to_vec()
    }

    fn get_record(&self, key: &str) -> Option<ReferenceRecord> {
        let table = self.table.read().unwrap_or_else(PoisonError::into_inner);
        table.get(key).cloned()
    }

    fn find_by_name(&self, name: &str) -> Option<NameMatch> {
        let table = self.table.read().unwrap_or_else(PoisonError::into_inner);
        table.find_by_name(name)
    }

    fn update_fingerprint(&self, key: &str, fingerprint: Fingerprint) -> anyhow::Result<()> {
        {
            let mut table = self.table.write().unwrap_or_else(PoisonError::into_inner);
            table.set_fingerprint(key, fingerprint)?;
        }
        info!("fingerprint for {} set to {}", key, fingerprint);
        self.save()
    }
}
