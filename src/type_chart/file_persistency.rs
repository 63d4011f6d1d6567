use std::fs;
use std::path::Path;

use anyhow::{Result, bail};
use serde::{Deserialize, Serialize};

use crate::config::write_atomically;
use crate::type_chart::TypeChart;

/// Current version of the type chart file. Increment on breaking change and create migration.
const TYPE_CHART_FILE_VERSION: u32 = 1;

/// Used for version detection. Any JSON containing a top-level "version" field will deserialize properly into this struct.
#[derive(Debug, Deserialize)]
struct DetectVersion {
    version: u32,
}

fn detect_type_chart_version(json: &str) -> Result<DetectVersion> {
    serde_json::from_str(json)
        .map_err(|e| anyhow::anyhow!("Failed to parse type chart version: {}", e))
}

/// Rows are attacking types, columns defending types, both in `types` order.
#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub(crate) struct TypeChartFileV1 {
    pub version: u32,
    pub types: Vec<String>,
    pub multipliers: Vec<Vec<f32>>,
}

impl From<&TypeChart> for TypeChartFileV1 {
    fn from(chart: &TypeChart) -> Self {
        TypeChartFileV1 {
            version: TYPE_CHART_FILE_VERSION,
            types: chart.types().to_vec(),
            multipliers: chart.rows().to_vec(),
        }
    }
}

pub fn load_from_file(path: &Path) -> Result<TypeChart> {
    let contents = fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("Failed to read file {}: {}", path.display(), e))?;

    match detect_type_chart_version(&contents)?.version {
        1 => {
            let file_v1: TypeChartFileV1 = serde_json::from_str(&contents)?;
            TypeChart::new(file_v1.types, file_v1.multipliers)
        }
        v => bail!("Unsupported version: {}", v),
    }
}

pub fn save_to_file(chart: &TypeChart, path: &Path) -> Result<()> {
    let json = serde_json::to_string_pretty(&TypeChartFileV1::from(chart))?;
    write_atomically(path, json.as_bytes())
}
