mod file_persistency;

pub use file_persistency::{load_from_file, save_to_file};

use std::collections::HashMap;

use anyhow::bail;
use log::debug;

/// Type names in chart order, as used in `ReferenceRecord::type1`/`type2`.
pub const STANDARD_TYPES: [&str; 18] = [
    "Normal", "Fire", "Water", "Electric", "Grass", "Ice", "Fighting", "Poison", "Ground", "Flying",
    "Psychic", "Bug", "Rock", "Ghost", "Dragon", "Dark", "Steel", "Fairy",
];

/// Matchups that differ from x1, per attacking type.
const STANDARD_MATCHUPS: [(&str, &[(&str, f32)]); 18] = [
    ("Normal", &[("Rock", 0.5), ("Ghost", 0.0), ("Steel", 0.5)]),
    (
        "Fire",
        &[
            ("Fire", 0.5),
            ("Water", 0.5),
            ("Grass", 2.0),
            ("Ice", 2.0),
            ("Bug", 2.0),
            ("Rock", 0.5),
            ("Dragon", 0.5),
            ("Steel", 2.0),
        ],
    ),
    (
        "Water",
        &[
            ("Fire", 2.0),
            ("Water", 0.5),
            ("Grass", 0.5),
            ("Ground", 2.0),
            ("Rock", 2.0),
            ("Dragon", 0.5),
        ],
    ),
    (
        "Electric",
        &[
            ("Water", 2.0),
            ("Electric", 0.5),
            ("Grass", 0.5),
            ("Ground", 0.0),
            ("Flying", 2.0),
            ("Dragon", 0.5),
        ],
    ),
    (
        "Grass",
        &[
            ("Fire", 0.5),
            ("Water", 2.0),
            ("Grass", 0.5),
            ("Poison", 0.5),
            ("Ground", 2.0),
            ("Flying", 0.5),
            ("Bug", 0.5),
            ("Rock", 2.0),
            ("Dragon", 0.5),
            ("Steel", 0.5),
        ],
    ),
    (
        "Ice",
        &[
            ("Fire", 0.5),
            ("Water", 0.5),
            ("Grass", 2.0),
            ("Ice", 0.5),
            ("Ground", 2.0),
            ("Flying", 2.0),
            ("Dragon", 2.0),
            ("Steel", 0.5),
        ],
    ),
    (
        "Fighting",
        &[
            ("Normal", 2.0),
            ("Ice", 2.0),
            ("Poison", 0.5),
            ("Flying", 0.5),
            ("Psychic", 0.5),
            ("Bug", 0.5),
            ("Rock", 2.0),
            ("Ghost", 0.0),
            ("Dark", 2.0),
            ("Steel", 2.0),
            ("Fairy", 0.5),
        ],
    ),
    (
        "Poison",
        &[
            ("Grass", 2.0),
            ("Poison", 0.5),
            ("Ground", 0.5),
            ("Rock", 0.5),
            ("Ghost", 0.5),
            ("Steel", 0.0),
            ("Fairy", 2.0),
        ],
    ),
    (
        "Ground",
        &[
            ("Fire", 2.0),
            ("Electric", 2.0),
            ("Grass", 0.5),
            ("Poison", 2.0),
            ("Flying", 0.0),
            ("Bug", 0.5),
            ("Rock", 2.0),
            ("Steel", 2.0),
        ],
    ),
    (
        "Flying",
        &[
            ("Electric", 0.5),
            ("Grass", 2.0),
            ("Fighting", 2.0),
            ("Bug", 2.0),
            ("Rock", 0.5),
            ("Steel", 0.5),
        ],
    ),
    (
        "Psychic",
        &[
            ("Fighting", 2.0),
            ("Poison", 2.0),
            ("Psychic", 0.5),
            ("Dark", 0.0),
            ("Steel", 0.5),
        ],
    ),
    (
        "Bug",
        &[
            ("Fire", 0.5),
            ("Grass", 2.0),
            ("Fighting", 0.5),
            ("Poison", 0.5),
            ("Flying", 0.5),
            ("Psychic", 2.0),
            ("Ghost", 0.5),
            ("Dark", 2.0),
            ("Steel", 0.5),
            ("Fairy", 0.5),
        ],
    ),
    (
        "Rock",
        &[
            ("Fire", 2.0),
            ("Ice", 2.0),
            ("Fighting", 0.5),
            ("Ground", 0.5),
            ("Flying", 2.0),
            ("Bug", 2.0),
            ("Steel", 0.5),
        ],
    ),
    (
        "Ghost",
        &[("Normal", 0.0), ("Psychic", 2.0), ("Ghost", 2.0), ("Dark", 0.5)],
    ),
    ("Dragon", &[("Dragon", 2.0), ("Steel", 0.5), ("Fairy", 0.0)]),
    (
        "Dark",
        &[
            ("Fighting", 0.5),
            ("Psychic", 2.0),
            ("Ghost", 2.0),
            ("Dark", 0.5),
            ("Fairy", 0.5),
        ],
    ),
    (
        "Steel",
        &[
            ("Fire", 0.5),
            ("Water", 0.5),
            ("Electric", 0.5),
            ("Ice", 2.0),
            ("Rock", 2.0),
            ("Steel", 0.5),
            ("Fairy", 2.0),
        ],
    ),
    (
        "Fairy",
        &[
            ("Fire", 0.5),
            ("Fighting", 2.0),
            ("Poison", 0.5),
            ("Dragon", 2.0),
            ("Dark", 2.0),
            ("Steel", 0.5),
        ],
    ),
];

/// Damage multiplier of one attacking type against a defender.
#[derive(Debug, Clone, PartialEq)]
pub struct TypeMultiplier {
    pub attack: String,
    pub multiplier: f32,
}

/// Square attack x defense multiplier table.
#[derive(Debug, Clone, PartialEq)]
pub struct TypeChart {
    types: Vec<String>,
    index: HashMap<String, usize>,
    /// `multipliers[attack][defense]`
    multipliers: Vec<Vec<f32>>,
}

impl TypeChart {
    pub fn new(types: Vec<String>, multipliers: Vec<Vec<f32>>) -> anyhow::Result<Self> {
        if multipliers.len() != types.len() || multipliers.iter().any(|row| row.len() != types.len()) {
            bail!(
                "type chart must be {0}x{0} for {0} types",
                types.len()
            );
        }
        if let Some(value) = multipliers.iter().flatten().find(|m| !m.is_finite() || **m < 0.0) {
            bail!("invalid multiplier in type chart: {}", value);
        }

        let mut index = HashMap::with_capacity(types.len());
        for (position, name) in types.iter().enumerate() {
            if index.insert(name.clone(), position).is_some() {
                bail!("Duplicate type in chart: {}", name);
            }
        }
        Ok(Self {
            types,
            index,
            multipliers,
        })
    }

    /// The current eighteen-type chart.
    pub fn standard() -> Self {
        let position = |name: &str| STANDARD_TYPES.iter().position(|t| *t == name);

        let mut multipliers = vec![vec![1.0; STANDARD_TYPES.len()]; STANDARD_TYPES.len()];
        for (attack, matchups) in STANDARD_MATCHUPS {
            let Some(row) = position(attack) else { continue };
            for &(defense, multiplier) in matchups {
                if let Some(column) = position(defense) {
                    multipliers[row][column] = multiplier;
                }
            }
        }

        let types: Vec<String> = STANDARD_TYPES.iter().map(|t| t.to_string()).collect();
        let index = types
            .iter()
            .enumerate()
            .map(|(i, t)| (t.clone(), i))
            .collect();
        Self {
            types,
            index,
            multipliers,
        }
    }

    pub fn types(&self) -> &[String] {
        &self.types
    }

    pub(crate) fn rows(&self) -> &[Vec<f32>] {
        &self.multipliers
    }

    fn single(&self, attack: usize, defense: &str) -> f32 {
        match self.index.get(defense) {
            Some(&column) => self.multipliers[attack][column],
            None => {
                debug!("unknown defending type {:?} counts as x1", defense);
                1.0
            }
        }
    }

    /// Multiplier of `attack` against a defender of one or two types. Unknown
    /// types count as x1.
    pub fn effectiveness(&self, attack: &str, defense1: &str, defense2: Option<&str>) -> f32 {
        let Some(&row) = self.index.get(attack) else {
            debug!("unknown attacking type {:?} counts as x1", attack);
            return 1.0;
        };
        let first = self.single(row, defense1);
        match defense2 {
            Some(defense2) => first * self.single(row, defense2),
            None => first,
        }
    }

    /// Every attacking type against the defender, strongest first. Equal
    /// multipliers keep chart order.
    pub fn defensive_profile(&self, type1: &str, type2: Option<&str>) -> Vec<TypeMultiplier> {
        let mut profile: Vec<TypeMultiplier> = self
            .types
            .iter()
            .map(|attack| TypeMultiplier {
                attack: attack.clone(),
                multiplier: self.effectiveness(attack, type1, type2),
            })
            .collect();
        profile.sort_by(|a, b| b.multiplier.total_cmp(&a.multiplier));
        profile
    }

    /// Attacking types dealing x2 or more, strongest first.
    pub fn weaknesses(&self, type1: &str, type2: Option<&str>) -> Vec<TypeMultiplier> {
        self.defensive_profile(type1, type2)
            .into_iter()
            .filter(|m| m.multiplier >= 2.0)
            .collect()
    }
}

impl Default for TypeChart {
    fn default() -> Self {
        Self::standard()
    }
}
