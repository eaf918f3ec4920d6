//! Config table loading and session tunables.
//!
//! One JSON array per table, one file per table, all in a single directory.

use std::fs;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use shelter_logic::constants::{DEATH_DROP_RETENTION_ROUNDS, DEFAULT_MAX_STACK};
use shelter_logic::tables::ConfigBundle;

/// Table files a config directory must contain.
pub const REQUIRED_TABLES: [&str; 5] = [
    "explorers.json",
    "monsters.json",
    "map_cells.json",
    "exploration_points.json",
    "loot_objects.json",
];

/// Table files that load as empty when absent.
pub const OPTIONAL_TABLES: [&str; 5] = [
    "resources.json",
    "items.json",
    "loot_conditions.json",
    "quests.json",
    "chapters.json",
];

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config table {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config table {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Runtime tunables that are not part of the static tables.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionOptions {
    /// Seed for board generation.
    pub seed: u64,
    /// Rounds a death drop survives, counting the round of death.
    pub death_drop_retention: u32,
    /// Stack limit for ids missing from the resource and item tables.
    pub default_max_stack: i64,
    pub starting_shelter_level: u32,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            seed: 0,
            death_drop_retention: DEATH_DROP_RETENTION_ROUNDS,
            default_max_stack: DEFAULT_MAX_STACK,
            starting_shelter_level: 1,
        }
    }
}

impl SessionOptions {
    pub fn with_seed(seed: u64) -> Self {
        Self {
            seed,
            ..Self::default()
        }
    }
}

/// Load every table from `dir`.
pub fn load_config_dir(dir: impl AsRef<Path>) -> Result<ConfigBundle, ConfigError> {
    let dir = dir.as_ref();
    let bundle = ConfigBundle {
        explorers: load_table(dir, "explorers.json")?,
        monsters: load_table(dir, "monsters.json")?,
        map_cells: load_table(dir, "map_cells.json")?,
        exploration_points: load_table(dir, "exploration_points.json")?,
        loot_objects: load_table(dir, "loot_objects.json")?,
        resources: load_optional_table(dir, "resources.json")?,
        items: load_optional_table(dir, "items.json")?,
        loot_conditions: load_optional_table(dir, "loot_conditions.json")?,
        quests: load_optional_table(dir, "quests.json")?,
        chapters: load_optional_table(dir, "chapters.json")?,
    };
    log::info!(
        "Loaded config from {}: {} explorers, {} monsters, {} map cells, {} points, {} loot objects, {} quests",
        dir.display(),
        bundle.explorers.len(),
        bundle.monsters.len(),
        bundle.map_cells.len(),
        bundle.exploration_points.len(),
        bundle.loot_objects.len(),
        bundle.quests.len(),
    );
    Ok(bundle)
}

/// Load `SessionOptions` from a JSON file; missing fields take defaults.
pub fn load_options(path: impl AsRef<Path>) -> Result<SessionOptions, ConfigError> {
    let path = path.as_ref();
    let raw = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

fn load_table<T: DeserializeOwned>(dir: &Path, file: &str) -> Result<Vec<T>, ConfigError> {
    let path = dir.join(file);
    let raw = fs::read_to_string(&path).map_err(|source| ConfigError::Io {
        path: path.clone(),
        source,
    })?;
    serde_json::from_str(&raw).map_err(|source| ConfigError::Parse { path, source })
}

fn load_optional_table<T: DeserializeOwned>(
    dir: &Path,
    file: &str,
) -> Result<Vec<T>, ConfigError> {
    if !dir.join(file).exists() {
        log::debug!("Optional table {} not present, using empty table", file);
        return Ok(Vec::new());
    }
    load_table(dir, file)
}
