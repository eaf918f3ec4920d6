//! Save/Load for session snapshots
//!
//! Uses bincode for compact binary serialization. The static tables are not
//! saved; a snapshot is only meaningful with the config it was taken from.

use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::session::SessionState;

/// Version number for save file format (increment when format changes)
pub const SAVE_VERSION: u32 = 1;

/// Serializable snapshot of a session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SaveData {
    /// Save format version
    pub version: u32,
    /// Seed the session was created with
    pub seed: u64,
    pub state: SessionState,
}

/// Errors that can occur during save/load
#[derive(Error, Debug)]
pub enum SaveError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Encode(#[from] Box<bincode::ErrorKind>),

    #[error("Save version mismatch: expected {expected}, found {found}")]
    VersionMismatch { expected: u32, found: u32 },
}

/// Write a snapshot to `writer`.
pub fn save_state<W: Write>(writer: W, seed: u64, state: &SessionState) -> Result<(), SaveError> {
    let data = SaveData {
        version: SAVE_VERSION,
        seed,
        state: state.clone(),
    };
    bincode::serialize_into(writer, &data)?;
    Ok(())
}

/// Read a snapshot from `reader`, rejecting other format versions.
pub fn load_state<R: Read>(reader: R) -> Result<SaveData, SaveError> {
    let data: SaveData = bincode::deserialize_from(reader)?;
    if data.version != SAVE_VERSION {
        return Err(SaveError::VersionMismatch {
            expected: SAVE_VERSION,
            found: data.version,
        });
    }
    Ok(data)
}

/// Named save slots stored as files in one directory.
#[derive(Debug, Clone)]
pub struct SaveSlots {
    base_dir: PathBuf,
}

impl SaveSlots {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    pub fn path(&self, slot: &str) -> PathBuf {
        self.base_dir.join(format!("{}.sav", slot))
    }

    pub fn save(&self, slot: &str, seed: u64, state: &SessionState) -> Result<(), SaveError> {
        fs::create_dir_all(&self.base_dir)?;
        let path = self.path(slot);
        let mut writer = BufWriter::new(File::create(&path)?);
        save_state(&mut writer, seed, state)?;
        writer.flush()?;
        log::info!("Saved slot '{}' to {}", slot, path.display());
        Ok(())
    }

    /// `Ok(None)` when the slot has never been written.
    pub fn load(&self, slot: &str) -> Result<Option<SaveData>, SaveError> {
        let path = self.path(slot);
        if !path.exists() {
            return Ok(None);
        }
        let data = load_state(BufReader::new(File::open(&path)?))?;
        Ok(Some(data))
    }

    pub fn exists(&self, slot: &str) -> bool {
        self.path(slot).exists()
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }
}
