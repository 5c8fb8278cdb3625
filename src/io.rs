//! Offline persistence for simulation state.
//!
//! Binary snapshot files carry the full body state plus the parameter
//! record that produced it, serialized with bincode. Parameter records can
//! also be dumped and read as JSON for inspection and hand-editing. This is
//! tooling for headless runs; live simulation state never persists across
//! runs.

use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::SimError;
use crate::params::SimParams;

/// Complete dump of one worker's published state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotFile {
    pub params: SimParams,
    pub step: u64,
    pub year: f64,
    pub positions: Vec<f32>,
    pub velocities: Vec<f32>,
}

/// Writes a snapshot as bincode.
pub fn save_snapshot(path: &Path, snapshot: &SnapshotFile) -> Result<(), SimError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let writer = BufWriter::new(File::create(path)?);
    bincode::serialize_into(writer, snapshot).map_err(|e| SimError::Encoding(e.to_string()))
}

/// Reads a snapshot written by [`save_snapshot`].
pub fn load_snapshot(path: &Path) -> Result<SnapshotFile, SimError> {
    let reader = BufReader::new(File::open(path)?);
    bincode::deserialize_from(reader).map_err(|e| SimError::Encoding(e.to_string()))
}

/// Pretty-printed JSON for a parameter record.
pub fn params_to_json(params: &SimParams) -> Result<String, SimError> {
    serde_json::to_string_pretty(params).map_err(|e| SimError::Encoding(e.to_string()))
}

/// Parses a parameter record from JSON.
pub fn params_from_json(text: &str) -> Result<SimParams, SimError> {
    serde_json::from_str(text).map_err(|e| SimError::Encoding(e.to_string()))
}
