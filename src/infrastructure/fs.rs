//! Crash-safe file persistence helpers.

use std::io::Write;
use std::path::Path;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tempfile::NamedTempFile;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::Graph;

/// Atomically write `data` to `path`.
///
/// The bytes go to a temp file in the destination directory, are flushed and
/// fsynced, then renamed over `path`. A concurrent reader sees either the old
/// document or the new one, never a partial write.
pub fn atomic_write(path: &Path, data: &[u8]) -> DomainResult<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir)?;

    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(data)?;
    tmp.flush()?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| DomainError::Io(e.error))?;
    Ok(())
}

/// Serialize `value` as pretty JSON and write it atomically.
pub fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> DomainResult<()> {
    let data = serde_json::to_vec_pretty(value)?;
    atomic_write(path, &data)
}

/// Read and parse a JSON document that must exist.
///
/// Missing files map to [`DomainError::CheckpointNotFound`] and parse errors
/// to [`DomainError::CheckpointCorrupt`], so callers never mistake a lost
/// file for an empty one.
pub fn read_json_strict<T: DeserializeOwned>(path: &Path) -> DomainResult<T> {
    let data = match std::fs::read(path) {
        Ok(data) => data,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(DomainError::CheckpointNotFound(path.to_path_buf()));
        }
        Err(e) => return Err(DomainError::Io(e)),
    };
    serde_json::from_slice(&data).map_err(|e| DomainError::CheckpointCorrupt {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })
}

/// Write a graph atomically as pretty JSON.
pub fn save_graph(path: &Path, graph: &Graph) -> DomainResult<()> {
    atomic_write(path, graph.to_json()?.as_bytes())
}

/// Read a plan graph. A missing plan is an ordinary I/O error.
pub fn load_graph(path: &Path) -> DomainResult<Graph> {
    let data = std::fs::read_to_string(path)?;
    Graph::from_json(&data)
}
