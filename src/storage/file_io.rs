//! File I/O utilities with atomic writes
//!
//! Data files are JSON unless their extension says YAML (`.yaml`/`.yml`).
//! Writes go to a sibling temp file that is synced and renamed over the
//! target, so a file is either completely written or not modified at all.

use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::{de::DeserializeOwned, Serialize};

use crate::error::{CategorizeError, CategorizeResult};

/// On-disk encoding of a data file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataFormat {
    Json,
    Yaml,
}

impl DataFormat {
    /// Pick the format from a file extension; anything but YAML is JSON
    pub fn from_path(path: &Path) -> Self {
        match path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .as_deref()
        {
            Some("yaml") | Some("yml") => DataFormat::Yaml,
            _ => DataFormat::Json,
        }
    }
}

/// Read a data file, returning a default value if it doesn't exist
pub fn read_data<T, P>(path: P) -> CategorizeResult<T>
where
    T: DeserializeOwned + Default,
    P: AsRef<Path>,
{
    let path = path.as_ref();

    if !path.exists() {
        return Ok(T::default());
    }

    read_data_required(path)
}

/// Read a data file, returning an error if it doesn't exist
pub fn read_data_required<T, P>(path: P) -> CategorizeResult<T>
where
    T: DeserializeOwned,
    P: AsRef<Path>,
{
    let path = path.as_ref();

    if !path.exists() {
        return Err(CategorizeError::Storage(format!(
            "File not found: {}",
            path.display()
        )));
    }

    let file = File::open(path).map_err(|e| {
        CategorizeError::PersistenceUnavailable(format!("Failed to open {}: {}", path.display(), e))
    })?;
    let reader = BufReader::new(file);

    let parsed = match DataFormat::from_path(path) {
        DataFormat::Json => serde_json::from_reader(reader).map_err(|e| e.to_string()),
        DataFormat::Yaml => serde_yaml::from_reader(reader).map_err(|e| e.to_string()),
    };

    parsed.map_err(|e| CategorizeError::Storage(format!("Failed to parse {}: {}", path.display(), e)))
}

fn temp_path_for(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

/// Write a data file atomically (write to temp, then rename)
pub fn write_data_atomic<T, P>(path: P, data: &T) -> CategorizeResult<()>
where
    T: Serialize,
    P: AsRef<Path>,
{
    let path = path.as_ref();

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| {
            CategorizeError::PersistenceUnavailable(format!(
                "Failed to create directory {}: {}",
                parent.display(),
                e
            ))
        })?;
    }

    // Same directory as the target so the rename stays atomic
    let temp_path = temp_path_for(path);

    let file = File::create(&temp_path).map_err(|e| {
        CategorizeError::PersistenceUnavailable(format!("Failed to create temp file: {}", e))
    })?;

    let mut writer = BufWriter::new(file);
    match DataFormat::from_path(path) {
        DataFormat::Json => serde_json::to_writer_pretty(&mut writer, data)
            .map_err(|e| CategorizeError::Storage(format!("Failed to serialize data: {}", e)))?,
        DataFormat::Yaml => serde_yaml::to_writer(&mut writer, data)
            .map_err(|e| CategorizeError::Storage(format!("Failed to serialize data: {}", e)))?,
    }

    writer.flush().map_err(|e| {
        CategorizeError::PersistenceUnavailable(format!("Failed to flush data: {}", e))
    })?;

    writer.get_ref().sync_all().map_err(|e| {
        CategorizeError::PersistenceUnavailable(format!("Failed to sync data: {}", e))
    })?;

    fs::rename(&temp_path, path).map_err(|e| {
        let _ = fs::remove_file(&temp_path);
        CategorizeError::PersistenceUnavailable(format!("Failed to rename temp file: {}", e))
    })?;

    Ok(())
}
