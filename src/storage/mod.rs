//! On-disk layout of the knowledge base
//!
//! The persisted knowledge base is a pair of files: the binary vector index and
//! the JSON metadata side-car. Both are written through temp files that are
//! fsynced and then renamed into place, index first, metadata last. The
//! previous index is kept aside until the metadata rename succeeds and is put
//! back when a rename fails. The metadata manifest carries the BLAKE3 digest
//! of the index file, so a pair left torn by a crash between the two renames
//! is detected as inconsistent on load instead of being served.

use crate::config::StorageConfig;
use crate::error::{KbError, Result};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Paths of the persisted (index, metadata) pair
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KnowledgePaths {
    pub index: PathBuf,
    pub metadata: PathBuf,
}

/// Raw bytes of both persisted files
#[derive(Debug)]
pub struct PairBytes {
    pub index: Vec<u8>,
    pub metadata: Vec<u8>,
}

impl KnowledgePaths {
    pub fn new(data_dir: &Path, index_file: &str, metadata_file: &str) -> Self {
        Self {
            index: data_dir.join(index_file),
            metadata: data_dir.join(metadata_file),
        }
    }

    /// Resolve paths from configuration, expanding `~`
    pub fn from_config(config: &StorageConfig) -> Result<Self> {
        let data_dir = expand_path(&config.data_dir)?;
        Ok(Self::new(
            &data_dir,
            &config.index_file,
            &config.metadata_file,
        ))
    }

    /// Whether both files are present
    pub fn exists(&self) -> bool {
        self.index.is_file() && self.metadata.is_file()
    }

    /// Replace both files
    ///
    /// Nothing visible changes until both temp files are fully written. The
    /// previous index is set aside before the renames and put back if either
    /// rename fails, so an error leaves the previous pair in place.
    pub fn write_pair(&self, index: &[u8], metadata: &[u8]) -> Result<()> {
        self.write_pair_with(index, metadata, rename)
    }

    pub(crate) fn write_pair_with(
        &self,
        index: &[u8],
        metadata: &[u8],
        rename: impl Fn(&Path, &Path) -> Result<()>,
    ) -> Result<()> {
        let index_tmp = write_temp(&self.index, index)?;
        let metadata_tmp = match write_temp(&self.metadata, metadata) {
            Ok(path) => path,
            Err(e) => {
                let _ = fs::remove_file(&index_tmp);
                return Err(e);
            }
        };
        let discard_temps = || {
            let _ = fs::remove_file(&index_tmp);
            let _ = fs::remove_file(&metadata_tmp);
        };

        let backup = if self.index.exists() {
            let backup = sibling(&self.index, "bak")?;
            if let Err(e) = rename(&self.index, &backup) {
                discard_temps();
                return Err(e);
            }
            Some(backup)
        } else {
            None
        };
        let restore = |backup: &Option<PathBuf>| {
            if let Some(backup) = backup {
                if let Err(e) = fs::rename(backup, &self.index) {
                    tracing::error!(
                        "Failed to restore previous index from {}: {}",
                        backup.display(),
                        e
                    );
                }
            } else {
                let _ = fs::remove_file(&self.index);
            }
        };

        if let Err(e) = rename(&index_tmp, &self.index) {
            restore(&backup);
            discard_temps();
            return Err(e);
        }
        if let Err(e) = rename(&metadata_tmp, &self.metadata) {
            tracing::warn!("Metadata commit failed, restoring previous index: {}", e);
            restore(&backup);
            discard_temps();
            return Err(e);
        }

        if let Some(backup) = backup {
            let _ = fs::remove_file(backup);
        }

        tracing::debug!(
            "Persisted knowledge base: {} ({} bytes), {} ({} bytes)",
            self.index.display(),
            index.len(),
            self.metadata.display(),
            metadata.len()
        );

        Ok(())
    }

    /// Read both files
    ///
    /// Returns `Ok(None)` when neither file exists (nothing was ever ingested)
    /// and a persistence error when only one of them is present.
    pub fn read_pair(&self) -> Result<Option<PairBytes>> {
        match (self.index.exists(), self.metadata.exists()) {
            (false, false) => Ok(None),
            (true, false) => Err(KbError::persistence(
                &self.metadata,
                "Metadata file missing next to index file",
            )),
            (false, true) => Err(KbError::persistence(
                &self.index,
                "Index file missing next to metadata file",
            )),
            (true, true) => {
                let index = fs::read(&self.index)
                    .map_err(|e| KbError::persistence(&self.index, e.to_string()))?;
                let metadata = fs::read(&self.metadata)
                    .map_err(|e| KbError::persistence(&self.metadata, e.to_string()))?;
                Ok(Some(PairBytes { index, metadata }))
            }
        }
    }
}

/// Write `data` to `path` via temp file + fsync + rename
pub fn write_atomic(path: &Path, data: &[u8]) -> Result<()> {
    let temp_path = write_temp(path, data)?;
    rename(&temp_path, path)
}

fn parent_dir(path: &Path) -> PathBuf {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

/// Unique hidden path next to `path`
fn sibling(path: &Path, suffix: &str) -> Result<PathBuf> {
    let file_name = path
        .file_name()
        .ok_or_else(|| KbError::Config(format!("Invalid file path: {}", path.display())))?
        .to_string_lossy();
    Ok(parent_dir(path).join(format!(
        ".{}.{}.{}",
        file_name,
        uuid::Uuid::new_v4(),
        suffix
    )))
}

fn write_temp(path: &Path, data: &[u8]) -> Result<PathBuf> {
    let parent = parent_dir(path);
    fs::create_dir_all(&parent).map_err(|e| {
        KbError::io(
            e,
            format!("Failed to create parent directory: {}", parent.display()),
        )
    })?;

    let temp_path = sibling(path, "tmp")?;

    let mut file = fs::File::create(&temp_path).map_err(|e| {
        KbError::io(
            e,
            format!("Failed to create temp file: {}", temp_path.display()),
        )
    })?;

    let written = file
        .write_all(data)
        .and_then(|_| file.sync_all())
        .map_err(|e| KbError::io(e, format!("Failed to write temp file: {}", temp_path.display())));
    drop(file);

    if let Err(e) = written {
        let _ = fs::remove_file(&temp_path);
        return Err(e);
    }

    Ok(temp_path)
}

fn rename(from: &Path, to: &Path) -> Result<()> {
    fs::rename(from, to).map_err(|e| {
        KbError::io(
            e,
            format!(
                "Failed to rename temp file to final location: {} -> {}",
                from.display(),
                to.display()
            ),
        )
    })
}

/// Expand a leading `~/` to the home directory
pub fn expand_path(path: &Path) -> Result<PathBuf> {
    let path_str = path
        .to_str()
        .ok_or_else(|| KbError::Config("Invalid path encoding".to_string()))?;

    if let Some(stripped) = path_str.strip_prefix("~/") {
        let home = dirs::home_dir()
            .ok_or_else(|| KbError::Config("Cannot determine home directory".to_string()))?;
        Ok(home.join(stripped))
    } else {
        Ok(path.to_path_buf())
    }
}
