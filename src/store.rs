use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::error::Category;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{} does not exist", .0.display())]
    NotFound(PathBuf),

    #[error("{} is not valid JSON: {source}", .path.display())]
    InvalidJson {
        path: PathBuf,
        source: serde_json::Error,
    },

    /// Well-formed JSON whose layout does not match the records held here.
    #[error("{} has an unexpected layout: {source}", .path.display())]
    UnexpectedShape {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("failed to access {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// A flat JSON file holding an array of records.
///
/// Every call goes back to disk; nothing is cached between calls and writes
/// replace the whole file (last writer wins).
pub struct JsonStore<T> {
    path: PathBuf,
    _record: PhantomData<T>,
}

impl<T> JsonStore<T>
where
    T: Serialize + DeserializeOwned,
{
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            _record: PhantomData,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Create the file as an empty array if it is missing.
    /// Returns `true` when a new file was written.
    pub fn ensure_exists(&self) -> Result<bool, StoreError> {
        if self.exists() {
            return Ok(false);
        }
        self.save(&[])?;
        Ok(true)
    }

    pub fn load(&self) -> Result<Vec<T>, StoreError> {
        let content = std::fs::read_to_string(&self.path).map_err(|source| {
            if source.kind() == std::io::ErrorKind::NotFound {
                StoreError::NotFound(self.path.clone())
            } else {
                StoreError::Io {
                    path: self.path.clone(),
                    source,
                }
            }
        })?;

        serde_json::from_str(&content).map_err(|source| {
            let path = self.path.clone();
            match source.classify() {
                Category::Syntax | Category::Eof => StoreError::InvalidJson { path, source },
                Category::Data | Category::Io => StoreError::UnexpectedShape { path, source },
            }
        })
    }

    /// Rewrite the file with `records`, pretty-printed.
    pub fn save(&self, records: &[T]) -> Result<(), StoreError> {
        let io_err = |source| StoreError::Io {
            path: self.path.clone(),
            source,
        };

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(io_err)?;
        }

        let json =
            serde_json::to_string_pretty(records).map_err(|source| StoreError::UnexpectedShape {
                path: self.path.clone(),
                source,
            })?;

        std::fs::write(&self.path, json).map_err(io_err)
    }
}
