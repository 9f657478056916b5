//! Bulk loading of entity sets into a repository.
//!
//! # Responsibility
//! - Read an ordered record set from a source (JSON file or memory).
//! - Reset the target collection and insert the set in one batch.
//!
//! # Invariants
//! - The source is read before anything is reset, so a bad file leaves the
//!   collection untouched.
//! - After a successful load the collection holds exactly the loaded set.

use crate::repo::{RepoError, Repository};
use log::info;
use serde::de::DeserializeOwned;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::fs;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::time::Instant;

#[derive(Debug)]
pub enum LoadError {
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
    Repo(RepoError),
}

impl Display for LoadError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io { path, source } => write!(f, "cannot read `{}`: {source}", path.display()),
            Self::Parse { path, source } => {
                write!(f, "`{}` is not a JSON array of records: {source}", path.display())
            }
            Self::Repo(err) => write!(f, "{err}"),
        }
    }
}

impl Error for LoadError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::Parse { source, .. } => Some(source),
            Self::Repo(err) => Some(err),
        }
    }
}

impl From<RepoError> for LoadError {
    fn from(value: RepoError) -> Self {
        Self::Repo(value)
    }
}

/// Ordered supply of records.
pub trait EntitySource<T> {
    /// Short human-readable origin, used in logs and reports.
    fn describe(&self) -> String;
    fn read(&self) -> Result<Vec<T>, LoadError>;
}

/// Records read from a file holding one JSON array.
#[derive(Debug)]
pub struct JsonFileSource<T> {
    path: PathBuf,
    _record: PhantomData<fn() -> T>,
}

impl<T> JsonFileSource<T> {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            _record: PhantomData,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl<T: DeserializeOwned> EntitySource<T> for JsonFileSource<T> {
    fn describe(&self) -> String {
        self.path.display().to_string()
    }

    fn read(&self) -> Result<Vec<T>, LoadError> {
        let text = fs::read_to_string(&self.path).map_err(|source| LoadError::Io {
            path: self.path.clone(),
            source,
        })?;
        serde_json::from_str(&text).map_err(|source| LoadError::Parse {
            path: self.path.clone(),
            source,
        })
    }
}

impl<T: Clone> EntitySource<T> for Vec<T> {
    fn describe(&self) -> String {
        format!("memory({} records)", self.len())
    }

    fn read(&self) -> Result<Vec<T>, LoadError> {
        Ok(self.clone())
    }
}

/// How the target collection is cleared before loading.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ResetStrategy {
    #[default]
    DropCollection,
    DeleteAll,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadReport {
    pub collection: String,
    pub source: String,
    pub ids: Vec<String>,
}

impl LoadReport {
    pub fn loaded(&self) -> usize {
        self.ids.len()
    }
}

/// Replaces a collection's content with a source's records.
pub struct DataLoader<'r, T> {
    repo: &'r dyn Repository<T>,
    reset: ResetStrategy,
}

impl<'r, T> DataLoader<'r, T> {
    pub fn new(repo: &'r dyn Repository<T>) -> Self {
        Self {
            repo,
            reset: ResetStrategy::default(),
        }
    }

    pub fn with_reset(mut self, reset: ResetStrategy) -> Self {
        self.reset = reset;
        self
    }

    pub fn load(&self, source: &dyn EntitySource<T>) -> Result<LoadReport, LoadError> {
        let started_at = Instant::now();
        let records = source.read()?;

        match self.reset {
            ResetStrategy::DropCollection => self.repo.drop_collection()?,
            ResetStrategy::DeleteAll => {
                self.repo.delete_all()?;
            }
        }
        let ids = self.repo.insert_many(&records)?;

        let report = LoadReport {
            collection: self.repo.collection_name().to_string(),
            source: source.describe(),
            ids,
        };
        info!(
            "event=data_load module=loader status=ok collection={} reset={:?} count={} duration_ms={}",
            report.collection,
            self.reset,
            report.loaded(),
            started_at.elapsed().as_millis()
        );
        Ok(report)
    }
}
