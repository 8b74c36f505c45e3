use std::{
    io,
    path::{Path, PathBuf},
    time::Duration,
};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::fs;
use tracing::{info, warn};

use crate::clock::Timestamp;

#[derive(Debug, Error)]
pub enum RecordError {
    #[error("failed to read record file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("record file {path} is corrupt: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to persist record to {path}: {source}")]
    Persist {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Longest typing burst that ended in a sent message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "RecordFile", into = "RecordFile")]
pub struct Record {
    pub best_duration: Duration,
    /// `None` until the first record is set.
    pub set_at: Option<Timestamp>,
}

impl Record {
    pub fn is_set(&self) -> bool {
        self.set_at.is_some()
    }
}

/// On-disk schema.
#[derive(Serialize, Deserialize)]
struct RecordFile {
    best_duration_seconds: f64,
    set_at: Option<Timestamp>,
}

impl TryFrom<RecordFile> for Record {
    type Error = String;

    fn try_from(file: RecordFile) -> Result<Self, Self::Error> {
        let best_duration = Duration::try_from_secs_f64(file.best_duration_seconds)
            .map_err(|e| format!("best_duration_seconds: {e}"))?;
        if best_duration.is_zero() != file.set_at.is_none() {
            return Err("set_at must be null exactly when best_duration_seconds is 0".into());
        }
        Ok(Self {
            best_duration,
            set_at: file.set_at,
        })
    }
}

impl From<Record> for RecordFile {
    fn from(record: Record) -> Self {
        Self {
            best_duration_seconds: record.best_duration.as_secs_f64(),
            set_at: record.set_at,
        }
    }
}

/// Read the record at `path` without creating anything. `Ok(None)` if absent.
pub async fn read_record(path: &Path) -> Result<Option<Record>, RecordError> {
    let bytes = match fs::read(path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(source) => {
            return Err(RecordError::Read {
                path: path.to_path_buf(),
                source,
            })
        }
    };
    serde_json::from_slice(&bytes)
        .map(Some)
        .map_err(|source| RecordError::Corrupt {
            path: path.to_path_buf(),
            source,
        })
}

async fn persist(path: &Path, record: &Record) -> Result<(), RecordError> {
    let err = |source| RecordError::Persist {
        path: path.to_path_buf(),
        source,
    };
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        fs::create_dir_all(dir).await.map_err(err)?;
    }
    let bytes = serde_json::to_vec_pretty(record).map_err(|e| err(e.into()))?;
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);
    fs::write(&tmp, bytes).await.map_err(err)?;
    fs::rename(&tmp, path).await.map_err(err)
}

/// JSON backed store for the single [`Record`].
#[derive(Debug)]
pub struct RecordStore {
    path: PathBuf,
    current: Record,
}

impl RecordStore {
    /// Load the record, writing out the default one if the file does not exist yet.
    pub async fn load(path: impl Into<PathBuf>) -> Result<Self, RecordError> {
        let path = path.into();
        let current = match read_record(&path).await? {
            Some(record) => record,
            None => {
                let record = Record::default();
                persist(&path, &record).await?;
                info!("initialised empty typing record at {}", path.display());
                record
            }
        };
        Ok(Self { path, current })
    }

    /// Like [`RecordStore::load`], but any failure falls back to an empty
    /// in-memory record so the bot keeps running.
    pub async fn load_or_default(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        match Self::load(path.clone()).await {
            Ok(store) => store,
            Err(err) => {
                warn!("{err}; starting from an empty record");
                Self {
                    path,
                    current: Record::default(),
                }
            }
        }
    }

    pub fn current(&self) -> &Record {
        &self.current
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Replace the record when `candidate` beats it. The file is written before
    /// the in-memory value changes, so a failed write leaves both untouched.
    pub async fn update_if_better(
        &mut self,
        candidate: Duration,
        at: Timestamp,
    ) -> Result<bool, RecordError> {
        if candidate <= self.current.best_duration {
            return Ok(false);
        }
        let record = Record {
            best_duration: candidate,
            set_at: Some(at),
        };
        persist(&self.path, &record).await?;
        self.current = record;
        Ok(true)
    }
}
