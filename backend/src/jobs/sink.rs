// Result Logger - Append-only destinations for job records

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tokio::io::AsyncWriteExt;

#[derive(Error, Debug)]
pub enum SinkError {
    #[error("Failed to append to {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Sink unavailable: {0}")]
    Unavailable(String),
}

/// A durable, append-only place to write job records.
///
/// Each call to `append` writes one complete record in a single operation.
#[async_trait]
pub trait LogSink: Send + Sync {
    async fn append(&self, record: &str) -> Result<(), SinkError>;
}

#[derive(Debug, Clone)]
pub struct FileSink {
    path: PathBuf,
}

impl FileSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl LogSink for FileSink {
    async fn append(&self, record: &str) -> Result<(), SinkError> {
        let io_err = |source| SinkError::Io { path: self.path.display().to_string(), source };

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(io_err)?;

        let mut line = record.to_string();
        if !line.ends_with('\n') {
            line.push('\n');
        }
        file.write_all(line.as_bytes()).await.map_err(io_err)?;
        file.flush().await.map_err(io_err)?;
        Ok(())
    }
}

/// Keeps records in memory; cloning shares the same buffer.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    records: Arc<Mutex<Vec<String>>>,
    failing: bool,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// A sink that rejects every write.
    pub fn failing() -> Self {
        Self { failing: true, ..Self::default() }
    }

    pub fn records(&self) -> Vec<String> {
        self.records.lock().map(|r| r.clone()).unwrap_or_default()
    }

    pub fn contents(&self) -> String {
        self.records().concat()
    }
}

#[async_trait]
impl LogSink for MemorySink {
    async fn append(&self, record: &str) -> Result<(), SinkError> {
        if self.failing {
            return Err(SinkError::Unavailable("memory sink configured to fail".to_string()));
        }
        let mut records = self
            .records
            .lock()
            .map_err(|_| SinkError::Unavailable("memory sink poisoned".to_string()))?;
        let mut line = record.to_string();
        if !line.ends_with('\n') {
            line.push('\n');
        }
        records.push(line);
        Ok(())
    }
}

/// The main log and the error log a job writes to.
#[derive(Clone)]
pub struct JobLogs {
    pub log: Arc<dyn LogSink>,
    pub errors: Arc<dyn LogSink>,
}

impl JobLogs {
    pub fn new(log: Arc<dyn LogSink>, errors: Arc<dyn LogSink>) -> Self {
        Self { log, errors }
    }

    pub fn files((log, errors): (PathBuf, PathBuf)) -> Self {
        Self::new(Arc::new(FileSink::new(log)), Arc::new(FileSink::new(errors)))
    }
}
