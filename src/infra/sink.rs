//! Results sink: durable home of the final allocation set.

use std::fs;
use std::path::PathBuf;

use async_trait::async_trait;
use directories::ProjectDirs;
use parking_lot::RwLock;
use thiserror::Error;

use crate::domain::Allocation;

const ALLOCATIONS_FILE: &str = "allocations.json";

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("sink connection error: {0}")]
    Connection(String),
    #[error("storage directory unavailable")]
    StorageUnavailable,
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Serde(#[from] serde_json::Error),
}

/// Write contract for the allocation table. One run produces one full set;
/// `replace_allocations` swaps out whatever the previous run left behind.
#[async_trait]
pub trait ResultsSink: Send + Sync {
    /// Make the sink ready for a run (create the table/directory).
    async fn prepare(&self) -> Result<(), SinkError>;

    /// Replace the previous allocation set with `rows` in one step. The
    /// old set must stay readable until the new one is fully written.
    async fn replace_allocations(&self, rows: &[Allocation]) -> Result<(), SinkError>;

    /// The currently persisted allocation set.
    async fn load_allocations(&self) -> Result<Vec<Allocation>, SinkError>;
}

/// Sink holding rows in memory, for tests and embedding hosts.
#[derive(Debug, Default)]
pub struct MemorySink {
    rows: RwLock<Vec<Allocation>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rows(&self) -> Vec<Allocation> {
        self.rows.read().clone()
    }
}

#[async_trait]
impl ResultsSink for MemorySink {
    async fn prepare(&self) -> Result<(), SinkError> {
        Ok(())
    }

    async fn replace_allocations(&self, rows: &[Allocation]) -> Result<(), SinkError> {
        *self.rows.write() = rows.to_vec();
        Ok(())
    }

    async fn load_allocations(&self) -> Result<Vec<Allocation>, SinkError> {
        Ok(self.rows.read().clone())
    }
}

/// Sink writing the allocation set as a JSON file.
///
/// The new set is staged to a side file and renamed over the previous one,
/// so a crash mid-write never leaves the table empty.
#[derive(Clone, Debug)]
pub struct JsonFileSink {
    base: PathBuf,
}

impl JsonFileSink {
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self { base: base.into() }
    }

    /// Sink rooted in the platform data directory.
    pub fn default_location() -> Result<Self, SinkError> {
        let dirs = ProjectDirs::from("com", "GrainProvisioner", "GrainProvisioner")
            .ok_or(SinkError::StorageUnavailable)?;
        Ok(Self::new(dirs.data_dir()))
    }

    fn path(&self) -> PathBuf {
        self.base.join(ALLOCATIONS_FILE)
    }
}

#[async_trait]
impl ResultsSink for JsonFileSink {
    async fn prepare(&self) -> Result<(), SinkError> {
        fs::create_dir_all(&self.base)?;
        Ok(())
    }

    async fn replace_allocations(&self, rows: &[Allocation]) -> Result<(), SinkError> {
        fs::create_dir_all(&self.base)?;
        let staged = self.base.join(format!("{ALLOCATIONS_FILE}.tmp"));
        let json = serde_json::to_string(&rows)?;
        fs::write(&staged, json)?;
        fs::rename(&staged, self.path())?;
        Ok(())
    }

    async fn load_allocations(&self) -> Result<Vec<Allocation>, SinkError> {
        let path = self.path();
        if !path.exists() {
            return Ok(Vec::new());
        }
        let content = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }
}
