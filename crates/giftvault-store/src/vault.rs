//! The daemon's shared mutable state: records plus cached identity.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::error::StoreError;
use crate::identity::IdentityCache;
use crate::records::RecordStore;

/// Snapshot file name inside the data directory.
pub const SNAPSHOT_FILE: &str = "gifts.json";
/// Connection id side file name inside the data directory.
pub const IDENTITY_FILE: &str = "bc_id.txt";

/// Both ingestion paths mutate this under one lock. Hold the lock only for
/// in-memory work and the synchronous snapshot write, never across a network
/// call.
pub type SharedVault = Arc<Mutex<Vault>>;

#[derive(Debug)]
pub struct Vault {
    pub records: RecordStore,
    pub identity: IdentityCache,
}

impl Vault {
    /// Open (creating if needed) `data_dir` and load both files from it.
    pub fn open(data_dir: &Path, identity_override: Option<&str>) -> Result<Self, StoreError> {
        std::fs::create_dir_all(data_dir).map_err(|e| StoreError::io(data_dir, e))?;
        Ok(Self {
            records: RecordStore::open(snapshot_path(data_dir)),
            identity: IdentityCache::open(identity_path(data_dir), identity_override),
        })
    }

    pub fn into_shared(self) -> SharedVault {
        Arc::new(Mutex::new(self))
    }
}

pub fn snapshot_path(data_dir: &Path) -> PathBuf {
    data_dir.join(SNAPSHOT_FILE)
}

pub fn identity_path(data_dir: &Path) -> PathBuf {
    data_dir.join(IDENTITY_FILE)
}
