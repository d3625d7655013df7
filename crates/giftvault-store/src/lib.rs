//! giftvault-store: durable state of the reconciliation cache.
//! Per-owner deduplicated gift records, the cached connection identifier,
//! and the atomic file writes both rely on.

pub mod atomic;
pub mod error;
pub mod identity;
pub mod records;
pub mod vault;

pub use error::StoreError;
pub use identity::{IdentityCache, IdentitySource};
pub use records::{RecordStore, load_snapshot};
pub use vault::{IDENTITY_FILE, SNAPSHOT_FILE, SharedVault, Vault};
