//! Cached business connection identifier.
//!
//! First writer wins: once a value is known it is never replaced for the life
//! of the process, even if a different identifier is observed later.

use std::path::{Path, PathBuf};

use giftvault_core::serde_helpers::non_blank;
use serde_json::Value;

use crate::atomic;

/// Where the cached identifier came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentitySource {
    /// Supplied by configuration at startup.
    Override,
    /// Read from the side file at startup.
    SideFile,
    /// Captured from the live update stream.
    Observed,
}

impl IdentitySource {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Override => "override",
            Self::SideFile => "side_file",
            Self::Observed => "observed",
        }
    }
}

#[derive(Debug)]
pub struct IdentityCache {
    path: PathBuf,
    value: Option<(String, IdentitySource)>,
}

impl IdentityCache {
    /// Resolve the identifier at startup: a non-blank `override_value` wins
    /// (kept in memory only), then the side file at `path`.
    pub fn open(path: impl Into<PathBuf>, override_value: Option<&str>) -> Self {
        let path = path.into();
        let value = match non_blank(override_value) {
            Some(v) => Some((v.to_owned(), IdentitySource::Override)),
            None => read_side_file(&path).map(|v| (v, IdentitySource::SideFile)),
        };
        if let Some((ref v, source)) = value {
            tracing::info!(source = source.as_str(), "business connection id = {v}");
        }
        Self { path, value }
    }

    pub fn get(&self) -> Option<&str> {
        self.value.as_ref().map(|(v, _)| v.as_str())
    }

    pub fn source(&self) -> Option<IdentitySource> {
        self.value.as_ref().map(|(_, s)| *s)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Cache `value` unless an identifier is already known. Returns `true`
    /// when the value was taken. Blank values are ignored.
    ///
    /// A failed side-file write is logged; the in-memory value is kept.
    pub fn set_if_absent(&mut self, value: &str) -> bool {
        let Some(value) = non_blank(Some(value)) else {
            return false;
        };
        if let Some(current) = self.get() {
            if current != value {
                tracing::debug!(current, ignored = value, "connection id already cached");
            }
            return false;
        }
        self.value = Some((value.to_owned(), IdentitySource::Observed));
        tracing::info!("captured business connection id = {value}");
        if let Err(e) = atomic::write_atomic(&self.path, format!("{value}\n").as_bytes()) {
            tracing::warn!("connection id side file write failed: {e}");
        }
        true
    }

    /// Identity fields for the status surface.
    pub fn describe(&self) -> Value {
        serde_json::json!({
            "known": self.value.is_some(),
            "source": self.source().map(IdentitySource::as_str),
        })
    }
}

fn read_side_file(path: &Path) -> Option<String> {
    match std::fs::read_to_string(path) {
        Ok(text) => non_blank(text.lines().next()).map(str::to_owned),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
        Err(e) => {
            tracing::warn!(path = %path.display(), "cannot read connection id side file: {e}");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn side_file(dir: &tempfile::TempDir) -> PathBuf {
        dir.path().join("bc_id.txt")
    }

    #[test]
    fn empty_cache_takes_first_value() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut cache = IdentityCache::open(side_file(&dir), None);
        assert_eq!(cache.get(), None);

        assert!(cache.set_if_absent("X"));
        assert_eq!(cache.get(), Some("X"));
        assert_eq!(cache.source(), Some(IdentitySource::Observed));
        assert_eq!(
            std::fs::read_to_string(side_file(&dir)).expect("read"),
            "X\n"
        );
    }

    #[test]
    fn first_write_wins() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut cache = IdentityCache::open(side_file(&dir), None);
        assert!(cache.set_if_absent("X"));
        assert!(!cache.set_if_absent("Y"));
        assert_eq!(cache.get(), Some("X"));
        assert_eq!(
            std::fs::read_to_string(side_file(&dir)).expect("read"),
            "X\n"
        );
    }

    #[test]
    fn blank_values_are_ignored() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut cache = IdentityCache::open(side_file(&dir), None);
        assert!(!cache.set_if_absent("   "));
        assert_eq!(cache.get(), None);
        assert!(!side_file(&dir).exists());
    }

    #[test]
    fn side_file_survives_restart() {
        let dir = tempfile::tempdir().expect("tempdir");
        IdentityCache::open(side_file(&dir), None).set_if_absent("X");

        let reopened = IdentityCache::open(side_file(&dir), None);
        assert_eq!(reopened.get(), Some("X"));
        assert_eq!(reopened.source(), Some(IdentitySource::SideFile));
    }

    #[test]
    fn override_beats_side_file_and_is_not_written() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(side_file(&dir), "FROM-FILE\n").expect("write");

        let mut cache = IdentityCache::open(side_file(&dir), Some("FROM-ENV"));
        assert_eq!(cache.get(), Some("FROM-ENV"));
        assert_eq!(cache.source(), Some(IdentitySource::Override));
        assert!(!cache.set_if_absent("LIVE"));
        assert_eq!(
            std::fs::read_to_string(side_file(&dir)).expect("read"),
            "FROM-FILE\n"
        );
    }

    #[test]
    fn blank_override_falls_back_to_side_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(side_file(&dir), "  FROM-FILE  \n").expect("write");
        let cache = IdentityCache::open(side_file(&dir), Some(""));
        assert_eq!(cache.get(), Some("FROM-FILE"));
    }

    #[test]
    fn blank_side_file_means_absent() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(side_file(&dir), "\n").expect("write");
        assert_eq!(IdentityCache::open(side_file(&dir), None).get(), None);
    }

    #[test]
    fn describe_hides_the_value() {
        let dir = tempfile::tempdir().expect("tempdir");
        let cache = IdentityCache::open(side_file(&dir), Some("SECRET"));
        let described = cache.describe();
        assert_eq!(described["known"], true);
        assert_eq!(described["source"], "override");
        assert!(!described.to_string().contains("SECRET"));
    }
}
