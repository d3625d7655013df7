//! Write-to-temp-then-rename file replacement.
//!
//! The temp file lives in the target's directory so the final rename stays on
//! one filesystem. Until [`StagedFile::commit`] runs, the previous target is
//! untouched; a crash between staging and commit leaves at most a stray temp
//! file next to it.

use std::io::Write;
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;

use crate::error::StoreError;

/// Fully written and synced temp file waiting to replace its target.
#[derive(Debug)]
pub struct StagedFile {
    temp: NamedTempFile,
    target: PathBuf,
}

impl StagedFile {
    #[cfg(test)]
    pub(crate) fn temp_path(&self) -> &Path {
        self.temp.path()
    }

    /// Atomically rename the staged file over the target.
    pub fn commit(self) -> Result<(), StoreError> {
        let target = self.target;
        self.temp
            .persist(&target)
            .map_err(|e| StoreError::Persist {
                path: target.clone(),
                source: e.error,
            })?;
        Ok(())
    }
}

fn parent_dir(target: &Path) -> &Path {
    match target.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    }
}

/// Write `data` to a synced temp file beside `target`.
pub fn stage(target: &Path, data: &[u8]) -> Result<StagedFile, StoreError> {
    let dir = parent_dir(target);
    let prefix = format!(
        ".{}.",
        target
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    );
    let mut temp = tempfile::Builder::new()
        .prefix(&prefix)
        .suffix(".tmp")
        .tempfile_in(dir)
        .map_err(|e| StoreError::io(dir, e))?;
    temp.write_all(data)
        .map_err(|e| StoreError::io(temp.path(), e))?;
    temp.as_file()
        .sync_all()
        .map_err(|e| StoreError::io(temp.path(), e))?;
    Ok(StagedFile {
        temp,
        target: target.to_path_buf(),
    })
}

/// Replace `target` with `data` in one atomic step.
pub fn write_atomic(target: &Path, data: &[u8]) -> Result<(), StoreError> {
    stage(target, data)?.commit()
}
