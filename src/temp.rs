//! Temporary file management module
//!
//! This module provides RAII-based temporary file handling with automatic
//! cleanup, used to write output files atomically.

use std::fs::{self, File};
use std::io::{self, Write};
use std::ops::Deref;
use std::path::{Path, PathBuf};

/// Guard for a temporary file that is deleted on drop unless persisted
#[derive(Debug)]
pub(crate) struct TempGuard {
    path: PathBuf,
    persisted: bool,
}

impl TempGuard {
    /// Get the path to the temporary file
    pub(crate) fn path(&self) -> &Path {
        &self.path
    }

    /// Moves the temporary file to `destination`, disarming the cleanup
    pub(crate) fn persist(mut self, destination: &Path) -> io::Result<()> {
        fs::rename(&self.path, destination)?;
        self.persisted = true;
        Ok(())
    }
}

impl Drop for TempGuard {
    fn drop(&mut self) {
        if !self.persisted {
            // Silently ignore errors during cleanup
            let _ = fs::remove_file(&self.path);
        }
    }
}

impl Deref for TempGuard {
    type Target = Path;

    fn deref(&self) -> &Self::Target {
        self.path()
    }
}

/// Creates a temporary file next to `destination`
///
/// The file lives in the same directory so that a later rename stays on one
/// filesystem. Its name carries a ULID to keep concurrent writers apart.
pub(crate) fn create_temp_file_for(destination: &Path) -> io::Result<TempGuard> {
    let dir = match destination.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    let stem = destination
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "output".to_string());

    let ulid = ulid::Ulid::new();
    let path = dir.join(format!(".{}.{}.tmp", stem, ulid));

    File::create(&path)?;

    Ok(TempGuard {
        path,
        persisted: false,
    })
}

/// Writes `contents` to `destination` atomically
///
/// Readers see either the previous file or the complete new one, and a
/// failed write leaves no partial file behind.
pub(crate) fn write_atomic(destination: &Path, contents: &[u8]) -> io::Result<()> {
    let temp = create_temp_file_for(destination)?;

    let mut file = File::create(temp.path())?;
    file.write_all(contents)?;
    file.sync_all()?;
    drop(file);

    temp.persist(destination)
}
