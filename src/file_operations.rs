use crate::metalink::sidecar_path;
use crate::temp::write_atomic;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Longest sanitized filename stem, in characters
const MAX_NAME_CHARS: usize = 100;

/// Errors that can occur during file operations
#[derive(Debug, Error)]
pub enum FileOperationError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Title {0:?} leaves no usable filename")]
    EmptyName(String),
}

/// Where the output files of one title go
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportPaths {
    /// The text report, `<name>.txt`
    pub report: PathBuf,
    /// The metalink sidecar, `<name>.txt.metalink`
    pub metalink: PathBuf,
}

/// Sanitizes a string for use in filenames by replacing problematic characters
///
/// - Reserved characters `< > : " / \ | ? *` and control characters become `_`
/// - Leading/trailing whitespace is trimmed
/// - Spaces become `_`, and runs of `_` collapse into one
/// - The result is capped at 100 characters
///
/// Applying it twice gives the same result as applying it once.
pub fn sanitize_filename(name: &str) -> String {
    let replaced: String = name
        .trim()
        .chars()
        .map(|c| match c {
            '<' | '>' | ':' | '"' | '/' | '\\' | '|' | '?' | '*' | ' ' => '_',
            c if c.is_control() || c.is_whitespace() => '_',
            c => c,
        })
        .collect();

    let mut sanitized = String::with_capacity(replaced.len());
    for c in replaced.chars() {
        if c == '_' && sanitized.ends_with('_') {
            continue;
        }
        sanitized.push(c);
    }

    let capped: String = sanitized
        .trim_start_matches('_')
        .chars()
        .take(MAX_NAME_CHARS)
        .collect();
    capped.trim_end_matches('_').to_string()
}

/// Computes the report and sidecar paths for a title
pub fn report_paths(output_dir: &Path, title: &str) -> Result<ReportPaths, FileOperationError> {
    let name = sanitize_filename(title);
    if name.is_empty() {
        return Err(FileOperationError::EmptyName(title.to_string()));
    }

    let report = output_dir.join(format!("{}.txt", name));
    let metalink = sidecar_path(&report);

    Ok(ReportPaths { report, metalink })
}

/// Writes the report text, creating the parent directory if it doesn't exist
pub fn write_report(path: &Path, text: &str) -> Result<(), FileOperationError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }

    write_atomic(path, text.as_bytes())?;
    Ok(())
}
