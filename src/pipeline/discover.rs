use std::{
    ffi::OsStr,
    io,
    path::{Path, PathBuf},
};

use walkdir::WalkDir;

use super::ConversionError;
use crate::domain::Dialect;

/// Lists the files in `dirs` that carry the dialect's extension.
///
/// Directories are scanned non-recursively, in the order given. The combined
/// list is sorted by file name using a byte-wise comparison, so files from
/// several directories interleave by name rather than by directory.
///
/// # Errors
///
/// Returns [`ConversionError::Io`] naming the directory if it cannot be read.
pub fn discover<'a>(
    dirs: impl IntoIterator<Item = &'a Path>,
    dialect: Dialect,
) -> Result<Vec<PathBuf>, ConversionError> {
    let extension = OsStr::new(dialect.extension());
    let mut files = Vec::new();

    for dir in dirs {
        for entry in WalkDir::new(dir).min_depth(1).max_depth(1) {
            let entry = entry.map_err(|source| ConversionError::Io {
                path: dir.to_path_buf(),
                source: io::Error::from(source),
            })?;
            if entry.file_type().is_file() && entry.path().extension() == Some(extension) {
                tracing::debug!("Found source file {}", entry.path().display());
                files.push(entry.into_path());
            }
        }
    }

    // Stable, so equal names keep their directory order.
    files.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    Ok(files)
}
