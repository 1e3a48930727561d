//! Recursive folder scanning.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use walkdir::WalkDir;

use crate::error::{PollerError, Result};

/// A single entry found while walking a folder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    /// Full path, rooted at the scanned folder.
    pub path: PathBuf,

    /// Base name.
    pub name: String,

    /// Whether the entry is a directory.
    pub is_directory: bool,

    /// Last modification time.
    pub modified: DateTime<Utc>,
}

/// Lazily walk `root` and every subdirectory below it.
///
/// The root itself is yielded first. Symbolic links are reported as
/// entries and never followed.
pub fn scan(root: &Path) -> Scan {
    Scan {
        inner: WalkDir::new(root).follow_links(false).into_iter(),
    }
}

/// Iterator returned by [`scan`].
pub struct Scan {
    inner: walkdir::IntoIter,
}

impl Iterator for Scan {
    type Item = Result<FileEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        let entry = match self.inner.next()? {
            Ok(entry) => entry,
            Err(err) => return Some(Err(err.into())),
        };

        Some(entry_from(&entry))
    }
}

fn entry_from(entry: &walkdir::DirEntry) -> Result<FileEntry> {
    let metadata = entry.metadata()?;
    let modified = metadata.modified().map_err(|err| PollerError::Scan {
        path: entry.path().to_path_buf(),
        message: err.to_string(),
    })?;

    Ok(FileEntry {
        path: entry.path().to_path_buf(),
        name: entry.file_name().to_string_lossy().into_owned(),
        is_directory: entry.file_type().is_dir(),
        modified: DateTime::<Utc>::from(modified),
    })
}
