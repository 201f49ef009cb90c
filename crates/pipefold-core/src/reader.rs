//! File reader
//!
//! Expands one glob pattern and loads every matched file. Matches are read
//! concurrently but returned in glob order; the first failed read aborts the
//! whole call.

use futures::future::try_join_all;
use std::path::PathBuf;

use crate::error::{Error, Result};
use crate::file::{Content, FileCollection, FileRecord};

/// Read every file matching `pattern`.
///
/// Fails with [`Error::NoMatch`] when nothing matches. Directories matched by
/// the pattern are skipped.
pub async fn read(pattern: &str) -> Result<FileCollection> {
    let paths = expand(pattern).await?;
    if paths.is_empty() {
        return Err(Error::NoMatch {
            pattern: pattern.to_string(),
        });
    }

    tracing::debug!("Pattern {} matched {} file(s)", pattern, paths.len());
    try_join_all(paths.into_iter().map(read_file)).await
}

/// Glob `pattern` off the async runtime
async fn expand(pattern: &str) -> Result<Vec<PathBuf>> {
    let owned = pattern.to_string();
    tokio::task::spawn_blocking(move || glob_files(&owned))
        .await
        .map_err(|err| Error::Io {
            path: PathBuf::from(pattern),
            source: std::io::Error::other(err),
        })?
}

fn glob_files(pattern: &str) -> Result<Vec<PathBuf>> {
    let mut paths = Vec::new();
    for entry in glob::glob(pattern)? {
        let path = entry.map_err(|err| Error::Io {
            path: err.path().to_path_buf(),
            source: err.into_error(),
        })?;
        if path.is_file() {
            paths.push(path);
        }
    }
    Ok(paths)
}

async fn read_file(path: PathBuf) -> Result<FileRecord> {
    let bytes = tokio::fs::read(&path).await.map_err(|source| Error::Io {
        path: path.clone(),
        source,
    })?;
    Ok(FileRecord {
        content: Content::classify(bytes),
        path,
    })
}
