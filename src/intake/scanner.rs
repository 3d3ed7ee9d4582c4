//! Descriptor discovery
//!
//! Non-recursive listing of the input directory filtered by a glob, sorted
//! by file name so job order (and therefore device assignment) is stable
//! across runs.

use crate::error::{BatchError, Result};
use globset::{Glob, GlobMatcher};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Finds candidate descriptor files
#[derive(Debug, Clone)]
pub struct DescriptorScanner {
    matcher: GlobMatcher,
}

impl DescriptorScanner {
    /// Create a scanner for a file-name glob such as `*.json`
    pub fn new(pattern: &str) -> Result<Self> {
        let glob = Glob::new(pattern)
            .map_err(|e| BatchError::config(format!("Invalid pattern '{}': {}", pattern, e)))?;
        Ok(Self {
            matcher: glob.compile_matcher(),
        })
    }

    /// List matching files directly under `dir`, sorted by file name
    pub fn scan(&self, dir: &Path) -> Result<Vec<PathBuf>> {
        if !dir.is_dir() {
            return Err(BatchError::InputDirNotFound(dir.to_path_buf()));
        }

        let mut files = Vec::new();
        for entry in WalkDir::new(dir)
            .min_depth(1)
            .max_depth(1)
            .follow_links(true)
            .sort_by_file_name()
        {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    tracing::warn!(error = %e, "Skipping unreadable directory entry");
                    continue;
                }
            };

            if !entry.file_type().is_file() {
                continue;
            }
            if self.matcher.is_match(entry.file_name()) {
                files.push(entry.into_path());
            }
        }

        tracing::debug!(dir = %dir.display(), found = files.len(), "Scanned input directory");
        Ok(files)
    }
}
