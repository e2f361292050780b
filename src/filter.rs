//! Directory exclusion with glob patterns.

use crate::error::{Error, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::path::Path;

/// Decides which subdirectories the walker descends into.
#[derive(Debug, Clone)]
pub(crate) struct DirectoryFilter {
    exclude_directories: GlobSet,
    empty: bool,
}

impl DirectoryFilter {
    /// Compiles the exclusion patterns.
    ///
    /// # Errors
    ///
    /// Returns a configuration error for an invalid glob pattern.
    pub(crate) fn new(patterns: &[String]) -> Result<Self> {
        Ok(Self {
            exclude_directories: Self::build_globset(patterns)?,
            empty: patterns.is_empty(),
        })
    }

    fn build_globset(patterns: &[String]) -> Result<GlobSet> {
        let mut builder = GlobSetBuilder::new();

        for pattern in patterns {
            let glob = Glob::new(pattern).map_err(|e| {
                Error::config(format!("Invalid glob pattern '{}': {}", pattern, e))
            })?;
            builder.add(glob);
        }

        builder
            .build()
            .map_err(|e| Error::config(format!("Failed to build glob set: {}", e)))
    }

    /// Returns true if `dir` (a descendant of `root`) should be traversed.
    ///
    /// The directory itself and each of its ancestors below `root` are
    /// tested; the root is never excluded.
    pub(crate) fn should_descend(&self, root: &Path, dir: &Path) -> bool {
        if self.empty {
            return true;
        }

        !dir.ancestors()
            .take_while(|ancestor| *ancestor != root)
            .any(|ancestor| self.exclude_directories.is_match(ancestor))
    }
}
