use crate::{
    config::Config,
    error::{Error, Operation, Result},
    filter::DirectoryFilter,
};
use std::{
    collections::HashSet,
    ffi::OsString,
    fs,
    path::{Path, PathBuf},
};
use tracing::{debug, trace, warn};
use walkdir::WalkDir;

/// Kind of a directory entry, as seen by the walker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    /// Regular file
    File,
    /// Directory (or a followed symlink to one)
    Directory,
    /// Anything else: unfollowed symlinks, sockets, devices
    Other,
}

/// A single entry of a visited directory.
#[derive(Debug, Clone)]
pub struct Entry {
    /// File name, without the directory
    pub name: OsString,

    /// Full path of the entry
    pub path: PathBuf,

    /// Entry kind
    pub kind: EntryKind,
}

impl Entry {
    fn from_walkdir(entry: walkdir::DirEntry) -> Self {
        let file_type = entry.file_type();
        let kind = if file_type.is_file() {
            EntryKind::File
        } else if file_type.is_dir() {
            EntryKind::Directory
        } else {
            EntryKind::Other
        };

        Self {
            name: entry.file_name().to_os_string(),
            path: entry.into_path(),
            kind,
        }
    }

    /// Returns true for regular files.
    #[must_use]
    pub fn is_file(&self) -> bool {
        self.kind == EntryKind::File
    }
}

/// One directory and the entries directly inside it.
#[derive(Debug, Clone)]
pub struct DirectoryVisit {
    /// Directory path
    pub directory: PathBuf,

    /// Files, subdirectories and other entries at this level
    pub entries: Vec<Entry>,
}

impl DirectoryVisit {
    /// Regular files at this level.
    pub fn files(&self) -> impl Iterator<Item = &Entry> {
        self.entries.iter().filter(|e| e.is_file())
    }

    /// Subdirectories at this level.
    pub fn subdirectories(&self) -> impl Iterator<Item = &Entry> {
        self.entries
            .iter()
            .filter(|e| e.kind == EntryKind::Directory)
    }
}

/// Traversal options.
#[derive(Debug, Clone, Copy)]
pub struct WalkOptions {
    /// Sort entries by file name within each directory
    pub sort_entries: bool,

    /// Follow symbolic links to files and directories
    pub follow_links: bool,
}

impl Default for WalkOptions {
    fn default() -> Self {
        Self {
            sort_entries: true,
            follow_links: false,
        }
    }
}

/// Depth-first, pre-order directory walk.
///
/// Yields each directory together with its entries, the root first. The
/// iterator is lazy and single-pass: a directory is listed only when it is
/// reached. A directory that cannot be listed yields an error and the walk
/// continues with the next pending directory.
pub struct DirectoryWalker {
    root: PathBuf,
    filter: DirectoryFilter,
    options: WalkOptions,
    pending: Vec<PathBuf>,
    visited: HashSet<PathBuf>,
}

impl DirectoryWalker {
    /// Creates a walker rooted at `root`.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if an exclusion pattern is invalid.
    pub fn new(
        root: impl Into<PathBuf>,
        exclude_directories: &[String],
        options: WalkOptions,
    ) -> Result<Self> {
        let root = root.into();

        Ok(Self {
            pending: vec![root.clone()],
            root,
            filter: DirectoryFilter::new(exclude_directories)?,
            options,
            visited: HashSet::new(),
        })
    }

    /// Creates a walker from configuration.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if an exclusion pattern is invalid.
    pub fn from_config(config: &Config) -> Result<Self> {
        Self::new(
            config.root_dir.clone(),
            &config.exclude_directories,
            WalkOptions {
                sort_entries: config.sort_entries,
                follow_links: config.follow_links,
            },
        )
    }

    /// Root of the walk.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Lists a single directory through walkdir at depth one.
    fn list(&self, dir: &Path) -> Result<Vec<Entry>> {
        let mut walk = WalkDir::new(dir)
            .min_depth(1)
            .max_depth(1)
            .follow_links(self.options.follow_links);

        if self.options.sort_entries {
            walk = walk.sort_by_file_name();
        }

        let mut entries = Vec::new();
        for result in walk {
            match result {
                Ok(entry) => entries.push(Entry::from_walkdir(entry)),
                Err(e) if e.depth() == 0 => {
                    let source: std::io::Error = e.into();
                    return Err(Error::file_access(dir, Operation::List, &source));
                }
                Err(e) => {
                    warn!("Skipping unreadable entry in {}: {}", dir.display(), e);
                }
            }
        }

        Ok(entries)
    }

    /// Records a directory as visited; false if it was seen before.
    ///
    /// Only consulted when links are followed, since a tree without followed
    /// links cannot contain cycles.
    fn mark_visited(&mut self, dir: &Path) -> bool {
        match fs::canonicalize(dir) {
            Ok(canonical) => self.visited.insert(canonical),
            Err(e) => {
                trace!("Cannot canonicalize {}: {}", dir.display(), e);
                true
            }
        }
    }

    fn schedule_subdirectories(&mut self, entries: &[Entry]) {
        // Reverse so the first listed subdirectory is popped next.
        for entry in entries.iter().rev() {
            if entry.kind != EntryKind::Directory {
                continue;
            }
            if self.filter.should_descend(&self.root, &entry.path) {
                self.pending.push(entry.path.clone());
            } else {
                debug!("Excluded directory: {}", entry.path.display());
            }
        }
    }
}

impl Iterator for DirectoryWalker {
    type Item = Result<DirectoryVisit>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let dir = self.pending.pop()?;

            if self.options.follow_links && !self.mark_visited(&dir) {
                warn!("Skipping already visited directory (link cycle): {}", dir.display());
                continue;
            }

            return Some(self.list(&dir).map(|entries| {
                self.schedule_subdirectories(&entries);
                DirectoryVisit {
                    directory: dir,
                    entries,
                }
            }));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_fs::prelude::*;

    fn walk(root: &Path, exclude: &[&str]) -> Vec<DirectoryVisit> {
        let exclude: Vec<String> = exclude.iter().map(|p| (*p).to_string()).collect();
        DirectoryWalker::new(root, &exclude, WalkOptions::default())
            .unwrap()
            .collect::<Result<Vec<_>>>()
            .unwrap()
    }

    fn names(visit: &DirectoryVisit) -> Vec<String> {
        visit
            .entries
            .iter()
            .map(|e| e.name.to_string_lossy().to_string())
            .collect()
    }

    #[test]
    fn test_root_visited_first_with_entries() {
        let temp = assert_fs::TempDir::new().unwrap();
        temp.child("b.txt").write_str("b").unwrap();
        temp.child("a.html").write_str("a").unwrap();
        temp.child("sub/c.php").write_str("c").unwrap();

        let visits = walk(temp.path(), &[]);

        assert_eq!(visits.len(), 2);
        assert_eq!(visits[0].directory, temp.path());
        assert_eq!(names(&visits[0]), vec!["a.html", "b.txt", "sub"]);
        assert_eq!(visits[0].files().count(), 2);
        assert_eq!(visits[0].subdirectories().count(), 1);
        assert_eq!(visits[1].directory, temp.path().join("sub"));
        assert_eq!(names(&visits[1]), vec!["c.php"]);
    }

    #[test]
    fn test_depth_first_pre_order() {
        let temp = assert_fs::TempDir::new().unwrap();
        temp.child("a/deep/x.html").write_str("x").unwrap();
        temp.child("b/y.html").write_str("y").unwrap();

        let dirs: Vec<PathBuf> = walk(temp.path(), &[])
            .into_iter()
            .map(|v| v.directory)
            .collect();

        assert_eq!(
            dirs,
            vec![
                temp.path().to_path_buf(),
                temp.path().join("a"),
                temp.path().join("a/deep"),
                temp.path().join("b"),
            ]
        );
    }

    #[test]
    fn test_empty_directory() {
        let temp = assert_fs::TempDir::new().unwrap();

        let visits = walk(temp.path(), &[]);

        assert_eq!(visits.len(), 1);
        assert!(visits[0].entries.is_empty());
    }

    #[test]
    fn test_excluded_directory_not_visited() {
        let temp = assert_fs::TempDir::new().unwrap();
        temp.child("keep/a.html").write_str("a").unwrap();
        temp.child(".git/objects/b.html").write_str("b").unwrap();

        let visits = walk(temp.path(), &["**/.git"]);

        assert_eq!(visits.len(), 2);
        assert!(visits.iter().all(|v| !v.directory.ends_with(".git")));
        assert!(visits.iter().all(|v| !v.directory.ends_with("objects")));
    }

    #[test]
    fn test_missing_root_yields_error_then_ends() {
        let mut walker = DirectoryWalker::new(
            "/nonexistent/path/that/should/not/exist",
            &[],
            WalkOptions::default(),
        )
        .unwrap();

        let first = walker.next().unwrap();
        let err = first.unwrap_err();
        assert_eq!(err.kind(), "file_access");
        assert_eq!(err.operation(), Some(Operation::List));
        assert!(walker.next().is_none());
    }

    #[test]
    fn test_invalid_exclude_pattern() {
        let result = DirectoryWalker::new(".", &["a/[".to_string()], WalkOptions::default());
        assert!(result.is_err());
    }

    #[cfg(unix)]
    #[test]
    fn test_symlinks_not_followed_by_default() {
        let temp = assert_fs::TempDir::new().unwrap();
        temp.child("real/a.html").write_str("a").unwrap();
        std::os::unix::fs::symlink(temp.path().join("real"), temp.path().join("link")).unwrap();

        let visits = walk(temp.path(), &[]);

        assert_eq!(visits.len(), 2);
        let link = visits[0]
            .entries
            .iter()
            .find(|e| e.name == "link")
            .unwrap();
        assert_eq!(link.kind, EntryKind::Other);
    }

    #[cfg(unix)]
    #[test]
    fn test_follow_links_skips_cycles() {
        let temp = assert_fs::TempDir::new().unwrap();
        temp.child("a/x.html").write_str("x").unwrap();
        std::os::unix::fs::symlink(temp.path(), temp.path().join("a/loop")).unwrap();

        let options = WalkOptions {
            sort_entries: true,
            follow_links: true,
        };
        let visits: Vec<DirectoryVisit> = DirectoryWalker::new(temp.path(), &[], options)
            .unwrap()
            .collect::<Result<Vec<_>>>()
            .unwrap();

        assert_eq!(visits.len(), 2);
        assert_eq!(visits[1].directory, temp.path().join("a"));
    }
}
