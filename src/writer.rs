use crate::{
    dispatcher::DispatchReport,
    error::{Error, Operation, Result},
};
use std::{
    fs,
    io::Write,
    path::{Path, PathBuf},
    time::SystemTime,
};
use tracing::{debug, info};

/// Replaces file contents atomically and persists run reports.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct Writer {
    backup_existing: bool,
}

impl Writer {
    pub(crate) const fn new(backup_existing: bool) -> Self {
        Self { backup_existing }
    }

    /// Replaces the contents of an existing file.
    ///
    /// Symbolic links are resolved first, so the file a link points to is
    /// rewritten and the link itself is kept.
    ///
    /// # Process
    ///
    /// 1. Resolves `path` to the file it names
    /// 2. Creates a backup if enabled
    /// 3. Writes content to a hidden temporary sibling of the target
    /// 4. Copies the original permissions and syncs to disk
    /// 5. Atomically renames the temporary file over the target
    ///
    /// # Errors
    ///
    /// Returns a file access error for `path` if any step fails. The target
    /// is left untouched in that case.
    pub(crate) fn replace(&self, path: &Path, content: &[u8]) -> Result<()> {
        let target = fs::canonicalize(path).map_err(|e| save_error(path, None, &e))?;
        if target != path {
            debug!("Resolved {} to {}", path.display(), target.display());
        }

        if self.backup_existing {
            self.backup_file(&target)
                .map_err(|(backup, e)| save_error(path, Some(&backup), &e))?;
        }

        let permissions = fs::metadata(&target)
            .map_err(|e| save_error(path, None, &e))?
            .permissions();

        let parent = target.parent().unwrap_or_else(|| Path::new("."));
        let mut temp_file = tempfile::Builder::new()
            .prefix(".utf8-sweep.")
            .suffix(".tmp")
            .tempfile_in(parent)
            .map_err(|e| save_error(path, Some(parent), &e))?;

        let temp_path = temp_file.path().to_path_buf();
        let in_temp = |e: std::io::Error| save_error(path, Some(&temp_path), &e);

        temp_file.write_all(content).map_err(in_temp)?;
        temp_file.as_file().sync_all().map_err(in_temp)?;
        temp_file
            .as_file()
            .set_permissions(permissions)
            .map_err(in_temp)?;

        // The temporary file is removed on drop if persisting fails.
        temp_file
            .persist(&target)
            .map_err(|e| save_error(path, Some(&temp_path), &e.error))?;

        Ok(())
    }

    /// Creates a timestamped backup of an existing file.
    fn backup_file(&self, path: &Path) -> std::result::Result<PathBuf, (PathBuf, std::io::Error)> {
        let timestamp = SystemTime::now()
            .duration_since(SystemTime::UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or_default();

        let filename = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();

        let backup_path = path.with_file_name(format!("{}.backup.{}", filename, timestamp));

        fs::copy(path, &backup_path).map_err(|e| (backup_path.clone(), e))?;

        debug!("Created backup: {}", backup_path.display());
        Ok(backup_path)
    }
}

/// Save error reported against the document, naming the inner path that
/// failed in the message.
fn save_error(path: &Path, inner: Option<&Path>, source: &std::io::Error) -> Error {
    match inner {
        Some(inner) => Error::FileAccess {
            path: path.to_path_buf(),
            operation: Operation::Save,
            message: format!("{}: {}", inner.display(), source),
        },
        None => Error::file_access(path, Operation::Save, source),
    }
}

/// Writes the run report as pretty JSON.
///
/// # Errors
///
/// Returns an error if the report file cannot be created or serialized.
pub(crate) fn write_report(path: &Path, report: &DispatchReport) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;
    }

    let file = fs::File::create(path).map_err(|e| Error::io(path, e))?;

    serde_json::to_writer_pretty(file, report).map_err(Error::from)?;

    info!("Wrote report to {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_fs::prelude::*;

    #[test]
    fn test_replace_overwrites_content() {
        let temp = assert_fs::TempDir::new().unwrap();
        let file = temp.child("a.html");
        file.write_str("old").unwrap();

        Writer::new(false).replace(file.path(), b"new").unwrap();

        file.assert("new");
        let leftovers = fs::read_dir(temp.path()).unwrap().count();
        assert_eq!(leftovers, 1);
    }

    #[test]
    fn test_replace_with_backup() {
        let temp = assert_fs::TempDir::new().unwrap();
        let file = temp.child("a.html");
        file.write_str("old").unwrap();

        Writer::new(true).replace(file.path(), b"new").unwrap();

        let backups: Vec<_> = fs::read_dir(temp.path())
            .unwrap()
            .filter_map(std::result::Result::ok)
            .filter(|e| e.file_name().to_string_lossy().starts_with("a.html.backup."))
            .collect();

        assert_eq!(backups.len(), 1);
        assert_eq!(fs::read_to_string(backups[0].path()).unwrap(), "old");
        file.assert("new");
    }

    #[test]
    fn test_replace_missing_file_fails() {
        let temp = assert_fs::TempDir::new().unwrap();
        let err = Writer::new(false)
            .replace(&temp.path().join("gone.html"), b"x")
            .unwrap_err();

        assert_eq!(err.kind(), "file_access");
        assert_eq!(err.operation(), Some(Operation::Save));
    }

    #[cfg(unix)]
    #[test]
    fn test_replace_keeps_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let temp = assert_fs::TempDir::new().unwrap();
        let file = temp.child("run.php");
        file.write_str("old").unwrap();
        fs::set_permissions(file.path(), fs::Permissions::from_mode(0o750)).unwrap();

        Writer::new(false).replace(file.path(), b"new").unwrap();

        let mode = fs::metadata(file.path()).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o750);
    }

    #[test]
    fn test_replace_long_file_name() {
        let temp = assert_fs::TempDir::new().unwrap();
        let name = format!("{}.html", "a".repeat(245));
        let file = temp.child(&name);
        file.write_str("old").unwrap();

        Writer::new(false).replace(file.path(), b"new").unwrap();

        file.assert("new");
        assert_eq!(fs::read_dir(temp.path()).unwrap().count(), 1);
    }

    #[test]
    fn test_backup_failure_reports_document_path() {
        let temp = assert_fs::TempDir::new().unwrap();
        // Copying a directory to its backup fails.
        let dir = temp.child("a.html");
        dir.create_dir_all().unwrap();

        let err = Writer::new(true).replace(dir.path(), b"new").unwrap_err();

        assert_eq!(err.path(), Some(dir.path()));
        assert_eq!(err.operation(), Some(Operation::Save));
        assert!(err.to_string().contains(".backup."));
    }

    #[cfg(unix)]
    #[test]
    fn test_replace_writes_through_symlink() {
        let temp = assert_fs::TempDir::new().unwrap();
        let target = temp.child("real/target.txt");
        target.write_str("old").unwrap();
        let link = temp.path().join("link.html");
        std::os::unix::fs::symlink(target.path(), &link).unwrap();

        Writer::new(false).replace(&link, b"new").unwrap();

        assert!(fs::symlink_metadata(&link).unwrap().file_type().is_symlink());
        target.assert("new");
    }
}
