use crate::{
    config::Config,
    editor::{Editor, SaveOutcome, TargetEncoding},
    error::{Error, Operation, Result},
    matcher::ExtensionSet,
    walker::{DirectoryVisit, DirectoryWalker, Entry},
};
use serde::Serialize;
use std::{
    collections::HashSet,
    fs,
    io::Write,
    path::{Path, PathBuf},
    time::{Duration, Instant},
};
use tracing::{debug, info, instrument, warn};

/// A file whose name ended with a configured extension.
#[derive(Debug, Clone, Serialize)]
pub struct FileMatch {
    /// Full path of the file
    pub path: PathBuf,

    /// Path relative to the root
    pub relative_path: String,

    /// Extension that matched
    pub extension: String,
}

/// A file or directory the run could not process.
#[derive(Debug, Clone, Serialize)]
pub struct FileFailure {
    /// Path that failed
    pub path: PathBuf,

    /// Error category (`file_access`, `collaborator`, ...)
    pub kind: &'static str,

    /// Step that failed
    pub operation: Option<Operation>,

    /// Error message
    pub message: String,
}

/// Outcome of a conversion run.
#[derive(Debug, Clone, Serialize)]
pub struct DispatchReport {
    /// Root directory of the walk
    pub root: PathBuf,

    /// Encoding requested for every match
    pub target_encoding: TargetEncoding,

    /// Whether the editor was bypassed
    pub dry_run: bool,

    /// Directories listed
    pub directories_visited: usize,

    /// Regular files seen
    pub files_seen: usize,

    /// Files whose name matched an extension
    pub files_matched: usize,

    /// Files rewritten by the editor
    pub files_converted: usize,

    /// Files the editor left as they were
    pub files_unchanged: usize,

    /// Matches skipped because a followed link led to a file already
    /// dispatched in this run
    pub files_duplicate: usize,

    /// Every match, in dispatch order
    pub matches: Vec<FileMatch>,

    /// Every failure, in the order encountered
    pub failures: Vec<FileFailure>,

    /// Run duration in seconds
    pub duration_secs: f64,

    /// Completion timestamp
    pub generated_at: String,
}

impl DispatchReport {
    fn new(config: &Config) -> Self {
        Self {
            root: config.root_dir.clone(),
            target_encoding: config.target_encoding,
            dry_run: config.dry_run,
            directories_visited: 0,
            files_seen: 0,
            files_matched: 0,
            files_converted: 0,
            files_unchanged: 0,
            files_duplicate: 0,
            matches: Vec::new(),
            failures: Vec::new(),
            duration_secs: 0.0,
            generated_at: String::new(),
        }
    }

    fn record_match(&mut self, entry: &Entry, extension: &str) {
        let relative_path = pathdiff::diff_paths(&entry.path, &self.root)
            .unwrap_or_else(|| entry.path.clone())
            .to_string_lossy()
            .to_string();

        self.files_matched += 1;
        self.matches.push(FileMatch {
            path: entry.path.clone(),
            relative_path,
            extension: extension.to_string(),
        });
    }

    fn record_failure(&mut self, path: &Path, error: &Error) {
        let path = path.to_path_buf();

        warn!(
            kind = error.kind(),
            "Skipping {}: {}",
            path.display(),
            error
        );

        self.failures.push(FileFailure {
            path,
            kind: error.kind(),
            operation: error.operation(),
            message: error.to_string(),
        });
    }

    fn finish(&mut self, duration: Duration) {
        self.duration_secs = duration.as_secs_f64();
        self.generated_at = chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string();
    }

    /// Returns true if any file or directory failed.
    #[must_use]
    pub fn has_failures(&self) -> bool {
        !self.failures.is_empty()
    }

    /// Prints a human-readable summary to stdout.
    pub fn print_summary(&self) {
        println!("\n╔═══════════════════════════════════════════════════════╗");
        println!("║               Conversion Run Summary                  ║");
        println!("╠═══════════════════════════════════════════════════════╣");
        println!(
            "║ Directories Visited:  {:>8}                        ║",
            self.directories_visited
        );
        println!(
            "║ Files Seen:           {:>8}                        ║",
            self.files_seen
        );
        println!(
            "║ Files Matched:        {:>8}                        ║",
            self.files_matched
        );
        if self.dry_run {
            println!("║ ⚠ Dry run: no file was opened or modified              ║");
        } else {
            println!(
                "║   - Converted:        {:>8}                        ║",
                self.files_converted
            );
            println!(
                "║   - Unchanged:        {:>8}                        ║",
                self.files_unchanged
            );
            if self.files_duplicate > 0 {
                println!(
                    "║   - Duplicate links:  {:>8}                        ║",
                    self.files_duplicate
                );
            }
        }
        println!(
            "║ Failures:             {:>8}                        ║",
            self.failures.len()
        );
        println!(
            "║ Duration:             {:>8.2}s                       ║",
            self.duration_secs
        );
        println!("╚═══════════════════════════════════════════════════════╝\n");

        for failure in &self.failures {
            println!("  ✗ {}", failure.message);
        }
    }
}

/// Walks the tree and drives the editor for every matching file.
pub struct Dispatcher<E> {
    config: Config,
    extensions: ExtensionSet,
    editor: E,
    dispatched: HashSet<PathBuf>,
}

impl<E: Editor> Dispatcher<E> {
    /// Creates a dispatcher around an editor.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration validation fails.
    pub fn new(config: Config, editor: E) -> Result<Self> {
        config.validate()?;
        let extensions = config.extension_set()?;

        Ok(Self {
            config,
            extensions,
            editor,
            dispatched: HashSet::new(),
        })
    }

    /// The editor in use.
    pub fn editor(&self) -> &E {
        &self.editor
    }

    /// Consumes the dispatcher, returning the editor.
    pub fn into_editor(self) -> E {
        self.editor
    }

    /// Walks the tree once, writing progress lines to `console`.
    ///
    /// Per-file failures are recorded in the report and never abort the
    /// walk.
    ///
    /// # Errors
    ///
    /// Returns an error only if the walker cannot be built or `console`
    /// cannot be written.
    #[instrument(skip(self, console), fields(root = %self.config.root_dir.display()))]
    pub fn run<W: Write + ?Sized>(&mut self, console: &mut W) -> Result<DispatchReport> {
        let start = Instant::now();
        let mut report = DispatchReport::new(&self.config);
        self.dispatched.clear();

        info!(
            "Converting files ending in {} to {}{}",
            self.extensions.as_slice().join(", "),
            self.config.target_encoding,
            if self.config.dry_run { " (dry run)" } else { "" }
        );

        for visit in DirectoryWalker::from_config(&self.config)? {
            match visit {
                Ok(visit) => self.process_directory(&visit, console, &mut report)?,
                Err(e) => {
                    let directory = e.path().unwrap_or(self.config.root_dir.as_path()).to_path_buf();
                    report.record_failure(&directory, &e);
                }
            }
        }

        writeln!(console).map_err(|e| Error::output(&e))?;
        writeln!(console, "DONE!").map_err(|e| Error::output(&e))?;
        console.flush().map_err(|e| Error::output(&e))?;

        report.finish(start.elapsed());

        info!(
            "✓ {} matched, {} converted, {} unchanged, {} failed in {:.2}s",
            report.files_matched,
            report.files_converted,
            report.files_unchanged,
            report.failures.len(),
            report.duration_secs
        );

        Ok(report)
    }

    fn process_directory<W: Write + ?Sized>(
        &mut self,
        visit: &DirectoryVisit,
        console: &mut W,
        report: &mut DispatchReport,
    ) -> Result<()> {
        writeln!(console, "Directory: {}", visit.directory.display())
            .map_err(|e| Error::output(&e))?;
        report.directories_visited += 1;

        for entry in visit.files() {
            report.files_seen += 1;

            let Some(extension) = self.extensions.first_match(&entry.name) else {
                continue;
            };

            writeln!(console, "    {}", entry.name.to_string_lossy())
                .map_err(|e| Error::output(&e))?;
            report.record_match(entry, extension);

            if self.config.dry_run {
                continue;
            }

            if self.config.follow_links && !self.mark_dispatched(&entry.path) {
                debug!("Already dispatched through another link: {}", entry.path.display());
                report.files_duplicate += 1;
                continue;
            }

            match self.dispatch(&entry.path) {
                Ok(SaveOutcome::Written) => report.files_converted += 1,
                Ok(SaveOutcome::Unchanged) => report.files_unchanged += 1,
                Err(e) => report.record_failure(&entry.path, &e),
            }
        }

        Ok(())
    }

    /// Records the file a path resolves to; false if it was dispatched
    /// before in this run.
    fn mark_dispatched(&mut self, path: &Path) -> bool {
        match fs::canonicalize(path) {
            Ok(canonical) => self.dispatched.insert(canonical),
            Err(_) => true,
        }
    }

    /// Issues open, convert, save and close for one file.
    ///
    /// Save is skipped when the conversion fails; close always follows a
    /// successful open.
    fn dispatch(&mut self, path: &Path) -> Result<SaveOutcome> {
        let target = self.config.target_encoding;
        let handle = self.editor.open(path)?;

        let result = self
            .editor
            .convert_encoding(&handle, target)
            .and_then(|()| self.editor.save(&handle));

        self.editor.close(handle);

        debug!("Dispatched {}: {:?}", path.display(), result.as_ref().ok());
        result
    }
}
