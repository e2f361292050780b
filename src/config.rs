use crate::command::ConverterCommand;
use crate::editor::TargetEncoding;
use crate::error::{Error, Result};
use crate::matcher::{DEFAULT_EXTENSIONS, ExtensionSet};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

/// Configuration for a conversion run.
///
/// Use [`Config::builder()`] to construct a new configuration.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct Config {
    /// Root directory to scan
    pub root_dir: PathBuf,

    /// Ordered file name suffixes to convert
    pub extensions: Vec<String>,

    /// Encoding requested from the editor
    pub target_encoding: TargetEncoding,

    /// Report matches without invoking the editor
    pub dry_run: bool,

    /// Sort directory entries by name
    pub sort_entries: bool,

    /// Follow symbolic links while walking
    pub follow_links: bool,

    /// Glob patterns of directories to skip
    pub exclude_directories: Vec<String>,

    /// External program performing the conversion
    pub converter: Option<ConverterCommand>,

    /// Keep a timestamped copy of every file before it is replaced
    pub backup_existing: bool,

    /// Where to write the JSON run report
    pub report_path: Option<PathBuf>,
}

impl Config {
    /// Creates a new configuration builder.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use utf8_sweep::Config;
    ///
    /// let config = Config::builder()
    ///     .root_dir("./site")
    ///     .extensions([".html", ".php"])
    ///     .dry_run(true)
    ///     .build()
    ///     .expect("valid configuration");
    /// ```
    #[must_use]
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Root directory doesn't exist or is not a directory
    /// - The extension set is empty or holds an empty extension
    /// - An exclusion pattern is not a valid glob
    /// - The converter program is empty
    pub fn validate(&self) -> Result<()> {
        if !self.root_dir.exists() {
            return Err(Error::config(format!(
                "Root directory does not exist: {}",
                self.root_dir.display()
            )));
        }

        if !self.root_dir.is_dir() {
            return Err(Error::config(format!(
                "Root path is not a directory: {}",
                self.root_dir.display()
            )));
        }

        if let Err(e) = fs::read_dir(&self.root_dir) {
            return Err(Error::config(format!(
                "Root directory is not readable: {}: {}",
                self.root_dir.display(),
                e
            )));
        }

        self.extension_set()?;
        crate::filter::DirectoryFilter::new(&self.exclude_directories)?;

        if self
            .converter
            .as_ref()
            .is_some_and(|c| c.program.trim().is_empty())
        {
            return Err(Error::config("converter program must not be empty"));
        }

        Ok(())
    }

    /// Returns the converter, which every run except a dry run needs.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if no converter is set and dry run is off.
    pub fn require_converter(&self) -> Result<Option<&ConverterCommand>> {
        match &self.converter {
            None if !self.dry_run => Err(Error::config(
                "No converter configured. Pass --converter \"<program> <args>\" \
                or enable dry run",
            )),
            converter => Ok(converter.as_ref()),
        }
    }

    /// Builds the matcher for the configured extensions.
    ///
    /// # Errors
    ///
    /// Returns an error if the extension list is empty or holds an empty string.
    pub fn extension_set(&self) -> Result<ExtensionSet> {
        ExtensionSet::new(self.extensions.iter().cloned())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            root_dir: PathBuf::from("."),
            extensions: default_extensions(),
            target_encoding: TargetEncoding::default(),
            dry_run: false,
            sort_entries: true,
            follow_links: false,
            exclude_directories: Vec::new(),
            converter: None,
            backup_existing: false,
            report_path: None,
        }
    }
}

fn default_extensions() -> Vec<String> {
    DEFAULT_EXTENSIONS.iter().map(|s| (*s).to_string()).collect()
}

/// Builder for creating a [`Config`].
#[derive(Debug, Default)]
pub struct ConfigBuilder {
    root_dir: Option<PathBuf>,
    extensions: Option<Vec<String>>,
    target_encoding: Option<TargetEncoding>,
    dry_run: Option<bool>,
    sort_entries: Option<bool>,
    follow_links: Option<bool>,
    exclude_directories: Option<Vec<String>>,
    converter: Option<ConverterCommand>,
    backup_existing: Option<bool>,
    report_path: Option<PathBuf>,
}

impl ConfigBuilder {
    /// Starts from the values of a configuration file.
    #[must_use]
    pub fn from_file(file: ConfigFile) -> Self {
        Self {
            root_dir: file.root,
            extensions: file.extensions,
            target_encoding: file.target_encoding,
            dry_run: file.dry_run,
            sort_entries: file.sort,
            follow_links: file.follow_links,
            exclude_directories: file.exclude_dirs,
            converter: file.converter.and_then(ConverterCommand::from_argv),
            backup_existing: file.backup,
            report_path: file.report,
        }
    }

    /// Sets the root directory to scan.
    #[must_use]
    pub fn root_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.root_dir = Some(path.into());
        self
    }

    /// Sets the ordered extension list.
    #[must_use]
    pub fn extensions<I, S>(mut self, extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.extensions = Some(extensions.into_iter().map(Into::into).collect());
        self
    }

    /// Sets the target encoding.
    #[must_use]
    pub fn target_encoding(mut self, target: TargetEncoding) -> Self {
        self.target_encoding = Some(target);
        self
    }

    /// Enables dry run mode (no editor calls).
    #[must_use]
    pub fn dry_run(mut self, enabled: bool) -> Self {
        self.dry_run = Some(enabled);
        self
    }

    /// Enables or disables sorting of directory entries.
    #[must_use]
    pub fn sort_entries(mut self, enabled: bool) -> Self {
        self.sort_entries = Some(enabled);
        self
    }

    /// Enables or disables following symbolic links.
    #[must_use]
    pub fn follow_links(mut self, enabled: bool) -> Self {
        self.follow_links = Some(enabled);
        self
    }

    /// Sets glob patterns of directories to skip.
    #[must_use]
    pub fn exclude_directories(mut self, patterns: Vec<String>) -> Self {
        self.exclude_directories = Some(patterns);
        self
    }

    /// Sets the external converter.
    #[must_use]
    pub fn converter(mut self, converter: ConverterCommand) -> Self {
        self.converter = Some(converter);
        self
    }

    /// Enables or disables backups of replaced files.
    #[must_use]
    pub fn backup_existing(mut self, enabled: bool) -> Self {
        self.backup_existing = Some(enabled);
        self
    }

    /// Sets the JSON report destination.
    #[must_use]
    pub fn report_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.report_path = Some(path.into());
        self
    }

    /// Builds the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if validation fails.
    pub fn build(self) -> Result<Config> {
        let config = Config {
            root_dir: self.root_dir.unwrap_or_else(|| PathBuf::from(".")),
            extensions: self.extensions.unwrap_or_else(default_extensions),
            target_encoding: self.target_encoding.unwrap_or_default(),
            dry_run: self.dry_run.unwrap_or(false),
            sort_entries: self.sort_entries.unwrap_or(true),
            follow_links: self.follow_links.unwrap_or(false),
            exclude_directories: self.exclude_directories.unwrap_or_default(),
            converter: self.converter,
            backup_existing: self.backup_existing.unwrap_or(false),
            report_path: self.report_path,
        };

        config.validate()?;
        Ok(config)
    }
}

/// On-disk JSON configuration. Every key is optional.
///
/// ```json
/// {
///   "root": "/srv/site",
///   "extensions": [".htm", ".html", ".php", ".phtml"],
///   "converter": ["iconv", "-f", "WINDOWS-1252", "-t", "{encoding}"],
///   "exclude_dirs": ["**/.git"]
/// }
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConfigFile {
    /// Root directory to scan
    #[serde(alias = "root_path")]
    pub root: Option<PathBuf>,

    /// Ordered suffixes to match
    pub extensions: Option<Vec<String>>,

    /// `"utf-8"` or `"utf-8-bom"`
    pub target_encoding: Option<TargetEncoding>,

    /// Dry run mode
    pub dry_run: Option<bool>,

    /// Sort directory entries
    pub sort: Option<bool>,

    /// Follow symbolic links
    pub follow_links: Option<bool>,

    /// Directory exclusion globs
    pub exclude_dirs: Option<Vec<String>>,

    /// Converter program followed by its arguments
    pub converter: Option<Vec<String>>,

    /// Backup replaced files
    pub backup: Option<bool>,

    /// JSON report destination
    pub report: Option<PathBuf>,
}

impl ConfigFile {
    /// Reads and parses a JSON configuration file.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            Error::config(format!(
                "Cannot read configuration file {}: {}",
                path.display(),
                e
            ))
        })?;

        let mut file: Self = serde_json::from_str(&content).map_err(|e| {
            Error::config(format!(
                "Malformed configuration file {}: {}",
                path.display(),
                e
            ))
        })?;

        // Relative paths in the file are relative to the file itself.
        if let Some(base) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            file.root = file.root.map(|root| base.join(root));
            file.report = file.report.map(|report| base.join(report));
        }

        Ok(file)
    }
}
