//! # utf8-sweep
//!
//! Walks a directory tree and converts every file whose name ends with one of
//! a configured set of extensions to UTF-8, one file at a time, through an
//! external converter.
//!
//! ## Quick Start
//!
//! ```no_run
//! use utf8_sweep::{Config, ConverterCommand};
//!
//! # fn main() -> anyhow::Result<()> {
//! let config = Config::builder()
//!     .root_dir("./site")
//!     .extensions([".htm", ".html", ".php", ".phtml"])
//!     .converter(ConverterCommand::new("iconv", ["-f", "WINDOWS-1252", "-t", "{encoding}"]))
//!     .build()?;
//!
//! let report = utf8_sweep::run(config, &mut std::io::stdout())?;
//! assert!(!report.has_failures());
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! 1. **Walker**: lists the root, then every subdirectory, depth first
//! 2. **Matcher**: tests file names against the extensions, first match wins
//! 3. **Dispatcher**: drives the [`Editor`] through open, convert, save, close
//! 4. **Editor**: [`CommandEditor`] pipes each document through the converter

#![warn(
    missing_docs,
    rust_2018_idioms,
    unreachable_pub,
    clippy::all,
    clippy::pedantic,
    clippy::nursery
)]
#![allow(clippy::module_name_repetitions)]

mod command;
mod config;
mod dispatcher;
mod editor;
mod error;
mod filter;
mod matcher;
mod walker;
mod writer;

pub use command::{CommandEditor, ConverterCommand};
pub use config::{Config, ConfigBuilder, ConfigFile};
pub use dispatcher::{DispatchReport, Dispatcher, FileFailure, FileMatch};
pub use editor::{DetachedEditor, DocumentHandle, Editor, SaveOutcome, TargetEncoding};
pub use error::{Error, Operation, Result};
pub use matcher::{DEFAULT_EXTENSIONS, ExtensionSet};
pub use walker::{DirectoryVisit, DirectoryWalker, Entry, EntryKind, WalkOptions};

use std::io::Write;

/// Runs a complete conversion with the editor the configuration describes.
///
/// Progress lines go to `console`. When `report_path` is set the report is
/// also written there as JSON.
///
/// # Errors
///
/// Returns an error if:
/// - Configuration is invalid
/// - No converter is configured outside dry-run mode
/// - `console` cannot be written
/// - The report file cannot be written
///
/// Failures of individual files are not errors; they are listed in the
/// returned report.
pub fn run<W: Write + ?Sized>(config: Config, console: &mut W) -> Result<DispatchReport> {
    let report_path = config.report_path.clone();

    let report = match config.require_converter()?.cloned() {
        Some(converter) => {
            let editor = CommandEditor::new(converter, config.backup_existing);
            Dispatcher::new(config, editor)?.run(console)?
        }
        None => Dispatcher::new(config, DetachedEditor)?.run(console)?,
    };

    if let Some(path) = report_path {
        writer::write_report(&path, &report)?;
    }

    Ok(report)
}
