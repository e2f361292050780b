use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using the library's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Step of the collaborator command sequence (or traversal) that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    /// Listing the entries of a directory
    List,
    /// Opening a document
    Open,
    /// Converting the open document
    Convert,
    /// Saving the converted document
    Save,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::List => "list",
            Self::Open => "open",
            Self::Convert => "convert",
            Self::Save => "save",
        };
        f.write_str(name)
    }
}

/// Error types for the utf8-sweep library.
#[derive(Error, Debug, Clone)]
#[non_exhaustive]
pub enum Error {
    /// Configuration validation error. Always fatal, raised before traversal.
    #[error("Invalid configuration: {message}")]
    Config {
        /// Detailed error message
        message: String,
    },

    /// A file or directory could not be read or written.
    #[error("Cannot {operation} '{path}': {message}")]
    FileAccess {
        /// Path where the error occurred
        path: PathBuf,
        /// Step that failed
        operation: Operation,
        /// Error message
        message: String,
    },

    /// The editing collaborator is unavailable or one of its steps failed.
    #[error("Editor failed to {operation} '{path}': {message}")]
    Collaborator {
        /// Document the collaborator was working on
        path: PathBuf,
        /// Step that failed
        operation: Operation,
        /// Error message
        message: String,
    },

    /// IO error with context about the file path.
    #[error("IO error accessing '{path}': {message}")]
    Io {
        /// Path where the error occurred
        path: PathBuf,
        /// Error message
        message: String,
    },

    /// Progress output could not be written.
    #[error("Failed to write progress output: {message}")]
    Output {
        /// Error message
        message: String,
    },

    /// JSON serialization error.
    #[error("Serialization error: {message}")]
    Serialization {
        /// Error message
        message: String,
    },
}

impl Error {
    /// Creates an IO error with path context.
    #[must_use]
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            message: source.to_string(),
        }
    }

    /// Creates a configuration error.
    #[must_use]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Creates a file access error for the given step.
    #[must_use]
    pub fn file_access(
        path: impl Into<PathBuf>,
        operation: Operation,
        source: &std::io::Error,
    ) -> Self {
        Self::FileAccess {
            path: path.into(),
            operation,
            message: source.to_string(),
        }
    }

    /// Creates a collaborator error for the given step.
    #[must_use]
    pub fn collaborator(
        path: impl Into<PathBuf>,
        operation: Operation,
        message: impl Into<String>,
    ) -> Self {
        Self::Collaborator {
            path: path.into(),
            operation,
            message: message.into(),
        }
    }

    /// Creates a progress output error.
    #[must_use]
    pub fn output(source: &std::io::Error) -> Self {
        Self::Output {
            message: source.to_string(),
        }
    }

    /// Stable label for the error category, used in logs and reports.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Config { .. } => "config",
            Self::FileAccess { .. } => "file_access",
            Self::Collaborator { .. } => "collaborator",
            Self::Io { .. } => "io",
            Self::Output { .. } => "output",
            Self::Serialization { .. } => "serialization",
        }
    }

    /// The step that failed, when the error belongs to a single file.
    #[must_use]
    pub const fn operation(&self) -> Option<Operation> {
        match self {
            Self::FileAccess { operation, .. } | Self::Collaborator { operation, .. } => {
                Some(*operation)
            }
            _ => None,
        }
    }

    /// Path the error refers to, if any.
    #[must_use]
    pub fn path(&self) -> Option<&std::path::Path> {
        match self {
            Self::FileAccess { path, .. }
            | Self::Collaborator { path, .. }
            | Self::Io { path, .. } => Some(path.as_path()),
            _ => None,
        }
    }

    /// Returns true if this is a configuration error.
    #[must_use]
    pub const fn is_config(&self) -> bool {
        matches!(self, Self::Config { .. })
    }

    /// Returns true if the error only affects a single file or directory
    /// and the walk can move on.
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        matches!(self, Self::FileAccess { .. } | Self::Collaborator { .. })
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization {
            message: e.to_string(),
        }
    }
}
