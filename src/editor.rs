//! The editing collaborator.
//!
//! The dispatcher drives an [`Editor`] through open, convert, save and close
//! for every matched file. Encoding detection and transcoding are the
//! editor's business; the dispatcher only sequences the calls.

use crate::error::{Error, Operation, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

const UTF8_BOM: [u8; 3] = [0xEF, 0xBB, 0xBF];

/// Encoding a document is converted to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TargetEncoding {
    /// UTF-8 without byte order mark
    #[default]
    #[serde(rename = "utf-8")]
    Utf8,
    /// UTF-8 with byte order mark
    #[serde(rename = "utf-8-bom")]
    Utf8Bom,
}

impl TargetEncoding {
    /// Charset name understood by converters such as iconv.
    #[must_use]
    pub const fn charset(self) -> &'static str {
        "UTF-8"
    }

    /// Human-readable name.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Utf8 => "UTF-8 without BOM",
            Self::Utf8Bom => "UTF-8 with BOM",
        }
    }

    /// Strips or prepends the byte order mark as the target requires.
    #[must_use]
    pub fn apply_bom(self, mut bytes: Vec<u8>) -> Vec<u8> {
        let has_bom = bytes.starts_with(&UTF8_BOM);
        match self {
            Self::Utf8 if has_bom => {
                bytes.drain(..UTF8_BOM.len());
                bytes
            }
            Self::Utf8Bom if !has_bom => {
                let mut with_bom = Vec::with_capacity(bytes.len() + UTF8_BOM.len());
                with_bom.extend_from_slice(&UTF8_BOM);
                with_bom.extend_from_slice(&bytes);
                with_bom
            }
            _ => bytes,
        }
    }
}

impl fmt::Display for TargetEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Handle to the document currently open in an editor.
#[derive(Debug, PartialEq, Eq)]
pub struct DocumentHandle {
    id: u64,
    path: PathBuf,
}

impl DocumentHandle {
    /// Creates a handle. Editors hand these out from [`Editor::open`].
    #[must_use]
    pub fn new(id: u64, path: impl Into<PathBuf>) -> Self {
        Self {
            id,
            path: path.into(),
        }
    }

    /// Editor-assigned identifier.
    #[must_use]
    pub const fn id(&self) -> u64 {
        self.id
    }

    /// Path of the open document.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// What a save did to the file on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveOutcome {
    /// New content was written
    Written,
    /// Content was already in the target encoding; nothing was written
    Unchanged,
}

/// A stateful, single-document text editor.
///
/// At most one document is open at a time. Calls for a document must come in
/// the order open, convert, save, close.
pub trait Editor {
    /// Opens the document at `path`.
    ///
    /// # Errors
    ///
    /// Fails if the file cannot be read or another document is still open.
    fn open(&mut self, path: &Path) -> Result<DocumentHandle>;

    /// Converts the open document to `target`.
    ///
    /// # Errors
    ///
    /// Fails if the conversion cannot be performed.
    fn convert_encoding(&mut self, handle: &DocumentHandle, target: TargetEncoding) -> Result<()>;

    /// Writes the open document back to disk.
    ///
    /// # Errors
    ///
    /// Fails if the file cannot be written.
    fn save(&mut self, handle: &DocumentHandle) -> Result<SaveOutcome>;

    /// Closes the document, discarding anything unsaved.
    fn close(&mut self, handle: DocumentHandle);
}

impl<E: Editor + ?Sized> Editor for &mut E {
    fn open(&mut self, path: &Path) -> Result<DocumentHandle> {
        (**self).open(path)
    }

    fn convert_encoding(&mut self, handle: &DocumentHandle, target: TargetEncoding) -> Result<()> {
        (**self).convert_encoding(handle, target)
    }

    fn save(&mut self, handle: &DocumentHandle) -> Result<SaveOutcome> {
        (**self).save(handle)
    }

    fn close(&mut self, handle: DocumentHandle) {
        (**self).close(handle);
    }
}

impl<E: Editor + ?Sized> Editor for Box<E> {
    fn open(&mut self, path: &Path) -> Result<DocumentHandle> {
        (**self).open(path)
    }

    fn convert_encoding(&mut self, handle: &DocumentHandle, target: TargetEncoding) -> Result<()> {
        (**self).convert_encoding(handle, target)
    }

    fn save(&mut self, handle: &DocumentHandle) -> Result<SaveOutcome> {
        (**self).save(handle)
    }

    fn close(&mut self, handle: DocumentHandle) {
        (**self).close(handle);
    }
}

/// Editor used when no converter is configured. Every call fails.
#[derive(Debug, Default, Clone, Copy)]
pub struct DetachedEditor;

impl Editor for DetachedEditor {
    fn open(&mut self, path: &Path) -> Result<DocumentHandle> {
        Err(Error::collaborator(
            path,
            Operation::Open,
            "no converter is configured",
        ))
    }

    fn convert_encoding(&mut self, handle: &DocumentHandle, _target: TargetEncoding) -> Result<()> {
        Err(Error::collaborator(
            handle.path(),
            Operation::Convert,
            "no converter is configured",
        ))
    }

    fn save(&mut self, handle: &DocumentHandle) -> Result<SaveOutcome> {
        Err(Error::collaborator(
            handle.path(),
            Operation::Save,
            "no converter is configured",
        ))
    }

    fn close(&mut self, _handle: DocumentHandle) {}
}
