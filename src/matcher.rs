//! Extension matching.
//!
//! Matching is a raw suffix test on the bytes of the file name. It is not an
//! extension parse: `page.htm.html` matches `.html`, and `.tpl.php` would be
//! matched by a `.php` entry as well as by a `.tpl.php` entry, whichever
//! comes first.

use crate::error::{Error, Result};
use std::ffi::OsStr;

/// Extensions converted when none are configured.
pub const DEFAULT_EXTENSIONS: &[&str] = &[".htm", ".html", ".php", ".phtml"];

/// Ordered, case-sensitive set of file name suffixes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtensionSet {
    extensions: Vec<String>,
}

impl ExtensionSet {
    /// Builds the set, keeping the first occurrence of duplicates.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the set is empty or any extension is
    /// an empty string.
    pub fn new<I, S>(extensions: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut unique: Vec<String> = Vec::new();

        for ext in extensions {
            let ext = ext.into();
            if ext.is_empty() {
                return Err(Error::config("extensions must not contain empty strings"));
            }
            if !ext.starts_with('.') {
                tracing::warn!(
                    "Extension '{}' does not start with '.', it will match any name ending in it",
                    ext
                );
            }
            if !unique.contains(&ext) {
                unique.push(ext);
            }
        }

        if unique.is_empty() {
            return Err(Error::config("at least one extension is required"));
        }

        Ok(Self { extensions: unique })
    }

    /// Returns the first extension the file name ends with.
    #[must_use]
    pub fn first_match(&self, file_name: &OsStr) -> Option<&str> {
        let name = file_name.as_encoded_bytes();
        self.extensions
            .iter()
            .find(|ext| name.ends_with(ext.as_bytes()))
            .map(String::as_str)
    }

    /// Returns true if the file name ends with any extension in the set.
    #[must_use]
    pub fn is_match(&self, file_name: &OsStr) -> bool {
        self.first_match(file_name).is_some()
    }

    /// Extensions in match order.
    #[must_use]
    pub fn as_slice(&self) -> &[String] {
        &self.extensions
    }

    /// Number of distinct extensions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.extensions.len()
    }

    /// Returns true if the set holds no extensions.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.extensions.is_empty()
    }
}

impl Default for ExtensionSet {
    fn default() -> Self {
        Self {
            extensions: DEFAULT_EXTENSIONS.iter().map(|s| (*s).to_string()).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(exts: &[&str]) -> ExtensionSet {
        ExtensionSet::new(exts.iter().copied()).unwrap()
    }

    #[test]
    fn test_default_extensions() {
        let exts = ExtensionSet::default();
        assert_eq!(exts.as_slice(), &[".htm", ".html", ".php", ".phtml"]);
        assert!(exts.is_match(OsStr::new("index.phtml")));
    }

    #[test]
    fn test_suffix_match() {
        let exts = set(&[".html", ".php"]);
        assert_eq!(exts.first_match(OsStr::new("a.html")), Some(".html"));
        assert_eq!(exts.first_match(OsStr::new("c.php")), Some(".php"));
        assert_eq!(exts.first_match(OsStr::new("b.txt")), None);
    }

    #[test]
    fn test_case_sensitive() {
        let exts = set(&[".html"]);
        assert!(!exts.is_match(OsStr::new("INDEX.HTML")));
        assert!(!exts.is_match(OsStr::new("index.Html")));
    }

    #[test]
    fn test_no_dot_boundary_normalization() {
        let exts = set(&[".html"]);
        // Trailing characters only: no leading dot means no match.
        assert!(!exts.is_match(OsStr::new("xhtml")));
        // A name equal to the extension is itself a match.
        assert!(exts.is_match(OsStr::new(".html")));

        let loose = set(&["html"]);
        assert!(loose.is_match(OsStr::new("xhtml")));
    }

    #[test]
    fn test_first_match_wins() {
        let exts = set(&[".htm.html", ".html"]);
        assert_eq!(exts.first_match(OsStr::new("x.htm.html")), Some(".htm.html"));

        let exts = set(&[".html", ".htm.html"]);
        assert_eq!(exts.first_match(OsStr::new("x.htm.html")), Some(".html"));
    }

    #[test]
    fn test_compound_name_matches_trailing_extension_only() {
        let exts = set(&[".htm", ".html"]);
        assert_eq!(exts.first_match(OsStr::new("x.htm.html")), Some(".html"));
        assert_eq!(exts.first_match(OsStr::new("x.html.bak")), None);
    }

    #[test]
    fn test_duplicates_removed_in_order() {
        let exts = set(&[".php", ".html", ".php"]);
        assert_eq!(exts.as_slice(), &[".php", ".html"]);
        assert_eq!(exts.len(), 2);
    }

    #[test]
    fn test_empty_set_rejected() {
        let result = ExtensionSet::new(Vec::<String>::new());
        assert!(result.unwrap_err().is_config());
    }

    #[test]
    fn test_empty_extension_rejected() {
        let result = ExtensionSet::new([".html", ""]);
        assert!(result.is_err());
    }

    #[cfg(unix)]
    #[test]
    fn test_non_utf8_name() {
        use std::os::unix::ffi::OsStrExt;

        let exts = set(&[".php"]);
        let name = OsStr::from_bytes(b"caf\xe9.php");
        assert_eq!(exts.first_match(name), Some(".php"));
    }
}
