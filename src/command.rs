use crate::{
    editor::{DocumentHandle, Editor, SaveOutcome, TargetEncoding},
    error::{Error, Operation, Result},
    writer::Writer,
};
use std::{
    fs,
    io::{ErrorKind, Write},
    path::{Path, PathBuf},
    process::{Command, Stdio},
    thread,
};
use tracing::{debug, trace, warn};

/// Maximum converter stderr kept in an error message.
const MAX_STDERR_CHARS: usize = 512;

/// External program that converts stdin to stdout.
///
/// Arguments may contain `{encoding}` (replaced by the target charset, e.g.
/// `UTF-8`) and `{path}` (replaced by the document path).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConverterCommand {
    /// Program to execute, resolved through `PATH`
    pub program: String,

    /// Arguments, with placeholders
    pub args: Vec<String>,
}

impl ConverterCommand {
    /// Creates a converter command.
    #[must_use]
    pub fn new<I, S>(program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    /// Splits a `program arg...` vector; `None` when empty.
    #[must_use]
    pub fn from_argv(argv: Vec<String>) -> Option<Self> {
        let mut parts = argv.into_iter();
        let program = parts.next()?;
        Some(Self {
            program,
            args: parts.collect(),
        })
    }

    /// Parses a whitespace-separated command line. No shell quoting is
    /// interpreted.
    #[must_use]
    pub fn parse(command_line: &str) -> Option<Self> {
        Self::from_argv(command_line.split_whitespace().map(str::to_string).collect())
    }

    fn expand_args(&self, path: &Path, target: TargetEncoding) -> Vec<String> {
        let path = path.display().to_string();
        self.args
            .iter()
            .map(|arg| {
                arg.replace("{encoding}", target.charset())
                    .replace("{path}", &path)
            })
            .collect()
    }

    /// Runs the converter with `input` on stdin and returns its stdout.
    fn run(&self, path: &Path, target: TargetEncoding, input: &[u8]) -> Result<Vec<u8>> {
        let convert_err = |message: String| Error::collaborator(path, Operation::Convert, message);
        let args = self.expand_args(path, target);

        trace!("Running converter: {} {}", self.program, args.join(" "));

        let mut child = Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| convert_err(format!("cannot start '{}': {}", self.program, e)))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| convert_err("converter stdin is unavailable".to_string()))?;

        // Feed stdin from a helper thread so a full stdout pipe cannot stall us.
        let (fed, output) = thread::scope(|scope| {
            let feeder = scope.spawn(move || {
                let mut stdin = stdin;
                stdin.write_all(input)
            });
            let output = child.wait_with_output();
            (feeder.join(), output)
        });

        let output =
            output.map_err(|e| convert_err(format!("converter did not finish: {}", e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let stderr: String = stderr.trim().chars().take(MAX_STDERR_CHARS).collect();
            return Err(convert_err(format!(
                "'{}' exited with {}{}",
                self.program,
                output.status,
                if stderr.is_empty() {
                    String::new()
                } else {
                    format!(": {}", stderr)
                }
            )));
        }

        match fed {
            Ok(Ok(())) => {}
            // The converter may legitimately stop reading early.
            Ok(Err(e)) if e.kind() == ErrorKind::BrokenPipe => {}
            Ok(Err(e)) => return Err(convert_err(format!("cannot feed converter: {}", e))),
            Err(_) => return Err(convert_err("stdin feeder panicked".to_string())),
        }

        if std::str::from_utf8(&output.stdout).is_err() {
            return Err(convert_err(format!(
                "'{}' did not produce valid UTF-8",
                self.program
            )));
        }

        Ok(output.stdout)
    }
}

struct OpenDocument {
    id: u64,
    path: PathBuf,
    original: Vec<u8>,
    contents: Vec<u8>,
}

/// Editor that delegates conversion to an external program.
///
/// Documents are held in memory between open and save. Saving content that
/// equals what was read leaves the file untouched.
pub struct CommandEditor {
    converter: ConverterCommand,
    writer: Writer,
    next_id: u64,
    document: Option<OpenDocument>,
}

impl CommandEditor {
    /// Creates an editor around `converter`.
    #[must_use]
    pub fn new(converter: ConverterCommand, backup_existing: bool) -> Self {
        Self {
            converter,
            writer: Writer::new(backup_existing),
            next_id: 0,
            document: None,
        }
    }

    /// Path of the currently open document, if any.
    #[must_use]
    pub fn open_path(&self) -> Option<&Path> {
        self.document.as_ref().map(|d| d.path.as_path())
    }

    fn document_mut(
        &mut self,
        handle: &DocumentHandle,
        operation: Operation,
    ) -> Result<&mut OpenDocument> {
        self.document
            .as_mut()
            .filter(|d| d.id == handle.id())
            .ok_or_else(|| {
                Error::collaborator(handle.path(), operation, "document is not open")
            })
    }
}

impl Editor for CommandEditor {
    fn open(&mut self, path: &Path) -> Result<DocumentHandle> {
        if let Some(open) = &self.document {
            return Err(Error::collaborator(
                path,
                Operation::Open,
                format!("'{}' is still open", open.path.display()),
            ));
        }

        let bytes = fs::read(path).map_err(|e| Error::file_access(path, Operation::Open, &e))?;

        self.next_id += 1;
        debug!("Opened {} ({} bytes)", path.display(), bytes.len());

        self.document = Some(OpenDocument {
            id: self.next_id,
            path: path.to_path_buf(),
            contents: bytes.clone(),
            original: bytes,
        });

        Ok(DocumentHandle::new(self.next_id, path))
    }

    fn convert_encoding(&mut self, handle: &DocumentHandle, target: TargetEncoding) -> Result<()> {
        let input = std::mem::take(&mut self.document_mut(handle, Operation::Convert)?.contents);

        let converted = match self.converter.run(handle.path(), target, &input) {
            Ok(converted) => converted,
            Err(e) => {
                self.document_mut(handle, Operation::Convert)?.contents = input;
                return Err(e);
            }
        };

        let document = self.document_mut(handle, Operation::Convert)?;
        document.contents = target.apply_bom(converted);

        debug!("Converted {} to {}", handle.path().display(), target);
        Ok(())
    }

    fn save(&mut self, handle: &DocumentHandle) -> Result<SaveOutcome> {
        let writer = self.writer;
        let document = self.document_mut(handle, Operation::Save)?;

        if document.contents == document.original {
            debug!("Unchanged {}", document.path.display());
            return Ok(SaveOutcome::Unchanged);
        }

        writer.replace(&document.path, &document.contents)?;
        document.original.clone_from(&document.contents);

        debug!("Saved {}", document.path.display());
        Ok(SaveOutcome::Written)
    }

    fn close(&mut self, handle: DocumentHandle) {
        if self.document.as_ref().is_some_and(|d| d.id == handle.id()) {
            self.document = None;
            trace!("Closed {}", handle.path().display());
        } else {
            warn!("Close for a document that is not open: {}", handle.path().display());
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use assert_fs::prelude::*;

    fn cat() -> CommandEditor {
        CommandEditor::new(ConverterCommand::new("cat", Vec::<String>::new()), false)
    }

    fn convert(editor: &mut CommandEditor, path: &Path, target: TargetEncoding) -> Result<SaveOutcome> {
        let handle = editor.open(path)?;
        let result = editor
            .convert_encoding(&handle, target)
            .and_then(|()| editor.save(&handle));
        editor.close(handle);
        result
    }

    #[test]
    fn test_parse_command_line() {
        let cmd = ConverterCommand::parse("iconv -f WINDOWS-1252 -t {encoding}").unwrap();
        assert_eq!(cmd.program, "iconv");
        assert_eq!(cmd.args, vec!["-f", "WINDOWS-1252", "-t", "{encoding}"]);
        assert!(ConverterCommand::parse("   ").is_none());
    }

    #[test]
    fn test_expand_args() {
        let cmd = ConverterCommand::new("conv", ["--to={encoding}", "{path}"]);
        let args = cmd.expand_args(Path::new("/site/a.html"), TargetEncoding::Utf8);
        assert_eq!(args, vec!["--to=UTF-8", "/site/a.html"]);
    }

    #[test]
    fn test_identity_conversion_is_unchanged() {
        let temp = assert_fs::TempDir::new().unwrap();
        let file = temp.child("a.html");
        file.write_str("<p>héllo</p>").unwrap();

        let outcome = convert(&mut cat(), file.path(), TargetEncoding::Utf8).unwrap();

        assert_eq!(outcome, SaveOutcome::Unchanged);
        file.assert("<p>héllo</p>");
    }

    #[test]
    fn test_bom_is_stripped() {
        let temp = assert_fs::TempDir::new().unwrap();
        let file = temp.child("a.php");
        file.write_binary(b"\xEF\xBB\xBF<?php echo 1;").unwrap();

        let mut editor = cat();
        let outcome = convert(&mut editor, file.path(), TargetEncoding::Utf8).unwrap();
        assert_eq!(outcome, SaveOutcome::Written);
        assert_eq!(fs::read(file.path()).unwrap(), b"<?php echo 1;");

        let outcome = convert(&mut editor, file.path(), TargetEncoding::Utf8).unwrap();
        assert_eq!(outcome, SaveOutcome::Unchanged);
    }

    #[test]
    fn test_bom_is_added() {
        let temp = assert_fs::TempDir::new().unwrap();
        let file = temp.child("a.htm");
        file.write_str("x").unwrap();

        convert(&mut cat(), file.path(), TargetEncoding::Utf8Bom).unwrap();

        assert_eq!(fs::read(file.path()).unwrap(), b"\xEF\xBB\xBFx");
    }

    #[test]
    fn test_converter_output_replaces_file() {
        let temp = assert_fs::TempDir::new().unwrap();
        let file = temp.child("a.html");
        file.write_str("abc").unwrap();

        let mut editor =
            CommandEditor::new(ConverterCommand::new("tr", ["a-z", "A-Z"]), false);
        convert(&mut editor, file.path(), TargetEncoding::Utf8).unwrap();

        file.assert("ABC");
    }

    #[test]
    fn test_failing_converter() {
        let temp = assert_fs::TempDir::new().unwrap();
        let file = temp.child("a.html");
        file.write_str("abc").unwrap();

        let mut editor = CommandEditor::new(ConverterCommand::new("false", Vec::<String>::new()), false);
        let err = convert(&mut editor, file.path(), TargetEncoding::Utf8).unwrap_err();

        assert_eq!(err.kind(), "collaborator");
        assert_eq!(err.operation(), Some(Operation::Convert));
        assert!(editor.open_path().is_none());
        file.assert("abc");
    }

    #[test]
    fn test_missing_converter_program() {
        let temp = assert_fs::TempDir::new().unwrap();
        let file = temp.child("a.html");
        file.write_str("abc").unwrap();

        let mut editor = CommandEditor::new(
            ConverterCommand::new("utf8-sweep-no-such-program", Vec::<String>::new()),
            false,
        );
        let err = convert(&mut editor, file.path(), TargetEncoding::Utf8).unwrap_err();

        assert!(err.to_string().contains("cannot start"));
    }

    #[test]
    fn test_invalid_utf8_output_rejected() {
        let temp = assert_fs::TempDir::new().unwrap();
        let file = temp.child("latin1.html");
        file.write_binary(b"caf\xe9").unwrap();

        let err = convert(&mut cat(), file.path(), TargetEncoding::Utf8).unwrap_err();

        assert!(err.to_string().contains("valid UTF-8"));
        assert_eq!(fs::read(file.path()).unwrap(), b"caf\xe9");
    }

    #[test]
    fn test_open_missing_file() {
        let temp = assert_fs::TempDir::new().unwrap();
        let err = cat().open(&temp.path().join("gone.html")).unwrap_err();

        assert_eq!(err.kind(), "file_access");
        assert_eq!(err.operation(), Some(Operation::Open));
    }

    #[test]
    fn test_single_document_at_a_time() {
        let temp = assert_fs::TempDir::new().unwrap();
        temp.child("a.html").write_str("a").unwrap();
        temp.child("b.html").write_str("b").unwrap();

        let mut editor = cat();
        let first = editor.open(&temp.path().join("a.html")).unwrap();
        let err = editor.open(&temp.path().join("b.html")).unwrap_err();
        assert!(err.to_string().contains("still open"));

        editor.close(first);
        assert!(editor.open(&temp.path().join("b.html")).is_ok());
    }

    #[test]
    fn test_stale_handle_rejected() {
        let temp = assert_fs::TempDir::new().unwrap();
        temp.child("a.html").write_str("a").unwrap();

        let mut editor = cat();
        let handle = editor.open(&temp.path().join("a.html")).unwrap();
        let stale = DocumentHandle::new(handle.id() + 1, handle.path());

        assert!(editor.save(&stale).is_err());
        assert!(editor.save(&handle).is_ok());
    }

    #[test]
    fn test_large_document_does_not_deadlock() {
        let temp = assert_fs::TempDir::new().unwrap();
        let file = temp.child("big.html");
        let content = "<p>0123456789</p>\n".repeat(64 * 1024);
        file.write_str(&content).unwrap();

        let outcome = convert(&mut cat(), file.path(), TargetEncoding::Utf8).unwrap();

        assert_eq!(outcome, SaveOutcome::Unchanged);
    }
}
