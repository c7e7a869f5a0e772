//! Script errors

use std::fmt;

/// The kind of script error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Wrong argument count or malformed arguments
    UsageError,
    /// External program could not be resolved or started
    LookupError,
    /// Command ran and reported failure (nonzero exit, non-2xx status, ...)
    CommandFailed,
    /// Command succeeded but was expected to fail (! prefix)
    UnexpectedSuccess,
    /// Pattern or value assertion did not hold
    AssertionMismatch,
    /// Unknown or failing condition tag
    ConditionError,
    /// No handler for the command and explicit exec is required
    UnknownCommand,
    /// Background job name already in use
    DuplicateName,
    /// Invalid script syntax
    SyntaxError,
    /// IO error outside of a command outcome
    Io,
    /// Skip the test
    Skip,
    /// Stop the script (not an error)
    Stop,
}

/// A script error with file/line context
#[derive(Debug)]
pub struct ScriptError {
    pub kind: ErrorKind,
    pub message: String,
    pub file: Option<String>,
    pub line: Option<usize>,
    pub command: Option<String>,
    pub args: Vec<String>,
}

impl ScriptError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            file: None,
            line: None,
            command: None,
            args: Vec::new(),
        }
    }

    pub fn with_location(mut self, file: impl Into<String>, line: usize) -> Self {
        self.file = Some(file.into());
        self.line = Some(line);
        self
    }

    pub fn with_command(mut self, cmd: impl Into<String>) -> Self {
        self.command = Some(cmd.into());
        self
    }

    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.args = args;
        self
    }

    pub fn syntax(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::SyntaxError, msg)
    }

    pub fn usage(cmd: &str, expected: &str) -> Self {
        Self::new(ErrorKind::UsageError, format!("usage: {} {}", cmd, expected).trim_end().to_string())
    }

    pub fn lookup(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::LookupError, msg)
    }

    pub fn failed(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::CommandFailed, msg)
    }

    pub fn mismatch(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::AssertionMismatch, msg)
    }

    pub fn skip(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::Skip, msg)
    }

    pub fn stop(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::Stop, msg)
    }

    pub fn is_skip(&self) -> bool {
        self.kind == ErrorKind::Skip
    }

    pub fn is_stop(&self) -> bool {
        self.kind == ErrorKind::Stop
    }

    /// Whether this error is a pass/fail outcome of a command that ran.
    ///
    /// `repeat` counts these per iteration; anything else aborts it.
    pub fn is_outcome(&self) -> bool {
        matches!(self.kind, ErrorKind::CommandFailed | ErrorKind::UnexpectedSuccess)
    }
}

impl fmt::Display for ScriptError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(ref file) = self.file {
            write!(f, "{}:", file)?;
        }
        if let Some(line) = self.line {
            write!(f, "{}:", line)?;
        }
        if let Some(ref cmd) = self.command {
            if self.args.is_empty() {
                write!(f, " {}: ", cmd)?;
            } else {
                let quoted = self.args.iter().map(|a| {
                    if a.contains(' ') || a.contains('\t') || a.is_empty() {
                        format!("\"{}\"", a)
                    } else {
                        a.clone()
                    }
                }).collect::<Vec<_>>().join(" ");
                write!(f, " {} {}: ", cmd, quoted)?;
            }
        } else if self.file.is_some() || self.line.is_some() {
            write!(f, " ")?;
        }
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for ScriptError {}

impl From<std::io::Error> for ScriptError {
    fn from(e: std::io::Error) -> Self {
        Self::new(ErrorKind::Io, e.to_string())
    }
}
