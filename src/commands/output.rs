//! stdout / stderr / grep — output pattern matching commands

use crate::engine::{outcome, Cmd, CmdResult, CmdUsage, Engine};
use crate::error::{ErrorKind, ScriptError};
use crate::state::State;

// ──────────────────────────────────────────────────────────
// stdout — match stdout against pattern
// ──────────────────────────────────────────────────────────

pub(super) struct StdoutCmd;

impl Cmd for StdoutCmd {
    fn run(
        &self,
        _engine: &Engine,
        state: &mut State,
        neg: bool,
        args: &[String],
    ) -> Result<CmdResult, ScriptError> {
        let opts = MatchArgs::parse("stdout", args, 1)?;
        let content = state.stdout.clone();
        match_content(state, neg, "stdout", &opts, &content)
    }

    fn usage(&self) -> CmdUsage {
        CmdUsage {
            summary: "Check that the last stdout contains a pattern".into(),
            args: MATCH_USAGE.into(),
        }
    }
}

// ──────────────────────────────────────────────────────────
// stderr — match stderr against pattern
// ──────────────────────────────────────────────────────────

pub(super) struct StderrCmd;

impl Cmd for StderrCmd {
    fn run(
        &self,
        _engine: &Engine,
        state: &mut State,
        neg: bool,
        args: &[String],
    ) -> Result<CmdResult, ScriptError> {
        let opts = MatchArgs::parse("stderr", args, 1)?;
        let content = state.stderr.clone();
        match_content(state, neg, "stderr", &opts, &content)
    }

    fn usage(&self) -> CmdUsage {
        CmdUsage {
            summary: "Check that the last stderr contains a pattern".into(),
            args: MATCH_USAGE.into(),
        }
    }
}

// ──────────────────────────────────────────────────────────
// grep — search a file
// ──────────────────────────────────────────────────────────

pub(super) struct GrepCmd;

impl Cmd for GrepCmd {
    fn run(
        &self,
        _engine: &Engine,
        state: &mut State,
        neg: bool,
        args: &[String],
    ) -> Result<CmdResult, ScriptError> {
        let opts = MatchArgs::parse("grep", args, 2)?;
        let file = &opts.positional[1];
        // grep always reads from disk, never the virtual stdout/stderr
        let content = std::fs::read_to_string(state.resolve_path(file)).map_err(|e| {
            ScriptError::new(ErrorKind::Io, format!("{}: {}", file, e))
        })?;
        match_content(state, neg, file, &opts, &content)
    }

    fn usage(&self) -> CmdUsage {
        CmdUsage {
            summary: "Check that a file contains a pattern".into(),
            args: GREP_USAGE.into(),
        }
    }
}

const MATCH_USAGE: &str = "[-count=N] [-q] [-re] pattern";
const GREP_USAGE: &str = "[-count=N] [-q] [-re] pattern file";

// ──────────────────────────────────────────────────────────
// Shared helpers
// ──────────────────────────────────────────────────────────

/// A plain substring, or a multi-line regular expression with `-re`
enum Matcher {
    Literal(String),
    Regex(regex::Regex),
}

impl Matcher {
    /// Byte range of the first match.
    fn find(&self, content: &str) -> Option<(usize, usize)> {
        match self {
            Matcher::Literal(lit) => content.find(lit.as_str()).map(|start| (start, start + lit.len())),
            Matcher::Regex(re) => re.find(content).map(|m| (m.start(), m.end())),
        }
    }

    /// Number of non-overlapping matches.
    fn count(&self, content: &str) -> usize {
        match self {
            Matcher::Literal(lit) => content.matches(lit.as_str()).count(),
            Matcher::Regex(re) => re.find_iter(content).count(),
        }
    }
}

struct MatchArgs {
    count: Option<usize>,
    quiet: bool,
    /// Pattern first, then the file for grep
    positional: Vec<String>,
    matcher: Matcher,
}

impl MatchArgs {
    /// Parse leading flags followed by exactly `want` positional words.
    fn parse(cmd: &str, args: &[String], want: usize) -> Result<Self, ScriptError> {
        let expected = if want == 1 { MATCH_USAGE } else { GREP_USAGE };
        let mut count = None;
        let mut quiet = false;
        let mut use_regex = false;
        let mut i = 0;

        while i < args.len() {
            let arg = &args[i];
            if let Some(n) = arg.strip_prefix("-count=") {
                let n: usize = n.parse().map_err(|_| ScriptError::usage(cmd, expected))?;
                if n < 1 {
                    return Err(ScriptError::new(
                        ErrorKind::UsageError,
                        format!("{}: bad -count=: must be at least 1", cmd),
                    ));
                }
                count = Some(n);
            } else if arg == "-q" {
                quiet = true;
            } else if arg == "-re" {
                use_regex = true;
            } else {
                break;
            }
            i += 1;
        }

        let positional = args[i..].to_vec();
        if positional.len() != want {
            return Err(ScriptError::usage(cmd, expected));
        }
        let matcher = if use_regex {
            Matcher::Regex(compile_regex(cmd, &positional[0])?)
        } else {
            Matcher::Literal(positional[0].clone())
        };

        Ok(Self { count, quiet, positional, matcher })
    }
}

/// Compile a pattern in multi-line mode with a bounded DFA size.
fn compile_regex(cmd: &str, pattern: &str) -> Result<regex::Regex, ScriptError> {
    regex::RegexBuilder::new(&format!("(?m){}", pattern))
        .size_limit(1 << 20)
        .build()
        .map_err(|e| {
            ScriptError::new(ErrorKind::UsageError, format!("{}: invalid regex: {}", cmd, e))
        })
}

fn match_content(
    state: &mut State,
    neg: bool,
    name: &str,
    opts: &MatchArgs,
    content: &str,
) -> Result<CmdResult, ScriptError> {
    if neg && opts.count.is_some() {
        return Err(ScriptError::new(
            ErrorKind::UsageError,
            "-count=N cannot be combined with negation",
        ));
    }

    let pattern = &opts.positional[0];
    let raw = match opts.count {
        Some(want) => {
            let found = opts.matcher.count(content);
            if found == want {
                Ok(())
            } else {
                Err(ScriptError::mismatch(format!(
                    "{}: pattern {:?}: found {} matches, want {}",
                    name, pattern, found, want
                )))
            }
        }
        None => match opts.matcher.find(content) {
            Some((start, end)) => {
                if !opts.quiet {
                    state.logf(&format!("matched: {}", matched_line(content, start, end)));
                }
                Ok(())
            }
            None => {
                let mut msg = format!("{}: no match for {:?}", name, pattern);
                if !opts.quiet && !neg {
                    msg.push_str(&format!("\ncontent:\n{}", content));
                }
                Err(ScriptError::mismatch(msg))
            }
        },
    };

    outcome(state, neg, raw)
}

/// The full line(s) containing `start..end`.
fn matched_line(content: &str, start: usize, end: usize) -> &str {
    let line_start = content[..start].rfind('\n').map(|p| p + 1).unwrap_or(0);
    let line_end = content[end..].find('\n').map(|p| end + p).unwrap_or(content.len());
    &content[line_start..line_end]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_matched_line() {
        let text = "one\ntwo three\nfour";
        let start = text.find("three").unwrap();
        assert_eq!(matched_line(text, start, start + 5), "two three");
        assert_eq!(matched_line(text, 0, 3), "one");
        let four = text.find("four").unwrap();
        assert_eq!(matched_line(text, four, four + 4), "four");
    }

    #[test]
    fn test_parse_flags_then_positionals() {
        let args: Vec<String> = vec!["-count=2".into(), "-q".into(), "-re".into(), "a+".into()];
        let opts = MatchArgs::parse("stdout", &args, 1).unwrap();
        assert_eq!(opts.count, Some(2));
        assert!(opts.quiet);
        assert_eq!(opts.positional, vec!["a+".to_string()]);
        assert!(matches!(opts.matcher, Matcher::Regex(_)));
    }

    #[test]
    fn test_literal_pattern_keeps_metacharacters() {
        let opts = MatchArgs::parse("stdout", &["/a?x=1 (ok) [1/3]".to_string()], 1).unwrap();
        let content = "GET /a?x=1 (ok) [1/3]\n";
        assert_eq!(opts.matcher.find(content), Some((4, 21)));
        assert_eq!(opts.matcher.find("GET /ax=1 ok 1"), None);
    }

    #[test]
    fn test_count_literal_and_regex() {
        let text = "a\na\nba\n";
        let literal = MatchArgs::parse("stdout", &["a".to_string()], 1).unwrap();
        assert_eq!(literal.matcher.count(text), 3);
        let anchored = MatchArgs::parse("stdout", &["-re".to_string(), "^a$".to_string()], 1).unwrap();
        assert_eq!(anchored.matcher.count(text), 2);
    }

    #[test]
    fn test_parse_rejects_bad_arity_and_regex() {
        let err = MatchArgs::parse("grep", &["x".to_string()], 2).err().unwrap();
        assert_eq!(err.kind, ErrorKind::UsageError);
        assert!(MatchArgs::parse("stdout", &["(".to_string()], 1).is_ok());
        let err = MatchArgs::parse("stdout", &["-re".to_string(), "(".to_string()], 1).err().unwrap();
        assert!(err.message.contains("invalid regex"));
        let err = MatchArgs::parse("stdout", &["-count=0".to_string(), "x".to_string()], 1).err().unwrap();
        assert!(err.message.contains("at least 1"));
    }
}
