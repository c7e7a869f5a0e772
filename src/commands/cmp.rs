//! cmp / cmpenv — file comparison commands

use similar::TextDiff;

use crate::engine::{outcome, Cmd, CmdResult, CmdUsage, Engine};
use crate::error::{ErrorKind, ScriptError};
use crate::state::State;

// ──────────────────────────────────────────────────────────
// cmp — compare files
// ──────────────────────────────────────────────────────────

pub(super) struct CmpCmd;

impl Cmd for CmpCmd {
    fn run(
        &self,
        _engine: &Engine,
        state: &mut State,
        neg: bool,
        args: &[String],
    ) -> Result<CmdResult, ScriptError> {
        cmp_files("cmp", state, neg, args, false)
    }

    fn usage(&self) -> CmdUsage {
        CmdUsage {
            summary: "Compare two files; the first may be stdout or stderr".into(),
            args: "[-q] file1 file2".into(),
        }
    }
}

// ──────────────────────────────────────────────────────────
// cmpenv — compare files with env expansion
// ──────────────────────────────────────────────────────────

pub(super) struct CmpEnvCmd;

impl Cmd for CmpEnvCmd {
    fn run(
        &self,
        _engine: &Engine,
        state: &mut State,
        neg: bool,
        args: &[String],
    ) -> Result<CmdResult, ScriptError> {
        cmp_files("cmpenv", state, neg, args, true)
    }

    fn usage(&self) -> CmdUsage {
        CmdUsage {
            summary: "Compare two files after expanding environment variables in both".into(),
            args: "[-q] file1 file2".into(),
        }
    }
}

fn cmp_files(
    cmd: &str,
    state: &mut State,
    neg: bool,
    args: &[String],
    expand: bool,
) -> Result<CmdResult, ScriptError> {
    let (quiet, files) = match args.split_first() {
        Some((flag, rest)) if flag == "-q" => (true, rest),
        _ => (false, args),
    };
    let [name1, name2] = files else {
        return Err(ScriptError::usage(cmd, "[-q] file1 file2"));
    };

    fn read_err(name: &str, e: std::io::Error) -> ScriptError {
        ScriptError::new(ErrorKind::Io, format!("{}: {}", name, e))
    }
    let mut text1 = state.read_file(name1).map_err(|e| read_err(name1, e))?;
    // file2 is always a real file
    let mut text2 = std::fs::read_to_string(state.resolve_path(name2))
        .map_err(|e| read_err(name2, e))?
        .replace("\r\n", "\n");

    if expand {
        text1 = state.expand(&text1);
        text2 = state.expand(&text2);
    }

    let raw = if text1 == text2 {
        Ok(())
    } else {
        if !quiet && !neg {
            let diff = TextDiff::from_lines(&text1, &text2)
                .unified_diff()
                .header(name1, name2)
                .to_string();
            state.logf(&diff);
        }
        Err(ScriptError::mismatch(format!("{} and {} differ", name1, name2)))
    };
    outcome(state, neg, raw)
}
