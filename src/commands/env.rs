//! Environment commands: cd, env

use crate::engine::{outcome, Cmd, CmdResult, CmdUsage, Engine};
use crate::error::ScriptError;
use crate::state::State;

// ──────────────────────────────────────────────────────────
// cd — change directory
// ──────────────────────────────────────────────────────────

pub(super) struct CdCmd;

impl Cmd for CdCmd {
    fn run(
        &self,
        _engine: &Engine,
        state: &mut State,
        neg: bool,
        args: &[String],
    ) -> Result<CmdResult, ScriptError> {
        let [dir] = args else {
            return Err(ScriptError::usage("cd", "dir"));
        };
        let raw = state
            .chdir(dir)
            .map_err(|e| ScriptError::failed(e.to_string()));
        outcome(state, neg, raw)
    }

    fn usage(&self) -> CmdUsage {
        CmdUsage {
            summary: "Change the script's working directory".into(),
            args: "dir".into(),
        }
    }
}

// ──────────────────────────────────────────────────────────
// env — set or list environment variables
// ──────────────────────────────────────────────────────────

pub(super) struct EnvCmd;

impl Cmd for EnvCmd {
    fn run(
        &self,
        _engine: &Engine,
        state: &mut State,
        neg: bool,
        args: &[String],
    ) -> Result<CmdResult, ScriptError> {
        match args {
            [] => {
                // Logged only; the last stdout stays with the last real command.
                let listing: Vec<String> =
                    state.environ().map(|(k, v)| format!("{}={}", k, v)).collect();
                for line in listing {
                    state.logf(&line);
                }
                outcome(state, neg, Ok(()))
            }
            [assignment] => {
                let Some((key, value)) = assignment.split_once('=').filter(|(k, _)| !k.is_empty())
                else {
                    return Err(ScriptError::usage("env", "[key=value]"));
                };
                state.setenv(key, value);
                outcome(state, neg, Ok(()))
            }
            _ => Err(ScriptError::usage("env", "[key=value]")),
        }
    }

    fn usage(&self) -> CmdUsage {
        CmdUsage {
            summary: "Set an environment variable, or log all of them".into(),
            args: "[key=value]".into(),
        }
    }
}
