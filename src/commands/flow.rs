//! Flow control commands: stop, skip, wait

use crate::engine::{Cmd, CmdResult, CmdUsage, Engine};
use crate::error::{ErrorKind, ScriptError};
use crate::state::State;

fn reject_negation(cmd: &str, neg: bool) -> Result<(), ScriptError> {
    if neg {
        return Err(ScriptError::new(
            ErrorKind::UsageError,
            format!("{} does not support negation", cmd),
        ));
    }
    Ok(())
}

// ──────────────────────────────────────────────────────────
// stop — stop script execution
// ──────────────────────────────────────────────────────────

pub(super) struct StopCmd;

impl Cmd for StopCmd {
    fn run(
        &self,
        _engine: &Engine,
        _state: &mut State,
        neg: bool,
        args: &[String],
    ) -> Result<CmdResult, ScriptError> {
        reject_negation("stop", neg)?;
        if args.len() > 1 {
            return Err(ScriptError::usage("stop", "[message]"));
        }
        let msg = args.first().cloned().unwrap_or_else(|| "stopped".to_string());
        Ok(CmdResult::Stop(msg))
    }

    fn usage(&self) -> CmdUsage {
        CmdUsage {
            summary: "Stop script execution; the script passes".into(),
            args: "[message]".into(),
        }
    }
}

// ──────────────────────────────────────────────────────────
// skip — skip the test
// ──────────────────────────────────────────────────────────

pub(super) struct SkipCmd;

impl Cmd for SkipCmd {
    fn run(
        &self,
        _engine: &Engine,
        _state: &mut State,
        neg: bool,
        args: &[String],
    ) -> Result<CmdResult, ScriptError> {
        reject_negation("skip", neg)?;
        if args.len() > 1 {
            return Err(ScriptError::usage("skip", "[message]"));
        }
        let msg = args.first().cloned().unwrap_or_else(|| "skipped".to_string());
        Ok(CmdResult::Skip(msg))
    }

    fn usage(&self) -> CmdUsage {
        CmdUsage {
            summary: "Skip the test".into(),
            args: "[message]".into(),
        }
    }
}

// ──────────────────────────────────────────────────────────
// wait — join background jobs
// ──────────────────────────────────────────────────────────

pub(super) struct WaitCmd;

impl Cmd for WaitCmd {
    fn run(
        &self,
        engine: &Engine,
        state: &mut State,
        neg: bool,
        args: &[String],
    ) -> Result<CmdResult, ScriptError> {
        reject_negation("wait", neg)?;

        let jobs = if args.is_empty() {
            state.jobs.take_all()
        } else {
            state.jobs.take_named(args)?
        };

        let mut stdout = String::new();
        let mut stderr = String::new();
        let mut failures = Vec::new();

        for job in jobs {
            let joined = job.join(engine.wait_timeout, engine.kill_grace);
            state.logf(&format!("[{}] {}", joined.name, joined.args.join(" ")));

            stdout.push_str(&joined.output.stdout);
            stderr.push_str(&joined.output.stderr);

            match joined.mismatch() {
                Some(msg) => failures.push(msg),
                None => {
                    if let Some(err) = &joined.output.error {
                        state.logf(&format!("[{}: {}]", joined.name, err));
                    }
                }
            }
        }

        state.stdout = stdout;
        state.stderr = stderr;
        state.log_output();

        if failures.is_empty() {
            Ok(CmdResult::Ok)
        } else {
            Err(ScriptError::failed(failures.join("; ")))
        }
    }

    fn usage(&self) -> CmdUsage {
        CmdUsage {
            summary: "Wait for background jobs, all of them or the named ones".into(),
            args: "[name...]".into(),
        }
    }
}
