//! exec — run a program in the foreground or as a background job

use crate::engine::{outcome, Cmd, CmdResult, CmdUsage, Engine};
use crate::error::{ErrorKind, ScriptError};
use crate::jobs::BackgroundJob;
use crate::parser::BackgroundSpec;
use crate::process;
use crate::state::State;

pub(super) struct ExecCmd;

impl Cmd for ExecCmd {
    fn run(
        &self,
        engine: &Engine,
        state: &mut State,
        neg: bool,
        args: &[String],
    ) -> Result<CmdResult, ScriptError> {
        let (background, argv) = match args.split_last() {
            Some((last, rest)) => match BackgroundSpec::parse(last) {
                Some(spec) => (Some(spec), rest),
                None => (None, args),
            },
            None => (None, args),
        };
        let Some((program, program_args)) = argv.split_first() else {
            return Err(ScriptError::usage("exec", "program [args...] [&name]"));
        };

        match background {
            Some(spec) => start_background(state, neg, spec, argv, program, program_args),
            None => {
                let task = process::spawn(state, program, program_args)?;
                let output = task.wait(engine.wait_timeout, engine.kill_grace);
                state.stdout = output.stdout;
                state.stderr = output.stderr;
                state.log_output();
                let raw = match output.error {
                    None => Ok(()),
                    Some(err) => Err(ScriptError::failed(err)),
                };
                outcome(state, neg, raw)
            }
        }
    }

    fn usage(&self) -> CmdUsage {
        CmdUsage {
            summary: "Run a program, in the background when the last word is &name".into(),
            args: "program [args...] [&name]".into(),
        }
    }
}

fn start_background(
    state: &mut State,
    neg: bool,
    spec: BackgroundSpec,
    argv: &[String],
    program: &str,
    program_args: &[String],
) -> Result<CmdResult, ScriptError> {
    let name = spec.name.unwrap_or_else(|| state.jobs.implicit_name());
    // Checked before spawning so a rejected job never starts.
    if state.jobs.contains(&name) {
        return Err(ScriptError::new(
            ErrorKind::DuplicateName,
            format!("duplicate background process name {:?}", name),
        ));
    }

    let task = process::spawn(state, program, program_args)?;
    state.logf(&format!("[started {} (pid {})]", name, task.pid()));
    state.jobs.insert(BackgroundJob::new(name, argv.to_vec(), neg, task))?;

    state.stdout.clear();
    state.stderr.clear();
    Ok(CmdResult::Ok)
}
