//! Script engine
//!
//! The Engine holds the command and condition registries and the wait
//! limits. It is immutable once built; one engine runs many scripts.

use std::collections::HashMap;
use std::time::Duration;

use crate::conditions::{BoxedCondition, ConditionFn};
use crate::error::{ErrorKind, ScriptError};
use crate::parser::{split_args, split_condition, ScriptCondition};
use crate::state::State;

/// Default time between interrupt and kill when a bounded wait expires
pub const DEFAULT_KILL_GRACE: Duration = Duration::from_secs(5);

/// Result returned by a command execution
#[derive(Debug, PartialEq, Eq)]
pub enum CmdResult {
    /// Command completed successfully
    Ok,
    /// Command completed, script should stop
    Stop(String),
    /// Command completed, test should be skipped
    Skip(String),
}

/// Usage information for a command
pub struct CmdUsage {
    /// One-line summary
    pub summary: String,
    /// Argument syntax
    pub args: String,
}

/// A command that can be executed in a script
pub trait Cmd: Send + Sync {
    /// Execute the command.
    ///
    /// `args` excludes the command name. `neg` is set when the line carried
    /// a `!` prefix; commands with a pass/fail outcome report it through
    /// [`outcome`] so the prefix inverts it.
    fn run(
        &self,
        engine: &Engine,
        state: &mut State,
        neg: bool,
        args: &[String],
    ) -> Result<CmdResult, ScriptError>;

    /// Return usage information
    fn usage(&self) -> CmdUsage;
}

/// A boxed command
pub type BoxedCmd = Box<dyn Cmd>;

/// A [`Cmd`] built from a closure.
///
/// The closure reports the raw outcome; negation is applied for it.
pub struct FnCmd<F> {
    summary: String,
    args: String,
    f: F,
}

impl<F> FnCmd<F>
where
    F: Fn(&mut State, &[String]) -> Result<(), ScriptError> + Send + Sync,
{
    pub fn new(summary: impl Into<String>, args: impl Into<String>, f: F) -> Self {
        Self { summary: summary.into(), args: args.into(), f }
    }
}

impl<F> Cmd for FnCmd<F>
where
    F: Fn(&mut State, &[String]) -> Result<(), ScriptError> + Send + Sync,
{
    fn run(
        &self,
        _engine: &Engine,
        state: &mut State,
        neg: bool,
        args: &[String],
    ) -> Result<CmdResult, ScriptError> {
        let raw = (self.f)(state, args);
        match raw {
            Err(e) if !e.is_outcome() && e.kind != ErrorKind::AssertionMismatch => Err(e),
            raw => outcome(state, neg, raw),
        }
    }

    fn usage(&self) -> CmdUsage {
        CmdUsage { summary: self.summary.clone(), args: self.args.clone() }
    }
}

/// Apply `!` to a command's raw outcome.
///
/// A failure under `!` is logged and passes; a success under `!` fails.
/// Errors that must not be inverted (usage, lookup) should be returned
/// before calling this.
pub fn outcome(
    state: &mut State,
    neg: bool,
    raw: Result<(), ScriptError>,
) -> Result<CmdResult, ScriptError> {
    match (raw, neg) {
        (Ok(()), false) => Ok(CmdResult::Ok),
        (Ok(()), true) => Err(ScriptError::new(
            ErrorKind::UnexpectedSuccess,
            "command succeeded unexpectedly",
        )),
        (Err(e), false) => Err(e),
        (Err(e), true) => {
            state.logf(&format!("[{}]", e.message));
            Ok(CmdResult::Ok)
        }
    }
}

/// The script engine
pub struct Engine {
    /// Built-in commands
    commands: HashMap<String, BoxedCmd>,
    /// Caller-registered commands, consulted after the built-ins
    custom: HashMap<String, BoxedCmd>,
    /// Built-in conditions
    conditions: HashMap<String, BoxedCondition>,
    /// Replaces the condition table when set
    predicate: Option<ConditionFn>,
    /// Unknown verbs are errors instead of implicit `exec`
    pub require_explicit_exec: bool,
    /// Upper bound for each process wait; `None` waits forever
    pub wait_timeout: Option<Duration>,
    /// Time between interrupt and kill
    pub kill_grace: Duration,
}

impl Engine {
    /// Create a new engine with the built-in commands and conditions.
    pub fn new() -> Self {
        Self::with_short(false)
    }

    /// Like [`Engine::new`], with the value of the `[short]` condition.
    pub fn with_short(short: bool) -> Self {
        Self {
            commands: crate::commands::default_commands(),
            custom: HashMap::new(),
            conditions: crate::conditions::default_conditions(short),
            predicate: None,
            require_explicit_exec: false,
            wait_timeout: None,
            kill_grace: DEFAULT_KILL_GRACE,
        }
    }

    /// Register a custom command. Built-in names take precedence.
    pub fn register_command(&mut self, name: impl Into<String>, cmd: BoxedCmd) {
        let name = name.into();
        if self.commands.contains_key(&name) {
            tracing::warn!(command = %name, "custom command is shadowed by a built-in");
        }
        self.custom.insert(name, cmd);
    }

    /// Install a predicate that decides every `[tag]` guard.
    pub fn set_condition(&mut self, predicate: ConditionFn) {
        self.predicate = Some(predicate);
    }

    /// Names of every dispatchable command, sorted.
    pub fn command_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self
            .commands
            .keys()
            .chain(self.custom.keys())
            .map(|s| s.as_str())
            .collect();
        names.sort_unstable();
        names.dedup();
        names
    }

    /// Usage of the command a verb dispatches to, built-ins first.
    pub fn command_usage(&self, name: &str) -> Option<CmdUsage> {
        self.commands
            .get(name)
            .or_else(|| self.custom.get(name))
            .map(|cmd| cmd.usage())
    }

    /// Built-in condition names with their summaries, sorted.
    pub fn condition_summaries(&self) -> Vec<(&str, &str)> {
        let mut conds: Vec<(&str, &str)> = self
            .conditions
            .iter()
            .map(|(name, cond)| (name.as_str(), cond.summary()))
            .collect();
        conds.sort_by(|a, b| a.0.cmp(b.0));
        conds
    }

    /// Execute a script.
    ///
    /// Background jobs still running when the script ends, however it ends,
    /// are terminated and reaped.
    pub fn execute(
        &self,
        state: &mut State,
        script: &str,
        filename: &str,
    ) -> Result<(), ScriptError> {
        let result = self.run_lines(state, script, filename);
        if !state.jobs.is_empty() {
            let names = state.jobs.names().join(" ");
            state.logf(&format!("[terminating background jobs: {}]", names));
            state.jobs.terminate_all(self.kill_grace);
        }
        result
    }

    fn run_lines(
        &self,
        state: &mut State,
        script: &str,
        filename: &str,
    ) -> Result<(), ScriptError> {
        for (i, raw) in script.lines().enumerate() {
            state.line = i + 1;
            let line = raw.trim();
            if line.is_empty() {
                continue;
            }
            if line.starts_with('#') {
                state.logf(line);
                continue;
            }

            match self.run_line(state, line) {
                Ok(CmdResult::Ok) => {}
                Ok(CmdResult::Stop(msg)) => {
                    state.stopped = true;
                    state.logf(&format!("[stop: {}]", msg));
                    return Ok(());
                }
                Ok(CmdResult::Skip(msg)) => {
                    return Err(ScriptError::skip(msg).with_location(filename, state.line));
                }
                Err(e) => return Err(e.with_location(filename, state.line)),
            }
        }
        Ok(())
    }

    fn run_line(&self, state: &mut State, line: &str) -> Result<CmdResult, ScriptError> {
        let (cond, rest) = split_condition(line).map_err(|e| ScriptError::syntax(e.message))?;
        if let Some(cond) = cond {
            if !self.eval_condition(state, &cond)? {
                return Ok(CmdResult::Ok);
            }
        }
        if rest.is_empty() {
            return Ok(CmdResult::Ok);
        }

        state.logf(&format!("> {}", line));

        let expanded = state.expand(rest);
        let mut words = split_args(&expanded).map_err(|e| ScriptError::syntax(e.message))?;

        let neg = words.first().is_some_and(|w| w == "!");
        if neg {
            words.remove(0);
            if words.is_empty() {
                return Err(ScriptError::syntax("! on line by itself"));
            }
        }
        if words.is_empty() {
            return Ok(CmdResult::Ok);
        }

        self.dispatch(state, neg, &words)
    }

    /// Run one command line that has already been split into words.
    ///
    /// Resolution order: built-ins, custom commands, then `exec` with the
    /// whole line unless explicit exec is required.
    pub fn dispatch(
        &self,
        state: &mut State,
        neg: bool,
        words: &[String],
    ) -> Result<CmdResult, ScriptError> {
        let Some((verb, args)) = words.split_first() else {
            return Ok(CmdResult::Ok);
        };

        let (cmd, verb, args) = match self.commands.get(verb).or_else(|| self.custom.get(verb)) {
            Some(cmd) => (cmd, verb.as_str(), args),
            None if self.require_explicit_exec => {
                return Err(ScriptError::new(
                    ErrorKind::UnknownCommand,
                    format!("unknown command {:?}", verb),
                ));
            }
            None => match self.commands.get("exec") {
                Some(exec) => (exec, "exec", words),
                None => {
                    return Err(ScriptError::new(
                        ErrorKind::UnknownCommand,
                        format!("unknown command {:?}", verb),
                    ));
                }
            },
        };

        tracing::debug!(command = verb, neg, "dispatch");
        cmd.run(self, state, neg, args)
            .map_err(|e| e.with_command(verb).with_args(args.to_vec()))
    }

    fn eval_condition(&self, state: &State, cond: &ScriptCondition) -> Result<bool, ScriptError> {
        let value = match &self.predicate {
            Some(predicate) => predicate(&cond.tag).map_err(|e| {
                ScriptError::new(
                    ErrorKind::ConditionError,
                    format!("evaluating condition {:?}: {}", cond.tag, e),
                )
            })?,
            None => self
                .conditions
                .get(&cond.tag)
                .ok_or_else(|| {
                    ScriptError::new(
                        ErrorKind::ConditionError,
                        format!("unknown condition {:?}", cond.tag),
                    )
                })?
                .eval(state)?,
        };
        Ok(value != cond.negate)
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}
