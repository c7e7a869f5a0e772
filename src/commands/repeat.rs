//! repeat — run an exec or http line several times and tally the outcomes

use crate::engine::{outcome, Cmd, CmdResult, CmdUsage, Engine};
use crate::error::{ErrorKind, ScriptError};
use crate::parser::BackgroundSpec;
use crate::state::State;

const REPEAT_USAGE: &str = "[-all] count [!] exec|http args...";

/// Pass/fail tally for one `repeat` invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepeatStats {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    /// 1-based index of the first failing iteration
    pub first_failure: Option<usize>,
}

impl RepeatStats {
    pub fn new(total: usize) -> Self {
        Self { total, passed: 0, failed: 0, first_failure: None }
    }

    pub fn record(&mut self, iteration: usize, passed: bool) {
        if passed {
            self.passed += 1;
        } else {
            self.failed += 1;
            self.first_failure.get_or_insert(iteration);
        }
    }

    /// `P/N passed`, followed by the failure line when anything failed.
    pub fn summary(&self) -> String {
        let mut out = format!("{}/{} passed\n", self.passed, self.total);
        if let Some(first) = self.first_failure {
            out.push_str(&format!(
                "{}/{} failed (first failure: iteration {})\n",
                self.failed, self.total, first
            ));
        }
        out
    }
}

pub(super) struct RepeatCmd;

impl Cmd for RepeatCmd {
    fn run(
        &self,
        engine: &Engine,
        state: &mut State,
        neg: bool,
        args: &[String],
    ) -> Result<CmdResult, ScriptError> {
        let (all, args) = match args.split_first() {
            Some((flag, rest)) if flag == "-all" => (true, rest),
            _ => (false, args),
        };
        let Some((count, wrapped)) = args.split_first() else {
            return Err(ScriptError::usage("repeat", REPEAT_USAGE));
        };
        let count: usize = count
            .parse()
            .ok()
            .filter(|&n| n > 0)
            .ok_or_else(|| {
                ScriptError::new(ErrorKind::UsageError, format!("invalid repeat count {:?}", count))
            })?;

        let (inner_neg, wrapped) = match wrapped.split_first() {
            Some((bang, rest)) if bang == "!" => (true, rest),
            _ => (false, wrapped),
        };
        match wrapped.first().map(String::as_str) {
            Some("exec" | "http") => {}
            Some(verb) => {
                return Err(ScriptError::new(
                    ErrorKind::UsageError,
                    format!("repeat supports only exec and http, not {:?}", verb),
                ));
            }
            None => return Err(ScriptError::usage("repeat", REPEAT_USAGE)),
        }
        if wrapped.last().and_then(|w| BackgroundSpec::parse(w)).is_some() {
            return Err(ScriptError::new(
                ErrorKind::UsageError,
                "background jobs cannot be repeated",
            ));
        }

        let mut stats = RepeatStats::new(count);
        let mut first_error = None;
        for iteration in 1..=count {
            match engine.dispatch(state, inner_neg, wrapped) {
                Ok(_) => stats.record(iteration, true),
                Err(e) if e.is_outcome() || e.kind == ErrorKind::AssertionMismatch => {
                    state.logf(&format!("[iteration {}: {}]", iteration, e.message));
                    stats.record(iteration, false);
                    first_error.get_or_insert(e);
                    if !all {
                        break;
                    }
                }
                Err(e) => return Err(e),
            }
        }

        let summary = stats.summary();
        tracing::debug!(passed = stats.passed, failed = stats.failed, total = count, "repeat finished");
        state.logf(&summary);
        state.stderr = summary;

        let raw = match (first_error, stats.first_failure) {
            (Some(e), Some(iteration)) => Err(ScriptError::failed(format!(
                "iteration {}: {}",
                iteration, e.message
            ))),
            _ => Ok(()),
        };
        // Under -all failures are only tallied; `!` still asserts that some failed.
        if all && !neg {
            return Ok(CmdResult::Ok);
        }
        outcome(state, neg, raw)
    }

    fn usage(&self) -> CmdUsage {
        CmdUsage {
            summary: "Run an exec or http line count times; -all runs every iteration and only tallies failures".into(),
            args: REPEAT_USAGE.into(),
        }
    }
}
