//! Script conditions
//!
//! Conditions are used in `[tag]` guards to conditionally execute lines.
//! A predicate installed through [`crate::Params`] replaces this table
//! entirely; otherwise the built-ins below are consulted.

use std::collections::HashMap;
use crate::error::ScriptError;
use crate::state::State;

/// A condition that can be evaluated
pub trait Condition: Send + Sync {
    /// Evaluate the condition against the current script state.
    fn eval(&self, state: &State) -> Result<bool, ScriptError>;

    /// Brief description
    fn summary(&self) -> &str;
}

/// Boxed condition
pub type BoxedCondition = Box<dyn Condition>;

/// A caller-supplied condition predicate. Receives the tag without `!`.
pub type ConditionFn = Box<dyn Fn(&str) -> Result<bool, String> + Send + Sync>;

/// Return the default set of conditions.
///
/// `short` is the value reported by the `[short]` tag.
pub fn default_conditions(short: bool) -> HashMap<String, BoxedCondition> {
    let mut conds: HashMap<String, BoxedCondition> = HashMap::new();

    conds.insert("short".into(), Box::new(BoolCondition {
        summary: "true when running in short mode".into(),
        value: short,
    }));
    conds.insert("unix".into(), Box::new(BoolCondition {
        summary: "true on Unix-like systems".into(),
        value: cfg!(unix),
    }));
    conds.insert("windows".into(), Box::new(BoolCondition {
        summary: "true on Windows".into(),
        value: cfg!(windows),
    }));
    conds.insert("darwin".into(), Box::new(BoolCondition {
        summary: "true on macOS".into(),
        value: cfg!(target_os = "macos"),
    }));
    conds.insert("linux".into(), Box::new(BoolCondition {
        summary: "true on Linux".into(),
        value: cfg!(target_os = "linux"),
    }));

    conds
}

/// A static boolean condition
struct BoolCondition {
    summary: String,
    value: bool,
}

impl Condition for BoolCondition {
    fn eval(&self, _state: &State) -> Result<bool, ScriptError> {
        Ok(self.value)
    }

    fn summary(&self) -> &str {
        &self.summary
    }
}
