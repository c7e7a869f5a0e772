//! tsar: a script-driven test engine
//!
//! Each `.tsar` file is a line-oriented script run in a fresh working
//! directory. Commands touch the filesystem, run processes (in the
//! foreground or as named background jobs), send HTTP requests, and assert
//! on what came back.
//!
//! # Script Syntax
//!
//! ```text
//! # comment
//! exec mytool arg1 "quoted arg"
//! stdout "expected output"
//! stdout -re "^version [0-9]+"
//! ! exec mytool --bad-flag
//! stderr "error message"
//! [unix] exec sh -c "echo $HOME"
//! exec server --port 8080 &srv
//! http GET http://127.0.0.1:8080/health
//! httpstatus 200
//! repeat -all 9 http GET $SERVER/flaky
//! stderr "9 passed"
//! wait srv
//! ```
//!
//! Only double quotes group words; `\"` and `\\` escape inside them.
//! `$NAME` and `${NAME}` are expanded before the line is split, so
//! `$HOME` above reaches `sh` already replaced.
//!
//! # Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `exec` | Run a program, optionally in the background with `&` or `&name` |
//! | `wait` | Wait for background jobs |
//! | `stdout` / `stderr` | Check the last output contains a substring (`-re` for a regex) |
//! | `grep` | Check a file contains a substring (`-re` for a regex) |
//! | `cmp` / `cmpenv` | Compare files |
//! | `exists` | Check file existence |
//! | `cd` / `cp` / `mkdir` / `rm` / `chmod` | Filesystem operations |
//! | `env` | Set or log environment variables |
//! | `http` | Send an HTTP request |
//! | `httpstatus` / `httpheader` | Check the last HTTP response |
//! | `repeat` | Run an `exec` or `http` line several times |
//! | `stop` / `skip` | End the script early |
//!
//! # Prefixes
//!
//! - `!` - Command must fail
//! - `[cond]` / `[!cond]` - Conditional execution

mod commands;
mod conditions;
mod engine;
mod error;
mod http;
mod jobs;
pub mod logging;
mod parser;
mod process;
mod reporter;
mod runner;
mod state;

pub use commands::{default_commands, RepeatStats};
pub use conditions::{default_conditions, BoxedCondition, Condition, ConditionFn};
pub use engine::{outcome, BoxedCmd, Cmd, CmdResult, CmdUsage, Engine, FnCmd, DEFAULT_KILL_GRACE};
pub use error::{ErrorKind, ScriptError};
pub use http::{HttpExchange, HttpRequest, HttpResponse, HttpState};
pub use jobs::JobRegistry;
pub use parser::{split_args, split_condition, BackgroundSpec};
pub use reporter::{CaptureT, TestingT};
pub use runner::{Env, Params, SetupFn, TestCaseResult, TestResult, TestRunner, SCRIPT_EXT};
pub use state::State;

// Convenience functions for cargo test integration
pub use runner::{run, run_and_assert, run_and_assert_with};
