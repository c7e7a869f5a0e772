//! Built-in script commands
//!
//! Patterns for `stdout`, `stderr` and `grep` are plain substrings; with
//! `-re` they are regular expressions in multi-line mode. Commands with a
//! pass/fail outcome honor `!`.

mod cmp;
mod env;
mod exec;
mod file_ops;
mod flow;
mod http;
mod output;
mod repeat;

use std::collections::HashMap;

use crate::engine::BoxedCmd;

pub use repeat::RepeatStats;

/// Return the built-in command table
pub fn default_commands() -> HashMap<String, BoxedCmd> {
    let mut cmds: HashMap<String, BoxedCmd> = HashMap::new();
    cmds.insert("cd".into(), Box::new(env::CdCmd));
    cmds.insert("chmod".into(), Box::new(file_ops::ChmodCmd));
    cmds.insert("cmp".into(), Box::new(cmp::CmpCmd));
    cmds.insert("cmpenv".into(), Box::new(cmp::CmpEnvCmd));
    cmds.insert("cp".into(), Box::new(file_ops::CpCmd));
    cmds.insert("env".into(), Box::new(env::EnvCmd));
    cmds.insert("exec".into(), Box::new(exec::ExecCmd));
    cmds.insert("exists".into(), Box::new(file_ops::ExistsCmd));
    cmds.insert("grep".into(), Box::new(output::GrepCmd));
    cmds.insert("http".into(), Box::new(http::HttpCmd));
    cmds.insert("httpheader".into(), Box::new(http::HttpHeaderCmd));
    cmds.insert("httpstatus".into(), Box::new(http::HttpStatusCmd));
    cmds.insert("mkdir".into(), Box::new(file_ops::MkdirCmd));
    cmds.insert("repeat".into(), Box::new(repeat::RepeatCmd));
    cmds.insert("rm".into(), Box::new(file_ops::RmCmd));
    cmds.insert("skip".into(), Box::new(flow::SkipCmd));
    cmds.insert("stderr".into(), Box::new(output::StderrCmd));
    cmds.insert("stdout".into(), Box::new(output::StdoutCmd));
    cmds.insert("stop".into(), Box::new(flow::StopCmd));
    cmds.insert("wait".into(), Box::new(flow::WaitCmd));
    cmds
}
