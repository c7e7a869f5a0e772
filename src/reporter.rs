//! Test reporting
//!
//! The runner never prints or exits on its own; every verdict goes through
//! a [`TestingT`].

use std::fmt;

/// The host test framework, as seen by the runner.
pub trait TestingT {
    /// Record that a script was skipped.
    fn skip(&mut self, msg: &str);

    /// Record a failure. The runner stops the failing script itself.
    fn fatal(&mut self, msg: &str);

    fn fatalf(&mut self, args: fmt::Arguments<'_>) {
        self.fatal(&args.to_string());
    }

    fn log(&mut self, msg: &str);

    fn logf(&mut self, args: fmt::Arguments<'_>) {
        self.log(&args.to_string());
    }

    /// Whether any failure has been recorded.
    fn failed(&self) -> bool;

    /// Mark the caller as a helper. Only meaningful to hosts that track
    /// call sites.
    fn helper(&mut self) {}
}

/// A [`TestingT`] that collects everything in memory, optionally echoing
/// to stderr as it goes.
#[derive(Debug, Default)]
pub struct CaptureT {
    echo: bool,
    pub logs: Vec<String>,
    pub failures: Vec<String>,
    pub skips: Vec<String>,
}

impl CaptureT {
    pub fn new() -> Self {
        Self::default()
    }

    /// Like [`CaptureT::new`], also writing every message to stderr.
    pub fn echo() -> Self {
        Self { echo: true, ..Self::default() }
    }

    /// Everything logged so far, one message per line.
    pub fn output(&self) -> String {
        let mut out = String::new();
        for line in &self.logs {
            out.push_str(line);
            if !line.ends_with('\n') {
                out.push('\n');
            }
        }
        out
    }

    fn emit(&self, msg: &str) {
        if self.echo {
            eprintln!("{}", msg.trim_end_matches('\n'));
        }
    }
}

impl TestingT for CaptureT {
    fn skip(&mut self, msg: &str) {
        self.emit(msg);
        self.skips.push(msg.to_string());
    }

    fn fatal(&mut self, msg: &str) {
        self.emit(msg);
        self.failures.push(msg.to_string());
    }

    fn log(&mut self, msg: &str) {
        self.emit(msg);
        self.logs.push(msg.to_string());
    }

    fn failed(&self) -> bool {
        !self.failures.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capture_records() {
        let mut t = CaptureT::new();
        assert!(!t.failed());
        t.logf(format_args!("=== RUN   {}", "hello"));
        t.skip("not here");
        assert!(!t.failed());
        t.fatalf(format_args!("{}:{}: boom", "a.tsar", 3));
        assert!(t.failed());
        assert_eq!(t.failures, vec!["a.tsar:3: boom".to_string()]);
        assert_eq!(t.output(), "=== RUN   hello\n");
        assert_eq!(t.skips.len(), 1);
    }
}
