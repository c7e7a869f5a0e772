//! Process execution
//!
//! Every external program runs as a [`ProcessTask`]: the child is moved onto
//! its own thread, which drains stdout/stderr and reports exactly once over a
//! one-shot channel. Foreground `exec` waits on the task immediately;
//! background jobs park it in the [`crate::jobs::JobRegistry`] until `wait`.

use std::process::{Child, Command as ProcessCommand, ExitStatus, Stdio};
use std::sync::mpsc::{self, RecvTimeoutError, TryRecvError};
use std::thread;
use std::time::Duration;

use crate::error::ScriptError;
use crate::state::State;

/// Captured result of a finished process
#[derive(Debug, Clone, Default)]
pub struct ProcessOutput {
    pub stdout: String,
    pub stderr: String,
    /// `None` when the process exited successfully
    pub error: Option<String>,
}

impl ProcessOutput {
    pub fn success(&self) -> bool {
        self.error.is_none()
    }
}

/// A running child process owned by a collector thread.
pub struct ProcessTask {
    pid: u32,
    done: mpsc::Receiver<ProcessOutput>,
    collector: Option<thread::JoinHandle<()>>,
    reaped: bool,
}

impl ProcessTask {
    /// Hand `child` to a collector thread.
    pub fn start(child: Child, label: &str) -> std::io::Result<Self> {
        let pid = child.id();
        let (tx, done) = mpsc::sync_channel(1);

        let collector = thread::Builder::new()
            .name(format!("tsar-{}", label))
            .spawn(move || {
                let output = match child.wait_with_output() {
                    Ok(output) => ProcessOutput {
                        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
                        error: exit_error(output.status),
                    },
                    Err(e) => ProcessOutput {
                        error: Some(e.to_string()),
                        ..Default::default()
                    },
                };
                // The receiver only disappears if the task was dropped mid-wait.
                let _ = tx.send(output);
            })?;

        Ok(Self {
            pid,
            done,
            collector: Some(collector),
            reaped: false,
        })
    }

    /// OS process id of the child
    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// Block until the process exits.
    ///
    /// With `limit` set, a process still running after `limit` is
    /// interrupted, and killed if it survives another `grace`.
    pub fn wait(mut self, limit: Option<Duration>, grace: Duration) -> ProcessOutput {
        let output = match limit {
            None => self.recv(),
            Some(limit) => match self.done.recv_timeout(limit) {
                Ok(output) => output,
                Err(RecvTimeoutError::Disconnected) => lost_task(),
                Err(RecvTimeoutError::Timeout) => {
                    let mut output = self.terminate(grace);
                    let detail = output.error.take().unwrap_or_else(|| "exited".into());
                    output.error = Some(format!("timed out after {:?} ({})", limit, detail));
                    output
                }
            },
        };
        self.finish();
        output
    }

    /// Interrupt the process group, escalating to a kill after `grace`.
    fn terminate(&mut self, grace: Duration) -> ProcessOutput {
        tracing::debug!(pid = self.pid, "interrupting process group");
        if let Some(output) = self.signal(Stop::Interrupt) {
            return output;
        }
        match self.done.recv_timeout(grace) {
            Ok(output) => output,
            Err(RecvTimeoutError::Disconnected) => lost_task(),
            Err(RecvTimeoutError::Timeout) => {
                tracing::warn!(pid = self.pid, ?grace, "process ignored interrupt, killing");
                self.signal(Stop::Kill).unwrap_or_else(|| self.recv())
            }
        }
    }

    /// Signal the child's process group, unless the collector has already
    /// reported. Once it has, the child is reaped and its pid may be reused.
    fn signal(&self, stop: Stop) -> Option<ProcessOutput> {
        match self.done.try_recv() {
            Ok(output) => Some(output),
            Err(TryRecvError::Disconnected) => Some(lost_task()),
            Err(TryRecvError::Empty) => {
                send_stop(self.pid, stop);
                None
            }
        }
    }

    fn recv(&self) -> ProcessOutput {
        self.done.recv().unwrap_or_else(|_| lost_task())
    }

    fn finish(&mut self) {
        self.reaped = true;
        if let Some(collector) = self.collector.take() {
            let _ = collector.join();
        }
    }
}

impl Drop for ProcessTask {
    fn drop(&mut self) {
        if self.reaped {
            return;
        }
        if self.signal(Stop::Kill).is_none() {
            let _ = self.done.recv();
        }
        self.finish();
    }
}

fn lost_task() -> ProcessOutput {
    ProcessOutput {
        error: Some("process collector exited without reporting".into()),
        ..Default::default()
    }
}

fn exit_error(status: ExitStatus) -> Option<String> {
    if status.success() {
        return None;
    }
    match status.code() {
        Some(code) => Some(format!("exit status {}", code)),
        None => Some(status.to_string()),
    }
}

#[derive(Debug, Clone, Copy)]
enum Stop {
    Interrupt,
    Kill,
}

/// Every child leads its own process group, so grandchildren holding the
/// output pipes are stopped with it.
#[cfg(unix)]
fn send_stop(pid: u32, stop: Stop) {
    use nix::sys::signal::{killpg, Signal};
    use nix::unistd::Pid;

    let signal = match stop {
        Stop::Interrupt => Signal::SIGINT,
        Stop::Kill => Signal::SIGKILL,
    };
    if let Err(e) = killpg(Pid::from_raw(pid as i32), signal) {
        tracing::debug!(pid, ?signal, error = %e, "signal not delivered");
    }
}

// No console interrupt can be targeted at a single child on Windows,
// so both steps kill the whole tree.
#[cfg(not(unix))]
fn send_stop(pid: u32, _stop: Stop) {
    let _ = ProcessCommand::new("taskkill")
        .args(["/F", "/T", "/PID", &pid.to_string()])
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status();
}

/// Start `program` with the script's directory and environment.
///
/// The environment is copied out of `state` here, so later `env` commands
/// never reach an already running process.
pub fn spawn(state: &State, program: &str, args: &[String]) -> Result<ProcessTask, ScriptError> {
    let resolved = look_path(state, program).map_err(|e| {
        ScriptError::lookup(format!("failed to execute '{}': {}", program, e))
    })?;

    let mut cmd = ProcessCommand::new(&resolved);
    cmd.args(args);
    cmd.current_dir(&state.pwd);
    cmd.stdin(Stdio::null());
    cmd.stdout(Stdio::piped());
    cmd.stderr(Stdio::piped());

    cmd.env_clear();
    for (k, v) in state.environ() {
        cmd.env(k, v);
    }
    cmd.env("PWD", &state.pwd);
    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        cmd.process_group(0);
    }

    let child = cmd.spawn().map_err(|e| {
        ScriptError::lookup(format!("failed to execute '{}': {}", program, e))
    })?;

    tracing::debug!(program, pid = child.id(), "spawned process");

    ProcessTask::start(child, program).map_err(|e| {
        ScriptError::lookup(format!("failed to monitor '{}': {}", program, e))
    })
}

/// Look up an executable by name using the script's PATH environment variable.
///
/// Names containing a path separator are used as given, relative to the
/// script's current directory.
pub fn look_path(state: &State, command: &str) -> Result<String, String> {
    if command.contains(std::path::MAIN_SEPARATOR) || command.contains('/') {
        let path = state.resolve_path(command);
        if path.is_file() {
            return Ok(path.to_string_lossy().into_owned());
        }
        return Err(format!("no such file: {}", command));
    }

    #[cfg(windows)]
    let extensions: Vec<String> = std::env::var("PATHEXT")
        .unwrap_or_else(|_| ".COM;.EXE;.BAT;.CMD".to_string())
        .split(';')
        .map(|s| s.to_lowercase())
        .collect();

    let path_env = state.getenv("PATH").unwrap_or("");

    for dir in std::env::split_paths(path_env) {
        if dir.as_os_str().is_empty() {
            continue;
        }

        #[cfg(windows)]
        {
            let path = dir.join(command);
            if path.is_file() {
                return Ok(path.to_string_lossy().into_owned());
            }
            for ext in &extensions {
                let path = dir.join(format!("{}{}", command, ext));
                if path.is_file() {
                    return Ok(path.to_string_lossy().into_owned());
                }
            }
        }

        #[cfg(not(windows))]
        {
            use std::os::unix::fs::PermissionsExt;
            let path = dir.join(command);
            if let Ok(meta) = std::fs::metadata(&path) {
                if meta.is_file() && meta.permissions().mode() & 0o111 != 0 {
                    return Ok(path.to_string_lossy().into_owned());
                }
            }
        }
    }

    Err(format!("executable not found in $PATH: {}", command))
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::time::Instant;

    fn state() -> (tempfile::TempDir, State) {
        let dir = tempfile::tempdir().unwrap();
        let state = State::new(dir.path().to_path_buf());
        (dir, state)
    }

    #[test]
    fn test_foreground_capture() {
        let (_dir, state) = state();
        let task = spawn(&state, "sh", &["-c".into(), "echo out; echo err >&2".into()]).unwrap();
        let output = task.wait(None, Duration::from_secs(1));
        assert!(output.success());
        assert_eq!(output.stdout, "out\n");
        assert_eq!(output.stderr, "err\n");
    }

    #[test]
    fn test_exit_status_reported() {
        let (_dir, state) = state();
        let output = spawn(&state, "sh", &["-c".into(), "exit 3".into()])
            .unwrap()
            .wait(None, Duration::from_secs(1));
        assert_eq!(output.error.as_deref(), Some("exit status 3"));
    }

    #[test]
    fn test_missing_program_is_lookup_error() {
        let (_dir, state) = state();
        let err = spawn(&state, "definitely-not-a-real-program-xyz", &[]).err().unwrap();
        assert_eq!(err.kind, crate::error::ErrorKind::LookupError);
    }

    #[test]
    fn test_runs_in_script_directory() {
        let (dir, state) = state();
        let output = spawn(&state, "sh", &["-c".into(), "pwd; echo $PWD".into()])
            .unwrap()
            .wait(None, Duration::from_secs(1));
        let canonical = dir.path().canonicalize().unwrap();
        let first = output.stdout.lines().next().unwrap();
        assert_eq!(std::path::Path::new(first).canonicalize().unwrap(), canonical);
    }

    #[test]
    fn test_bounded_wait_interrupts() {
        let (_dir, state) = state();
        let task = spawn(&state, "sleep", &["30".into()]).unwrap();
        let start = Instant::now();
        let output = task.wait(Some(Duration::from_millis(100)), Duration::from_secs(5));
        assert!(start.elapsed() < Duration::from_secs(10));
        assert!(output.error.unwrap().starts_with("timed out"));
    }

    #[test]
    fn test_bounded_wait_escalates_to_kill() {
        let (_dir, state) = state();
        let script = "trap '' INT; exec sleep 30";
        let task = spawn(&state, "sh", &["-c".into(), script.into()]).unwrap();
        let start = Instant::now();
        let output = task.wait(Some(Duration::from_millis(100)), Duration::from_millis(200));
        assert!(start.elapsed() < Duration::from_secs(10));
        assert!(!output.success());
    }

    #[test]
    fn test_bounded_wait_stops_grandchildren() {
        let (_dir, state) = state();
        // sh forks sleep, which inherits the output pipes
        let task = spawn(&state, "sh", &["-c".into(), "sleep 6; echo late".into()]).unwrap();
        let start = Instant::now();
        let output = task.wait(Some(Duration::from_millis(200)), Duration::from_millis(200));
        assert!(start.elapsed() < Duration::from_secs(3), "took {:?}", start.elapsed());
        assert!(!output.stdout.contains("late"));
        assert!(output.error.unwrap().starts_with("timed out"));
    }

    #[test]
    fn test_drop_stops_process_group() {
        let (_dir, state) = state();
        let task = spawn(&state, "sh", &["-c".into(), "sleep 6; echo late".into()]).unwrap();
        let start = Instant::now();
        drop(task);
        assert!(start.elapsed() < Duration::from_secs(3), "took {:?}", start.elapsed());
    }

    #[test]
    fn test_finished_task_is_not_signalled() {
        let (_dir, state) = state();
        let task = spawn(&state, "sh", &["-c".into(), "echo done".into()]).unwrap();
        std::thread::sleep(Duration::from_millis(300));
        let output = task.wait(Some(Duration::ZERO), Duration::from_millis(100));
        assert_eq!(output.stdout, "done\n");
    }
}
