//! Test runner
//!
//! Discovers `.tsar` scripts, gives each a fresh working directory and
//! seeded environment, runs it, and reports through a [`TestingT`].

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use crate::conditions::ConditionFn;
use crate::engine::{BoxedCmd, Engine, DEFAULT_KILL_GRACE};
use crate::error::{ErrorKind, ScriptError};
use crate::reporter::{CaptureT, TestingT};
use crate::state::State;

/// Script file extension
pub const SCRIPT_EXT: &str = "tsar";

/// Called before each script with its working directory and environment.
pub type SetupFn = Box<dyn Fn(&mut Env) -> anyhow::Result<()> + Send + Sync>;

/// The environment handed to a setup hook
pub struct Env {
    /// The script's working directory, `$WORK`
    pub work_dir: PathBuf,
    /// Environment variables the script will start with
    pub values: Vec<(String, String)>,
}

impl Env {
    pub fn getenv(&self, key: &str) -> Option<&str> {
        self.values
            .iter()
            .rev()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn setenv(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        match self.values.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.values.push((key, value)),
        }
    }
}

/// Runner configuration
pub struct Params {
    /// Directory scanned (recursively) for `.tsar` files
    pub dir: PathBuf,
    /// Explicit scripts; when non-empty, `dir` is not scanned
    pub files: Vec<PathBuf>,
    /// Custom commands, consulted after the built-ins
    pub commands: Vec<(String, BoxedCmd)>,
    /// Replaces the built-in condition table
    pub condition: Option<ConditionFn>,
    pub setup: Option<SetupFn>,
    /// Parent of the per-script working directories; they are kept when set
    pub workdir_root: Option<PathBuf>,
    /// Keep working directories and log their paths
    pub test_work: bool,
    /// Value of the `[short]` condition
    pub short: bool,
    /// Unknown commands are errors instead of implicit `exec`
    pub require_explicit_exec: bool,
    /// Reject scripts that share a base name
    pub require_unique_names: bool,
    /// Keep running scripts after one fails
    pub continue_on_error: bool,
    /// Bound on every process wait
    pub wait_timeout: Option<Duration>,
    /// Time between interrupt and kill when a wait times out
    pub kill_grace: Duration,
    /// Log every script's execution log, not only failing ones
    pub verbose: bool,
}

impl Default for Params {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("testdata"),
            files: Vec::new(),
            commands: Vec::new(),
            condition: None,
            setup: None,
            workdir_root: None,
            test_work: false,
            short: false,
            require_explicit_exec: false,
            require_unique_names: false,
            continue_on_error: false,
            wait_timeout: None,
            kill_grace: DEFAULT_KILL_GRACE,
            verbose: false,
        }
    }
}

impl Params {
    /// Start building params for a script directory.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into(), ..Default::default() }
    }

    /// Run exactly these scripts instead of scanning `dir`.
    pub fn files(mut self, files: impl IntoIterator<Item = PathBuf>) -> Self {
        self.files = files.into_iter().collect();
        self
    }

    pub fn command(mut self, name: impl Into<String>, cmd: BoxedCmd) -> Self {
        self.commands.push((name.into(), cmd));
        self
    }

    pub fn condition(
        mut self,
        predicate: impl Fn(&str) -> Result<bool, String> + Send + Sync + 'static,
    ) -> Self {
        self.condition = Some(Box::new(predicate));
        self
    }

    pub fn setup(
        mut self,
        setup: impl Fn(&mut Env) -> anyhow::Result<()> + Send + Sync + 'static,
    ) -> Self {
        self.setup = Some(Box::new(setup));
        self
    }

    pub fn workdir_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.workdir_root = Some(root.into());
        self
    }

    pub fn test_work(mut self, keep: bool) -> Self {
        self.test_work = keep;
        self
    }

    pub fn short(mut self, short: bool) -> Self {
        self.short = short;
        self
    }

    pub fn require_explicit_exec(mut self, require: bool) -> Self {
        self.require_explicit_exec = require;
        self
    }

    pub fn require_unique_names(mut self, require: bool) -> Self {
        self.require_unique_names = require;
        self
    }

    pub fn continue_on_error(mut self, cont: bool) -> Self {
        self.continue_on_error = cont;
        self
    }

    pub fn wait_timeout(mut self, timeout: Duration) -> Self {
        self.wait_timeout = Some(timeout);
        self
    }

    pub fn kill_grace(mut self, grace: Duration) -> Self {
        self.kill_grace = grace;
        self
    }

    pub fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }
}

/// Result of running a suite
#[derive(Debug)]
pub struct TestResult {
    /// Individual test case results
    pub cases: Vec<TestCaseResult>,
    /// Total duration
    pub duration: Duration,
}

impl TestResult {
    /// Check if all tests passed
    pub fn all_passed(&self) -> bool {
        self.cases.iter().all(|c| c.passed || c.skipped)
    }

    pub fn passed_count(&self) -> usize {
        self.cases.iter().filter(|c| c.passed && !c.skipped).count()
    }

    pub fn failed_count(&self) -> usize {
        self.cases.iter().filter(|c| !c.passed && !c.skipped).count()
    }

    pub fn skipped_count(&self) -> usize {
        self.cases.iter().filter(|c| c.skipped).count()
    }

    /// Format a summary line
    pub fn summary(&self) -> String {
        format!(
            "{} passed, {} failed, {} skipped ({}ms)",
            self.passed_count(),
            self.failed_count(),
            self.skipped_count(),
            self.duration.as_millis(),
        )
    }
}

/// Result of a single script
#[derive(Debug)]
pub struct TestCaseResult {
    /// Test name (file name without extension)
    pub name: String,
    /// Source file path
    pub file: PathBuf,
    pub passed: bool,
    pub skipped: bool,
    /// Failure or skip message
    pub error: Option<String>,
    /// Execution log
    pub log: String,
    pub duration: Duration,
    /// Working directory, if it was kept
    pub workdir: Option<PathBuf>,
}

/// The test runner
pub struct TestRunner {
    engine: Engine,
    dir: PathBuf,
    files: Vec<PathBuf>,
    setup: Option<SetupFn>,
    workdir_root: Option<PathBuf>,
    keep_work: bool,
    require_unique_names: bool,
    continue_on_error: bool,
    verbose: bool,
}

impl TestRunner {
    /// Build the engine once from `params`; it is shared by every script.
    pub fn new(params: Params) -> Self {
        let mut engine = Engine::with_short(params.short);
        engine.require_explicit_exec = params.require_explicit_exec;
        engine.wait_timeout = params.wait_timeout;
        engine.kill_grace = params.kill_grace;
        if let Some(predicate) = params.condition {
            engine.set_condition(predicate);
        }
        for (name, cmd) in params.commands {
            engine.register_command(name, cmd);
        }

        Self {
            engine,
            dir: params.dir,
            files: params.files,
            setup: params.setup,
            keep_work: params.test_work || params.workdir_root.is_some(),
            workdir_root: params.workdir_root,
            require_unique_names: params.require_unique_names,
            continue_on_error: params.continue_on_error,
            verbose: params.verbose,
        }
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    /// The scripts this runner would execute, sorted.
    pub fn discover(&self) -> Result<Vec<PathBuf>, ScriptError> {
        let mut files = if self.files.is_empty() {
            if !self.dir.is_dir() {
                return Err(ScriptError::new(
                    ErrorKind::Io,
                    format!("test directory not found: {}", self.dir.display()),
                ));
            }
            let mut files = Vec::new();
            scan_dir(&self.dir, &mut files)?;
            files
        } else {
            self.files.clone()
        };
        files.sort();

        if self.require_unique_names {
            check_unique_names(&files)?;
        }
        Ok(files)
    }

    /// Run every discovered script.
    ///
    /// Discovery problems are returned before any script runs. Without
    /// `continue_on_error`, the first failing script ends the run.
    pub fn run_all(&self, t: &mut dyn TestingT) -> Result<TestResult, ScriptError> {
        let start = Instant::now();
        let files = self.discover()?;

        let mut cases = Vec::new();
        for file in &files {
            let case = self.run_one(t, file);
            let failed = !case.passed;
            cases.push(case);
            if failed && !self.continue_on_error {
                break;
            }
        }

        Ok(TestResult { cases, duration: start.elapsed() })
    }

    /// Run a single script and report its verdict.
    pub fn run_one(&self, t: &mut dyn TestingT, file: &Path) -> TestCaseResult {
        t.helper();
        let start = Instant::now();
        let name = test_name(file);
        t.logf(format_args!("=== RUN   {}", name));

        let mut case = TestCaseResult {
            name,
            file: file.to_path_buf(),
            passed: false,
            skipped: false,
            error: None,
            log: String::new(),
            duration: Duration::ZERO,
            workdir: None,
        };

        let outcome = match self.create_workdir(&case.name) {
            Ok(tmpdir) => {
                let workdir = tmpdir.path().to_path_buf();
                let mut state = State::new(workdir.clone());
                let result = self.execute_test(file, &mut state);
                case.log = std::mem::take(&mut state.log);
                drop(state);
                if self.keep_work {
                    case.workdir = Some(tmpdir.keep());
                    t.logf(format_args!("{}: work directory {}", case.name, workdir.display()));
                }
                result
            }
            Err(e) => Err(ScriptError::new(
                ErrorKind::Io,
                format!("failed to create work directory: {}", e),
            )),
        };
        case.duration = start.elapsed();
        let secs = case.duration.as_secs_f64();

        match outcome {
            Ok(()) => {
                case.passed = true;
                if self.verbose {
                    t.log(&case.log);
                }
                t.logf(format_args!("--- PASS: {} ({:.2}s)", case.name, secs));
                tracing::info!(test = %case.name, "pass");
            }
            Err(e) if e.is_skip() => {
                case.passed = true;
                case.skipped = true;
                if self.verbose {
                    t.log(&case.log);
                }
                t.logf(format_args!("--- SKIP: {} ({:.2}s)", case.name, secs));
                t.skip(&format!("{}: {}", case.name, e));
                tracing::info!(test = %case.name, reason = %e.message, "skip");
                case.error = Some(e.message);
            }
            Err(e) => {
                t.log(&case.log);
                t.logf(format_args!("--- FAIL: {} ({:.2}s)", case.name, secs));
                t.fatal(&e.to_string());
                tracing::info!(test = %case.name, error = %e, "fail");
                case.error = Some(e.to_string());
            }
        }
        case
    }

    fn execute_test(&self, file: &Path, state: &mut State) -> Result<(), ScriptError> {
        let script = std::fs::read_to_string(file).map_err(|e| {
            ScriptError::new(ErrorKind::Io, format!("failed to read {}: {}", file.display(), e))
        })?;
        std::fs::create_dir_all(state.temp_dir())?;

        if let Some(setup) = &self.setup {
            let mut env = Env {
                work_dir: state.workdir.clone(),
                values: state.environ().map(|(k, v)| (k.to_string(), v.to_string())).collect(),
            };
            setup(&mut env).map_err(|e| {
                ScriptError::new(ErrorKind::Io, format!("setup failed: {:#}", e))
            })?;
            for (k, v) in env.values {
                state.setenv(k, v);
            }
        }

        let filename = file.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
        self.engine.execute(state, &script, &filename)
    }

    fn create_workdir(&self, name: &str) -> std::io::Result<tempfile::TempDir> {
        let prefix = format!("tsar-{}-", name);
        match &self.workdir_root {
            Some(root) => {
                std::fs::create_dir_all(root)?;
                tempfile::Builder::new().prefix(&prefix).tempdir_in(root)
            }
            None => tempfile::Builder::new().prefix(&prefix).tempdir(),
        }
    }
}

fn test_name(file: &Path) -> String {
    file.file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("unknown")
        .to_string()
}

fn scan_dir(dir: &Path, files: &mut Vec<PathBuf>) -> Result<(), ScriptError> {
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            scan_dir(&path, files)?;
        } else if path.extension().is_some_and(|ext| ext == SCRIPT_EXT) {
            files.push(path);
        }
    }
    Ok(())
}

fn check_unique_names(files: &[PathBuf]) -> Result<(), ScriptError> {
    let mut seen: HashMap<String, &Path> = HashMap::new();
    for file in files {
        let name = test_name(file);
        if let Some(first) = seen.get(&name) {
            return Err(ScriptError::new(
                ErrorKind::DuplicateName,
                format!(
                    "duplicate test name {:?}: {} and {}",
                    name,
                    first.display(),
                    file.display()
                ),
            ));
        }
        seen.insert(name, file);
    }
    Ok(())
}

/// Run a suite, reporting everything through `t`.
///
/// Problems found before any script runs are reported with `fatal` and
/// yield an empty result.
pub fn run(t: &mut dyn TestingT, params: Params) -> TestResult {
    let runner = TestRunner::new(params);
    match runner.run_all(t) {
        Ok(result) => {
            t.log(&result.summary());
            result
        }
        Err(e) => {
            t.fatal(&e.to_string());
            TestResult { cases: Vec::new(), duration: Duration::ZERO }
        }
    }
}

/// Run the scripts in `dir` from a `#[test]`, panicking on failure.
///
/// ```rust,ignore
/// #[test]
/// fn scripts() {
///     tsar::run_and_assert("tests/testscript");
/// }
/// ```
pub fn run_and_assert(dir: impl Into<PathBuf>) {
    run_and_assert_with(Params::new(dir));
}

/// Like [`run_and_assert`] with full control over the params.
///
/// `TSAR_VERBOSE` and `TSAR_TEST_WORK` in the environment turn on verbose
/// logs and kept work directories.
pub fn run_and_assert_with(mut params: Params) {
    params.verbose |= std::env::var_os("TSAR_VERBOSE").is_some();
    params.test_work |= std::env::var_os("TSAR_TEST_WORK").is_some();

    let mut t = CaptureT::echo();
    let result = run(&mut t, params);
    if t.failed() {
        panic!(
            "{} script(s) failed:\n{}",
            result.failed_count().max(1),
            t.failures.join("\n")
        );
    }
}
