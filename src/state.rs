//! Script execution state
//!
//! Holds mutable per-script state: working directory, environment variables,
//! last stdout/stderr, the execution log, background jobs and HTTP state.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::http::HttpState;
use crate::jobs::JobRegistry;

/// Value of the home variable in every script
pub const NO_HOME: &str = "/no-home";

#[cfg(windows)]
const HOME_VAR: &str = "USERPROFILE";
#[cfg(not(windows))]
const HOME_VAR: &str = "HOME";

#[cfg(windows)]
const TMP_VAR: &str = "TMP";
#[cfg(not(windows))]
const TMP_VAR: &str = "TMPDIR";

/// Mutable state for a single script execution
pub struct State {
    /// Initial working directory, `$WORK`
    pub workdir: PathBuf,
    /// Current working directory (changed by `cd`)
    pub pwd: PathBuf,
    /// Environment variables, ordered for a deterministic subprocess env
    env: Vec<(String, String)>,
    /// Key → position in `env`
    env_index: HashMap<String, usize>,
    /// Last command's stdout
    pub stdout: String,
    /// Last command's stderr
    pub stderr: String,
    /// Physical line currently executing (1-based, 0 before the first line)
    pub line: usize,
    /// Set when the script ended through `stop`
    pub stopped: bool,
    /// Execution log
    pub log: String,
    /// Live background jobs
    pub jobs: JobRegistry,
    /// Created by the first `http` command
    pub http: Option<HttpState>,
}

impl State {
    /// Create a new State rooted at `workdir` with the seeded environment.
    ///
    /// Only `PATH` is taken from the host; nothing else is inherited.
    pub fn new(workdir: PathBuf) -> Self {
        let pwd = workdir.clone();
        let mut state = Self {
            workdir,
            pwd,
            env: Vec::new(),
            env_index: HashMap::new(),
            stdout: String::new(),
            stderr: String::new(),
            line: 0,
            stopped: false,
            log: String::new(),
            jobs: JobRegistry::new(),
            http: None,
        };

        let work = state.workdir.to_string_lossy().into_owned();
        state.setenv("WORK", work);
        state.setenv("PATH", std::env::var("PATH").unwrap_or_default());
        state.setenv(HOME_VAR, NO_HOME);
        let tmp = state.temp_dir().to_string_lossy().into_owned();
        state.setenv(TMP_VAR, tmp);
        state.setenv("exe", if cfg!(windows) { ".exe" } else { "" });

        state
    }

    /// The per-script temp directory, `$WORK/tmp`. Created by the runner.
    pub fn temp_dir(&self) -> PathBuf {
        self.workdir.join("tmp")
    }

    /// Set an environment variable. The last write wins.
    ///
    /// On Windows, names are case-insensitive.
    pub fn setenv(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        let existing = self.find_env_key(&key).map(|k| self.env_index[k]);
        match existing {
            Some(idx) => self.env[idx].1 = value,
            None => {
                self.env_index.insert(key.clone(), self.env.len());
                self.env.push((key, value));
            }
        }
    }

    /// Get an environment variable.
    pub fn getenv(&self, key: &str) -> Option<&str> {
        self.find_env_key(key)
            .and_then(|k| self.env_index.get(k))
            .map(|&idx| self.env[idx].1.as_str())
    }

    fn find_env_key(&self, key: &str) -> Option<&str> {
        #[cfg(windows)]
        {
            self.env_index
                .keys()
                .find(|k| k.eq_ignore_ascii_case(key))
                .map(|k| k.as_str())
        }
        #[cfg(not(windows))]
        {
            self.env_index.get_key_value(key).map(|(k, _)| k.as_str())
        }
    }

    /// All environment variables in insertion order.
    pub fn environ(&self) -> impl Iterator<Item = (&str, &str)> {
        self.env.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Expand `$NAME` / `${NAME}`: script env first, then the process env.
    pub fn expand(&self, s: &str) -> String {
        crate::parser::expand_env(s, &|key| {
            self.getenv(key)
                .map(str::to_string)
                .or_else(|| std::env::var(key).ok())
        })
    }

    /// Resolve a path relative to the current working directory, cleaning
    /// `.` and `..` lexically.
    pub fn resolve_path(&self, path: &str) -> PathBuf {
        let p = Path::new(path);
        if p.is_absolute() {
            clean_path(p)
        } else {
            clean_path(&self.pwd.join(p))
        }
    }

    /// Change the current working directory.
    pub fn chdir(&mut self, dir: &str) -> Result<(), std::io::Error> {
        let new_pwd = self.resolve_path(dir);
        if !new_pwd.is_dir() {
            return Err(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("directory not found: {}", new_pwd.display()),
            ));
        }
        self.pwd = new_pwd;
        Ok(())
    }

    /// Append a line to the execution log.
    pub fn logf(&mut self, msg: &str) {
        self.log.push_str(msg);
        if !msg.ends_with('\n') {
            self.log.push('\n');
        }
    }

    /// Log captured output under `[stdout]` / `[stderr]` headers.
    pub fn log_output(&mut self) {
        if !self.stdout.is_empty() {
            let text = format!("[stdout]\n{}", self.stdout);
            self.logf(&text);
        }
        if !self.stderr.is_empty() {
            let text = format!("[stderr]\n{}", self.stderr);
            self.logf(&text);
        }
    }

    /// Read a file, treating "stdout" and "stderr" as the last captured output.
    /// Line endings are normalized to LF.
    pub fn read_file(&self, name: &str) -> Result<String, std::io::Error> {
        let content = match name {
            "stdout" => self.stdout.clone(),
            "stderr" => self.stderr.clone(),
            _ => std::fs::read_to_string(self.resolve_path(name))?,
        };
        Ok(content.replace("\r\n", "\n"))
    }
}

/// Clean a path by resolving `.` and `..` components lexically.
///
/// Unlike `canonicalize()`, the path does not need to exist.
pub fn clean_path(path: &Path) -> PathBuf {
    use std::path::Component;

    let mut components = Vec::new();
    let mut has_root = false;
    let mut prefix: Option<Component> = None;

    for component in path.components() {
        match component {
            Component::RootDir => {
                has_root = true;
                components.clear();
            }
            Component::Prefix(_) => {
                prefix = Some(component);
                components.clear();
            }
            Component::CurDir => {}
            // `..` above the root stays at the root
            Component::ParentDir => {
                if matches!(components.last(), Some(Component::Normal(_))) {
                    components.pop();
                } else if !has_root {
                    components.push(component);
                }
            }
            Component::Normal(_) => components.push(component),
        }
    }

    if components.is_empty() && !has_root && prefix.is_none() {
        return PathBuf::from(".");
    }

    let mut result = PathBuf::new();
    if let Some(p) = prefix {
        result.push(p);
    }
    if has_root {
        result.push(std::path::MAIN_SEPARATOR.to_string());
    }
    for c in &components {
        result.push(c);
    }
    result
}
