//! File operation commands: exists, cp, mkdir, rm, chmod

use std::path::Path;

use crate::engine::{outcome, Cmd, CmdResult, CmdUsage, Engine};
use crate::error::{ErrorKind, ScriptError};
use crate::state::State;

// ──────────────────────────────────────────────────────────
// exists — check if files exist
// ──────────────────────────────────────────────────────────

pub(super) struct ExistsCmd;

impl Cmd for ExistsCmd {
    fn run(
        &self,
        _engine: &Engine,
        state: &mut State,
        neg: bool,
        args: &[String],
    ) -> Result<CmdResult, ScriptError> {
        let mut check_readonly = false;
        let mut check_exec = false;
        let mut files: Vec<&str> = Vec::new();

        // Flags must come before file arguments.
        let mut parsing_flags = true;
        for arg in args {
            if parsing_flags {
                match arg.as_str() {
                    "-readonly" => { check_readonly = true; continue; }
                    "-exec" => { check_exec = true; continue; }
                    _ => parsing_flags = false,
                }
            }
            files.push(arg);
        }
        if files.is_empty() {
            return Err(ScriptError::usage("exists", "[-readonly] [-exec] file..."));
        }

        // Under `!` every file must be absent; otherwise each must exist
        // and pass the requested checks.
        for file in &files {
            let path = state.resolve_path(file);
            let meta = std::fs::metadata(&path);

            if neg {
                if meta.is_ok() {
                    return Err(ScriptError::new(
                        ErrorKind::UnexpectedSuccess,
                        format!("{} exists", file),
                    ));
                }
                continue;
            }

            let meta = meta.map_err(|_| ScriptError::mismatch(format!("{} does not exist", file)))?;
            if check_readonly && !meta.permissions().readonly() {
                return Err(ScriptError::mismatch(format!("{} exists but is writable", file)));
            }
            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                if check_exec && meta.permissions().mode() & 0o111 == 0 {
                    return Err(ScriptError::mismatch(format!(
                        "{} exists but is not executable",
                        file
                    )));
                }
            }
            #[cfg(not(unix))]
            let _ = check_exec;
        }

        if neg {
            state.logf(&format!("[{} absent]", files.join(" ")));
        }
        Ok(CmdResult::Ok)
    }

    fn usage(&self) -> CmdUsage {
        CmdUsage {
            summary: "Check that files exist".into(),
            args: "[-readonly] [-exec] file...".into(),
        }
    }
}

// ──────────────────────────────────────────────────────────
// cp — copy files
// ──────────────────────────────────────────────────────────

pub(super) struct CpCmd;

impl Cmd for CpCmd {
    fn run(
        &self,
        _engine: &Engine,
        state: &mut State,
        neg: bool,
        args: &[String],
    ) -> Result<CmdResult, ScriptError> {
        let Some((dst, srcs)) = args.split_last().filter(|(_, srcs)| !srcs.is_empty()) else {
            return Err(ScriptError::usage("cp", "src... dst"));
        };
        let raw = copy_files(state, srcs, dst);
        outcome(state, neg, raw)
    }

    fn usage(&self) -> CmdUsage {
        CmdUsage {
            summary: "Copy files; stdout and stderr name the last captured output".into(),
            args: "src... dst".into(),
        }
    }
}

fn copy_files(state: &State, srcs: &[String], dst: &str) -> Result<(), ScriptError> {
    let dst_path = state.resolve_path(dst);
    let dst_is_dir = dst_path.is_dir();

    if srcs.len() > 1 && !dst_is_dir {
        return Err(ScriptError::failed(format!("destination {} is not a directory", dst)));
    }

    for src in srcs {
        let (data, mode) = match src.as_str() {
            "stdout" => (state.stdout.as_bytes().to_vec(), None),
            "stderr" => (state.stderr.as_bytes().to_vec(), None),
            _ => {
                let src_path = state.resolve_path(src);
                let data = std::fs::read(&src_path)
                    .map_err(|e| ScriptError::failed(format!("{}: {}", src, e)))?;
                (data, file_mode(&src_path))
            }
        };

        let target = if dst_is_dir {
            let name = Path::new(src)
                .file_name()
                .unwrap_or_else(|| std::ffi::OsStr::new(src.as_str()));
            dst_path.join(name)
        } else {
            dst_path.clone()
        };

        std::fs::write(&target, &data)
            .map_err(|e| ScriptError::failed(format!("write {}: {}", target.display(), e)))?;

        if let Some(mode) = mode {
            set_mode(&target, mode)
                .map_err(|e| ScriptError::failed(format!("chmod {}: {}", target.display(), e)))?;
        }
    }
    Ok(())
}

#[cfg(unix)]
fn file_mode(path: &Path) -> Option<u32> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::metadata(path).ok().map(|m| m.permissions().mode() & 0o777)
}

#[cfg(not(unix))]
fn file_mode(_path: &Path) -> Option<u32> {
    None
}

// ──────────────────────────────────────────────────────────
// mkdir — create directories
// ──────────────────────────────────────────────────────────

pub(super) struct MkdirCmd;

impl Cmd for MkdirCmd {
    fn run(
        &self,
        _engine: &Engine,
        state: &mut State,
        neg: bool,
        args: &[String],
    ) -> Result<CmdResult, ScriptError> {
        if args.is_empty() {
            return Err(ScriptError::usage("mkdir", "dir..."));
        }

        let raw = args.iter().try_for_each(|dir| {
            std::fs::create_dir_all(state.resolve_path(dir))
                .map_err(|e| ScriptError::failed(format!("{}: {}", dir, e)))
        });
        outcome(state, neg, raw)
    }

    fn usage(&self) -> CmdUsage {
        CmdUsage {
            summary: "Create directories and their parents".into(),
            args: "dir...".into(),
        }
    }
}

// ──────────────────────────────────────────────────────────
// rm — remove files/directories
// ──────────────────────────────────────────────────────────

pub(super) struct RmCmd;

impl Cmd for RmCmd {
    fn run(
        &self,
        _engine: &Engine,
        state: &mut State,
        neg: bool,
        args: &[String],
    ) -> Result<CmdResult, ScriptError> {
        if args.is_empty() {
            return Err(ScriptError::usage("rm", "path..."));
        }

        // Missing paths are not an error.
        let raw = args.iter().try_for_each(|arg| {
            let path = state.resolve_path(arg);
            let removed = match std::fs::symlink_metadata(&path) {
                Ok(meta) if meta.is_dir() => std::fs::remove_dir_all(&path),
                Ok(_) => std::fs::remove_file(&path),
                Err(_) => Ok(()),
            };
            removed.map_err(|e| ScriptError::failed(format!("{}: {}", arg, e)))
        });
        outcome(state, neg, raw)
    }

    fn usage(&self) -> CmdUsage {
        CmdUsage {
            summary: "Remove files or directories recursively".into(),
            args: "path...".into(),
        }
    }
}

// ──────────────────────────────────────────────────────────
// chmod — change file mode bits
// ──────────────────────────────────────────────────────────

pub(super) struct ChmodCmd;

impl Cmd for ChmodCmd {
    fn run(
        &self,
        _engine: &Engine,
        state: &mut State,
        neg: bool,
        args: &[String],
    ) -> Result<CmdResult, ScriptError> {
        let Some((perm, paths)) = args.split_first().filter(|(_, paths)| !paths.is_empty()) else {
            return Err(ScriptError::usage("chmod", "perm path..."));
        };

        let mode = u32::from_str_radix(perm.trim_start_matches("0o"), 8)
            .ok()
            .filter(|m| m & 0o777 == *m)
            .ok_or_else(|| {
                ScriptError::new(ErrorKind::UsageError, format!("invalid mode: {}", perm))
            })?;

        let raw = paths.iter().try_for_each(|arg| {
            set_mode(&state.resolve_path(arg), mode)
                .map_err(|e| ScriptError::failed(format!("{}: {}", arg, e)))
        });
        outcome(state, neg, raw)
    }

    fn usage(&self) -> CmdUsage {
        CmdUsage {
            summary: "Change file mode bits (octal)".into(),
            args: "perm path...".into(),
        }
    }
}

#[cfg(unix)]
fn set_mode(path: &Path, mode: u32) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode))
}

// Only the read-only bit can be expressed elsewhere.
#[cfg(not(unix))]
fn set_mode(path: &Path, mode: u32) -> std::io::Result<()> {
    let mut perms = std::fs::metadata(path)?.permissions();
    perms.set_readonly(mode & 0o222 == 0);
    std::fs::set_permissions(path, perms)
}
