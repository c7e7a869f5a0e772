//! Integration test: run the scripts under `tests/testscript/`
//!
//! Usage:
//!   cargo test --test integration
//!   TSAR_VERBOSE=1 cargo test --test integration   # print every script log
//!   TSAR_TEST_WORK=1 cargo test --test integration # keep working directories

use std::path::PathBuf;

use tsar::{CaptureT, FnCmd, Params, ScriptError, State, TestingT};

fn script_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/testscript")
}

#[test]
fn testscript_all() {
    tsar::run_and_assert(script_dir());
}

#[test]
fn testscript_unique_names() {
    let mut t = CaptureT::new();
    let result = tsar::run(&mut t, Params::new(script_dir()).require_unique_names(true));
    assert!(!t.failed(), "{:?}", t.failures);
    assert!(result.cases.len() >= 7);
}

fn write_script(dir: &std::path::Path, name: &str, script: &str) {
    std::fs::write(dir.join(name), script).unwrap();
}

#[test]
fn custom_command_and_condition() {
    let dir = tempfile::tempdir().unwrap();
    write_script(
        dir.path(),
        "custom.tsar",
        "[feature] upper hello\n[feature] stdout HELLO\n[!feature] stop\n! upper\n",
    );

    let upper = FnCmd::new("uppercase args into stdout", "word...", |state: &mut State, args: &[String]| {
        if args.is_empty() {
            return Err(ScriptError::failed("nothing to uppercase"));
        }
        state.stdout = format!("{}\n", args.join(" ").to_uppercase());
        Ok(())
    });
    let params = Params::new(dir.path())
        .command("upper", Box::new(upper))
        .condition(|tag| match tag {
            "feature" => Ok(true),
            other => Err(format!("unknown condition {:?}", other)),
        });

    let mut t = CaptureT::new();
    let result = tsar::run(&mut t, params);
    assert!(result.all_passed(), "{:?}", t.failures);
}

#[test]
fn unknown_condition_under_predicate_fails() {
    let dir = tempfile::tempdir().unwrap();
    write_script(dir.path(), "cond.tsar", "[unix] env A=1\n");

    let params = Params::new(dir.path()).condition(|tag| match tag {
        "feature" => Ok(true),
        other => Err(format!("unknown condition {:?}", other)),
    });
    let mut t = CaptureT::new();
    let result = tsar::run(&mut t, params);
    assert_eq!(result.failed_count(), 1);
    assert!(t.failures[0].contains("cond.tsar:1"), "{:?}", t.failures);
}

#[test]
fn require_explicit_exec_rejects_bare_programs() {
    let dir = tempfile::tempdir().unwrap();
    write_script(dir.path(), "bare.tsar", "true\n");

    let mut t = CaptureT::new();
    let result = tsar::run(&mut t, Params::new(dir.path()).require_explicit_exec(true));
    assert_eq!(result.failed_count(), 1);
    assert!(t.failures[0].contains("unknown command"), "{:?}", t.failures);
}

#[cfg(unix)]
#[test]
fn duplicate_background_name_fails() {
    let dir = tempfile::tempdir().unwrap();
    write_script(
        dir.path(),
        "dup.tsar",
        "exec sleep 5 &srv\nexec sleep 5 &srv\n",
    );

    let mut t = CaptureT::new();
    let params = Params::new(dir.path()).kill_grace(std::time::Duration::from_millis(200));
    let result = tsar::run(&mut t, params);
    assert_eq!(result.failed_count(), 1);
    assert!(t.failures[0].contains("dup.tsar:2"), "{:?}", t.failures);
    assert!(t.failures[0].contains("srv"), "{:?}", t.failures);
}

#[cfg(unix)]
#[test]
fn wait_timeout_kills_stuck_process() {
    let dir = tempfile::tempdir().unwrap();
    write_script(dir.path(), "stuck.tsar", "exec sleep 30\n");

    let params = Params::new(dir.path())
        .wait_timeout(std::time::Duration::from_millis(200))
        .kill_grace(std::time::Duration::from_millis(200));
    let start = std::time::Instant::now();
    let mut t = CaptureT::new();
    let result = tsar::run(&mut t, params);
    assert_eq!(result.failed_count(), 1);
    assert!(start.elapsed() < std::time::Duration::from_secs(10));
}

#[cfg(unix)]
#[test]
fn failing_line_reports_location_and_log() {
    let dir = tempfile::tempdir().unwrap();
    write_script(
        dir.path(),
        "fail.tsar",
        "# setup\nexec sh -c \"echo actual\"\nstdout expected\n",
    );

    let mut t = CaptureT::new();
    let result = tsar::run(&mut t, Params::new(dir.path()));
    assert_eq!(result.failed_count(), 1);
    let case = &result.cases[0];
    assert!(case.error.as_deref().unwrap().contains("fail.tsar:3"));
    assert!(case.log.contains("> exec sh -c"));
    assert!(case.log.contains("actual"));
    assert!(t.output().contains("--- FAIL: fail"));
}

#[cfg(unix)]
#[test]
fn wait_timeout_covers_grandchildren() {
    let dir = tempfile::tempdir().unwrap();
    write_script(dir.path(), "grand.tsar", "exec sh -c \"sleep 6; echo late\"\n");

    let params = Params::new(dir.path())
        .wait_timeout(std::time::Duration::from_millis(200))
        .kill_grace(std::time::Duration::from_millis(200));
    let start = std::time::Instant::now();
    let mut t = CaptureT::new();
    let result = tsar::run(&mut t, params);
    assert_eq!(result.failed_count(), 1);
    assert!(start.elapsed() < std::time::Duration::from_secs(3), "took {:?}", start.elapsed());
    assert!(t.failures[0].contains("timed out"), "{:?}", t.failures);
}

#[cfg(unix)]
#[test]
fn unjoined_jobs_are_stopped_promptly() {
    let dir = tempfile::tempdir().unwrap();
    write_script(dir.path(), "left.tsar", "exec sh -c \"sleep 6; echo late\" &j\n");

    let params = Params::new(dir.path()).kill_grace(std::time::Duration::from_millis(200));
    let start = std::time::Instant::now();
    let mut t = CaptureT::new();
    let result = tsar::run(&mut t, params);
    assert!(result.all_passed(), "{:?}", t.failures);
    assert!(start.elapsed() < std::time::Duration::from_secs(3), "took {:?}", start.elapsed());
    assert!(result.cases[0].log.contains("[terminating background jobs: j]"));
}

#[cfg(unix)]
#[test]
fn one_mismatched_job_fails_wait() {
    let dir = tempfile::tempdir().unwrap();
    write_script(
        dir.path(),
        "mixed.tsar",
        "exec sh -c \"echo fine\" &good\nexec sh -c \"exit 4\" &bad\n! exec true &odd\nwait\n",
    );

    let mut t = CaptureT::new();
    let result = tsar::run(&mut t, Params::new(dir.path()));
    assert_eq!(result.failed_count(), 1);
    let failure = &t.failures[0];
    assert!(failure.contains("mixed.tsar:4"), "{}", failure);
    assert!(failure.contains("bad: exit status 4"), "{}", failure);
    assert!(failure.contains("odd: unexpected command success"), "{}", failure);
    assert!(!failure.contains("good"), "{}", failure);
    assert!(result.cases[0].log.contains("fine"));
}

#[cfg(unix)]
#[test]
fn background_start_clears_last_output() {
    let dir = tempfile::tempdir().unwrap();
    write_script(
        dir.path(),
        "clear.tsar",
        "exec sh -c \"echo hi; echo there >&2\"\nexec sh -c \"exit 0\" &j\n! stdout hi\n! stderr there\nwait j\n",
    );

    let mut t = CaptureT::new();
    let result = tsar::run(&mut t, Params::new(dir.path()));
    assert!(result.all_passed(), "{:?}", t.failures);
}
