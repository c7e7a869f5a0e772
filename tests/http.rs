//! HTTP scenarios against a local fixture server
//!
//! Each test starts its own server and hands its base URL to the scripts
//! as `$SERVER` through a setup hook.

use std::io::{BufRead, BufReader, Read, Write};
use std::net::{TcpListener, TcpStream};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;

use tsar::{CaptureT, Env, Params, TestResult};

/// A tiny HTTP/1.1 server.
///
/// Routes:
/// - `GET /health` → 200 `ok`, with `X-Service: fixture`
/// - `/missing` → 404
/// - `/flaky` → 500 on every third call, 200 otherwise
/// - `/token` → 200, body is the request's `X-Token` header
/// - `POST /echo` → 200, body echoed, content type in `X-Echo-Type`
struct Fixture {
    base: String,
}

impl Fixture {
    fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        let calls = Arc::new(AtomicUsize::new(0));
        thread::spawn(move || {
            for stream in listener.incoming() {
                let Ok(stream) = stream else { continue };
                let calls = Arc::clone(&calls);
                thread::spawn(move || handle(stream, &calls));
            }
        });
        Self { base }
    }
}

fn handle(stream: TcpStream, flaky_calls: &AtomicUsize) {
    let mut reader = BufReader::new(stream.try_clone().unwrap());
    let mut request_line = String::new();
    if reader.read_line(&mut request_line).unwrap_or(0) == 0 {
        return;
    }
    let mut parts = request_line.split_whitespace();
    let method = parts.next().unwrap_or("").to_string();
    let path = parts.next().unwrap_or("").to_string();

    let mut headers = Vec::new();
    loop {
        let mut line = String::new();
        if reader.read_line(&mut line).unwrap_or(0) == 0 {
            break;
        }
        let line = line.trim_end();
        if line.is_empty() {
            break;
        }
        if let Some((k, v)) = line.split_once(':') {
            headers.push((k.trim().to_ascii_lowercase(), v.trim().to_string()));
        }
    }
    let header = |name: &str| {
        headers
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.clone())
    };

    let length: usize = header("content-length").and_then(|v| v.parse().ok()).unwrap_or(0);
    let mut body = vec![0; length];
    reader.read_exact(&mut body).unwrap();

    let (status, reason, extra, reply) = match (method.as_str(), path.as_str()) {
        ("GET", "/health") => (200, "OK", vec![("X-Service", "fixture".to_string())], b"ok\n".to_vec()),
        (_, "/flaky") => {
            let n = flaky_calls.fetch_add(1, Ordering::SeqCst) + 1;
            if n % 3 == 0 {
                (500, "Internal Server Error", vec![], b"flaked\n".to_vec())
            } else {
                (200, "OK", vec![], b"fine\n".to_vec())
            }
        }
        (_, "/token") => {
            let token = header("x-token").unwrap_or_default();
            (200, "OK", vec![], format!("token={}\n", token).into_bytes())
        }
        ("POST", "/echo") => {
            let kind = header("content-type").unwrap_or_default();
            (200, "OK", vec![("X-Echo-Type", kind)], body)
        }
        _ => (404, "Not Found", vec![], b"not found\n".to_vec()),
    };

    let mut out = stream;
    let mut head = format!(
        "HTTP/1.1 {} {}\r\nContent-Length: {}\r\nContent-Type: text/plain\r\nConnection: close\r\n",
        status,
        reason,
        reply.len()
    );
    for (k, v) in extra {
        head.push_str(&format!("{}: {}\r\n", k, v));
    }
    head.push_str("\r\n");
    let _ = out.write_all(head.as_bytes());
    let _ = out.write_all(&reply);
    let _ = out.flush();
}

/// Run one script against a fresh fixture server.
fn run_script(script: &str) -> (TestResult, CaptureT) {
    let fixture = Fixture::start();
    let dir = tempfile::tempdir().unwrap();
    write_script(dir.path(), "scenario.tsar", script);

    let base = fixture.base.clone();
    let params = Params::new(dir.path()).setup(move |env: &mut Env| {
        env.setenv("SERVER", base.clone());
        Ok(())
    });
    let mut t = CaptureT::new();
    let result = tsar::run(&mut t, params);
    (result, t)
}

fn write_script(dir: &Path, name: &str, script: &str) {
    std::fs::write(dir.join(name), script).unwrap();
}

fn assert_passes(script: &str) -> TestResult {
    let (result, t) = run_script(script);
    assert!(result.all_passed(), "failures: {:?}\nlog:\n{}", t.failures, result.cases[0].log);
    result
}

fn assert_fails(script: &str) -> (TestResult, String) {
    let (result, t) = run_script(script);
    assert_eq!(result.failed_count(), 1, "expected failure, log:\n{}", result.cases[0].log);
    (result, t.failures.join("\n"))
}

#[test]
fn health_check() {
    let result = assert_passes(
        "http GET $SERVER/health\nhttpstatus 200\nstdout ok\nhttpheader x-service fixture\nhttpheader Content-Type text\n",
    );
    assert!(result.cases[0].log.contains("[status 200]"));
}

#[test]
fn non_success_status_fails_the_line() {
    let (_, failures) = assert_fails("http GET $SERVER/missing\nhttpstatus 200\n");
    assert!(failures.contains("scenario.tsar:1"), "{}", failures);
    assert!(failures.contains("status 404"), "{}", failures);
}

#[test]
fn negated_request_keeps_response_for_assertions() {
    assert_passes("! http GET $SERVER/missing\nhttpstatus 404\nstdout \"not found\"\n! httpstatus 200\n");
}

#[test]
fn status_mismatch_fails() {
    let (_, failures) = assert_fails("http GET $SERVER/health\nhttpstatus 201\n");
    assert!(failures.contains("scenario.tsar:2"), "{}", failures);
    assert!(failures.contains("status is 200, want 201"), "{}", failures);
}

#[test]
fn missing_header_fails() {
    let (_, failures) = assert_fails("http GET $SERVER/health\nhttpheader X-Absent anything\n");
    assert!(failures.contains("not present"), "{}", failures);
}

#[test]
fn assertions_before_any_request_fail() {
    let (_, failures) = assert_fails("httpstatus 200\n");
    assert!(failures.contains("before any http request"), "{}", failures);

    let (_, failures) = assert_fails("! httpheader X-Service fixture\n");
    assert!(failures.contains("before any http request"), "{}", failures);
}

#[test]
fn transport_failure_leaves_no_response() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let script = format!("! http GET http://{}/health\n! httpstatus 200\n", addr);
    let (_, failures) = assert_fails(&script);
    assert!(failures.contains("scenario.tsar:2"), "{}", failures);
    assert!(failures.contains("no response retained"), "{}", failures);
}

#[test]
fn request_headers_are_sent() {
    assert_passes("http GET $SERVER/token -header \"X-Token: s3cret\"\nstdout token=s3cret\n");
}

#[test]
fn malformed_header_is_a_usage_error() {
    let (_, failures) = assert_fails("! http GET $SERVER/token -header no-colon\n");
    assert!(failures.contains("malformed header"), "{}", failures);
}

#[test]
fn post_body_from_file() {
    assert_passes(
        "mkdir data\nhttp GET $SERVER/health\ncp stdout data/payload.txt\nhttp post $SERVER/echo -body data/payload.txt -header \"Content-Type: application/json\"\nstdout ok\nhttpheader X-Echo-Type application/json\n",
    );
}

#[test]
fn flaky_endpoint_tally() {
    let result = assert_passes(
        "repeat -all 9 http GET $SERVER/flaky\nstderr \"6/9 passed\"\nstderr \"3/9 failed\"\nstderr \"first failure: iteration 3\"\n",
    );
    assert!(result.cases[0].log.contains("[iteration 3:"));
}

#[test]
fn flaky_endpoint_tally_negated_asserts_a_failure() {
    assert_passes("! repeat -all 9 http GET $SERVER/flaky\nstderr \"3/9 failed\"\n");

    let (_, failures) = assert_fails("! repeat -all 4 http GET $SERVER/health\n");
    assert!(failures.contains("succeeded unexpectedly"), "{}", failures);
}

#[test]
fn flaky_endpoint_tally_keeps_running_the_script() {
    let result = assert_passes(
        "repeat -all 3 http GET $SERVER/flaky\nstderr \"2/3 passed\"\nhttp GET $SERVER/health\nhttpstatus 200\n",
    );
    assert!(result.cases[0].log.contains("[status 200]"));
}

#[test]
fn flaky_endpoint_without_all_stops_early() {
    assert_passes(
        "! repeat 9 http GET $SERVER/flaky\nstderr \"2/9 passed\"\nstderr \"1/9 failed\"\n",
    );
}

#[test]
fn repeated_requests_all_pass() {
    assert_passes("repeat 5 http GET $SERVER/health\nstderr \"5/5 passed\"\n");
}

#[test]
fn repeat_rejects_other_verbs() {
    let (_, failures) = assert_fails("repeat 3 env A=1\n");
    assert!(failures.contains("repeat supports only exec and http"), "{}", failures);

    let (_, failures) = assert_fails("! repeat 3 stdout x\n");
    assert!(failures.contains("repeat supports only exec and http"), "{}", failures);
}

#[test]
fn repeat_rejects_bad_counts() {
    let (_, failures) = assert_fails("repeat 0 http GET $SERVER/health\n");
    assert!(failures.contains("invalid repeat count"), "{}", failures);
}

#[cfg(unix)]
#[test]
fn background_job_output_after_requests() {
    assert_passes(
        "exec sh -c \"sleep 0.1; echo served\" &srv\nhttp GET $SERVER/health\nhttpstatus 200\nwait srv\nstdout served\n",
    );
}
