//! http / httpstatus / httpheader — HTTP requests and response assertions

use crate::engine::{outcome, Cmd, CmdResult, CmdUsage, Engine};
use crate::error::{ErrorKind, ScriptError};
use crate::http::{parse_header, HttpRequest, HttpResponse, HttpState};
use crate::state::State;

const HTTP_USAGE: &str = "method url [-body file] [-header \"Key: Value\"]...";

// ──────────────────────────────────────────────────────────
// http — send a request
// ──────────────────────────────────────────────────────────

pub(super) struct HttpCmd;

impl Cmd for HttpCmd {
    fn run(
        &self,
        _engine: &Engine,
        state: &mut State,
        neg: bool,
        args: &[String],
    ) -> Result<CmdResult, ScriptError> {
        let request = parse_request(state, args)?;

        let exchange = state.http.get_or_insert_with(HttpState::new).send(&request);
        let response = exchange.response.clone();

        let raw = match response {
            Ok(resp) => {
                let success = resp.success();
                state.stdout = resp.body;
                state.stderr.clear();
                state.logf(&format!("[status {}]", resp.status));
                state.log_output();
                if success {
                    Ok(())
                } else {
                    Err(ScriptError::failed(format!(
                        "{} {}: status {}",
                        request.method, request.url, resp.status
                    )))
                }
            }
            Err(err) => {
                state.stdout.clear();
                state.stderr.clear();
                Err(ScriptError::failed(format!("{} {}: {}", request.method, request.url, err)))
            }
        };
        outcome(state, neg, raw)
    }

    fn usage(&self) -> CmdUsage {
        CmdUsage {
            summary: "Send an HTTP request; the body becomes stdout, non-2xx fails".into(),
            args: HTTP_USAGE.into(),
        }
    }
}

fn parse_request(state: &State, args: &[String]) -> Result<HttpRequest, ScriptError> {
    let [method, url, flags @ ..] = args else {
        return Err(ScriptError::usage("http", HTTP_USAGE));
    };

    let mut request = HttpRequest {
        method: method.to_ascii_uppercase(),
        url: url.clone(),
        headers: Vec::new(),
        body: None,
    };

    let mut flags = flags.iter();
    while let Some(flag) = flags.next() {
        let value = flags.next().ok_or_else(|| ScriptError::usage("http", HTTP_USAGE))?;
        match flag.as_str() {
            "-body" => {
                let data = std::fs::read(state.resolve_path(value)).map_err(|e| {
                    ScriptError::new(ErrorKind::Io, format!("reading body {}: {}", value, e))
                })?;
                request.body = Some(data);
            }
            "-header" => {
                let header = parse_header(value).ok_or_else(|| {
                    ScriptError::new(
                        ErrorKind::UsageError,
                        format!("malformed header {:?}, want \"Key: Value\"", value),
                    )
                })?;
                request.headers.push(header);
            }
            _ => return Err(ScriptError::usage("http", HTTP_USAGE)),
        }
    }
    Ok(request)
}

/// The retained response, or a fatal error if there is none.
fn last_response<'a>(state: &'a State, cmd: &str) -> Result<&'a HttpResponse, ScriptError> {
    let exchange = state.http.as_ref().and_then(|h| h.last.as_ref()).ok_or_else(|| {
        ScriptError::new(ErrorKind::UsageError, format!("{} used before any http request", cmd))
    })?;
    exchange.response.as_ref().map_err(|err| {
        ScriptError::new(
            ErrorKind::UsageError,
            format!("no response retained: {} {} failed: {}", exchange.method, exchange.url, err),
        )
    })
}

// ──────────────────────────────────────────────────────────
// httpstatus — assert the last status code
// ──────────────────────────────────────────────────────────

pub(super) struct HttpStatusCmd;

impl Cmd for HttpStatusCmd {
    fn run(
        &self,
        _engine: &Engine,
        state: &mut State,
        neg: bool,
        args: &[String],
    ) -> Result<CmdResult, ScriptError> {
        let [code] = args else {
            return Err(ScriptError::usage("httpstatus", "code"));
        };
        let want: u16 = code.parse().map_err(|_| {
            ScriptError::new(ErrorKind::UsageError, format!("invalid status code {:?}", code))
        })?;

        let got = last_response(state, "httpstatus")?.status;
        let raw = if got == want {
            Ok(())
        } else {
            Err(ScriptError::mismatch(format!("status is {}, want {}", got, want)))
        };
        outcome(state, neg, raw)
    }

    fn usage(&self) -> CmdUsage {
        CmdUsage {
            summary: "Check the status code of the last http response".into(),
            args: "code".into(),
        }
    }
}

// ──────────────────────────────────────────────────────────
// httpheader — assert a header of the last response
// ──────────────────────────────────────────────────────────

pub(super) struct HttpHeaderCmd;

impl Cmd for HttpHeaderCmd {
    fn run(
        &self,
        _engine: &Engine,
        state: &mut State,
        neg: bool,
        args: &[String],
    ) -> Result<CmdResult, ScriptError> {
        let [name, want] = args else {
            return Err(ScriptError::usage("httpheader", "name value"));
        };

        let response = last_response(state, "httpheader")?;
        let values: Vec<&str> = response.header_values(name).collect();
        let raw = if values.iter().any(|v| v.contains(want.as_str())) {
            Ok(())
        } else if values.is_empty() {
            Err(ScriptError::mismatch(format!("header {} not present", name)))
        } else {
            Err(ScriptError::mismatch(format!(
                "header {} is {:?}, want it to contain {:?}",
                name,
                values.join(", "),
                want
            )))
        };
        outcome(state, neg, raw)
    }

    fn usage(&self) -> CmdUsage {
        CmdUsage {
            summary: "Check that a header of the last http response contains a value".into(),
            args: "name value".into(),
        }
    }
}
