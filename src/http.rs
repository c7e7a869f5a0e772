//! HTTP request state
//!
//! One request at a time through a blocking `ureq` agent. The last exchange
//! is kept on the script state so `httpstatus` and `httpheader` can assert
//! against it, and its body is copied into the script's stdout.

use ureq::Agent;

/// A request as described by an `http` script line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    pub method: String,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<Vec<u8>>,
}

/// A received response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    /// Header names are lowercase, as received
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl HttpResponse {
    pub fn success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// All values of a header, matched case-insensitively.
    pub fn header_values<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.headers
            .iter()
            .filter(move |(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// The most recent request and what came back from it
#[derive(Debug, Clone)]
pub struct HttpExchange {
    pub method: String,
    pub url: String,
    /// `Err` holds the transport failure (connection refused, bad URL, ...)
    pub response: Result<HttpResponse, String>,
}

/// Per-script HTTP state, created by the first `http` command.
pub struct HttpState {
    agent: Agent,
    pub last: Option<HttpExchange>,
}

impl Default for HttpState {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpState {
    pub fn new() -> Self {
        // Non-2xx statuses are outcomes to assert on, not transport errors.
        let agent: Agent = Agent::config_builder()
            .http_status_as_error(false)
            .build()
            .into();
        Self { agent, last: None }
    }

    /// Perform `request`, replacing the retained exchange.
    pub fn send(&mut self, request: &HttpRequest) -> &HttpExchange {
        tracing::debug!(method = %request.method, url = %request.url, "http request");
        let response = perform(&self.agent, request);
        if let Err(ref e) = response {
            tracing::debug!(error = %e, "http transport failure");
        }
        self.last.insert(HttpExchange {
            method: request.method.clone(),
            url: request.url.clone(),
            response,
        })
    }
}

fn perform(agent: &Agent, request: &HttpRequest) -> Result<HttpResponse, String> {
    let mut builder = ureq::http::Request::builder()
        .method(request.method.as_str())
        .uri(request.url.as_str());
    for (name, value) in &request.headers {
        builder = builder.header(name.as_str(), value.as_str());
    }

    let sent = match &request.body {
        Some(body) => builder
            .body(body.clone())
            .map_err(|e| e.to_string())
            .and_then(|req| agent.run(req).map_err(|e| e.to_string())),
        None => builder
            .body(())
            .map_err(|e| e.to_string())
            .and_then(|req| agent.run(req).map_err(|e| e.to_string())),
    };
    let mut response = sent?;

    let status = response.status().as_u16();
    let headers = response
        .headers()
        .iter()
        .map(|(k, v)| (k.as_str().to_string(), String::from_utf8_lossy(v.as_bytes()).into_owned()))
        .collect();
    let body = response
        .body_mut()
        .read_to_string()
        .map_err(|e| format!("reading response body: {}", e))?;

    Ok(HttpResponse { status, headers, body })
}

/// Split a `Key: Value` header argument.
pub fn parse_header(arg: &str) -> Option<(String, String)> {
    let (name, value) = arg.split_once(':')?;
    let name = name.trim();
    if name.is_empty() {
        return None;
    }
    Some((name.to_string(), value.trim().to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_header() {
        assert_eq!(
            parse_header("Content-Type: application/json"),
            Some(("Content-Type".into(), "application/json".into()))
        );
        assert_eq!(
            parse_header("Authorization:Bearer a:b"),
            Some(("Authorization".into(), "Bearer a:b".into()))
        );
        assert_eq!(parse_header("no-colon"), None);
        assert_eq!(parse_header(": value"), None);
    }

    #[test]
    fn test_response_success_range() {
        let mut resp = HttpResponse { status: 200, headers: vec![], body: String::new() };
        assert!(resp.success());
        resp.status = 204;
        assert!(resp.success());
        resp.status = 301;
        assert!(!resp.success());
        resp.status = 404;
        assert!(!resp.success());
    }

    #[test]
    fn test_header_values_case_insensitive() {
        let resp = HttpResponse {
            status: 200,
            headers: vec![
                ("x-request-id".into(), "abc-123".into()),
                ("set-cookie".into(), "a=1".into()),
                ("set-cookie".into(), "b=2".into()),
            ],
            body: String::new(),
        };
        assert_eq!(resp.header_values("X-Request-Id").collect::<Vec<_>>(), vec!["abc-123"]);
        assert_eq!(resp.header_values("Set-Cookie").count(), 2);
        assert_eq!(resp.header_values("missing").count(), 0);
    }

    #[test]
    fn test_connection_refused_is_transport_error() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let mut state = HttpState::new();
        let request = HttpRequest {
            method: "GET".into(),
            url: format!("http://{}/", addr),
            headers: vec![],
            body: None,
        };
        let exchange = state.send(&request);
        assert!(exchange.response.is_err());
        assert!(state.last.is_some());
    }
}
