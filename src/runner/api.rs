//! Declarative API test body: one request through the session, then checks on
//! the response.

use super::session::Session;
use super::state::{OutcomeStatus, ResponseTiming};
use super::unit::{TestBody, UnitRun};
use crate::parser::types::{ApiTestCase, Expectations, RequestSpec, RetrySpec};
use crate::utils::redact::{truncate, Redactor};
use async_trait::async_trait;
use log::debug;
use regex::{Captures, Regex};
use serde_json::Value;
use std::sync::OnceLock;
use std::time::{Duration, Instant};

const MAX_RESPONSE_PREVIEW: usize = 500;

pub struct ApiTestBody {
    case: ApiTestCase,
    request_timeout: Duration,
    redactor: Redactor,
}

impl ApiTestBody {
    pub fn new(case: ApiTestCase, request_timeout: Duration) -> Self {
        let rules = &case.request.redact;
        let redactor = Redactor::new(rules.enabled, &rules.keys, &rules.headers);
        Self {
            case,
            request_timeout,
            redactor,
        }
    }

    fn decorate(
        &self,
        mut builder: reqwest::RequestBuilder,
        request: &RequestSpec,
    ) -> reqwest::RequestBuilder {
        for (k, v) in &request.headers {
            builder = builder.header(k.as_str(), v.as_str());
        }
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }
        let timeout = request
            .timeout_ms
            .map(Duration::from_millis)
            .unwrap_or(self.request_timeout);
        builder.timeout(timeout)
    }

    /// Failure report in the layout of the error section of the run report
    fn diagnostic(
        &self,
        request: &RequestSpec,
        message: &str,
        status: u16,
        url: &str,
        text: &str,
    ) -> String {
        let mut out = format!(
            "Test Description: {}\nTest: {}\nError Message: {}\n",
            self.case
                .description
                .as_deref()
                .unwrap_or("No description available"),
            self.case.name,
            message
        );

        if !request.headers.is_empty() {
            out.push_str("\nRequest Headers:\n");
            for (k, v) in self.redactor.headers(&request.headers) {
                out.push_str(&format!("{}: {}\n", k, v));
            }
        }

        if let Some(body) = &request.body {
            let redacted = self.redactor.json(body);
            let pretty = serde_json::to_string_pretty(&redacted).unwrap_or_default();
            out.push_str(&format!("\nRequest Body:\n{}\n", pretty));
        }

        let content = match serde_json::from_str::<Value>(text) {
            Ok(json) => serde_json::to_string_pretty(&self.redactor.json(&json))
                .unwrap_or_else(|_| text.to_string()),
            Err(_) => self.redactor.text(text),
        };
        out.push_str(&format!(
            "\nResponse Status: {}\nResponse URL: {}\nResponse Content:\n{}\n",
            status,
            url,
            truncate(&content, MAX_RESPONSE_PREVIEW)
        ));
        out
    }
}

#[async_trait]
impl TestBody for ApiTestBody {
    async fn run(&self, session: &Session) -> UnitRun {
        if let Some(reason) = &self.case.skip {
            return OutcomeStatus::skipped(reason.clone()).into();
        }

        let request = resolve(&self.case.request, session);
        let method = match request.method.parse::<reqwest::Method>() {
            Ok(m) => m,
            Err(_) => {
                return OutcomeStatus::errored(format!("Invalid HTTP method: {}", request.method))
                    .into()
            }
        };
        let retry = self.case.retry.clone().unwrap_or(RetrySpec {
            max_retries: 0,
            delay_ms: 0,
            on_status: Vec::new(),
        });

        let url = session.url(&request.path);
        let endpoint = session.endpoint_of(&url);
        let mut timings = Vec::new();
        let mut attempt: u32 = 0;

        let (response, elapsed) = loop {
            attempt += 1;
            let builder = match session.request(method.clone(), &request.path, request.auth) {
                Ok(b) => self.decorate(b, &request),
                Err(e) => {
                    return UnitRun::new(OutcomeStatus::errored(e.to_string()))
                        .with_timings(timings)
                }
            };

            let started = Instant::now();
            match builder.send().await {
                Ok(response) => {
                    let elapsed = started.elapsed();
                    let status = response.status().as_u16();
                    timings.push(ResponseTiming {
                        endpoint: endpoint.clone(),
                        method: method.to_string(),
                        duration_ms: elapsed.as_millis() as u64,
                        status: Some(status),
                        error: None,
                        attempt,
                    });

                    if retry.on_status.contains(&status) && attempt <= retry.max_retries {
                        debug!(
                            "Retrying {} {} ({}) [Attempt {}/{}]",
                            method, url, status, attempt, retry.max_retries
                        );
                        tokio::time::sleep(Duration::from_millis(retry.delay_ms)).await;
                        continue;
                    }
                    break (response, elapsed);
                }
                Err(e) => {
                    timings.push(ResponseTiming {
                        endpoint: endpoint.clone(),
                        method: method.to_string(),
                        duration_ms: started.elapsed().as_millis() as u64,
                        status: None,
                        error: Some(e.to_string()),
                        attempt,
                    });

                    if attempt <= retry.max_retries {
                        debug!(
                            "Retrying {} {} ({}) [Attempt {}/{}]",
                            method, url, e, attempt, retry.max_retries
                        );
                        tokio::time::sleep(Duration::from_millis(retry.delay_ms)).await;
                        continue;
                    }
                    let kind = if e.is_timeout() { "Timeout" } else { "Request error" };
                    return UnitRun::new(OutcomeStatus::errored(format!(
                        "{}: {} {} failed after {} attempt(s): {}",
                        kind, method, url, attempt, e
                    )))
                    .with_timings(timings);
                }
            }
        };

        let status = response.status().as_u16();
        let final_url = response.url().to_string();
        let text = match response.text().await {
            Ok(t) => t,
            Err(e) => {
                return UnitRun::new(OutcomeStatus::errored(format!(
                    "Failed to read response body from {}: {}",
                    final_url, e
                )))
                .with_timings(timings)
            }
        };

        let status = match check_response(&self.case.expect, status, &text, elapsed) {
            Ok(()) => OutcomeStatus::Passed,
            Err(message) => {
                let message = self.redactor.text(&message);
                OutcomeStatus::Failed {
                    diagnostic: Some(self.diagnostic(&request, &message, status, &final_url, &text)),
                    message,
                }
            }
        };
        UnitRun::new(status).with_timings(timings)
    }
}

/// Substitute `${user_id}`, `${user}` and `${base_url}` from the session.
/// Unknown names are left as written.
fn interpolate(text: &str, session: &Session) -> String {
    static VARS: OnceLock<Option<Regex>> = OnceLock::new();
    let re = match VARS.get_or_init(|| Regex::new(r"\$\{([a-zA-Z0-9_.]+)\}").ok()) {
        Some(re) => re,
        None => return text.to_string(),
    };

    re.replace_all(text, |caps: &Captures| {
        let value = match &caps[1] {
            "user_id" => session.user_id().map(|v| match v {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            }),
            "user" => Some(session.user().to_string()),
            "base_url" => Some(session.base_url().to_string()),
            _ => None,
        };
        value.unwrap_or_else(|| caps[0].to_string())
    })
    .into_owned()
}

fn interpolate_json(value: &Value, session: &Session) -> Value {
    match value {
        Value::String(s) => Value::String(interpolate(s, session)),
        Value::Array(items) => Value::Array(
            items
                .iter()
                .map(|v| interpolate_json(v, session))
                .collect(),
        ),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), interpolate_json(v, session)))
                .collect(),
        ),
        other => other.clone(),
    }
}

fn resolve(request: &RequestSpec, session: &Session) -> RequestSpec {
    RequestSpec {
        path: interpolate(&request.path, session),
        headers: request
            .headers
            .iter()
            .map(|(k, v)| (k.clone(), interpolate(v, session)))
            .collect(),
        query: request
            .query
            .iter()
            .map(|(k, v)| (k.clone(), interpolate(v, session)))
            .collect(),
        body: request.body.as_ref().map(|b| interpolate_json(b, session)),
        ..request.clone()
    }
}

/// Check a response against expectations; the error is the assertion message
pub fn check_response(
    expect: &Expectations,
    status: u16,
    text: &str,
    elapsed: Duration,
) -> Result<(), String> {
    match expect.status {
        Some(expected) if expected != status => {
            return Err(format!(
                "Expected status {}, got {}. Response: {}",
                expected,
                status,
                truncate(text, 200)
            ));
        }
        None if !(200..300).contains(&status) => {
            return Err(format!(
                "Unexpected status {}. Response: {}",
                status,
                truncate(text, 200)
            ));
        }
        _ => {}
    }

    if status >= 400 && text.trim().is_empty() {
        return Err("Error response should contain content".to_string());
    }

    if !expect.json.is_empty() && status < 400 {
        let json: Value = serde_json::from_str(text)
            .map_err(|_| "Expected JSON response but got non-JSON content".to_string())?;
        for (key, expected) in &expect.json {
            match lookup(&json, key) {
                Some(actual) if actual == expected => {}
                Some(actual) => {
                    return Err(format!("Expected {}={}, got {}", key, expected, actual));
                }
                None => return Err(format!("Expected {}={}, but it is missing", key, expected)),
            }
        }
    }

    if let Some(needle) = &expect.body_contains {
        if !text.contains(needle.as_str()) {
            return Err(format!("Expected response body to contain '{}'", needle));
        }
    }

    if let Some(max) = expect.max_response_time_ms {
        let took = elapsed.as_millis() as u64;
        if took > max {
            return Err(format!(
                "Response time {}ms exceeds maximum allowed {}ms",
                took, max
            ));
        }
    }

    Ok(())
}

/// Resolve a key either literally or as a dotted path (`data.items.0.id`)
fn lookup<'a>(json: &'a Value, key: &str) -> Option<&'a Value> {
    if let Some(v) = json.get(key) {
        return Some(v);
    }
    let pointer = format!("/{}", key.replace('.', "/"));
    json.pointer(&pointer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::types::{RedactSpec, RequestSpec};
    use serde_json::json;
    use std::collections::BTreeMap;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn case(path: &str) -> ApiTestCase {
        ApiTestCase {
            name: "case".to_string(),
            description: Some("Checks the endpoint".to_string()),
            request: RequestSpec {
                method: "GET".to_string(),
                path: path.to_string(),
                headers: BTreeMap::new(),
                query: BTreeMap::new(),
                body: None,
                auth: true,
                timeout_ms: None,
                redact: RedactSpec::default(),
            },
            expect: Expectations::default(),
            retry: None,
            skip: None,
            tags: Vec::new(),
        }
    }

    fn session(base: &str) -> Session {
        Session::new(
            reqwest::Client::new(),
            base,
            "qa@example.com",
            Some("tok".to_string()),
            None,
        )
    }

    #[test]
    fn test_status_expectations() {
        let mut expect = Expectations::default();
        assert!(check_response(&expect, 204, "", Duration::ZERO).is_ok());
        assert!(check_response(&expect, 500, "oops", Duration::ZERO).is_err());

        expect.status = Some(404);
        assert!(check_response(&expect, 404, "{\"error\":\"nope\"}", Duration::ZERO).is_ok());
        assert!(check_response(&expect, 404, "", Duration::ZERO).is_err());
        let msg = check_response(&expect, 200, "ok", Duration::ZERO).unwrap_err();
        assert!(msg.starts_with("Expected status 404, got 200"));
    }

    #[test]
    fn test_json_expectations_use_dotted_paths() {
        let expect = Expectations {
            json: BTreeMap::from([
                ("status".to_string(), json!("ok")),
                ("data.items.0.id".to_string(), json!(7)),
            ]),
            ..Expectations::default()
        };
        let body = json!({ "status": "ok", "data": { "items": [{ "id": 7 }] } }).to_string();
        assert!(check_response(&expect, 200, &body, Duration::ZERO).is_ok());

        let wrong = json!({ "status": "ok", "data": { "items": [{ "id": 8 }] } }).to_string();
        let msg = check_response(&expect, 200, &wrong, Duration::ZERO).unwrap_err();
        assert_eq!(msg, "Expected data.items.0.id=7, got 8");

        let msg = check_response(&expect, 200, "<html>", Duration::ZERO).unwrap_err();
        assert!(msg.contains("non-JSON"));
    }

    #[test]
    fn test_response_time_and_body_expectations() {
        let expect = Expectations {
            body_contains: Some("invoice".to_string()),
            max_response_time_ms: Some(100),
            ..Expectations::default()
        };
        assert!(check_response(&expect, 200, "invoice #1", Duration::from_millis(20)).is_ok());
        assert!(check_response(&expect, 200, "receipt", Duration::from_millis(20)).is_err());
        let msg =
            check_response(&expect, 200, "invoice", Duration::from_millis(250)).unwrap_err();
        assert!(msg.contains("exceeds maximum allowed 100ms"));
    }

    #[test]
    fn test_interpolates_session_values() {
        let session = Session::new(
            reqwest::Client::new(),
            "http://api.local",
            "qa@example.com",
            None,
            Some(json!(42)),
        );
        assert_eq!(
            interpolate("/users/${user_id}/orders", &session),
            "/users/42/orders"
        );
        assert_eq!(
            interpolate("${user} on ${base_url}", &session),
            "qa@example.com on http://api.local"
        );
        assert_eq!(interpolate("/x/${unknown}", &session), "/x/${unknown}");

        let body = interpolate_json(
            &json!({ "owner": "${user_id}", "tags": ["${user}", 1] }),
            &session,
        );
        assert_eq!(body, json!({ "owner": "42", "tags": ["qa@example.com", 1] }));
    }

    #[tokio::test]
    async fn test_passes_with_bearer_token() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/items"))
            .and(header("authorization", "Bearer tok"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "count": 2 })))
            .mount(&server)
            .await;

        let mut c = case("/items");
        c.expect.json.insert("count".to_string(), json!(2));
        let run = ApiTestBody::new(c, Duration::from_secs(5))
            .run(&session(&server.uri()))
            .await;

        assert_eq!(run.status, OutcomeStatus::Passed);
        assert_eq!(run.timings.len(), 1);
        assert_eq!(run.timings[0].endpoint, "items");
        assert_eq!(run.timings[0].status, Some(200));
    }

    #[tokio::test]
    async fn test_failure_carries_redacted_diagnostic() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/users"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({ "error": "bad" })))
            .mount(&server)
            .await;

        let mut c = case("/users");
        c.request.method = "POST".to_string();
        c.request.body = Some(json!({ "login": "new", "password": "hunter2" }));
        c.expect.status = Some(201);

        let run = ApiTestBody::new(c, Duration::from_secs(5))
            .run(&session(&server.uri()))
            .await;

        match run.status {
            OutcomeStatus::Failed {
                message,
                diagnostic,
            } => {
                assert!(message.starts_with("Expected status 201, got 400"));
                let diagnostic = diagnostic.unwrap();
                assert!(diagnostic.contains("Test Description: Checks the endpoint"));
                assert!(diagnostic.contains("Response Status: 400"));
                assert!(diagnostic.contains("\"password\": \"***\""));
                assert!(!diagnostic.contains("hunter2"));
            }
            other => panic!("expected failure, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_diagnostic_masks_headers_and_text() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/echo"))
            .respond_with(ResponseTemplate::new(500).set_body_string("token=leaked&ok=1"))
            .mount(&server)
            .await;

        let mut c = case("/echo");
        c.request.headers.insert("X-Api-Key".to_string(), "k-999".to_string());
        c.request.headers.insert("Accept".to_string(), "text/plain".to_string());
        let run = ApiTestBody::new(c, Duration::from_secs(5))
            .run(&session(&server.uri()))
            .await;

        match run.status {
            OutcomeStatus::Failed {
                message,
                diagnostic,
            } => {
                assert!(message.contains("token=***"));
                assert!(!message.contains("leaked"));
                let diagnostic = diagnostic.unwrap();
                assert!(diagnostic.contains("Request Headers:"));
                assert!(diagnostic.contains("Accept: text/plain"));
                assert!(!diagnostic.contains("k-999"));
                assert!(diagnostic.contains("token=***"));
                assert!(!diagnostic.contains("leaked"));
            }
            other => panic!("expected failure, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_case_level_redaction_rules() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/pins"))
            .respond_with(ResponseTemplate::new(422).set_body_string("pin=1234 rejected"))
            .mount(&server)
            .await;

        let mut c = case("/pins");
        c.request.method = "POST".to_string();
        c.request.body = Some(json!({ "pin": "1234", "password": "shown" }));
        c.request.redact = RedactSpec {
            enabled: true,
            keys: vec!["pin".to_string()],
            headers: Vec::new(),
        };
        let run = ApiTestBody::new(c.clone(), Duration::from_secs(5))
            .run(&session(&server.uri()))
            .await;
        let diagnostic = match run.status {
            OutcomeStatus::Failed { diagnostic, .. } => diagnostic.unwrap(),
            other => panic!("expected failure, got {:?}", other),
        };
        assert!(!diagnostic.contains("1234"));
        assert!(diagnostic.contains("\"password\": \"shown\""));

        c.request.redact.enabled = false;
        let run = ApiTestBody::new(c, Duration::from_secs(5))
            .run(&session(&server.uri()))
            .await;
        match run.status {
            OutcomeStatus::Failed { diagnostic, .. } => {
                assert!(diagnostic.unwrap().contains("pin=1234 rejected"))
            }
            other => panic!("expected failure, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_path_uses_session_user_id() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/users/7"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let session = Session::new(
            reqwest::Client::new(),
            &server.uri(),
            "qa@example.com",
            Some("tok".to_string()),
            Some(json!(7)),
        );
        let run = ApiTestBody::new(case("/users/${user_id}"), Duration::from_secs(5))
            .run(&session)
            .await;
        assert_eq!(run.status, OutcomeStatus::Passed);
    }

    #[tokio::test]
    async fn test_retries_on_listed_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/flaky"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(2)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/flaky"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let mut c = case("/flaky");
        c.retry = Some(RetrySpec {
            max_retries: 3,
            delay_ms: 1,
            on_status: vec![503],
        });
        let run = ApiTestBody::new(c, Duration::from_secs(5))
            .run(&session(&server.uri()))
            .await;

        assert_eq!(run.status, OutcomeStatus::Passed);
        let attempts: Vec<_> = run.timings.iter().map(|t| (t.attempt, t.status)).collect();
        assert_eq!(attempts, vec![(1, Some(503)), (2, Some(503)), (3, Some(200))]);
    }

    #[tokio::test]
    async fn test_transport_failure_is_errored() {
        let c = case("/nothing");
        let run = ApiTestBody::new(c, Duration::from_millis(500))
            .run(&session("http://127.0.0.1:1"))
            .await;
        assert!(matches!(run.status, OutcomeStatus::Errored { .. }));
        assert_eq!(run.timings.len(), 1);
        assert!(run.timings[0].error.is_some());
    }

    #[tokio::test]
    async fn test_skip_does_not_touch_network() {
        let mut c = case("/never");
        c.skip = Some("feature flag off".to_string());
        let run = ApiTestBody::new(c, Duration::from_secs(1))
            .run(&session("http://127.0.0.1:1"))
            .await;
        assert_eq!(run.status, OutcomeStatus::skipped("feature flag off"));
        assert!(run.timings.is_empty());
    }
}
