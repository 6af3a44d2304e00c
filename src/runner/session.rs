//! Authenticated API session, established once per run and shared read-only
//! by every unit.

use crate::error::SessionError;
use crate::utils::config::RunConfig;
use crate::utils::redact::truncate;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

pub struct Session {
    client: reqwest::Client,
    base_url: String,
    user: String,
    access_token: Option<String>,
    user_id: Option<Value>,
    established_at: DateTime<Utc>,
    closed: AtomicBool,
}

impl Session {
    pub fn new(
        client: reqwest::Client,
        base_url: &str,
        user: &str,
        access_token: Option<String>,
        user_id: Option<Value>,
    ) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            user: user.to_string(),
            access_token,
            user_id,
            established_at: Utc::now(),
            closed: AtomicBool::new(false),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn user(&self) -> &str {
        &self.user
    }

    pub fn access_token(&self) -> Option<&str> {
        self.access_token.as_deref()
    }

    pub fn user_id(&self) -> Option<&Value> {
        self.user_id.as_ref()
    }

    pub fn established_at(&self) -> DateTime<Utc> {
        self.established_at
    }

    /// Absolute URL for `path`; absolute `http(s)://` inputs pass through
    pub fn url(&self, path: &str) -> String {
        join_url(&self.base_url, path)
    }

    /// Endpoint label for timing statistics (`/api/items?x=1` -> `items`)
    pub fn endpoint_of(&self, url: &str) -> String {
        let rest = url.strip_prefix(&self.base_url).unwrap_or(url);
        let rest = rest.split('?').next().unwrap_or(rest);
        rest.trim_matches('/').to_string()
    }

    /// Start a request against the target API, with the bearer token when `auth` is set
    pub fn request(
        &self,
        method: reqwest::Method,
        path: &str,
        auth: bool,
    ) -> Result<reqwest::RequestBuilder, SessionError> {
        if self.is_closed() {
            return Err(SessionError::Closed);
        }
        let mut builder = self.client.request(method, self.url(path));
        if auth {
            if let Some(token) = &self.access_token {
                builder = builder.bearer_auth(token);
            }
        }
        Ok(builder)
    }

    /// Refuse a config whose target or user differ from the one this session was opened for
    pub fn ensure_bound_to(&self, config: &RunConfig) -> Result<(), SessionError> {
        let requested_url = config.base_api_url.trim_end_matches('/');
        if requested_url != self.base_url || config.test_user != self.user {
            return Err(SessionError::CredentialMismatch {
                bound: format!("{}@{}", self.user, self.base_url),
                requested: format!("{}@{}", config.test_user, requested_url),
            });
        }
        Ok(())
    }

    pub fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            debug!("Session for {}@{} closed", self.user, self.base_url);
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("base_url", &self.base_url)
            .field("user", &self.user)
            .field("authenticated", &self.access_token.is_some())
            .field("closed", &self.is_closed())
            .finish()
    }
}

pub(crate) fn join_url(base: &str, path: &str) -> String {
    if path.starts_with("http://") || path.starts_with("https://") {
        return path.to_string();
    }
    if path.is_empty() {
        return base.to_string();
    }
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

/// Produces the session for a run
#[async_trait]
pub trait SessionProvider: Send + Sync {
    async fn establish(&self, config: &RunConfig) -> Result<Session, SessionError>;
}

/// Logs in over HTTP with a JSON `{login, password}` payload
pub struct HttpSessionProvider {
    request_timeout: Duration,
    endpoint: Option<String>,
}

impl HttpSessionProvider {
    pub fn new(request_timeout: Duration, endpoint: Option<String>) -> Self {
        Self {
            request_timeout,
            endpoint,
        }
    }

    fn endpoints(&self) -> Vec<String> {
        match &self.endpoint {
            Some(e) => vec![e.clone()],
            None => vec!["/login".to_string(), "/authenticate".to_string()],
        }
    }
}

impl Default for HttpSessionProvider {
    fn default() -> Self {
        Self::new(Duration::from_secs(10), None)
    }
}

#[async_trait]
impl SessionProvider for HttpSessionProvider {
    async fn establish(&self, config: &RunConfig) -> Result<Session, SessionError> {
        let client = reqwest::Client::builder()
            .timeout(self.request_timeout)
            .build()
            .map_err(|e| SessionError::Network {
                url: config.base_api_url.clone(),
                message: e.to_string(),
            })?;

        let payload = json!({
            "login": config.test_user,
            "password": config.test_password,
        });

        let mut auth_err = None;
        let mut net_err = None;

        for endpoint in self.endpoints() {
            let url = join_url(&config.base_api_url, &endpoint);
            debug!("Authenticating {} against {}", config.test_user, url);

            match client.post(&url).json(&payload).send().await {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        let body: Value = response.json().await.unwrap_or(Value::Null);
                        let token = extract_token(&body);
                        if token.is_none() {
                            warn!("Login at {} succeeded without an access token", url);
                        }
                        info!("Authenticated {} at {}", config.test_user, url);
                        return Ok(Session::new(
                            client,
                            &config.base_api_url,
                            &config.test_user,
                            token,
                            body.pointer("/user/id").cloned(),
                        ));
                    }

                    let text = response.text().await.unwrap_or_default();
                    warn!("Authentication attempt at {} returned {}", url, status);
                    // Timeouts and rate limits are worth another attempt
                    if status.is_server_error() || matches!(status.as_u16(), 408 | 429) {
                        net_err = Some(SessionError::Network {
                            url,
                            message: format!("server responded {}", status),
                        });
                    } else {
                        auth_err = Some(SessionError::Auth {
                            url,
                            status: status.as_u16(),
                            message: truncate(text.trim(), 200),
                        });
                    }
                }
                Err(e) => {
                    warn!("Authentication attempt failed for {}: {}", url, e);
                    net_err = Some(SessionError::Network {
                        url,
                        message: e.to_string(),
                    });
                }
            }
        }

        Err(auth_err
            .or(net_err)
            .unwrap_or_else(|| SessionError::Network {
                url: config.base_api_url.clone(),
                message: "no authentication endpoint configured".to_string(),
            }))
    }
}

fn extract_token(body: &Value) -> Option<String> {
    ["/api_jwt/access_token", "/access_token", "/token"]
        .iter()
        .find_map(|p| body.pointer(p).and_then(|v| v.as_str()))
        .map(str::to_string)
}

/// Establish a session, retrying only transient network failures with
/// exponential backoff. Credential rejection fails immediately.
pub async fn establish_with_retry<P>(
    provider: &P,
    config: &RunConfig,
    attempts: u32,
    backoff_ms: u64,
) -> Result<Session, SessionError>
where
    P: SessionProvider + ?Sized,
{
    let attempts = attempts.max(1);
    let mut delay = backoff_ms;
    let mut attempt = 1;

    loop {
        match provider.establish(config).await {
            Ok(session) => return Ok(session),
            Err(e) if e.is_transient() && attempt < attempts => {
                warn!(
                    "Session attempt {}/{} failed: {}. Retrying in {}ms",
                    attempt, attempts, e, delay
                );
                tokio::time::sleep(Duration::from_millis(delay)).await;
                delay = delay.saturating_mul(2);
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::sync::atomic::AtomicU32;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config(base: &str) -> RunConfig {
        RunConfig {
            base_api_url: base.to_string(),
            test_user: "qa@example.com".to_string(),
            test_password: "s3cret".to_string(),
            project_name: "Billing".to_string(),
            environment_name: "Staging".to_string(),
            test_cycle: "Regression".to_string(),
            test_dir: PathBuf::from("tests"),
        }
    }

    struct FlakyProvider {
        calls: AtomicU32,
        fail_times: u32,
        error: fn() -> SessionError,
    }

    #[async_trait]
    impl SessionProvider for FlakyProvider {
        async fn establish(&self, config: &RunConfig) -> Result<Session, SessionError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.fail_times {
                return Err((self.error)());
            }
            Ok(Session::new(
                reqwest::Client::new(),
                &config.base_api_url,
                &config.test_user,
                Some("t".to_string()),
                None,
            ))
        }
    }

    fn network() -> SessionError {
        SessionError::Network {
            url: "http://api".to_string(),
            message: "connection refused".to_string(),
        }
    }

    fn rejected() -> SessionError {
        SessionError::Auth {
            url: "http://api/login".to_string(),
            status: 401,
            message: "invalid credentials".to_string(),
        }
    }

    #[tokio::test]
    async fn test_retries_transient_failures() {
        let provider = FlakyProvider {
            calls: AtomicU32::new(0),
            fail_times: 2,
            error: network,
        };
        let session = establish_with_retry(&provider, &config("http://api"), 3, 1).await;
        assert!(session.is_ok());
        assert_eq!(provider.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_gives_up_after_attempts() {
        let provider = FlakyProvider {
            calls: AtomicU32::new(0),
            fail_times: 10,
            error: network,
        };
        let err = establish_with_retry(&provider, &config("http://api"), 3, 1)
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::Network { .. }));
        assert_eq!(provider.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_does_not_retry_rejected_credentials() {
        let provider = FlakyProvider {
            calls: AtomicU32::new(0),
            fail_times: 10,
            error: rejected,
        };
        let err = establish_with_retry(&provider, &config("http://api"), 3, 1)
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::Auth { status: 401, .. }));
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_http_login_reads_token_and_user() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/login"))
            .and(body_json(json!({ "login": "qa@example.com", "password": "s3cret" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "api_jwt": { "access_token": "jwt-123" },
                "user": { "id": 42 }
            })))
            .mount(&server)
            .await;

        let session = HttpSessionProvider::default()
            .establish(&config(&server.uri()))
            .await
            .unwrap();

        assert_eq!(session.access_token(), Some("jwt-123"));
        assert_eq!(session.user_id(), Some(&json!(42)));
        assert_eq!(session.user(), "qa@example.com");
    }

    #[tokio::test]
    async fn test_http_login_falls_back_to_authenticate() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/login"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/authenticate"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({ "access_token": "fallback" })),
            )
            .mount(&server)
            .await;

        let session = HttpSessionProvider::default()
            .establish(&config(&server.uri()))
            .await
            .unwrap();
        assert_eq!(session.access_token(), Some("fallback"));
    }

    #[tokio::test]
    async fn test_http_login_rejection_is_auth_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401).set_body_string("invalid credentials"))
            .mount(&server)
            .await;

        let err = HttpSessionProvider::default()
            .establish(&config(&server.uri()))
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::Auth { status: 401, .. }));
        assert!(!err.is_transient());
    }

    #[tokio::test]
    async fn test_rate_limited_login_is_retried() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/login"))
            .respond_with(ResponseTemplate::new(429))
            .up_to_n_times(2)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/login"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "token": "late" })))
            .mount(&server)
            .await;

        let provider = HttpSessionProvider::new(Duration::from_secs(5), Some("/login".to_string()));
        let first = provider.establish(&config(&server.uri())).await.unwrap_err();
        assert!(matches!(first, SessionError::Network { .. }));
        assert!(first.is_transient());

        // second 429, then the token
        let session = establish_with_retry(&provider, &config(&server.uri()), 2, 1)
            .await
            .unwrap();
        assert_eq!(session.access_token(), Some("late"));
    }

    #[tokio::test]
    async fn test_request_timeout_status_is_transient() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(408))
            .mount(&server)
            .await;

        let err = HttpSessionProvider::default()
            .establish(&config(&server.uri()))
            .await
            .unwrap_err();
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_network_error() {
        let provider = HttpSessionProvider::new(Duration::from_millis(500), None);
        let err = provider
            .establish(&config("http://127.0.0.1:1"))
            .await
            .unwrap_err();
        assert!(err.is_transient());
    }

    #[test]
    fn test_session_urls_and_binding() {
        let session = Session::new(
            reqwest::Client::new(),
            "https://api.example.com/api/",
            "qa@example.com",
            None,
            None,
        );
        assert_eq!(session.url("/items"), "https://api.example.com/api/items");
        assert_eq!(session.url("https://other/x"), "https://other/x");
        assert_eq!(
            session.endpoint_of("https://api.example.com/api/items/7?full=1"),
            "items/7"
        );

        assert!(session
            .ensure_bound_to(&config("https://api.example.com/api"))
            .is_ok());
        let mut other = config("https://api.example.com/api");
        other.test_user = "admin@example.com".to_string();
        assert!(matches!(
            session.ensure_bound_to(&other),
            Err(SessionError::CredentialMismatch { .. })
        ));
    }

    #[test]
    fn test_closed_session_refuses_requests() {
        let session = Session::new(reqwest::Client::new(), "http://api", "qa", None, None);
        assert!(session.request(reqwest::Method::GET, "/x", true).is_ok());
        session.close();
        assert!(session.is_closed());
        assert!(matches!(
            session.request(reqwest::Method::GET, "/x", true),
            Err(SessionError::Closed)
        ));
    }
}
