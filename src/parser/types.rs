use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// A test file: a named group of API test cases
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestFile {
    #[serde(default)]
    pub name: Option<String>,

    #[serde(default)]
    pub description: Option<String>,

    #[serde(default)]
    pub tags: Vec<String>,

    /// Skip every case in the file with this reason
    #[serde(default)]
    pub skip: Option<String>,

    #[serde(default)]
    pub tests: Vec<ApiTestCase>,
}

/// Accepted top-level shapes of a test file
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum TestFileInput {
    Suite(TestFile),
    Cases(Vec<ApiTestCase>),
}

impl TestFileInput {
    pub fn into_inner(self) -> TestFile {
        match self {
            TestFileInput::Suite(file) => file,
            TestFileInput::Cases(tests) => TestFile {
                name: None,
                description: None,
                tags: Vec::new(),
                skip: None,
                tests,
            },
        }
    }
}

/// One API test case: a request plus expectations on its response
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiTestCase {
    pub name: String,

    #[serde(default)]
    pub description: Option<String>,

    pub request: RequestSpec,

    #[serde(default)]
    pub expect: Expectations,

    #[serde(default)]
    pub retry: Option<RetrySpec>,

    /// Skip this case with the given reason
    #[serde(default)]
    pub skip: Option<String>,

    /// Added to the file's tags for `--tag` selection
    #[serde(default)]
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestSpec {
    #[serde(default = "default_method")]
    pub method: String,

    /// Path relative to the base API URL, or an absolute `http(s)://` URL
    pub path: String,

    #[serde(default)]
    pub headers: BTreeMap<String, String>,

    #[serde(default)]
    pub query: BTreeMap<String, String>,

    /// JSON body
    #[serde(default)]
    pub body: Option<Value>,

    /// Send the session bearer token
    #[serde(default = "default_true")]
    pub auth: bool,

    #[serde(default)]
    pub timeout_ms: Option<u64>,

    #[serde(default)]
    pub redact: RedactSpec,
}

/// What failure diagnostics mask for one request. Non-empty lists replace
/// the built-in ones.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RedactSpec {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// JSON keys whose values are masked
    #[serde(default)]
    pub keys: Vec<String>,

    #[serde(default)]
    pub headers: Vec<String>,
}

impl Default for RedactSpec {
    fn default() -> Self {
        Self {
            enabled: true,
            keys: Vec::new(),
            headers: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Expectations {
    /// Expected status; any 2xx when unset
    #[serde(default)]
    pub status: Option<u16>,

    /// Expected values by dotted JSON path (`data.items.0.id`)
    #[serde(default)]
    pub json: BTreeMap<String, Value>,

    #[serde(default)]
    pub body_contains: Option<String>,

    #[serde(default)]
    pub max_response_time_ms: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetrySpec {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(default = "default_retry_delay")]
    pub delay_ms: u64,

    /// Response statuses that trigger another attempt
    #[serde(default)]
    pub on_status: Vec<u16>,
}

fn default_method() -> String {
    "GET".to_string()
}

fn default_true() -> bool {
    true
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_delay() -> u64 {
    1000
}
