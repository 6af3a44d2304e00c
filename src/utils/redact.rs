use regex::Regex;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::OnceLock;

const MASK: &str = "***";

pub const DEFAULT_SENSITIVE_KEYS: &[&str] =
    &["password", "token", "secret", "api_key", "authorization"];

pub const DEFAULT_SENSITIVE_HEADERS: &[&str] = &[
    "authorization",
    "cookie",
    "set-cookie",
    "x-auth-token",
    "x-api-key",
];

/// Mask values of sensitive keys anywhere in a JSON document (case-insensitive key match)
pub fn redact_json<S: AsRef<str>>(value: &Value, keys: &[S]) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| {
                    if keys.iter().any(|s| s.as_ref().eq_ignore_ascii_case(k)) {
                        (k.clone(), Value::String(MASK.to_string()))
                    } else {
                        (k.clone(), redact_json(v, keys))
                    }
                })
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.iter().map(|v| redact_json(v, keys)).collect()),
        other => other.clone(),
    }
}

pub fn redact_headers<S: AsRef<str>>(
    headers: &BTreeMap<String, String>,
    sensitive: &[S],
) -> BTreeMap<String, String> {
    headers
        .iter()
        .map(|(k, v)| {
            if sensitive.iter().any(|s| s.as_ref().eq_ignore_ascii_case(k)) {
                (k.clone(), MASK.to_string())
            } else {
                (k.clone(), v.clone())
            }
        })
        .collect()
}

fn pair_pattern<S: AsRef<str>>(keys: &[S]) -> Option<Regex> {
    let alternatives = keys
        .iter()
        .map(|k| regex::escape(k.as_ref()))
        .collect::<Vec<_>>()
        .join("|");
    Regex::new(&format!(
        r#"(?i)("?(?:{})"?\s*[:=]\s*"?)([^"&\s,}}]+)"#,
        alternatives
    ))
    .ok()
}

fn default_pairs() -> Option<&'static Regex> {
    static PAIRS: OnceLock<Option<Regex>> = OnceLock::new();
    PAIRS
        .get_or_init(|| pair_pattern(&["password", "token", "secret", "api_key"]))
        .as_ref()
}

fn mask_pairs(re: Option<&Regex>, text: &str) -> String {
    match re {
        Some(re) => re.replace_all(text, format!("${{1}}{}", MASK)).into_owned(),
        None => text.to_string(),
    }
}

/// Mask `key=value` and `"key": "value"` pairs in free text such as HTML or
/// form-encoded bodies, for the default sensitive keys.
pub fn redact_text(text: &str) -> String {
    mask_pairs(default_pairs(), text)
}

/// Masking rules for one request's diagnostics
#[derive(Debug, Clone)]
pub struct Redactor {
    enabled: bool,
    keys: Vec<String>,
    headers: Vec<String>,
    pairs: Option<Regex>,
}

impl Default for Redactor {
    fn default() -> Self {
        Self {
            enabled: true,
            keys: DEFAULT_SENSITIVE_KEYS.iter().map(|k| k.to_string()).collect(),
            headers: DEFAULT_SENSITIVE_HEADERS.iter().map(|h| h.to_string()).collect(),
            pairs: default_pairs().cloned(),
        }
    }
}

impl Redactor {
    /// Empty `keys` or `headers` keep the built-in lists
    pub fn new(enabled: bool, keys: &[String], headers: &[String]) -> Self {
        let mut redactor = Self::default();
        redactor.enabled = enabled;
        if !keys.is_empty() {
            redactor.keys = keys.to_vec();
            redactor.pairs = pair_pattern(keys);
        }
        if !headers.is_empty() {
            redactor.headers = headers.to_vec();
        }
        redactor
    }

    pub fn json(&self, value: &Value) -> Value {
        if self.enabled {
            redact_json(value, &self.keys)
        } else {
            value.clone()
        }
    }

    pub fn headers(&self, headers: &BTreeMap<String, String>) -> BTreeMap<String, String> {
        if self.enabled {
            redact_headers(headers, &self.headers)
        } else {
            headers.clone()
        }
    }

    pub fn text(&self, text: &str) -> String {
        if self.enabled {
            mask_pairs(self.pairs.as_ref(), text)
        } else {
            text.to_string()
        }
    }
}

/// Cut `text` to at most `max` characters, marking the cut with "..."
pub fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let keep = max.saturating_sub(3);
    let mut out: String = text.chars().take(keep).collect();
    out.push_str("...");
    out
}
