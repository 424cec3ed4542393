//! Request descriptors.
//!
//! A [`RequestConfig`] is the facade's description of one call: verb, URL,
//! payload, whether to attach the token, and per-request overrides. Verb
//! methods build one through [`get_config`]; callers holding an untyped JSON
//! descriptor go through `HttpFacade::request_value` instead.

use reqwest::header::{CONTENT_TYPE, HeaderName, HeaderValue};
use reqwest::{Request, Url};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::error::HttpError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Method {
    #[default]
    Get,
    Post,
    Put,
    Delete,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "get",
            Method::Post => "post",
            Method::Put => "put",
            Method::Delete => "delete",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<Method> for reqwest::Method {
    fn from(method: Method) -> Self {
        match method {
            Method::Get => reqwest::Method::GET,
            Method::Post => reqwest::Method::POST,
            Method::Put => reqwest::Method::PUT,
            Method::Delete => reqwest::Method::DELETE,
        }
    }
}

fn default_auth_api() -> bool {
    true
}

/// One request as the facade sees it.
///
/// The serde shape mirrors the untyped descriptor accepted by
/// `HttpFacade::request_value`:
///
/// ```json
/// { "method": "get", "url": "/users", "params": { "id": 1 }, "authApi": false }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestConfig {
    #[serde(default)]
    pub method: Method,
    pub url: String,
    /// Query parameters. Must be a JSON object when present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
    /// JSON request body.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default = "default_auth_api")]
    pub auth_api: bool,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, String>,
    /// Per-request timeout in milliseconds, overriding the client's.
    #[serde(default, rename = "timeout", skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
    #[serde(skip)]
    pub cancel_token: Option<CancellationToken>,
}

impl RequestConfig {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            params: None,
            data: None,
            auth_api: true,
            headers: BTreeMap::new(),
            timeout_ms: None,
            cancel_token: None,
        }
    }

    /// Builds the outgoing request against `base`, without the token header.
    ///
    /// Every malformed part of the descriptor is reported here as
    /// [`HttpError::InvalidArgument`], before anything is sent.
    pub fn to_request(&self, base: &Url) -> Result<Request, HttpError> {
        let mut url = join_url(base, &self.url)?;
        if let Some(params) = &self.params {
            append_query(&mut url, params)?;
        }

        let mut request = Request::new(self.method.into(), url);

        for (name, value) in &self.headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| HttpError::InvalidArgument(format!("header name '{name}': {e}")))?;
            let value = HeaderValue::from_str(value)
                .map_err(|e| HttpError::InvalidArgument(format!("header '{name}' value: {e}")))?;
            request.headers_mut().insert(name, value);
        }

        if let Some(data) = &self.data {
            let body = serde_json::to_vec(data)
                .map_err(|e| HttpError::InvalidArgument(format!("request body: {e}")))?;
            request
                .headers_mut()
                .entry(CONTENT_TYPE)
                .or_insert(HeaderValue::from_static("application/json"));
            *request.body_mut() = Some(body.into());
        }

        if let Some(ms) = self.timeout_ms {
            *request.timeout_mut() = Some(Duration::from_millis(ms));
        }

        Ok(request)
    }
}

/// Per-call options layered on top of the verb, URL and payload.
///
/// Leaving `auth_api` unset means the request is authenticated.
#[derive(Debug, Clone, Default)]
pub struct CallOptions {
    pub auth_api: Option<bool>,
    pub headers: BTreeMap<String, String>,
    pub timeout: Option<Duration>,
    pub cancel_token: Option<CancellationToken>,
}

impl CallOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Options for an endpoint that must not receive the token.
    pub fn public() -> Self {
        Self::default().auth_api(false)
    }

    pub fn auth_api(mut self, auth_api: bool) -> Self {
        self.auth_api = Some(auth_api);
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn cancel_token(mut self, token: CancellationToken) -> Self {
        self.cancel_token = Some(token);
        self
    }
}

/// Builds the descriptor for a verb call.
///
/// For `get` the payload becomes query parameters, for every other verb it
/// becomes the body. A `null` payload is treated as no payload.
pub fn get_config(method: Method, url: &str, data: Option<Value>, options: CallOptions) -> RequestConfig {
    let data = data.filter(|d| !d.is_null());
    let mut config = RequestConfig::new(method, url);
    match method {
        Method::Get => config.params = data,
        _ => config.data = data,
    }
    config.auth_api = options.auth_api.unwrap_or(true);
    config.headers = options.headers;
    config.timeout_ms = options
        .timeout
        .map(|t| u64::try_from(t.as_millis()).unwrap_or(u64::MAX));
    config.cancel_token = options.cancel_token;
    config
}

/// Resolves `path` against the base URL.
///
/// Absolute `http`/`https` URLs are used as-is; anything else is appended to
/// the base with exactly one `/` between them.
pub fn join_url(base: &Url, path: &str) -> Result<Url, HttpError> {
    if let Ok(absolute) = Url::parse(path) {
        if matches!(absolute.scheme(), "http" | "https") {
            return Ok(absolute);
        }
    }
    let joined = if path.is_empty() {
        base.as_str().to_string()
    } else {
        format!(
            "{}/{}",
            base.as_str().trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    };
    Url::parse(&joined).map_err(|e| HttpError::InvalidArgument(format!("url '{path}': {e}")))
}

/// Encodes a JSON object as query pairs. `null` is skipped and nested objects
/// are sent as their JSON text.
///
/// Arrays repeat the bare key (`tag=a&tag=b`), the form `serde_urlencoded`
/// and most servers read as a list. The bracketed `tag[]=a` form is not
/// produced; callers that need it can name the key `tag[]` themselves.
fn append_query(url: &mut Url, params: &Value) -> Result<(), HttpError> {
    let Value::Object(map) = params else {
        return Err(HttpError::InvalidArgument(
            "query params must be a JSON object".to_string(),
        ));
    };
    if map.is_empty() {
        return Ok(());
    }

    let mut pairs = url.query_pairs_mut();
    for (key, value) in map {
        match value {
            Value::Array(items) => {
                for item in items.iter().filter_map(query_value) {
                    pairs.append_pair(key, &item);
                }
            }
            other => {
                if let Some(v) = query_value(other) {
                    pairs.append_pair(key, &v);
                }
            }
        }
    }
    Ok(())
}

fn query_value(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}
