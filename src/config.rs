//! Facade configuration.
//!
//! [`FacadeConfig`] is built once, handed to `HttpFacade::new`, and never
//! changed afterwards. Everything optional is an explicit `Option` and is
//! only invoked when present.

use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::error::HttpError;
use crate::loading::LoadingCallback;
use crate::token::{EnvToken, TokenProvider};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(3000);
pub const DEFAULT_TOKEN_HEADER: &str = "Authorization";
pub const DEFAULT_TOKEN_PREFIX: &str = "Bearer ";

/// Receives every failed request's error, except cancellations.
pub type RejectCallback = Arc<dyn Fn(&HttpError) + Send + Sync>;

/// Receives the raw response of a 2xx request whose status is not 200.
pub type SuccessCallback = Arc<dyn Fn(&reqwest::Response) + Send + Sync>;

#[derive(Clone)]
pub struct FacadeConfig {
    /// Base URL every relative request path is joined onto. Required.
    pub api: Option<String>,
    pub timeout: Duration,
    /// Sent on every request. Defaults to `Accept: application/json`.
    pub headers: BTreeMap<String, String>,
    pub token_header: String,
    pub token_prefix: String,
    pub token_provider: Option<Arc<dyn TokenProvider>>,
    /// When `false`, the loading callbacks never fire.
    pub loading: bool,
    pub on_show_loading: Option<LoadingCallback>,
    pub on_hide_loading: Option<LoadingCallback>,
    pub on_reject: Option<RejectCallback>,
    pub on_success: Option<SuccessCallback>,
    /// Refuse to construct a facade without a token provider.
    pub require_token: bool,
    /// Resolve non-200 2xx responses with their payload instead of leaving
    /// the call pending forever.
    pub settle_non_ok: bool,
}

impl Default for FacadeConfig {
    fn default() -> Self {
        let mut headers = BTreeMap::new();
        headers.insert("Accept".to_string(), "application/json".to_string());
        Self {
            api: None,
            timeout: DEFAULT_TIMEOUT,
            headers,
            token_header: DEFAULT_TOKEN_HEADER.to_string(),
            token_prefix: DEFAULT_TOKEN_PREFIX.to_string(),
            token_provider: None,
            loading: true,
            on_show_loading: None,
            on_hide_loading: None,
            on_reject: None,
            on_success: None,
            require_token: false,
            settle_non_ok: false,
        }
    }
}

impl FacadeConfig {
    pub fn new(api: impl Into<String>) -> Self {
        Self {
            api: Some(api.into()),
            ..Self::default()
        }
    }

    /// Loads the configuration from the process environment.
    ///
    /// | Variable                   | Effect                                  |
    /// |----------------------------|-----------------------------------------|
    /// | `HTTP_FACADE_API`          | base URL (required)                     |
    /// | `HTTP_FACADE_TIMEOUT_MS`   | client timeout in milliseconds          |
    /// | `HTTP_FACADE_TOKEN_HEADER` | token header name                       |
    /// | `HTTP_FACADE_TOKEN_PREFIX` | token value prefix                      |
    /// | `HTTP_FACADE_LOADING`      | `false` disables loading callbacks      |
    /// | `HTTP_FACADE_TOKEN`        | if set, read as the token on each call  |
    pub fn from_env() -> Result<Self> {
        Self::from_vars(env_var)
    }

    /// Overlays whichever of the [`FacadeConfig::from_env`] variables are
    /// set onto `self`, leaving the rest untouched.
    pub fn apply_env(self) -> Result<Self> {
        self.apply_vars(env_var)
    }

    fn from_vars(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let config = Self::default().apply_vars(lookup)?;
        if config.api.is_none() {
            anyhow::bail!("HTTP_FACADE_API must be set");
        }
        Ok(config)
    }

    fn apply_vars(mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        if let Some(api) = lookup("HTTP_FACADE_API") {
            self.api = Some(api);
        }
        if let Some(ms) = lookup("HTTP_FACADE_TIMEOUT_MS") {
            let ms: u64 = ms
                .parse()
                .with_context(|| format!("HTTP_FACADE_TIMEOUT_MS is not a number: '{ms}'"))?;
            self.timeout = Duration::from_millis(ms);
        }
        if let Some(name) = lookup("HTTP_FACADE_TOKEN_HEADER") {
            self.token_header = name;
        }
        if let Some(prefix) = lookup("HTTP_FACADE_TOKEN_PREFIX") {
            self.token_prefix = prefix;
        }
        if let Some(loading) = lookup("HTTP_FACADE_LOADING") {
            self.loading = !matches!(loading.to_ascii_lowercase().as_str(), "false" | "0" | "no" | "off");
        }
        if lookup("HTTP_FACADE_TOKEN").is_some() {
            self.token_provider = Some(Arc::new(EnvToken::new("HTTP_FACADE_TOKEN")));
        }
        Ok(self)
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Replaces the default headers entirely.
    pub fn with_headers(mut self, headers: BTreeMap<String, String>) -> Self {
        self.headers = headers;
        self
    }

    /// Adds or replaces one default header.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn with_token_provider(mut self, provider: impl TokenProvider + 'static) -> Self {
        self.token_provider = Some(Arc::new(provider));
        self
    }

    /// Sets the header the token is sent in and the text put before it.
    pub fn with_token_header(mut self, name: impl Into<String>, prefix: impl Into<String>) -> Self {
        self.token_header = name.into();
        self.token_prefix = prefix.into();
        self
    }

    pub fn with_loading(mut self, loading: bool) -> Self {
        self.loading = loading;
        self
    }

    pub fn on_show_loading(mut self, f: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_show_loading = Some(Arc::new(f));
        self
    }

    pub fn on_hide_loading(mut self, f: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_hide_loading = Some(Arc::new(f));
        self
    }

    pub fn on_reject(mut self, f: impl Fn(&HttpError) + Send + Sync + 'static) -> Self {
        self.on_reject = Some(Arc::new(f));
        self
    }

    pub fn on_success(mut self, f: impl Fn(&reqwest::Response) + Send + Sync + 'static) -> Self {
        self.on_success = Some(Arc::new(f));
        self
    }

    pub fn require_token(mut self, require: bool) -> Self {
        self.require_token = require;
        self
    }

    pub fn settle_non_ok(mut self, settle: bool) -> Self {
        self.settle_non_ok = settle;
        self
    }
}

impl fmt::Debug for FacadeConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FacadeConfig")
            .field("api", &self.api)
            .field("timeout", &self.timeout)
            .field("headers", &self.headers)
            .field("token_header", &self.token_header)
            .field("token_prefix", &self.token_prefix)
            .field("token_provider", &self.token_provider.is_some())
            .field("loading", &self.loading)
            .field("on_show_loading", &self.on_show_loading.is_some())
            .field("on_hide_loading", &self.on_hide_loading.is_some())
            .field("on_reject", &self.on_reject.is_some())
            .field("on_success", &self.on_success.is_some())
            .field("require_token", &self.require_token)
            .field("settle_non_ok", &self.settle_non_ok)
            .finish()
    }
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok()
}

/// Loads default headers from a JSON object on disk.
///
/// ```json
/// {
///   "Accept": "application/json",
///   "X-Client": "dashboard"
/// }
/// ```
pub fn load_headers(path: &str) -> Result<BTreeMap<String, String>> {
    let content =
        std::fs::read_to_string(path).with_context(|| format!("failed to read headers file '{path}'"))?;
    let headers: BTreeMap<String, String> = serde_json::from_str(&content)
        .with_context(|| format!("headers file '{path}' is not a JSON object of strings"))?;
    Ok(headers)
}
