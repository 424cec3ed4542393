//! The HTTP facade.
//!
//! [`HttpFacade`] wraps one transport bound to a base URL, timeout and
//! default headers. Each verb call takes a loading slot, attaches the token
//! header to that request alone, and turns the transport outcome into either
//! the response payload or an [`HttpError`].

use bytes::Bytes;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Request, Response, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::{FacadeConfig, RejectCallback, SuccessCallback};
use crate::error::HttpError;
use crate::fetch::auth::TokenHeader;
use crate::fetch::{BasicClient, HttpClient};
use crate::loading::{LoadingGuard, LoadingTracker};
use crate::request::{self, CallOptions, Method, RequestConfig};
use crate::token::TokenProvider;

/// The future returned by every request method.
///
/// Validation and the loading slot are handled when the method is called;
/// nothing goes on the wire until the future is polled.
pub type ResponseFuture<T = Value> = Pin<Box<dyn Future<Output = Result<T, HttpError>> + Send + 'static>>;

#[derive(Clone)]
pub struct HttpFacade {
    inner: Arc<Inner>,
}

struct Inner {
    api: String,
    base_url: Url,
    client: Box<dyn HttpClient>,
    loading: Arc<LoadingTracker>,
    token_header: TokenHeader,
    token_provider: Option<Arc<dyn TokenProvider>>,
    on_reject: Option<RejectCallback>,
    on_success: Option<SuccessCallback>,
    settle_non_ok: bool,
}

/// A validated request waiting to be sent.
struct Prepared {
    request: Request,
    auth_api: bool,
    cancel_token: Option<CancellationToken>,
}

/// How a request finished on the wire, before any callback runs.
enum Completion {
    /// Status 200 with its full body.
    Ok(Bytes),
    /// Any other 2xx status, body unread.
    NonOk(Response),
}

impl HttpFacade {
    /// Builds a facade over a [`BasicClient`] carrying the configured
    /// timeout and default headers.
    ///
    /// # Errors
    ///
    /// Returns [`HttpError::Config`] if the base URL is missing or invalid,
    /// if a token provider is required but absent, or if a header is
    /// malformed. The underlying client is only created once all of that
    /// has been checked.
    pub fn new(config: FacadeConfig) -> Result<Self, HttpError> {
        let base_url = validate(&config)?;
        let headers = header_map(&config.headers)?;
        let client = BasicClient::with_options(config.timeout, headers)
            .map_err(|e| HttpError::Config(format!("failed to build HTTP client: {e}")))?;
        Self::build(config, base_url, Box::new(client))
    }

    /// Builds a facade over a caller-supplied transport.
    ///
    /// The configuration is validated exactly as in [`HttpFacade::new`], but
    /// `timeout` and `headers` are left to `client`.
    pub fn with_client(config: FacadeConfig, client: impl HttpClient + 'static) -> Result<Self, HttpError> {
        let base_url = validate(&config)?;
        header_map(&config.headers)?;
        Self::build(config, base_url, Box::new(client))
    }

    fn build(config: FacadeConfig, base_url: Url, client: Box<dyn HttpClient>) -> Result<Self, HttpError> {
        let api = config.api.unwrap_or_default();
        let token_header = TokenHeader::new(&config.token_header, config.token_prefix)?;

        info!(
            api = %api,
            timeout_ms = u64::try_from(config.timeout.as_millis()).unwrap_or(u64::MAX),
            token_header = %token_header.header_name(),
            has_token_provider = config.token_provider.is_some(),
            loading = config.loading,
            "HTTP facade ready"
        );

        Ok(Self {
            inner: Arc::new(Inner {
                api,
                base_url,
                client,
                loading: Arc::new(LoadingTracker::new(
                    config.loading,
                    config.on_show_loading,
                    config.on_hide_loading,
                )),
                token_header,
                token_provider: config.token_provider,
                on_reject: config.on_reject,
                on_success: config.on_success,
                settle_non_ok: config.settle_non_ok,
            }),
        })
    }

    pub fn get_base_url(&self) -> &str {
        &self.inner.api
    }

    /// Number of dispatched requests that have not completed yet.
    pub fn in_flight(&self) -> usize {
        self.inner.loading.in_flight()
    }

    pub fn set_loading(&self) {
        self.inner.loading.set_loading();
    }

    pub fn hide_loading(&self) {
        self.inner.loading.hide_loading();
    }

    pub fn get_config(&self, method: Method, url: &str, data: Option<Value>, options: CallOptions) -> RequestConfig {
        request::get_config(method, url, data, options)
    }

    /// Sends a descriptor built by the caller.
    ///
    /// A malformed descriptor is rejected before the loading slot is taken.
    /// Otherwise the request holds its own slot until it completes.
    pub fn request(&self, config: RequestConfig) -> ResponseFuture {
        match self.inner.prepare(config) {
            Ok(prepared) => {
                let guard = LoadingGuard::acquire(self.inner.loading.clone());
                Box::pin(self.inner.clone().dispatch(prepared, guard))
            }
            Err(e) => Box::pin(std::future::ready(Err(e))),
        }
    }

    /// Sends an untyped JSON descriptor such as
    /// `{"method": "post", "url": "/items", "data": {...}}`.
    ///
    /// Anything that is not a JSON object, `null` included, is an
    /// [`HttpError::InvalidArgument`].
    pub fn request_value(&self, descriptor: Value) -> ResponseFuture {
        match parse_descriptor(descriptor) {
            Ok(config) => self.request(config),
            Err(e) => Box::pin(std::future::ready(Err(e))),
        }
    }

    pub fn get(&self, url: &str, data: Option<Value>, options: CallOptions) -> ResponseFuture {
        self.call(Method::Get, url, data, options)
    }

    pub fn post(&self, url: &str, data: Option<Value>, options: CallOptions) -> ResponseFuture {
        self.call(Method::Post, url, data, options)
    }

    pub fn put(&self, url: &str, data: Option<Value>, options: CallOptions) -> ResponseFuture {
        self.call(Method::Put, url, data, options)
    }

    pub fn delete(&self, url: &str, data: Option<Value>, options: CallOptions) -> ResponseFuture {
        self.call(Method::Delete, url, data, options)
    }

    pub fn get_as<T>(&self, url: &str, data: Option<Value>, options: CallOptions) -> ResponseFuture<T>
    where
        T: DeserializeOwned + Send + 'static,
    {
        typed(self.get(url, data, options))
    }

    pub fn post_as<T>(&self, url: &str, data: Option<Value>, options: CallOptions) -> ResponseFuture<T>
    where
        T: DeserializeOwned + Send + 'static,
    {
        typed(self.post(url, data, options))
    }

    pub fn put_as<T>(&self, url: &str, data: Option<Value>, options: CallOptions) -> ResponseFuture<T>
    where
        T: DeserializeOwned + Send + 'static,
    {
        typed(self.put(url, data, options))
    }

    pub fn delete_as<T>(&self, url: &str, data: Option<Value>, options: CallOptions) -> ResponseFuture<T>
    where
        T: DeserializeOwned + Send + 'static,
    {
        typed(self.delete(url, data, options))
    }

    fn call(&self, method: Method, url: &str, data: Option<Value>, options: CallOptions) -> ResponseFuture {
        let guard = LoadingGuard::acquire(self.inner.loading.clone());
        let config = self.get_config(method, url, data, options);
        match self.inner.prepare(config) {
            Ok(prepared) => Box::pin(self.inner.clone().dispatch(prepared, guard)),
            Err(e) => {
                drop(guard);
                Box::pin(std::future::ready(Err(e)))
            }
        }
    }
}

impl Inner {
    fn prepare(&self, config: RequestConfig) -> Result<Prepared, HttpError> {
        let request = config.to_request(&self.base_url)?;
        Ok(Prepared {
            request,
            auth_api: config.auth_api,
            cancel_token: config.cancel_token,
        })
    }

    #[tracing::instrument(
        name = "http_request",
        skip_all,
        fields(method = %prepared.request.method(), url = %prepared.request.url(), auth = prepared.auth_api)
    )]
    async fn dispatch(self: Arc<Self>, prepared: Prepared, mut guard: LoadingGuard) -> Result<Value, HttpError> {
        let Prepared {
            request,
            auth_api,
            cancel_token,
        } = prepared;

        let exchange = self.exchange(request, auth_api);
        let outcome = match cancel_token {
            Some(token) => tokio::select! {
                biased;
                _ = token.cancelled() => Err(HttpError::Cancelled),
                outcome = exchange => outcome,
            },
            None => exchange.await,
        };

        // The slot is released before any callback sees the outcome.
        guard.release();

        match outcome {
            Ok(Completion::Ok(body)) => {
                debug!(bytes = body.len(), "Request completed");
                Ok(decode(&body))
            }
            Ok(Completion::NonOk(response)) => self.non_ok(response).await,
            Err(e) => Err(self.reject(e)),
        }
    }

    /// Attaches the token if asked to, sends the request, and reads the body
    /// of anything that is not a plain non-200 success.
    async fn exchange(&self, mut request: Request, auth_api: bool) -> Result<Completion, HttpError> {
        if auth_api {
            if let Some(provider) = &self.token_provider {
                let token = provider.token().await.map_err(HttpError::Token)?;
                self.token_header.apply(request.headers_mut(), &token)?;
                debug!(header = %self.token_header.header_name(), "Token attached");
            }
        }

        let response = self.client.execute(request).await?;
        let status = response.status();

        if status == StatusCode::OK {
            return Ok(Completion::Ok(response.bytes().await?));
        }
        if status.is_success() {
            return Ok(Completion::NonOk(response));
        }

        let body = response.text().await.unwrap_or_default();
        Err(HttpError::Status { status, body })
    }

    async fn non_ok(&self, response: Response) -> Result<Value, HttpError> {
        warn!(status = %response.status(), "Request succeeded without status 200");
        if let Some(on_success) = &self.on_success {
            on_success(&response);
        }

        if !self.settle_non_ok {
            // Left unsettled: the caller only learns about it through `on_success`.
            // The response goes first so its connection is not held forever.
            drop(response);
            return std::future::pending().await;
        }

        let body = response.bytes().await.map_err(|e| self.reject(e.into()))?;
        Ok(decode(&body))
    }

    /// Routes a failure to the reject callback. Cancellations skip it.
    fn reject(&self, err: HttpError) -> HttpError {
        if err.is_cancel() {
            debug!("Request cancelled");
            return err;
        }
        warn!(error = %err, "Request failed");
        if let Some(on_reject) = &self.on_reject {
            on_reject(&err);
        }
        err
    }
}

/// Checks everything that must hold before a transport is built and returns
/// the parsed base URL.
fn validate(config: &FacadeConfig) -> Result<Url, HttpError> {
    let api = match config.api.as_deref() {
        Some(api) if !api.trim().is_empty() => api,
        _ => return Err(HttpError::Config("api is a required option".to_string())),
    };
    if config.require_token && config.token_provider.is_none() {
        return Err(HttpError::Config("a token provider is required".to_string()));
    }
    Url::parse(api).map_err(|e| HttpError::Config(format!("invalid api url '{api}': {e}")))
}

fn header_map(headers: &BTreeMap<String, String>) -> Result<HeaderMap, HttpError> {
    let mut map = HeaderMap::with_capacity(headers.len());
    for (name, value) in headers {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| HttpError::Config(format!("default header name '{name}': {e}")))?;
        let value = HeaderValue::from_str(value)
            .map_err(|e| HttpError::Config(format!("default header '{name}' value: {e}")))?;
        map.insert(name, value);
    }
    Ok(map)
}

fn parse_descriptor(descriptor: Value) -> Result<RequestConfig, HttpError> {
    if !descriptor.is_object() {
        return Err(HttpError::InvalidArgument(
            "request descriptor is missing or not an object".to_string(),
        ));
    }
    serde_json::from_value(descriptor)
        .map_err(|e| HttpError::InvalidArgument(format!("request descriptor: {e}")))
}

/// JSON bodies are parsed; an empty body is `null`; anything else comes back
/// as a string.
fn decode(body: &[u8]) -> Value {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Value::Null;
    }
    serde_json::from_slice(body).unwrap_or_else(|_| Value::String(String::from_utf8_lossy(body).into_owned()))
}

fn typed<T>(response: ResponseFuture) -> ResponseFuture<T>
where
    T: DeserializeOwned + Send + 'static,
{
    Box::pin(async move {
        let value = response.await?;
        Ok(serde_json::from_value(value)?)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::{FnToken, StaticToken};
    use async_trait::async_trait;
    use serde::Deserialize;
    use serde_json::json;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    const API: &str = "https://api.example.com/v1";

    struct Seen {
        method: reqwest::Method,
        url: Url,
        headers: HeaderMap,
        body: Option<Vec<u8>>,
    }

    /// Answers by path:
    /// `/ok` 200 JSON, `/text` 200 plain text, `/created` 201 JSON,
    /// `/empty` 204, `/fail` 500, `/slow` 200 after a long delay,
    /// `/quick` 200 after a short delay.
    #[derive(Default)]
    struct FakeClient {
        seen: Mutex<Vec<Seen>>,
    }

    impl FakeClient {
        fn seen(&self) -> std::sync::MutexGuard<'_, Vec<Seen>> {
            self.seen.lock().unwrap()
        }
    }

    #[async_trait]
    impl HttpClient for FakeClient {
        async fn execute(&self, req: Request) -> reqwest::Result<Response> {
            let path = req.url().path().trim_start_matches("/v1").to_string();
            self.seen.lock().unwrap().push(Seen {
                method: req.method().clone(),
                url: req.url().clone(),
                headers: req.headers().clone(),
                body: req.body().and_then(|b| b.as_bytes()).map(<[u8]>::to_vec),
            });

            let (status, body): (u16, &str) = match path.as_str() {
                "/ok" => (200, r#"{"ok":true}"#),
                "/text" => (200, "plain"),
                "/created" => (201, r#"{"id":7}"#),
                "/empty" => (204, ""),
                "/fail" => (500, "boom"),
                "/slow" => {
                    tokio::time::sleep(Duration::from_secs(30)).await;
                    (200, "{}")
                }
                "/quick" => {
                    tokio::time::sleep(Duration::from_millis(20)).await;
                    (200, "{}")
                }
                _ => (404, "not found"),
            };

            Ok(http::Response::builder()
                .status(status)
                .body(body.to_string())
                .unwrap()
                .into())
        }
    }

    #[derive(Default)]
    struct Calls {
        shows: AtomicUsize,
        hides: AtomicUsize,
        rejects: Mutex<Vec<String>>,
        successes: Mutex<Vec<u16>>,
    }

    fn config_with(calls: &Arc<Calls>) -> FacadeConfig {
        let (c1, c2, c3, c4) = (calls.clone(), calls.clone(), calls.clone(), calls.clone());
        FacadeConfig::new(API)
            .with_token_provider(StaticToken::new("secret"))
            .on_show_loading(move || {
                c1.shows.fetch_add(1, Ordering::SeqCst);
            })
            .on_hide_loading(move || {
                c2.hides.fetch_add(1, Ordering::SeqCst);
            })
            .on_reject(move |e| c3.rejects.lock().unwrap().push(e.to_string()))
            .on_success(move |r| c4.successes.lock().unwrap().push(r.status().as_u16()))
    }

    fn facade(config: FacadeConfig) -> (HttpFacade, Arc<FakeClient>) {
        let client = Arc::new(FakeClient::default());
        let facade = HttpFacade::with_client(config, client.clone()).unwrap();
        (facade, client)
    }

    #[test]
    fn test_missing_api_is_config_error() {
        let err = HttpFacade::new(FacadeConfig::default()).err().unwrap();
        assert!(matches!(err, HttpError::Config(_)));

        let err = HttpFacade::new(FacadeConfig::new("  ")).err().unwrap();
        assert!(matches!(err, HttpError::Config(_)));
    }

    #[test]
    fn test_invalid_construction_options() {
        let err = HttpFacade::new(FacadeConfig::new("not a url")).err().unwrap();
        assert!(matches!(err, HttpError::Config(_)));

        let err = HttpFacade::new(FacadeConfig::new(API).require_token(true)).err().unwrap();
        assert!(matches!(err, HttpError::Config(_)));

        let err = HttpFacade::new(FacadeConfig::new(API).with_token_header("bad name", "")).err().unwrap();
        assert!(matches!(err, HttpError::Config(_)));

        let err = HttpFacade::new(FacadeConfig::new(API).with_header("X-Bad", "a\nb")).err().unwrap();
        assert!(matches!(err, HttpError::Config(_)));
    }

    #[tokio::test]
    async fn test_new_and_base_url() {
        let facade = HttpFacade::new(
            FacadeConfig::new(API)
                .require_token(true)
                .with_token_provider(StaticToken::new("x")),
        )
        .unwrap();
        assert_eq!(facade.get_base_url(), API);
        assert_eq!(facade.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_unbounded_timeout_is_accepted() {
        let calls = Arc::new(Calls::default());
        let (facade, _client) = facade(config_with(&calls).with_timeout(Duration::MAX));

        let value = facade.get("/ok", None, CallOptions::new()).await.unwrap();
        assert_eq!(value, json!({"ok": true}));
    }

    #[tokio::test]
    async fn test_ok_resolves_payload() {
        let calls = Arc::new(Calls::default());
        let (facade, _client) = facade(config_with(&calls));

        let value = facade.get("/ok", None, CallOptions::new()).await.unwrap();

        assert_eq!(value, json!({"ok": true}));
        assert_eq!(facade.in_flight(), 0);
        assert_eq!(calls.shows.load(Ordering::SeqCst), 1);
        assert_eq!(calls.hides.load(Ordering::SeqCst), 1);
        assert!(calls.rejects.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_non_json_ok_body_is_string() {
        let (facade, _client) = facade(FacadeConfig::new(API));
        let value = facade.get("/text", None, CallOptions::new()).await.unwrap();
        assert_eq!(value, json!("plain"));
    }

    #[tokio::test]
    async fn test_get_sends_query_and_post_sends_body() {
        let (facade, client) = facade(FacadeConfig::new(API));

        facade.get("/ok", Some(json!({"id": 1})), CallOptions::new()).await.unwrap();
        facade.post("/ok", Some(json!({"id": 1})), CallOptions::new()).await.unwrap();

        let seen = client.seen();
        assert_eq!(seen[0].method, reqwest::Method::GET);
        assert_eq!(seen[0].url.as_str(), "https://api.example.com/v1/ok?id=1");
        assert!(seen[0].body.is_none());

        assert_eq!(seen[1].method, reqwest::Method::POST);
        assert_eq!(seen[1].url.query(), None);
        assert_eq!(seen[1].body.as_deref(), Some(br#"{"id":1}"#.as_slice()));
        assert_eq!(seen[1].headers["content-type"], "application/json");
    }

    #[tokio::test]
    async fn test_token_header_follows_auth_flag() {
        let (facade, client) = facade(FacadeConfig::new(API).with_token_provider(StaticToken::new("secret")));

        facade.get("/ok", None, CallOptions::new()).await.unwrap();
        facade.put("/ok", None, CallOptions::public()).await.unwrap();
        facade.delete("/ok", None, CallOptions::new().auth_api(true)).await.unwrap();

        let seen = client.seen();
        assert_eq!(seen[0].headers["authorization"], "Bearer secret");
        assert!(!seen[1].headers.contains_key("authorization"));
        assert_eq!(seen[2].headers["authorization"], "Bearer secret");
    }

    #[tokio::test]
    async fn test_custom_token_header() {
        let config = FacadeConfig::new(API)
            .with_token_provider(StaticToken::new("k"))
            .with_token_header("X-Access-Token", "Token ");
        let (facade, client) = facade(config);

        facade.get("/ok", None, CallOptions::new()).await.unwrap();

        let seen = client.seen();
        assert_eq!(seen[0].headers["x-access-token"], "Token k");
        assert!(!seen[0].headers.contains_key("authorization"));
    }

    #[tokio::test]
    async fn test_no_provider_sends_no_token() {
        let (facade, client) = facade(FacadeConfig::new(API));
        facade.get("/ok", None, CallOptions::new()).await.unwrap();
        assert!(!client.seen()[0].headers.contains_key("authorization"));
    }

    #[tokio::test]
    async fn test_concurrent_auth_and_public_do_not_leak() {
        let (facade, client) = facade(FacadeConfig::new(API).with_token_provider(StaticToken::new("secret")));

        let handles: Vec<_> = (0..10)
            .map(|i| {
                let options = if i % 2 == 0 {
                    CallOptions::new().header("X-Index", i.to_string())
                } else {
                    CallOptions::public().header("X-Index", i.to_string())
                };
                tokio::spawn(facade.get("/quick", None, options))
            })
            .collect();
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        for seen in client.seen().iter() {
            let index: usize = seen.headers["x-index"].to_str().unwrap().parse().unwrap();
            assert_eq!(seen.headers.contains_key("authorization"), index % 2 == 0);
        }
    }

    #[tokio::test]
    async fn test_concurrent_requests_show_and_hide_once() {
        let calls = Arc::new(Calls::default());
        let (facade, _client) = facade(config_with(&calls));

        let paths = ["/quick", "/fail", "/ok", "/quick", "/fail", "/ok", "/quick"];
        let futures: Vec<_> = paths
            .iter()
            .map(|p| facade.get(p, None, CallOptions::new()))
            .collect();
        assert_eq!(facade.in_flight(), paths.len());

        let handles: Vec<_> = futures.into_iter().map(tokio::spawn).collect();
        let mut failures = 0;
        for handle in handles {
            if handle.await.unwrap().is_err() {
                failures += 1;
            }
        }

        assert_eq!(failures, 2);
        assert_eq!(facade.in_flight(), 0);
        assert_eq!(calls.shows.load(Ordering::SeqCst), 1);
        assert_eq!(calls.hides.load(Ordering::SeqCst), 1);
        assert_eq!(calls.rejects.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_loading_disabled_never_fires() {
        let calls = Arc::new(Calls::default());
        let (facade, _client) = facade(config_with(&calls).with_loading(false));

        facade.get("/ok", None, CallOptions::new()).await.unwrap();
        facade.get("/fail", None, CallOptions::new()).await.unwrap_err();

        assert_eq!(facade.in_flight(), 0);
        assert_eq!(calls.shows.load(Ordering::SeqCst), 0);
        assert_eq!(calls.hides.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_non_ok_success_never_settles() {
        let calls = Arc::new(Calls::default());
        let (facade, _client) = facade(config_with(&calls));

        let pending = facade.delete("/empty", None, CallOptions::new());
        let result = tokio::time::timeout(Duration::from_millis(200), pending).await;

        assert!(result.is_err(), "a 204 response must leave the call pending");
        assert_eq!(*calls.successes.lock().unwrap(), vec![204]);
        assert!(calls.rejects.lock().unwrap().is_empty());
        assert_eq!(facade.in_flight(), 0);
        assert_eq!(calls.hides.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_settle_non_ok_resolves_payload() {
        let calls = Arc::new(Calls::default());
        let (facade, _client) = facade(config_with(&calls).settle_non_ok(true));

        let value = facade.post("/created", Some(json!({"name": "a"})), CallOptions::new()).await.unwrap();

        assert_eq!(value, json!({"id": 7}));
        assert_eq!(*calls.successes.lock().unwrap(), vec![201]);
    }

    #[tokio::test]
    async fn test_error_status_rejects_once() {
        let calls = Arc::new(Calls::default());
        let (facade, _client) = facade(config_with(&calls));

        let err = facade.post("/fail", None, CallOptions::new()).await.unwrap_err();

        assert_eq!(err.status(), Some(StatusCode::INTERNAL_SERVER_ERROR));
        let rejects = calls.rejects.lock().unwrap();
        assert_eq!(rejects.len(), 1);
        assert_eq!(rejects[0], err.to_string());
        assert_eq!(facade.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_cancellation_skips_reject_callback() {
        let calls = Arc::new(Calls::default());
        let (facade, _client) = facade(config_with(&calls));

        let token = CancellationToken::new();
        let pending = facade.get("/slow", None, CallOptions::new().cancel_token(token.clone()));
        let canceller = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            canceller.cancel();
        });

        let err = pending.await.unwrap_err();

        assert!(err.is_cancel());
        assert!(calls.rejects.lock().unwrap().is_empty());
        assert_eq!(facade.in_flight(), 0);
        assert_eq!(calls.hides.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_precancelled_request_is_never_sent() {
        let (facade, client) = facade(FacadeConfig::new(API));
        let token = CancellationToken::new();
        token.cancel();

        let err = facade
            .get("/ok", None, CallOptions::new().cancel_token(token))
            .await
            .unwrap_err();

        assert!(err.is_cancel());
        assert!(client.seen().is_empty());
    }

    #[tokio::test]
    async fn test_non_object_descriptor_rejected_synchronously() {
        let calls = Arc::new(Calls::default());
        let (facade, client) = facade(config_with(&calls));

        for descriptor in [Value::Null, json!("foo"), json!([1, 2]), json!(3)] {
            let pending = facade.request_value(descriptor);
            assert_eq!(facade.in_flight(), 0);
            assert!(matches!(pending.await, Err(HttpError::InvalidArgument(_))));
        }

        assert_eq!(calls.shows.load(Ordering::SeqCst), 0);
        assert!(calls.rejects.lock().unwrap().is_empty());
        assert!(client.seen().is_empty());
    }

    #[tokio::test]
    async fn test_request_value_dispatches_object() {
        let (facade, client) = facade(FacadeConfig::new(API).with_token_provider(StaticToken::new("s")));

        let value = facade
            .request_value(json!({"method": "put", "url": "/ok", "data": {"a": 1}, "authApi": false}))
            .await
            .unwrap();

        assert_eq!(value, json!({"ok": true}));
        let seen = client.seen();
        assert_eq!(seen[0].method, reqwest::Method::PUT);
        assert!(!seen[0].headers.contains_key("authorization"));
    }

    #[tokio::test]
    async fn test_malformed_verb_call_keeps_counter_balanced() {
        let calls = Arc::new(Calls::default());
        let (facade, client) = facade(config_with(&calls));

        let err = facade
            .get("/ok", None, CallOptions::new().header("bad header", "x"))
            .await
            .unwrap_err();

        assert!(matches!(err, HttpError::InvalidArgument(_)));
        assert_eq!(facade.in_flight(), 0);
        assert_eq!(calls.shows.load(Ordering::SeqCst), calls.hides.load(Ordering::SeqCst));
        assert!(client.seen().is_empty());
    }

    #[tokio::test]
    async fn test_loading_taken_at_call_time() {
        let (facade, client) = facade(FacadeConfig::new(API));

        let pending = facade.get("/ok", None, CallOptions::new());
        assert_eq!(facade.in_flight(), 1);
        assert!(client.seen().is_empty());

        pending.await.unwrap();
        assert_eq!(facade.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_dropped_request_releases_slot() {
        let calls = Arc::new(Calls::default());
        let (facade, _client) = facade(config_with(&calls));

        let pending = facade.get("/slow", None, CallOptions::new());
        assert_eq!(facade.in_flight(), 1);
        let _ = tokio::time::timeout(Duration::from_millis(20), pending).await;

        assert_eq!(facade.in_flight(), 0);
        assert_eq!(calls.hides.load(Ordering::SeqCst), 1);
        assert!(calls.rejects.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_token_failure_rejects() {
        let calls = Arc::new(Calls::default());
        let config = config_with(&calls)
            .with_token_provider(FnToken(|| async { Err::<String, _>(anyhow::anyhow!("vault unavailable")) }));
        let (facade, client) = facade(config);

        let err = facade.get("/ok", None, CallOptions::new()).await.unwrap_err();

        assert!(matches!(err, HttpError::Token(_)));
        assert_eq!(calls.rejects.lock().unwrap().len(), 1);
        assert_eq!(facade.in_flight(), 0);
        assert!(client.seen().is_empty());
    }

    #[tokio::test]
    async fn test_typed_response() {
        #[derive(Deserialize)]
        struct Ack {
            ok: bool,
        }

        let (facade, _client) = facade(FacadeConfig::new(API));
        let ack: Ack = facade.get_as("/ok", None, CallOptions::new()).await.unwrap();
        assert!(ack.ok);

        let err = facade
            .get_as::<Vec<u32>>("/ok", None, CallOptions::new())
            .await
            .err()
            .unwrap();
        assert!(matches!(err, HttpError::Decode(_)));
    }
}
