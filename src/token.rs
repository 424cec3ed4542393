//! Token retrieval.
//!
//! [`TokenProvider`] is the async trait the facade calls before every
//! authenticated request. [`StaticToken`], [`EnvToken`] and [`FnToken`]
//! cover the common ways of supplying one.

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::future::Future;

/// Produces the raw token for an authenticated request.
///
/// Called once per request whose `auth_api` flag is set, so implementations
/// that refresh or rotate tokens see every call.
#[async_trait]
pub trait TokenProvider: Send + Sync {
    async fn token(&self) -> Result<String>;
}

/// A fixed token known at startup.
#[derive(Clone)]
pub struct StaticToken(String);

impl StaticToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }
}

impl std::fmt::Debug for StaticToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("StaticToken(<redacted>)")
    }
}

#[async_trait]
impl TokenProvider for StaticToken {
    async fn token(&self) -> Result<String> {
        Ok(self.0.clone())
    }
}

/// Reads the token from an environment variable on every call, so a value
/// exported after startup (or reloaded via `.env`) is picked up.
#[derive(Debug, Clone)]
pub struct EnvToken {
    var: String,
}

impl EnvToken {
    pub fn new(var: impl Into<String>) -> Self {
        Self { var: var.into() }
    }
}

#[async_trait]
impl TokenProvider for EnvToken {
    async fn token(&self) -> Result<String> {
        std::env::var(&self.var).with_context(|| format!("token variable '{}' is not set", self.var))
    }
}

/// Adapts an async closure into a [`TokenProvider`].
///
/// ```ignore
/// let provider = FnToken(|| async { Ok("abc".to_string()) });
/// ```
pub struct FnToken<F>(pub F);

#[async_trait]
impl<F, Fut> TokenProvider for FnToken<F>
where
    F: Fn() -> Fut + Send + Sync,
    Fut: Future<Output = Result<String>> + Send,
{
    async fn token(&self) -> Result<String> {
        (self.0)().await
    }
}
