use reqwest::header::{HeaderMap, HeaderName, HeaderValue};

use crate::error::HttpError;

/// Describes how a token is carried on a request: which header field to set
/// and what to put in front of the raw token.
///
/// `header_name` is e.g. `Authorization` or a provider-specific name such as
/// `X-Access-Token`. `prefix` is prepended verbatim, so `"Bearer "` needs its
/// trailing space and an empty prefix sends the bare token.
#[derive(Debug, Clone)]
pub struct TokenHeader {
    header_name: HeaderName,
    prefix: String,
}

impl TokenHeader {
    /// Validates `header_name` up front so a bad name fails at construction
    /// rather than on the first request.
    pub fn new(header_name: &str, prefix: impl Into<String>) -> Result<Self, HttpError> {
        let header_name = HeaderName::from_bytes(header_name.as_bytes())
            .map_err(|e| HttpError::Config(format!("invalid token header name '{header_name}': {e}")))?;
        Ok(Self {
            header_name,
            prefix: prefix.into(),
        })
    }

    /// Convenience constructor for `Authorization: Bearer <token>`, the most
    /// common pattern for OAuth-style tokens.
    pub fn bearer() -> Self {
        Self {
            header_name: reqwest::header::AUTHORIZATION,
            prefix: "Bearer ".to_string(),
        }
    }

    pub fn header_name(&self) -> &HeaderName {
        &self.header_name
    }

    /// Builds the header value `<prefix><token>`, marked sensitive so it is
    /// redacted from `Debug` output.
    pub fn value(&self, token: &str) -> Result<HeaderValue, HttpError> {
        let mut value = HeaderValue::try_from(format!("{}{}", self.prefix, token)).map_err(|e| {
            HttpError::Token(anyhow::anyhow!(
                "token is not a valid '{}' header value: {e}",
                self.header_name
            ))
        })?;
        value.set_sensitive(true);
        Ok(value)
    }

    /// Writes the token header into `headers` unless the caller already set
    /// that field explicitly for this request.
    pub fn apply(&self, headers: &mut HeaderMap, token: &str) -> Result<(), HttpError> {
        if headers.contains_key(&self.header_name) {
            return Ok(());
        }
        headers.insert(self.header_name.clone(), self.value(token)?);
        Ok(())
    }
}
