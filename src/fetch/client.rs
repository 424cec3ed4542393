use async_trait::async_trait;
use reqwest::{Request, Response};
use std::sync::Arc;

/// The transport seam of the facade.
///
/// Implementors send a fully built request and hand back whatever the wire
/// returned; status classification happens in the facade.
#[async_trait]
pub trait HttpClient: Send + Sync {
    async fn execute(&self, req: Request) -> reqwest::Result<Response>;
}

#[async_trait]
impl<C: HttpClient + ?Sized> HttpClient for Arc<C> {
    async fn execute(&self, req: Request) -> reqwest::Result<Response> {
        (**self).execute(req).await
    }
}
