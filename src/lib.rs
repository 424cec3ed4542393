pub mod config;
pub mod error;
pub mod facade;
pub mod fetch;
pub mod loading;
pub mod request;
pub mod token;

pub use config::FacadeConfig;
pub use error::HttpError;
pub use facade::{HttpFacade, ResponseFuture};
pub use request::{CallOptions, Method, RequestConfig};
