//! Request-level authentication.
//!
//! Credentials are written into each outgoing request's own header map, never
//! into state shared between requests.

mod token_header;

pub use token_header::TokenHeader;
