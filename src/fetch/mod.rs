mod client;
mod basic;
pub mod auth;

pub use client::HttpClient;
pub use basic::BasicClient;
