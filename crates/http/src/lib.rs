//! HTTP client for the Shiftclock authentication endpoints

pub mod client;
pub mod types;

pub use client::{ApiClient, ClientBuilder, ClientError};
