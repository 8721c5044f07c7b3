//! Backends for the authentication endpoints

pub mod auth;
pub mod mock;

pub use auth::{AuthApi, Credentials, HttpAuthApi};
pub use mock::InMemoryAuthApi;
