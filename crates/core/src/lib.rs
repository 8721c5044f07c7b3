//! Shiftclock core types and utilities

pub mod access;
pub mod config;
pub mod error;
pub mod logging;
pub mod session;

pub use access::{
    Capability, GuardDecision, PermissionDenied, PermissionEvaluator, RenderPass,
    RouteRequirement, evaluate_route,
};
pub use config::{ApiConfig, LogFormat, LoggingConfig, SessionConfig, Settings, StorageConfig};
pub use error::{CoreError, CoreResult};
pub use session::{Role, Session, TokenPair};
