//! Authentication module

pub mod coordinator;
pub mod error_messages;

pub use coordinator::{AuthCoordinator, AuthCoordinatorBuilder, AuthState, AuthStatus};
pub use error_messages::{Language, timeout_message, user_message};
