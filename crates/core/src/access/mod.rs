pub mod guard;
pub mod permissions;

pub use guard::{GuardDecision, RenderPass, RouteRequirement, evaluate_route};
pub use permissions::{
    Capability, PermissionDenied, PermissionEvaluator, PermissionResult, capabilities_for,
};
