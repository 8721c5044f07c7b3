//! Navigation guard evaluation
//!
//! Guards run twice in a server-rendered front end: once during the server
//! pass, where no session is visible, and again on the client. The server pass
//! always allows so the client can make the real decision without bouncing the
//! user through a login redirect loop.

use super::permissions::{Capability, PermissionEvaluator};
use crate::session::{Role, Session};

/// Where the guard is being evaluated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RenderPass {
    Server,
    #[default]
    Client,
}

/// What a route needs from the current session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteRequirement {
    Public,
    Authenticated,
    Capability(Capability),
    AnyRole(&'static [Role]),
}

/// Outcome of a guard check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardDecision {
    Allow,
    RedirectToLogin,
    Forbidden,
}

impl GuardDecision {
    pub const fn is_allowed(self) -> bool {
        matches!(self, Self::Allow)
    }
}

pub fn evaluate_route(
    requirement: RouteRequirement,
    session: Option<&Session>,
    pass: RenderPass,
) -> GuardDecision {
    if pass == RenderPass::Server {
        return GuardDecision::Allow;
    }

    let session = match (requirement, session) {
        (RouteRequirement::Public, _) => return GuardDecision::Allow,
        (_, None) => return GuardDecision::RedirectToLogin,
        (_, Some(session)) => session,
    };

    let allowed = match requirement {
        RouteRequirement::Public | RouteRequirement::Authenticated => true,
        RouteRequirement::Capability(capability) => {
            PermissionEvaluator::for_role(session.role).can(capability)
        }
        RouteRequirement::AnyRole(roles) => roles.contains(&session.role),
    };

    if allowed {
        GuardDecision::Allow
    } else {
        GuardDecision::Forbidden
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session(role: Role) -> Session {
        Session {
            user_id: "u1".into(),
            email: "someone@x.com".into(),
            display_name: "Someone".into(),
            role,
            company_id: Some("c1".into()),
        }
    }

    #[test]
    fn test_server_pass_always_allows() {
        let decision = evaluate_route(
            RouteRequirement::Capability(Capability::ManageBilling),
            None,
            RenderPass::Server,
        );
        assert_eq!(decision, GuardDecision::Allow);
    }

    #[test]
    fn test_anonymous_is_redirected() {
        let decision = evaluate_route(RouteRequirement::Authenticated, None, RenderPass::Client);
        assert_eq!(decision, GuardDecision::RedirectToLogin);
        let decision = evaluate_route(RouteRequirement::Public, None, RenderPass::Client);
        assert!(decision.is_allowed());
    }

    #[test]
    fn test_capability_routes() {
        let employee = session(Role::Employee);
        let admin = session(Role::SuperAdmin);
        let dashboard = RouteRequirement::Capability(Capability::ViewDashboard);

        assert_eq!(
            evaluate_route(dashboard, Some(&employee), RenderPass::Client),
            GuardDecision::Forbidden
        );
        assert_eq!(
            evaluate_route(dashboard, Some(&admin), RenderPass::Client),
            GuardDecision::Allow
        );
    }

    #[test]
    fn test_role_list_routes() {
        const ADMINS: &[Role] = &[Role::CompanyAdmin, Role::SuperAdmin];
        let requirement = RouteRequirement::AnyRole(ADMINS);

        assert!(
            evaluate_route(requirement, Some(&session(Role::CompanyAdmin)), RenderPass::Client)
                .is_allowed()
        );
        assert_eq!(
            evaluate_route(requirement, Some(&session(Role::Employee)), RenderPass::Client),
            GuardDecision::Forbidden
        );
    }
}
