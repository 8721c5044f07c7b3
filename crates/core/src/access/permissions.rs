use crate::session::Role;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Capabilities a role can hold in the front end
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    TrackTime,
    ViewOwnTimesheet,
    SubmitRequests,
    ViewDashboard,
    ManageEmployees,
    ApproveRequests,
    ManagePolicies,
    ViewReports,
    ManageCompanies,
    ManageBilling,
}

const EMPLOYEE: &[Capability] = &[
    Capability::TrackTime,
    Capability::ViewOwnTimesheet,
    Capability::SubmitRequests,
];

const COMPANY_ADMIN: &[Capability] = &[
    Capability::TrackTime,
    Capability::ViewOwnTimesheet,
    Capability::SubmitRequests,
    Capability::ViewDashboard,
    Capability::ManageEmployees,
    Capability::ApproveRequests,
    Capability::ManagePolicies,
    Capability::ViewReports,
];

const SUPER_ADMIN: &[Capability] = &[
    Capability::TrackTime,
    Capability::ViewOwnTimesheet,
    Capability::SubmitRequests,
    Capability::ViewDashboard,
    Capability::ManageEmployees,
    Capability::ApproveRequests,
    Capability::ManagePolicies,
    Capability::ViewReports,
    Capability::ManageCompanies,
    Capability::ManageBilling,
];

/// Static capability table
pub const fn capabilities_for(role: Role) -> &'static [Capability] {
    match role {
        Role::Employee => EMPLOYEE,
        Role::CompanyAdmin => COMPANY_ADMIN,
        Role::SuperAdmin => SUPER_ADMIN,
    }
}

/// Reasons for permission denial
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PermissionDenied {
    #[error("Role {role} lacks capability {capability:?}")]
    MissingCapability { role: Role, capability: Capability },
}

pub type PermissionResult = Result<(), PermissionDenied>;

/// Answers capability questions for a single role
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PermissionEvaluator {
    role: Role,
}

impl PermissionEvaluator {
    pub const fn for_role(role: Role) -> Self {
        Self { role }
    }

    pub const fn role(&self) -> Role {
        self.role
    }

    pub const fn capabilities(&self) -> &'static [Capability] {
        capabilities_for(self.role)
    }

    pub fn can(&self, capability: Capability) -> bool {
        self.capabilities().contains(&capability)
    }

    pub fn check(&self, capability: Capability) -> PermissionResult {
        if self.can(capability) {
            Ok(())
        } else {
            Err(PermissionDenied::MissingCapability {
                role: self.role,
                capability,
            })
        }
    }

    pub fn can_access_dashboard(&self) -> bool {
        self.can(Capability::ViewDashboard)
    }

    pub fn can_manage_employees(&self) -> bool {
        self.can(Capability::ManageEmployees)
    }

    pub fn can_manage_companies(&self) -> bool {
        self.can(Capability::ManageCompanies)
    }

    pub fn can_manage_billing(&self) -> bool {
        self.can(Capability::ManageBilling)
    }

    pub fn can_manage_policies(&self) -> bool {
        self.can(Capability::ManagePolicies)
    }

    pub fn can_approve_requests(&self) -> bool {
        self.can(Capability::ApproveRequests)
    }
}
