use std::sync::Arc;

use tracing::{debug, info};

use crate::{error::AuthzError, policy::PolicyConfig, role::Role, store::PolicyStore};

/// Outcome of comparing a role against an endpoint's requirement.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Decision {
    pub role: Role,
    pub required: Role,
    pub allowed: bool,
}

impl Decision {
    fn evaluate(policy: &PolicyConfig, role: &Role, required: &Role) -> Self {
        Self {
            role: role.clone(),
            required: required.clone(),
            allowed: policy.hierarchy().at_least(role, required),
        }
    }

    pub fn into_result(self) -> Result<(), AuthzError> {
        if self.allowed {
            Ok(())
        } else {
            Err(AuthzError::Denied {
                required: self.required,
            })
        }
    }
}

/// Stateless allow/deny over the shared policy store.
#[derive(Clone, Debug)]
pub struct Enforcer {
    policy: Arc<PolicyStore>,
}

impl Enforcer {
    pub fn new(policy: Arc<PolicyStore>) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &Arc<PolicyStore> {
        &self.policy
    }

    /// Look up the requirement for `(path, method)` and compare, using a
    /// single snapshot for both steps.
    pub fn decide(&self, role: &Role, path: &str, method: &str) -> Decision {
        Self::decide_in(&self.policy.snapshot(), role, path, method)
    }

    /// [`Enforcer::decide`] against a snapshot the caller already holds.
    pub fn decide_in(policy: &PolicyConfig, role: &Role, path: &str, method: &str) -> Decision {
        Decision::evaluate(policy, role, policy.required_role_for(path, method))
    }

    pub fn check(&self, role: &Role, path: &str, method: &str) -> bool {
        self.decide(role, path, method).allowed
    }

    pub fn enforce(&self, role: &Role, path: &str, method: &str) -> Result<(), AuthzError> {
        Self::enforce_in(&self.policy.snapshot(), role, path, method)
    }

    pub fn enforce_in(
        policy: &PolicyConfig,
        role: &Role,
        path: &str,
        method: &str,
    ) -> Result<(), AuthzError> {
        let decision = Self::decide_in(policy, role, path, method);
        if decision.allowed {
            debug!(%role, path, method, required = %decision.required, "access allowed");
        } else {
            info!(%role, path, method, required = %decision.required, "access denied");
        }
        decision.into_result()
    }

    /// Compare against a caller-chosen role instead of the policy table.
    pub fn require_at_least(&self, role: &Role, required: &Role) -> Result<(), AuthzError> {
        Self::require_in(&self.policy.snapshot(), role, required)
    }

    /// [`Enforcer::require_at_least`] with the configured admin role, read from
    /// the same snapshot as the hierarchy.
    pub fn require_admin(&self, role: &Role) -> Result<(), AuthzError> {
        let snapshot = self.policy.snapshot();
        Self::require_in(&snapshot, role, snapshot.admin_role())
    }

    fn require_in(policy: &PolicyConfig, role: &Role, required: &Role) -> Result<(), AuthzError> {
        let decision = Decision::evaluate(policy, role, required);
        if !decision.allowed {
            info!(%role, %required, "fixed role requirement not met");
        }
        decision.into_result()
    }
}
