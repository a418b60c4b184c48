use std::sync::Arc;

use crate::{
    enforcer::Enforcer,
    error::AuthzError,
    role::Role,
    store::PolicyStore,
    token::{StaticSecretResolver, TokenResolver},
};

/// What the gate needs to know about an inbound request.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RequestDescriptor {
    pub path: String,
    pub method: String,
    pub auth_header: Option<String>,
}

impl RequestDescriptor {
    pub fn new(path: impl Into<String>, method: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            method: method.into(),
            auth_header: None,
        }
    }

    pub fn with_auth_header(mut self, header: impl Into<String>) -> Self {
        self.auth_header = Some(header.into());
        self
    }

    pub fn with_bearer(self, token: &str) -> Self {
        self.with_auth_header(format!("Bearer {token}"))
    }
}

/// Entry point for request handlers: token resolution plus enforcement over
/// one shared policy store.
#[derive(Clone)]
pub struct Gatekeeper {
    resolver: Arc<dyn TokenResolver>,
    enforcer: Enforcer,
}

impl std::fmt::Debug for Gatekeeper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Gatekeeper")
            .field("enforcer", &self.enforcer)
            .finish_non_exhaustive()
    }
}

impl Gatekeeper {
    pub fn new(policy: Arc<PolicyStore>, resolver: Arc<dyn TokenResolver>) -> Self {
        Self {
            resolver,
            enforcer: Enforcer::new(policy),
        }
    }

    /// Gatekeeper using [`StaticSecretResolver`].
    pub fn with_static_secret(policy: Arc<PolicyStore>, secret: Option<String>) -> Self {
        Self::new(policy, Arc::new(StaticSecretResolver::new(secret)))
    }

    pub fn policy(&self) -> &Arc<PolicyStore> {
        self.enforcer.policy()
    }

    pub fn enforcer(&self) -> &Enforcer {
        &self.enforcer
    }

    pub fn resolve_role(&self, request: &RequestDescriptor) -> Role {
        let snapshot = self.policy().snapshot();
        self.resolver
            .resolve(request.auth_header.as_deref(), &snapshot)
    }

    pub fn enforce(&self, role: &Role, path: &str, method: &str) -> Result<(), AuthzError> {
        self.enforcer.enforce(role, path, method)
    }

    pub fn require_at_least(&self, role: &Role, required: &Role) -> Result<(), AuthzError> {
        self.enforcer.require_at_least(role, required)
    }

    pub fn require_admin(&self, role: &Role) -> Result<(), AuthzError> {
        self.enforcer.require_admin(role)
    }

    /// Resolve the caller's role and enforce the endpoint's requirement.
    /// Returns the resolved role so handlers can pass it on.
    /// Both steps read the same policy snapshot.
    pub fn authorize(&self, request: &RequestDescriptor) -> Result<Role, AuthzError> {
        let snapshot = self.policy().snapshot();
        let role = self
            .resolver
            .resolve(request.auth_header.as_deref(), &snapshot);
        Enforcer::enforce_in(&snapshot, &role, &request.path, &request.method)?;
        Ok(role)
    }
}
