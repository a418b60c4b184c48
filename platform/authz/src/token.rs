use std::fmt;

use tracing::debug;

use crate::{policy::PolicyConfig, role::Role};

const BEARER_SCHEME: &str = "bearer";

/// Maps an `Authorization` header to a role.
///
/// Implementations must not fail: anything they cannot validate resolves to
/// the policy's default role.
pub trait TokenResolver: Send + Sync {
    fn resolve(&self, auth_header: Option<&str>, policy: &PolicyConfig) -> Role;
}

/// Split `"<scheme> <credential>"` and return the credential when the scheme
/// is bearer (any case).
pub fn bearer_credential(header: &str) -> Option<&str> {
    let (scheme, credential) = header.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case(BEARER_SCHEME) || credential.is_empty() {
        return None;
    }
    Some(credential)
}

/// Grants the admin role to callers presenting one shared secret.
///
/// Comparison is plain string equality. An empty secret counts as unset.
#[derive(Clone, Default)]
pub struct StaticSecretResolver {
    secret: Option<String>,
}

impl fmt::Debug for StaticSecretResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StaticSecretResolver")
            .field("secret", &self.secret.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl StaticSecretResolver {
    pub fn new(secret: Option<String>) -> Self {
        Self {
            secret: secret.filter(|value| !value.is_empty()),
        }
    }
}

impl TokenResolver for StaticSecretResolver {
    fn resolve(&self, auth_header: Option<&str>, policy: &PolicyConfig) -> Role {
        let Some(header) = auth_header else {
            return policy.default_role().clone();
        };
        let Some(credential) = bearer_credential(header) else {
            debug!("authorization header is not a bearer credential");
            return policy.default_role().clone();
        };
        match &self.secret {
            Some(secret) if secret == credential => policy.admin_role().clone(),
            _ => {
                debug!("bearer credential does not match the configured secret");
                policy.default_role().clone()
            }
        }
    }
}
