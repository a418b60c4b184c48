use std::path::PathBuf;

use thiserror::Error;

use crate::role::Role;

/// HTTP-equivalent status carried by every denial.
pub const FORBIDDEN_STATUS: u16 = 403;

/// The only error the authorization core raises to its callers.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum AuthzError {
    #[error("insufficient permissions: role '{required}' or higher is required")]
    Denied { required: Role },
}

impl AuthzError {
    pub fn status_code(&self) -> u16 {
        match self {
            AuthzError::Denied { .. } => FORBIDDEN_STATUS,
        }
    }

    pub fn required_role(&self) -> &Role {
        match self {
            AuthzError::Denied { required } => required,
        }
    }
}

/// Failures while reading or parsing a policy document.
///
/// [`crate::load`] absorbs these and substitutes the built-in policy; only the
/// strict entry points surface them.
#[derive(Debug, Error)]
pub enum PolicyError {
    #[error("failed to read policy file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse policy document: {0}")]
    Parse(#[from] toml::de::Error),
}

pub type PolicyResult<T> = Result<T, PolicyError>;
