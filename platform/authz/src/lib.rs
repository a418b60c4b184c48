//! Authorization primitives for the data gateway.
//!
//! A [`PolicyStore`] holds the active [`PolicyConfig`] snapshot, a
//! [`TokenResolver`] turns the `Authorization` header into a [`Role`], and the
//! [`Enforcer`] compares that role with the endpoint's minimum. [`Gatekeeper`]
//! bundles the three for request handlers.

pub mod enforcer;
pub mod error;
pub mod gate;
pub mod policy;
pub mod role;
pub mod store;
pub mod token;

pub use enforcer::{Decision, Enforcer};
pub use error::{AuthzError, FORBIDDEN_STATUS, PolicyError, PolicyResult};
pub use gate::{Gatekeeper, RequestDescriptor};
pub use policy::{PolicyConfig, PolicyRule, PolicySummary, RoleLevel};
pub use role::{Role, RoleHierarchy, UNKNOWN_ROLE_LEVEL};
pub use store::{FilePolicySource, InlinePolicySource, PolicySource, PolicyStore, load};
pub use token::{StaticSecretResolver, TokenResolver, bearer_credential};
