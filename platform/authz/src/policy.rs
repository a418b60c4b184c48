//! Policy table: (path, method) → minimum role, plus the default and admin
//! roles and the role hierarchy they are compared with.

use std::{collections::BTreeMap, path::Path};

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::{
    error::{PolicyError, PolicyResult},
    role::{Role, RoleHierarchy},
};

/// One endpoint binding.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct PolicyRule {
    pub category: String,
    pub name: String,
    pub path: String,
    pub method: String,
    pub required_role: Role,
}

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
struct RouteKey {
    path: String,
    method: String,
}

impl RouteKey {
    fn new(path: &str, method: &str) -> Self {
        Self {
            path: path.to_string(),
            method: normalize_method(method),
        }
    }
}

pub fn normalize_method(method: &str) -> String {
    method.trim().to_ascii_uppercase()
}

#[derive(Debug, Default, Deserialize)]
struct PolicyDocument {
    default_role: Option<toml::Value>,
    admin_role: Option<toml::Value>,
    roles_hierarchy: Option<toml::Value>,
    endpoints: Option<toml::Value>,
}

#[derive(Debug, Deserialize)]
struct RuleDocument {
    path: Option<String>,
    method: Option<String>,
    required_role: Option<String>,
}

impl RuleDocument {
    fn into_rule(
        self,
        category: &str,
        name: &str,
        default_role: &Role,
    ) -> Result<PolicyRule, &'static str> {
        let path = self
            .path
            .filter(|path| !path.trim().is_empty())
            .ok_or("missing or empty path")?;
        let method = self
            .method
            .filter(|method| !method.trim().is_empty())
            .ok_or("missing or empty method")?;
        Ok(PolicyRule {
            category: category.to_string(),
            name: name.to_string(),
            method: normalize_method(&method),
            path,
            required_role: self
                .required_role
                .map(Role::from)
                .unwrap_or_else(|| default_role.clone()),
        })
    }
}

/// An immutable snapshot of the active policy.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PolicyConfig {
    default_role: Role,
    admin_role: Role,
    hierarchy: RoleHierarchy,
    rules: BTreeMap<RouteKey, PolicyRule>,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self::builtin()
    }
}

impl PolicyConfig {
    /// Built-in policy used whenever no document can be loaded: no rules,
    /// READER by default, ADMIN for the secret holder, five-level hierarchy.
    pub fn builtin() -> Self {
        Self {
            default_role: Role::Reader,
            admin_role: Role::Admin,
            hierarchy: RoleHierarchy::default(),
            rules: BTreeMap::new(),
        }
    }

    /// Build a policy from parts. Duplicate (path, method) pairs keep the
    /// last rule in iteration order.
    pub fn new(
        default_role: Role,
        admin_role: Role,
        hierarchy: RoleHierarchy,
        rules: impl IntoIterator<Item = PolicyRule>,
    ) -> Self {
        let mut config = Self {
            default_role,
            admin_role,
            hierarchy,
            rules: BTreeMap::new(),
        };
        for rule in rules {
            config.insert_rule(rule);
        }
        config
    }

    /// Parse a TOML policy document. Absent or mistyped top-level keys take
    /// the built-in values individually, and malformed rules are skipped with
    /// a warning; only TOML syntax errors reject the whole document.
    pub fn parse(source: &str) -> PolicyResult<Self> {
        let document: PolicyDocument = toml::from_str(source)?;
        Ok(Self::from_document(document))
    }

    pub fn from_path(path: impl AsRef<Path>) -> PolicyResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| PolicyError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&content)
    }

    fn from_document(document: PolicyDocument) -> Self {
        let builtin = Self::builtin();
        let mut config = Self {
            default_role: role_entry("default_role", document.default_role)
                .unwrap_or(builtin.default_role),
            admin_role: role_entry("admin_role", document.admin_role)
                .unwrap_or(builtin.admin_role),
            hierarchy: hierarchy_entry(document.roles_hierarchy).unwrap_or(builtin.hierarchy),
            rules: BTreeMap::new(),
        };

        // `toml::Table` iterates in key order, so rules load by (category, name).
        for (category, group) in table_entry("endpoints", document.endpoints) {
            let toml::Value::Table(group) = group else {
                warn!(%category, "endpoint category is not a table; skipped");
                continue;
            };
            for (name, raw) in group {
                let rule = RuleDocument::deserialize(raw)
                    .map_err(|_| "rule is not a table of strings")
                    .and_then(|raw| raw.into_rule(&category, &name, &config.default_role));
                match rule {
                    Ok(rule) => config.insert_rule(rule),
                    Err(reason) => warn!(
                        rule = %format!("{category}.{name}"),
                        reason,
                        "invalid policy rule skipped"
                    ),
                }
            }
        }

        config.warn_on_unranked_roles();
        config
    }

    fn insert_rule(&mut self, mut rule: PolicyRule) {
        rule.method = normalize_method(&rule.method);
        let key = RouteKey::new(&rule.path, &rule.method);
        if let Some(previous) = self.rules.insert(key, rule) {
            warn!(
                path = %previous.path,
                method = %previous.method,
                replaced = %format!("{}.{}", previous.category, previous.name),
                "duplicate policy rule; last loaded rule wins"
            );
        }
    }

    fn warn_on_unranked_roles(&self) {
        let referenced = [&self.default_role, &self.admin_role]
            .into_iter()
            .chain(self.rules.values().map(|rule| &rule.required_role));
        for role in referenced {
            if !self.hierarchy.contains(role) {
                warn!(%role, "role missing from hierarchy; treated as level 0");
            }
        }
    }

    /// Minimum role for an endpoint, or the default role when no rule
    /// matches. Method comparison ignores case; path comparison is exact.
    pub fn required_role_for(&self, path: &str, method: &str) -> &Role {
        self.rules
            .get(&RouteKey::new(path, method))
            .map(|rule| &rule.required_role)
            .unwrap_or(&self.default_role)
    }

    pub fn default_role(&self) -> &Role {
        &self.default_role
    }

    pub fn admin_role(&self) -> &Role {
        &self.admin_role
    }

    pub fn hierarchy(&self) -> &RoleHierarchy {
        &self.hierarchy
    }

    /// Rules ordered by (path, method).
    pub fn rules(&self) -> impl Iterator<Item = &PolicyRule> {
        self.rules.values()
    }

    pub fn rule_count(&self) -> usize {
        self.rules.len()
    }

    pub fn summary(&self) -> PolicySummary {
        PolicySummary {
            default_role: self.default_role.clone(),
            admin_role: self.admin_role.clone(),
            roles: self
                .hierarchy
                .ordered()
                .into_iter()
                .map(|(role, level)| RoleLevel { role, level })
                .collect(),
            rules: self.rules().cloned().collect(),
        }
    }
}

fn role_entry(key: &str, value: Option<toml::Value>) -> Option<Role> {
    match value? {
        toml::Value::String(name) => Some(Role::from(name)),
        other => {
            warn!(key, found = other.type_str(), "role is not a string; using built-in value");
            None
        }
    }
}

fn table_entry(key: &str, value: Option<toml::Value>) -> toml::Table {
    match value {
        None => toml::Table::new(),
        Some(toml::Value::Table(table)) => table,
        Some(other) => {
            warn!(key, found = other.type_str(), "expected a table; entry ignored");
            toml::Table::new()
        }
    }
}

/// Levels that are not non-negative integers drop the role, which then ranks
/// as [`crate::UNKNOWN_ROLE_LEVEL`].
fn hierarchy_entry(value: Option<toml::Value>) -> Option<RoleHierarchy> {
    let toml::Value::Table(table) = value? else {
        warn!("roles_hierarchy is not a table; using built-in levels");
        return None;
    };
    let levels = table
        .into_iter()
        .filter_map(|(name, level)| {
            match level.as_integer().and_then(|level| u32::try_from(level).ok()) {
                Some(level) => Some((Role::from(name), level)),
                None => {
                    warn!(role = %name, "role level is not a non-negative integer; role skipped");
                    None
                }
            }
        })
        .collect::<Vec<_>>();
    Some(RoleHierarchy::from_levels(levels))
}

#[derive(Clone, Debug, Serialize)]
pub struct RoleLevel {
    pub role: Role,
    pub level: u32,
}

/// Serializable view of a policy snapshot.
#[derive(Clone, Debug, Serialize)]
pub struct PolicySummary {
    pub default_role: Role,
    pub admin_role: Role,
    pub roles: Vec<RoleLevel>,
    pub rules: Vec<PolicyRule>,
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOCUMENT: &str = r#"
default_role = "READER"
admin_role = "ADMIN"

[roles_hierarchy]
PUBLIC = 0
READER = 10
EDITOR = 20
ADMIN = 30
SUPERADMIN = 40

[endpoints.documents.insert]
path = "/api/documents"
method = "POST"
required_role = "ADMIN"

[endpoints.documents.find]
path = "/api/documents/find"
method = "post"
required_role = "READER"

[endpoints.collections.list]
path = "/api/collections"
method = "GET"
"#;

    #[test]
    fn parses_full_document() {
        let config = PolicyConfig::parse(DOCUMENT).unwrap();
        assert_eq!(config.default_role(), &Role::Reader);
        assert_eq!(config.admin_role(), &Role::Admin);
        assert_eq!(config.hierarchy().len(), 5);
        assert_eq!(config.rule_count(), 3);
        assert_eq!(
            config.required_role_for("/api/documents", "POST"),
            &Role::Admin
        );
    }

    #[test]
    fn method_lookup_ignores_case() {
        let config = PolicyConfig::parse(DOCUMENT).unwrap();
        assert_eq!(
            config.required_role_for("/api/documents", "post"),
            &Role::Admin
        );
        assert_eq!(
            config.required_role_for("/api/documents/find", "POST"),
            &Role::Reader
        );
    }

    #[test]
    fn unmatched_endpoint_uses_default_role() {
        let config = PolicyConfig::parse(DOCUMENT).unwrap();
        assert_eq!(
            config.required_role_for("/api/documents", "DELETE"),
            &Role::Reader
        );
        assert_eq!(
            config.required_role_for("/api/documents/", "POST"),
            &Role::Reader
        );
    }

    #[test]
    fn rule_without_required_role_takes_default() {
        let config = PolicyConfig::parse(DOCUMENT).unwrap();
        assert_eq!(
            config.required_role_for("/api/collections", "GET"),
            &Role::Reader
        );
    }

    #[test]
    fn missing_keys_fall_back_individually() {
        let config = PolicyConfig::parse(
            r#"
default_role = "PUBLIC"

[endpoints.admin.drop]
path = "/api/collections/drop"
method = "DELETE"
required_role = "SUPERADMIN"
"#,
        )
        .unwrap();
        assert_eq!(config.default_role(), &Role::Public);
        assert_eq!(config.admin_role(), &Role::Admin);
        assert_eq!(config.hierarchy(), &RoleHierarchy::default());
        assert_eq!(config.rule_count(), 1);
    }

    #[test]
    fn empty_document_equals_builtin() {
        assert_eq!(PolicyConfig::parse("").unwrap(), PolicyConfig::builtin());
    }

    #[test]
    fn duplicate_routes_keep_last_loaded_rule() {
        // Categories load in lexical order, so "zeta" is loaded after "alpha".
        let config = PolicyConfig::parse(
            r#"
[endpoints.zeta.write]
path = "/api/documents"
method = "POST"
required_role = "SUPERADMIN"

[endpoints.alpha.write]
path = "/api/documents"
method = "post"
required_role = "EDITOR"
"#,
        )
        .unwrap();
        assert_eq!(config.rule_count(), 1);
        assert_eq!(
            config.required_role_for("/api/documents", "POST"),
            &Role::Superadmin
        );
    }

    #[test]
    fn rejects_invalid_toml() {
        assert!(matches!(
            PolicyConfig::parse("default_role = ["),
            Err(PolicyError::Parse(_))
        ));
        assert!(matches!(
            PolicyConfig::parse("[endpoints\npath = "),
            Err(PolicyError::Parse(_))
        ));
    }

    #[test]
    fn malformed_rules_are_skipped_individually() {
        let config = PolicyConfig::parse(
            r#"
[endpoints.collections.drop]
path = "/api/collections"
method = "DELETE"
required_role = "SUPERADMIN"

[endpoints.misc.no_method]
path = "/api/misc"

[endpoints.misc.empty_path]
path = " "
method = "GET"

[endpoints.misc.wrong_type]
path = "/api/misc"
method = 5
"#,
        )
        .unwrap();
        assert_eq!(config.rule_count(), 1);
        assert_eq!(
            config.required_role_for("/api/collections", "DELETE"),
            &Role::Superadmin
        );
        assert_eq!(config.required_role_for("/api/misc", "GET"), &Role::Reader);
    }

    #[test]
    fn mistyped_top_level_keys_fall_back() {
        let config = PolicyConfig::parse(
            r#"
default_role = 7
admin_role = "SUPERADMIN"
endpoints = "none"
"#,
        )
        .unwrap();
        assert_eq!(config.default_role(), &Role::Reader);
        assert_eq!(config.admin_role(), &Role::Superadmin);
        assert_eq!(config.rule_count(), 0);
    }

    #[test]
    fn negative_levels_drop_only_that_role() {
        let config = PolicyConfig::parse(
            r#"
[roles_hierarchy]
READER = -1
ADMIN = 30

[endpoints.documents.insert]
path = "/api/documents"
method = "POST"
required_role = "ADMIN"
"#,
        )
        .unwrap();
        assert!(!config.hierarchy().contains(&Role::Reader));
        assert_eq!(config.hierarchy().level_of(&Role::Admin), 30);
        assert_eq!(
            config.required_role_for("/api/documents", "POST"),
            &Role::Admin
        );
    }

    #[test]
    fn summary_lists_roles_in_rank_order() {
        let summary = PolicyConfig::parse(DOCUMENT).unwrap().summary();
        assert_eq!(summary.roles.first().map(|r| &r.role), Some(&Role::Public));
        assert_eq!(
            summary.roles.last().map(|r| &r.role),
            Some(&Role::Superadmin)
        );
        assert_eq!(summary.rules.len(), 3);
    }
}
