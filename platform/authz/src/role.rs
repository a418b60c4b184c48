use std::{collections::HashMap, fmt, str::FromStr};

use serde::{Deserialize, Serialize};

/// Level assigned to any role the hierarchy does not know about.
pub const UNKNOWN_ROLE_LEVEL: u32 = 0;

/// A named privilege level.
///
/// The five built-in roles are closed variants; anything else a policy
/// document names is carried verbatim in [`Role::Other`].
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Role {
    Public,
    Reader,
    Editor,
    Admin,
    Superadmin,
    Other(String),
}

impl Role {
    pub fn as_str(&self) -> &str {
        match self {
            Role::Public => "PUBLIC",
            Role::Reader => "READER",
            Role::Editor => "EDITOR",
            Role::Admin => "ADMIN",
            Role::Superadmin => "SUPERADMIN",
            Role::Other(name) => name,
        }
    }

    pub fn parse(value: &str) -> Self {
        let trimmed = value.trim();
        match trimmed.to_ascii_uppercase().as_str() {
            "PUBLIC" => Role::Public,
            "READER" => Role::Reader,
            "EDITOR" => Role::Editor,
            "ADMIN" => Role::Admin,
            "SUPERADMIN" => Role::Superadmin,
            _ => Role::Other(trimmed.to_string()),
        }
    }
}

impl FromStr for Role {
    type Err = std::convert::Infallible;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Ok(Role::parse(value))
    }
}

impl From<String> for Role {
    fn from(value: String) -> Self {
        Role::parse(&value)
    }
}

impl From<&str> for Role {
    fn from(value: &str) -> Self {
        Role::parse(value)
    }
}

impl From<Role> for String {
    fn from(value: Role) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// Resolve a level from a name→level table, falling back to
/// [`UNKNOWN_ROLE_LEVEL`] for roles the table does not define.
pub fn level_or_unknown(levels: &HashMap<Role, u32>, role: &Role) -> u32 {
    match levels.get(role) {
        Some(level) => *level,
        None => UNKNOWN_ROLE_LEVEL,
    }
}

/// Name→level table defining the "at least as privileged as" order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RoleHierarchy {
    levels: HashMap<Role, u32>,
}

impl Default for RoleHierarchy {
    fn default() -> Self {
        Self::from_levels([
            (Role::Public, 0),
            (Role::Reader, 10),
            (Role::Editor, 20),
            (Role::Admin, 30),
            (Role::Superadmin, 40),
        ])
    }
}

impl RoleHierarchy {
    pub fn from_levels(levels: impl IntoIterator<Item = (Role, u32)>) -> Self {
        Self {
            levels: levels.into_iter().collect(),
        }
    }

    pub fn level_of(&self, role: &Role) -> u32 {
        level_or_unknown(&self.levels, role)
    }

    /// True when `candidate` ranks at or above `required`.
    pub fn at_least(&self, candidate: &Role, required: &Role) -> bool {
        self.level_of(candidate) >= self.level_of(required)
    }

    pub fn contains(&self, role: &Role) -> bool {
        self.levels.contains_key(role)
    }

    /// Roles ordered from least to most privileged, ties broken by name.
    pub fn ordered(&self) -> Vec<(Role, u32)> {
        let mut entries = self
            .levels
            .iter()
            .map(|(role, level)| (role.clone(), *level))
            .collect::<Vec<_>>();
        entries.sort_by(|a, b| a.1.cmp(&b.1).then_with(|| a.0.as_str().cmp(b.0.as_str())));
        entries
    }

    pub fn len(&self) -> usize {
        self.levels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }
}
