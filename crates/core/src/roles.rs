//! Typed user roles and the capabilities each one grants.
//!
//! Authorization checks ask whether a role holds a [`Capability`] instead of
//! comparing role names.

use serde::{Deserialize, Serialize};

/// Role stored on every user account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Admin,
}

/// An action a role may be permitted to perform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    ViewProfile,
    ManageOwnSessions,
    AdminConsole,
}

const USER_CAPABILITIES: &[Capability] = &[Capability::ViewProfile, Capability::ManageOwnSessions];

const ADMIN_CAPABILITIES: &[Capability] = &[
    Capability::ViewProfile,
    Capability::ManageOwnSessions,
    Capability::AdminConsole,
];

impl Role {
    pub fn capabilities(self) -> &'static [Capability] {
        match self {
            Role::User => USER_CAPABILITIES,
            Role::Admin => ADMIN_CAPABILITIES,
        }
    }

    pub fn can(self, capability: Capability) -> bool {
        self.capabilities().contains(&capability)
    }

    /// Name used in storage and API payloads.
    pub fn as_str(self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Admin => "admin",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Role::User),
            "admin" => Ok(Role::Admin),
            other => Err(format!("unknown role: {other}")),
        }
    }
}
