//! Database role types

use serde::{Deserialize, Serialize};

/// Desired state of a database role, used for create and update
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleSpec {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connection_limit: Option<i32>,
    /// Expiration timestamp in the engine's own literal format
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub valid_until: Option<String>,
    /// Raw engine-specific attribute clause (e.g. `LOGIN CREATEDB`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attribute: Option<String>,
}

/// A role as reported by the database
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseRole {
    pub name: String,
    pub connection_limit: Option<i32>,
    pub valid_until: Option<String>,
    pub attribute: Option<String>,
}
