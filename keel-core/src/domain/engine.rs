//! Database engine and capability types
//!
//! A task is always bound to one target database, identified by its engine
//! and a connection identity. Capabilities describe which operations a driver
//! for a given engine can perform.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

/// Database engine identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Engine {
    Postgres,
    MySql,
    TiDb,
    Sqlite,
    ClickHouse,
    Snowflake,
    MsSql,
    Oracle,
}

impl Engine {
    pub const ALL: [Engine; 8] = [
        Engine::Postgres,
        Engine::MySql,
        Engine::TiDb,
        Engine::Sqlite,
        Engine::ClickHouse,
        Engine::Snowflake,
        Engine::MsSql,
        Engine::Oracle,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Engine::Postgres => "postgres",
            Engine::MySql => "mysql",
            Engine::TiDb => "tidb",
            Engine::Sqlite => "sqlite",
            Engine::ClickHouse => "clickhouse",
            Engine::Snowflake => "snowflake",
            Engine::MsSql => "mssql",
            Engine::Oracle => "oracle",
        }
    }

    /// Human readable engine name, as used in error messages
    pub fn display_name(&self) -> &'static str {
        match self {
            Engine::Postgres => "PostgreSQL",
            Engine::MySql => "MySQL",
            Engine::TiDb => "TiDB",
            Engine::Sqlite => "SQLite",
            Engine::ClickHouse => "ClickHouse",
            Engine::Snowflake => "Snowflake",
            Engine::MsSql => "MSSQL",
            Engine::Oracle => "Oracle",
        }
    }
}

impl fmt::Display for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

impl FromStr for Engine {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Engine::ALL
            .iter()
            .find(|e| e.as_str().eq_ignore_ascii_case(s))
            .copied()
            .ok_or_else(|| format!("unknown engine: {}", s))
    }
}

/// An operation a driver may or may not support
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    ExecuteMigration,
    CreateRole,
    UpdateRole,
    FindRole,
    DeleteRole,
}

impl Capability {
    pub const ALL: [Capability; 5] = [
        Capability::ExecuteMigration,
        Capability::CreateRole,
        Capability::UpdateRole,
        Capability::FindRole,
        Capability::DeleteRole,
    ];

    pub const ROLES: [Capability; 4] = [
        Capability::CreateRole,
        Capability::UpdateRole,
        Capability::FindRole,
        Capability::DeleteRole,
    ];

    /// Verb phrase used in "not implemented" messages
    pub fn describe(&self) -> &'static str {
        match self {
            Capability::ExecuteMigration => "execute migration",
            Capability::CreateRole => "create role",
            Capability::UpdateRole => "update role",
            Capability::FindRole => "find role",
            Capability::DeleteRole => "delete role",
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.describe())
    }
}

/// Set of capabilities supported by a driver
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CapabilitySet(BTreeSet<Capability>);

impl CapabilitySet {
    pub fn none() -> Self {
        Self(BTreeSet::new())
    }

    pub fn all() -> Self {
        Self::of(&Capability::ALL)
    }

    pub fn of(capabilities: &[Capability]) -> Self {
        Self(capabilities.iter().copied().collect())
    }

    pub fn contains(&self, capability: Capability) -> bool {
        self.0.contains(&capability)
    }

    pub fn iter(&self) -> impl Iterator<Item = Capability> + '_ {
        self.0.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Connection identity of a target database
///
/// The DSN is opaque to the orchestrator; each driver interprets it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConnectionIdentity {
    pub dsn: String,
}

impl ConnectionIdentity {
    pub fn new(dsn: impl Into<String>) -> Self {
        Self { dsn: dsn.into() }
    }

    /// DSN with any password component replaced, safe for logs and responses
    pub fn redacted(&self) -> String {
        mask_password_params(&self.redacted_userinfo())
    }

    fn redacted_userinfo(&self) -> String {
        let Some(at) = self.dsn.rfind('@') else {
            return self.dsn.clone();
        };
        let (credentials, host) = self.dsn.split_at(at);
        let scheme_end = credentials.find("://").map(|i| i + 3).unwrap_or(0);
        let (scheme, userinfo) = credentials.split_at(scheme_end);
        match userinfo.find(':') {
            Some(colon) => format!("{}{}:***{}", scheme, &userinfo[..colon], host),
            None => self.dsn.clone(),
        }
    }
}

/// Masks `password=` values in query strings and key/value DSNs
fn mask_password_params(dsn: &str) -> String {
    const KEY: &str = "password=";

    let mut masked = String::with_capacity(dsn.len());
    let mut rest = dsn;
    while let Some(i) = rest.to_ascii_lowercase().find(KEY) {
        let value = i + KEY.len();
        masked.push_str(&rest[..value]);
        masked.push_str("***");
        let end = rest[value..]
            .find([' ', '&', ';'])
            .map_or(rest.len(), |n| value + n);
        rest = &rest[end..];
    }
    masked.push_str(rest);
    masked
}

/// The database a task operates on
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TargetDatabase {
    pub engine: Engine,
    pub connection: ConnectionIdentity,
}

impl TargetDatabase {
    pub fn new(engine: Engine, dsn: impl Into<String>) -> Self {
        Self {
            engine,
            connection: ConnectionIdentity::new(dsn),
        }
    }
}

impl fmt::Display for TargetDatabase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.engine, self.connection.redacted())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_round_trips_through_str() {
        for engine in Engine::ALL {
            assert_eq!(engine.as_str().parse::<Engine>().unwrap(), engine);
        }
        assert!("cockroach".parse::<Engine>().is_err());
    }

    #[test]
    fn test_engine_serializes_lowercase() {
        let json = serde_json::to_string(&Engine::ClickHouse).unwrap();
        assert_eq!(json, "\"clickhouse\"");
    }

    #[test]
    fn test_capability_set() {
        let set = CapabilitySet::of(&[Capability::ExecuteMigration]);
        assert!(set.contains(Capability::ExecuteMigration));
        assert!(!set.contains(Capability::CreateRole));
        assert_eq!(CapabilitySet::all().len(), 5);
        assert!(CapabilitySet::none().is_empty());
    }

    #[test]
    fn test_redacted_hides_password() {
        let conn = ConnectionIdentity::new("postgres://admin:hunter2@db:5432/app");
        assert_eq!(conn.redacted(), "postgres://admin:***@db:5432/app");

        let conn = ConnectionIdentity::new("sqlite://data/app.db");
        assert_eq!(conn.redacted(), "sqlite://data/app.db");

        let conn = ConnectionIdentity::new("http://user@clickhouse:8123");
        assert_eq!(conn.redacted(), "http://user@clickhouse:8123");

        let conn = ConnectionIdentity::new("http://clickhouse:8123/?user=app&password=hunter2&db=x");
        assert_eq!(
            conn.redacted(),
            "http://clickhouse:8123/?user=app&password=***&db=x"
        );

        let conn = ConnectionIdentity::new("host=db user=admin Password=hunter2 dbname=app");
        assert_eq!(conn.redacted(), "host=db user=admin Password=*** dbname=app");
    }
}
