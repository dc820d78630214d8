//! PostgreSQL adapter
//!
//! Supports every capability. Roles map onto `CREATE ROLE` / `ALTER ROLE` /
//! `DROP ROLE` and are read back from `pg_roles`. In-flight migrations are
//! interrupted with `pg_cancel_backend`.

use async_trait::async_trait;
use keel_core::domain::engine::{CapabilitySet, ConnectionIdentity, Engine};
use keel_core::domain::role::{DatabaseRole, RoleSpec};
use keel_core::domain::task::{MigrationOutcome, MigrationPayload};
use sqlx::postgres::{PgConnection, PgPoolOptions};
use sqlx::{Connection, Executor, PgPool, Row};
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::sql::{HISTORY_TABLE, SessionTracker, quote_ident, quote_literal};
use crate::driver::{ConnectOptions, Driver, DriverFactory, OperationId};
use crate::error::DriverError;

pub struct PostgresFactory;

#[async_trait]
impl DriverFactory for PostgresFactory {
    fn engine(&self) -> Engine {
        Engine::Postgres
    }

    fn capabilities(&self) -> CapabilitySet {
        CapabilitySet::all()
    }

    async fn connect(
        &self,
        connection: &ConnectionIdentity,
        options: &ConnectOptions,
    ) -> Result<Arc<dyn Driver>, DriverError> {
        let pool = PgPoolOptions::new()
            .max_connections(options.max_connections)
            .acquire_timeout(options.connect_timeout)
            .connect(&connection.dsn)
            .await
            .map_err(|e| DriverError::Connection(e.to_string()))?;

        Ok(Arc::new(PostgresDriver::new(pool)))
    }
}

pub struct PostgresDriver {
    pool: PgPool,
    backends: SessionTracker<i32>,
}

impl PostgresDriver {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            backends: SessionTracker::new(),
        }
    }

    async fn apply(
        conn: &mut PgConnection,
        migration: &MigrationPayload,
    ) -> Result<MigrationOutcome, DriverError> {
        let create_history = format!(
            "CREATE TABLE IF NOT EXISTS {} (
                version TEXT PRIMARY KEY,
                applied_at TIMESTAMPTZ NOT NULL DEFAULT now()
            )",
            HISTORY_TABLE
        );
        (&mut *conn).execute(create_history.as_str()).await?;

        if let Some(version) = &migration.schema_version {
            let lookup = format!(
                "SELECT EXISTS (SELECT 1 FROM {} WHERE version = $1)",
                HISTORY_TABLE
            );
            let row = (&mut *conn)
                .fetch_one(sqlx::query(&lookup).bind(version))
                .await?;
            let applied: bool = row.try_get(0)?;

            if applied {
                info!("Schema version {} already applied, skipping", version);
                return Ok(MigrationOutcome {
                    rows_affected: 0,
                    schema_version: Some(version.clone()),
                });
            }
        }

        let record = format!("INSERT INTO {} (version) VALUES ($1)", HISTORY_TABLE);
        let mut tx = conn.begin().await?;
        let result = (&mut *tx).execute(migration.statement.as_str()).await?;

        if let Some(version) = &migration.schema_version {
            (&mut *tx)
                .execute(sqlx::query(&record).bind(version))
                .await?;
        }

        tx.commit().await?;

        Ok(MigrationOutcome {
            rows_affected: result.rows_affected(),
            schema_version: migration.schema_version.clone(),
        })
    }
}

#[async_trait]
impl Driver for PostgresDriver {
    fn engine(&self) -> Engine {
        Engine::Postgres
    }

    fn capabilities(&self) -> CapabilitySet {
        CapabilitySet::all()
    }

    async fn ping(&self) -> Result<(), DriverError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| DriverError::Connection(e.to_string()))?;
        Ok(())
    }

    async fn execute_migration(
        &self,
        operation: OperationId,
        migration: &MigrationPayload,
    ) -> Result<MigrationOutcome, DriverError> {
        let mut conn = self.pool.acquire().await?;
        let pid: i32 = (&mut *conn)
            .fetch_one("SELECT pg_backend_pid()")
            .await?
            .try_get(0)?;

        debug!("Running migration {} on backend {}", operation, pid);
        let _guard = self.backends.track(operation, pid);

        Self::apply(&mut conn, migration).await
    }

    async fn create_role(&self, role: &RoleSpec) -> Result<DatabaseRole, DriverError> {
        validate_name(&role.name)?;

        let mut statement = format!("CREATE ROLE {}", quote_ident(&role.name, '"'));
        let options = role_options(role);
        if !options.is_empty() {
            statement.push_str(" WITH ");
            statement.push_str(&options);
        }

        self.pool.execute(statement.as_str()).await?;
        info!("Created role {}", role.name);

        self.find_role(&role.name).await
    }

    async fn update_role(
        &self,
        role_name: &str,
        role: &RoleSpec,
    ) -> Result<DatabaseRole, DriverError> {
        validate_name(role_name)?;
        self.find_role(role_name).await?;

        let new_name = if role.name.is_empty() {
            role_name
        } else {
            role.name.as_str()
        };

        let mut tx = self.pool.begin().await?;

        if new_name != role_name {
            let rename = format!(
                "ALTER ROLE {} RENAME TO {}",
                quote_ident(role_name, '"'),
                quote_ident(new_name, '"')
            );
            (&mut *tx).execute(rename.as_str()).await?;
        }

        let options = role_options(role);
        if !options.is_empty() {
            let alter = format!("ALTER ROLE {} WITH {}", quote_ident(new_name, '"'), options);
            (&mut *tx).execute(alter.as_str()).await?;
        }

        tx.commit().await?;
        info!("Updated role {}", new_name);

        self.find_role(new_name).await
    }

    async fn find_role(&self, role_name: &str) -> Result<DatabaseRole, DriverError> {
        let row = sqlx::query_as::<_, RoleRow>(
            r#"
            SELECT rolname::text AS name, rolconnlimit, rolvaliduntil::text AS valid_until,
                   rolsuper, rolinherit, rolcreaterole, rolcreatedb, rolcanlogin,
                   rolreplication, rolbypassrls
            FROM pg_roles
            WHERE rolname = $1
            "#,
        )
        .bind(role_name)
        .fetch_optional(&self.pool)
        .await?;

        row.map(DatabaseRole::from)
            .ok_or_else(|| DriverError::RoleNotFound(role_name.to_string()))
    }

    async fn delete_role(&self, role_name: &str) -> Result<(), DriverError> {
        self.find_role(role_name).await?;

        let statement = format!("DROP ROLE {}", quote_ident(role_name, '"'));
        self.pool.execute(statement.as_str()).await?;
        info!("Deleted role {}", role_name);

        Ok(())
    }

    async fn cancel(&self, operation: OperationId) -> Result<bool, DriverError> {
        let Some(pid) = self.backends.session(operation) else {
            return Ok(false);
        };

        let canceled: bool = sqlx::query_scalar("SELECT pg_cancel_backend($1)")
            .bind(pid)
            .fetch_one(&self.pool)
            .await?;

        if canceled {
            info!("Canceled backend {} running {}", pid, operation);
        } else {
            warn!("Backend {} did not accept cancellation", pid);
        }

        Ok(canceled)
    }
}

fn validate_name(name: &str) -> Result<(), DriverError> {
    if name.trim().is_empty() {
        return Err(DriverError::InvalidRequest(
            "role name cannot be empty".to_string(),
        ));
    }
    Ok(())
}

/// Renders the `WITH ...` option list of CREATE/ALTER ROLE
fn role_options(role: &RoleSpec) -> String {
    let mut options = Vec::new();

    if let Some(attribute) = &role.attribute {
        options.push(attribute.trim().to_string());
    }
    if let Some(limit) = role.connection_limit {
        options.push(format!("CONNECTION LIMIT {}", limit));
    }
    if let Some(password) = &role.password {
        options.push(format!("PASSWORD {}", quote_literal(password)));
    }
    if let Some(valid_until) = &role.valid_until {
        options.push(format!("VALID UNTIL {}", quote_literal(valid_until)));
    }

    options.join(" ")
}

#[derive(sqlx::FromRow)]
struct RoleRow {
    name: String,
    rolconnlimit: i32,
    valid_until: Option<String>,
    rolsuper: bool,
    rolinherit: bool,
    rolcreaterole: bool,
    rolcreatedb: bool,
    rolcanlogin: bool,
    rolreplication: bool,
    rolbypassrls: bool,
}

impl From<RoleRow> for DatabaseRole {
    fn from(row: RoleRow) -> Self {
        let flags = [
            (row.rolsuper, "SUPERUSER"),
            (!row.rolinherit, "NOINHERIT"),
            (row.rolcreaterole, "CREATEROLE"),
            (row.rolcreatedb, "CREATEDB"),
            (row.rolcanlogin, "LOGIN"),
            (row.rolreplication, "REPLICATION"),
            (row.rolbypassrls, "BYPASSRLS"),
        ];
        let attribute: Vec<&str> = flags
            .iter()
            .filter(|(set, _)| *set)
            .map(|(_, name)| *name)
            .collect();

        DatabaseRole {
            name: row.name,
            // -1 means unlimited
            connection_limit: (row.rolconnlimit >= 0).then_some(row.rolconnlimit),
            valid_until: row.valid_until,
            attribute: (!attribute.is_empty()).then(|| attribute.join(" ")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row() -> RoleRow {
        RoleRow {
            name: "reader".to_string(),
            rolconnlimit: -1,
            valid_until: None,
            rolsuper: false,
            rolinherit: true,
            rolcreaterole: false,
            rolcreatedb: false,
            rolcanlogin: true,
            rolreplication: false,
            rolbypassrls: false,
        }
    }

    #[test]
    fn test_role_options() {
        let role = RoleSpec {
            name: "reader".to_string(),
            password: Some("s3cr'et".to_string()),
            connection_limit: Some(10),
            valid_until: Some("2027-01-01".to_string()),
            attribute: Some("LOGIN CREATEDB".to_string()),
        };

        assert_eq!(
            role_options(&role),
            "LOGIN CREATEDB CONNECTION LIMIT 10 PASSWORD 's3cr''et' VALID UNTIL '2027-01-01'"
        );
        assert_eq!(role_options(&RoleSpec::default()), "");
    }

    #[test]
    fn test_role_from_row() {
        let role = DatabaseRole::from(row());
        assert_eq!(role.name, "reader");
        assert_eq!(role.connection_limit, None);
        assert_eq!(role.attribute.as_deref(), Some("LOGIN"));

        let role = DatabaseRole::from(RoleRow {
            rolconnlimit: 5,
            rolinherit: false,
            rolcanlogin: false,
            ..row()
        });
        assert_eq!(role.connection_limit, Some(5));
        assert_eq!(role.attribute.as_deref(), Some("NOINHERIT"));
    }

    #[test]
    fn test_empty_role_name_rejected() {
        assert!(matches!(
            validate_name("  "),
            Err(DriverError::InvalidRequest(_))
        ));
    }
}
