//! MySQL adapter, also serving TiDB through the MySQL wire protocol
//!
//! Roles are MySQL accounts on host `%`. Account expiry and raw attribute
//! clauses have no MySQL counterpart and are rejected before anything runs.

use async_trait::async_trait;
use keel_core::domain::engine::{CapabilitySet, ConnectionIdentity, Engine};
use keel_core::domain::role::{DatabaseRole, RoleSpec};
use keel_core::domain::task::{MigrationOutcome, MigrationPayload};
use sqlx::mysql::{MySqlConnection, MySqlPoolOptions};
use sqlx::{Connection, Executor, MySqlPool, Row};
use std::sync::Arc;
use tracing::{debug, info};

use super::sql::{HISTORY_TABLE, SessionTracker, quote_mysql_literal};
use crate::driver::{ConnectOptions, Driver, DriverFactory, OperationId};
use crate::error::DriverError;

/// Factory for MySQL-compatible engines
pub struct MySqlFactory {
    engine: Engine,
}

impl MySqlFactory {
    pub fn new(engine: Engine) -> Self {
        Self { engine }
    }
}

#[async_trait]
impl DriverFactory for MySqlFactory {
    fn engine(&self) -> Engine {
        self.engine
    }

    fn capabilities(&self) -> CapabilitySet {
        CapabilitySet::all()
    }

    async fn connect(
        &self,
        connection: &ConnectionIdentity,
        options: &ConnectOptions,
    ) -> Result<Arc<dyn Driver>, DriverError> {
        let pool = MySqlPoolOptions::new()
            .max_connections(options.max_connections)
            .acquire_timeout(options.connect_timeout)
            .connect(&connection.dsn)
            .await
            .map_err(|e| DriverError::Connection(e.to_string()))?;

        Ok(Arc::new(MySqlDriver::new(self.engine, pool)))
    }
}

pub struct MySqlDriver {
    engine: Engine,
    pool: MySqlPool,
    connections: SessionTracker<u64>,
}

impl MySqlDriver {
    pub fn new(engine: Engine, pool: MySqlPool) -> Self {
        Self {
            engine,
            pool,
            connections: SessionTracker::new(),
        }
    }

    async fn apply(
        conn: &mut MySqlConnection,
        migration: &MigrationPayload,
    ) -> Result<MigrationOutcome, DriverError> {
        let create_history = format!(
            "CREATE TABLE IF NOT EXISTS {} (
                version VARCHAR(255) PRIMARY KEY,
                applied_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
            )",
            HISTORY_TABLE
        );
        (&mut *conn).execute(create_history.as_str()).await?;

        if let Some(version) = &migration.schema_version {
            let lookup = format!("SELECT COUNT(*) FROM {} WHERE version = ?", HISTORY_TABLE);
            let row = (&mut *conn)
                .fetch_one(sqlx::query(&lookup).bind(version))
                .await?;
            let applied: i64 = row.try_get(0)?;

            if applied > 0 {
                info!("Schema version {} already applied, skipping", version);
                return Ok(MigrationOutcome {
                    rows_affected: 0,
                    schema_version: Some(version.clone()),
                });
            }
        }

        // DDL commits implicitly in MySQL; the transaction still keeps DML
        // and the history row together
        let record = format!("INSERT INTO {} (version) VALUES (?)", HISTORY_TABLE);
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

    /// Rejects fields this engine cannot apply, before any statement runs
    fn check_supported(&self, role: &RoleSpec) -> Result<(), DriverError> {
        if role.valid_until.is_some() {
            return Err(DriverError::InvalidRequest(format!(
                "{} does not support role expiration",
                self.engine
            )));
        }
        if role.attribute.is_some() {
            return Err(DriverError::InvalidRequest(format!(
                "{} does not support role attributes",
                self.engine
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl Driver for MySqlDriver {
    fn engine(&self) -> Engine {
        self.engine
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
        let connection_id: u64 = (&mut *conn)
            .fetch_one("SELECT CONNECTION_ID()")
            .await?
            .try_get(0)?;

        debug!("Running migration {} on connection {}", operation, connection_id);
        let _guard = self.connections.track(operation, connection_id);

        Self::apply(&mut conn, migration).await
    }

    async fn create_role(&self, role: &RoleSpec) -> Result<DatabaseRole, DriverError> {
        validate_name(&role.name)?;
        self.check_supported(role)?;

        let mut statement = format!("CREATE USER {}", account(&role.name));
        if let Some(password) = &role.password {
            statement.push_str(&format!(" IDENTIFIED BY {}", quote_mysql_literal(password)));
        }
        if let Some(limit) = role.connection_limit {
            statement.push_str(&format!(" WITH MAX_USER_CONNECTIONS {}", limit.max(0)));
        }

        self.pool.execute(statement.as_str()).await?;
        info!("Created role {} on {}", role.name, self.engine);

        self.find_role(&role.name).await
    }

    async fn update_role(
        &self,
        role_name: &str,
        role: &RoleSpec,
    ) -> Result<DatabaseRole, DriverError> {
        validate_name(role_name)?;
        self.check_supported(role)?;
        self.find_role(role_name).await?;

        let new_name = if role.name.is_empty() {
            role_name
        } else {
            role.name.as_str()
        };

        if new_name != role_name {
            let rename = format!("RENAME USER {} TO {}", account(role_name), account(new_name));
            self.pool.execute(rename.as_str()).await?;
        }

        let mut alter = String::new();
        if let Some(password) = &role.password {
            alter.push_str(&format!(" IDENTIFIED BY {}", quote_mysql_literal(password)));
        }
        if let Some(limit) = role.connection_limit {
            alter.push_str(&format!(" WITH MAX_USER_CONNECTIONS {}", limit.max(0)));
        }
        if !alter.is_empty() {
            let statement = format!("ALTER USER {}{}", account(new_name), alter);
            self.pool.execute(statement.as_str()).await?;
        }

        info!("Updated role {} on {}", new_name, self.engine);
        self.find_role(new_name).await
    }

    async fn find_role(&self, role_name: &str) -> Result<DatabaseRole, DriverError> {
        let row = sqlx::query_as::<_, AccountRow>(
            r#"
            SELECT CAST(User AS CHAR) AS name,
                   CAST(max_user_connections AS SIGNED) AS max_connections
            FROM mysql.user
            WHERE User = ? AND Host = '%'
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

        let statement = format!("DROP USER {}", account(role_name));
        self.pool.execute(statement.as_str()).await?;
        info!("Deleted role {} on {}", role_name, self.engine);

        Ok(())
    }

    async fn cancel(&self, operation: OperationId) -> Result<bool, DriverError> {
        let Some(connection_id) = self.connections.session(operation) else {
            return Ok(false);
        };

        let kill = format!("KILL QUERY {}", connection_id);
        self.pool.execute(kill.as_str()).await?;
        info!("Killed query on connection {} running {}", connection_id, operation);

        Ok(true)
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

/// Renders `'name'@'%'`
fn account(name: &str) -> String {
    format!("{}@'%'", quote_mysql_literal(name))
}

#[derive(sqlx::FromRow)]
struct AccountRow {
    name: String,
    max_connections: i64,
}

impl From<AccountRow> for DatabaseRole {
    fn from(row: AccountRow) -> Self {
        DatabaseRole {
            name: row.name,
            // 0 means unlimited
            connection_limit: (row.max_connections > 0)
                .then(|| i32::try_from(row.max_connections).unwrap_or(i32::MAX)),
            valid_until: None,
            attribute: None,
        }
    }
}
