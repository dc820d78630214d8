//! SQLite adapter
//!
//! SQLite has no users or roles, so only migrations are supported.

use async_trait::async_trait;
use keel_core::domain::engine::{Capability, CapabilitySet, ConnectionIdentity, Engine};
use keel_core::domain::role::{DatabaseRole, RoleSpec};
use keel_core::domain::task::{MigrationOutcome, MigrationPayload};
use sqlx::{Executor, Row, SqlitePool};
use sqlx::sqlite::SqlitePoolOptions;
use std::sync::Arc;
use tracing::{debug, info};

use super::sql::HISTORY_TABLE;
use crate::driver::{ConnectOptions, Driver, DriverFactory, OperationId};
use crate::error::DriverError;

const CAPABILITIES: &[Capability] = &[Capability::ExecuteMigration];

pub struct SqliteFactory;

#[async_trait]
impl DriverFactory for SqliteFactory {
    fn engine(&self) -> Engine {
        Engine::Sqlite
    }

    fn capabilities(&self) -> CapabilitySet {
        CapabilitySet::of(CAPABILITIES)
    }

    async fn connect(
        &self,
        connection: &ConnectionIdentity,
        options: &ConnectOptions,
    ) -> Result<Arc<dyn Driver>, DriverError> {
        // Every connection to an in-memory database sees its own database
        let max_connections = if connection.dsn.contains(":memory:")
            || connection.dsn.contains("mode=memory")
        {
            1
        } else {
            options.max_connections
        };

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(options.connect_timeout)
            .connect(&connection.dsn)
            .await
            .map_err(|e| DriverError::Connection(e.to_string()))?;

        Ok(Arc::new(SqliteDriver::new(pool)))
    }
}

pub struct SqliteDriver {
    pool: SqlitePool,
}

impl SqliteDriver {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Driver for SqliteDriver {
    fn engine(&self) -> Engine {
        Engine::Sqlite
    }

    fn capabilities(&self) -> CapabilitySet {
        CapabilitySet::of(CAPABILITIES)
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
        debug!("Running migration {}", operation);

        let create_history = format!(
            "CREATE TABLE IF NOT EXISTS {} (
                version TEXT PRIMARY KEY,
                applied_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
            )",
            HISTORY_TABLE
        );
        let lookup = format!("SELECT COUNT(*) FROM {} WHERE version = ?", HISTORY_TABLE);
        let record = format!("INSERT INTO {} (version) VALUES (?)", HISTORY_TABLE);

        let mut tx = self.pool.begin().await?;
        (&mut *tx).execute(create_history.as_str()).await?;

        if let Some(version) = &migration.schema_version {
            let row = (&mut *tx)
                .fetch_one(sqlx::query(&lookup).bind(version))
                .await?;
            let applied: i64 = row.try_get(0)?;

            if applied > 0 {
                info!("Schema version {} already applied, skipping", version);
                tx.commit().await?;
                return Ok(MigrationOutcome {
                    rows_affected: 0,
                    schema_version: Some(version.clone()),
                });
            }
        }

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

    async fn create_role(&self, _: &RoleSpec) -> Result<DatabaseRole, DriverError> {
        Err(DriverError::not_implemented(Engine::Sqlite, Capability::CreateRole))
    }

    async fn update_role(&self, _: &str, _: &RoleSpec) -> Result<DatabaseRole, DriverError> {
        Err(DriverError::not_implemented(Engine::Sqlite, Capability::UpdateRole))
    }

    async fn find_role(&self, _: &str) -> Result<DatabaseRole, DriverError> {
        Err(DriverError::not_implemented(Engine::Sqlite, Capability::FindRole))
    }

    async fn delete_role(&self, _: &str) -> Result<(), DriverError> {
        Err(DriverError::not_implemented(Engine::Sqlite, Capability::DeleteRole))
    }

    async fn cancel(&self, _: OperationId) -> Result<bool, DriverError> {
        // Statements run in-process and cannot be interrupted from outside
        Ok(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    async fn driver() -> Arc<dyn Driver> {
        SqliteFactory
            .connect(
                &ConnectionIdentity::new("sqlite::memory:"),
                &ConnectOptions::default(),
            )
            .await
            .unwrap()
    }

    fn migration(statement: &str, version: Option<&str>) -> MigrationPayload {
        MigrationPayload {
            statement: statement.to_string(),
            schema_version: version.map(String::from),
        }
    }

    #[tokio::test]
    async fn test_execute_migration() {
        let driver = driver().await;
        driver.ping().await.unwrap();

        driver
            .execute_migration(
                Uuid::new_v4(),
                &migration("CREATE TABLE users (id INTEGER PRIMARY KEY, email TEXT)", None),
            )
            .await
            .unwrap();

        let outcome = driver
            .execute_migration(
                Uuid::new_v4(),
                &migration(
                    "INSERT INTO users (email) VALUES ('a@example.com'), ('b@example.com')",
                    None,
                ),
            )
            .await
            .unwrap();
        assert_eq!(outcome.rows_affected, 2);
    }

    #[tokio::test]
    async fn test_schema_version_applied_once() {
        let driver = driver().await;
        let create = migration("CREATE TABLE accounts (id INTEGER PRIMARY KEY)", Some("0001"));

        let first = driver.execute_migration(Uuid::new_v4(), &create).await.unwrap();
        assert_eq!(first.schema_version.as_deref(), Some("0001"));

        // Re-running would fail with "table already exists" if not skipped
        let second = driver.execute_migration(Uuid::new_v4(), &create).await.unwrap();
        assert_eq!(second.rows_affected, 0);
        assert_eq!(second.schema_version.as_deref(), Some("0001"));
    }

    #[tokio::test]
    async fn test_failed_migration_is_rolled_back() {
        let driver = driver().await;
        let broken = migration(
            "CREATE TABLE t (id INTEGER); INSERT INTO missing VALUES (1);",
            Some("0002"),
        );

        let err = driver
            .execute_migration(Uuid::new_v4(), &broken)
            .await
            .unwrap_err();
        assert!(matches!(err, DriverError::Execution(_)));

        // Neither the table nor the history row survived
        driver
            .execute_migration(Uuid::new_v4(), &migration("CREATE TABLE t (id INTEGER)", None))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_roles_not_implemented() {
        let driver = driver().await;

        let err = driver.create_role(&RoleSpec::default()).await.unwrap_err();
        assert!(err.is_not_implemented());
        assert_eq!(err.to_string(), "create role for SQLite is not implemented yet");

        assert!(driver.find_role("reader").await.unwrap_err().is_not_implemented());
        assert!(driver.delete_role("reader").await.unwrap_err().is_not_implemented());
        assert!(
            driver
                .update_role("reader", &RoleSpec::default())
                .await
                .unwrap_err()
                .is_not_implemented()
        );

        assert!(!driver.cancel(Uuid::new_v4()).await.unwrap());
        assert_eq!(driver.capabilities(), CapabilitySet::of(CAPABILITIES));
    }
}
