use async_trait::async_trait;
use keel_core::domain::engine::{CapabilitySet, ConnectionIdentity, Engine};
use keel_core::domain::role::{DatabaseRole, RoleSpec};
use keel_core::domain::task::{MigrationOutcome, MigrationPayload, TaskPayload};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use crate::error::DriverError;

/// Identifies one driver invocation so it can be canceled
pub type OperationId = Uuid;

/// Capability interface of a database engine adapter.
///
/// A driver instance is bound to one target connection. The interface is
/// deliberately thin: engines differ widely in their permission models, and
/// engine-specific behavior stays inside the adapter.
///
/// Every adapter states explicitly what it supports. An operation the engine
/// cannot perform must fail immediately with
/// [`DriverError::CapabilityNotImplemented`]; it must never silently succeed
/// or apply partially. [`Driver::capabilities`] reports the same information
/// up front so callers can inspect support without attempting the operation.
///
/// # Example
///
/// ```rust
/// use async_trait::async_trait;
/// use keel_core::domain::engine::{Capability, CapabilitySet, Engine};
/// use keel_core::domain::role::{DatabaseRole, RoleSpec};
/// use keel_core::domain::task::{MigrationOutcome, MigrationPayload};
/// use keel_driver::{Driver, DriverError, OperationId};
///
/// struct NullDriver;
///
/// #[async_trait]
/// impl Driver for NullDriver {
///     fn engine(&self) -> Engine {
///         Engine::Sqlite
///     }
///
///     fn capabilities(&self) -> CapabilitySet {
///         CapabilitySet::of(&[Capability::ExecuteMigration])
///     }
///
///     async fn ping(&self) -> Result<(), DriverError> {
///         Ok(())
///     }
///
///     async fn execute_migration(
///         &self,
///         _: OperationId,
///         migration: &MigrationPayload,
///     ) -> Result<MigrationOutcome, DriverError> {
///         Ok(MigrationOutcome {
///             rows_affected: 0,
///             schema_version: migration.schema_version.clone(),
///         })
///     }
///
///     async fn create_role(&self, _: &RoleSpec) -> Result<DatabaseRole, DriverError> {
///         Err(DriverError::not_implemented(self.engine(), Capability::CreateRole))
///     }
///
///     async fn update_role(&self, _: &str, _: &RoleSpec) -> Result<DatabaseRole, DriverError> {
///         Err(DriverError::not_implemented(self.engine(), Capability::UpdateRole))
///     }
///
///     async fn find_role(&self, _: &str) -> Result<DatabaseRole, DriverError> {
///         Err(DriverError::not_implemented(self.engine(), Capability::FindRole))
///     }
///
///     async fn delete_role(&self, _: &str) -> Result<(), DriverError> {
///         Err(DriverError::not_implemented(self.engine(), Capability::DeleteRole))
///     }
///
///     async fn cancel(&self, _: OperationId) -> Result<bool, DriverError> {
///         Ok(false)
///     }
/// }
/// ```
#[async_trait]
pub trait Driver: Send + Sync {
    /// Engine this driver talks to
    fn engine(&self) -> Engine;

    /// Operations this driver supports
    fn capabilities(&self) -> CapabilitySet;

    /// Validates that the connection is usable
    async fn ping(&self) -> Result<(), DriverError>;

    /// Applies one migration script.
    ///
    /// `operation` identifies this invocation for [`Driver::cancel`].
    async fn execute_migration(
        &self,
        operation: OperationId,
        migration: &MigrationPayload,
    ) -> Result<MigrationOutcome, DriverError>;

    async fn create_role(&self, role: &RoleSpec) -> Result<DatabaseRole, DriverError>;

    async fn update_role(
        &self,
        role_name: &str,
        role: &RoleSpec,
    ) -> Result<DatabaseRole, DriverError>;

    async fn find_role(&self, role_name: &str) -> Result<DatabaseRole, DriverError>;

    async fn delete_role(&self, role_name: &str) -> Result<(), DriverError>;

    /// Requests cooperative cancellation of an in-flight operation.
    ///
    /// Returns `true` when the engine acknowledged and interrupted the work,
    /// `false` when the work cannot be interrupted (or is not known to this
    /// driver) and will run to completion.
    async fn cancel(&self, operation: OperationId) -> Result<bool, DriverError>;
}

/// Constructs drivers for one engine
#[async_trait]
pub trait DriverFactory: Send + Sync {
    fn engine(&self) -> Engine;

    /// Capabilities of every driver this factory produces
    fn capabilities(&self) -> CapabilitySet;

    /// Establishes a connection and returns a driver bound to it
    async fn connect(
        &self,
        connection: &ConnectionIdentity,
        options: &ConnectOptions,
    ) -> Result<Arc<dyn Driver>, DriverError>;
}

/// Connection settings shared by all adapters
#[derive(Debug, Clone)]
pub struct ConnectOptions {
    /// Upper bound of concurrent connections to one target
    pub max_connections: u32,
    pub connect_timeout: Duration,
}

impl Default for ConnectOptions {
    fn default() -> Self {
        Self {
            max_connections: 4,
            connect_timeout: Duration::from_secs(5),
        }
    }
}

/// Invokes the capability matching a task payload and returns its output
pub async fn dispatch(
    driver: &dyn Driver,
    operation: OperationId,
    payload: &TaskPayload,
) -> Result<serde_json::Value, DriverError> {
    let output = match payload {
        TaskPayload::Migration(migration) => {
            serde_json::to_value(driver.execute_migration(operation, migration).await?)
        }
        TaskPayload::CreateRole { role } => serde_json::to_value(driver.create_role(role).await?),
        TaskPayload::UpdateRole { role_name, role } => {
            serde_json::to_value(driver.update_role(role_name, role).await?)
        }
        TaskPayload::FindRole { role_name } => {
            serde_json::to_value(driver.find_role(role_name).await?)
        }
        TaskPayload::DeleteRole { role_name } => {
            driver.delete_role(role_name).await?;
            Ok(serde_json::json!({ "deleted": role_name }))
        }
    };

    output.map_err(|e| DriverError::Execution(format!("Failed to encode driver output: {}", e)))
}
