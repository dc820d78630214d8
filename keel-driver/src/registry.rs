use keel_core::domain::engine::{Engine, TargetDatabase};
use keel_core::dto::driver::EngineCapabilities;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::driver::{ConnectOptions, Driver, DriverFactory};
use crate::engines::{ClickHouseFactory, MySqlFactory, PostgresFactory, SqliteFactory};
use crate::error::RegistryError;

/// Registry of driver factories and the connections they produced
///
/// Built once at startup and shared by reference with the orchestrator.
/// Drivers are connected lazily on first use and cached per target, so every
/// task against the same database shares one connection pool.
pub struct DriverRegistry {
    factories: HashMap<Engine, Box<dyn DriverFactory>>,
    options: ConnectOptions,
    connections: Mutex<HashMap<TargetDatabase, Arc<dyn Driver>>>,
}

impl DriverRegistry {
    /// Creates an empty registry
    pub fn new(options: ConnectOptions) -> Self {
        Self {
            factories: HashMap::new(),
            options,
            connections: Mutex::new(HashMap::new()),
        }
    }

    /// Creates a registry with every adapter shipped with Keel
    pub fn with_default_engines(options: ConnectOptions) -> Self {
        let mut registry = Self::new(options);
        registry.register(PostgresFactory);
        registry.register(MySqlFactory::new(Engine::MySql));
        registry.register(MySqlFactory::new(Engine::TiDb));
        registry.register(SqliteFactory);
        registry.register(ClickHouseFactory);
        registry
    }

    /// Registers a factory
    ///
    /// # Panics
    /// Panics if a factory for the same engine is already registered
    pub fn register<F: DriverFactory + 'static>(&mut self, factory: F) {
        let engine = factory.engine();
        if self.factories.contains_key(&engine) {
            panic!("Driver for engine '{}' is already registered", engine);
        }
        self.factories.insert(engine, Box::new(factory));
    }

    /// Registered engines, in declaration order
    pub fn engines(&self) -> Vec<Engine> {
        Engine::ALL
            .into_iter()
            .filter(|e| self.factories.contains_key(e))
            .collect()
    }

    /// Capabilities of every registered engine
    pub fn capability_matrix(&self) -> Vec<EngineCapabilities> {
        self.engines()
            .into_iter()
            .filter_map(|engine| {
                self.factories.get(&engine).map(|f| EngineCapabilities {
                    engine,
                    capabilities: f.capabilities(),
                })
            })
            .collect()
    }

    /// Returns a ready driver for the target, connecting if needed
    pub async fn resolve(&self, target: &TargetDatabase) -> Result<Arc<dyn Driver>, RegistryError> {
        let factory = self
            .factories
            .get(&target.engine)
            .ok_or(RegistryError::UnsupportedEngine(target.engine))?;

        if let Some(driver) = self.connections.lock().await.get(target) {
            return Ok(Arc::clone(driver));
        }

        debug!("Connecting to {}", target);

        let connection_error = |source| RegistryError::Connection {
            target: target.to_string(),
            source,
        };

        // Connect outside the lock so a slow target does not block others
        let driver = factory
            .connect(&target.connection, &self.options)
            .await
            .map_err(connection_error)?;
        driver.ping().await.map_err(connection_error)?;

        let mut connections = self.connections.lock().await;
        let driver = connections
            .entry(target.clone())
            .or_insert_with(|| {
                info!("Connected to {}", target);
                driver
            })
            .clone();

        Ok(driver)
    }

    /// Drops the cached driver for a target, if any
    pub async fn evict(&self, target: &TargetDatabase) -> bool {
        self.connections.lock().await.remove(target).is_some()
    }

    /// Number of cached connections
    pub async fn connection_count(&self) -> usize {
        self.connections.lock().await.len()
    }
}

impl Default for DriverRegistry {
    fn default() -> Self {
        Self::with_default_engines(ConnectOptions::default())
    }
}
