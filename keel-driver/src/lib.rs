//! Keel Drivers
//!
//! The capability interface every database engine adapter implements, the
//! registry that turns an engine and connection identity into a ready driver,
//! and the adapters shipped with Keel.
//!
//! # Example
//!
//! ```no_run
//! use keel_core::domain::engine::{Engine, TargetDatabase};
//! use keel_driver::{ConnectOptions, DriverRegistry};
//!
//! # async fn example() -> Result<(), keel_driver::RegistryError> {
//! let registry = DriverRegistry::with_default_engines(ConnectOptions::default());
//! let target = TargetDatabase::new(Engine::Postgres, "postgres://app@localhost/app");
//!
//! let driver = registry.resolve(&target).await?;
//! println!("{} supports {} capabilities", driver.engine(), driver.capabilities().len());
//! # Ok(())
//! # }
//! ```

pub mod driver;
pub mod engines;
pub mod error;
pub mod registry;

pub use driver::{ConnectOptions, Driver, DriverFactory, OperationId, dispatch};
pub use error::{DriverError, RegistryError};
pub use registry::DriverRegistry;
