//! Engine adapters shipped with Keel

mod clickhouse;
mod mysql;
mod postgres;
mod sql;
mod sqlite;

pub use clickhouse::{ClickHouseDriver, ClickHouseFactory};
pub use mysql::{MySqlDriver, MySqlFactory};
pub use postgres::{PostgresDriver, PostgresFactory};
pub use sqlite::{SqliteDriver, SqliteFactory};
