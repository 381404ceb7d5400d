//! Storage infrastructure - connection pooling and schema migrations

pub mod migrations;
mod postgres;

pub use migrations::{org_migrations, run_org_migrations, Migration, PostgresMigrator};
pub use postgres::PostgresConfig;
