use serde::Deserialize;

use crate::infrastructure::storage::PostgresConfig;

/// Application configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub connect_timeout_secs: u64,
    pub idle_timeout_secs: u64,
    /// Apply pending schema migrations on startup
    pub run_migrations: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        let postgres = PostgresConfig::default();

        Self {
            url: postgres.url,
            max_connections: postgres.max_connections,
            min_connections: postgres.min_connections,
            connect_timeout_secs: postgres.connect_timeout_secs,
            idle_timeout_secs: postgres.idle_timeout_secs,
            run_migrations: true,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::default(),
        }
    }
}

impl DatabaseConfig {
    pub fn to_postgres_config(&self) -> PostgresConfig {
        PostgresConfig::new(self.url.clone())
            .with_max_connections(self.max_connections)
            .with_min_connections(self.min_connections)
            .with_connect_timeout(self.connect_timeout_secs)
            .with_idle_timeout(self.idle_timeout_secs)
    }
}

impl AppConfig {
    /// Loads `.env`, `config/default`, `config/local` and `ORGS__*` variables,
    /// later sources overriding earlier ones
    pub fn load() -> Result<Self, config::ConfigError> {
        dotenvy::dotenv().ok();

        let builder = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name("config/local").required(false))
            .add_source(
                config::Environment::with_prefix("ORGS")
                    .separator("__")
                    .try_parsing(true),
            );

        Self::from_builder(builder)
    }

    fn from_builder(
        builder: config::ConfigBuilder<config::builder::DefaultState>,
    ) -> Result<Self, config::ConfigError> {
        builder.build()?.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use config::{File, FileFormat};

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();

        assert_eq!(config.logging.level, "info");
        assert_eq!(config.logging.format, LogFormat::Pretty);
        assert_eq!(config.database.max_connections, 10);
        assert!(config.database.run_migrations);
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let builder = config::Config::builder().add_source(File::from_str(
            r#"
            [database]
            url = "postgres://db.internal/orgs"
            max_connections = 32

            [logging]
            format = "json"
            "#,
            FileFormat::Toml,
        ));

        let config = AppConfig::from_builder(builder).unwrap();

        assert_eq!(config.database.url, "postgres://db.internal/orgs");
        assert_eq!(config.database.max_connections, 32);
        assert_eq!(config.database.min_connections, 1);
        assert_eq!(config.logging.format, LogFormat::Json);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_unknown_log_format_is_rejected() {
        let builder = config::Config::builder().add_source(File::from_str(
            "[logging]\nformat = \"xml\"",
            FileFormat::Toml,
        ));

        assert!(AppConfig::from_builder(builder).is_err());
    }

    #[test]
    fn test_to_postgres_config() {
        let database = DatabaseConfig {
            url: "postgres://localhost/orgs_test".to_string(),
            max_connections: 3,
            min_connections: 0,
            connect_timeout_secs: 5,
            idle_timeout_secs: 60,
            run_migrations: false,
        };

        let postgres = database.to_postgres_config();

        assert_eq!(postgres.url, "postgres://localhost/orgs_test");
        assert_eq!(postgres.max_connections, 3);
        assert_eq!(postgres.min_connections, 0);
        assert_eq!(postgres.connect_timeout_secs, 5);
        assert_eq!(postgres.idle_timeout_secs, 60);
    }
}
