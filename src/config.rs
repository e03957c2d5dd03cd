use crate::error::{BunnyError, BunnyResult};
use std::env;

fn env_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.is_empty())
}

fn env_or(name: &str, default: &str) -> String {
    env_var(name).unwrap_or_else(|| default.to_string())
}

fn env_bool(name: &str, default: bool) -> bool {
    match env_var(name) {
        Some(v) => matches!(v.to_lowercase().as_str(), "1" | "true" | "yes"),
        None => default,
    }
}

fn env_int<T: std::str::FromStr>(name: &str, default: T) -> T {
    env_var(name)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Database connection and schema settings. Concrete driver bootstrap is out
/// of scope; these fields describe the engine the abstract `DbClient`
/// implementation will be constructed against.
#[derive(Debug, Clone)]
pub struct DatabaseSettings {
    pub drivername: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub schema: String,
    pub database: Option<String>,
    pub catalog: String,
    pub duckdb_path_to_db: String,
    pub duckdb_memory_limit: String,
    pub duckdb_temp_directory: String,
    pub use_azure_managed_identity: bool,
    pub azure_managed_identity_client_id: Option<String>,
    pub use_trino: bool,
}

impl DatabaseSettings {
    pub fn from_env() -> BunnyResult<Self> {
        let drivername = env_or("DATASOURCE_DB_DRIVERNAME", "postgresql");
        if !matches!(drivername.as_str(), "postgresql" | "mssql" | "duckdb") {
            return Err(BunnyError::Configuration(format!(
                "DATASOURCE_DB_DRIVERNAME must be one of postgresql, mssql, duckdb, got {drivername}"
            )));
        }

        let host = env_var("DATASOURCE_DB_HOST");
        let port = env_var("DATASOURCE_DB_PORT").and_then(|v| v.parse().ok());
        let database = env_var("DATASOURCE_DB_DATABASE");

        if drivername != "duckdb" {
            if host.is_none() {
                return Err(BunnyError::Configuration(
                    "DATASOURCE_DB_HOST is required unless using duckdb.".into(),
                ));
            }
            if port.is_none() {
                return Err(BunnyError::Configuration(
                    "DATASOURCE_DB_PORT is required unless using duckdb.".into(),
                ));
            }
            if database.is_none() {
                return Err(BunnyError::Configuration(
                    "DATASOURCE_DB_DATABASE is required unless using duckdb.".into(),
                ));
            }
        }

        let schema = env_var("DATASOURCE_DB_SCHEMA").ok_or_else(|| {
            BunnyError::Configuration("DATASOURCE_DB_SCHEMA is required".into())
        })?;

        Ok(Self {
            drivername,
            username: Some(env_or("DATASOURCE_DB_USERNAME", "trino-user")),
            password: env_var("DATASOURCE_DB_PASSWORD"),
            host,
            port,
            schema,
            database,
            catalog: env_or("DATASOURCE_DB_CATALOG", "hutch"),
            duckdb_path_to_db: env_or("DATASOURCE_DUCKDB_PATH_TO_DB", "/data/file.db"),
            duckdb_memory_limit: env_or("DATASOURCE_DUCKDB_MEMORY_LIMIT", "1000mb"),
            duckdb_temp_directory: env_or("DATASOURCE_DUCKDB_TEMP_DIRECTORY", "/tmp"),
            use_azure_managed_identity: env_bool("DATASOURCE_USE_AZURE_MANAGED_IDENTITY", false),
            azure_managed_identity_client_id: env_var(
                "DATASOURCE_AZURE_MANAGED_IDENTITY_CLIENT_ID",
            ),
            use_trino: env_bool("DATASOURCE_USE_TRINO", false),
        })
    }

    /// Debug-safe view, redacting the password the way the upstream's
    /// `safe_model_dump` excludes `DATASOURCE_DB_PASSWORD`.
    pub fn redacted(&self) -> String {
        format!(
            "DatabaseSettings {{ drivername: {:?}, host: {:?}, port: {:?}, schema: {:?}, database: {:?}, catalog: {:?}, password: \"***\" }}",
            self.drivername, self.host, self.port, self.schema, self.database, self.catalog
        )
    }
}

#[derive(Debug, Clone)]
pub struct LoggingSettings {
    pub logger_name: String,
    pub logger_level: String,
}

impl LoggingSettings {
    pub fn from_env() -> BunnyResult<Self> {
        let logger_level = env_or("BUNNY_LOGGER_LEVEL", "INFO");
        if !matches!(
            logger_level.as_str(),
            "DEBUG" | "INFO" | "WARNING" | "ERROR" | "CRITICAL"
        ) {
            return Err(BunnyError::Configuration(format!(
                "BUNNY_LOGGER_LEVEL must be one of DEBUG, INFO, WARNING, ERROR, CRITICAL, got {logger_level}"
            )));
        }
        Ok(Self {
            logger_name: env_or("LOGGER_NAME", "hutch"),
            logger_level,
        })
    }

    /// Maps to the `tracing` level the `EnvFilter` should be built with.
    pub fn tracing_filter(&self) -> &'static str {
        match self.logger_level.as_str() {
            "DEBUG" => "debug",
            "WARNING" => "warn",
            "ERROR" | "CRITICAL" => "error",
            _ => "info",
        }
    }
}

#[derive(Debug, Clone)]
pub struct ObfuscationSettings {
    pub low_number_suppression_threshold: i64,
    pub rounding_target: i64,
}

impl ObfuscationSettings {
    pub fn from_env() -> Self {
        Self {
            low_number_suppression_threshold: env_int(
                "LOW_NUMBER_SUPPRESSION_THRESHOLD",
                10,
            ),
            rounding_target: env_int("ROUNDING_TARGET", 10),
        }
    }
}

#[derive(Debug, Clone)]
pub struct TaskApiSettings {
    pub enforce_https: bool,
    pub base_url: String,
    pub username: String,
    pub password: String,
    pub task_type: Option<String>,
    pub collection_id: String,
}

impl TaskApiSettings {
    pub fn from_env() -> BunnyResult<Self> {
        let enforce_https = env_bool("TASK_API_ENFORCE_HTTPS", true);
        let base_url = env_var("TASK_API_BASE_URL").ok_or_else(|| {
            BunnyError::Configuration("TASK_API_BASE_URL is required".into())
        })?;
        if enforce_https && !base_url.starts_with("https://") {
            return Err(BunnyError::Configuration(
                "HTTPS is required for the task API but not used. Set TASK_API_ENFORCE_HTTPS to false if you are using a non-HTTPS connection.".into(),
            ));
        }
        let task_type = env_var("TASK_API_TYPE");
        if let Some(t) = &task_type {
            if t != "a" && t != "b" {
                return Err(BunnyError::Configuration(format!(
                    "TASK_API_TYPE must be one of a, b, got {t}"
                )));
            }
        }
        Ok(Self {
            enforce_https,
            base_url,
            username: env_var("TASK_API_USERNAME").ok_or_else(|| {
                BunnyError::Configuration("TASK_API_USERNAME is required".into())
            })?,
            password: env_var("TASK_API_PASSWORD").ok_or_else(|| {
                BunnyError::Configuration("TASK_API_PASSWORD is required".into())
            })?,
            task_type,
            collection_id: env_var("COLLECTION_ID").ok_or_else(|| {
                BunnyError::Configuration("COLLECTION_ID is required".into())
            })?,
        })
    }
}

#[derive(Debug, Clone)]
pub struct PollingSettings {
    pub polling_interval: u64,
    pub initial_backoff: u64,
    pub max_backoff: u64,
}

impl PollingSettings {
    pub fn from_env() -> Self {
        Self {
            polling_interval: env_int("POLLING_INTERVAL", 5),
            initial_backoff: env_int("INITIAL_BACKOFF", 5),
            max_backoff: env_int("MAX_BACKOFF", 60),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CacheSettings {
    pub enabled: bool,
    pub cache_dir: String,
    pub ttl_hours: u64,
}

impl CacheSettings {
    pub fn from_env() -> Self {
        Self {
            enabled: env_bool("CACHE_ENABLED", false),
            cache_dir: env_or("CACHE_DIR", "/tmp/bunny-cache"),
            ttl_hours: env_int("CACHE_TTL_HOURS", 24),
        }
    }
}

/// Settings for the one-shot CLI path — mirrors the upstream's narrower
/// `Settings` composition (database + logging + obfuscation only).
#[derive(Debug, Clone)]
pub struct Settings {
    pub database: DatabaseSettings,
    pub logging: LoggingSettings,
    pub obfuscation: ObfuscationSettings,
}

impl Settings {
    pub fn from_env() -> BunnyResult<Self> {
        dotenvy::dotenv().ok();
        Ok(Self {
            database: DatabaseSettings::from_env()?,
            logging: LoggingSettings::from_env()?,
            obfuscation: ObfuscationSettings::from_env(),
        })
    }
}

/// Settings for the daemon path — mirrors the upstream's wider
/// `DaemonSettings` composition (adds task_api + polling + cache).
#[derive(Debug, Clone)]
pub struct DaemonSettings {
    pub database: DatabaseSettings,
    pub logging: LoggingSettings,
    pub obfuscation: ObfuscationSettings,
    pub task_api: TaskApiSettings,
    pub polling: PollingSettings,
    pub cache: CacheSettings,
}

impl DaemonSettings {
    pub fn from_env() -> BunnyResult<Self> {
        dotenvy::dotenv().ok();
        Ok(Self {
            database: DatabaseSettings::from_env()?,
            logging: LoggingSettings::from_env()?,
            obfuscation: ObfuscationSettings::from_env(),
            task_api: TaskApiSettings::from_env()?,
            polling: PollingSettings::from_env(),
            cache: CacheSettings::from_env(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn clear_task_api_env() {
        for k in [
            "TASK_API_ENFORCE_HTTPS",
            "TASK_API_BASE_URL",
            "TASK_API_USERNAME",
            "TASK_API_PASSWORD",
            "TASK_API_TYPE",
            "COLLECTION_ID",
        ] {
            unsafe { env::remove_var(k); }
        }
    }

    #[test]
    fn https_enforced_by_default() {
        clear_task_api_env();
        unsafe { env::set_var("TASK_API_BASE_URL", "http://example.org"); }
        unsafe { env::set_var("TASK_API_USERNAME", "u"); }
        unsafe { env::set_var("TASK_API_PASSWORD", "p"); }
        unsafe { env::set_var("COLLECTION_ID", "c"); }
        let err = TaskApiSettings::from_env().unwrap_err();
        assert!(matches!(err, BunnyError::Configuration(_)));
        clear_task_api_env();
    }

    #[test]
    fn https_can_be_disabled() {
        clear_task_api_env();
        unsafe { env::set_var("TASK_API_ENFORCE_HTTPS", "false"); }
        unsafe { env::set_var("TASK_API_BASE_URL", "http://example.org"); }
        unsafe { env::set_var("TASK_API_USERNAME", "u"); }
        unsafe { env::set_var("TASK_API_PASSWORD", "p"); }
        unsafe { env::set_var("COLLECTION_ID", "c"); }
        let settings = TaskApiSettings::from_env().unwrap();
        assert_eq!(settings.base_url, "http://example.org");
        clear_task_api_env();
    }

    #[test]
    fn obfuscation_defaults_are_ten() {
        unsafe { env::remove_var("LOW_NUMBER_SUPPRESSION_THRESHOLD"); }
        unsafe { env::remove_var("ROUNDING_TARGET"); }
        let settings = ObfuscationSettings::from_env();
        assert_eq!(settings.low_number_suppression_threshold, 10);
        assert_eq!(settings.rounding_target, 10);
    }
}
