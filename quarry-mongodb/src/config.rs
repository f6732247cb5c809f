//! Connection and entity configuration.
//!
//! [`MongoConfig`] describes how to reach the server; [`QuarryConfig`] is the
//! TOML document an application ships with, carrying the connection settings
//! plus the entity table the [`EntityRegistry`] is built from.
//!
//! ```toml
//! [database]
//! uri = "mongodb://localhost:27017"
//! database = "notifications"
//!
//! [entities.EmailTemplate]
//! timestamps = true
//!
//! [entities.EmailTemplate.relations]
//! createdBy = "Admin"
//!
//! [entities.Admin]
//! collection = "admins"
//! ```

use std::path::Path;
use std::time::Duration;

use indexmap::IndexMap;
use mongodb::options::ClientOptions;
use serde::Deserialize;

use crate::error::{QueryError, QueryResult};
use crate::registry::EntityRegistry;

/// Environment variable overriding the connection URI.
pub const MONGO_URL_ENV: &str = "MONGO_URL";

/// Environment variable overriding the database name.
pub const MONGO_DATABASE_ENV: &str = "MONGO_DATABASE";

/// MongoDB connection configuration.
#[derive(Debug, Clone)]
pub struct MongoConfig {
    /// MongoDB connection URI.
    pub uri: String,
    /// Database name.
    pub database: String,
    /// Application name (shown in server logs).
    pub app_name: Option<String>,
    /// Minimum connection pool size.
    pub min_pool_size: Option<u32>,
    /// Maximum connection pool size.
    pub max_pool_size: Option<u32>,
    /// Maximum idle time for connections.
    pub max_idle_time: Option<Duration>,
    /// Connection timeout.
    pub connect_timeout: Option<Duration>,
    /// Server selection timeout.
    pub server_selection_timeout: Option<Duration>,
    /// Retry writes.
    pub retry_writes: Option<bool>,
    /// Retry reads.
    pub retry_reads: Option<bool>,
    /// Direct connection (bypass replica set discovery).
    pub direct_connection: Option<bool>,
}

impl Default for MongoConfig {
    fn default() -> Self {
        Self {
            uri: "mongodb://localhost:27017".to_string(),
            database: String::new(),
            app_name: Some("quarry".to_string()),
            min_pool_size: None,
            max_pool_size: Some(10),
            max_idle_time: Some(Duration::from_secs(300)),
            connect_timeout: Some(Duration::from_secs(10)),
            server_selection_timeout: Some(Duration::from_secs(30)),
            retry_writes: Some(true),
            retry_reads: Some(true),
            direct_connection: None,
        }
    }
}

impl MongoConfig {
    /// Create a new configuration from a MongoDB URI.
    pub fn from_uri(uri: impl Into<String>, database: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            database: database.into(),
            ..Self::default()
        }
    }

    /// Create a builder for configuration.
    pub fn builder() -> MongoConfigBuilder {
        MongoConfigBuilder::new()
    }

    /// Convert to MongoDB ClientOptions.
    pub async fn to_client_options(&self) -> QueryResult<ClientOptions> {
        let mut options = ClientOptions::parse(&self.uri)
            .await
            .map_err(|e| QueryError::config(format!("failed to parse URI: {}", e)))?;

        if let Some(ref app_name) = self.app_name {
            options.app_name = Some(app_name.clone());
        }
        if let Some(min_pool) = self.min_pool_size {
            options.min_pool_size = Some(min_pool);
        }
        if let Some(max_pool) = self.max_pool_size {
            options.max_pool_size = Some(max_pool);
        }
        if let Some(max_idle) = self.max_idle_time {
            options.max_idle_time = Some(max_idle);
        }
        if let Some(connect_timeout) = self.connect_timeout {
            options.connect_timeout = Some(connect_timeout);
        }
        if let Some(selection_timeout) = self.server_selection_timeout {
            options.server_selection_timeout = Some(selection_timeout);
        }
        if let Some(retry_writes) = self.retry_writes {
            options.retry_writes = Some(retry_writes);
        }
        if let Some(retry_reads) = self.retry_reads {
            options.retry_reads = Some(retry_reads);
        }
        if let Some(direct) = self.direct_connection {
            options.direct_connection = Some(direct);
        }

        Ok(options)
    }
}

/// Builder for MongoDB configuration.
#[derive(Debug, Default)]
pub struct MongoConfigBuilder {
    uri: Option<String>,
    database: Option<String>,
    app_name: Option<String>,
    min_pool_size: Option<u32>,
    max_pool_size: Option<u32>,
    max_idle_time: Option<Duration>,
    connect_timeout: Option<Duration>,
    server_selection_timeout: Option<Duration>,
    retry_writes: Option<bool>,
    retry_reads: Option<bool>,
    direct_connection: Option<bool>,
}

impl MongoConfigBuilder {
    /// Create a new builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the MongoDB URI.
    pub fn uri(mut self, uri: impl Into<String>) -> Self {
        self.uri = Some(uri.into());
        self
    }

    /// Set the database name.
    pub fn database(mut self, database: impl Into<String>) -> Self {
        self.database = Some(database.into());
        self
    }

    /// Set the application name.
    pub fn app_name(mut self, name: impl Into<String>) -> Self {
        self.app_name = Some(name.into());
        self
    }

    /// Set the minimum pool size.
    pub fn min_pool_size(mut self, size: u32) -> Self {
        self.min_pool_size = Some(size);
        self
    }

    /// Set the maximum pool size.
    pub fn max_pool_size(mut self, size: u32) -> Self {
        self.max_pool_size = Some(size);
        self
    }

    /// Set the maximum idle time for connections.
    pub fn max_idle_time(mut self, duration: Duration) -> Self {
        self.max_idle_time = Some(duration);
        self
    }

    /// Set the connection timeout.
    pub fn connect_timeout(mut self, duration: Duration) -> Self {
        self.connect_timeout = Some(duration);
        self
    }

    /// Set the server selection timeout.
    pub fn server_selection_timeout(mut self, duration: Duration) -> Self {
        self.server_selection_timeout = Some(duration);
        self
    }

    /// Enable or disable retry writes.
    pub fn retry_writes(mut self, enabled: bool) -> Self {
        self.retry_writes = Some(enabled);
        self
    }

    /// Enable or disable retry reads.
    pub fn retry_reads(mut self, enabled: bool) -> Self {
        self.retry_reads = Some(enabled);
        self
    }

    /// Enable direct connection (bypass replica set discovery).
    pub fn direct_connection(mut self, enabled: bool) -> Self {
        self.direct_connection = Some(enabled);
        self
    }

    /// Build the configuration.
    pub fn build(self) -> QueryResult<MongoConfig> {
        let database = self
            .database
            .filter(|name| !name.is_empty())
            .ok_or_else(|| QueryError::config("database name is required"))?;

        Ok(MongoConfig {
            uri: self
                .uri
                .unwrap_or_else(|| "mongodb://localhost:27017".to_string()),
            database,
            app_name: self.app_name.or(Some("quarry".to_string())),
            min_pool_size: self.min_pool_size,
            max_pool_size: self.max_pool_size.or(Some(10)),
            max_idle_time: self.max_idle_time.or(Some(Duration::from_secs(300))),
            connect_timeout: self.connect_timeout.or(Some(Duration::from_secs(10))),
            server_selection_timeout: self
                .server_selection_timeout
                .or(Some(Duration::from_secs(30))),
            retry_writes: self.retry_writes.or(Some(true)),
            retry_reads: self.retry_reads.or(Some(true)),
            direct_connection: self.direct_connection,
        })
    }
}

/// Top-level configuration file.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct QuarryConfig {
    /// Connection settings.
    pub database: DatabaseSection,
    /// Logical entities keyed by name, in file order.
    pub entities: IndexMap<String, EntityConfig>,
}

/// The `[database]` table.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct DatabaseSection {
    /// Connection URI.
    pub uri: Option<String>,
    /// Database name.
    pub database: Option<String>,
    /// Application name.
    pub app_name: Option<String>,
    /// Minimum pool size.
    pub min_pool_size: Option<u32>,
    /// Maximum pool size.
    pub max_pool_size: Option<u32>,
    /// Connection timeout in milliseconds.
    pub connect_timeout_ms: Option<u64>,
    /// Server selection timeout in milliseconds.
    pub server_selection_timeout_ms: Option<u64>,
    /// Retry writes.
    pub retry_writes: Option<bool>,
    /// Retry reads.
    pub retry_reads: Option<bool>,
    /// Direct connection.
    pub direct_connection: Option<bool>,
}

/// One `[entities.<Name>]` table.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct EntityConfig {
    /// Collection name; defaults to the lower-cased entity name plus `s`.
    pub collection: Option<String>,
    /// Stamp `createdAt`/`updatedAt` on writes.
    pub timestamps: bool,
    /// Relation paths mapped to the entity they reference.
    pub relations: IndexMap<String, String>,
}

impl QuarryConfig {
    /// Parse a configuration from TOML text.
    pub fn from_toml_str(source: &str) -> QueryResult<Self> {
        toml::from_str(source).map_err(|e| QueryError::config(format!("invalid config: {}", e)))
    }

    /// Load a configuration file.
    pub fn from_file(path: impl AsRef<Path>) -> QueryResult<Self> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path).map_err(|e| {
            QueryError::config(format!("failed to read {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&source)
    }

    /// Apply `MONGO_URL` / `MONGO_DATABASE` from the process environment.
    pub fn apply_env(self) -> Self {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary variable lookup.
    pub fn apply_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(uri) = lookup(MONGO_URL_ENV).filter(|v| !v.is_empty()) {
            self.database.uri = Some(uri);
        }
        if let Some(database) = lookup(MONGO_DATABASE_ENV).filter(|v| !v.is_empty()) {
            self.database.database = Some(database);
        }
        self
    }

    /// Build the connection configuration.
    pub fn mongo_config(&self) -> QueryResult<MongoConfig> {
        let section = &self.database;
        let mut builder = MongoConfig::builder();

        if let Some(ref uri) = section.uri {
            builder = builder.uri(uri.clone());
        }
        if let Some(ref database) = section.database {
            builder = builder.database(database.clone());
        }
        if let Some(ref app_name) = section.app_name {
            builder = builder.app_name(app_name.clone());
        }
        if let Some(size) = section.min_pool_size {
            builder = builder.min_pool_size(size);
        }
        if let Some(size) = section.max_pool_size {
            builder = builder.max_pool_size(size);
        }
        if let Some(ms) = section.connect_timeout_ms {
            builder = builder.connect_timeout(Duration::from_millis(ms));
        }
        if let Some(ms) = section.server_selection_timeout_ms {
            builder = builder.server_selection_timeout(Duration::from_millis(ms));
        }
        if let Some(enabled) = section.retry_writes {
            builder = builder.retry_writes(enabled);
        }
        if let Some(enabled) = section.retry_reads {
            builder = builder.retry_reads(enabled);
        }
        if let Some(enabled) = section.direct_connection {
            builder = builder.direct_connection(enabled);
        }

        builder.build()
    }

    /// Build the entity registry from the `[entities]` tables.
    pub fn registry(&self) -> QueryResult<EntityRegistry> {
        let mut builder = EntityRegistry::builder();
        for (name, entity) in &self.entities {
            builder = builder.register_with(name, |handle| {
                let mut handle = handle.timestamps(entity.timestamps);
                if let Some(ref collection) = entity.collection {
                    handle = handle.collection(collection.clone());
                }
                for (path, target) in &entity.relations {
                    handle = handle.relation(path.clone(), target.clone());
                }
                handle
            });
        }
        builder.build()
    }
}
