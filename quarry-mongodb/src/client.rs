//! Connection to the database backing [`MongoStore`](crate::store::MongoStore).
//!
//! Quarry addresses collections by the names the [`EntityRegistry`] resolves,
//! so the client only needs one database handle and a way to open an untyped
//! collection by name.
//!
//! [`EntityRegistry`]: crate::registry::EntityRegistry

use std::sync::Arc;

use bson::{Document, doc};
use mongodb::{Client, Collection, Database};
use tracing::info;

use crate::config::{MongoConfig, QuarryConfig};
use crate::error::{QueryError, QueryResult};
use crate::store::MongoStore;

/// Handle on the database every registered entity lives in.
///
/// The driver pools connections internally; clones share the pool. Creating a
/// client does not contact the server.
#[derive(Clone)]
pub struct MongoClient {
    client: Client,
    database: Database,
    config: Arc<MongoConfig>,
}

impl MongoClient {
    /// Create a client from connection settings.
    pub async fn new(config: MongoConfig) -> QueryResult<Self> {
        let options = config.to_client_options().await?;

        let client = Client::with_options(options)
            .map_err(|e| QueryError::config(format!("failed to create client: {}", e)))?;
        let database = client.database(&config.database);

        info!(
            database = %config.database,
            app_name = ?config.app_name,
            "MongoDB client created"
        );

        Ok(Self {
            client,
            database,
            config: Arc::new(config),
        })
    }

    /// Create a client from the `[database]` table of a Quarry config.
    pub async fn from_config(config: &QuarryConfig) -> QueryResult<Self> {
        Self::new(config.mongo_config()?).await
    }

    /// Wrap the client in a [`MongoStore`] for a [`QueryEngine`](crate::QueryEngine).
    pub fn into_store(self) -> MongoStore {
        MongoStore::new(self)
    }

    /// Untyped collection for an entity's backing collection name.
    pub fn collection(&self, name: &str) -> Collection<Document> {
        self.database.collection(name)
    }

    /// Name of the bound database.
    pub fn database_name(&self) -> &str {
        self.database.name()
    }

    /// The underlying driver client.
    pub fn inner(&self) -> &Client {
        &self.client
    }

    /// Settings the client was created with.
    pub fn config(&self) -> &MongoConfig {
        &self.config
    }

    /// Round-trip a `ping` to the bound database.
    pub async fn ping(&self) -> QueryResult<()> {
        self.database.run_command(doc! { "ping": 1 }, None).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_client_binds_configured_database() {
        let config = QuarryConfig::from_toml_str(
            "[database]\nuri = \"mongodb://localhost:27017\"\ndatabase = \"notifications\"\nmax_pool_size = 4",
        )
        .unwrap();

        let client = MongoClient::from_config(&config).await.unwrap();
        assert_eq!(client.database_name(), "notifications");
        assert_eq!(client.config().max_pool_size, Some(4));
        assert_eq!(client.collection("admins").name(), "admins");
    }

    #[tokio::test]
    async fn test_missing_database_fails_before_connecting() {
        let config = QuarryConfig::from_toml_str("[database]\nuri = \"mongodb://localhost:27017\"")
            .unwrap();
        let result = MongoClient::from_config(&config).await;
        assert!(matches!(result, Err(QueryError::Config(_))));
    }

    #[tokio::test]
    async fn test_invalid_uri_is_config_error() {
        let result = MongoClient::new(MongoConfig::from_uri("not-a-uri", "notifications")).await;
        assert!(matches!(result, Err(QueryError::Config(_))));
    }
}
