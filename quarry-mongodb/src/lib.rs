//! # quarry-mongodb
//!
//! Generic query, aggregation and search-filter engine over MongoDB
//! collections.
//!
//! This crate provides:
//! - An operation dispatcher over a closed set of CRUD operations
//! - Paged listings built as aggregation pipelines, with pagination metadata
//! - Case-insensitive existence checks for uniqueness validation
//! - Translation of declarative search fields into filter conditions
//! - Soft-delete scoping applied to every read and non-insert write
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use quarry_mongodb::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = QuarryConfig::from_file("quarry.toml")?.apply_env();
//!     let client = MongoClient::new(config.mongo_config()?).await?;
//!     let engine = QueryEngine::new(MongoStore::new(client), Arc::new(config.registry()?));
//!
//!     let page = engine
//!         .aggregate(
//!             "EmailTemplate",
//!             &AggregateQuery::new()
//!                 .match_condition(doc! { "status": 1 })
//!                 .sort(doc! { "_id": -1 }),
//!         )
//!         .await?;
//!     println!("{} of {}", page.len(), page.pagination.total_count);
//!
//!     let taken = engine
//!         .exists("Admin", &ExistsQuery::new("email", "foo@bar.com"))
//!         .await?;
//!     println!("taken: {}", taken);
//!
//!     Ok(())
//! }
//! ```
//!
//! ## Search fields
//!
//! ```rust
//! use quarry_mongodb::search::{self, SearchFieldSpec, SearchFields};
//! use quarry_mongodb::doc;
//!
//! let mut fields = SearchFields::new();
//! fields.insert("search1".into(), SearchFieldSpec::numeric_regex("status"));
//!
//! let condition = search::to_match_condition(&fields, &doc! { "search1": "1" }).unwrap();
//! assert!(condition.contains_key("$and"));
//! ```

pub mod client;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod exists;
pub mod filter;
pub mod logging;
pub mod operation;
pub mod pagination;
pub mod pipeline;
pub mod populate;
pub mod registry;
pub mod search;
pub mod store;

pub use bson::oid::ObjectId;
pub use bson::{Bson, Document, doc};
pub use client::MongoClient;
pub use config::{DatabaseSection, EntityConfig, MongoConfig, MongoConfigBuilder, QuarryConfig};
pub use dispatch::{QueryEngine, QueryOutcome};
pub use error::{QueryError, QueryResult};
pub use exists::ExistsQuery;
pub use filter::FilterBuilder;
pub use operation::{
    DeleteManyQuery, FindOneQuery, ListQuery, OperationKind, QuerySpec, ReadQuery, StatusUpdate,
    UpdateQuery,
};
pub use pagination::{ListResult, PageRequest, Pagination};
pub use pipeline::{AggregatePlan, AggregateQuery, LookupConfig, PipelineBuilder};
pub use populate::{FieldSelection, PopulateOption};
pub use registry::{CollectionHandle, EntityRegistry, EntityRegistryBuilder};
pub use search::{DateKind, EqualKind, SearchFieldSpec, SearchFields, SearchKind};
pub use store::{CountSpec, DocumentStore, FindSpec, MongoStore, UpdateOutcome};

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::client::MongoClient;
    pub use crate::config::{MongoConfig, MongoConfigBuilder, QuarryConfig};
    pub use crate::dispatch::{QueryEngine, QueryOutcome};
    pub use crate::error::{QueryError, QueryResult};
    pub use crate::exists::ExistsQuery;
    pub use crate::filter::FilterBuilder;
    pub use crate::operation::{OperationKind, QuerySpec, ReadQuery, StatusUpdate, UpdateQuery};
    pub use crate::pagination::{ListResult, PageRequest, Pagination};
    pub use crate::pipeline::{AggregateQuery, LookupConfig};
    pub use crate::populate::PopulateOption;
    pub use crate::registry::EntityRegistry;
    pub use crate::search::{SearchFieldSpec, SearchFields};
    pub use crate::store::{DocumentStore, MongoStore};
    pub use bson::oid::ObjectId;
    pub use bson::{Bson, Document, doc};
}
