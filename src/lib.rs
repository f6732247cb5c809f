//! # Quarry
//!
//! A generic query, aggregation and search-filter engine for MongoDB
//! collections.
//!
//! Quarry provides:
//! - A dispatcher over a closed set of CRUD operations keyed by entity name
//! - Paged listings built as aggregation pipelines with pagination metadata
//! - Case-insensitive existence checks for uniqueness validation
//! - Declarative search fields translated into filter conditions
//! - Soft-delete scoping on every read and non-insert write
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use quarry::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), quarry::QueryError> {
//!     let config = QuarryConfig::from_file("quarry.toml")?.apply_env();
//!     let client = MongoClient::new(config.mongo_config()?).await?;
//!     let engine = QueryEngine::new(MongoStore::new(client), Arc::new(config.registry()?));
//!
//!     let page = engine
//!         .dispatch("EmailTemplate", QuerySpec::Read(ReadQuery::default()))
//!         .await?;
//!     println!("{:?}", page);
//!
//!     Ok(())
//! }
//! ```

#![cfg_attr(docsrs, feature(doc_cfg))]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

/// The MongoDB engine.
pub mod mongodb {
    pub use quarry_mongodb::*;
}

/// Prelude module for convenient imports.
pub mod prelude {
    pub use quarry_mongodb::prelude::*;
}

// Re-export key types at the crate root
pub use quarry_mongodb::{
    AggregateQuery, EntityRegistry, ExistsQuery, ListResult, PageRequest, Pagination,
    QuarryConfig, QueryEngine, QueryError, QueryOutcome, QueryResult, QuerySpec,
};
