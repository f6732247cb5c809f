//! The document store seam.
//!
//! The engine never talks to the driver directly: every round trip goes through
//! [`DocumentStore`], addressed by collection name. [`MongoStore`] is the
//! production implementation on top of [`MongoClient`]; tests plug in an
//! in-memory store.

use std::future::Future;
use std::pin::Pin;

use bson::{Bson, Document};
use futures::TryStreamExt;
use mongodb::options::{
    Collation, CollationStrength, CountOptions, FindOneOptions, FindOptions,
};
use tracing::debug;

use crate::client::MongoClient;
use crate::error::QueryResult;
use crate::quarry_debug;

/// A boxed future, as returned by [`DocumentStore`] methods.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Locale-aware comparison used for existence checks: English, strength 2
/// (case and diacritic insensitive).
pub fn case_insensitive_collation() -> Collation {
    Collation::builder()
        .locale("en".to_string())
        .strength(Some(CollationStrength::Secondary))
        .build()
}

/// Options for a `find` round trip.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FindSpec {
    /// Projection document.
    pub projection: Option<Document>,
    /// Sort document.
    pub sort: Option<Document>,
    /// Number of documents to skip.
    pub skip: Option<u64>,
    /// Maximum number of documents to return.
    pub limit: Option<i64>,
}

impl FindSpec {
    /// Set the projection, ignoring empty documents.
    pub fn projection(mut self, projection: Option<Document>) -> Self {
        self.projection = projection.filter(|p| !p.is_empty());
        self
    }

    /// Set the sort, ignoring empty documents.
    pub fn sort(mut self, sort: Option<Document>) -> Self {
        self.sort = sort.filter(|s| !s.is_empty());
        self
    }

    /// Set skip and limit.
    pub fn window(mut self, skip: u64, limit: i64) -> Self {
        self.skip = Some(skip);
        self.limit = Some(limit);
        self
    }
}

/// Options for a `count` round trip.
#[derive(Debug, Clone, Default)]
pub struct CountSpec {
    /// Number of matching documents to skip before counting.
    pub skip: Option<u64>,
    /// Collation for string comparison.
    pub collation: Option<Collation>,
}

/// Result of a single-document update.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpdateOutcome {
    /// Documents matched by the filter.
    pub matched_count: u64,
    /// Documents actually changed.
    pub modified_count: u64,
}

/// A document collection store.
///
/// Every method is one independent round trip; implementations must not retry
/// or swallow failures.
pub trait DocumentStore: Send + Sync {
    /// Insert one document, returning its identifier.
    fn insert_one<'a>(&'a self, collection: &'a str, document: Document)
    -> BoxFuture<'a, QueryResult<Bson>>;

    /// Insert many documents, returning their identifiers in input order.
    fn insert_many<'a>(
        &'a self,
        collection: &'a str,
        documents: Vec<Document>,
    ) -> BoxFuture<'a, QueryResult<Vec<Bson>>>;

    /// Find all documents matching a filter.
    fn find<'a>(
        &'a self,
        collection: &'a str,
        filter: Document,
        spec: FindSpec,
    ) -> BoxFuture<'a, QueryResult<Vec<Document>>>;

    /// Find the first document matching a filter.
    fn find_one<'a>(
        &'a self,
        collection: &'a str,
        filter: Document,
        projection: Option<Document>,
    ) -> BoxFuture<'a, QueryResult<Option<Document>>>;

    /// Count documents matching a filter.
    fn count<'a>(
        &'a self,
        collection: &'a str,
        filter: Document,
        spec: CountSpec,
    ) -> BoxFuture<'a, QueryResult<u64>>;

    /// Update the first document matching a filter.
    fn update_one<'a>(
        &'a self,
        collection: &'a str,
        filter: Document,
        update: Document,
    ) -> BoxFuture<'a, QueryResult<UpdateOutcome>>;

    /// Delete the first document matching a filter.
    fn delete_one<'a>(&'a self, collection: &'a str, filter: Document)
    -> BoxFuture<'a, QueryResult<u64>>;

    /// Delete every document matching a filter.
    fn delete_many<'a>(
        &'a self,
        collection: &'a str,
        filter: Document,
    ) -> BoxFuture<'a, QueryResult<u64>>;

    /// Run an aggregation pipeline.
    fn aggregate<'a>(
        &'a self,
        collection: &'a str,
        pipeline: Vec<Document>,
    ) -> BoxFuture<'a, QueryResult<Vec<Document>>>;
}

/// [`DocumentStore`] backed by a MongoDB database.
#[derive(Clone)]
pub struct MongoStore {
    client: MongoClient,
}

impl MongoStore {
    /// Create a store over a connected client.
    pub fn new(client: MongoClient) -> Self {
        Self { client }
    }

    /// Get a reference to the client.
    pub fn client(&self) -> &MongoClient {
        &self.client
    }
}

impl DocumentStore for MongoStore {
    fn insert_one<'a>(
        &'a self,
        collection: &'a str,
        document: Document,
    ) -> BoxFuture<'a, QueryResult<Bson>> {
        Box::pin(async move {
            debug!(collection = %collection, "Executing insert_one");
            let result = self
                .client
                .collection(collection)
                .insert_one(document, None)
                .await?;
            Ok(result.inserted_id)
        })
    }

    fn insert_many<'a>(
        &'a self,
        collection: &'a str,
        documents: Vec<Document>,
    ) -> BoxFuture<'a, QueryResult<Vec<Bson>>> {
        Box::pin(async move {
            debug!(collection = %collection, count = documents.len(), "Executing insert_many");
            let result = self
                .client
                .collection(collection)
                .insert_many(documents, None)
                .await?;

            let mut ids: Vec<(usize, Bson)> = result.inserted_ids.into_iter().collect();
            ids.sort_by_key(|(index, _)| *index);
            Ok(ids.into_iter().map(|(_, id)| id).collect())
        })
    }

    fn find<'a>(
        &'a self,
        collection: &'a str,
        filter: Document,
        spec: FindSpec,
    ) -> BoxFuture<'a, QueryResult<Vec<Document>>> {
        Box::pin(async move {
            debug!(collection = %collection, "Executing find");
            quarry_debug!(collection = %collection, filter = %filter, spec = ?spec, "find");

            let mut options = FindOptions::default();
            options.projection = spec.projection;
            options.sort = spec.sort;
            options.skip = spec.skip;
            options.limit = spec.limit;

            let cursor = self
                .client
                .collection(collection)
                .find(filter, options)
                .await?;
            let documents: Vec<Document> = cursor.try_collect().await?;
            Ok(documents)
        })
    }

    fn find_one<'a>(
        &'a self,
        collection: &'a str,
        filter: Document,
        projection: Option<Document>,
    ) -> BoxFuture<'a, QueryResult<Option<Document>>> {
        Box::pin(async move {
            debug!(collection = %collection, "Executing find_one");
            quarry_debug!(collection = %collection, filter = %filter, "find_one");

            let mut options = FindOneOptions::default();
            options.projection = projection;

            Ok(self
                .client
                .collection(collection)
                .find_one(filter, options)
                .await?)
        })
    }

    fn count<'a>(
        &'a self,
        collection: &'a str,
        filter: Document,
        spec: CountSpec,
    ) -> BoxFuture<'a, QueryResult<u64>> {
        Box::pin(async move {
            debug!(collection = %collection, "Executing count");
            quarry_debug!(collection = %collection, filter = %filter, spec = ?spec, "count");

            let mut options = CountOptions::default();
            options.skip = spec.skip;
            options.collation = spec.collation;

            Ok(self
                .client
                .collection(collection)
                .count_documents(filter, options)
                .await?)
        })
    }

    fn update_one<'a>(
        &'a self,
        collection: &'a str,
        filter: Document,
        update: Document,
    ) -> BoxFuture<'a, QueryResult<UpdateOutcome>> {
        Box::pin(async move {
            debug!(collection = %collection, "Executing update_one");
            quarry_debug!(collection = %collection, filter = %filter, update = %update, "update_one");

            let result = self
                .client
                .collection(collection)
                .update_one(filter, update, None)
                .await?;
            Ok(UpdateOutcome {
                matched_count: result.matched_count,
                modified_count: result.modified_count,
            })
        })
    }

    fn delete_one<'a>(
        &'a self,
        collection: &'a str,
        filter: Document,
    ) -> BoxFuture<'a, QueryResult<u64>> {
        Box::pin(async move {
            debug!(collection = %collection, "Executing delete_one");
            quarry_debug!(collection = %collection, filter = %filter, "delete_one");

            let result = self
                .client
                .collection(collection)
                .delete_one(filter, None)
                .await?;
            Ok(result.deleted_count)
        })
    }

    fn delete_many<'a>(
        &'a self,
        collection: &'a str,
        filter: Document,
    ) -> BoxFuture<'a, QueryResult<u64>> {
        Box::pin(async move {
            debug!(collection = %collection, "Executing delete_many");
            quarry_debug!(collection = %collection, filter = %filter, "delete_many");

            let result = self
                .client
                .collection(collection)
                .delete_many(filter, None)
                .await?;
            Ok(result.deleted_count)
        })
    }

    fn aggregate<'a>(
        &'a self,
        collection: &'a str,
        pipeline: Vec<Document>,
    ) -> BoxFuture<'a, QueryResult<Vec<Document>>> {
        Box::pin(async move {
            debug!(collection = %collection, stages = pipeline.len(), "Executing aggregate");
            quarry_debug!(collection = %collection, pipeline = ?pipeline, "aggregate");

            let cursor = self
                .client
                .collection(collection)
                .aggregate(pipeline, None)
                .await?;
            let documents: Vec<Document> = cursor.try_collect().await?;
            Ok(documents)
        })
    }
}
