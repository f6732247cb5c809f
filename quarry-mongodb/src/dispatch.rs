//! The query engine: operation dispatch, paged aggregation and existence
//! checks over any [`DocumentStore`].

use std::sync::Arc;

use bson::{Bson, Document, doc, oid::ObjectId};
use tracing::debug;

use crate::error::QueryResult;
use crate::exists::ExistsQuery;
use crate::filter::{self, ID_FIELD, SOFT_DELETE_FIELD};
use crate::operation::{
    DeleteManyQuery, FindOneQuery, ListQuery, QuerySpec, ReadQuery, StatusUpdate, UpdateQuery,
    parse_sort,
};
use crate::pagination::{ListResult, Pagination};
use crate::pipeline::{AggregateQuery, count_from_group};
use crate::populate::populate;
use crate::registry::{CollectionHandle, EntityRegistry};
use crate::store::{CountSpec, DocumentStore, FindSpec, UpdateOutcome};

/// Creation timestamp field.
pub const CREATED_AT_FIELD: &str = "createdAt";

/// Modification timestamp field.
pub const UPDATED_AT_FIELD: &str = "updatedAt";

/// Field recording who soft-deleted a record.
pub const DELETED_BY_FIELD: &str = "deletedBy";

/// Version key excluded from `findById` results.
pub const VERSION_FIELD: &str = "__v";

/// Result of a dispatched operation.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryOutcome {
    /// A record was inserted.
    Inserted {
        /// Identifier of the new record.
        id: Bson,
        /// The stored record.
        document: Document,
    },
    /// Several records were inserted.
    InsertedMany {
        /// Identifiers, in input order.
        ids: Vec<Bson>,
        /// The stored records.
        documents: Vec<Document>,
    },
    /// A listing with pagination metadata.
    List(ListResult),
    /// An update ran.
    Updated(UpdateOutcome),
    /// A delete ran.
    Deleted {
        /// Number of records removed.
        deleted_count: u64,
    },
    /// Plain documents.
    Documents(Vec<Document>),
    /// At most one document.
    Document(Option<Document>),
}

impl QueryOutcome {
    /// The listing, if this outcome is one.
    pub fn into_list(self) -> Option<ListResult> {
        match self {
            Self::List(list) => Some(list),
            _ => None,
        }
    }

    /// The documents of a listing or a plain find.
    pub fn into_documents(self) -> Option<Vec<Document>> {
        match self {
            Self::List(list) => Some(list.result),
            Self::Documents(documents) => Some(documents),
            Self::InsertedMany { documents, .. } => Some(documents),
            _ => None,
        }
    }

    /// The single document of a lookup or insert.
    pub fn into_document(self) -> Option<Document> {
        match self {
            Self::Document(document) => document,
            Self::Inserted { document, .. } => Some(document),
            _ => None,
        }
    }

    /// Counts of an update.
    pub fn update_outcome(&self) -> Option<UpdateOutcome> {
        match self {
            Self::Updated(outcome) => Some(*outcome),
            _ => None,
        }
    }

    /// Number of deleted records.
    pub fn deleted_count(&self) -> Option<u64> {
        match self {
            Self::Deleted { deleted_count } => Some(*deleted_count),
            _ => None,
        }
    }
}

/// Runs operations against the collections of an [`EntityRegistry`].
///
/// The engine holds no mutable state; clone it or share it freely.
#[derive(Clone)]
pub struct QueryEngine<S> {
    store: S,
    registry: Arc<EntityRegistry>,
}

impl<S: DocumentStore> QueryEngine<S> {
    /// Create an engine over a store and a registry.
    pub fn new(store: S, registry: Arc<EntityRegistry>) -> Self {
        Self { store, registry }
    }

    /// The underlying store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// The entity registry.
    pub fn registry(&self) -> &EntityRegistry {
        &self.registry
    }

    /// Run a named operation with a loosely-shaped payload.
    pub async fn execute(
        &self,
        entity: &str,
        operation: &str,
        payload: Bson,
    ) -> QueryResult<QueryOutcome> {
        let spec = QuerySpec::from_request(operation, payload)?;
        self.dispatch(entity, spec).await
    }

    /// Run an operation on an entity.
    pub async fn dispatch(&self, entity: &str, spec: QuerySpec) -> QueryResult<QueryOutcome> {
        let handle = self.registry.resolve(entity)?;
        debug!(
            entity = %entity,
            collection = %handle.collection(),
            operation = %spec.kind(),
            "Dispatching operation"
        );

        match spec {
            QuerySpec::Create(document) => self.create(handle, document).await,
            QuerySpec::Read(query) => self.read(handle, query).await.map(QueryOutcome::List),
            QuerySpec::ReadAll(query) => {
                self.read_all(handle, query).await.map(QueryOutcome::List)
            }
            QuerySpec::Update(query) => self.update(handle, query).await,
            QuerySpec::Delete(filter) => {
                let deleted_count = self
                    .store
                    .delete_one(handle.collection(), filter::alive(filter))
                    .await?;
                Ok(QueryOutcome::Deleted { deleted_count })
            }
            QuerySpec::UpdateStatus(status) => self.update_status(handle, status).await,
            QuerySpec::Find(filter) => {
                let documents = self
                    .store
                    .find(handle.collection(), filter::alive(filter), FindSpec::default())
                    .await?;
                Ok(QueryOutcome::Documents(documents))
            }
            QuerySpec::FindOne(FindOneQuery {
                query,
                select_fields,
            }) => {
                let document = self
                    .store
                    .find_one(
                        handle.collection(),
                        filter::alive(query),
                        select_fields.filter(|p| !p.is_empty()),
                    )
                    .await?;
                Ok(QueryOutcome::Document(document))
            }
            QuerySpec::FindById(id) => {
                let document = self
                    .store
                    .find_one(
                        handle.collection(),
                        filter::alive(filter::by_id(id)),
                        Some(doc! { VERSION_FIELD: 0 }),
                    )
                    .await?;
                Ok(QueryOutcome::Document(document))
            }
            QuerySpec::InsertMany(documents) => self.insert_many(handle, documents).await,
            QuerySpec::DeleteMany(DeleteManyQuery { query }) => {
                let deleted_count = self
                    .store
                    .delete_many(handle.collection(), filter::alive(query))
                    .await?;
                Ok(QueryOutcome::Deleted { deleted_count })
            }
        }
    }

    /// Run a paged listing through the aggregation pipeline.
    ///
    /// The count pass and the data pass are separate round trips.
    pub async fn aggregate(&self, entity: &str, query: &AggregateQuery) -> QueryResult<ListResult> {
        let handle = self.registry.resolve(entity)?;
        let plan = query.plan()?;
        debug!(
            entity = %entity,
            collection = %handle.collection(),
            lookups = query.lookups.len(),
            page = %plan.page,
            "Running aggregation"
        );

        let counted = self
            .store
            .aggregate(handle.collection(), plan.count)
            .await?;
        let total_count = count_from_group(&counted);

        let result = self.store.aggregate(handle.collection(), plan.data).await?;
        let pagination = Pagination::for_request(total_count, plan.page_size, plan.page)
            .zero_if_empty(result.is_empty());

        Ok(ListResult::new(result, pagination))
    }

    /// Whether any alive record matches the query.
    ///
    /// Strings compare case- and diacritic-insensitively.
    pub async fn exists(&self, entity: &str, query: &ExistsQuery) -> QueryResult<bool> {
        let handle = self.registry.resolve(entity)?;
        debug!(
            entity = %entity,
            collection = %handle.collection(),
            field = %query.field,
            "Checking existence"
        );

        let count = self
            .store
            .count(handle.collection(), query.filter(), query.count_spec())
            .await?;
        Ok(count > 0)
    }

    /// Mark an alive record as deleted.
    pub async fn soft_delete(
        &self,
        entity: &str,
        id: ObjectId,
        deleted_by: Option<Bson>,
    ) -> QueryResult<UpdateOutcome> {
        let handle = self.registry.resolve(entity)?;
        debug!(entity = %entity, id = %id, "Soft-deleting record");

        let mut set = doc! { SOFT_DELETE_FIELD: bson::DateTime::now() };
        if let Some(deleted_by) = deleted_by {
            set.insert(DELETED_BY_FIELD, deleted_by);
        }
        let update = stamp_update(handle, doc! { "$set": set });

        self.store
            .update_one(
                handle.collection(),
                filter::alive(filter::by_id(id)),
                update,
            )
            .await
    }

    async fn create(
        &self,
        handle: &CollectionHandle,
        document: Document,
    ) -> QueryResult<QueryOutcome> {
        let document = prepare_insert(handle, document, bson::DateTime::now());
        let id = self
            .store
            .insert_one(handle.collection(), document.clone())
            .await?;
        Ok(QueryOutcome::Inserted { id, document })
    }

    async fn insert_many(
        &self,
        handle: &CollectionHandle,
        documents: Vec<Document>,
    ) -> QueryResult<QueryOutcome> {
        let now = bson::DateTime::now();
        let documents: Vec<Document> = documents
            .into_iter()
            .map(|document| prepare_insert(handle, document, now))
            .collect();
        let ids = self
            .store
            .insert_many(handle.collection(), documents.clone())
            .await?;
        Ok(QueryOutcome::InsertedMany { ids, documents })
    }

    async fn read(&self, handle: &CollectionHandle, query: ReadQuery) -> QueryResult<ListResult> {
        query.validate()?;

        let offset = query.offset();
        let filter = filter::alive(query.query.unwrap_or_default());
        let spec = FindSpec::default()
            .projection(query.select_fields)
            .sort(Some(parse_sort(&query.sort_by)))
            .window(offset, i64::try_from(query.limit).unwrap_or(i64::MAX));
        let remaining_spec = CountSpec {
            skip: Some(offset.saturating_add(query.limit)),
            collation: None,
        };

        let (mut documents, total_count, remaining_count) = futures::try_join!(
            self.store.find(handle.collection(), filter.clone(), spec),
            self.store
                .count(handle.collection(), filter.clone(), CountSpec::default()),
            self.store.count(handle.collection(), filter, remaining_spec),
        )?;

        populate(
            &self.store,
            &self.registry,
            handle,
            &mut documents,
            &query.populate,
        )
        .await?;

        let pagination = Pagination {
            total_count,
            total_pages: Some(total_count.div_ceil(query.limit)),
            current_page: Some(query.page),
            remaining_count: Some(remaining_count),
        }
        .zero_if_empty(documents.is_empty());

        Ok(ListResult::new(documents, pagination))
    }

    async fn read_all(&self, handle: &CollectionHandle, query: ListQuery) -> QueryResult<ListResult> {
        let filter = filter::alive(query.query.unwrap_or_default());
        let spec = FindSpec::default()
            .projection(query.select_fields)
            .sort(Some(parse_sort(&query.sort_by)));

        let mut documents = self
            .store
            .find(handle.collection(), filter.clone(), spec)
            .await?;
        populate(
            &self.store,
            &self.registry,
            handle,
            &mut documents,
            &query.populate,
        )
        .await?;

        let total_count = self
            .store
            .count(handle.collection(), filter, CountSpec::default())
            .await?;

        Ok(ListResult::new(documents, Pagination::total(total_count)))
    }

    async fn update(&self, handle: &CollectionHandle, query: UpdateQuery) -> QueryResult<QueryOutcome> {
        let update = stamp_update(handle, normalize_update(query.update));
        let outcome = self
            .store
            .update_one(handle.collection(), filter::alive(query.query), update)
            .await?;
        Ok(QueryOutcome::Updated(outcome))
    }

    async fn update_status(
        &self,
        handle: &CollectionHandle,
        status: StatusUpdate,
    ) -> QueryResult<QueryOutcome> {
        let mut set = doc! { "status": status.update.status };
        if let Some(updated_by) = status.update.updated_by {
            set.insert("updatedBy", updated_by);
        }
        let update = stamp_update(handle, doc! { "$set": set });

        let outcome = self
            .store
            .update_one(
                handle.collection(),
                filter::alive(filter::by_id(status.query.id)),
                update,
            )
            .await?;
        Ok(QueryOutcome::Updated(outcome))
    }
}

/// Wrap a plain field map in `$set`; operator documents pass through.
pub fn normalize_update(update: Document) -> Document {
    if update.keys().any(|key| key.starts_with('$')) {
        update
    } else {
        doc! { "$set": update }
    }
}

/// Assign an id and, for timestamped entities, both timestamps.
fn prepare_insert(handle: &CollectionHandle, mut document: Document, now: bson::DateTime) -> Document {
    if !document.contains_key(ID_FIELD) {
        document.insert(ID_FIELD, ObjectId::new());
    }
    if handle.timestamps() {
        document.insert(CREATED_AT_FIELD, now);
        document.insert(UPDATED_AT_FIELD, now);
    }
    document
}

/// Add `updatedAt` to an operator update for timestamped entities.
fn stamp_update(handle: &CollectionHandle, mut update: Document) -> Document {
    if !handle.timestamps() {
        return update;
    }
    let now = bson::DateTime::now();
    match update.get_document_mut("$set") {
        Ok(set) => {
            set.insert(UPDATED_AT_FIELD, now);
        }
        Err(_) => {
            update.insert("$set", doc! { UPDATED_AT_FIELD: now });
        }
    }
    update
}
