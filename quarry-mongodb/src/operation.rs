//! The closed set of dispatchable operations and their typed payloads.
//!
//! Callers that hold a typed payload build a [`QuerySpec`] directly. Callers
//! that receive an operation name and a loosely-shaped payload go through
//! [`QuerySpec::from_request`], which is the only place an unknown operation
//! name can surface.

use std::fmt;
use std::str::FromStr;

use bson::{Bson, Document, doc, oid::ObjectId};
use serde::{Deserialize, Serialize};
use serde::de::DeserializeOwned;

use crate::error::{QueryError, QueryResult};
use crate::pipeline::DEFAULT_PAGE_SIZE;
use crate::populate::PopulateOption;

/// Operation names accepted by the dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationKind {
    /// Insert one record.
    Create,
    /// Paged listing.
    Read,
    /// Unpaged listing.
    ReadAll,
    /// Update one record.
    Update,
    /// Delete one record.
    Delete,
    /// Set status and updater by id.
    UpdateStatus,
    /// Find every matching record.
    Find,
    /// Find the first matching record.
    FindOne,
    /// Find by identifier.
    FindById,
    /// Insert many records.
    InsertMany,
    /// Delete every matching record.
    DeleteMany,
}

impl OperationKind {
    /// Every operation, in declaration order.
    pub const ALL: [OperationKind; 11] = [
        Self::Create,
        Self::Read,
        Self::ReadAll,
        Self::Update,
        Self::Delete,
        Self::UpdateStatus,
        Self::Find,
        Self::FindOne,
        Self::FindById,
        Self::InsertMany,
        Self::DeleteMany,
    ];

    /// Wire name of the operation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Read => "read",
            Self::ReadAll => "readAll",
            Self::Update => "update",
            Self::Delete => "delete",
            Self::UpdateStatus => "updateStatus",
            Self::Find => "find",
            Self::FindOne => "findOne",
            Self::FindById => "findById",
            Self::InsertMany => "insertMany",
            Self::DeleteMany => "deleteMany",
        }
    }

    /// Whether the operation writes.
    pub fn is_mutation(&self) -> bool {
        matches!(
            self,
            Self::Create
                | Self::Update
                | Self::Delete
                | Self::UpdateStatus
                | Self::InsertMany
                | Self::DeleteMany
        )
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OperationKind {
    type Err = QueryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| QueryError::unsupported_operation(s))
    }
}

fn default_page() -> u64 {
    1
}

fn default_limit() -> u64 {
    DEFAULT_PAGE_SIZE
}

/// Payload of `read`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadQuery {
    /// 1-based page number.
    #[serde(default = "default_page")]
    pub page: u64,
    /// Page size.
    #[serde(default = "default_limit")]
    pub limit: u64,
    /// Projection.
    #[serde(default)]
    pub select_fields: Option<Document>,
    /// Relations to expand.
    #[serde(default)]
    pub populate: Vec<PopulateOption>,
    /// Sort keys as `field:asc` or `field:desc`.
    #[serde(default)]
    pub sort_by: Vec<String>,
    /// Filter.
    #[serde(default)]
    pub query: Option<Document>,
}

impl Default for ReadQuery {
    fn default() -> Self {
        Self {
            page: default_page(),
            limit: default_limit(),
            select_fields: None,
            populate: Vec::new(),
            sort_by: Vec::new(),
            query: None,
        }
    }
}

impl ReadQuery {
    /// Number of records before this page.
    pub fn offset(&self) -> u64 {
        self.page.saturating_sub(1).saturating_mul(self.limit)
    }

    /// Reject windows that cannot be paged.
    pub fn validate(&self) -> QueryResult<()> {
        if self.limit == 0 {
            return Err(QueryError::invalid_payload("read", "limit must be positive"));
        }
        if self.page == 0 {
            return Err(QueryError::invalid_payload("read", "page numbers start at 1"));
        }
        Ok(())
    }
}

/// Payload of `readAll`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ListQuery {
    /// Projection.
    pub select_fields: Option<Document>,
    /// Relations to expand.
    pub populate: Vec<PopulateOption>,
    /// Sort keys as `field:asc` or `field:desc`.
    pub sort_by: Vec<String>,
    /// Filter.
    pub query: Option<Document>,
}

/// Payload of `update`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UpdateQuery {
    /// Filter selecting the record.
    #[serde(default)]
    pub query: Document,
    /// Update document; plain field maps are applied with `$set`.
    pub update: Document,
}

/// Identifier part of an `updateStatus` payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusTarget {
    /// Record identifier.
    pub id: ObjectId,
}

/// Change part of an `updateStatus` payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusChange {
    /// New status value.
    pub status: Bson,
    /// Who made the change.
    #[serde(default)]
    pub updated_by: Option<Bson>,
}

/// Payload of `updateStatus`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusUpdate {
    /// Which record.
    pub query: StatusTarget,
    /// What to set.
    pub update: StatusChange,
}

impl StatusUpdate {
    /// Build a status update.
    pub fn new(id: ObjectId, status: impl Into<Bson>, updated_by: Option<Bson>) -> Self {
        Self {
            query: StatusTarget { id },
            update: StatusChange {
                status: status.into(),
                updated_by,
            },
        }
    }
}

/// Payload of `findOne`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FindOneQuery {
    /// Filter.
    pub query: Document,
    /// Projection.
    pub select_fields: Option<Document>,
}

/// Payload of `deleteMany`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeleteManyQuery {
    /// Filter.
    pub query: Document,
}

/// An operation with its typed payload.
#[derive(Debug, Clone, PartialEq)]
pub enum QuerySpec {
    /// Insert one record.
    Create(Document),
    /// Paged listing.
    Read(ReadQuery),
    /// Unpaged listing.
    ReadAll(ListQuery),
    /// Update one alive record.
    Update(UpdateQuery),
    /// Delete one alive record matching the filter.
    Delete(Document),
    /// Set status and updater of one alive record.
    UpdateStatus(StatusUpdate),
    /// Find every alive record matching the filter.
    Find(Document),
    /// Find the first alive record matching the filter.
    FindOne(FindOneQuery),
    /// Find an alive record by identifier.
    FindById(ObjectId),
    /// Insert many records.
    InsertMany(Vec<Document>),
    /// Delete every alive record matching the filter.
    DeleteMany(DeleteManyQuery),
}

impl QuerySpec {
    /// The operation this spec performs.
    pub fn kind(&self) -> OperationKind {
        match self {
            Self::Create(_) => OperationKind::Create,
            Self::Read(_) => OperationKind::Read,
            Self::ReadAll(_) => OperationKind::ReadAll,
            Self::Update(_) => OperationKind::Update,
            Self::Delete(_) => OperationKind::Delete,
            Self::UpdateStatus(_) => OperationKind::UpdateStatus,
            Self::Find(_) => OperationKind::Find,
            Self::FindOne(_) => OperationKind::FindOne,
            Self::FindById(_) => OperationKind::FindById,
            Self::InsertMany(_) => OperationKind::InsertMany,
            Self::DeleteMany(_) => OperationKind::DeleteMany,
        }
    }

    /// Build a spec from an operation name and a loosely-shaped payload.
    ///
    /// Unknown names fail with [`QueryError::UnsupportedOperation`]; payloads
    /// that do not fit the operation fail with [`QueryError::InvalidPayload`].
    /// A null payload counts as an empty document where one is accepted.
    pub fn from_request(operation: &str, payload: Bson) -> QueryResult<Self> {
        let kind: OperationKind = operation.parse()?;

        Ok(match kind {
            OperationKind::Create => Self::Create(document(kind, payload)?),
            OperationKind::Read => Self::Read(typed(kind, payload)?),
            OperationKind::ReadAll => Self::ReadAll(typed(kind, payload)?),
            OperationKind::Update => Self::Update(typed(kind, payload)?),
            OperationKind::Delete => Self::Delete(document(kind, payload)?),
            OperationKind::UpdateStatus => Self::UpdateStatus(StatusUpdate {
                query: StatusTarget {
                    id: object_id(kind, nested(&payload, "query", "id"))?,
                },
                update: typed(kind, nested_value(&payload, "update"))?,
            }),
            OperationKind::Find => Self::Find(document(kind, payload)?),
            OperationKind::FindOne => Self::FindOne(typed(kind, payload)?),
            OperationKind::FindById => {
                let id = match &payload {
                    Bson::Document(d) => d.get("id").or_else(|| d.get("_id")),
                    other => Some(other),
                };
                Self::FindById(object_id(kind, id)?)
            }
            OperationKind::InsertMany => match payload {
                Bson::Array(items) => Self::InsertMany(
                    items
                        .into_iter()
                        .map(|item| document(kind, item))
                        .collect::<QueryResult<_>>()?,
                ),
                other => return Err(shape_error(kind, "an array of documents", &other)),
            },
            OperationKind::DeleteMany => Self::DeleteMany(typed(kind, payload)?),
        })
    }
}

/// Convert `field:asc|desc` sort keys into a sort document.
///
/// A missing order sorts ascending; `desc`, `descending` and `-1` sort
/// descending. Empty field names are ignored.
pub fn parse_sort(sort_by: &[String]) -> Document {
    let mut sort = Document::new();
    for entry in sort_by {
        let (field, order) = entry.split_once(':').unwrap_or((entry.as_str(), "asc"));
        let field = field.trim();
        if field.is_empty() {
            continue;
        }
        let direction = match order.trim().to_ascii_lowercase().as_str() {
            "desc" | "descending" | "-1" => -1,
            _ => 1,
        };
        sort.insert(field, direction);
    }
    sort
}

fn document(kind: OperationKind, payload: Bson) -> QueryResult<Document> {
    match payload {
        Bson::Document(d) => Ok(d),
        Bson::Null => Ok(doc! {}),
        other => Err(shape_error(kind, "a document", &other)),
    }
}

fn typed<T: DeserializeOwned>(kind: OperationKind, payload: Bson) -> QueryResult<T> {
    let payload = match payload {
        Bson::Null => Bson::Document(doc! {}),
        other => other,
    };
    bson::from_bson(payload)
        .map_err(|e| QueryError::invalid_payload(kind.as_str(), e.to_string()))
}

fn object_id(kind: OperationKind, value: Option<&Bson>) -> QueryResult<ObjectId> {
    match value {
        Some(Bson::ObjectId(id)) => Ok(*id),
        Some(Bson::String(hex)) => ObjectId::parse_str(hex.trim()).map_err(|_| {
            QueryError::invalid_payload(kind.as_str(), format!("`{}` is not an object id", hex))
        }),
        Some(other) => Err(shape_error(kind, "an object id", other)),
        None => Err(QueryError::invalid_payload(kind.as_str(), "missing id")),
    }
}

fn nested<'a>(payload: &'a Bson, outer: &str, inner: &str) -> Option<&'a Bson> {
    payload
        .as_document()?
        .get_document(outer)
        .ok()?
        .get(inner)
}

fn nested_value(payload: &Bson, key: &str) -> Bson {
    payload
        .as_document()
        .and_then(|d| d.get(key))
        .cloned()
        .unwrap_or(Bson::Null)
}

fn shape_error(kind: OperationKind, expected: &str, got: &Bson) -> QueryError {
    QueryError::invalid_payload(
        kind.as_str(),
        format!("expected {}, got {:?}", expected, got.element_type()),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_operation_names_round_trip() {
        for kind in OperationKind::ALL {
            assert_eq!(kind.as_str().parse::<OperationKind>().unwrap(), kind);
        }
    }

    #[test]
    fn test_unknown_operation() {
        let err = "upsert".parse::<OperationKind>().unwrap_err();
        assert!(err.is_unsupported_operation());

        let err = QuerySpec::from_request("aggregate", Bson::Null).unwrap_err();
        assert!(err.is_unsupported_operation());
    }

    #[test]
    fn test_read_defaults() {
        let spec = QuerySpec::from_request("read", Bson::Null).unwrap();
        let QuerySpec::Read(read) = spec else {
            panic!("expected read");
        };
        assert_eq!(read, ReadQuery::default());
        assert_eq!(read.page, 1);
        assert_eq!(read.limit, 10);
        assert_eq!(read.offset(), 0);
    }

    #[test]
    fn test_read_payload() {
        let payload = Bson::Document(doc! {
            "page": 3,
            "limit": 5,
            "selectFields": { "title": 1 },
            "populate": [{ "path": "createdBy", "select": "name" }],
            "sortBy": ["title:desc"],
            "query": { "status": 1 },
        });

        let QuerySpec::Read(read) = QuerySpec::from_request("read", payload).unwrap() else {
            panic!("expected read");
        };
        assert_eq!(read.offset(), 10);
        assert_eq!(read.populate[0].path, "createdBy");
        assert_eq!(read.query, Some(doc! { "status": 1 }));
    }

    #[test]
    fn test_read_validate() {
        let read = ReadQuery {
            limit: 0,
            ..ReadQuery::default()
        };
        assert!(read.validate().unwrap_err().is_invalid_payload());
    }

    #[test]
    fn test_update_status_accepts_hex_id() {
        let id = ObjectId::new();
        let payload = Bson::Document(doc! {
            "query": { "id": id.to_hex() },
            "update": { "status": 0, "updatedBy": "admin-1" },
        });

        let spec = QuerySpec::from_request("updateStatus", payload).unwrap();
        assert_eq!(
            spec,
            QuerySpec::UpdateStatus(StatusUpdate::new(id, 0, Some(Bson::String("admin-1".into()))))
        );
    }

    #[test]
    fn test_find_by_id_shapes() {
        let id = ObjectId::new();
        for payload in [
            Bson::ObjectId(id),
            Bson::String(id.to_hex()),
            Bson::Document(doc! { "id": id.to_hex() }),
        ] {
            assert_eq!(
                QuerySpec::from_request("findById", payload).unwrap(),
                QuerySpec::FindById(id)
            );
        }

        let err = QuerySpec::from_request("findById", Bson::String("nope".into())).unwrap_err();
        assert!(err.is_invalid_payload());
    }

    #[test]
    fn test_insert_many_requires_array() {
        let spec = QuerySpec::from_request(
            "insertMany",
            Bson::Array(vec![doc! { "a": 1 }.into(), doc! { "a": 2 }.into()]),
        )
        .unwrap();
        assert_eq!(spec.kind(), OperationKind::InsertMany);

        let err = QuerySpec::from_request("insertMany", Bson::Document(doc! {})).unwrap_err();
        assert!(err.is_invalid_payload());
    }

    #[test]
    fn test_parse_sort() {
        let sort = parse_sort(&[
            "title:asc".to_string(),
            "createdAt:desc".to_string(),
            "name".to_string(),
            ":desc".to_string(),
        ]);
        assert_eq!(sort, doc! { "title": 1, "createdAt": -1, "name": 1 });
    }

    #[test]
    fn test_mutations() {
        assert!(OperationKind::UpdateStatus.is_mutation());
        assert!(!OperationKind::FindById.is_mutation());
    }
}
