//! Filter document building and soft-delete scoping.
//!
//! Records are never physically hidden; a record is alive while its
//! `deletedAt` field is unset or null. Every read and every non-insert write
//! goes through [`alive`] (or [`FilterBuilder::alive`]) so the predicate is
//! applied in exactly one way.

use bson::{Bson, Document, doc, oid::ObjectId};

/// Soft-delete timestamp field.
pub const SOFT_DELETE_FIELD: &str = "deletedAt";

/// Canonical identifier field.
pub const ID_FIELD: &str = "_id";

/// Scope a filter to alive records.
///
/// Any `deletedAt` condition already in the filter is replaced, so callers
/// cannot widen a query to soft-deleted records.
pub fn alive(mut filter: Document) -> Document {
    filter.insert(SOFT_DELETE_FIELD, Bson::Null);
    filter
}

/// Create an `_id` filter.
pub fn by_id(id: ObjectId) -> Document {
    doc! { ID_FIELD: id }
}

/// Builder for MongoDB filter documents.
///
/// ```rust
/// use quarry_mongodb::FilterBuilder;
///
/// let filter = FilterBuilder::new()
///     .eq("status", 1)
///     .between("age", 18, 65)
///     .alive()
///     .build();
///
/// assert!(filter.get("deletedAt").unwrap().as_null().is_some());
/// ```
#[derive(Debug, Clone, Default)]
pub struct FilterBuilder {
    doc: Document,
}

impl FilterBuilder {
    /// Create a new empty filter builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a filter builder from an existing document.
    pub fn from_doc(doc: Document) -> Self {
        Self { doc }
    }

    /// Add an equality condition.
    pub fn eq(mut self, field: &str, value: impl Into<Bson>) -> Self {
        self.doc.insert(field, value.into());
        self
    }

    /// Add a not-equal condition.
    pub fn ne(mut self, field: &str, value: impl Into<Bson>) -> Self {
        self.doc.insert(field, doc! { "$ne": value.into() });
        self
    }

    /// Add an inclusive range condition.
    pub fn between(mut self, field: &str, min: impl Into<Bson>, max: impl Into<Bson>) -> Self {
        self.doc
            .insert(field, doc! { "$gte": min.into(), "$lte": max.into() });
        self
    }

    /// Add a regex condition with options.
    pub fn regex_with_options(mut self, field: &str, pattern: &str, options: &str) -> Self {
        self.doc
            .insert(field, doc! { "$regex": pattern, "$options": options });
        self
    }

    /// Add an aggregation expression condition (`$expr`).
    pub fn expr(mut self, expression: Document) -> Self {
        self.doc.insert("$expr", expression);
        self
    }

    /// Combine with OR ($or).
    pub fn or(mut self, conditions: Vec<Document>) -> Self {
        self.doc.insert("$or", conditions);
        self
    }

    /// Combine with AND ($and).
    pub fn and(mut self, conditions: Vec<Document>) -> Self {
        self.doc.insert("$and", conditions);
        self
    }

    /// Merge another filter into this one; keys in `other` win.
    pub fn merge(mut self, other: Document) -> Self {
        for (k, v) in other {
            self.doc.insert(k, v);
        }
        self
    }

    /// Restrict to alive records.
    pub fn alive(mut self) -> Self {
        self.doc.insert(SOFT_DELETE_FIELD, Bson::Null);
        self
    }

    /// Build the filter document.
    pub fn build(self) -> Document {
        self.doc
    }

    /// Check if the filter is empty.
    pub fn is_empty(&self) -> bool {
        self.doc.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_alive_adds_null_predicate() {
        let filter = alive(doc! { "status": 1 });
        assert_eq!(filter, doc! { "status": 1, "deletedAt": null });
    }

    #[test]
    fn test_alive_overrides_caller_deleted_at() {
        let filter = alive(doc! { "deletedAt": { "$ne": null } });
        assert_eq!(filter, doc! { "deletedAt": null });
    }

    #[test]
    fn test_filter_builder_merge_later_wins() {
        let filter = FilterBuilder::new()
            .eq("email", "a@b.c")
            .merge(doc! { "email": "x@y.z", "role": "admin" })
            .build();

        assert_eq!(filter, doc! { "email": "x@y.z", "role": "admin" });
    }

    #[test]
    fn test_filter_builder_between() {
        let filter = FilterBuilder::new().between("age", 18, 65).build();
        assert_eq!(filter, doc! { "age": { "$gte": 18, "$lte": 65 } });
    }

    #[test]
    fn test_filter_builder_or() {
        let filter = FilterBuilder::new()
            .or(vec![doc! { "status": 1 }, doc! { "isAutomatic": 1 }])
            .build();

        assert!(filter.contains_key("$or"));
    }

    #[test]
    fn test_by_id_helper() {
        let oid = ObjectId::new();
        let filter = by_id(oid);
        assert_eq!(filter.get_object_id("_id").unwrap(), oid);
    }
}
