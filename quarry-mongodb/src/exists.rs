//! Existence checks for uniqueness validation.

use bson::{Bson, Document, doc, oid::ObjectId};

use crate::filter::{self, FilterBuilder, ID_FIELD};
use crate::store::{CountSpec, case_insensitive_collation};

/// Arguments of an existence check.
///
/// ```rust
/// use bson::{doc, oid::ObjectId};
/// use quarry_mongodb::ExistsQuery;
///
/// let id = ObjectId::new();
/// let query = ExistsQuery::new("email", " Foo@Bar.com ")
///     .excluding(id)
///     .with_conditions(doc! { "role": "admin" });
///
/// let filter = query.filter();
/// assert_eq!(filter.get_str("email").unwrap(), "Foo@Bar.com");
/// assert!(filter.get("deletedAt").unwrap().as_null().is_some());
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct ExistsQuery {
    /// Field to compare; `id` means `_id`.
    pub field: String,
    /// Value to look for. Strings are trimmed; hex ids on `_id` become ObjectIds.
    pub value: Bson,
    /// Record to ignore, usually the one being edited.
    pub exclude_id: Option<ObjectId>,
    /// Additional conditions; they override the field condition on conflict.
    pub extra_conditions: Document,
}

impl ExistsQuery {
    /// Check whether any alive record has `field == value`.
    pub fn new(field: impl Into<String>, value: impl Into<Bson>) -> Self {
        Self {
            field: field.into(),
            value: value.into(),
            exclude_id: None,
            extra_conditions: Document::new(),
        }
    }

    /// Ignore the record with this identifier.
    pub fn excluding(mut self, id: ObjectId) -> Self {
        self.exclude_id = Some(id);
        self
    }

    /// Add conditions.
    pub fn with_conditions(mut self, conditions: Document) -> Self {
        for (key, value) in conditions {
            self.extra_conditions.insert(key, value);
        }
        self
    }

    /// The count filter.
    pub fn filter(&self) -> Document {
        let field = if self.field == "id" {
            ID_FIELD
        } else {
            self.field.as_str()
        };
        let value = match &self.value {
            Bson::String(s) if field == ID_FIELD => match ObjectId::parse_str(s.trim()) {
                Ok(id) => Bson::ObjectId(id),
                Err(_) => Bson::String(s.trim().to_string()),
            },
            Bson::String(s) => Bson::String(s.trim().to_string()),
            other => other.clone(),
        };

        let mut builder = FilterBuilder::new()
            .eq(field, value)
            .merge(self.extra_conditions.clone());
        if let Some(id) = self.exclude_id {
            builder = builder.merge(doc! { ID_FIELD: { "$ne": id } });
        }

        filter::alive(builder.build())
    }

    /// Count options: case- and diacritic-insensitive comparison.
    pub fn count_spec(&self) -> CountSpec {
        CountSpec {
            skip: None,
            collation: Some(case_insensitive_collation()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_id_field_is_normalized() {
        let id = ObjectId::new();
        let filter = ExistsQuery::new("id", id).filter();
        assert_eq!(filter, doc! { "_id": id, "deletedAt": null });
    }

    #[test]
    fn test_hex_id_is_cast() {
        let id = ObjectId::new();
        let filter = ExistsQuery::new("id", format!(" {} ", id.to_hex())).filter();
        assert_eq!(filter, doc! { "_id": id, "deletedAt": null });

        let filter = ExistsQuery::new("_id", "not-an-id").filter();
        assert_eq!(filter, doc! { "_id": "not-an-id", "deletedAt": null });
    }

    #[test]
    fn test_hex_string_on_other_fields_stays_string() {
        let hex = ObjectId::new().to_hex();
        let filter = ExistsQuery::new("code", hex.as_str()).filter();
        assert_eq!(filter.get_str("code").unwrap(), hex);
    }

    #[test]
    fn test_extra_conditions_override() {
        let filter = ExistsQuery::new("title", "Welcome")
            .with_conditions(doc! { "title": "Other", "type": "email" })
            .filter();
        assert_eq!(filter, doc! { "title": "Other", "type": "email", "deletedAt": null });
    }

    #[test]
    fn test_exclusion_wins_over_extra_id_condition() {
        let id = ObjectId::new();
        let filter = ExistsQuery::new("title", "Welcome")
            .with_conditions(doc! { "_id": ObjectId::new() })
            .excluding(id)
            .filter();
        assert_eq!(filter.get_document("_id").unwrap(), &doc! { "$ne": id });
    }

    #[test]
    fn test_non_string_values_untouched() {
        let filter = ExistsQuery::new("code", 42).filter();
        assert_eq!(filter.get_i32("code").unwrap(), 42);
    }

    #[test]
    fn test_count_spec_uses_collation() {
        let spec = ExistsQuery::new("title", "x").count_spec();
        assert!(spec.collation.is_some());
        assert_eq!(spec.skip, None);
    }
}
