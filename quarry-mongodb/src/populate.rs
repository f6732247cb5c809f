//! Relation expansion for `read` and `readAll`.
//!
//! A populate option names a relation path declared on the entity. The ids
//! stored at that path (a single id or an array of ids) are replaced by the
//! referenced alive documents of the target entity. Options may nest.

use std::collections::HashMap;

use bson::{Bson, Document, doc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{QueryError, QueryResult};
use crate::filter::{self, ID_FIELD};
use crate::registry::{CollectionHandle, EntityRegistry};
use crate::store::{BoxFuture, DocumentStore, FindSpec};

/// Fields to return from a populated relation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldSelection {
    /// Space-separated field names; a `-` prefix excludes the field.
    Fields(String),
    /// A projection document.
    Projection(Document),
}

impl FieldSelection {
    /// Convert into a projection document.
    pub fn to_projection(&self) -> Document {
        match self {
            Self::Fields(fields) => fields
                .split_whitespace()
                .map(|field| match field.strip_prefix('-') {
                    Some(excluded) => (excluded.to_string(), Bson::Int32(0)),
                    None => (field.trim_start_matches('+').to_string(), Bson::Int32(1)),
                })
                .filter(|(name, _)| !name.is_empty())
                .collect(),
            Self::Projection(projection) => projection.clone(),
        }
    }
}

/// One relation to expand.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PopulateOption {
    /// Relation path on the parent documents.
    pub path: String,
    /// Fields to return from the related documents.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub select: Option<FieldSelection>,
    /// Relations to expand on the related documents.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub populate: Vec<PopulateOption>,
}

impl PopulateOption {
    /// Expand a path with every field.
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            select: None,
            populate: Vec::new(),
        }
    }

    /// Restrict the returned fields.
    pub fn select(mut self, selection: impl Into<String>) -> Self {
        self.select = Some(FieldSelection::Fields(selection.into()));
        self
    }

    /// Expand a relation of the related documents.
    pub fn nested(mut self, option: PopulateOption) -> Self {
        self.populate.push(option);
        self
    }
}

/// Expand `options` on `documents` in place.
pub fn populate<'a, S>(
    store: &'a S,
    registry: &'a EntityRegistry,
    handle: &'a CollectionHandle,
    documents: &'a mut [Document],
    options: &'a [PopulateOption],
) -> BoxFuture<'a, QueryResult<()>>
where
    S: DocumentStore + ?Sized,
{
    Box::pin(async move {
        for option in options {
            let target = handle
                .relation(&option.path)
                .ok_or_else(|| QueryError::unknown_relation(handle.entity(), &option.path))?;
            let target = registry.resolve(target)?;

            let ids = referenced_ids(documents, &option.path);
            if ids.is_empty() {
                continue;
            }

            debug!(
                entity = %handle.entity(),
                path = %option.path,
                target = %target.entity(),
                ids = ids.len(),
                "Populating relation"
            );

            let spec = FindSpec::default()
                .projection(option.select.as_ref().map(FieldSelection::to_projection));
            let filter = filter::alive(doc! { ID_FIELD: { "$in": ids } });
            let mut related = store.find(target.collection(), filter, spec).await?;

            if !option.populate.is_empty() {
                populate(store, registry, target, &mut related, &option.populate).await?;
            }

            let by_id: HashMap<String, Document> = related
                .into_iter()
                .filter_map(|d| {
                    let key = d.get(ID_FIELD).map(id_key)?;
                    Some((key, d))
                })
                .collect();

            for document in documents.iter_mut() {
                let Some(value) = document.get(&option.path) else {
                    continue;
                };
                let replaced = match value {
                    Bson::Array(items) => Bson::Array(
                        items
                            .iter()
                            .filter_map(|id| by_id.get(&id_key(id)).cloned().map(Bson::Document))
                            .collect(),
                    ),
                    Bson::Null => Bson::Null,
                    id => by_id
                        .get(&id_key(id))
                        .cloned()
                        .map(Bson::Document)
                        .unwrap_or(Bson::Null),
                };
                document.insert(option.path.clone(), replaced);
            }
        }
        Ok(())
    })
}

fn referenced_ids(documents: &[Document], path: &str) -> Vec<Bson> {
    let mut seen = std::collections::HashSet::new();
    let mut ids = Vec::new();
    let mut push = |id: &Bson| {
        if !matches!(id, Bson::Null) && seen.insert(id_key(id)) {
            ids.push(id.clone());
        }
    };

    for document in documents {
        match document.get(path) {
            Some(Bson::Array(items)) => items.iter().for_each(&mut push),
            Some(id) => push(id),
            None => {}
        }
    }
    ids
}

fn id_key(id: &Bson) -> String {
    match id {
        Bson::ObjectId(oid) => oid.to_hex(),
        other => other.to_string(),
    }
}
