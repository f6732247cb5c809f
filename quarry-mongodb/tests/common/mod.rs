//! In-memory document store for engine tests.
//!
//! Evaluates the subset of MongoDB query and pipeline semantics the engine
//! emits: equality (with null matching missing fields and arrays matching any
//! element), `$eq $ne $in $gt $gte $lt $lte $exists $regex`, `$and`, `$or`,
//! `$expr` with `$regexMatch`, and the `$lookup $unwind $match $project $sort
//! $skip $limit $group` stages. A collation makes string comparison
//! case-insensitive.
//!
//! Not modeled: the diacritic half of the strength-2 collation (`"é"` and
//! `"e"` stay distinct here), and `$lookup` with `let`/`pipeline`, which only
//! joins on `localField`/`foreignField`.

#![allow(dead_code)]

use std::cmp::Ordering;
use std::collections::HashMap;
use std::io;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};

use bson::{Bson, Document, doc, oid::ObjectId};
use quarry_mongodb::error::{QueryError, QueryResult};
use quarry_mongodb::store::{BoxFuture, CountSpec, DocumentStore, FindSpec, UpdateOutcome};
use quarry_mongodb::{EntityRegistry, QueryEngine};

type Collections = HashMap<String, Vec<Document>>;

/// A store keeping every collection in memory.
#[derive(Default)]
pub struct InMemoryStore {
    collections: Mutex<Collections>,
    pipelines: Mutex<Vec<Vec<Document>>>,
    failing: AtomicBool,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a collection.
    pub fn seed(&self, collection: &str, documents: Vec<Document>) {
        let mut collections = self.collections.lock().unwrap();
        let target = collections.entry(collection.to_string()).or_default();
        for mut document in documents {
            if !document.contains_key("_id") {
                document.insert("_id", ObjectId::new());
            }
            target.push(document);
        }
    }

    /// Every stored document of a collection, soft-deleted ones included.
    pub fn all(&self, collection: &str) -> Vec<Document> {
        self.collections
            .lock()
            .unwrap()
            .get(collection)
            .cloned()
            .unwrap_or_default()
    }

    /// Pipelines received by `aggregate`, in order.
    pub fn pipelines(&self) -> Vec<Vec<Document>> {
        self.pipelines.lock().unwrap().clone()
    }

    /// Make every subsequent call fail.
    pub fn fail(&self) {
        self.failing.store(true, AtomicOrdering::SeqCst);
    }

    fn check(&self) -> QueryResult<()> {
        if self.failing.load(AtomicOrdering::SeqCst) {
            Err(QueryError::store(io::Error::new(
                io::ErrorKind::ConnectionRefused,
                "store unavailable",
            )))
        } else {
            Ok(())
        }
    }
}

impl DocumentStore for InMemoryStore {
    fn insert_one<'a>(
        &'a self,
        collection: &'a str,
        mut document: Document,
    ) -> BoxFuture<'a, QueryResult<Bson>> {
        Box::pin(async move {
            self.check()?;
            if !document.contains_key("_id") {
                document.insert("_id", ObjectId::new());
            }
            let id = document.get("_id").cloned().unwrap_or(Bson::Null);
            self.collections
                .lock()
                .unwrap()
                .entry(collection.to_string())
                .or_default()
                .push(document);
            Ok(id)
        })
    }

    fn insert_many<'a>(
        &'a self,
        collection: &'a str,
        documents: Vec<Document>,
    ) -> BoxFuture<'a, QueryResult<Vec<Bson>>> {
        Box::pin(async move {
            let mut ids = Vec::with_capacity(documents.len());
            for document in documents {
                ids.push(self.insert_one(collection, document).await?);
            }
            Ok(ids)
        })
    }

    fn find<'a>(
        &'a self,
        collection: &'a str,
        filter: Document,
        spec: FindSpec,
    ) -> BoxFuture<'a, QueryResult<Vec<Document>>> {
        Box::pin(async move {
            self.check()?;
            let mut documents: Vec<Document> = self
                .all(collection)
                .into_iter()
                .filter(|d| matches(d, &filter, false))
                .collect();
            if let Some(sort) = &spec.sort {
                sort_documents(&mut documents, sort);
            }
            let skip = spec.skip.unwrap_or(0) as usize;
            let limit = spec.limit.map(|l| l as usize).unwrap_or(usize::MAX);
            Ok(documents
                .into_iter()
                .skip(skip)
                .take(limit)
                .map(|d| project(d, spec.projection.as_ref()))
                .collect())
        })
    }

    fn find_one<'a>(
        &'a self,
        collection: &'a str,
        filter: Document,
        projection: Option<Document>,
    ) -> BoxFuture<'a, QueryResult<Option<Document>>> {
        Box::pin(async move {
            self.check()?;
            Ok(self
                .all(collection)
                .into_iter()
                .find(|d| matches(d, &filter, false))
                .map(|d| project(d, projection.as_ref())))
        })
    }

    fn count<'a>(
        &'a self,
        collection: &'a str,
        filter: Document,
        spec: CountSpec,
    ) -> BoxFuture<'a, QueryResult<u64>> {
        Box::pin(async move {
            self.check()?;
            let case_insensitive = spec.collation.is_some();
            let matched = self
                .all(collection)
                .iter()
                .filter(|d| matches(d, &filter, case_insensitive))
                .count() as u64;
            Ok(matched.saturating_sub(spec.skip.unwrap_or(0)))
        })
    }

    fn update_one<'a>(
        &'a self,
        collection: &'a str,
        filter: Document,
        update: Document,
    ) -> BoxFuture<'a, QueryResult<UpdateOutcome>> {
        Box::pin(async move {
            self.check()?;
            let mut collections = self.collections.lock().unwrap();
            let Some(target) = collections
                .get_mut(collection)
                .and_then(|docs| docs.iter_mut().find(|d| matches(d, &filter, false)))
            else {
                return Ok(UpdateOutcome::default());
            };

            let before = target.clone();
            apply_update(target, &update);
            Ok(UpdateOutcome {
                matched_count: 1,
                modified_count: u64::from(*target != before),
            })
        })
    }

    fn delete_one<'a>(
        &'a self,
        collection: &'a str,
        filter: Document,
    ) -> BoxFuture<'a, QueryResult<u64>> {
        Box::pin(async move {
            self.check()?;
            let mut collections = self.collections.lock().unwrap();
            let Some(documents) = collections.get_mut(collection) else {
                return Ok(0);
            };
            match documents.iter().position(|d| matches(d, &filter, false)) {
                Some(index) => {
                    documents.remove(index);
                    Ok(1)
                }
                None => Ok(0),
            }
        })
    }

    fn delete_many<'a>(
        &'a self,
        collection: &'a str,
        filter: Document,
    ) -> BoxFuture<'a, QueryResult<u64>> {
        Box::pin(async move {
            self.check()?;
            let mut collections = self.collections.lock().unwrap();
            let Some(documents) = collections.get_mut(collection) else {
                return Ok(0);
            };
            let before = documents.len();
            documents.retain(|d| !matches(d, &filter, false));
            Ok((before - documents.len()) as u64)
        })
    }

    fn aggregate<'a>(
        &'a self,
        collection: &'a str,
        pipeline: Vec<Document>,
    ) -> BoxFuture<'a, QueryResult<Vec<Document>>> {
        Box::pin(async move {
            self.check()?;
            self.pipelines.lock().unwrap().push(pipeline.clone());
            let collections = self.collections.lock().unwrap().clone();
            let source = collections.get(collection).cloned().unwrap_or_default();
            Ok(run_pipeline(&collections, source, &pipeline))
        })
    }
}

/// Build an engine over a fresh in-memory store.
pub fn engine(registry: EntityRegistry) -> QueryEngine<InMemoryStore> {
    QueryEngine::new(InMemoryStore::new(), std::sync::Arc::new(registry))
}

/// Registry used across the integration tests.
pub fn registry() -> EntityRegistry {
    EntityRegistry::builder()
        .register_with("Template", |h| {
            h.collection("templates").relation("createdBy", "Admin")
        })
        .register_with("Post", |h| h.timestamps(true).relation("authors", "Admin"))
        .register_with("Admin", |h| h.collection("admins").relation("role", "Role"))
        .register("Role")
        .build()
        .expect("valid registry")
}

fn run_pipeline(collections: &Collections, mut documents: Vec<Document>, pipeline: &[Document]) -> Vec<Document> {
    for stage in pipeline {
        let Some((name, spec)) = stage.iter().next() else {
            continue;
        };
        documents = match (name.as_str(), spec) {
            ("$match", Bson::Document(filter)) => documents
                .into_iter()
                .filter(|d| matches(d, filter, false))
                .collect(),
            ("$lookup", Bson::Document(lookup)) => {
                let from = lookup.get_str("from").unwrap_or_default();
                let local = lookup.get_str("localField").unwrap_or_default();
                let foreign = lookup.get_str("foreignField").unwrap_or_default();
                let as_field = lookup.get_str("as").unwrap_or_default();
                let foreign_docs = collections.get(from).cloned().unwrap_or_default();
                documents
                    .into_iter()
                    .map(|mut d| {
                        let key = get_path(&d, local).cloned().unwrap_or(Bson::Null);
                        let joined: Vec<Bson> = foreign_docs
                            .iter()
                            .filter(|f| equals_any(Some(&key), get_path(f, foreign).unwrap_or(&Bson::Null), false))
                            .cloned()
                            .map(Bson::Document)
                            .collect();
                        d.insert(as_field, joined);
                        d
                    })
                    .collect()
            }
            ("$unwind", Bson::String(path)) => {
                let field = path.trim_start_matches('$');
                documents
                    .into_iter()
                    .flat_map(|d| match d.get(field) {
                        Some(Bson::Array(items)) => items
                            .iter()
                            .map(|item| {
                                let mut copy = d.clone();
                                copy.insert(field, item.clone());
                                copy
                            })
                            .collect::<Vec<_>>(),
                        _ => Vec::new(),
                    })
                    .collect()
            }
            ("$project", Bson::Document(projection)) => documents
                .into_iter()
                .map(|d| project(d, Some(projection)))
                .collect(),
            ("$sort", Bson::Document(sort)) => {
                sort_documents(&mut documents, sort);
                documents
            }
            ("$skip", n) => documents.into_iter().skip(as_usize(n)).collect(),
            ("$limit", n) => documents.into_iter().take(as_usize(n)).collect(),
            ("$group", Bson::Document(_)) => {
                if documents.is_empty() {
                    Vec::new()
                } else {
                    vec![doc! { "_id": null, "count": documents.len() as i32 }]
                }
            }
            _ => documents,
        };
    }
    documents
}

fn as_usize(value: &Bson) -> usize {
    match value {
        Bson::Int32(n) => *n as usize,
        Bson::Int64(n) => *n as usize,
        _ => 0,
    }
}

/// Whether a document satisfies a filter.
pub fn matches(document: &Document, filter: &Document, case_insensitive: bool) -> bool {
    filter.iter().all(|(key, condition)| match key.as_str() {
        "$and" => sub_filters(condition)
            .iter()
            .all(|f| matches(document, f, case_insensitive)),
        "$or" => sub_filters(condition)
            .iter()
            .any(|f| matches(document, f, case_insensitive)),
        "$expr" => eval_expr(document, condition),
        field => field_matches(get_path(document, field), condition, case_insensitive),
    })
}

fn sub_filters(condition: &Bson) -> Vec<Document> {
    condition
        .as_array()
        .map(|items| items.iter().filter_map(|i| i.as_document().cloned()).collect())
        .unwrap_or_default()
}

fn get_path<'a>(document: &'a Document, path: &str) -> Option<&'a Bson> {
    let mut parts = path.split('.');
    let mut current = document.get(parts.next()?)?;
    for part in parts {
        current = current.as_document()?.get(part)?;
    }
    Some(current)
}

fn field_matches(value: Option<&Bson>, condition: &Bson, ci: bool) -> bool {
    if let Bson::Document(operators) = condition {
        if operators.keys().next().is_some_and(|k| k.starts_with('$')) {
            return operators
                .iter()
                .all(|(op, arg)| operator_matches(value, op, arg, operators, ci));
        }
    }
    equals_any(value, condition, ci)
}

fn operator_matches(value: Option<&Bson>, op: &str, arg: &Bson, all: &Document, ci: bool) -> bool {
    match op {
        "$eq" => equals_any(value, arg, ci),
        "$ne" => !equals_any(value, arg, ci),
        "$in" => arg
            .as_array()
            .is_some_and(|items| items.iter().any(|item| equals_any(value, item, ci))),
        "$gt" | "$gte" | "$lt" | "$lte" => value
            .and_then(|v| compare(v, arg, ci))
            .is_some_and(|ordering| match op {
                "$gt" => ordering == Ordering::Greater,
                "$gte" => ordering != Ordering::Less,
                "$lt" => ordering == Ordering::Less,
                _ => ordering != Ordering::Greater,
            }),
        "$exists" => value.is_some() == arg.as_bool().unwrap_or(true),
        "$regex" => {
            let options = all.get_str("$options").unwrap_or_default();
            let pattern = arg.as_str().unwrap_or_default();
            value
                .and_then(|v| v.as_str())
                .is_some_and(|text| regex_matches(pattern, options.contains('i'), text))
        }
        "$options" => true,
        _ => false,
    }
}

fn eval_expr(document: &Document, expression: &Bson) -> bool {
    let Some(regex_match) = expression
        .as_document()
        .and_then(|e| e.get_document("$regexMatch").ok())
    else {
        return false;
    };
    let input = regex_match
        .get_document("input")
        .ok()
        .and_then(|i| i.get_str("$toString").ok())
        .and_then(|path| get_path(document, path.trim_start_matches('$')));
    let pattern = regex_match.get_str("regex").unwrap_or_default();

    let text = match input {
        Some(Bson::String(s)) => s.clone(),
        Some(Bson::Int32(n)) => n.to_string(),
        Some(Bson::Int64(n)) => n.to_string(),
        Some(Bson::Double(n)) => n.to_string(),
        _ => return false,
    };
    regex_matches(pattern, false, &text)
}

fn regex_matches(pattern: &str, case_insensitive: bool, text: &str) -> bool {
    let pattern = if case_insensitive {
        format!("(?i){}", pattern)
    } else {
        pattern.to_string()
    };
    regex_lite::Regex::new(&pattern).is_ok_and(|re| re.is_match(text))
}

fn equals_any(value: Option<&Bson>, expected: &Bson, ci: bool) -> bool {
    match (value, expected) {
        (None | Some(Bson::Null), Bson::Null) => true,
        (None, _) => false,
        (Some(Bson::Array(items)), expected) if !matches!(expected, Bson::Array(_)) => {
            items.iter().any(|item| equal(item, expected, ci))
        }
        (Some(actual), expected) => equal(actual, expected, ci),
    }
}

fn equal(a: &Bson, b: &Bson, ci: bool) -> bool {
    compare(a, b, ci) == Some(Ordering::Equal) || a == b
}

fn as_f64(value: &Bson) -> Option<f64> {
    match value {
        Bson::Int32(n) => Some(f64::from(*n)),
        Bson::Int64(n) => Some(*n as f64),
        Bson::Double(n) => Some(*n),
        _ => None,
    }
}

fn compare(a: &Bson, b: &Bson, ci: bool) -> Option<Ordering> {
    if let (Some(x), Some(y)) = (as_f64(a), as_f64(b)) {
        return x.partial_cmp(&y);
    }
    match (a, b) {
        (Bson::String(x), Bson::String(y)) if ci => Some(x.to_lowercase().cmp(&y.to_lowercase())),
        (Bson::String(x), Bson::String(y)) => Some(x.cmp(y)),
        (Bson::DateTime(x), Bson::DateTime(y)) => Some(x.cmp(y)),
        (Bson::ObjectId(x), Bson::ObjectId(y)) => Some(x.bytes().cmp(&y.bytes())),
        (Bson::Boolean(x), Bson::Boolean(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

fn sort_documents(documents: &mut [Document], sort: &Document) {
    documents.sort_by(|a, b| {
        for (field, direction) in sort {
            let ordering = match (get_path(a, field), get_path(b, field)) {
                (Some(x), Some(y)) => compare(x, y, false).unwrap_or(Ordering::Equal),
                (None, Some(_)) => Ordering::Less,
                (Some(_), None) => Ordering::Greater,
                (None, None) => Ordering::Equal,
            };
            let ordering = if as_f64(direction).is_some_and(|d| d < 0.0) {
                ordering.reverse()
            } else {
                ordering
            };
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        Ordering::Equal
    });
}

fn is_truthy(value: &Bson) -> bool {
    match value {
        Bson::Boolean(b) => *b,
        other => as_f64(other).is_some_and(|n| n != 0.0),
    }
}

fn project(document: Document, projection: Option<&Document>) -> Document {
    let Some(projection) = projection.filter(|p| !p.is_empty()) else {
        return document;
    };
    let including = projection
        .iter()
        .any(|(field, value)| field != "_id" && is_truthy(value));

    if including {
        let keep_id = projection.get("_id").is_none_or(is_truthy);
        document
            .into_iter()
            .filter(|(field, _)| {
                (field == "_id" && keep_id)
                    || projection.get(field).is_some_and(is_truthy)
            })
            .collect()
    } else {
        document
            .into_iter()
            .filter(|(field, _)| projection.get(field).is_none_or(is_truthy))
            .collect()
    }
}

fn apply_update(document: &mut Document, update: &Document) {
    for (operator, fields) in update {
        let Some(fields) = fields.as_document() else {
            continue;
        };
        for (field, value) in fields {
            match operator.as_str() {
                "$set" => {
                    document.insert(field.clone(), value.clone());
                }
                "$unset" => {
                    document.remove(field);
                }
                "$inc" => {
                    let current = document.get(field).and_then(as_f64).unwrap_or(0.0);
                    let delta = as_f64(value).unwrap_or(0.0);
                    document.insert(field.clone(), current + delta);
                }
                _ => {}
            }
        }
    }
}
