//! Aggregation pipeline building for paged list views.
//!
//! [`AggregateQuery`] describes a listing: relation lookups, a match
//! condition, projection, sort and the page window. [`AggregateQuery::plan`]
//! turns it into two pipelines without touching the store: the data pipeline
//! and a count pipeline sharing the same filtering prefix.
//!
//! Stage order is fixed: lookup (+unwind), match, project, sort, skip, limit.
//!
//! ```rust
//! use bson::doc;
//! use quarry_mongodb::{AggregateQuery, LookupConfig, PageRequest};
//!
//! let plan = AggregateQuery::new()
//!     .lookup(LookupConfig::new("users", "userId", "_id", "user"))
//!     .unwind(0)
//!     .match_condition(doc! { "status": 1 })
//!     .sort(doc! { "createdAt": -1 })
//!     .page_size(10)
//!     .page(PageRequest::Number(2))
//!     .plan()
//!     .unwrap();
//!
//! assert_eq!(plan.data.len(), 6);
//! assert_eq!(plan.count.last().unwrap(), &doc! { "$group": { "_id": null, "count": { "$sum": 1 } } });
//! ```

use std::collections::BTreeSet;

use bson::{Bson, Document, doc};
use serde::{Deserialize, Serialize};

use crate::error::{QueryError, QueryResult};
use crate::filter;
use crate::pagination::PageRequest;
use crate::search::{self, SearchFields};

/// Field holding the count in the count pipeline's output.
pub const COUNT_FIELD: &str = "count";

/// Default page size for listings.
pub const DEFAULT_PAGE_SIZE: u64 = 10;

/// A left-outer join against another collection.
///
/// Either the equality form (`localField`/`foreignField`), the sub-pipeline
/// form (`let`/`pipeline`), or both combined.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LookupConfig {
    /// Collection to join.
    pub from: String,
    /// Field on the input documents.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local_field: Option<String>,
    /// Field on the joined documents.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub foreign_field: Option<String>,
    /// Variables exposed to the sub-pipeline.
    #[serde(default, rename = "let", skip_serializing_if = "Option::is_none")]
    pub let_vars: Option<Document>,
    /// Sub-pipeline run against the joined collection.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pipeline: Option<Vec<Document>>,
    /// Output array field.
    #[serde(rename = "as")]
    pub as_field: String,
}

impl LookupConfig {
    /// Create an equality lookup.
    pub fn new(
        from: impl Into<String>,
        local_field: impl Into<String>,
        foreign_field: impl Into<String>,
        as_field: impl Into<String>,
    ) -> Self {
        Self {
            from: from.into(),
            local_field: Some(local_field.into()),
            foreign_field: Some(foreign_field.into()),
            let_vars: None,
            pipeline: None,
            as_field: as_field.into(),
        }
    }

    /// Create a sub-pipeline lookup.
    pub fn with_pipeline(
        from: impl Into<String>,
        pipeline: Vec<Document>,
        as_field: impl Into<String>,
    ) -> Self {
        Self {
            from: from.into(),
            local_field: None,
            foreign_field: None,
            let_vars: None,
            pipeline: Some(pipeline),
            as_field: as_field.into(),
        }
    }

    /// Set the variables of a sub-pipeline lookup.
    pub fn let_vars(mut self, vars: Document) -> Self {
        self.let_vars = Some(vars);
        self
    }

    /// The `$lookup` stage.
    pub fn to_stage(&self) -> Document {
        let mut lookup = doc! { "from": self.from.as_str() };
        if let Some(ref local_field) = self.local_field {
            lookup.insert("localField", local_field.as_str());
        }
        if let Some(ref foreign_field) = self.foreign_field {
            lookup.insert("foreignField", foreign_field.as_str());
        }
        if let Some(ref vars) = self.let_vars {
            lookup.insert("let", vars.clone());
        }
        if let Some(ref pipeline) = self.pipeline {
            lookup.insert("pipeline", pipeline.clone());
        }
        lookup.insert("as", self.as_field.as_str());
        doc! { "$lookup": lookup }
    }

    /// The `$unwind` stage for this lookup's output.
    pub fn unwind_stage(&self) -> Document {
        doc! { "$unwind": format!("${}", self.as_field) }
    }
}

/// Accumulates pipeline stages.
#[derive(Debug, Clone, Default)]
pub struct PipelineBuilder {
    stages: Vec<Document>,
}

impl PipelineBuilder {
    /// Create an empty pipeline.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a raw stage.
    pub fn stage(mut self, stage: Document) -> Self {
        self.stages.push(stage);
        self
    }

    /// Add a $match stage.
    pub fn match_stage(self, filter: Document) -> Self {
        self.stage(doc! { "$match": filter })
    }

    /// Add a $lookup stage, optionally unwinding its output.
    pub fn lookup_stage(self, lookup: &LookupConfig, unwind: bool) -> Self {
        let builder = self.stage(lookup.to_stage());
        if unwind {
            builder.stage(lookup.unwind_stage())
        } else {
            builder
        }
    }

    /// Add a $project stage; empty projections are skipped.
    pub fn project_stage(self, projection: Option<&Document>) -> Self {
        match projection.filter(|p| !p.is_empty()) {
            Some(p) => self.stage(doc! { "$project": p.clone() }),
            None => self,
        }
    }

    /// Add a $sort stage; empty sorts are skipped.
    pub fn sort_stage(self, sort: Option<&Document>) -> Self {
        match sort.filter(|s| !s.is_empty()) {
            Some(s) => self.stage(doc! { "$sort": s.clone() }),
            None => self,
        }
    }

    /// Add a $skip stage.
    pub fn skip_stage(self, skip: u64) -> Self {
        self.stage(doc! { "$skip": to_i64(skip) })
    }

    /// Add a $limit stage.
    pub fn limit_stage(self, limit: u64) -> Self {
        self.stage(doc! { "$limit": to_i64(limit) })
    }

    /// Add a stage grouping every document into a single count.
    pub fn count_stage(self) -> Self {
        self.stage(doc! { "$group": { "_id": null, COUNT_FIELD: { "$sum": 1 } } })
    }

    /// Number of stages so far.
    pub fn len(&self) -> usize {
        self.stages.len()
    }

    /// Whether no stage was added.
    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Finish the pipeline.
    pub fn build(self) -> Vec<Document> {
        self.stages
    }
}

/// A paged listing over one entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AggregateQuery {
    /// Lookups, applied in order.
    pub lookups: Vec<LookupConfig>,
    /// Indices into `lookups` whose output is unwound.
    pub unwind_indices: BTreeSet<usize>,
    /// Filter applied after lookups.
    pub match_condition: Option<Document>,
    /// Projection.
    pub projection: Option<Document>,
    /// Sort.
    pub sort: Option<Document>,
    /// Documents per page.
    pub page_size: u64,
    /// Page to return.
    pub page: PageRequest,
}

impl Default for AggregateQuery {
    fn default() -> Self {
        Self {
            lookups: Vec::new(),
            unwind_indices: BTreeSet::new(),
            match_condition: None,
            projection: None,
            sort: None,
            page_size: DEFAULT_PAGE_SIZE,
            page: PageRequest::default(),
        }
    }
}

/// Pipelines for one listing.
#[derive(Debug, Clone, PartialEq)]
pub struct AggregatePlan {
    /// Pipeline returning the documents.
    pub data: Vec<Document>,
    /// Pipeline returning `{_id: null, count}` (or nothing when no match).
    pub count: Vec<Document>,
    /// Documents per page.
    pub page_size: u64,
    /// Requested page.
    pub page: PageRequest,
}

impl AggregateQuery {
    /// Create a query for the first page of ten.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a lookup.
    pub fn lookup(mut self, lookup: LookupConfig) -> Self {
        self.lookups.push(lookup);
        self
    }

    /// Unwind the output of the lookup at `index`.
    pub fn unwind(mut self, index: usize) -> Self {
        self.unwind_indices.insert(index);
        self
    }

    /// Set the match condition.
    pub fn match_condition(mut self, condition: Document) -> Self {
        self.match_condition = Some(condition);
        self
    }

    /// AND translated search conditions into the match condition.
    pub fn search(mut self, fields: &SearchFields, raw: &Document) -> Self {
        let fragments = search::translate(fields, raw);
        if fragments.is_empty() {
            return self;
        }
        let condition = self.match_condition.get_or_insert_with(Document::new);
        match condition.get_array_mut("$and") {
            Ok(existing) => existing.extend(fragments.into_iter().map(Bson::Document)),
            Err(_) => {
                condition.insert("$and", fragments);
            }
        }
        self
    }

    /// Set the projection.
    pub fn projection(mut self, projection: Document) -> Self {
        self.projection = Some(projection);
        self
    }

    /// Set the sort.
    pub fn sort(mut self, sort: Document) -> Self {
        self.sort = Some(sort);
        self
    }

    /// Set the page size.
    pub fn page_size(mut self, page_size: u64) -> Self {
        self.page_size = page_size;
        self
    }

    /// Set the page.
    pub fn page(mut self, page: PageRequest) -> Self {
        self.page = page;
        self
    }

    /// Check the page window.
    pub fn validate(&self) -> QueryResult<()> {
        if let PageRequest::Number(page) = self.page {
            if self.page_size == 0 {
                return Err(QueryError::invalid_payload(
                    "aggregate",
                    "page size must be positive",
                ));
            }
            if page == 0 {
                return Err(QueryError::invalid_payload(
                    "aggregate",
                    "page numbers start at 1",
                ));
            }
        }
        Ok(())
    }

    /// Build the data and count pipelines.
    pub fn plan(&self) -> QueryResult<AggregatePlan> {
        self.validate()?;

        let mut builder = PipelineBuilder::new();
        for (index, lookup) in self.lookups.iter().enumerate() {
            builder = builder.lookup_stage(lookup, self.unwind_indices.contains(&index));
        }

        let condition = filter::alive(self.match_condition.clone().unwrap_or_default());
        let filtered = builder
            .match_stage(condition)
            .project_stage(self.projection.as_ref())
            .sort_stage(self.sort.as_ref());

        let count = filtered.clone().count_stage().build();

        let data = match self.page.skip(self.page_size) {
            Some(skip) => filtered
                .skip_stage(skip)
                .limit_stage(self.page_size)
                .build(),
            None => filtered.build(),
        };

        Ok(AggregatePlan {
            data,
            count,
            page_size: self.page_size,
            page: self.page,
        })
    }
}

/// Read the total from the count pipeline's output.
///
/// No output document means no match.
pub fn count_from_group(documents: &[Document]) -> u64 {
    documents
        .first()
        .and_then(|d| d.get(COUNT_FIELD))
        .and_then(|count| match count {
            Bson::Int32(n) => u64::try_from(*n).ok(),
            Bson::Int64(n) => u64::try_from(*n).ok(),
            Bson::Double(n) if *n >= 0.0 => Some(*n as u64),
            _ => None,
        })
        .unwrap_or(0)
}

fn to_i64(n: u64) -> i64 {
    i64::try_from(n).unwrap_or(i64::MAX)
}
