//! Search filter translation.
//!
//! A caller declares which request parameters are searchable and how
//! ([`SearchFields`]); [`translate`] turns the raw parameter values into
//! MongoDB condition fragments, one per field that yields a condition.
//!
//! ```rust
//! use bson::doc;
//! use quarry_mongodb::search::{self, EqualKind, SearchFieldSpec, SearchFields};
//!
//! let mut fields = SearchFields::new();
//! fields.insert("search1".into(), SearchFieldSpec::regex("title"));
//! fields.insert("search2".into(), SearchFieldSpec::equal("status", EqualKind::Number));
//!
//! let fragments = search::translate(&fields, &doc! { "search1": "abc", "search2": "1" });
//! assert_eq!(fragments.len(), 2);
//! assert_eq!(fragments[1], doc! { "status": 1_i64 });
//! ```
//!
//! Raw values that are missing, null or empty produce nothing. Values that
//! cannot be coerced (a bad date, a malformed range) also produce nothing and
//! are logged at debug level.

pub mod date;
pub mod field;

use bson::{Bson, Document, doc, oid::ObjectId};
use tracing::debug;

use crate::filter::FilterBuilder;

pub use field::{
    DEFAULT_DATE_FORMAT, DateKind, EqualKind, RawSearchField, SearchFieldSpec, SearchFields,
    SearchKind, resolve_search_fields,
};

/// Key carrying the range text when a range value is sent as an object.
pub const RANGE_FILTER_KEY: &str = "rangeFilter";

/// Separator between field names of an [`EqualKind::EqualOrNumber`] search.
pub const FIELD_SEPARATOR: char = '|';

/// Translate raw search values into condition fragments.
///
/// Fragments follow the declaration order of `fields`.
pub fn translate(fields: &SearchFields, raw: &Document) -> Vec<Document> {
    fields
        .iter()
        .filter_map(|(key, spec)| {
            let value = raw.get(key).filter(|v| is_present(v))?;
            let fragment = translate_field(spec, value);
            if fragment.is_none() {
                debug!(key = %key, field = %spec.field, "Search value produced no condition");
            }
            fragment
        })
        .collect()
}

/// Translate and combine into a single `$and` condition.
///
/// Returns `None` when no fragment was produced.
pub fn to_match_condition(fields: &SearchFields, raw: &Document) -> Option<Document> {
    let fragments = translate(fields, raw);
    if fragments.is_empty() {
        None
    } else {
        Some(FilterBuilder::new().and(fragments).build())
    }
}

/// Translate one raw value.
pub fn translate_field(spec: &SearchFieldSpec, value: &Bson) -> Option<Document> {
    let field = spec.field.as_str();

    match &spec.kind {
        SearchKind::Regex { numeric } => {
            let pattern = regex_lite::escape(&text(value)?);
            let condition = if *numeric {
                FilterBuilder::new().expr(doc! {
                    "$regexMatch": {
                        "input": { "$toString": format!("${}", field) },
                        "regex": pattern,
                    }
                })
            } else {
                FilterBuilder::new().regex_with_options(field, &pattern, "i")
            };
            Some(condition.build())
        }

        SearchKind::Equal(kind) => equal(field, *kind, value),

        SearchKind::ObjectField { keyed: true } => {
            Some(doc! { format!("{}.{}", field, text(value)?): 1 })
        }
        SearchKind::ObjectField { keyed: false } => {
            Some(FilterBuilder::new().eq(field, value.clone()).build())
        }

        SearchKind::Range => {
            let raw = range_text(value)?;
            let (min, max) = date::split_range(&raw)?;
            Some(
                FilterBuilder::new()
                    .between(field, parse_number(min)?, parse_number(max)?)
                    .build(),
            )
        }

        SearchKind::Date(kind) => date_condition(field, kind, &text(value)?),
    }
}

fn equal(field: &str, kind: EqualKind, value: &Bson) -> Option<Document> {
    let condition = match kind {
        EqualKind::Number => {
            let number = match value {
                Bson::Int32(_) | Bson::Int64(_) => value.clone(),
                Bson::Double(f) if f.is_finite() => value.clone(),
                _ => parse_number(&text(value)?)?,
            };
            FilterBuilder::new().eq(field, number)
        }
        EqualKind::EqualOrNumber => {
            let literal = parse_literal(&text(value)?.to_lowercase())?;
            let alternatives = field
                .split(FIELD_SEPARATOR)
                .map(str::trim)
                .filter(|f| !f.is_empty())
                .map(|f| doc! { f: literal.clone() })
                .collect();
            FilterBuilder::new().or(alternatives)
        }
        EqualKind::Boolean => {
            FilterBuilder::new().eq(field, parse_literal(&text(value)?.to_lowercase())?)
        }
        EqualKind::ObjectId => {
            let id = match value {
                Bson::ObjectId(id) => *id,
                _ => ObjectId::parse_str(text(value)?.trim()).ok()?,
            };
            FilterBuilder::new().eq(field, id)
        }
        EqualKind::String => FilterBuilder::new().eq(field, value.clone()),
    };
    Some(condition.build())
}

fn date_condition(field: &str, kind: &DateKind, raw: &str) -> Option<Document> {
    let condition = match kind {
        DateKind::Range { format } => {
            let (start, end) = date::parse_day_range(raw)?;
            FilterBuilder::new().between(
                field,
                date::format_moment(date::start_of_day(start), &format!("{} [00:00:00]", format))?,
                date::format_moment(date::start_of_day(end), &format!("{} [23:59:59]", format))?,
            )
        }
        DateKind::StringRange => {
            let (start, end) = date::parse_day_range(raw)?;
            FilterBuilder::new().between(
                field,
                date::to_bson_datetime(date::start_of_day(start)),
                date::to_bson_datetime(date::end_of_day(end)?),
            )
        }
        DateKind::FormattedStringRange => {
            let (start, end) = date::parse_day_range(raw)?;
            FilterBuilder::new().between(
                field,
                format!("{} 00:00:00", start.format("%Y-%m-%d")),
                format!("{} 23:59:59", end.format("%Y-%m-%d")),
            )
        }
        DateKind::Exact { format } => {
            let day = date::parse_day(raw)?;
            FilterBuilder::new().eq(field, doc! { "$eq": date::format_day(day, format)? })
        }
    };
    Some(condition.build())
}

fn is_present(value: &Bson) -> bool {
    match value {
        Bson::Null | Bson::Undefined => false,
        Bson::String(s) => !s.is_empty(),
        _ => true,
    }
}

/// String form of a scalar raw value.
fn text(value: &Bson) -> Option<String> {
    match value {
        Bson::String(s) => Some(s.clone()),
        Bson::Int32(i) => Some(i.to_string()),
        Bson::Int64(i) => Some(i.to_string()),
        Bson::Double(f) if f.is_finite() => Some(f.to_string()),
        Bson::Boolean(b) => Some(b.to_string()),
        Bson::ObjectId(id) => Some(id.to_hex()),
        _ => None,
    }
}

fn range_text(value: &Bson) -> Option<String> {
    match value {
        Bson::Document(d) => d.get(RANGE_FILTER_KEY).and_then(text),
        other => text(other),
    }
}

/// Parse an integer, falling back to a finite float.
pub fn parse_number(input: &str) -> Option<Bson> {
    let input = input.trim();
    if let Ok(i) = input.parse::<i64>() {
        return Some(Bson::Int64(i));
    }
    input
        .parse::<f64>()
        .ok()
        .filter(|f| f.is_finite())
        .map(Bson::Double)
}

/// Parse a JSON scalar literal (`true`, `3`, `"x"`, `null`) into BSON.
fn parse_literal(input: &str) -> Option<Bson> {
    match input.trim() {
        "true" => Some(Bson::Boolean(true)),
        "false" => Some(Bson::Boolean(false)),
        "null" => Some(Bson::Null),
        quoted if quoted.starts_with('"') => serde_json::from_str::<String>(quoted)
            .ok()
            .map(Bson::String),
        other => parse_number(other),
    }
}
