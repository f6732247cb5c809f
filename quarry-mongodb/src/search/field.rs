//! Search field declarations.
//!
//! On the wire a search field is `{field, type, dataType?, format?}`. Those tag
//! pairs are resolved once into [`SearchKind`], so translation is a match over
//! a closed set instead of string comparisons.

use indexmap::IndexMap;
use serde::Deserialize;
use tracing::debug;

/// Moment-style format used when a date field does not name one.
pub const DEFAULT_DATE_FORMAT: &str = "YYYY-MM-DD";

/// Search fields keyed by request parameter, in declaration order.
pub type SearchFields = IndexMap<String, SearchFieldSpec>;

/// Coercion applied by an equality search.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EqualKind {
    /// Cast the raw value to a number.
    Number,
    /// Parse a literal and match it against any of several `|`-separated fields.
    EqualOrNumber,
    /// Parse a boolean (or other JSON) literal.
    Boolean,
    /// Parse an ObjectId; invalid ids produce no condition.
    ObjectId,
    /// Use the raw value as is.
    String,
}

/// Date search variants. Raw input is always `DD/MM/YYYY`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DateKind {
    /// `"start - end"` as formatted strings spanning whole days.
    Range {
        /// Moment-style output format.
        format: String,
    },
    /// `"start - end"` as UTC instants at day start and day end.
    StringRange,
    /// `"start - end"` as `YYYY-MM-DD HH:mm:ss` strings spanning whole days.
    FormattedStringRange,
    /// A single day, matched by equality on its formatted string.
    Exact {
        /// Moment-style output format.
        format: String,
    },
}

/// How a search field turns a raw value into a condition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchKind {
    /// Case-insensitive substring match; `numeric` matches on the field's
    /// string form.
    Regex {
        /// Cast the field to a string before matching.
        numeric: bool,
    },
    /// Exact match with a coercion.
    Equal(EqualKind),
    /// `keyed` tests for `field.<raw>` being set to 1; otherwise plain equality.
    ObjectField {
        /// Use the raw value as a sub-key.
        keyed: bool,
    },
    /// `"min - max"` inclusive numeric range.
    Range,
    /// Date matching.
    Date(DateKind),
}

/// One searchable field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchFieldSpec {
    /// Document field (or `|`-separated fields for [`EqualKind::EqualOrNumber`]).
    pub field: String,
    /// Condition kind.
    pub kind: SearchKind,
}

impl SearchFieldSpec {
    /// Create a spec.
    pub fn new(field: impl Into<String>, kind: SearchKind) -> Self {
        Self {
            field: field.into(),
            kind,
        }
    }

    /// Case-insensitive substring search.
    pub fn regex(field: impl Into<String>) -> Self {
        Self::new(field, SearchKind::Regex { numeric: false })
    }

    /// Substring search over a numeric field's string form.
    pub fn numeric_regex(field: impl Into<String>) -> Self {
        Self::new(field, SearchKind::Regex { numeric: true })
    }

    /// Equality search.
    pub fn equal(field: impl Into<String>, kind: EqualKind) -> Self {
        Self::new(field, SearchKind::Equal(kind))
    }

    /// Numeric range search.
    pub fn range(field: impl Into<String>) -> Self {
        Self::new(field, SearchKind::Range)
    }

    /// Date search.
    pub fn date(field: impl Into<String>, kind: DateKind) -> Self {
        Self::new(field, SearchKind::Date(kind))
    }

    /// Resolve the wire tags into a spec.
    ///
    /// Returns `None` for combinations that never produce a condition: an
    /// unknown `type`, or `equal` without a recognized `dataType`.
    pub fn from_tags(
        field: impl Into<String>,
        search_type: &str,
        data_type: Option<&str>,
        format: Option<&str>,
    ) -> Option<Self> {
        let data_type = data_type.map(str::trim);
        let format = format.map(str::trim).filter(|f| !f.is_empty());

        let kind = match search_type.trim() {
            "regex" => SearchKind::Regex {
                numeric: data_type == Some("Number"),
            },
            "equal" => SearchKind::Equal(match data_type? {
                "Number" => EqualKind::Number,
                "EqualORNumber" => EqualKind::EqualOrNumber,
                "Boolean" => EqualKind::Boolean,
                "Object" => EqualKind::ObjectId,
                "String" => EqualKind::String,
                _ => return None,
            }),
            "objectField" => SearchKind::ObjectField {
                keyed: data_type == Some("Object"),
            },
            "range" => SearchKind::Range,
            "date" => SearchKind::Date(match (data_type, format) {
                (Some("range"), Some(format)) => DateKind::Range {
                    format: format.to_string(),
                },
                (Some("stringRange"), _) => DateKind::StringRange,
                (Some("formattedStringRange"), _) => DateKind::FormattedStringRange,
                (_, format) => DateKind::Exact {
                    format: format.unwrap_or(DEFAULT_DATE_FORMAT).to_string(),
                },
            }),
            _ => return None,
        };

        Some(Self::new(field, kind))
    }
}

/// Wire form of a search field.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawSearchField {
    /// Document field.
    pub field: String,
    /// Search type tag (`regex`, `equal`, `objectField`, `range`, `date`).
    #[serde(rename = "type")]
    pub search_type: String,
    /// Data type tag refining the search type.
    #[serde(default)]
    pub data_type: Option<String>,
    /// Moment-style date format.
    #[serde(default)]
    pub format: Option<String>,
}

impl RawSearchField {
    /// Resolve into a spec; see [`SearchFieldSpec::from_tags`].
    pub fn resolve(&self) -> Option<SearchFieldSpec> {
        SearchFieldSpec::from_tags(
            self.field.clone(),
            &self.search_type,
            self.data_type.as_deref(),
            self.format.as_deref(),
        )
    }
}

/// Resolve a whole wire map, dropping entries that can never match.
pub fn resolve_search_fields(raw: &IndexMap<String, RawSearchField>) -> SearchFields {
    raw.iter()
        .filter_map(|(key, field)| match field.resolve() {
            Some(spec) => Some((key.clone(), spec)),
            None => {
                debug!(
                    key = %key,
                    search_type = %field.search_type,
                    "Ignoring search field with unsupported type"
                );
                None
            }
        })
        .collect()
}
