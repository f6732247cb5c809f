//! Page requests and pagination metadata for list results.
//!
//! ```rust
//! use quarry_mongodb::{PageRequest, Pagination};
//!
//! let page = PageRequest::Number(2);
//! assert_eq!(page.skip(10), Some(10));
//!
//! let meta = Pagination::for_page(15, 10, 1);
//! assert_eq!(meta.total_pages, Some(2));
//! assert_eq!(meta.remaining_count, Some(5));
//!
//! let all = Pagination::total(15);
//! assert_eq!(all.total_pages, None);
//! ```

use std::fmt;
use std::str::FromStr;

use bson::Document;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::QueryError;

/// Literal used for the "all records" page.
pub const ALL_PAGES: &str = "*";

/// Which page of a listing to return.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PageRequest {
    /// A 1-based page number.
    Number(u64),
    /// Every match, no paging metadata beyond the total.
    All,
}

impl PageRequest {
    /// Whether this request pages the result.
    pub fn is_paged(&self) -> bool {
        matches!(self, Self::Number(_))
    }

    /// Offset for the given page size, `None` for [`PageRequest::All`].
    pub fn skip(&self, page_size: u64) -> Option<u64> {
        match self {
            Self::Number(page) => Some(page.saturating_sub(1).saturating_mul(page_size)),
            Self::All => None,
        }
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self::Number(1)
    }
}

impl fmt::Display for PageRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(page) => write!(f, "{}", page),
            Self::All => f.write_str(ALL_PAGES),
        }
    }
}

impl FromStr for PageRequest {
    type Err = QueryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s == ALL_PAGES {
            return Ok(Self::All);
        }
        s.parse::<u64>()
            .map(Self::Number)
            .map_err(|_| QueryError::invalid_payload("aggregate", format!("invalid page `{}`", s)))
    }
}

impl Serialize for PageRequest {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Number(page) => serializer.serialize_u64(*page),
            Self::All => serializer.serialize_str(ALL_PAGES),
        }
    }
}

impl<'de> Deserialize<'de> for PageRequest {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Number(u64),
            Text(String),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Number(page) => Ok(Self::Number(page)),
            Raw::Text(text) => text.parse().map_err(serde::de::Error::custom),
        }
    }
}

/// Pagination metadata returned with a list.
///
/// The optional fields are present only when a concrete page was requested.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    /// Total number of matches, independent of the page window.
    pub total_count: u64,
    /// Number of pages at the requested page size.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_pages: Option<u64>,
    /// The page that was returned.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_page: Option<u64>,
    /// Matches after the returned page.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remaining_count: Option<u64>,
}

impl Pagination {
    /// Metadata for an unpaged listing.
    pub fn total(total_count: u64) -> Self {
        Self {
            total_count,
            ..Self::default()
        }
    }

    /// Metadata for a concrete page.
    ///
    /// `page_size` must be non-zero.
    pub fn for_page(total_count: u64, page_size: u64, page: u64) -> Self {
        let consumed = page.saturating_mul(page_size);
        Self {
            total_count,
            total_pages: Some(total_count.div_ceil(page_size)),
            current_page: Some(page),
            remaining_count: Some(total_count.saturating_sub(consumed)),
        }
    }

    /// Metadata for a request, dispatching on the page kind.
    pub fn for_request(total_count: u64, page_size: u64, page: PageRequest) -> Self {
        match page {
            PageRequest::Number(page) => Self::for_page(total_count, page_size, page),
            PageRequest::All => Self::total(total_count),
        }
    }

    /// Report an empty concrete page as zero pages and zero matches.
    ///
    /// Applied when a paged request returns no documents, whatever the
    /// independent count said.
    pub fn zero_if_empty(mut self, page_is_empty: bool) -> Self {
        if page_is_empty && self.current_page.is_some() {
            self.total_pages = Some(0);
            self.total_count = 0;
        }
        self
    }
}

/// A list of documents plus pagination metadata.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ListResult {
    /// The documents of this page (or all documents).
    pub result: Vec<Document>,
    /// Pagination metadata.
    #[serde(flatten)]
    pub pagination: Pagination,
}

impl ListResult {
    /// Create a list result.
    pub fn new(result: Vec<Document>, pagination: Pagination) -> Self {
        Self { result, pagination }
    }

    /// Number of documents in this page.
    pub fn len(&self) -> usize {
        self.result.len()
    }

    /// Whether this page is empty.
    pub fn is_empty(&self) -> bool {
        self.result.is_empty()
    }
}
