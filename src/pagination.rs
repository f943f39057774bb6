//! One pagination and filtering contract over heterogeneous list endpoints
//!
//! Backends page differently (Link-header cursors, `startAt` offsets, ...).
//! Callers always send a [`PageRequest`] and always get a [`PageResult`]; the
//! backend-specific part is the `call` closure handed to
//! [`ListExecutor::list`], which turns a [`PageQuery`] into a request and the
//! response into a [`RawPage`].

use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::{Error, Result};

/// Filter comparison
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterOp {
    /// Equal
    Eq,
    /// Not equal
    Ne,
    /// Field is empty (`value: true`) or non-empty (`value: false`)
    Empty,
}

impl FilterOp {
    /// Wire name
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Eq => "eq",
            Self::Ne => "ne",
            Self::Empty => "empty",
        }
    }
}

/// One condition on a field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterCondition {
    /// Comparison
    #[serde(rename = "type")]
    pub op: FilterOp,
    /// Operand
    pub value: Value,
}

impl FilterCondition {
    /// `eq` condition
    pub fn eq(value: impl Into<Value>) -> Self {
        Self {
            op: FilterOp::Eq,
            value: value.into(),
        }
    }

    /// Operand rendered for a query string
    #[must_use]
    pub fn value_string(&self) -> String {
        match &self.value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }
}

/// Field name → conditions. Fields are ANDed together.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Filters(BTreeMap<String, Vec<FilterCondition>>);

impl Filters {
    /// Empty filter set
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder: add a single-condition field
    #[must_use]
    pub fn with(mut self, field: impl Into<String>, condition: FilterCondition) -> Self {
        self.0.insert(field.into(), vec![condition]);
        self
    }

    /// Replace the conditions of a field
    pub fn insert(&mut self, field: impl Into<String>, conditions: Vec<FilterCondition>) {
        self.0.insert(field.into(), conditions);
    }

    /// Conditions of a field
    pub fn get(&self, field: &str) -> Option<&[FilterCondition]> {
        self.0.get(field).map(Vec::as_slice)
    }

    /// Field names
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    /// Fields and their conditions, sorted by field name
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[FilterCondition])> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    /// Whether no field is filtered
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Number of filtered fields
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// `field=value` pairs for backends that only filter by plain equality.
    ///
    /// # Errors
    ///
    /// [`Error::Validation`] when a field carries anything but a single `eq`
    /// condition; such a filter cannot be expressed as one query parameter.
    pub fn equalities(&self) -> Result<Vec<(String, String)>> {
        self.iter()
            .map(|(field, conditions)| match conditions {
                [condition] if condition.op == FilterOp::Eq => {
                    Ok((field.to_string(), condition.value_string()))
                }
                _ => Err(Error::Validation(format!(
                    "filter {field} supports exactly one eq condition"
                ))),
            })
            .collect()
    }

    /// Caller filters layered over `defaults`: a caller field replaces the
    /// default for that field entirely, defaults fill in the rest.
    #[must_use]
    pub fn merged_over(&self, defaults: &Filters) -> Filters {
        let mut merged = defaults.0.clone();
        for (field, conditions) in &self.0 {
            merged.insert(field.clone(), conditions.clone());
        }
        Filters(merged)
    }
}

/// Accepted input shapes for one filter field
#[derive(Deserialize)]
#[serde(untagged)]
enum FilterInput {
    Many(Vec<FilterCondition>),
    One(FilterCondition),
    Scalars(Vec<Value>),
    Scalar(Value),
}

impl From<FilterInput> for Vec<FilterCondition> {
    fn from(input: FilterInput) -> Self {
        match input {
            FilterInput::Many(conditions) => conditions,
            FilterInput::One(condition) => vec![condition],
            FilterInput::Scalars(values) => values.into_iter().map(FilterCondition::eq).collect(),
            FilterInput::Scalar(value) => vec![FilterCondition::eq(value)],
        }
    }
}

impl<'de> Deserialize<'de> for Filters {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = BTreeMap::<String, FilterInput>::deserialize(deserializer)?;
        Ok(Filters(
            raw.into_iter().map(|(k, v)| (k, v.into())).collect(),
        ))
    }
}

/// Decides which filter keys a list call accepts
pub trait FilterScope: Send + Sync {
    /// Whether `key` is a filterable field
    fn allows(&self, key: &str) -> bool;
}

/// Fixed list of filterable keys
#[derive(Debug, Clone, Copy)]
pub struct AllowedKeys(pub &'static [&'static str]);

impl FilterScope for AllowedKeys {
    fn allows(&self, key: &str) -> bool {
        self.0.contains(&key)
    }
}

/// Sort direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Ascending
    Asc,
    /// Descending
    Desc,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Asc => "asc",
            Self::Desc => "desc",
        })
    }
}

/// What the caller asked for
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PageRequest {
    /// Field filters
    pub filters: Filters,
    /// Sort field
    pub sort: Option<String>,
    /// Sort direction
    pub direction: Option<Direction>,
    /// Page size
    pub per_page: Option<u32>,
    /// Offset of the first item
    pub offset: Option<u64>,
    /// Opaque cursor from a previous page
    #[serde(alias = "next_url")]
    pub next_cursor: Option<String>,
}

/// What the backend call receives
#[derive(Debug, Clone, PartialEq)]
pub enum PageQuery {
    /// Continue from a cursor; it already encodes filters and sort
    Cursor {
        /// Opaque cursor
        cursor: String,
        /// Page size override
        per_page: Option<u32>,
    },
    /// First page or explicit offset
    Positional {
        /// Offset of the first item
        offset: Option<u64>,
        /// Page size
        per_page: Option<u32>,
        /// Sort field
        sort: Option<String>,
        /// Sort direction
        direction: Option<Direction>,
        /// Filters with defaults merged in
        filters: Filters,
    },
}

/// One page as the backend produced it
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawPage {
    /// Items
    pub items: Vec<Value>,
    /// Cursor for the following page
    pub next_cursor: Option<String>,
    /// Total matching items, if the backend reports it
    pub total: Option<u64>,
}

/// Normalized page
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PageResult {
    /// Items
    pub data: Vec<Value>,
    /// Cursor for the following page
    pub next_cursor: Option<String>,
    /// Number of items in `data`
    pub data_count: usize,
    /// Total matching items, if known
    pub total_count: Option<u64>,
}

impl From<RawPage> for PageResult {
    fn from(page: RawPage) -> Self {
        Self {
            data_count: page.items.len(),
            data: page.items,
            next_cursor: page.next_cursor,
            total_count: page.total,
        }
    }
}

impl PageResult {
    /// Transform every item, keeping the page metadata
    #[must_use]
    pub fn map_data(mut self, f: impl FnMut(Value) -> Value) -> Self {
        self.data = self.data.into_iter().map(f).collect();
        self.data_count = self.data.len();
        self
    }
}

/// Runs list calls under the shared contract
pub struct ListExecutor<'a> {
    scope: &'a dyn FilterScope,
    defaults: Filters,
    max_page_size: u32,
}

impl<'a> ListExecutor<'a> {
    /// Default upper bound for `per_page`
    pub const DEFAULT_MAX_PAGE_SIZE: u32 = 100;

    /// Executor validating filter keys against `scope`
    pub fn new(scope: &'a dyn FilterScope) -> Self {
        Self {
            scope,
            defaults: Filters::new(),
            max_page_size: Self::DEFAULT_MAX_PAGE_SIZE,
        }
    }

    /// Filters the backend mandates when the caller omits them
    #[must_use]
    pub fn with_defaults(mut self, defaults: Filters) -> Self {
        self.defaults = defaults;
        self
    }

    /// Upper bound for `per_page`
    #[must_use]
    pub fn with_max_page_size(mut self, max: u32) -> Self {
        self.max_page_size = max;
        self
    }

    /// Validate `request`, build the [`PageQuery`], run `call`, normalize.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidFilterKey`] for a key outside the scope and
    /// [`Error::Validation`] for a bad page size; `call` is not invoked in
    /// either case. Errors from `call` are returned unchanged.
    pub async fn list<F, Fut>(&self, request: PageRequest, call: F) -> Result<PageResult>
    where
        F: FnOnce(PageQuery) -> Fut,
        Fut: Future<Output = Result<RawPage>>,
    {
        if let Some(key) = request.filters.keys().find(|k| !self.scope.allows(k)) {
            return Err(Error::InvalidFilterKey(key.to_string()));
        }
        if let Some(per_page) = request.per_page {
            if per_page == 0 || per_page > self.max_page_size {
                return Err(Error::Validation(format!(
                    "per_page must be between 1 and {}, got {per_page}",
                    self.max_page_size
                )));
            }
        }

        let query = match request.next_cursor {
            Some(cursor) => PageQuery::Cursor {
                cursor,
                per_page: request.per_page,
            },
            None => PageQuery::Positional {
                offset: request.offset,
                per_page: request.per_page,
                sort: request.sort,
                direction: request.direction,
                filters: request.filters.merged_over(&self.defaults),
            },
        };

        debug!(
            cursor = matches!(query, PageQuery::Cursor { .. }),
            "Executing list call"
        );

        call(query).await.map(PageResult::from)
    }
}
