//! Filtering, sorting and pagination over serialized records.
//!
//! Records are compared through their JSON representation so a single
//! implementation serves every entity: equality filters on top-level fields,
//! case-insensitive free-text search across string fields, and sorting by any
//! field name the record serializes.

use crate::error::ApiError;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::cmp::Ordering;
use std::str::FromStr;
use utoipa::ToSchema;

/// Default page size.
pub const DEFAULT_PER_PAGE: usize = 10;

/// Largest page size a client may request.
pub const MAX_PER_PAGE: usize = 100;

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    /// Ascending.
    Asc,
    /// Descending (default).
    #[default]
    Desc,
}

/// Query parameters accepted by list endpoints.
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ListQuery {
    /// 1-based page number.
    #[serde(default)]
    pub page: Option<usize>,
    /// Page size (default 10, max 100).
    #[serde(default)]
    pub per_page: Option<usize>,
    /// Field to sort by (default `createdAt`).
    #[serde(default)]
    pub sort_field: Option<String>,
    /// Sort direction (default `desc`).
    #[serde(default)]
    pub sort_order: Option<SortOrder>,
    /// Case-insensitive substring matched against string fields.
    #[serde(default)]
    pub search: Option<String>,
    /// JSON object of field equality filters, e.g. `{"status":"ACTIVE"}`.
    #[serde(default)]
    pub filter: Option<String>,
}

/// Pagination metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    /// Number of records matching the query.
    pub total_items: usize,
    /// Current page (1-based).
    pub current_page: usize,
    /// Page size.
    pub per_page: usize,
    /// Number of pages.
    pub total_pages: usize,
}

/// A page of records.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Paginated<T> {
    /// Records in this page.
    pub items: Vec<T>,
    /// Pagination metadata.
    pub pagination: Pagination,
}

impl ListQuery {
    /// Resolved page number.
    #[must_use]
    pub fn page(&self) -> usize {
        self.page.unwrap_or(1).max(1)
    }

    /// Resolved page size.
    #[must_use]
    pub fn per_page(&self) -> usize {
        self.per_page
            .unwrap_or(DEFAULT_PER_PAGE)
            .clamp(1, MAX_PER_PAGE)
    }

    /// Parses the `filter` parameter.
    ///
    /// # Errors
    /// Returns `InvalidRequest` if the filter is not a JSON object.
    pub fn filters(&self) -> Result<Map<String, Value>, ApiError> {
        match &self.filter {
            None => Ok(Map::new()),
            Some(raw) if raw.trim().is_empty() => Ok(Map::new()),
            Some(raw) => match serde_json::from_str::<Value>(raw) {
                Ok(Value::Object(map)) => Ok(map),
                _ => Err(ApiError::InvalidRequest(format!(
                    "filter must be a JSON object: {}",
                    raw
                ))),
            },
        }
    }
}

/// Applies a list query to records.
///
/// # Errors
/// Returns `InvalidRequest` on a malformed filter or `Internal` if a record
/// cannot be serialized.
pub fn apply<T: Serialize>(records: Vec<T>, query: &ListQuery) -> Result<Paginated<T>, ApiError> {
    let filters = query.filters()?;
    let search = query.search.as_ref().map(|s| s.to_lowercase());
    let sort_field = query.sort_field.as_deref().unwrap_or("createdAt");
    let sort_order = query.sort_order.unwrap_or_default();

    let mut rows: Vec<(Value, T)> = Vec::with_capacity(records.len());
    for record in records {
        let value =
            serde_json::to_value(&record).map_err(|e| ApiError::Internal(e.to_string()))?;
        if !matches_filters(&value, &filters) {
            continue;
        }
        if let Some(ref needle) = search
            && !matches_search(&value, needle)
        {
            continue;
        }
        rows.push((value, record));
    }

    rows.sort_by(|(a, _), (b, _)| {
        let ordering = compare_values(a.get(sort_field), b.get(sort_field));
        match sort_order {
            SortOrder::Asc => ordering,
            SortOrder::Desc => ordering.reverse(),
        }
    });

    Ok(paginate(
        rows.into_iter().map(|(_, record)| record).collect(),
        query.page(),
        query.per_page(),
    ))
}

/// Slices already-ordered records into a page.
#[must_use]
pub fn paginate<T>(records: Vec<T>, page: usize, per_page: usize) -> Paginated<T> {
    let total_items = records.len();
    let per_page = per_page.max(1);
    let total_pages = total_items.div_ceil(per_page);
    let items = records
        .into_iter()
        .skip(page.saturating_sub(1).saturating_mul(per_page))
        .take(per_page)
        .collect();

    Paginated {
        items,
        pagination: Pagination {
            total_items,
            current_page: page.max(1),
            per_page,
            total_pages,
        },
    }
}

fn matches_filters(value: &Value, filters: &Map<String, Value>) -> bool {
    filters.iter().all(|(field, expected)| {
        let actual = value.get(field).unwrap_or(&Value::Null);
        match (actual, expected) {
            (Value::String(a), Value::String(e)) => {
                a == e || (is_decimal_pair(a, e) && decimal_eq(a, e))
            }
            (Value::String(a), Value::Number(n)) => decimal_eq(a, &n.to_string()),
            _ => actual == expected,
        }
    })
}

fn matches_search(value: &Value, needle: &str) -> bool {
    match value {
        Value::Object(map) => map.values().any(|v| match v {
            Value::String(s) => s.to_lowercase().contains(needle),
            _ => false,
        }),
        _ => false,
    }
}

fn is_decimal_pair(a: &str, b: &str) -> bool {
    Decimal::from_str(a).is_ok() && Decimal::from_str(b).is_ok()
}

fn decimal_eq(a: &str, b: &str) -> bool {
    match (Decimal::from_str(a), Decimal::from_str(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

/// Orders JSON values: nulls first, numbers (and numeric strings) by value,
/// other strings lexicographically, booleans false < true.
fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    let a = a.unwrap_or(&Value::Null);
    let b = b.unwrap_or(&Value::Null);
    match (a, b) {
        (Value::Null, Value::Null) => Ordering::Equal,
        (Value::Null, _) => Ordering::Less,
        (_, Value::Null) => Ordering::Greater,
        (Value::Number(x), Value::Number(y)) => x
            .as_f64()
            .partial_cmp(&y.as_f64())
            .unwrap_or(Ordering::Equal),
        (Value::String(x), Value::String(y)) => {
            match (Decimal::from_str(x), Decimal::from_str(y)) {
                (Ok(dx), Ok(dy)) => dx.cmp(&dy),
                _ => x.cmp(y),
            }
        }
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        _ => Ordering::Equal,
    }
}
