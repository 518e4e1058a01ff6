//! Query filters, sorting and pagination for authentication listings.
//!
//! Filters arrive as query pairs (`filter[name][contains]=prod`,
//! `sort_by=created_at:desc`). The relational backend turns them into bound
//! SQL predicates; the key-value backend evaluates the same filters against
//! decoded records.

use crate::domain::Authentication;
use crate::errors::{AuthStoreError, Result};
use chrono::{DateTime, Utc};
use sqlx::{QueryBuilder, Sqlite};
use std::cmp::Ordering;

/// Default page size
pub const DEFAULT_LIMIT: i64 = 100;
/// Largest accepted page size
pub const MAX_LIMIT: i64 = 1000;

/// Pagination window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub limit: i64,
    pub offset: i64,
}

impl Default for Page {
    fn default() -> Self {
        Self { limit: DEFAULT_LIMIT, offset: 0 }
    }
}

impl Page {
    pub fn new(limit: i64, offset: i64) -> Result<Self> {
        if limit < 0 || limit > MAX_LIMIT {
            return Err(AuthStoreError::bad_request_field(
                format!("limit must be between 0 and {}", MAX_LIMIT),
                "limit",
            ));
        }
        if offset < 0 {
            return Err(AuthStoreError::bad_request_field("offset cannot be negative", "offset"));
        }
        Ok(Self { limit, offset })
    }

    /// Slice an already filtered and sorted result set
    pub fn apply<T>(&self, items: Vec<T>) -> Vec<T> {
        items.into_iter().skip(self.offset as usize).take(self.limit as usize).collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FieldKind {
    Text,
    Integer,
    Timestamp,
}

/// Fields a listing may be filtered or sorted on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterField {
    Id,
    Name,
    AuthType,
    Username,
    ResourceType,
    ResourceId,
    SourceId,
    AvailabilityStatus,
    CreatedAt,
    UpdatedAt,
}

impl FilterField {
    pub fn parse(name: &str) -> Result<Self> {
        let field = match name {
            "id" => Self::Id,
            "name" => Self::Name,
            "authtype" => Self::AuthType,
            "username" => Self::Username,
            "resource_type" => Self::ResourceType,
            "resource_id" => Self::ResourceId,
            "source_id" => Self::SourceId,
            "availability_status" => Self::AvailabilityStatus,
            "created_at" => Self::CreatedAt,
            "updated_at" => Self::UpdatedAt,
            other => {
                return Err(AuthStoreError::bad_request_field(
                    format!("unknown filter field '{}'", other),
                    "filter",
                ))
            }
        };
        Ok(field)
    }

    /// Column in the `authentications` table
    pub fn column(&self) -> &'static str {
        match self {
            Self::Id => "id",
            Self::Name => "name",
            Self::AuthType => "authtype",
            Self::Username => "username",
            Self::ResourceType => "resource_type",
            Self::ResourceId => "resource_id",
            Self::SourceId => "source_id",
            Self::AvailabilityStatus => "availability_status",
            Self::CreatedAt => "created_at",
            Self::UpdatedAt => "updated_at",
        }
    }

    fn kind(&self) -> FieldKind {
        match self {
            Self::ResourceId | Self::SourceId => FieldKind::Integer,
            Self::CreatedAt | Self::UpdatedAt => FieldKind::Timestamp,
            _ => FieldKind::Text,
        }
    }

    fn parse_value(&self, raw: &str) -> Result<FilterValue> {
        match self.kind() {
            FieldKind::Text => Ok(FilterValue::Text(raw.to_string())),
            FieldKind::Integer => raw.trim().parse::<i64>().map(FilterValue::Integer).map_err(|_| {
                AuthStoreError::bad_request_field(
                    format!("'{}' expects an integer, got '{}'", self.column(), raw),
                    "filter",
                )
            }),
            FieldKind::Timestamp => DateTime::parse_from_rfc3339(raw.trim())
                .map(|ts| FilterValue::Timestamp(ts.with_timezone(&Utc)))
                .map_err(|_| {
                    AuthStoreError::bad_request_field(
                        format!("'{}' expects an RFC 3339 timestamp, got '{}'", self.column(), raw),
                        "filter",
                    )
                }),
        }
    }

    fn value_of(&self, auth: &Authentication) -> Option<FilterValue> {
        match self {
            Self::Id => Some(FilterValue::Text(auth.id.to_string())),
            Self::Name => auth.name.clone().map(FilterValue::Text),
            Self::AuthType => Some(FilterValue::Text(auth.auth_type.clone())),
            Self::Username => auth.username.clone().map(FilterValue::Text),
            Self::ResourceType => Some(FilterValue::Text(auth.resource_type.to_string())),
            Self::ResourceId => Some(FilterValue::Integer(auth.resource_id)),
            Self::SourceId => Some(FilterValue::Integer(auth.source_id)),
            Self::AvailabilityStatus => {
                auth.availability_status.map(|s| FilterValue::Text(s.to_string()))
            }
            Self::CreatedAt => Some(FilterValue::Timestamp(auth.created_at)),
            Self::UpdatedAt => auth.updated_at.map(FilterValue::Timestamp),
        }
    }
}

#[derive(Debug, Clone, PartialEq, PartialOrd)]
pub enum FilterValue {
    Text(String),
    Integer(i64),
    Timestamp(DateTime<Utc>),
}

impl FilterValue {
    fn as_lower_text(&self) -> Option<String> {
        match self {
            Self::Text(s) => Some(s.to_lowercase()),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOperation {
    Eq,
    NotEq,
    /// Case-insensitive substring match
    Contains,
    StartsWith,
    EndsWith,
    In,
    Nil,
    NotNil,
}

impl FilterOperation {
    pub fn parse(op: &str) -> Result<Self> {
        let operation = match op {
            "eq" => Self::Eq,
            "not_eq" => Self::NotEq,
            "contains" => Self::Contains,
            "starts_with" => Self::StartsWith,
            "ends_with" => Self::EndsWith,
            "in" => Self::In,
            "nil" => Self::Nil,
            "not_nil" => Self::NotNil,
            other => {
                return Err(AuthStoreError::bad_request_field(
                    format!("unknown filter operation '{}'", other),
                    "filter",
                ))
            }
        };
        Ok(operation)
    }

    fn is_pattern(&self) -> bool {
        matches!(self, Self::Contains | Self::StartsWith | Self::EndsWith)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    pub field: FilterField,
    pub operation: FilterOperation,
    pub values: Vec<FilterValue>,
}

impl Filter {
    pub fn new(field: &str, operation: &str, raw: &str) -> Result<Self> {
        let field = FilterField::parse(field)?;
        let operation = FilterOperation::parse(operation)?;

        if operation.is_pattern() && field.kind() != FieldKind::Text {
            return Err(AuthStoreError::bad_request_field(
                format!("'{}' does not support pattern matching", field.column()),
                "filter",
            ));
        }

        let values = match operation {
            FilterOperation::Nil | FilterOperation::NotNil => Vec::new(),
            FilterOperation::In => raw
                .split(',')
                .filter(|v| !v.is_empty())
                .map(|v| field.parse_value(v))
                .collect::<Result<Vec<_>>>()?,
            _ => vec![field.parse_value(raw)?],
        };

        if values.is_empty() && operation == FilterOperation::In {
            return Err(AuthStoreError::bad_request_field(
                format!("'in' filter on '{}' needs at least one value", field.column()),
                "filter",
            ));
        }

        Ok(Self { field, operation, values })
    }

    /// Evaluate against a decoded record; absent values never match a comparison
    pub fn matches(&self, auth: &Authentication) -> bool {
        let actual = self.field.value_of(auth);
        match self.operation {
            FilterOperation::Nil => actual.is_none(),
            FilterOperation::NotNil => actual.is_some(),
            _ => {
                let Some(actual) = actual else {
                    return false;
                };
                match self.operation {
                    FilterOperation::Eq => self.values.first() == Some(&actual),
                    FilterOperation::NotEq => self.values.first() != Some(&actual),
                    FilterOperation::In => self.values.contains(&actual),
                    _ => self.matches_pattern(&actual),
                }
            }
        }
    }

    fn matches_pattern(&self, actual: &FilterValue) -> bool {
        let (Some(haystack), Some(needle)) =
            (actual.as_lower_text(), self.values.first().and_then(FilterValue::as_lower_text))
        else {
            return false;
        };
        match self.operation {
            FilterOperation::Contains => haystack.contains(&needle),
            FilterOperation::StartsWith => haystack.starts_with(&needle),
            FilterOperation::EndsWith => haystack.ends_with(&needle),
            _ => false,
        }
    }

    fn push_sql(&self, qb: &mut QueryBuilder<'_, Sqlite>) {
        let column = self.field.column();
        qb.push(" AND ").push(column);

        match self.operation {
            FilterOperation::Nil => {
                qb.push(" IS NULL");
            }
            FilterOperation::NotNil => {
                qb.push(" IS NOT NULL");
            }
            FilterOperation::Eq | FilterOperation::NotEq => {
                qb.push(if self.operation == FilterOperation::Eq { " = " } else { " != " });
                if let Some(value) = self.values.first() {
                    push_value(qb, value);
                }
            }
            FilterOperation::In => {
                qb.push(" IN (");
                for (i, value) in self.values.iter().enumerate() {
                    if i > 0 {
                        qb.push(", ");
                    }
                    push_value(qb, value);
                }
                qb.push(")");
            }
            FilterOperation::Contains | FilterOperation::StartsWith | FilterOperation::EndsWith => {
                let needle = match self.values.first() {
                    Some(FilterValue::Text(s)) => escape_like(s),
                    _ => String::new(),
                };
                let pattern = match self.operation {
                    FilterOperation::Contains => format!("%{}%", needle),
                    FilterOperation::StartsWith => format!("{}%", needle),
                    _ => format!("%{}", needle),
                };
                qb.push(" LIKE ").push_bind(pattern).push(" ESCAPE '\\'");
            }
        }
    }
}

fn push_value(qb: &mut QueryBuilder<'_, Sqlite>, value: &FilterValue) {
    match value {
        FilterValue::Text(s) => qb.push_bind(s.clone()),
        FilterValue::Integer(i) => qb.push_bind(*i),
        FilterValue::Timestamp(ts) => qb.push_bind(*ts),
    };
}

fn escape_like(value: &str) -> String {
    value.replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Asc,
    Desc,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SortBy {
    pub field: FilterField,
    pub direction: SortDirection,
}

impl SortBy {
    /// Parse `field` or `field:asc|desc`
    pub fn parse(raw: &str) -> Result<Self> {
        let (name, direction) = match raw.split_once(':') {
            Some((name, "asc")) => (name, SortDirection::Asc),
            Some((name, "desc")) => (name, SortDirection::Desc),
            Some((_, other)) => {
                return Err(AuthStoreError::bad_request_field(
                    format!("invalid sort direction '{}'", other),
                    "sort_by",
                ))
            }
            None => (raw, SortDirection::Asc),
        };
        Ok(Self { field: FilterField::parse(name)?, direction })
    }
}

/// Parsed filters plus ordering
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilterSet {
    pub filters: Vec<Filter>,
    pub sort_by: Vec<SortBy>,
}

impl FilterSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse query pairs. Keys other than `filter[...]` and `sort_by` are ignored.
    pub fn from_query<I, K, V>(pairs: I) -> Result<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut set = Self::new();
        for (key, value) in pairs {
            let (key, value) = (key.as_ref(), value.as_ref());
            if key == "sort_by" {
                set.sort_by.push(SortBy::parse(value)?);
            } else if let Some(rest) = key.strip_prefix("filter") {
                let (field, operation) = parse_filter_key(rest)?;
                set.filters.push(Filter::new(field, operation, value)?);
            }
        }
        Ok(set)
    }

    pub fn with_filter(mut self, field: &str, operation: &str, value: &str) -> Result<Self> {
        self.filters.push(Filter::new(field, operation, value)?);
        Ok(self)
    }

    pub fn with_sort(mut self, raw: &str) -> Result<Self> {
        self.sort_by.push(SortBy::parse(raw)?);
        Ok(self)
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty() && self.sort_by.is_empty()
    }

    pub fn matches(&self, auth: &Authentication) -> bool {
        self.filters.iter().all(|f| f.matches(auth))
    }

    /// Append ` AND ...` predicates for every filter
    pub fn push_where(&self, qb: &mut QueryBuilder<'_, Sqlite>) {
        for filter in &self.filters {
            filter.push_sql(qb);
        }
    }

    /// Append the ORDER BY clause, identity ascending as the tiebreaker
    pub fn push_order_by(&self, qb: &mut QueryBuilder<'_, Sqlite>) {
        qb.push(" ORDER BY ");
        for sort in &self.sort_by {
            qb.push(sort.field.column());
            qb.push(match sort.direction {
                SortDirection::Asc => " ASC, ",
                SortDirection::Desc => " DESC, ",
            });
        }
        qb.push("id ASC");
    }

    /// In-memory equivalent of `push_order_by`; absent values sort first
    pub fn sort(&self, records: &mut [Authentication]) {
        records.sort_by(|a, b| {
            for sort in &self.sort_by {
                let ordering = compare_values(sort.field.value_of(a), sort.field.value_of(b));
                let ordering = match sort.direction {
                    SortDirection::Asc => ordering,
                    SortDirection::Desc => ordering.reverse(),
                };
                if ordering != Ordering::Equal {
                    return ordering;
                }
            }
            a.id.cmp(&b.id)
        });
    }
}

fn compare_values(a: Option<FilterValue>, b: Option<FilterValue>) -> Ordering {
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(a), Some(b)) => a.partial_cmp(&b).unwrap_or(Ordering::Equal),
    }
}

/// Split `[field]` or `[field][op]`
fn parse_filter_key(rest: &str) -> Result<(&str, &str)> {
    let malformed = || {
        AuthStoreError::bad_request_field(format!("malformed filter key 'filter{}'", rest), "filter")
    };

    let inner = rest.strip_prefix('[').ok_or_else(malformed)?;
    let (field, remainder) = inner.split_once(']').ok_or_else(malformed)?;
    if field.is_empty() {
        return Err(malformed());
    }
    if remainder.is_empty() {
        return Ok((field, "eq"));
    }

    let op = remainder
        .strip_prefix('[')
        .and_then(|r| r.strip_suffix(']'))
        .filter(|op| !op.is_empty() && !op.contains(['[', ']']))
        .ok_or_else(malformed)?;
    Ok((field, op))
}
