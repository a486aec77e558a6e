//! List query parsing: pagination window and ordering.

use crate::{Error, Result};
use serde::Deserialize;
use std::fmt;

/// Raw pagination and ordering parameters as they arrive on the query string.
///
/// Values stay as strings so malformed input produces a validation error
/// naming the offending parameter instead of a generic decode failure.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct PageParams {
    pub limit: Option<String>,
    pub offset: Option<String>,
    pub page: Option<String>,
    pub orderby: Option<String>,
    #[serde(rename = "sortOrder")]
    pub sort_order: Option<String>,
}

/// Rows to skip and the maximum number to return.
///
/// Both fit SQLite's signed 64-bit `LIMIT`/`OFFSET`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Window {
    /// `None` means unlimited.
    pub limit: Option<i64>,
    pub offset: i64,
}

/// Sortable profile columns.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OrderBy {
    Id,
    #[default]
    Name,
    Description,
    Type,
    Cdn,
    CdnName,
    RoutingDisabled,
    LastUpdated,
}

impl OrderBy {
    pub const ALL: [OrderBy; 8] = [
        Self::Id,
        Self::Name,
        Self::Description,
        Self::Type,
        Self::Cdn,
        Self::CdnName,
        Self::RoutingDisabled,
        Self::LastUpdated,
    ];

    pub fn parse(s: &str) -> Result<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|o| o.as_str() == s)
            .ok_or_else(|| {
                let allowed: Vec<&str> = Self::ALL.iter().map(|o| o.as_str()).collect();
                Error::query("orderby", format!("must be one of: {}", allowed.join(", ")))
            })
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Id => "id",
            Self::Name => "name",
            Self::Description => "description",
            Self::Type => "type",
            Self::Cdn => "cdn",
            Self::CdnName => "cdnName",
            Self::RoutingDisabled => "routingDisabled",
            Self::LastUpdated => "lastUpdated",
        }
    }
}

impl fmt::Display for OrderBy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

impl SortOrder {
    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "asc" => Ok(Self::Asc),
            "desc" => Ok(Self::Desc),
            _ => Err(Error::query("sortOrder", "must be 'asc' or 'desc'")),
        }
    }

    pub fn as_sql(&self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }
}

/// A fully validated list request shape.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ListQuery {
    pub window: Window,
    pub order_by: OrderBy,
    pub sort_order: SortOrder,
}

fn parse_int(name: &str, raw: &str) -> Result<i64> {
    raw.trim()
        .parse::<i64>()
        .map_err(|_| Error::query(name, "must be an integer"))
}

fn parse_positive(name: &str, raw: &str) -> Result<i64> {
    match parse_int(name, raw) {
        Ok(n) if n >= 1 => Ok(n),
        _ => Err(Error::query(name, "must be a positive integer")),
    }
}

impl PageParams {
    /// Validate and resolve into a [`ListQuery`].
    ///
    /// - `limit` is -1 (unlimited) or non-negative.
    /// - `offset` and `page` are positive and mutually exclusive.
    /// - `page` requires a finite `limit`.
    pub fn resolve(&self) -> Result<ListQuery> {
        let limit = match self.limit.as_deref() {
            None => None,
            Some(raw) => match parse_int("limit", raw)? {
                -1 => None,
                n if n < -1 => return Err(Error::query("limit", "must be bigger than -1")),
                n => Some(n),
            },
        };

        let offset = match (self.offset.as_deref(), self.page.as_deref()) {
            (Some(_), Some(_)) => {
                return Err(Error::query(
                    "page",
                    "cannot be combined with offset",
                ));
            }
            (Some(raw), None) => parse_positive("offset", raw)?,
            (None, Some(raw)) => {
                let page = parse_positive("page", raw)?;
                let Some(limit) = limit else {
                    return Err(Error::query("page", "requires a limit"));
                };
                (page - 1)
                    .checked_mul(limit)
                    .ok_or_else(|| Error::query("page", "is out of range"))?
            }
            (None, None) => 0,
        };

        let order_by = match self.orderby.as_deref() {
            Some(raw) => OrderBy::parse(raw)?,
            None => OrderBy::default(),
        };
        let sort_order = match self.sort_order.as_deref() {
            Some(raw) => SortOrder::parse(raw)?,
            None => SortOrder::default(),
        };

        Ok(ListQuery {
            window: Window { limit, offset },
            order_by,
            sort_order,
        })
    }
}
