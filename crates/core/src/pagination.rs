use serde::{Deserialize, Serialize};

/// Upper bound on a single page, whatever the caller asks for
pub const MAX_PAGE_SIZE: u64 = 100;

/// Pagination parameters for list queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct Pagination {
    pub offset: u64,
    pub limit: u64,
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            offset: 0,
            limit: 15,
        }
    }
}

impl Pagination {
    /// One-based page number with a fixed page size
    pub fn page(page: u64, per_page: u64) -> Self {
        let limit = per_page.clamp(1, MAX_PAGE_SIZE);
        Self {
            offset: page.saturating_sub(1).saturating_mul(limit),
            limit,
        }
    }

    pub(crate) fn sql_limit(&self) -> i64 {
        self.limit.clamp(1, MAX_PAGE_SIZE) as i64
    }

    pub(crate) fn sql_offset(&self) -> i64 {
        i64::try_from(self.offset).unwrap_or(i64::MAX)
    }
}

/// A paginated result set.
#[derive(Debug, Clone, Serialize)]
pub struct PaginatedResult<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub offset: u64,
    pub limit: u64,
}

impl<T> PaginatedResult<T> {
    pub(crate) fn new(items: Vec<T>, total: i64, page: Pagination) -> Self {
        Self {
            items,
            total: total.max(0) as u64,
            offset: page.offset,
            limit: page.sql_limit() as u64,
        }
    }

    pub fn has_more(&self) -> bool {
        self.offset + (self.items.len() as u64) < self.total
    }
}
