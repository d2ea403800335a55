use serde::{Deserialize, Serialize};

use crate::models::errors::AppError;

pub const DEFAULT_LIMIT: u32 = 20;
pub const MAX_LIMIT: u32 = 100;

/// Optional `page`/`limit` query parameters for collection endpoints
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct PageQuery {
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

/// A validated page window
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub struct Page {
    pub page: u32,
    pub limit: u32,
}

impl Page {
    pub fn offset(&self) -> i64 {
        i64::from(self.page - 1) * i64::from(self.limit)
    }
}

impl PageQuery {
    /// Resolves the query into a page window. `None` means the caller asked
    /// for the whole collection.
    pub fn resolve(&self) -> Result<Option<Page>, AppError> {
        if self.page.is_none() && self.limit.is_none() {
            return Ok(None);
        }

        let page = self.page.unwrap_or(1);
        if page == 0 {
            return Err(AppError::validation_failed("page must be at least 1"));
        }

        let limit = self.limit.unwrap_or(DEFAULT_LIMIT);
        if !(1..=MAX_LIMIT).contains(&limit) {
            return Err(AppError::validation_failed(format!(
                "limit must be between 1 and {}",
                MAX_LIMIT
            )));
        }

        Ok(Some(Page { page, limit }))
    }
}

/// Pagination metadata echoed in list responses
#[derive(Debug, Clone, Copy, Serialize)]
pub struct PageInfo {
    pub page: u32,
    pub limit: u32,
    pub total: i64,
}

impl PageInfo {
    pub fn new(page: Page, total: i64) -> Self {
        Self {
            page: page.page,
            limit: page.limit,
            total,
        }
    }
}
