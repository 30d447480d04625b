use axum::{
    Json,
    http::{HeaderValue, header::HeaderMap},
    response::{IntoResponse, Response},
};
use serde::Serialize;
use utoipa::ToSchema;

/// A normalized page request. Both fields are always at least 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    pub page: u64,
    pub size: u64,
}

impl Pagination {
    /// Resolve a client page request.
    ///
    /// Missing or zero values fall back to page 1 and `default_size`; the size is then clamped to
    /// `max_size` (the default itself included).
    #[must_use]
    pub fn normalize(
        page: Option<u64>,
        size: Option<u64>,
        default_size: u64,
        max_size: u64,
    ) -> Self {
        let max_size = max_size.max(1);
        let page = page.filter(|page| *page > 0).unwrap_or(1);
        let size = size
            .filter(|size| *size > 0)
            .unwrap_or(default_size)
            .clamp(1, max_size);
        Self { page, size }
    }

    /// Rows to skip before this page
    #[must_use]
    pub fn skip(&self) -> u64 {
        (self.page - 1).saturating_mul(self.size)
    }

    #[must_use]
    pub fn total_pages(&self, total_count: u64) -> u64 {
        total_count.div_ceil(self.size)
    }
}

/// One page of results
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PaginatedResult<T> {
    pub page: u64,
    pub total_pages: u64,
    pub total_count: u64,
    pub data: Vec<T>,
}

impl<T> PaginatedResult<T> {
    #[must_use]
    pub fn new(pagination: Pagination, total_count: u64, data: Vec<T>) -> Self {
        Self {
            page: pagination.page,
            total_pages: pagination.total_pages(total_count),
            total_count,
            data,
        }
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> PaginatedResult<U> {
        PaginatedResult {
            page: self.page,
            total_pages: self.total_pages,
            total_count: self.total_count,
            data: self.data.into_iter().map(f).collect(),
        }
    }

    /// `Content-Range: <resource> <first>-<last>/<total>` for this page.
    ///
    /// `size` is the page size the result was fetched with.
    #[must_use]
    pub fn content_range(&self, resource_name: &str, size: u64) -> HeaderMap {
        let safe_name: String = resource_name
            .chars()
            .filter(|c| c.is_ascii() && !c.is_ascii_control())
            .collect();
        let first = self.page.saturating_sub(1).saturating_mul(size);
        let last = if self.data.is_empty() {
            first
        } else {
            first + self.data.len() as u64 - 1
        };

        let mut headers = HeaderMap::new();
        if let Ok(value) =
            HeaderValue::from_str(&format!("{safe_name} {first}-{last}/{}", self.total_count))
        {
            headers.insert("Content-Range", value);
        }
        headers
    }
}

impl<T: Serialize> IntoResponse for PaginatedResult<T> {
    fn into_response(self) -> Response {
        Json(self).into_response()
    }
}
