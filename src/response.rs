use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::error::AppError;

/// Page size used when the client does not send one.
pub const DEFAULT_LIMIT: i64 = 10;
/// Largest page size a client may request.
pub const MAX_LIMIT: i64 = 100;

pub type ApiResult<T> = Result<ApiResponse<T>, AppError>;

/// Envelope
///
/// The success body shared by every endpoint:
/// `{success: true, message?, data?, pagination?}`.
#[derive(Debug, Serialize, Deserialize)]
pub struct Envelope<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pagination: Option<Pagination>,
}

/// ApiResponse
///
/// A status code plus an [`Envelope`]. Handlers build one with `ok`/`created`
/// and optionally attach a message or pagination metadata.
#[derive(Debug)]
pub struct ApiResponse<T> {
    status: StatusCode,
    body: Envelope<T>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self::with_status(StatusCode::OK, Some(data))
    }

    pub fn created(data: T) -> Self {
        Self::with_status(StatusCode::CREATED, Some(data))
    }

    pub fn paginated(data: T, pagination: Pagination) -> Self {
        let mut response = Self::ok(data);
        response.body.pagination = Some(pagination);
        response
    }

    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.body.message = Some(message.into());
        self
    }

    fn with_status(status: StatusCode, data: Option<T>) -> Self {
        Self {
            status,
            body: Envelope {
                success: true,
                message: None,
                data,
                pagination: None,
            },
        }
    }
}

impl ApiResponse<()> {
    /// An acknowledgment without payload, e.g. after a delete.
    pub fn acknowledged(message: impl Into<String>) -> Self {
        Self::with_status(StatusCode::OK, None).message(message)
    }
}

impl<T: Serialize> IntoResponse for ApiResponse<T> {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

/// PageRequest
///
/// A validated `page`/`limit` pair. Both are at least 1 and `limit` is capped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: i64,
    pub limit: i64,
}

impl Default for PageRequest {
    fn default() -> Self {
        Self {
            page: 1,
            limit: DEFAULT_LIMIT,
        }
    }
}

impl PageRequest {
    /// Parses raw query values leniently: anything that is not a positive integer
    /// falls back to the default.
    pub fn parse(page: Option<&str>, limit: Option<&str>) -> Self {
        let positive = |raw: Option<&str>| {
            raw.and_then(|v| v.trim().parse::<i64>().ok())
                .filter(|v| *v >= 1)
        };
        Self {
            page: positive(page).unwrap_or(1),
            limit: positive(limit).unwrap_or(DEFAULT_LIMIT).min(MAX_LIMIT),
        }
    }

    pub fn offset(&self) -> i64 {
        (self.page - 1).saturating_mul(self.limit)
    }
}

/// Page
///
/// One slice of a listing plus the total row count across all pages.
#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: i64,
}

/// Pagination
///
/// Metadata attached to list responses. `totalPages` is `ceil(total / limit)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Pagination {
    pub page: i64,
    pub limit: i64,
    pub total: i64,
    #[serde(rename = "totalPages")]
    pub total_pages: i64,
}

impl Pagination {
    pub fn new(request: PageRequest, total: i64) -> Self {
        let total = total.max(0);
        Self {
            page: request.page,
            limit: request.limit,
            total,
            total_pages: (total + request.limit - 1) / request.limit,
        }
    }
}
