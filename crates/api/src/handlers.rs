//! API request handlers

use crate::{ApiError, SharedState};
use axum::{
    extract::{Path, Query, State},
    http::{header::AUTHORIZATION, HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use bookbase_database::{
    bundled_migrations, AuthorFilter, AuthorSort, AuthorUpdate, BookFilter, BookSort, BookUpdate,
    NewAuthor, NewBook, NewUserBook, Pagination, ReadingStatus, SortDirection, UserBookUpdate,
};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{info, warn};

type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn ok(data: T) -> Json<Self> {
        Json(Self {
            success: true,
            data: Some(data),
            error: None,
        })
    }
}

/// Health check endpoint
pub async fn health_check(State(state): State<SharedState>) -> impl IntoResponse {
    let healthy = state.db.health_check().await;
    let status = if healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (
        status,
        Json(serde_json::json!({
            "status": if healthy { "healthy" } else { "unhealthy" },
            "provider": state.db.provider(),
            "version": env!("CARGO_PKG_VERSION")
        })),
    )
}

/// Active provider and its ledger table
pub async fn current_provider(State(state): State<SharedState>) -> impl IntoResponse {
    let provider = state.db.provider();
    ApiResponse::ok(serde_json::json!({
        "provider": provider,
        "ledger_table": provider.ledger_table(),
    }))
}

// ==================== Books ====================

#[derive(Debug, Deserialize)]
pub struct BookQuery {
    title: Option<String>,
    author_id: Option<i64>,
    author: Option<String>,
    genre: Option<String>,
    min_rating: Option<f64>,
    published_after: Option<i32>,
    published_before: Option<i32>,
    q: Option<String>,
    #[serde(default)]
    sort: BookSort,
    #[serde(default)]
    direction: SortDirection,
    page: Option<u32>,
    per_page: Option<u32>,
}

impl BookQuery {
    fn into_parts(self) -> (BookFilter, Pagination, BookSort, SortDirection) {
        let pagination = pagination(self.page, self.per_page);
        let filter = BookFilter {
            title: self.title,
            author_id: self.author_id,
            author_name: self.author,
            genre: self.genre,
            min_rating: self.min_rating,
            published_after: self.published_after,
            published_before: self.published_before,
            query: self.q,
        };
        (filter, pagination, self.sort, self.direction)
    }
}

fn pagination(page: Option<u32>, per_page: Option<u32>) -> Pagination {
    let defaults = Pagination::default();
    Pagination::new(
        page.unwrap_or(defaults.page),
        per_page.unwrap_or(defaults.per_page),
    )
}

/// Search books
pub async fn list_books(
    State(state): State<SharedState>,
    Query(query): Query<BookQuery>,
) -> ApiResult<impl IntoResponse> {
    let (filter, pagination, sort, direction) = query.into_parts();
    let page = state.db.books().search(&filter, pagination, sort, direction).await?;
    Ok(ApiResponse::ok(page))
}

/// Get a book with its author
pub async fn get_book(
    State(state): State<SharedState>,
    Path(id): Path<i64>,
) -> ApiResult<impl IntoResponse> {
    state
        .db
        .books()
        .find_with_author(id)
        .await?
        .map(ApiResponse::ok)
        .ok_or_else(|| ApiError::NotFound(format!("Book: {}", id)))
}

pub async fn create_book(
    State(state): State<SharedState>,
    Json(book): Json<NewBook>,
) -> ApiResult<impl IntoResponse> {
    let book = state.db.books().create(&book).await?;
    info!(book_id = book.id, "Created book");
    Ok((StatusCode::CREATED, ApiResponse::ok(book)))
}

pub async fn update_book(
    State(state): State<SharedState>,
    Path(id): Path<i64>,
    Json(update): Json<BookUpdate>,
) -> ApiResult<impl IntoResponse> {
    state
        .db
        .books()
        .update(id, &update)
        .await?
        .map(ApiResponse::ok)
        .ok_or_else(|| ApiError::NotFound(format!("Book: {}", id)))
}

pub async fn delete_book(
    State(state): State<SharedState>,
    Path(id): Path<i64>,
) -> ApiResult<impl IntoResponse> {
    if state.db.books().delete(id).await? {
        Ok(ApiResponse::ok(serde_json::json!({ "deleted": id })))
    } else {
        Err(ApiError::NotFound(format!("Book: {}", id)))
    }
}

pub async fn book_stats(State(state): State<SharedState>) -> ApiResult<impl IntoResponse> {
    Ok(ApiResponse::ok(state.db.books().stats().await?))
}

#[derive(Debug, Deserialize)]
pub struct FeaturedQuery {
    #[serde(default = "default_featured")]
    limit: u32,
}

const MAX_FEATURED: u32 = 50;

fn default_featured() -> u32 {
    10
}

pub async fn featured_books(
    State(state): State<SharedState>,
    Query(query): Query<FeaturedQuery>,
) -> ApiResult<impl IntoResponse> {
    let limit = query.limit.clamp(1, MAX_FEATURED);
    Ok(ApiResponse::ok(state.db.books().featured(limit).await?))
}

// ==================== Authors ====================

#[derive(Debug, Deserialize)]
pub struct AuthorQuery {
    name: Option<String>,
    nationality: Option<String>,
    #[serde(default)]
    sort: AuthorSort,
    #[serde(default)]
    direction: SortDirection,
    page: Option<u32>,
    per_page: Option<u32>,
}

pub async fn list_authors(
    State(state): State<SharedState>,
    Query(query): Query<AuthorQuery>,
) -> ApiResult<impl IntoResponse> {
    let filter = AuthorFilter {
        name: query.name,
        nationality: query.nationality,
    };
    let page = state
        .db
        .authors()
        .search(&filter, pagination(query.page, query.per_page), query.sort, query.direction)
        .await?;
    Ok(ApiResponse::ok(page))
}

pub async fn get_author(
    State(state): State<SharedState>,
    Path(id): Path<i64>,
) -> ApiResult<impl IntoResponse> {
    state
        .db
        .authors()
        .find_by_id(id)
        .await?
        .map(ApiResponse::ok)
        .ok_or_else(|| ApiError::NotFound(format!("Author: {}", id)))
}

pub async fn create_author(
    State(state): State<SharedState>,
    Json(author): Json<NewAuthor>,
) -> ApiResult<impl IntoResponse> {
    let author = state.db.authors().create(&author).await?;
    info!(author_id = author.id, "Created author");
    Ok((StatusCode::CREATED, ApiResponse::ok(author)))
}

pub async fn update_author(
    State(state): State<SharedState>,
    Path(id): Path<i64>,
    Json(update): Json<AuthorUpdate>,
) -> ApiResult<impl IntoResponse> {
    state
        .db
        .authors()
        .update(id, &update)
        .await?
        .map(ApiResponse::ok)
        .ok_or_else(|| ApiError::NotFound(format!("Author: {}", id)))
}

/// Delete an author; 409 while books still reference it
pub async fn delete_author(
    State(state): State<SharedState>,
    Path(id): Path<i64>,
) -> ApiResult<impl IntoResponse> {
    if state.db.authors().delete(id).await? {
        Ok(ApiResponse::ok(serde_json::json!({ "deleted": id })))
    } else {
        Err(ApiError::NotFound(format!("Author: {}", id)))
    }
}

pub async fn author_stats(State(state): State<SharedState>) -> ApiResult<impl IntoResponse> {
    Ok(ApiResponse::ok(state.db.authors().stats().await?))
}

// ==================== Shelves ====================

#[derive(Debug, Deserialize)]
pub struct ShelfQuery {
    status: Option<ReadingStatus>,
    page: Option<u32>,
    per_page: Option<u32>,
}

pub async fn user_shelf(
    State(state): State<SharedState>,
    Path(user_id): Path<i64>,
    Query(query): Query<ShelfQuery>,
) -> ApiResult<impl IntoResponse> {
    let page = state
        .db
        .user_books()
        .list_for_user(user_id, query.status, pagination(query.page, query.per_page))
        .await?;
    Ok(ApiResponse::ok(page))
}

pub async fn user_shelf_stats(
    State(state): State<SharedState>,
    Path(user_id): Path<i64>,
) -> ApiResult<impl IntoResponse> {
    Ok(ApiResponse::ok(state.db.user_books().stats(user_id).await?))
}

pub async fn create_shelf_entry(
    State(state): State<SharedState>,
    Json(entry): Json<NewUserBook>,
) -> ApiResult<impl IntoResponse> {
    let entry = state.db.user_books().create(&entry).await?;
    Ok((StatusCode::CREATED, ApiResponse::ok(entry)))
}

pub async fn update_shelf_entry(
    State(state): State<SharedState>,
    Path(id): Path<i64>,
    Json(update): Json<UserBookUpdate>,
) -> ApiResult<impl IntoResponse> {
    state
        .db
        .user_books()
        .update(id, &update)
        .await?
        .map(ApiResponse::ok)
        .ok_or_else(|| ApiError::NotFound(format!("Shelf entry: {}", id)))
}

pub async fn delete_shelf_entry(
    State(state): State<SharedState>,
    Path(id): Path<i64>,
) -> ApiResult<impl IntoResponse> {
    if state.db.user_books().delete(id).await? {
        Ok(ApiResponse::ok(serde_json::json!({ "deleted": id })))
    } else {
        Err(ApiError::NotFound(format!("Shelf entry: {}", id)))
    }
}

// ==================== Migrations (admin) ====================

/// Check the bearer token against the configured admin token
fn require_admin(state: &SharedState, headers: &HeaderMap) -> ApiResult<()> {
    let Some(expected) = state.admin_token.as_deref() else {
        return Err(ApiError::Forbidden);
    };
    let presented = headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim);
    if presented.is_some_and(|token| tokens_match(token, expected)) {
        Ok(())
    } else {
        warn!("Rejected migration request with missing or invalid admin token");
        Err(ApiError::Unauthorized)
    }
}

/// Constant-time token comparison. Both sides are hashed first so the
/// comparison length does not depend on the secret.
fn tokens_match(presented: &str, expected: &str) -> bool {
    let presented = Sha256::digest(presented.as_bytes());
    let expected = Sha256::digest(expected.as_bytes());
    presented
        .iter()
        .zip(expected.iter())
        .fold(0u8, |acc, (a, b)| acc | (a ^ b))
        == 0
}

pub async fn migration_status(
    State(state): State<SharedState>,
    headers: HeaderMap,
) -> ApiResult<impl IntoResponse> {
    require_admin(&state, &headers)?;
    let status = state.db.ledger().status(&bundled_migrations()).await?;
    Ok(ApiResponse::ok(status))
}

pub async fn apply_migrations(
    State(state): State<SharedState>,
    headers: HeaderMap,
) -> ApiResult<impl IntoResponse> {
    require_admin(&state, &headers)?;
    let report = state.db.ledger().apply(&bundled_migrations()).await?;
    info!(provider = %report.provider, applied = report.applied.len(), "Migrations applied over HTTP");
    Ok(ApiResponse::ok(report))
}

#[derive(Debug, Default, Deserialize)]
pub struct ResetRequest {
    #[serde(default)]
    confirm: bool,
}

pub async fn reset_migrations(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Json(request): Json<ResetRequest>,
) -> ApiResult<impl IntoResponse> {
    require_admin(&state, &headers)?;
    let ledger = state.db.ledger();
    ledger.reset(request.confirm).await?;
    warn!(provider = %ledger.provider(), "Migration ledger reset over HTTP");
    Ok(ApiResponse::ok(serde_json::json!({
        "provider": ledger.provider(),
        "reset": true,
    })))
}
