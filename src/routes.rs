use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tower_http::{cors::CorsLayer, services::ServeFile, trace::TraceLayer};
use tracing::info;

use crate::auth;
use crate::config::Config;
use crate::content;
use crate::error::ApiError;
use crate::feeds::{FeedDigest, FeedSource};
use crate::store::{Fields, Record, RecordStore};

pub const HEALTH_MESSAGE: &str = "AgentSmart Backend is running!";

pub struct AppState {
    pub config: Arc<Config>,
    pub feeds: Arc<dyn FeedSource>,
    /// `None` when no store client could be built; item routes answer 500.
    pub store: Option<Arc<dyn RecordStore>>,
}

pub fn router(state: Arc<AppState>) -> Router {
    let pages = state.config.static_dir.clone();

    Router::new()
        .route_service("/", ServeFile::new(pages.join("index.html")))
        .route_service("/dashboard", ServeFile::new(pages.join("dashboard.html")))
        .route_service("/airtable", ServeFile::new(pages.join("airtable-crud.html")))
        .route("/api/health", get(health))
        .route("/api/auth/login", post(login))
        .route("/api/intelligence/rss-feed", post(rss_feed))
        .route("/api/content/generate-social-post", post(generate_social_post))
        .route("/api/items", get(list_items).post(create_item))
        .route("/api/items/:id", put(update_item).delete(delete_item))
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

/// Absent, `null` and `""` all count as missing. Whitespace is a value.
fn required(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

pub async fn health() -> &'static str {
    HEALTH_MESSAGE
}

#[derive(Debug, Default, Deserialize)]
pub struct LoginRequest {
    pub email: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub message: &'static str,
    pub token: &'static str,
}

pub async fn login(
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<Json<LoginResponse>, ApiError> {
    // Only unparseable JSON is a 400; any other body just fails to match
    let request = match payload {
        Ok(Json(request)) => request,
        Err(JsonRejection::JsonSyntaxError(rejection)) => {
            return Err(ApiError::BadRequest(rejection.body_text()))
        }
        Err(_) => LoginRequest::default(),
    };
    info!("Login attempt: email={:?}", request.email);

    match auth::authenticate(request.email.as_deref(), request.password.as_deref()) {
        Some(token) => Ok(Json(LoginResponse {
            message: "Login successful (placeholder)",
            token,
        })),
        None => Err(ApiError::Unauthorized(
            "Invalid credentials (placeholder)".to_string(),
        )),
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedRequest {
    pub feed_url: Option<String>,
}

pub async fn rss_feed(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<FeedRequest>, JsonRejection>,
) -> Result<Json<FeedDigest>, ApiError> {
    let Json(request) = payload?;
    let feed_url = required(request.feed_url)
        .ok_or_else(|| ApiError::BadRequest("RSS feed URL is required.".to_string()))?;

    let feed = state.feeds.fetch(&feed_url).await?;
    info!("Successfully parsed RSS feed from: {}", feed_url);

    Ok(Json(FeedDigest::from_feed(&feed)))
}

#[derive(Debug, Default, Deserialize)]
pub struct SocialPostRequest {
    pub topic: Option<String>,
    pub tone: Option<String>,
    pub keywords: Option<Vec<String>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SocialPostResponse {
    pub generated_content: String,
    pub message: &'static str,
}

pub async fn generate_social_post(
    payload: Result<Json<SocialPostRequest>, JsonRejection>,
) -> Result<Json<SocialPostResponse>, ApiError> {
    let Json(request) = payload?;
    let topic = required(request.topic).ok_or_else(|| {
        ApiError::BadRequest("Topic is required for content generation.".to_string())
    })?;

    let generated_content = content::social_post_draft(
        &topic,
        request.tone.as_deref(),
        request.keywords.as_deref(),
    );

    Ok(Json(SocialPostResponse {
        generated_content,
        message: "Social media post draft generated (placeholder).",
    }))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableQuery {
    pub table_name: Option<String>,
}

impl AppState {
    /// Query parameter first, then the configured default table.
    fn resolve_table(&self, query: TableQuery) -> Result<String, ApiError> {
        required(query.table_name)
            .or_else(|| self.config.airtable.default_table.clone())
            .ok_or_else(|| {
                ApiError::InvalidItem("Table name not specified or configured.".to_string())
            })
    }

    fn store(&self) -> Result<&Arc<dyn RecordStore>, ApiError> {
        self.store.as_ref().ok_or(ApiError::StoreNotConfigured)
    }
}

fn record_id(id: String) -> Result<String, ApiError> {
    required(Some(id)).ok_or_else(|| ApiError::InvalidItem("Record ID not provided.".to_string()))
}

/// A non-empty JSON object, or `InvalidItem(missing)`.
fn item_fields(
    payload: Result<Json<Value>, JsonRejection>,
    missing: &str,
) -> Result<Fields, ApiError> {
    match payload {
        Ok(Json(Value::Object(fields))) if !fields.is_empty() => Ok(fields),
        _ => Err(ApiError::InvalidItem(missing.to_string())),
    }
}

pub async fn list_items(
    State(state): State<Arc<AppState>>,
    Query(query): Query<TableQuery>,
) -> Result<Json<Vec<Record>>, ApiError> {
    let table = state.resolve_table(query)?;
    let store = state.store()?;

    let records = store
        .list(&table)
        .await
        .map_err(|source| ApiError::Store {
            message: "Failed to fetch data from Airtable.",
            source,
        })?;

    Ok(Json(records))
}

pub async fn create_item(
    State(state): State<Arc<AppState>>,
    Query(query): Query<TableQuery>,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let table = state.resolve_table(query)?;
    let fields = item_fields(payload, "No item data provided.")?;
    let store = state.store()?;

    let record = store
        .create(&table, fields)
        .await
        .map_err(|source| ApiError::Store {
            message: "Failed to create record in Airtable.",
            source,
        })?;
    info!("Created record {} in table '{}'", record.id, table);

    Ok((StatusCode::CREATED, Json(record)))
}

pub async fn update_item(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Query(query): Query<TableQuery>,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<Json<Record>, ApiError> {
    let table = state.resolve_table(query)?;
    let id = record_id(id)?;
    let fields = item_fields(payload, "No update data provided.")?;
    let store = state.store()?;

    let record = store
        .update(&table, &id, fields)
        .await
        .map_err(|source| ApiError::Store {
            message: "Failed to update record in Airtable.",
            source,
        })?;

    Ok(Json(record))
}

#[derive(Debug, Serialize)]
pub struct DeleteResponse {
    pub message: String,
}

pub async fn delete_item(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Query(query): Query<TableQuery>,
) -> Result<Json<DeleteResponse>, ApiError> {
    let table = state.resolve_table(query)?;
    let id = record_id(id)?;
    let store = state.store()?;

    store
        .delete(&table, &id)
        .await
        .map_err(|source| ApiError::Store {
            message: "Failed to delete record from Airtable.",
            source,
        })?;
    info!("Deleted record {} from table '{}'", id, table);

    Ok(Json(DeleteResponse {
        message: format!("Record {} deleted successfully.", id),
    }))
}
