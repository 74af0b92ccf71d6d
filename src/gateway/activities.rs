//! Activity handlers: history, live stream, submission.

use super::{ApiError, AppState};
use crate::feed::Page;
use crate::types::{Activity, ActivityId, ActivityInput, ActivityKind, CreateActivity};
use axum::body::{Body, Bytes};
use axum::extract::{Query, State};
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::SecondsFormat;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Default, Deserialize)]
pub(crate) struct ListQuery {
    cursor: Option<String>,
    kind: Option<String>,
    limit: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ListResponse {
    activities: Vec<Activity>,
    next_cursor: Option<String>,
}

impl From<Page> for ListResponse {
    fn from(page: Page) -> Self {
        Self {
            activities: page.activities,
            next_cursor: page.next_cursor.map(|id| id.to_string()),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct StreamQuery {
    last_id: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct CreatedResponse {
    id: ActivityId,
    created_at: String,
}

/// Parse an optional numeric id, treating anything unparsable as absent.
fn parse_id(raw: Option<&str>) -> Option<ActivityId> {
    raw.and_then(|value| value.parse().ok())
}

pub(crate) async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

/// `GET /activities?cursor&kind&limit`
pub(crate) async fn list_activities(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<Json<ListResponse>, ApiError> {
    let cursor = parse_id(query.cursor.as_deref());
    let limit = query.limit.as_deref().and_then(|raw| raw.trim().parse().ok());

    let kind = match query.kind.as_deref() {
        None | Some("") => None,
        Some(raw) => match raw.parse::<ActivityKind>() {
            Ok(kind) => Some(kind),
            // No stored activity can have an unknown kind.
            Err(_) => {
                return Ok(Json(ListResponse {
                    activities: Vec::new(),
                    next_cursor: None,
                }))
            }
        },
    };

    let feed = Arc::clone(&state.feed);
    let page = tokio::task::spawn_blocking(move || feed.page(cursor, kind, limit))
        .await
        .map_err(|e| ApiError::Internal(format!("query task failed: {e}")))??;

    Ok(Json(page.into()))
}

/// `GET /activities/stream?lastId=N`
pub(crate) async fn stream_activities(
    State(state): State<AppState>,
    Query(query): Query<StreamQuery>,
) -> Response {
    let since = parse_id(query.last_id.as_deref());
    let listener = state.feed.connect(since).await;

    let mut response = Body::from_stream(listener).into_response();
    let headers = response.headers_mut();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("text/event-stream"),
    );
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    headers.insert(header::CONNECTION, HeaderValue::from_static("keep-alive"));
    headers.insert("x-accel-buffering", HeaderValue::from_static("no"));
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_ORIGIN,
        HeaderValue::from_static("*"),
    );
    response
}

/// `POST /activities`
pub(crate) async fn create_activity(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<(StatusCode, Json<CreatedResponse>), ApiError> {
    state.auth.authorize(&headers)?;

    let raw: CreateActivity = serde_json::from_slice(&body)
        .map_err(|_| ApiError::BadRequest("Invalid JSON body".into()))?;
    let input = ActivityInput::try_from(raw)?;

    let feed = Arc::clone(&state.feed);
    let activity = tokio::task::spawn_blocking(move || feed.submit(input))
        .await
        .map_err(|e| ApiError::Internal(format!("submit task failed: {e}")))??;

    Ok((
        StatusCode::CREATED,
        Json(CreatedResponse {
            id: activity.id,
            created_at: activity
                .created_at
                .to_rfc3339_opts(SecondsFormat::Millis, true),
        }),
    ))
}
