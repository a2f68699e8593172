//! Route handlers for the producer API.

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use serde::{Deserialize, Serialize};

use super::AppState;
use super::error::ApiError;
use crate::tabs::Tab;
use crate::viewer::{CreateTabRequest, Status};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateTabResponse {
    pub id: String,
    pub title: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub created: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TabSummary {
    pub id: String,
    pub title: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub active: bool,
}

impl From<&Tab> for TabSummary {
    fn from(tab: &Tab) -> Self {
        Self {
            id: tab.id.clone(),
            title: tab.title.clone(),
            kind: tab.kind.to_string(),
            active: tab.active,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListTabsResponse {
    pub tabs: Vec<TabSummary>,
}

/// `POST /api/tabs`
pub async fn create_tab(
    State(state): State<AppState>,
    payload: Result<Json<CreateTabRequest>, JsonRejection>,
) -> Result<Json<CreateTabResponse>, ApiError> {
    let Json(request) = payload.map_err(|e| ApiError::InvalidJson(e.body_text()))?;
    let (tab, created) = state.viewer.create_from_request(request).await?;

    Ok(Json(CreateTabResponse {
        id: tab.id,
        title: tab.title,
        kind: tab.kind.to_string(),
        created,
    }))
}

/// `GET /api/tabs`
pub async fn list_tabs(State(state): State<AppState>) -> Json<ListTabsResponse> {
    let tabs = state.viewer.tabs().list();
    Json(ListTabsResponse {
        tabs: tabs.iter().map(TabSummary::from).collect(),
    })
}

/// `GET /api/tabs/{id}`
pub async fn get_tab(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Tab>, ApiError> {
    state
        .viewer
        .tabs()
        .get(&id)
        .map(Json)
        .ok_or(ApiError::TabNotFound)
}

/// `DELETE /api/tabs/{id}`
pub async fn delete_tab(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    if state.viewer.delete_tab(&id).await {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::TabNotFound)
    }
}

/// `POST /api/tabs/{id}/activate`
pub async fn activate_tab(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    if state.viewer.activate_tab(&id).await {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::TabNotFound)
    }
}

/// `DELETE /api/tabs`
pub async fn clear_tabs(State(state): State<AppState>) -> StatusCode {
    state.viewer.clear_tabs().await;
    StatusCode::NO_CONTENT
}

/// `POST /api/tabs/reopen`
pub async fn reopen_tab(State(state): State<AppState>) -> Result<Json<Tab>, ApiError> {
    state
        .viewer
        .reopen_tab()
        .await
        .map(Json)
        .ok_or(ApiError::NothingToReopen)
}

/// `GET /api/status`
pub async fn status(State(state): State<AppState>) -> Json<Status> {
    Json(state.viewer.status().await)
}

/// `GET /health`
pub async fn health_check() -> &'static str {
    "OK"
}
