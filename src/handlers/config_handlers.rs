// handlers/config_handlers.rs
use std::collections::HashMap;

use axum::{
    extract::{OriginalUri, Path, Query, State},
    http::StatusCode,
    response::Json,
};
use serde::Deserialize;
use tracing::info;
use uuid::Uuid;

use crate::dtos::{ApiResponse, PagedResponse};
use crate::errors::{AppError, Result};
use crate::filter::{EntitySchema, Pageable};
use crate::models::{ConfigPatch, ConfigResponse, CreateConfigRequest, Environment};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct EnvironmentQuery {
    pub environment: Environment,
}

fn parse_config_id(raw: &str) -> Result<Uuid> {
    Uuid::parse_str(raw.trim()).map_err(|_| AppError::ValidationError(format!("'{}' is not a valid config id", raw)))
}

pub async fn get_config(
    State(state): State<AppState>,
    Path(shortcode): Path<String>,
    Query(query): Query<EnvironmentQuery>,
) -> Result<Json<ApiResponse<ConfigResponse>>> {
    let config = state.configs.get_active_config(&shortcode, query.environment).await?;
    Ok(Json(ApiResponse::success(
        ConfigResponse::from(&config),
        "Configuration retrieved successfully",
    )))
}

pub async fn create_config(
    State(state): State<AppState>,
    Json(request): Json<CreateConfigRequest>,
) -> Result<(StatusCode, Json<ApiResponse<ConfigResponse>>)> {
    info!("Creating config for shortcode: {}", request.shortcode);
    let config = state.configs.create_config(request).await?;
    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::success(
            ConfigResponse::from(&config),
            "Configuration created successfully",
        )),
    ))
}

pub async fn update_config(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(patch): Json<ConfigPatch>,
) -> Result<Json<ApiResponse<ConfigResponse>>> {
    let id = parse_config_id(&id)?;
    let config = state.configs.update_config(id, patch).await?;
    Ok(Json(ApiResponse::success(
        ConfigResponse::from(&config),
        "Configuration updated successfully",
    )))
}

pub async fn deactivate_config(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<ConfigResponse>>> {
    let id = parse_config_id(&id)?;
    let config = state.configs.deactivate_config(id).await?;
    Ok(Json(ApiResponse::success(
        ConfigResponse::from(&config),
        "Configuration deactivated successfully",
    )))
}

pub async fn list_configs(
    State(state): State<AppState>,
    OriginalUri(uri): OriginalUri,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Json<ApiResponse<PagedResponse<ConfigResponse>>>> {
    // Ordered by shortcode then environment; only page and size apply.
    let pageable = Pageable::from_params(&EntitySchema::new("config", Vec::new()), &params)?;
    let page = state.configs.list_active_configs(&pageable).await?;
    let paged = PagedResponse::from_page(page.map(|c| ConfigResponse::from(&c)), uri.path());
    Ok(Json(ApiResponse::success(paged, "Configurations retrieved successfully")))
}
