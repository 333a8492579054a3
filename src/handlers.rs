use crate::errors::AppError;
use crate::models::{
    ActivityEntry, BackgroundRequest, ContainerSize, LeaderboardEntry, LifecycleEvent,
    LifecycleRequest, MutationResponse, NewPlayerRequest, OverviewResponse, PlayerPatch,
    PlayerRecord, ResizeRequest, SaveStatus, Settings, ShareCodeRequest, ShareCodeResponse,
    ToggleRequest,
};
use crate::render::{RenderOptions, RenderTarget, render_target};
use crate::state::AppState;
use crate::stats::{self, LEADERBOARD_SIZE, SortMode};
use crate::ui::render_index;
use axum::{
    Json,
    extract::{Path, Query, State},
    http::{StatusCode, header},
    response::{Html, IntoResponse},
};
use chrono::Local;
use serde::Deserialize;
use std::collections::BTreeMap;
use tracing::{debug, warn};

#[derive(Debug, Default, Deserialize)]
pub struct SortQuery {
    pub sort: Option<SortMode>,
}

#[derive(Debug, Default, Deserialize)]
pub struct LeaderboardQuery {
    pub sort: Option<SortMode>,
    pub limit: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
pub struct FragmentQuery {
    pub sort: Option<SortMode>,
    pub board: Option<SortMode>,
}

pub async fn index(
    State(state): State<AppState>,
    Query(query): Query<SortQuery>,
) -> Html<String> {
    let notice = state.status.lock().await.notice.clone();
    let tracker = state.tracker.lock().await;
    Html(render_index(&tracker, query.sort.unwrap_or_default(), notice.as_deref()))
}

pub async fn list_players(
    State(state): State<AppState>,
    Query(query): Query<SortQuery>,
) -> Json<Vec<PlayerRecord>> {
    let tracker = state.tracker.lock().await;
    let sorted = stats::sort_players(tracker.store().records(), query.sort.unwrap_or_default());
    Json(sorted.into_iter().cloned().collect())
}

pub async fn add_player(
    State(state): State<AppState>,
    Json(payload): Json<NewPlayerRequest>,
) -> Result<Json<MutationResponse<PlayerRecord>>, AppError> {
    let record = state.tracker.lock().await.add_player(payload)?;
    Ok(Json(state.respond(record).await))
}

pub async fn update_player(
    State(state): State<AppState>,
    Path(id): Path<u64>,
    Json(patch): Json<PlayerPatch>,
) -> Result<Json<MutationResponse<PlayerRecord>>, AppError> {
    let record = state.tracker.lock().await.update_player(id, patch)?;
    Ok(Json(state.respond(record).await))
}

pub async fn delete_player(
    State(state): State<AppState>,
    Path(id): Path<u64>,
) -> Result<Json<MutationResponse<PlayerRecord>>, AppError> {
    let record = state.tracker.lock().await.remove_player(id)?;
    Ok(Json(state.respond(record).await))
}

pub async fn clear_players(State(state): State<AppState>) -> Json<MutationResponse<usize>> {
    let removed = state.tracker.lock().await.clear_all();
    if let Err(err) = state.gateway.purge().await {
        warn!("could not purge stored copies: {err}");
    }
    Json(state.respond(removed).await)
}

pub async fn share_code(
    State(state): State<AppState>,
    Path(id): Path<u64>,
) -> Result<Json<ShareCodeResponse>, AppError> {
    let code = state.tracker.lock().await.share_code(id)?;
    Ok(Json(ShareCodeResponse { code }))
}

pub async fn add_shared(
    State(state): State<AppState>,
    Json(payload): Json<ShareCodeRequest>,
) -> Result<Json<MutationResponse<PlayerRecord>>, AppError> {
    let record = state
        .tracker
        .lock()
        .await
        .add_from_share_code(&payload.code)?;
    Ok(Json(state.respond(record).await))
}

pub async fn get_leaderboard(
    State(state): State<AppState>,
    Query(query): Query<LeaderboardQuery>,
) -> Json<Vec<LeaderboardEntry>> {
    let tracker = state.tracker.lock().await;
    Json(stats::leaderboard(
        tracker.store().records(),
        query.sort.unwrap_or(SortMode::Kd),
        query.limit.unwrap_or(LEADERBOARD_SIZE),
    ))
}

pub async fn get_overview(State(state): State<AppState>) -> Json<OverviewResponse> {
    let tracker = state.tracker.lock().await;
    Json(stats::overview(tracker.store().records()))
}

pub async fn get_activity(State(state): State<AppState>) -> Json<Vec<ActivityEntry>> {
    Json(state.tracker.lock().await.activity().entries().to_vec())
}

/// Markup for every target, rendered with the requested sort modes. Does
/// not touch the mounted renderer's options.
pub async fn get_fragments(
    State(state): State<AppState>,
    Query(query): Query<FragmentQuery>,
) -> Json<BTreeMap<&'static str, String>> {
    let defaults = RenderOptions::default();
    let options = RenderOptions {
        player_sort: query.sort.unwrap_or(defaults.player_sort),
        board_sort: query.board.unwrap_or(defaults.board_sort),
        board_size: defaults.board_size,
    };
    let tracker = state.tracker.lock().await;
    let view = tracker.view();
    Json(
        RenderTarget::ALL
            .into_iter()
            .map(|target| (target.id(), render_target(target, &view, &options)))
            .collect(),
    )
}

pub async fn get_settings(State(state): State<AppState>) -> Json<Settings> {
    Json(state.tracker.lock().await.settings().clone())
}

pub async fn set_background(
    State(state): State<AppState>,
    Json(payload): Json<BackgroundRequest>,
) -> Result<Json<MutationResponse<Settings>>, AppError> {
    let settings = {
        let mut tracker = state.tracker.lock().await;
        tracker.set_background(&payload.url)?;
        tracker.settings().clone()
    };
    Ok(Json(state.respond(settings).await))
}

pub async fn set_resize_mode(
    State(state): State<AppState>,
    Json(payload): Json<ToggleRequest>,
) -> Json<MutationResponse<Settings>> {
    let settings = {
        let mut tracker = state.tracker.lock().await;
        tracker.set_resize_mode(payload.enabled);
        tracker.settings().clone()
    };
    Json(state.respond(settings).await)
}

pub async fn set_fullscreen(
    State(state): State<AppState>,
    Json(payload): Json<ToggleRequest>,
) -> Json<MutationResponse<Settings>> {
    let settings = {
        let mut tracker = state.tracker.lock().await;
        tracker.set_auto_fullscreen(payload.enabled);
        tracker.settings().clone()
    };
    Json(state.respond(settings).await)
}

pub async fn resize_container(
    State(state): State<AppState>,
    Path(container_id): Path<String>,
    Json(drag): Json<ResizeRequest>,
) -> Result<Json<MutationResponse<ContainerSize>>, AppError> {
    let size = state
        .tracker
        .lock()
        .await
        .resize_container(&container_id, &drag)?;
    debug!(container_id, width = size.width, height = size.height, "container resized");
    Ok(Json(state.respond(size).await))
}

pub async fn reset_layout(State(state): State<AppState>) -> Json<MutationResponse<Settings>> {
    let settings = {
        let mut tracker = state.tracker.lock().await;
        tracker.reset_layout();
        tracker.settings().clone()
    };
    Json(state.respond(settings).await)
}

pub async fn export(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
    let document = state.tracker.lock().await.export();
    let body = serde_json::to_string_pretty(&document).map_err(AppError::internal)?;
    let disposition = format!(
        "attachment; filename=\"stats-backup-{}.json\"",
        Local::now().format("%Y-%m-%d")
    );
    Ok((
        [
            (header::CONTENT_TYPE, "application/json".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        body,
    ))
}

/// Takes the raw body so a broken file is reported as a rejected import
/// rather than an extractor error.
pub async fn import(
    State(state): State<AppState>,
    body: String,
) -> Result<Json<MutationResponse<usize>>, AppError> {
    let count = state.tracker.lock().await.import_json(&body)?;
    Ok(Json(state.respond(count).await))
}

pub async fn save(State(state): State<AppState>) -> Json<MutationResponse<SaveStatus>> {
    let (saved, notice) = state.save().await;
    Json(MutationResponse {
        data: state.save_status().await,
        saved,
        notice,
    })
}

pub async fn lifecycle(
    State(state): State<AppState>,
    Json(payload): Json<LifecycleRequest>,
) -> StatusCode {
    match payload.event {
        LifecycleEvent::Hidden => {
            debug!("page hidden, saving");
            state.save().await;
        }
        LifecycleEvent::Unload => {
            debug!("page unloading, flushing");
            state.flush().await;
        }
    }
    StatusCode::NO_CONTENT
}

pub async fn status(State(state): State<AppState>) -> Json<SaveStatus> {
    Json(state.save_status().await)
}
