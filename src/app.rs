use crate::handlers;
use crate::state::AppState;
use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{delete, get, patch, post, put},
};

/// Screenshots travel inline as data URLs, so bodies may be a few megabytes.
pub const BODY_LIMIT: usize = 16 * 1024 * 1024;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(handlers::index))
        .route(
            "/api/players",
            get(handlers::list_players)
                .post(handlers::add_player)
                .delete(handlers::clear_players),
        )
        .route(
            "/api/players/:id",
            patch(handlers::update_player).delete(handlers::delete_player),
        )
        .route("/api/players/:id/share", get(handlers::share_code))
        .route("/api/share", post(handlers::add_shared))
        .route("/api/leaderboard", get(handlers::get_leaderboard))
        .route("/api/overview", get(handlers::get_overview))
        .route("/api/activity", get(handlers::get_activity))
        .route("/api/fragments", get(handlers::get_fragments))
        .route("/api/settings", get(handlers::get_settings))
        .route("/api/settings/background", put(handlers::set_background))
        .route("/api/settings/resize-mode", put(handlers::set_resize_mode))
        .route("/api/settings/fullscreen", put(handlers::set_fullscreen))
        .route("/api/settings/containers", delete(handlers::reset_layout))
        .route(
            "/api/settings/containers/:id",
            put(handlers::resize_container),
        )
        .route("/api/export", get(handlers::export))
        .route("/api/import", post(handlers::import))
        .route("/api/save", post(handlers::save))
        .route("/api/lifecycle", post(handlers::lifecycle))
        .route("/api/status", get(handlers::status))
        .layer(DefaultBodyLimit::max(BODY_LIMIT))
        .with_state(state)
}
