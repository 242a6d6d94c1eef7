use super::handlers;
use super::state::AppState;
use axum::{
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;

/// Create the HTTP router with all routes
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health check
        .route("/health", get(handlers::health_check))
        // Recording control
        .route(
            "/guilds/:guild_id/recording/start",
            post(handlers::start_recording),
        )
        .route(
            "/guilds/:guild_id/recording/stop",
            post(handlers::stop_recording),
        )
        .route("/guilds/:guild_id/recording", get(handlers::recording_status))
        // Voice bridge events
        .route(
            "/guilds/:guild_id/voice/presence",
            post(handlers::voice_presence),
        )
        .route("/guilds/:guild_id/voice/frames", post(handlers::voice_frames))
        // Consent button responses
        .route("/consent", post(handlers::consent_response))
        // Add tracing middleware for request logging
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
