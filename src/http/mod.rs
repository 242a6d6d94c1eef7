//! HTTP API for the voice bridge and the command layer
//!
//! - POST /guilds/:guild_id/recording/start - Start recording the requester's voice channel
//! - POST /guilds/:guild_id/recording/stop - Stop and flush the guild's recording
//! - GET /guilds/:guild_id/recording - Query session status
//! - POST /guilds/:guild_id/voice/presence - Participant joined or left a voice channel
//! - POST /guilds/:guild_id/voice/frames - Ingest decoded PCM for a participant
//! - POST /consent - Consent button response
//! - GET /health - Health check

mod handlers;
mod routes;
mod state;

pub use handlers::ApiError;
pub use routes::create_router;
pub use state::AppState;
