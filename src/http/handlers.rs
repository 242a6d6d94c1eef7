use super::state::AppState;
use crate::consent::{ConsentDecision, ConsentResponse};
use crate::error::RecorderError;
use crate::orchestrator::{
    PresenceChange, PresenceOutcome, StartOutcome, StartRequest, StopOutcome,
};
use crate::session::SessionStats;
use crate::types::{ChannelId, GuildId, Participant, ParticipantId, VoiceChannel};
use crate::voice::{AudioFrame, VoiceError};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use base64::Engine;
use serde::{Deserialize, Serialize};
use tracing::{error, info, trace};

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct StartRecordingRequest {
    /// Text channel the command was issued from
    pub channel_id: ChannelId,

    pub requester_id: ParticipantId,

    /// The requester's current voice channel; absent when not in voice
    pub voice_channel: Option<VoiceChannelBody>,
}

#[derive(Debug, Deserialize)]
pub struct VoiceChannelBody {
    pub id: ChannelId,
    #[serde(default)]
    pub members: Vec<Participant>,
}

impl VoiceChannelBody {
    fn into_channel(self, guild_id: GuildId) -> VoiceChannel {
        VoiceChannel {
            id: self.id,
            guild_id,
            members: self.members,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct PresenceRequest {
    /// The voice channel and its members after the change
    pub voice_channel: VoiceChannelBody,
    pub participant: Participant,
    pub joined: bool,
}

#[derive(Debug, Deserialize)]
pub struct FrameIngest {
    pub participant_id: ParticipantId,
    /// Base64-encoded little-endian i16 PCM, interleaved
    pub pcm: String,
    pub sample_rate: u32,
    pub channels: u16,
    #[serde(default)]
    pub timestamp_ms: u64,
}

/// Either the button id or the explicit pair
#[derive(Debug, Deserialize)]
pub struct ConsentRequest {
    pub responder_id: ParticipantId,
    pub custom_id: Option<String>,
    pub participant_id: Option<ParticipantId>,
    pub decision: Option<ConsentDecision>,
}

#[derive(Debug, Serialize)]
pub struct ConsentReply {
    pub participant_id: ParticipantId,
    pub decision: ConsentDecision,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug)]
pub enum ApiError {
    Recorder(RecorderError),
    Voice(VoiceError),
    BadRequest(String),
}

impl From<RecorderError> for ApiError {
    fn from(e: RecorderError) -> Self {
        Self::Recorder(e)
    }
}

impl From<VoiceError> for ApiError {
    fn from(e: VoiceError) -> Self {
        Self::Voice(e)
    }
}

fn recorder_status(e: &RecorderError) -> StatusCode {
    match e {
        RecorderError::AlreadyRecording => StatusCode::CONFLICT,
        RecorderError::NoActiveRecording => StatusCode::NOT_FOUND,
        RecorderError::NotInVoice => StatusCode::BAD_REQUEST,
        RecorderError::ConsentResponderMismatch { .. } => StatusCode::FORBIDDEN,
        RecorderError::InvalidConsentResponse(_) => StatusCode::BAD_REQUEST,
        RecorderError::VoiceLayer(_) => StatusCode::BAD_GATEWAY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            Self::Recorder(e) => (recorder_status(&e), e.to_string()),
            Self::Voice(VoiceError::NotConnected) => {
                (StatusCode::NOT_FOUND, VoiceError::NotConnected.to_string())
            }
            Self::Voice(e) => (StatusCode::BAD_GATEWAY, e.to_string()),
            Self::BadRequest(message) => (StatusCode::BAD_REQUEST, message),
        };

        if status.is_server_error() {
            error!("Request failed: {}", message);
        }

        (status, Json(ErrorResponse { error: message })).into_response()
    }
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /guilds/:guild_id/recording/start
pub async fn start_recording(
    State(state): State<AppState>,
    Path(guild_id): Path<GuildId>,
    Json(req): Json<StartRecordingRequest>,
) -> Result<Json<StartOutcome>, ApiError> {
    let request = StartRequest {
        guild_id,
        channel_id: req.channel_id,
        requester: req.requester_id,
        requester_voice: req.voice_channel.map(|v| v.into_channel(guild_id)),
    };

    let outcome = state.orchestrator.handle_start(request).await?;
    Ok(Json(outcome))
}

/// POST /guilds/:guild_id/recording/stop
pub async fn stop_recording(
    State(state): State<AppState>,
    Path(guild_id): Path<GuildId>,
) -> Result<Json<StopOutcome>, ApiError> {
    let outcome = state.orchestrator.handle_stop(guild_id).await?;
    Ok(Json(outcome))
}

/// GET /guilds/:guild_id/recording
pub async fn recording_status(
    State(state): State<AppState>,
    Path(guild_id): Path<GuildId>,
) -> Result<Json<SessionStats>, ApiError> {
    let stats = state.orchestrator.status(guild_id).await?;
    Ok(Json(stats))
}

/// POST /guilds/:guild_id/voice/presence
pub async fn voice_presence(
    State(state): State<AppState>,
    Path(guild_id): Path<GuildId>,
    Json(req): Json<PresenceRequest>,
) -> Result<Json<PresenceOutcome>, ApiError> {
    let change = PresenceChange {
        guild_id,
        voice_channel: req.voice_channel.into_channel(guild_id),
        participant: req.participant,
        joined: req.joined,
    };

    let outcome = state
        .orchestrator
        .handle_voice_presence_change(change)
        .await?;
    Ok(Json(outcome))
}

/// POST /guilds/:guild_id/voice/frames
pub async fn voice_frames(
    State(state): State<AppState>,
    Path(guild_id): Path<GuildId>,
    Json(req): Json<FrameIngest>,
) -> Result<StatusCode, ApiError> {
    let samples = decode_pcm(&req.pcm)?;

    trace!(
        "Frame from participant {} in guild {} ({} samples)",
        req.participant_id,
        guild_id,
        samples.len()
    );

    let frame = AudioFrame {
        samples,
        sample_rate: req.sample_rate,
        channels: req.channels,
        timestamp_ms: req.timestamp_ms,
    };

    state
        .gateway
        .push_frame(guild_id, req.participant_id, frame)
        .await?;

    Ok(StatusCode::ACCEPTED)
}

/// POST /consent
pub async fn consent_response(
    State(state): State<AppState>,
    Json(req): Json<ConsentRequest>,
) -> Result<Json<ConsentReply>, ApiError> {
    let response = match (req.custom_id, req.participant_id, req.decision) {
        (Some(custom_id), _, _) => custom_id.parse::<ConsentResponse>()?,
        (None, Some(participant_id), Some(decision)) => ConsentResponse {
            participant_id,
            decision,
        },
        _ => {
            return Err(ApiError::BadRequest(
                "expected custom_id, or participant_id and decision".to_string(),
            ))
        }
    };

    let decision = state
        .orchestrator
        .handle_consent_response(req.responder_id, response)
        .await?;

    info!(
        "Stored consent decision {:?} for participant {}",
        decision, response.participant_id
    );

    Ok(Json(ConsentReply {
        participant_id: response.participant_id,
        decision,
        message: "Your preference has been saved.".to_string(),
    }))
}

/// GET /health
/// Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

fn decode_pcm(encoded: &str) -> Result<Vec<i16>, ApiError> {
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(encoded)
        .map_err(|e| ApiError::BadRequest(format!("invalid base64 PCM: {}", e)))?;

    if bytes.len() % 2 != 0 {
        return Err(ApiError::BadRequest(
            "PCM payload must contain whole 16-bit samples".to_string(),
        ));
    }

    Ok(bytes
        .chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
        .collect())
}
