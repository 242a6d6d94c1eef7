//! Error taxonomy for the recording core
//!
//! Registry-contract violations (`AlreadyRecording`, `NoActiveRecording`,
//! `NotInVoice`) go straight back to the requester and never mutate state.
//! Voice-layer failures end the affected session. Artifact, consent-store and
//! rejection-stream failures are absorbed where they happen and only logged.

use thiserror::Error;

use crate::types::ParticipantId;
use crate::voice::VoiceError;

pub type Result<T> = std::result::Result<T, RecorderError>;

#[derive(Debug, Error)]
pub enum RecorderError {
    #[error("a recording is already active in this guild")]
    AlreadyRecording,

    #[error("there is no active recording in this guild")]
    NoActiveRecording,

    #[error("you must be connected to a voice channel")]
    NotInVoice,

    #[error("voice layer failure: {0}")]
    VoiceLayer(#[from] VoiceError),

    #[error("failed to process capture for participant {participant}: {reason}")]
    ArtifactProcessing {
        participant: ParticipantId,
        reason: String,
    },

    #[error("consent store I/O failure: {0}")]
    ConsentStoreIo(String),

    #[error("malformed rejection event: {0}")]
    MalformedRejectionEvent(String),

    #[error("participant {responder} cannot answer a consent request addressed to {participant}")]
    ConsentResponderMismatch {
        responder: ParticipantId,
        participant: ParticipantId,
    },

    #[error("invalid consent response: {0}")]
    InvalidConsentResponse(String),
}

impl RecorderError {
    pub(crate) fn artifact(participant: ParticipantId, reason: impl std::fmt::Display) -> Self {
        Self::ArtifactProcessing {
            participant,
            reason: reason.to_string(),
        }
    }
}
