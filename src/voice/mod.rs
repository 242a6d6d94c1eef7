//! Voice layer contract
//!
//! The recording core never talks to a voice gateway directly. It goes
//! through these traits:
//! - [`VoiceGateway`] joins a voice channel
//! - [`VoiceConnection`] controls capture, playback and disconnect for one join
//!
//! [`local::LocalVoiceGateway`] is the bundled implementation, fed with
//! decoded PCM frames by an out-of-process voice bridge.

pub mod capture;
pub mod cues;
pub mod local;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

use crate::types::{ParticipantId, VoiceChannel};

pub use capture::{AudioFrame, ParticipantTracks};
pub use cues::{Cue, CueClip, CueLibrary};
pub use local::{LocalVoiceConnection, LocalVoiceGateway};

#[derive(Debug, Error)]
pub enum VoiceError {
    #[error("failed to connect to voice channel: {0}")]
    Connect(String),

    #[error("capture error: {0}")]
    Capture(String),

    #[error("failed to disconnect: {0}")]
    Disconnect(String),

    #[error("playback error: {0}")]
    Playback(String),

    #[error("not connected to voice")]
    NotConnected,
}

/// Container format of raw capture artifacts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CaptureFormat {
    #[default]
    Wav,
}

impl CaptureFormat {
    pub fn extension(self) -> &'static str {
        match self {
            Self::Wav => "wav",
        }
    }
}

/// Joins voice channels
#[async_trait]
pub trait VoiceGateway: Send + Sync {
    /// Connect to a voice channel and return the live connection
    async fn connect(&self, channel: &VoiceChannel) -> Result<Arc<dyn VoiceConnection>, VoiceError>;
}

/// One live voice connection
#[async_trait]
pub trait VoiceConnection: Send + Sync {
    /// Begin capturing every speaker into `output_dir`
    async fn start_capture(&self, output_dir: &Path, format: CaptureFormat)
        -> Result<(), VoiceError>;

    /// Stop capturing and hand over the artifacts captured since the last start.
    ///
    /// The returned map is cleared on the voice side, so each artifact is
    /// handed out exactly once.
    async fn stop_capture(&self) -> Result<HashMap<ParticipantId, PathBuf>, VoiceError>;

    /// Leave the voice channel
    async fn disconnect(&self) -> Result<(), VoiceError>;

    /// Play a cue and wait until it has finished
    async fn play_cue(&self, cue: Cue) -> Result<(), VoiceError>;

    fn is_connected(&self) -> bool;
}
