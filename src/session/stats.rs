use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::{ChannelId, GuildId};

/// Lifecycle state of a recording session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    /// Capturing, rotation timer running
    Active,
    /// Capture suspended while a flush is in progress
    Rotating,
    /// Terminal: timer cancelled, voice released, unregistered
    Stopped,
}

impl SessionState {
    pub fn is_live(self) -> bool {
        !matches!(self, Self::Stopped)
    }
}

/// Statistics about a recording session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionStats {
    pub session_id: Uuid,

    pub guild_id: GuildId,

    pub voice_channel_id: ChannelId,

    pub state: SessionState,

    /// When the recording started
    pub started_at: DateTime<Utc>,

    /// Total duration in seconds
    pub duration_secs: f64,

    /// Completed rotations, including the final one on stop
    pub rotations: usize,

    /// Segments handed to the publisher
    pub segments_published: usize,
}
