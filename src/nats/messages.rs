use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use uuid::Uuid;

use crate::notify::ConsentPrompt;
use crate::session::RecordingSegment;
use crate::types::{ChannelId, GuildId, ParticipantId};

/// Segment announcement published for the processing pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SegmentMessage {
    pub id: Uuid,
    pub path: PathBuf,
    pub participant_id: ParticipantId,
    pub participant: String,
    pub channel_id: ChannelId,
    pub guild_id: GuildId,
    pub captured_at: DateTime<Utc>,
}

impl From<&RecordingSegment> for SegmentMessage {
    fn from(segment: &RecordingSegment) -> Self {
        Self {
            id: segment.id,
            path: segment.path.clone(),
            participant_id: segment.participant_id,
            participant: segment.participant.clone(),
            channel_id: segment.channel_id,
            guild_id: segment.guild_id,
            captured_at: segment.captured_at,
        }
    }
}

/// Message for the UI layer to deliver
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NotificationMessage {
    ConsentPrompt {
        guild_id: GuildId,
        /// Absent for direct messages
        #[serde(default, skip_serializing_if = "Option::is_none")]
        channel_id: Option<ChannelId>,
        participant_id: ParticipantId,
        participant: String,
        text: String,
        /// Button ids echoed back with the answer
        allow_id: String,
        deny_id: String,
    },
    Notice {
        channel_id: ChannelId,
        text: String,
    },
}

impl NotificationMessage {
    pub fn prompt(prompt: &ConsentPrompt, channel_id: Option<ChannelId>) -> Self {
        Self::ConsentPrompt {
            guild_id: prompt.guild_id,
            channel_id,
            participant_id: prompt.participant.id,
            participant: prompt.participant.name.clone(),
            text: prompt.text.clone(),
            allow_id: prompt.allow.to_string(),
            deny_id: prompt.deny.to_string(),
        }
    }

    pub fn notice(channel_id: ChannelId, text: impl Into<String>) -> Self {
        Self::Notice {
            channel_id,
            text: text.into(),
        }
    }
}

/// Reply to a direct prompt request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeliveryReceipt {
    pub delivered: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}
