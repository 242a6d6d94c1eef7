//! Notification layer contract
//!
//! Consent prompts go to the participant directly when possible and fall
//! back to a message in the channel the recording was started from.

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::consent::ConsentResponse;
use crate::types::{ChannelId, GuildId, Participant};

pub const CONSENT_PROMPT_TEXT: &str = "Do you consent to having your voice recorded?";

/// A consent request for one participant, with the responses its buttons carry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsentPrompt {
    pub guild_id: GuildId,
    pub participant: Participant,
    pub text: String,
    pub allow: ConsentResponse,
    pub deny: ConsentResponse,
}

impl ConsentPrompt {
    pub fn new(guild_id: GuildId, participant: Participant) -> Self {
        let allow = ConsentResponse::allow(participant.id);
        let deny = ConsentResponse::deny(participant.id);

        Self {
            guild_id,
            participant,
            text: CONSENT_PROMPT_TEXT.to_string(),
            allow,
            deny,
        }
    }
}

#[async_trait]
pub trait Notifier: Send + Sync {
    /// Deliver a prompt privately; an error means it did not arrive
    async fn send_direct_prompt(&self, prompt: &ConsentPrompt) -> Result<()>;

    /// Post a prompt in a channel, mentioning the participant
    async fn send_channel_prompt(&self, channel_id: ChannelId, prompt: &ConsentPrompt) -> Result<()>;

    /// Post a plain message in a channel
    async fn send_notice(&self, channel_id: ChannelId, text: &str) -> Result<()>;
}

/// Ask a participant for consent, falling back to the channel
pub async fn request_consent(
    notifier: &dyn Notifier,
    channel_id: ChannelId,
    guild_id: GuildId,
    participant: &Participant,
) {
    let prompt = ConsentPrompt::new(guild_id, participant.clone());

    match notifier.send_direct_prompt(&prompt).await {
        Ok(()) => info!("Sent consent request to {}", participant.name),
        Err(e) => {
            warn!(
                "Couldn't DM {} ({}), falling back to channel message",
                participant.name, e
            );
            if let Err(e) = notifier.send_channel_prompt(channel_id, &prompt).await {
                error!(
                    "Failed to deliver consent request to {}: {}",
                    participant.name, e
                );
            }
        }
    }
}

/// Post a notice, logging instead of failing
pub async fn notify(notifier: &dyn Notifier, channel_id: ChannelId, text: &str) {
    if let Err(e) = notifier.send_notice(channel_id, text).await {
        error!("Failed to post notice to channel {}: {}", channel_id, e);
    }
}
