use anyhow::{anyhow, bail, Context, Result};
use async_nats::Client;
use async_trait::async_trait;
use serde::Serialize;
use tracing::{debug, info};

use super::messages::{DeliveryReceipt, NotificationMessage, SegmentMessage};
use crate::config::NatsConfig;
use crate::notify::{ConsentPrompt, Notifier};
use crate::session::{RecordingSegment, SegmentPublisher};
use crate::types::ChannelId;

pub struct NatsClient {
    client: Client,
    config: NatsConfig,
}

impl NatsClient {
    /// Connect to NATS server
    pub async fn connect(config: &NatsConfig) -> Result<Self> {
        info!("Connecting to NATS at {}", config.url);

        let client = async_nats::connect(config.url.as_str())
            .await
            .context("Failed to connect to NATS")?;

        info!("Connected to NATS successfully");

        Ok(Self {
            client,
            config: config.clone(),
        })
    }

    pub async fn publish_segment(&self, segment: &RecordingSegment) -> Result<()> {
        let message = SegmentMessage::from(segment);
        self.publish_json(&self.config.audio_subject, &message)
            .await
            .context("Failed to publish segment")?;

        info!(
            "Published segment {} to {} (participant={}, guild={})",
            segment.id, self.config.audio_subject, segment.participant, segment.guild_id
        );

        Ok(())
    }

    /// Subscribe to downstream segment rejections
    pub async fn subscribe_rejections(&self) -> Result<async_nats::Subscriber> {
        let subject = self.config.rejected_subject.clone();

        info!("Subscribing to rejections on {}", subject);

        let subscriber = self
            .client
            .subscribe(subject.clone())
            .await
            .context("Failed to subscribe to rejections")?;

        info!("Subscribed to {}", subject);

        Ok(subscriber)
    }

    /// Flush pending publishes before shutdown
    pub async fn close(&self) -> Result<()> {
        info!("Closing NATS connection");
        self.client
            .flush()
            .await
            .context("Failed to flush NATS connection")?;
        Ok(())
    }

    async fn publish_json<T: Serialize>(&self, subject: &str, message: &T) -> Result<()> {
        let payload = serde_json::to_vec(message)?;

        self.client
            .publish(subject.to_string(), payload.into())
            .await
            .with_context(|| format!("Failed to publish to {}", subject))?;

        Ok(())
    }
}

#[async_trait]
impl SegmentPublisher for NatsClient {
    async fn publish(&self, segment: &RecordingSegment) -> Result<()> {
        self.publish_segment(segment).await
    }
}

#[async_trait]
impl Notifier for NatsClient {
    async fn send_direct_prompt(&self, prompt: &ConsentPrompt) -> Result<()> {
        let message = NotificationMessage::prompt(prompt, None);
        let payload = serde_json::to_vec(&message)?;
        let subject = self.config.direct_subject.clone();

        let reply = tokio::time::timeout(
            self.config.request_timeout(),
            self.client.request(subject, payload.into()),
        )
        .await
        .map_err(|_| anyhow!("no reply within {:?}", self.config.request_timeout()))?
        .context("Direct prompt request failed")?;

        let receipt: DeliveryReceipt =
            serde_json::from_slice(&reply.payload).context("Invalid delivery receipt")?;

        if !receipt.delivered {
            bail!(
                "direct message not delivered: {}",
                receipt.error.as_deref().unwrap_or("unknown reason")
            );
        }

        debug!("Direct prompt delivered to {}", prompt.participant.id);
        Ok(())
    }

    async fn send_channel_prompt(&self, channel_id: ChannelId, prompt: &ConsentPrompt) -> Result<()> {
        let message = NotificationMessage::prompt(prompt, Some(channel_id));
        self.publish_json(&self.config.channel_subject, &message).await
    }

    async fn send_notice(&self, channel_id: ChannelId, text: &str) -> Result<()> {
        let message = NotificationMessage::notice(channel_id, text);
        self.publish_json(&self.config.channel_subject, &message).await
    }
}
