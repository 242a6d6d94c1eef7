//! Audible feedback for segments the downstream pipeline refused
//!
//! Every rejection event bumps a counter. When the counter reaches the
//! threshold it resets, and the guild named by that last event gets an error
//! cue if it has a connected session.

use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::RecorderError;
use crate::session::SessionRegistry;
use crate::types::GuildId;
use crate::voice::Cue;

pub const DEFAULT_REJECTION_THRESHOLD: u32 = 7;

/// Which events share a counter
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CounterScope {
    /// One counter across all guilds
    Global,
    /// One counter per guild
    #[default]
    PerGuild,
}

/// A rejection notice from the processing pipeline
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RejectionEvent {
    pub guild_id: GuildId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub segment_id: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl RejectionEvent {
    pub fn parse(payload: &[u8]) -> Result<Self, RecorderError> {
        serde_json::from_slice(payload)
            .map_err(|e| RecorderError::MalformedRejectionEvent(e.to_string()))
    }
}

#[derive(Debug)]
pub struct RejectionCounter {
    threshold: u32,
    scope: CounterScope,
    global: u32,
    per_guild: HashMap<GuildId, u32>,
}

impl RejectionCounter {
    /// Threshold is clamped to at least 1
    pub fn new(threshold: u32, scope: CounterScope) -> Self {
        Self {
            threshold: threshold.max(1),
            scope,
            global: 0,
            per_guild: HashMap::new(),
        }
    }

    pub fn threshold(&self) -> u32 {
        self.threshold
    }

    /// Count one event; true when it hit the threshold (the counter is reset)
    pub fn record(&mut self, guild_id: GuildId) -> bool {
        let count = match self.scope {
            CounterScope::Global => &mut self.global,
            CounterScope::PerGuild => self.per_guild.entry(guild_id).or_default(),
        };

        *count += 1;
        if *count >= self.threshold {
            *count = 0;
            return true;
        }
        false
    }

    pub fn current(&self, guild_id: GuildId) -> u32 {
        match self.scope {
            CounterScope::Global => self.global,
            CounterScope::PerGuild => self.per_guild.get(&guild_id).copied().unwrap_or(0),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedbackOutcome {
    /// Below threshold
    Counted,
    /// Threshold reached and an error cue was queued for the guild
    Cued(GuildId),
    /// Threshold reached but the guild has no connected session
    NoSession(GuildId),
    /// Payload could not be parsed and was dropped
    Malformed,
}

pub struct RejectionFeedbackConsumer {
    registry: Arc<SessionRegistry>,
    counter: RejectionCounter,
}

impl RejectionFeedbackConsumer {
    pub fn new(registry: Arc<SessionRegistry>, threshold: u32, scope: CounterScope) -> Self {
        Self {
            registry,
            counter: RejectionCounter::new(threshold, scope),
        }
    }

    pub async fn handle_payload(&mut self, payload: &[u8]) -> FeedbackOutcome {
        match RejectionEvent::parse(payload) {
            Ok(event) => self.handle_event(&event).await,
            Err(e) => {
                warn!("Dropping rejection event: {}", e);
                FeedbackOutcome::Malformed
            }
        }
    }

    pub async fn handle_event(&mut self, event: &RejectionEvent) -> FeedbackOutcome {
        debug!(
            "Segment rejected in guild {}: {}",
            event.guild_id,
            event.reason.as_deref().unwrap_or("no reason given")
        );

        if !self.counter.record(event.guild_id) {
            return FeedbackOutcome::Counted;
        }

        let session = self
            .registry
            .get(event.guild_id)
            .await
            .filter(|session| session.is_connected());

        match session {
            Some(session) => {
                info!(
                    "{} rejected segments, playing error cue in guild {}",
                    self.counter.threshold(),
                    event.guild_id
                );
                session.queue_cue(Cue::Error);
                FeedbackOutcome::Cued(event.guild_id)
            }
            None => {
                debug!(
                    "Rejection threshold reached but guild {} has no connected session",
                    event.guild_id
                );
                FeedbackOutcome::NoSession(event.guild_id)
            }
        }
    }

    /// Consume the stream one event at a time until it ends
    pub async fn run<S, P>(mut self, mut stream: S)
    where
        S: Stream<Item = P> + Unpin,
        P: AsRef<[u8]>,
    {
        info!("Rejection feedback consumer started");

        while let Some(payload) = stream.next().await {
            self.handle_payload(payload.as_ref()).await;
        }

        info!("Rejection stream closed, feedback consumer exiting");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_per_guild_counter_fires_every_threshold() {
        let mut counter = RejectionCounter::new(7, CounterScope::PerGuild);
        let guild = GuildId(1);

        let fired: Vec<usize> = (1..=14)
            .filter(|_| counter.record(guild))
            .collect();

        assert_eq!(fired, vec![7, 14]);
        assert_eq!(counter.current(guild), 0);
    }

    #[test]
    fn test_per_guild_counters_are_independent() {
        let mut counter = RejectionCounter::new(3, CounterScope::PerGuild);

        assert!(!counter.record(GuildId(1)));
        assert!(!counter.record(GuildId(1)));
        assert!(!counter.record(GuildId(2)));
        assert!(!counter.record(GuildId(2)));
        assert!(counter.record(GuildId(1)));
        assert_eq!(counter.current(GuildId(2)), 2);
    }

    #[test]
    fn test_global_counter_is_shared() {
        let mut counter = RejectionCounter::new(3, CounterScope::Global);

        assert!(!counter.record(GuildId(1)));
        assert!(!counter.record(GuildId(2)));
        // The third event fires for whichever guild it belongs to
        assert!(counter.record(GuildId(2)));
        assert_eq!(counter.current(GuildId(1)), 0);
    }

    #[test]
    fn test_zero_threshold_is_clamped() {
        let mut counter = RejectionCounter::new(0, CounterScope::Global);
        assert_eq!(counter.threshold(), 1);
        assert!(counter.record(GuildId(1)));
    }

    #[test]
    fn test_parse_rejection_event() {
        let event = RejectionEvent::parse(
            br#"{"guildId": 42, "id": "8d3b4a7e-0f4e-4a63-9a57-3f1f7a2b9c10", "extra": true}"#,
        )
        .unwrap();

        assert_eq!(event.guild_id, GuildId(42));
        assert!(event.segment_id.is_none());
        assert!(event.reason.is_none());

        // An echoed segment carries its own id next to segmentId
        let event = RejectionEvent::parse(
            br#"{"guildId": 42, "id": "8d3b4a7e-0f4e-4a63-9a57-3f1f7a2b9c10", "segmentId": "00000000-0000-0000-0000-000000000000"}"#,
        )
        .unwrap();
        assert_eq!(event.segment_id, Some(Uuid::nil()));

        assert!(matches!(
            RejectionEvent::parse(b"not json"),
            Err(RecorderError::MalformedRejectionEvent(_))
        ));
        assert!(RejectionEvent::parse(br#"{"reason": "no guild"}"#).is_err());
    }

    #[tokio::test]
    async fn test_malformed_payload_does_not_count() {
        let registry = Arc::new(SessionRegistry::new());
        let mut consumer = RejectionFeedbackConsumer::new(registry, 2, CounterScope::PerGuild);

        assert_eq!(consumer.handle_payload(b"{").await, FeedbackOutcome::Malformed);
        assert_eq!(
            consumer.handle_payload(br#"{"guildId": 5}"#).await,
            FeedbackOutcome::Counted
        );
        assert_eq!(
            consumer.handle_payload(br#"{"guildId": 5}"#).await,
            FeedbackOutcome::NoSession(GuildId(5))
        );
    }
}
