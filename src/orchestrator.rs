//! Entry point for user commands and voice presence events
//!
//! Every operation takes the guild's command lock first, so two operations
//! for the same guild never interleave. Different guilds proceed independently.

use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};
use uuid::Uuid;

use crate::consent::{ConsentDecision, ConsentResponse};
use crate::error::{RecorderError, Result};
use crate::notify;
use crate::session::{
    RecordingSession, SessionConfig, SessionRegistry, SessionServices, SessionStats,
};
use crate::types::{ChannelId, GuildId, Participant, ParticipantId, VoiceChannel};
use crate::voice::VoiceGateway;

pub const DEPARTURE_NOTICE: &str = "All members have left the channel.";

/// A start command
#[derive(Debug, Clone)]
pub struct StartRequest {
    pub guild_id: GuildId,
    /// Channel the command was issued in
    pub channel_id: ChannelId,
    pub requester: ParticipantId,
    /// The requester's current voice channel, if any
    pub requester_voice: Option<VoiceChannel>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StartOutcome {
    pub session_id: Uuid,
    pub voice_channel_id: ChannelId,
    /// Participants that were sent a consent request
    pub consent_requested: Vec<ParticipantId>,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct StopOutcome {
    /// Segments produced by the final flush
    pub segments: usize,
}

/// A participant joined or left a voice channel
#[derive(Debug, Clone)]
pub struct PresenceChange {
    pub guild_id: GuildId,
    /// The channel and its members after the change
    pub voice_channel: VoiceChannel,
    pub participant: Participant,
    pub joined: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum PresenceOutcome {
    /// No session for this guild/channel, or a bot account
    Ignored,
    /// Joined with a consent decision already on record
    Admitted,
    ConsentRequested,
    /// Left while the session still has someone to record
    Departed,
    AutoStopped { segments: usize },
}

pub struct RecordingSessionOrchestrator {
    registry: Arc<SessionRegistry>,
    gateway: Arc<dyn VoiceGateway>,
    services: SessionServices,
    config: SessionConfig,
    guild_locks: Mutex<HashMap<GuildId, Arc<Mutex<()>>>>,
}

impl RecordingSessionOrchestrator {
    pub fn new(
        gateway: Arc<dyn VoiceGateway>,
        services: SessionServices,
        config: SessionConfig,
    ) -> Self {
        Self {
            registry: Arc::clone(&services.registry),
            gateway,
            services,
            config,
            guild_locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    pub async fn handle_start(&self, request: StartRequest) -> Result<StartOutcome> {
        let guild_id = request.guild_id;
        let lock = self.guild_lock(guild_id).await;
        let result = {
            let _guard = lock.lock().await;
            self.start_locked(request).await
        };
        self.release_guild_lock(guild_id, lock).await;
        result
    }

    async fn start_locked(&self, request: StartRequest) -> Result<StartOutcome> {
        let guild_id = request.guild_id;

        if self.registry.get(guild_id).await.is_some() {
            return Err(RecorderError::AlreadyRecording);
        }

        let Some(voice_channel) = request.requester_voice else {
            return Err(RecorderError::NotInVoice);
        };

        info!(
            "Participant {} requested a recording in guild {}",
            request.requester, guild_id
        );

        let session = RecordingSession::start(
            guild_id,
            request.channel_id,
            &voice_channel,
            self.gateway.as_ref(),
            self.config.clone(),
            self.services.clone(),
        )
        .await?;

        if let Err(e) = self.registry.add(guild_id, Arc::clone(&session)).await {
            session.terminate().await;
            return Err(e);
        }

        let consent = self.services.consent.load().await;
        let undecided: Vec<&Participant> = voice_channel
            .humans()
            .filter(|m| !consent.is_decided(m.id))
            .collect();

        for member in &undecided {
            notify::request_consent(
                self.services.notifier.as_ref(),
                request.channel_id,
                guild_id,
                member,
            )
            .await;
        }

        info!(
            "Recording started in guild {} ({} consent requests sent)",
            guild_id,
            undecided.len()
        );

        Ok(StartOutcome {
            session_id: session.id(),
            voice_channel_id: voice_channel.id,
            consent_requested: undecided.iter().map(|m| m.id).collect(),
        })
    }

    pub async fn handle_stop(&self, guild_id: GuildId) -> Result<StopOutcome> {
        let lock = self.guild_lock(guild_id).await;
        let result = {
            let _guard = lock.lock().await;
            self.stop_locked(guild_id).await
        };
        self.release_guild_lock(guild_id, lock).await;
        result
    }

    async fn stop_locked(&self, guild_id: GuildId) -> Result<StopOutcome> {
        let Some(session) = self.registry.get(guild_id).await else {
            return Err(RecorderError::NoActiveRecording);
        };

        let segments = session.stop().await?;
        info!("Recording stopped in guild {}: {} segments processed", guild_id, segments);

        Ok(StopOutcome { segments })
    }

    pub async fn handle_voice_presence_change(
        &self,
        change: PresenceChange,
    ) -> Result<PresenceOutcome> {
        let guild_id = change.guild_id;
        let lock = self.guild_lock(guild_id).await;
        let result = {
            let _guard = lock.lock().await;
            self.presence_locked(change).await
        };
        self.release_guild_lock(guild_id, lock).await;
        result
    }

    async fn presence_locked(&self, change: PresenceChange) -> Result<PresenceOutcome> {
        let guild_id = change.guild_id;

        let Some(session) = self.registry.get(guild_id).await else {
            return Ok(PresenceOutcome::Ignored);
        };

        if change.voice_channel.id != session.voice_channel_id() {
            return Ok(PresenceOutcome::Ignored);
        }

        if change.participant.bot {
            // Rostered so its captures are recognized and discarded
            if change.joined {
                session.admit(change.participant).await;
            }
            return Ok(PresenceOutcome::Ignored);
        }

        let consent = self.services.consent.load().await;
        let participant = change.participant;

        if change.joined {
            session.admit(participant.clone()).await;

            if consent.is_decided(participant.id) {
                return Ok(PresenceOutcome::Admitted);
            }

            notify::request_consent(
                self.services.notifier.as_ref(),
                session.channel_id(),
                guild_id,
                &participant,
            )
            .await;
            return Ok(PresenceOutcome::ConsentRequested);
        }

        let remaining: Vec<Option<ConsentDecision>> = change
            .voice_channel
            .humans()
            .filter(|m| m.id != participant.id)
            .map(|m| consent.decision(m.id))
            .collect();

        // Stop once nobody consented and the rest are either all undecided
        // or all decided
        let granted = remaining.contains(&Some(ConsentDecision::Granted));
        let undecided = remaining.contains(&None);
        let decided = remaining.iter().any(Option::is_some);

        if granted || (undecided && decided) {
            return Ok(PresenceOutcome::Departed);
        }

        info!(
            "No recordable participants left in guild {}, stopping recording",
            guild_id
        );

        let segments = session.stop().await?;
        notify::notify(
            self.services.notifier.as_ref(),
            session.channel_id(),
            DEPARTURE_NOTICE,
        )
        .await;

        Ok(PresenceOutcome::AutoStopped { segments })
    }

    /// Store a consent answer; only the addressed participant may answer
    pub async fn handle_consent_response(
        &self,
        responder: ParticipantId,
        response: ConsentResponse,
    ) -> Result<ConsentDecision> {
        if responder != response.participant_id {
            warn!(
                "Participant {} tried to answer the consent request of {}",
                responder, response.participant_id
            );
            return Err(RecorderError::ConsentResponderMismatch {
                responder,
                participant: response.participant_id,
            });
        }

        self.services.consent.record_decision(&response).await;
        Ok(response.decision)
    }

    pub async fn status(&self, guild_id: GuildId) -> Result<SessionStats> {
        self.registry
            .get(guild_id)
            .await
            .map(|session| session.stats())
            .ok_or(RecorderError::NoActiveRecording)
    }

    /// Stop every live session, flushing what each has captured
    pub async fn shutdown(&self) {
        let sessions = self.registry.drain().await;
        info!("Shutting down {} recording sessions", sessions.len());

        for session in sessions {
            let guild_id = session.guild_id();
            let lock = self.guild_lock(guild_id).await;
            let guard = lock.lock().await;

            match session.stop().await {
                Ok(segments) => info!(
                    "Recording in guild {} stopped on shutdown ({} segments)",
                    session.guild_id(),
                    segments
                ),
                Err(e) => {
                    warn!(
                        "Failed to stop recording in guild {} cleanly: {}",
                        session.guild_id(),
                        e
                    );
                    session.terminate().await;
                }
            }

            drop(guard);
            self.release_guild_lock(guild_id, lock).await;
        }
    }

    /// Guilds with a command lock currently held or awaited
    pub async fn tracked_guilds(&self) -> usize {
        self.guild_locks.lock().await.len()
    }

    async fn guild_lock(&self, guild_id: GuildId) -> Arc<Mutex<()>> {
        let mut locks = self.guild_locks.lock().await;
        Arc::clone(locks.entry(guild_id).or_default())
    }

    /// Forget the guild's lock once no other operation holds or awaits it
    async fn release_guild_lock(&self, guild_id: GuildId, lock: Arc<Mutex<()>>) {
        let mut locks = self.guild_locks.lock().await;
        drop(lock);
        if locks.get(&guild_id).is_some_and(|l| Arc::strong_count(l) == 1) {
            locks.remove(&guild_id);
        }
    }
}
