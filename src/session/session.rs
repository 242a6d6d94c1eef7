use chrono::{DateTime, Utc};
use futures::future::join_all;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{watch, Mutex, Notify};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::config::SessionConfig;
use super::registry::SessionRegistry;
use super::segment::{self, RecordingSegment, SegmentPublisher};
use super::stats::{SessionState, SessionStats};
use crate::consent::{ConsentRecord, ConsentStore};
use crate::error::{RecorderError, Result};
use crate::notify::{self, Notifier};
use crate::types::{ChannelId, GuildId, Participant, ParticipantId, VoiceChannel};
use crate::voice::{Cue, VoiceConnection, VoiceError, VoiceGateway};

const ROTATION_FAILED_NOTICE: &str = "Error processing recordings, the recording has been stopped.";

/// Collaborators every session uses
#[derive(Clone)]
pub struct SessionServices {
    pub consent: Arc<ConsentStore>,
    pub publisher: Arc<dyn SegmentPublisher>,
    pub notifier: Arc<dyn Notifier>,
    pub registry: Arc<SessionRegistry>,
}

/// One active recording in a guild.
///
/// Periodic rotation, stop and terminate all run under `rotation_lock`, so
/// each batch of capture artifacts is claimed and flushed exactly once.
pub struct RecordingSession {
    id: Uuid,
    guild_id: GuildId,
    /// Text channel the recording was started from; notices go here
    channel_id: ChannelId,
    voice_channel_id: ChannelId,
    config: SessionConfig,
    services: SessionServices,
    connection: Arc<dyn VoiceConnection>,
    started_at: DateTime<Utc>,
    state: watch::Sender<SessionState>,
    rotation_lock: Mutex<()>,
    /// Known participants, for display names and bot detection
    roster: Mutex<HashMap<ParticipantId, Participant>>,
    timer_cancel: Arc<Notify>,
    timer_handle: Mutex<Option<JoinHandle<()>>>,
    rotations: AtomicUsize,
    segments_published: AtomicUsize,
}

impl RecordingSession {
    /// Join the voice channel, begin capturing and schedule rotation.
    ///
    /// The session is not registered; that is left to the caller.
    pub async fn start(
        guild_id: GuildId,
        channel_id: ChannelId,
        voice_channel: &VoiceChannel,
        gateway: &dyn VoiceGateway,
        config: SessionConfig,
        services: SessionServices,
    ) -> Result<Arc<Self>> {
        info!(
            "Starting recording in guild {} (voice channel {})",
            guild_id, voice_channel.id
        );

        let connection = gateway.connect(voice_channel).await?;

        if let Err(e) = connection
            .start_capture(&config.capture_dir, config.format)
            .await
        {
            error!("Failed to start capture in guild {}: {}", guild_id, e);
            if connection.is_connected() {
                if let Err(e) = connection.play_cue(Cue::Error).await {
                    warn!("Failed to play error cue in guild {}: {}", guild_id, e);
                }
            }
            if let Err(e) = connection.disconnect().await {
                warn!("Failed to disconnect after capture error: {}", e);
            }
            return Err(e.into());
        }

        let roster = voice_channel
            .members
            .iter()
            .map(|m| (m.id, m.clone()))
            .collect();

        let (state, _) = watch::channel(SessionState::Active);

        let session = Arc::new(Self {
            id: Uuid::new_v4(),
            guild_id,
            channel_id,
            voice_channel_id: voice_channel.id,
            config,
            services,
            connection,
            started_at: Utc::now(),
            state,
            rotation_lock: Mutex::new(()),
            roster: Mutex::new(roster),
            timer_cancel: Arc::new(Notify::new()),
            timer_handle: Mutex::new(None),
            rotations: AtomicUsize::new(0),
            segments_published: AtomicUsize::new(0),
        });

        let timer = Self::spawn_rotation_timer(&session);
        *session.timer_handle.lock().await = Some(timer);

        session.queue_cue(Cue::Start);

        info!("Recording session {} started in guild {}", session.id, guild_id);

        Ok(session)
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn guild_id(&self) -> GuildId {
        self.guild_id
    }

    pub fn channel_id(&self) -> ChannelId {
        self.channel_id
    }

    pub fn voice_channel_id(&self) -> ChannelId {
        self.voice_channel_id
    }

    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    pub fn is_connected(&self) -> bool {
        self.connection.is_connected()
    }

    /// Add or refresh a participant in the roster
    pub async fn admit(&self, participant: Participant) {
        self.roster.lock().await.insert(participant.id, participant);
    }

    pub async fn roster(&self) -> Vec<Participant> {
        self.roster.lock().await.values().cloned().collect()
    }

    /// Play a cue without waiting for it; `None` when not connected
    pub fn queue_cue(&self, cue: Cue) -> Option<JoinHandle<()>> {
        if !self.connection.is_connected() {
            return None;
        }

        let connection = Arc::clone(&self.connection);
        let guild_id = self.guild_id;

        Some(tokio::spawn(async move {
            if let Err(e) = connection.play_cue(cue).await {
                warn!("Failed to play cue '{}' in guild {}: {}", cue, guild_id, e);
            }
        }))
    }

    /// Suspend capture, flush what was captured, and resume.
    ///
    /// A no-op returning 0 unless the session is `Active`. A voice-layer
    /// failure ends the session.
    pub async fn rotate(&self) -> Result<usize> {
        let _guard = self.rotation_lock.lock().await;

        if self.state() != SessionState::Active {
            debug!("Skipping rotation for guild {}: session not active", self.guild_id);
            return Ok(0);
        }

        self.set_state(SessionState::Rotating);
        info!("Processing recordings in guild {}", self.guild_id);

        let artifacts = match self.connection.stop_capture().await {
            Ok(artifacts) => artifacts,
            Err(e) => {
                self.fail_locked(&e, Some(ROTATION_FAILED_NOTICE)).await;
                return Err(e.into());
            }
        };

        let published = self.flush(artifacts).await;

        if let Err(e) = self
            .connection
            .start_capture(&self.config.capture_dir, self.config.format)
            .await
        {
            self.fail_locked(&e, Some(ROTATION_FAILED_NOTICE)).await;
            return Err(e.into());
        }

        self.rotations.fetch_add(1, Ordering::SeqCst);
        self.set_state(SessionState::Active);

        info!("Processed {} recordings in guild {}", published, self.guild_id);

        Ok(published)
    }

    /// Final rotation: cancel the timer, flush the remainder and terminate.
    ///
    /// A rotation already in flight finishes first. Returns the number of
    /// segments produced by the final flush.
    pub async fn stop(&self) -> Result<usize> {
        if let Some(timer) = self.cancel_timer().await {
            if let Err(e) = timer.await {
                warn!("Rotation timer for guild {} ended abnormally: {}", self.guild_id, e);
            }
        }

        let _guard = self.rotation_lock.lock().await;

        if self.state() == SessionState::Stopped {
            return Err(RecorderError::NoActiveRecording);
        }

        info!("Stopping recording session {} in guild {}", self.id, self.guild_id);
        self.set_state(SessionState::Rotating);

        let artifacts = match self.connection.stop_capture().await {
            Ok(artifacts) => artifacts,
            Err(e) => {
                self.fail_locked(&e, None).await;
                return Err(e.into());
            }
        };

        let stop_cue = self.queue_cue(Cue::Stop);

        let published = self.flush(artifacts).await;
        self.rotations.fetch_add(1, Ordering::SeqCst);

        // The stop cue has to finish before we leave the channel
        if let Some(cue) = stop_cue {
            if let Err(e) = cue.await {
                warn!("Stop cue task failed: {}", e);
            }
        }

        self.terminate_locked().await;

        Ok(published)
    }

    /// Release everything and enter `Stopped`. Idempotent.
    pub async fn terminate(&self) {
        let _guard = self.rotation_lock.lock().await;
        self.terminate_locked().await;
    }

    /// Turn captured artifacts into published segments.
    ///
    /// Consent is read fresh. Bot, undecided and denied captures are deleted.
    /// A failure on one artifact is logged and does not affect the others.
    /// Returns the number of segments published.
    pub async fn flush(&self, artifacts: HashMap<ParticipantId, PathBuf>) -> usize {
        if artifacts.is_empty() {
            return 0;
        }

        let consent = self.services.consent.load().await;
        let roster = self.roster.lock().await.clone();
        let captured_at = Utc::now();

        let results = join_all(artifacts.into_iter().map(|(participant_id, artifact)| {
            self.process_artifact(
                participant_id,
                artifact,
                &consent,
                roster.get(&participant_id),
                captured_at,
            )
        }))
        .await;

        let mut published = 0;
        for result in results {
            match result {
                Ok(Some(_)) => published += 1,
                Ok(None) => {}
                Err(e) => error!("{}", e),
            }
        }

        self.segments_published.fetch_add(published, Ordering::SeqCst);
        published
    }

    pub fn stats(&self) -> SessionStats {
        let duration = Utc::now().signed_duration_since(self.started_at);

        SessionStats {
            session_id: self.id,
            guild_id: self.guild_id,
            voice_channel_id: self.voice_channel_id,
            state: self.state(),
            started_at: self.started_at,
            duration_secs: duration.num_milliseconds() as f64 / 1000.0,
            rotations: self.rotations.load(Ordering::SeqCst),
            segments_published: self.segments_published.load(Ordering::SeqCst),
        }
    }

    async fn process_artifact(
        &self,
        participant_id: ParticipantId,
        artifact: PathBuf,
        consent: &ConsentRecord,
        participant: Option<&Participant>,
        captured_at: DateTime<Utc>,
    ) -> Result<Option<RecordingSegment>> {
        if participant.is_some_and(|p| p.bot) {
            segment::discard(&artifact)
                .await
                .map_err(|e| RecorderError::artifact(participant_id, e))?;
            debug!("Discarded capture from bot {}", participant_id);
            return Ok(None);
        }

        if !consent.is_granted(participant_id) {
            segment::discard(&artifact)
                .await
                .map_err(|e| RecorderError::artifact(participant_id, e))?;
            info!("Deleted unconsented recording from {}", participant_id);
            return Ok(None);
        }

        let name = participant
            .map(|p| p.name.clone())
            .unwrap_or_else(|| participant_id.to_string());

        let id = Uuid::new_v4();
        let path = segment::segment_path(
            &self.config.audio_dir,
            &segment::safe_dir_name(&name, participant_id),
            id,
            captured_at,
            self.config.format.extension(),
        );

        segment::relocate(&artifact, &path)
            .await
            .map_err(|e| RecorderError::artifact(participant_id, e))?;

        let segment = RecordingSegment {
            id,
            path,
            participant_id,
            participant: name,
            channel_id: self.voice_channel_id,
            guild_id: self.guild_id,
            captured_at,
        };

        self.services
            .publisher
            .publish(&segment)
            .await
            .map_err(|e| RecorderError::artifact(participant_id, format!("publish failed: {:#}", e)))?;

        debug!(
            "Published segment {} for {} ({})",
            segment.id,
            segment.participant,
            segment.path.display()
        );

        Ok(Some(segment))
    }

    /// Session-fatal voice failure: play the error cue, tell the channel, terminate
    async fn fail_locked(&self, cause: &VoiceError, notice: Option<&str>) {
        error!(
            "Recording session {} in guild {} failed: {}",
            self.id, self.guild_id, cause
        );

        if self.connection.is_connected() {
            if let Err(e) = self.connection.play_cue(Cue::Error).await {
                warn!("Failed to play error cue in guild {}: {}", self.guild_id, e);
            }
        }

        if let Some(text) = notice {
            notify::notify(self.services.notifier.as_ref(), self.channel_id, text).await;
        }

        self.terminate_locked().await;
    }

    async fn terminate_locked(&self) {
        if self.state() == SessionState::Stopped {
            return;
        }

        // May run on the timer task itself, so the handle is only detached here
        drop(self.cancel_timer().await);

        if let Err(e) = self.connection.disconnect().await {
            warn!("Failed to disconnect from guild {}: {}", self.guild_id, e);
        }

        self.services.registry.remove_if(self.guild_id, self.id).await;
        self.set_state(SessionState::Stopped);

        info!("Recording session {} terminated in guild {}", self.id, self.guild_id);
    }

    async fn cancel_timer(&self) -> Option<JoinHandle<()>> {
        self.timer_cancel.notify_one();
        self.timer_handle.lock().await.take()
    }

    fn set_state(&self, state: SessionState) {
        self.state.send_replace(state);
    }

    fn spawn_rotation_timer(session: &Arc<Self>) -> JoinHandle<()> {
        let weak = Arc::downgrade(session);
        let cancel = Arc::clone(&session.timer_cancel);
        let period = session.config.rotation_interval;
        let guild_id = session.guild_id;

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    biased;
                    _ = cancel.notified() => break,
                    _ = ticker.tick() => {}
                }

                let Some(session) = weak.upgrade() else {
                    break;
                };

                if session.rotate().await.is_err() || !session.state().is_live() {
                    break;
                }
            }

            debug!("Rotation timer for guild {} stopped", guild_id);
        })
    }
}
