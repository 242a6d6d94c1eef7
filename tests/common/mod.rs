// Shared fakes for the integration tests
//
// The fake voice layer writes a small file per "speaking" participant into
// the capture directory, so flushes have real artifacts to move or delete.

#![allow(dead_code)]

use anyhow::{bail, Result};
use async_trait::async_trait;
use consent_recorder::consent::{ConsentResponse, ConsentStore};
use consent_recorder::notify::{ConsentPrompt, Notifier};
use consent_recorder::orchestrator::{RecordingSessionOrchestrator, StartRequest};
use consent_recorder::session::{
    RecordingSegment, SegmentPublisher, SessionConfig, SessionRegistry, SessionServices,
};
use consent_recorder::types::{ChannelId, GuildId, Participant, ParticipantId, VoiceChannel};
use consent_recorder::voice::{CaptureFormat, Cue, VoiceConnection, VoiceError, VoiceGateway};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

pub const GUILD: GuildId = GuildId(1);
pub const TEXT_CHANNEL: ChannelId = ChannelId(100);
pub const VOICE_CHANNEL: ChannelId = ChannelId(200);

pub fn alice() -> Participant {
    Participant::new(11, "alice")
}

pub fn bob() -> Participant {
    Participant::new(12, "bob")
}

pub fn carol() -> Participant {
    Participant::new(13, "carol")
}

pub fn music_bot() -> Participant {
    Participant::bot(90, "music bot")
}

pub fn voice_channel(members: Vec<Participant>) -> VoiceChannel {
    VoiceChannel {
        id: VOICE_CHANNEL,
        guild_id: GUILD,
        members,
    }
}

pub fn start_request(members: Vec<Participant>) -> StartRequest {
    StartRequest {
        guild_id: GUILD,
        channel_id: TEXT_CHANNEL,
        requester: alice().id,
        requester_voice: Some(voice_channel(members)),
    }
}

// ============================================================================
// Voice layer
// ============================================================================

#[derive(Default)]
pub struct FakeConnection {
    connected: AtomicBool,
    capture_dir: Mutex<Option<PathBuf>>,
    artifacts: Mutex<HashMap<ParticipantId, PathBuf>>,
    cues: Mutex<Vec<Cue>>,
    pub capture_starts: AtomicUsize,
    pub fail_start: AtomicBool,
    pub fail_stop: AtomicBool,
}

impl FakeConnection {
    fn new(fail_start: bool) -> Self {
        Self {
            connected: AtomicBool::new(true),
            fail_start: AtomicBool::new(fail_start),
            ..Self::default()
        }
    }

    /// Simulate a participant talking; returns the artifact path while capturing
    pub fn speak(&self, participant: ParticipantId) -> Option<PathBuf> {
        let dir = self.capture_dir.lock().unwrap().clone()?;
        let path = dir.join(format!("{}.wav", participant));
        std::fs::write(&path, b"RIFF fake audio").unwrap();
        self.artifacts
            .lock()
            .unwrap()
            .insert(participant, path.clone());
        Some(path)
    }

    pub fn cues(&self) -> Vec<Cue> {
        self.cues.lock().unwrap().clone()
    }

    pub fn cue_count(&self, cue: Cue) -> usize {
        self.cues().into_iter().filter(|c| *c == cue).count()
    }

    pub fn is_capturing(&self) -> bool {
        self.capture_dir.lock().unwrap().is_some()
    }
}

#[async_trait]
impl VoiceConnection for FakeConnection {
    async fn start_capture(
        &self,
        output_dir: &Path,
        _format: CaptureFormat,
    ) -> Result<(), VoiceError> {
        if self.fail_start.load(Ordering::SeqCst) {
            return Err(VoiceError::Capture("capture refused".to_string()));
        }

        let mut dir = self.capture_dir.lock().unwrap();
        if dir.is_some() {
            return Err(VoiceError::Capture("already capturing".to_string()));
        }

        // Unique per start so artifacts of different intervals never collide
        let n = self.capture_starts.fetch_add(1, Ordering::SeqCst);
        let interval_dir = output_dir.join(format!("interval-{}", n));
        std::fs::create_dir_all(&interval_dir).map_err(|e| VoiceError::Capture(e.to_string()))?;
        *dir = Some(interval_dir);
        Ok(())
    }

    async fn stop_capture(&self) -> Result<HashMap<ParticipantId, PathBuf>, VoiceError> {
        if self.fail_stop.load(Ordering::SeqCst) {
            return Err(VoiceError::Capture("capture stop refused".to_string()));
        }

        if self.capture_dir.lock().unwrap().take().is_none() {
            return Err(VoiceError::Capture("not capturing".to_string()));
        }

        Ok(std::mem::take(&mut *self.artifacts.lock().unwrap()))
    }

    async fn disconnect(&self) -> Result<(), VoiceError> {
        self.connected.store(false, Ordering::SeqCst);
        self.capture_dir.lock().unwrap().take();
        Ok(())
    }

    async fn play_cue(&self, cue: Cue) -> Result<(), VoiceError> {
        if !self.is_connected() {
            return Err(VoiceError::NotConnected);
        }
        self.cues.lock().unwrap().push(cue);
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}

#[derive(Default)]
pub struct FakeGateway {
    pub fail_connect: AtomicBool,
    pub fail_start_capture: AtomicBool,
    connections: Mutex<Vec<Arc<FakeConnection>>>,
}

impl FakeGateway {
    pub fn last_connection(&self) -> Arc<FakeConnection> {
        self.connections
            .lock()
            .unwrap()
            .last()
            .cloned()
            .expect("no connection was made")
    }

    pub fn connection_count(&self) -> usize {
        self.connections.lock().unwrap().len()
    }
}

#[async_trait]
impl VoiceGateway for FakeGateway {
    async fn connect(&self, _channel: &VoiceChannel) -> Result<Arc<dyn VoiceConnection>, VoiceError> {
        if self.fail_connect.load(Ordering::SeqCst) {
            return Err(VoiceError::Connect("gateway unavailable".to_string()));
        }

        let connection = Arc::new(FakeConnection::new(
            self.fail_start_capture.load(Ordering::SeqCst),
        ));
        self.connections.lock().unwrap().push(Arc::clone(&connection));
        Ok(connection as Arc<dyn VoiceConnection>)
    }
}

// ============================================================================
// Publisher and notifier
// ============================================================================

#[derive(Default)]
pub struct RecordingPublisher {
    segments: Mutex<Vec<RecordingSegment>>,
    failing: Mutex<HashSet<ParticipantId>>,
}

impl RecordingPublisher {
    pub fn fail_for(&self, participant: ParticipantId) {
        self.failing.lock().unwrap().insert(participant);
    }

    pub fn segments(&self) -> Vec<RecordingSegment> {
        self.segments.lock().unwrap().clone()
    }

    pub fn published_for(&self, participant: ParticipantId) -> usize {
        self.segments()
            .iter()
            .filter(|s| s.participant_id == participant)
            .count()
    }
}

#[async_trait]
impl SegmentPublisher for RecordingPublisher {
    async fn publish(&self, segment: &RecordingSegment) -> Result<()> {
        if self.failing.lock().unwrap().contains(&segment.participant_id) {
            bail!("broker unavailable");
        }
        self.segments.lock().unwrap().push(segment.clone());
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingNotifier {
    pub direct_fails: AtomicBool,
    direct: Mutex<Vec<ConsentPrompt>>,
    channel: Mutex<Vec<(ChannelId, ConsentPrompt)>>,
    notices: Mutex<Vec<(ChannelId, String)>>,
}

impl RecordingNotifier {
    pub fn direct_prompts(&self) -> Vec<ParticipantId> {
        self.direct
            .lock()
            .unwrap()
            .iter()
            .map(|p| p.participant.id)
            .collect()
    }

    pub fn channel_prompts(&self) -> Vec<(ChannelId, ParticipantId)> {
        self.channel
            .lock()
            .unwrap()
            .iter()
            .map(|(channel, p)| (*channel, p.participant.id))
            .collect()
    }

    pub fn notices(&self) -> Vec<(ChannelId, String)> {
        self.notices.lock().unwrap().clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send_direct_prompt(&self, prompt: &ConsentPrompt) -> Result<()> {
        if self.direct_fails.load(Ordering::SeqCst) {
            bail!("direct messages disabled");
        }
        self.direct.lock().unwrap().push(prompt.clone());
        Ok(())
    }

    async fn send_channel_prompt(&self, channel_id: ChannelId, prompt: &ConsentPrompt) -> Result<()> {
        self.channel.lock().unwrap().push((channel_id, prompt.clone()));
        Ok(())
    }

    async fn send_notice(&self, channel_id: ChannelId, text: &str) -> Result<()> {
        self.notices
            .lock()
            .unwrap()
            .push((channel_id, text.to_string()));
        Ok(())
    }
}

// ============================================================================
// Harness
// ============================================================================

pub struct Harness {
    pub dir: TempDir,
    pub gateway: Arc<FakeGateway>,
    pub publisher: Arc<RecordingPublisher>,
    pub notifier: Arc<RecordingNotifier>,
    pub consent: Arc<ConsentStore>,
    pub registry: Arc<SessionRegistry>,
    pub config: SessionConfig,
}

impl Harness {
    /// Rotation interval long enough that the timer never fires on its own
    pub fn new() -> Result<Self> {
        Self::with_rotation(Duration::from_secs(3600))
    }

    pub fn with_rotation(rotation_interval: Duration) -> Result<Self> {
        let dir = TempDir::new()?;
        let config = SessionConfig {
            rotation_interval,
            audio_dir: dir.path().join("audio"),
            capture_dir: dir.path().join("capture"),
            format: CaptureFormat::Wav,
        };

        Ok(Self {
            consent: Arc::new(ConsentStore::new(dir.path().join("consent.json"))),
            gateway: Arc::new(FakeGateway::default()),
            publisher: Arc::new(RecordingPublisher::default()),
            notifier: Arc::new(RecordingNotifier::default()),
            registry: Arc::new(SessionRegistry::new()),
            config,
            dir,
        })
    }

    pub fn services(&self) -> SessionServices {
        SessionServices {
            consent: Arc::clone(&self.consent),
            publisher: self.publisher.clone(),
            notifier: self.notifier.clone(),
            registry: Arc::clone(&self.registry),
        }
    }

    pub fn orchestrator(&self) -> RecordingSessionOrchestrator {
        RecordingSessionOrchestrator::new(
            self.gateway.clone(),
            self.services(),
            self.config.clone(),
        )
    }

    pub async fn grant(&self, participant: &Participant) {
        self.consent
            .record_decision(&ConsentResponse::allow(participant.id))
            .await;
    }

    pub async fn deny(&self, participant: &Participant) {
        self.consent
            .record_decision(&ConsentResponse::deny(participant.id))
            .await;
    }
}

/// Poll `condition` until it holds or `timeout` elapses
pub async fn wait_until(timeout: Duration, condition: impl Fn() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}
