//! Voice gateway backed by an out-of-process voice bridge
//!
//! The bridge owns the real voice connection. It pushes decoded PCM frames
//! into [`LocalVoiceGateway::push_frame`], and this side records them into
//! per-participant tracks between `start_capture` and `stop_capture`.

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, trace, warn};

use super::capture::{AudioFrame, ParticipantTracks};
use super::cues::{Cue, CueLibrary};
use super::{CaptureFormat, VoiceConnection, VoiceError, VoiceGateway};
use crate::types::{ChannelId, GuildId, ParticipantId, VoiceChannel};

pub struct LocalVoiceGateway {
    cues: Arc<CueLibrary>,
    connections: RwLock<HashMap<GuildId, Arc<LocalVoiceConnection>>>,
}

impl LocalVoiceGateway {
    pub fn new(cues: Arc<CueLibrary>) -> Self {
        Self {
            cues,
            connections: RwLock::new(HashMap::new()),
        }
    }

    /// Live connection for a guild, if any
    pub async fn connection(&self, guild_id: GuildId) -> Option<Arc<LocalVoiceConnection>> {
        let connections = self.connections.read().await;
        connections
            .get(&guild_id)
            .filter(|c| c.is_connected())
            .cloned()
    }

    /// Route a decoded frame from the bridge to the guild's connection
    pub async fn push_frame(
        &self,
        guild_id: GuildId,
        participant: ParticipantId,
        frame: AudioFrame,
    ) -> Result<(), VoiceError> {
        match self.connection(guild_id).await {
            Some(connection) => connection.push_frame(participant, frame).await,
            None => Err(VoiceError::NotConnected),
        }
    }
}

#[async_trait]
impl VoiceGateway for LocalVoiceGateway {
    async fn connect(&self, channel: &VoiceChannel) -> Result<Arc<dyn VoiceConnection>, VoiceError> {
        let mut connections = self.connections.write().await;

        if let Some(existing) = connections.get(&channel.guild_id) {
            if existing.is_connected() {
                return Err(VoiceError::Connect(format!(
                    "guild {} is already connected to channel {}",
                    channel.guild_id, existing.channel_id
                )));
            }
        }

        let connection = Arc::new(LocalVoiceConnection::new(
            channel.guild_id,
            channel.id,
            Arc::clone(&self.cues),
        ));
        connections.insert(channel.guild_id, Arc::clone(&connection));

        info!(
            "Voice bridge connected to channel {} in guild {}",
            channel.id, channel.guild_id
        );

        Ok(connection as Arc<dyn VoiceConnection>)
    }
}

pub struct LocalVoiceConnection {
    guild_id: GuildId,
    channel_id: ChannelId,
    cues: Arc<CueLibrary>,
    connected: AtomicBool,
    tracks: Mutex<Option<ParticipantTracks>>,
}

impl LocalVoiceConnection {
    fn new(guild_id: GuildId, channel_id: ChannelId, cues: Arc<CueLibrary>) -> Self {
        Self {
            guild_id,
            channel_id,
            cues,
            connected: AtomicBool::new(true),
            tracks: Mutex::new(None),
        }
    }

    /// Record a frame; frames arriving while capture is suspended are dropped
    pub async fn push_frame(
        &self,
        participant: ParticipantId,
        frame: AudioFrame,
    ) -> Result<(), VoiceError> {
        if !self.is_connected() {
            return Err(VoiceError::NotConnected);
        }

        let mut tracks = self.tracks.lock().await;
        match tracks.as_mut() {
            Some(tracks) => tracks
                .write_frame(participant, &frame)
                .map_err(|e| VoiceError::Capture(format!("{:#}", e))),
            None => {
                trace!(
                    "Dropping frame from participant {} in guild {}: capture suspended",
                    participant,
                    self.guild_id
                );
                Ok(())
            }
        }
    }
}

#[async_trait]
impl VoiceConnection for LocalVoiceConnection {
    async fn start_capture(
        &self,
        output_dir: &Path,
        format: CaptureFormat,
    ) -> Result<(), VoiceError> {
        if !self.is_connected() {
            return Err(VoiceError::NotConnected);
        }

        let mut tracks = self.tracks.lock().await;
        if tracks.is_some() {
            return Err(VoiceError::Capture("capture already running".to_string()));
        }

        let opened = ParticipantTracks::new(output_dir, format)
            .map_err(|e| VoiceError::Capture(format!("{:#}", e)))?;
        *tracks = Some(opened);

        debug!("Capture started for guild {}", self.guild_id);
        Ok(())
    }

    async fn stop_capture(&self) -> Result<HashMap<ParticipantId, PathBuf>, VoiceError> {
        let mut tracks = self.tracks.lock().await;
        let Some(current) = tracks.take() else {
            return Err(VoiceError::Capture("capture is not running".to_string()));
        };

        let artifacts = current.finish();

        debug!(
            "Capture stopped for guild {} ({} tracks)",
            self.guild_id,
            artifacts.len()
        );
        Ok(artifacts)
    }

    async fn disconnect(&self) -> Result<(), VoiceError> {
        if !self.connected.swap(false, Ordering::SeqCst) {
            return Ok(());
        }

        if let Some(open) = self.tracks.lock().await.take() {
            warn!(
                "Discarding unfinished capture on disconnect in guild {}",
                self.guild_id
            );
            open.discard();
        }

        info!("Voice bridge disconnected from guild {}", self.guild_id);
        Ok(())
    }

    async fn play_cue(&self, cue: Cue) -> Result<(), VoiceError> {
        if !self.is_connected() {
            return Err(VoiceError::NotConnected);
        }

        match self.cues.clip(cue) {
            Some(clip) => {
                info!(
                    "Playing cue '{}' in guild {} ({:.2}s)",
                    cue,
                    self.guild_id,
                    clip.duration.as_secs_f64()
                );
                tokio::time::sleep(clip.duration).await;
            }
            None => warn!("Cue '{}' has no clip configured, skipping", cue),
        }

        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn channel() -> VoiceChannel {
        VoiceChannel {
            id: ChannelId(10),
            guild_id: GuildId(1),
            members: Vec::new(),
        }
    }

    fn frame() -> AudioFrame {
        AudioFrame {
            samples: vec![100; 320],
            sample_rate: 16000,
            channels: 1,
            timestamp_ms: 0,
        }
    }

    #[tokio::test]
    async fn test_capture_cycle_hands_out_tracks_once() {
        let dir = TempDir::new().unwrap();
        let gateway = LocalVoiceGateway::new(Arc::new(CueLibrary::empty()));
        let connection = gateway.connect(&channel()).await.unwrap();

        connection
            .start_capture(dir.path(), CaptureFormat::Wav)
            .await
            .unwrap();
        gateway
            .push_frame(GuildId(1), ParticipantId(5), frame())
            .await
            .unwrap();

        let artifacts = connection.stop_capture().await.unwrap();
        assert_eq!(artifacts.len(), 1);
        assert!(artifacts[&ParticipantId(5)].exists());

        assert!(matches!(
            connection.stop_capture().await,
            Err(VoiceError::Capture(_))
        ));
    }

    #[tokio::test]
    async fn test_frames_dropped_while_suspended() {
        let gateway = LocalVoiceGateway::new(Arc::new(CueLibrary::empty()));
        gateway.connect(&channel()).await.unwrap();

        gateway
            .push_frame(GuildId(1), ParticipantId(5), frame())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_double_start_is_rejected() {
        let dir = TempDir::new().unwrap();
        let gateway = LocalVoiceGateway::new(Arc::new(CueLibrary::empty()));
        let connection = gateway.connect(&channel()).await.unwrap();

        connection
            .start_capture(dir.path(), CaptureFormat::Wav)
            .await
            .unwrap();
        assert!(connection
            .start_capture(dir.path(), CaptureFormat::Wav)
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_disconnect_discards_open_tracks() {
        let dir = TempDir::new().unwrap();
        let gateway = LocalVoiceGateway::new(Arc::new(CueLibrary::empty()));
        let connection = gateway.connect(&channel()).await.unwrap();

        connection
            .start_capture(dir.path(), CaptureFormat::Wav)
            .await
            .unwrap();
        gateway
            .push_frame(GuildId(1), ParticipantId(5), frame())
            .await
            .unwrap();

        connection.disconnect().await.unwrap();

        assert!(!connection.is_connected());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
        assert!(matches!(
            gateway.push_frame(GuildId(1), ParticipantId(5), frame()).await,
            Err(VoiceError::NotConnected)
        ));
        assert!(matches!(
            connection.play_cue(Cue::Stop).await,
            Err(VoiceError::NotConnected)
        ));

        // A fresh connection is allowed once the old one is gone
        assert!(gateway.connect(&channel()).await.is_ok());
    }
}
