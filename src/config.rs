use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

use crate::feedback::{CounterScope, DEFAULT_REJECTION_THRESHOLD};
use crate::session::SessionConfig;
use crate::voice::{CaptureFormat, Cue};

const ENV_PREFIX: &str = "RECORDER";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub service: ServiceConfig,
    pub logging: LoggingConfig,
    pub nats: NatsConfig,
    pub recording: RecordingConfig,
    pub consent: ConsentConfig,
    pub cues: CueConfig,
    pub feedback: FeedbackConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub name: String,
    pub http: HttpConfig,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: "consent-recorder".to_string(),
            http: HttpConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub bind: String,
    pub port: u16,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive used when RUST_LOG is not set
    pub level: String,
    /// "text" or "json"
    pub format: String,
    /// Optional log file written alongside the console output
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "text".to_string(),
            file: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NatsConfig {
    pub url: String,
    /// Consented segments are published here
    pub audio_subject: String,
    /// Downstream rejections arrive here
    pub rejected_subject: String,
    /// Direct consent prompts (request/reply)
    pub direct_subject: String,
    /// Channel prompts and notices
    pub channel_subject: String,
    pub request_timeout_ms: u64,
}

impl Default for NatsConfig {
    fn default() -> Self {
        Self {
            url: "nats://localhost:4222".to_string(),
            audio_subject: "audio.segments".to_string(),
            rejected_subject: "audio.segments.rejected".to_string(),
            direct_subject: "recorder.notify.direct".to_string(),
            channel_subject: "recorder.notify.channel".to_string(),
            request_timeout_ms: 3000,
        }
    }
}

impl NatsConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RecordingConfig {
    /// Root of the durable per-participant segment directories
    pub audio_dir: PathBuf,
    /// Where the voice layer writes raw captures between rotations
    pub capture_dir: PathBuf,
    pub rotation_interval_secs: u64,
    pub format: CaptureFormat,
}

impl Default for RecordingConfig {
    fn default() -> Self {
        Self {
            audio_dir: PathBuf::from("audio"),
            capture_dir: PathBuf::from("audio/capture"),
            rotation_interval_secs: 15,
            format: CaptureFormat::Wav,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ConsentConfig {
    pub file: PathBuf,
}

impl Default for ConsentConfig {
    fn default() -> Self {
        Self {
            file: PathBuf::from("consent.json"),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CueConfig {
    pub start: Option<PathBuf>,
    pub stop: Option<PathBuf>,
    pub error: Option<PathBuf>,
}

impl Default for CueConfig {
    fn default() -> Self {
        Self {
            start: Some(PathBuf::from("messages/start-recording.wav")),
            stop: Some(PathBuf::from("messages/stop-recording.wav")),
            error: Some(PathBuf::from("messages/error-message.wav")),
        }
    }
}

impl CueConfig {
    pub fn path_for(&self, cue: Cue) -> Option<PathBuf> {
        match cue {
            Cue::Start => self.start.clone(),
            Cue::Stop => self.stop.clone(),
            Cue::Error => self.error.clone(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FeedbackConfig {
    /// Rejections counted before an error cue is played
    pub threshold: u32,
    pub scope: CounterScope,
}

impl Default for FeedbackConfig {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_REJECTION_THRESHOLD,
            scope: CounterScope::default(),
        }
    }
}

impl Config {
    /// Load from an optional file (extension inferred) layered under
    /// `RECORDER__SECTION__KEY` environment variables
    pub fn load(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path).required(false))
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .with_context(|| format!("Failed to read configuration from {}", path))?;

        let mut cfg: Self = settings
            .try_deserialize()
            .context("Invalid configuration")?;
        cfg.expand_paths()?;

        Ok(cfg)
    }

    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            rotation_interval: Duration::from_secs(self.recording.rotation_interval_secs.max(1)),
            audio_dir: self.recording.audio_dir.clone(),
            capture_dir: self.recording.capture_dir.clone(),
            format: self.recording.format,
        }
    }

    fn expand_paths(&mut self) -> Result<()> {
        self.recording.audio_dir = expand(&self.recording.audio_dir)?;
        self.recording.capture_dir = expand(&self.recording.capture_dir)?;
        self.consent.file = expand(&self.consent.file)?;

        for path in [
            &mut self.cues.start,
            &mut self.cues.stop,
            &mut self.cues.error,
            &mut self.logging.file,
        ]
        .into_iter()
        .flatten()
        {
            *path = expand(path)?;
        }

        Ok(())
    }
}

fn expand(path: &std::path::Path) -> Result<PathBuf> {
    let raw = path.to_string_lossy();
    let expanded = shellexpand::full(&raw)
        .with_context(|| format!("Failed to expand path: {}", raw))?;
    Ok(PathBuf::from(expanded.into_owned()))
}
