use std::path::PathBuf;
use std::time::Duration;

use crate::voice::CaptureFormat;

/// Configuration shared by every recording session
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// How often captured audio is flushed into segments
    /// Default: 15 seconds
    pub rotation_interval: Duration,

    /// Root of the durable per-participant directories
    pub audio_dir: PathBuf,

    /// Where the voice layer writes raw captures between rotations
    pub capture_dir: PathBuf,

    /// Container format requested from the voice layer
    pub format: CaptureFormat,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            rotation_interval: Duration::from_secs(15),
            audio_dir: PathBuf::from("audio"),
            capture_dir: PathBuf::from("audio/capture"),
            format: CaptureFormat::Wav,
        }
    }
}
