use anyhow::{Context, Result};
use hound::WavReader;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

use crate::config::CueConfig;

/// Audible notifications played into the voice channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Cue {
    Start,
    Stop,
    Error,
}

impl Cue {
    pub const ALL: [Cue; 3] = [Cue::Start, Cue::Stop, Cue::Error];

    pub fn name(self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Stop => "stop",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for Cue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A validated cue clip on disk
#[derive(Debug, Clone)]
pub struct CueClip {
    pub path: PathBuf,
    pub duration: Duration,
    pub sample_rate: u32,
    pub channels: u16,
}

impl CueClip {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        let reader = WavReader::open(path)
            .with_context(|| format!("Failed to open cue clip: {}", path.display()))?;

        let spec = reader.spec();
        // duration() counts frames (samples per channel)
        let duration_secs = reader.duration() as f64 / spec.sample_rate as f64;

        Ok(Self {
            path: path.to_path_buf(),
            duration: Duration::from_secs_f64(duration_secs),
            sample_rate: spec.sample_rate,
            channels: spec.channels,
        })
    }
}

/// Resolves logical cues to clips
#[derive(Debug, Clone, Default)]
pub struct CueLibrary {
    clips: HashMap<Cue, CueClip>,
}

impl CueLibrary {
    /// Library with no clips; every cue plays as silence
    pub fn empty() -> Self {
        Self::default()
    }

    /// Load and validate the configured clips.
    ///
    /// Missing files are skipped with a warning; a file that exists but is
    /// not a readable WAV is an error.
    pub fn load(config: &CueConfig) -> Result<Self> {
        let mut clips = HashMap::new();

        for cue in Cue::ALL {
            let Some(path) = config.path_for(cue) else {
                continue;
            };

            if !path.exists() {
                warn!("Cue '{}' not found at {}, it will be skipped", cue, path.display());
                continue;
            }

            let clip = CueClip::open(&path)?;
            info!(
                "Loaded cue '{}': {} ({:.2}s, {}Hz, {}ch)",
                cue,
                path.display(),
                clip.duration.as_secs_f64(),
                clip.sample_rate,
                clip.channels
            );
            clips.insert(cue, clip);
        }

        Ok(Self { clips })
    }

    pub fn with_clip(mut self, cue: Cue, clip: CueClip) -> Self {
        self.clips.insert(cue, clip);
        self
    }

    pub fn clip(&self, cue: Cue) -> Option<&CueClip> {
        self.clips.get(&cue)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_clip(path: &Path, sample_rate: u32, frames: usize) {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(path, spec).unwrap();
        for _ in 0..frames {
            writer.write_sample(0i16).unwrap();
        }
        writer.finalize().unwrap();
    }

    #[test]
    fn test_clip_duration() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("start.wav");
        write_clip(&path, 16000, 8000);

        let clip = CueClip::open(&path).unwrap();
        assert_eq!(clip.duration, Duration::from_millis(500));
        assert_eq!(clip.sample_rate, 16000);
    }

    #[test]
    fn test_load_skips_missing_clips() {
        let dir = TempDir::new().unwrap();
        let start = dir.path().join("start.wav");
        write_clip(&start, 8000, 800);

        let config = CueConfig {
            start: Some(start.clone()),
            stop: Some(dir.path().join("missing.wav")),
            error: None,
        };

        let library = CueLibrary::load(&config).unwrap();
        assert!(library.clip(Cue::Start).is_some());
        assert!(library.clip(Cue::Stop).is_none());
        assert!(library.clip(Cue::Error).is_none());
    }

    #[test]
    fn test_load_rejects_invalid_wav() {
        let dir = TempDir::new().unwrap();
        let bogus = dir.path().join("error.wav");
        std::fs::write(&bogus, b"not a wav file").unwrap();

        let config = CueConfig {
            start: None,
            stop: None,
            error: Some(bogus),
        };

        assert!(CueLibrary::load(&config).is_err());
    }
}
