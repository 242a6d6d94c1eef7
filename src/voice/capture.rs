use anyhow::{bail, Context, Result};
use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{BufWriter, ErrorKind};
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};

use super::CaptureFormat;
use crate::types::ParticipantId;

/// Decoded audio for one speaker (16-bit PCM, interleaved)
#[derive(Debug, Clone)]
pub struct AudioFrame {
    /// Raw audio samples (i16 PCM, interleaved)
    pub samples: Vec<i16>,
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Number of channels
    pub channels: u16,
    /// Timestamp in milliseconds since capture started
    pub timestamp_ms: u64,
}

/// One capture interval's worth of per-participant tracks.
///
/// Each participant gets its own WAV file, created on their first frame.
pub struct ParticipantTracks {
    output_dir: PathBuf,
    format: CaptureFormat,
    capture_id: String,
    writers: HashMap<ParticipantId, TrackWriter>,
}

impl ParticipantTracks {
    pub fn new(output_dir: impl Into<PathBuf>, format: CaptureFormat) -> Result<Self> {
        let output_dir = output_dir.into();

        fs::create_dir_all(&output_dir).context("Failed to create capture directory")?;

        let capture_id = uuid::Uuid::new_v4().simple().to_string();
        debug!("Capture {} opened in {}", capture_id, output_dir.display());

        Ok(Self {
            output_dir,
            format,
            capture_id,
            writers: HashMap::new(),
        })
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Append a frame to the participant's track
    pub fn write_frame(&mut self, participant: ParticipantId, frame: &AudioFrame) -> Result<()> {
        if !self.writers.contains_key(&participant) {
            let path = self.output_dir.join(format!(
                "{}-{}.{}",
                participant,
                self.capture_id,
                self.format.extension()
            ));
            let writer = TrackWriter::new(path, frame.sample_rate, frame.channels)?;
            self.writers.insert(participant, writer);
        }

        match self.writers.get_mut(&participant) {
            Some(writer) => writer.write_frame(frame),
            None => bail!("No track for participant {}", participant),
        }
    }

    /// Finalize every track and return the artifact paths.
    ///
    /// A track that fails to finalize is removed from disk and left out of
    /// the result; the remaining tracks are still returned.
    pub fn finish(mut self) -> HashMap<ParticipantId, PathBuf> {
        let finished = self.writers.drain().map(|(participant, writer)| {
            let path = writer.path.clone();
            let samples = writer.sample_count;
            (participant, path, samples, writer.finish())
        });

        collect_tracks(finished)
    }

    /// Drop every track and delete the partial files
    pub fn discard(mut self) {
        for (_, writer) in self.writers.drain() {
            let path = writer.path.clone();
            drop(writer);
            if let Err(e) = fs::remove_file(&path) {
                warn!("Failed to remove discarded track {}: {}", path.display(), e);
            }
        }
    }
}

fn collect_tracks(
    finished: impl Iterator<Item = (ParticipantId, PathBuf, usize, Result<PathBuf>)>,
) -> HashMap<ParticipantId, PathBuf> {
    let mut artifacts = HashMap::new();

    for (participant, path, samples, result) in finished {
        match result {
            Ok(path) => {
                info!(
                    "Track complete for participant {}: {} ({} samples)",
                    participant,
                    path.display(),
                    samples
                );
                artifacts.insert(participant, path);
            }
            Err(e) => {
                error!("Dropping track for participant {}: {:#}", participant, e);
                if let Err(e) = fs::remove_file(&path) {
                    if e.kind() != ErrorKind::NotFound {
                        warn!("Failed to remove broken track {}: {}", path.display(), e);
                    }
                }
            }
        }
    }

    artifacts
}

/// Writes a single participant's track to disk as a WAV file
struct TrackWriter {
    writer: Option<hound::WavWriter<BufWriter<File>>>,
    path: PathBuf,
    sample_rate: u32,
    channels: u16,
    sample_count: usize,
}

impl TrackWriter {
    fn new(path: PathBuf, sample_rate: u32, channels: u16) -> Result<Self> {
        let spec = hound::WavSpec {
            channels,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };

        let writer = hound::WavWriter::create(&path, spec)
            .with_context(|| format!("Failed to create WAV file: {:?}", path))?;

        Ok(Self {
            writer: Some(writer),
            path,
            sample_rate,
            channels,
            sample_count: 0,
        })
    }

    fn write_frame(&mut self, frame: &AudioFrame) -> Result<()> {
        if frame.sample_rate != self.sample_rate || frame.channels != self.channels {
            bail!(
                "Frame format {}Hz/{}ch does not match track format {}Hz/{}ch",
                frame.sample_rate,
                frame.channels,
                self.sample_rate,
                self.channels
            );
        }

        if let Some(writer) = &mut self.writer {
            for &sample in &frame.samples {
                writer
                    .write_sample(sample)
                    .context("Failed to write sample to WAV")?;
            }
            self.sample_count += frame.samples.len();
        }

        Ok(())
    }

    fn finish(mut self) -> Result<PathBuf> {
        if let Some(writer) = self.writer.take() {
            writer.finalize().context("Failed to finalize WAV file")?;
        }

        Ok(self.path.clone())
    }
}

impl Drop for TrackWriter {
    fn drop(&mut self) {
        if let Some(writer) = self.writer.take() {
            if let Err(e) = writer.finalize() {
                warn!("Failed to finalize WAV writer on drop: {}", e);
            }
        }
    }
}
