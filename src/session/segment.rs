use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::io;
use std::path::{Path, PathBuf};
use tracing::debug;
use uuid::Uuid;

use crate::types::{ChannelId, GuildId, ParticipantId};

const MAX_DIR_NAME_LEN: usize = 64;
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d-%H-%M";

/// One participant's consented audio for a single rotation interval
#[derive(Debug, Clone, PartialEq)]
pub struct RecordingSegment {
    pub id: Uuid,
    pub path: PathBuf,
    pub participant_id: ParticipantId,
    pub participant: String,
    /// Voice channel the audio was captured in
    pub channel_id: ChannelId,
    pub guild_id: GuildId,
    pub captured_at: DateTime<Utc>,
}

/// Hands finished segments to the downstream pipeline
#[async_trait]
pub trait SegmentPublisher: Send + Sync {
    async fn publish(&self, segment: &RecordingSegment) -> Result<()>;
}

/// Directory-safe form of a display name.
///
/// Anything that is not a word character or `-` becomes `_`, leading and
/// trailing underscores are trimmed, and the result is capped at 64 chars.
pub fn safe_dir_name(name: &str, fallback: ParticipantId) -> String {
    let replaced: String = name
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect();

    let safe: String = replaced
        .trim_matches('_')
        .chars()
        .take(MAX_DIR_NAME_LEN)
        .collect();

    if safe.is_empty() {
        fallback.to_string()
    } else {
        safe
    }
}

/// Durable location for a participant's segment:
/// `<audio_dir>/<name>/<timestamp>/<id>-<timestamp>.<ext>`
pub fn segment_path(
    audio_dir: &Path,
    dir_name: &str,
    id: Uuid,
    captured_at: DateTime<Utc>,
    extension: &str,
) -> PathBuf {
    let timestamp = captured_at.format(TIMESTAMP_FORMAT).to_string();
    audio_dir
        .join(dir_name)
        .join(&timestamp)
        .join(format!("{}-{}.{}", id, timestamp, extension))
}

/// Move an artifact into place, copying across filesystems when needed
pub async fn relocate(from: &Path, to: &Path) -> io::Result<()> {
    if let Some(parent) = to.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    if let Err(e) = tokio::fs::rename(from, to).await {
        debug!(
            "Rename {} -> {} failed ({}), falling back to copy",
            from.display(),
            to.display(),
            e
        );
        tokio::fs::copy(from, to).await?;
        tokio::fs::remove_file(from).await?;
    }

    Ok(())
}

/// Delete an artifact; already-missing files are fine
pub async fn discard(path: &Path) -> io::Result<()> {
    match tokio::fs::remove_file(path).await {
        Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::TempDir;

    #[test]
    fn test_safe_dir_name() {
        let id = ParticipantId(99);
        assert_eq!(safe_dir_name("alice", id), "alice");
        assert_eq!(safe_dir_name("bob the builder", id), "bob_the_builder");
        assert_eq!(safe_dir_name("__x.y__", id), "x_y");
        assert_eq!(safe_dir_name("ñandú-7", id), "ñandú-7");
        assert_eq!(safe_dir_name("../../etc", id), "etc");
        assert_eq!(safe_dir_name("...", id), "99");
        assert_eq!(safe_dir_name(&"a".repeat(100), id).len(), 64);
    }

    #[test]
    fn test_segment_path_layout() {
        let at = Utc.with_ymd_and_hms(2024, 3, 9, 17, 5, 42).unwrap();
        let id = Uuid::nil();
        let path = segment_path(Path::new("audio"), "alice", id, at, "wav");

        assert_eq!(
            path,
            PathBuf::from(format!(
                "audio/alice/2024-03-09-17-05/{}-2024-03-09-17-05.wav",
                id
            ))
        );
    }

    #[tokio::test]
    async fn test_relocate_moves_file() {
        let dir = TempDir::new().unwrap();
        let from = dir.path().join("raw.wav");
        let to = dir.path().join("a").join("b").join("final.wav");
        std::fs::write(&from, b"audio").unwrap();

        relocate(&from, &to).await.unwrap();

        assert!(!from.exists());
        assert_eq!(std::fs::read(&to).unwrap(), b"audio");
    }

    #[tokio::test]
    async fn test_discard_tolerates_missing_file() {
        let dir = TempDir::new().unwrap();
        discard(&dir.path().join("gone.wav")).await.unwrap();
    }
}
