use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use super::session::RecordingSession;
use crate::error::{RecorderError, Result};
use crate::types::GuildId;

/// The single live recording session of each guild.
///
/// Only the map access itself is atomic here; ordering between operations
/// on the same guild is the orchestrator's job.
#[derive(Default)]
pub struct SessionRegistry {
    sessions: RwLock<HashMap<GuildId, Arc<RecordingSession>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a session; an occupied guild is rejected untouched
    pub async fn add(&self, guild_id: GuildId, session: Arc<RecordingSession>) -> Result<()> {
        let mut sessions = self.sessions.write().await;
        if sessions.contains_key(&guild_id) {
            return Err(RecorderError::AlreadyRecording);
        }

        debug!("Registered session {} for guild {}", session.id(), guild_id);
        sessions.insert(guild_id, session);
        Ok(())
    }

    pub async fn remove(&self, guild_id: GuildId) -> Option<Arc<RecordingSession>> {
        self.sessions.write().await.remove(&guild_id)
    }

    pub async fn get(&self, guild_id: GuildId) -> Option<Arc<RecordingSession>> {
        self.sessions.read().await.get(&guild_id).cloned()
    }

    /// Remove the guild's entry only if it is still the given session
    pub async fn remove_if(
        &self,
        guild_id: GuildId,
        session_id: Uuid,
    ) -> Option<Arc<RecordingSession>> {
        let mut sessions = self.sessions.write().await;
        match sessions.get(&guild_id) {
            Some(current) if current.id() == session_id => sessions.remove(&guild_id),
            _ => None,
        }
    }

    /// Take every registered session, leaving the registry empty
    pub async fn drain(&self) -> Vec<Arc<RecordingSession>> {
        self.sessions
            .write()
            .await
            .drain()
            .map(|(_, session)| session)
            .collect()
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}
