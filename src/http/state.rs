use std::sync::Arc;

use crate::orchestrator::RecordingSessionOrchestrator;
use crate::voice::LocalVoiceGateway;

/// Shared application state for HTTP handlers
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<RecordingSessionOrchestrator>,
    /// Receives PCM frames from the voice bridge
    pub gateway: Arc<LocalVoiceGateway>,
}

impl AppState {
    pub fn new(
        orchestrator: Arc<RecordingSessionOrchestrator>,
        gateway: Arc<LocalVoiceGateway>,
    ) -> Self {
        Self {
            orchestrator,
            gateway,
        }
    }
}
