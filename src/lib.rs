pub mod config;
pub mod consent;
pub mod error;
pub mod feedback;
pub mod http;
pub mod nats;
pub mod notify;
pub mod orchestrator;
pub mod session;
pub mod telemetry;
pub mod types;
pub mod voice;

pub use config::Config;
pub use consent::{ConsentDecision, ConsentRecord, ConsentResponse, ConsentStore};
pub use error::{RecorderError, Result};
pub use feedback::{CounterScope, FeedbackOutcome, RejectionEvent, RejectionFeedbackConsumer};
pub use http::{create_router, AppState};
pub use nats::{NatsClient, NotificationMessage, SegmentMessage};
pub use notify::{ConsentPrompt, Notifier};
pub use orchestrator::{
    PresenceChange, PresenceOutcome, RecordingSessionOrchestrator, StartOutcome, StartRequest,
    StopOutcome,
};
pub use session::{
    RecordingSegment, RecordingSession, SegmentPublisher, SessionConfig, SessionRegistry,
    SessionServices, SessionState, SessionStats,
};
pub use types::{ChannelId, GuildId, Participant, ParticipantId, VoiceChannel};
pub use voice::{
    AudioFrame, CaptureFormat, Cue, CueLibrary, LocalVoiceGateway, VoiceConnection, VoiceError,
    VoiceGateway,
};
