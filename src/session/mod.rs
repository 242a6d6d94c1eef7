//! Recording session management
//!
//! This module provides the `RecordingSession` state machine and the pieces
//! around it:
//! - Per-guild session registry
//! - Periodic rotation of captured audio into segments
//! - Consent-gated flush and segment publishing
//! - Session statistics and state

mod config;
mod registry;
pub mod segment;
mod session;
mod stats;

pub use config::SessionConfig;
pub use registry::SessionRegistry;
pub use segment::{RecordingSegment, SegmentPublisher};
pub use session::{RecordingSession, SessionServices};
pub use stats::{SessionState, SessionStats};
