use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::RecorderError;
use crate::types::ParticipantId;

const CUSTOM_ID_PREFIX: &str = "consent";

/// A participant's answer to a consent request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsentDecision {
    Granted,
    Denied,
}

impl ConsentDecision {
    pub fn is_granted(self) -> bool {
        matches!(self, Self::Granted)
    }

    fn action(self) -> &'static str {
        match self {
            Self::Granted => "allow",
            Self::Denied => "deny",
        }
    }
}

impl From<bool> for ConsentDecision {
    fn from(granted: bool) -> Self {
        if granted {
            Self::Granted
        } else {
            Self::Denied
        }
    }
}

/// Consent response routed back from the prompt buttons.
///
/// Built once at the boundary; the text form (`consent_allow_<id>`,
/// `consent_deny_<id>`) is what the UI layer attaches to the buttons.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsentResponse {
    pub participant_id: ParticipantId,
    pub decision: ConsentDecision,
}

impl ConsentResponse {
    pub fn allow(participant_id: ParticipantId) -> Self {
        Self {
            participant_id,
            decision: ConsentDecision::Granted,
        }
    }

    pub fn deny(participant_id: ParticipantId) -> Self {
        Self {
            participant_id,
            decision: ConsentDecision::Denied,
        }
    }
}

impl fmt::Display for ConsentResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}_{}_{}",
            CUSTOM_ID_PREFIX,
            self.decision.action(),
            self.participant_id
        )
    }
}

impl FromStr for ConsentResponse {
    type Err = RecorderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || RecorderError::InvalidConsentResponse(s.to_string());

        let mut parts = s.splitn(3, '_');
        let (Some(prefix), Some(action), Some(id)) = (parts.next(), parts.next(), parts.next())
        else {
            return Err(invalid());
        };

        if prefix != CUSTOM_ID_PREFIX {
            return Err(invalid());
        }

        let decision = match action {
            "allow" => ConsentDecision::Granted,
            "deny" => ConsentDecision::Denied,
            _ => return Err(invalid()),
        };

        let participant_id = id.parse::<u64>().map_err(|_| invalid())?;

        Ok(Self {
            participant_id: ParticipantId(participant_id),
            decision,
        })
    }
}
