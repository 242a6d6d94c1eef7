use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! snowflake_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub u64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<u64> for $name {
            fn from(id: u64) -> Self {
                Self(id)
            }
        }
    };
}

snowflake_id!(
    /// Guild (server) identity; keys the session registry
    GuildId
);
snowflake_id!(
    /// Text or voice channel identity
    ChannelId
);
snowflake_id!(
    /// Participant (user) identity
    ParticipantId
);

/// A member of a voice channel
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    pub id: ParticipantId,
    /// Display name, used to build the durable segment directory
    pub name: String,
    /// Bot accounts are never asked for consent and never recorded
    #[serde(default)]
    pub bot: bool,
}

impl Participant {
    pub fn new(id: impl Into<ParticipantId>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            bot: false,
        }
    }

    pub fn bot(id: impl Into<ParticipantId>, name: impl Into<String>) -> Self {
        Self {
            bot: true,
            ..Self::new(id, name)
        }
    }
}

/// Snapshot of a voice channel and the members present in it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoiceChannel {
    pub id: ChannelId,
    pub guild_id: GuildId,
    #[serde(default)]
    pub members: Vec<Participant>,
}

impl VoiceChannel {
    /// Members that are not bot accounts
    pub fn humans(&self) -> impl Iterator<Item = &Participant> {
        self.members.iter().filter(|m| !m.bot)
    }
}
