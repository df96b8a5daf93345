use chrono::{DateTime, Utc};

/// Platform peer id (numeric, without the `-100` bot-API prefix).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PeerId(pub i64);

/// Platform message id. Monotonically increasing per peer.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MessageId(pub i32);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PeerKind {
    Channel,
    Supergroup,
    BasicGroup,
}

impl PeerKind {
    /// Channels and supergroups are addressed as `inputPeerChannel` and need an
    /// access hash; basic groups are addressed as `inputPeerChat`.
    pub fn uses_channel_addressing(self) -> bool {
        matches!(self, PeerKind::Channel | PeerKind::Supergroup)
    }

    pub fn label(self) -> &'static str {
        match self {
            PeerKind::Channel => "Channel",
            PeerKind::Supergroup => "Supergroup",
            PeerKind::BasicGroup => "Group",
        }
    }
}

/// A resolved chat destination. Immutable once selected.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PeerRef {
    pub id: PeerId,
    /// `0` when unknown or not required (basic groups).
    pub access_hash: i64,
    pub title: String,
    pub kind: PeerKind,
}

/// A message read from a source peer's history.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SourceMessage {
    pub id: MessageId,
    pub date: DateTime<Utc>,
    pub text: Option<String>,
    pub media_type: Option<String>,
}

/// Persisted trace of one relayed message.
///
/// Natural key: `(message_id, source_group_id, target_group_id)`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RelayRecord {
    pub message_id: MessageId,
    pub source_group_id: PeerId,
    pub source_group_name: String,
    pub target_group_id: PeerId,
    pub target_group_name: String,
    pub content: Option<String>,
    pub media_type: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl RelayRecord {
    pub fn new(message: &SourceMessage, source: &PeerRef, target: &PeerRef) -> Self {
        Self {
            message_id: message.id,
            source_group_id: source.id,
            source_group_name: source.title.clone(),
            target_group_id: target.id,
            target_group_name: target.title.clone(),
            content: message.text.clone(),
            media_type: message.media_type.clone(),
            created_at: message.date,
        }
    }
}

/// A message that could not be forwarded after the configured number of attempts.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeadLetter {
    pub record: RelayRecord,
    pub attempts: u32,
    pub last_error: String,
}
