use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Change notifications published per match.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum MatchEvent {
    /// A message was appended to the match's log
    MessageCreated {
        match_id: Uuid,
        message_id: Uuid,
        sender_id: Uuid,
    },

    /// The match was deleted (unmatch, undo, or item removal)
    MatchRemoved { match_id: Uuid },
}

impl MatchEvent {
    pub fn match_id(&self) -> Uuid {
        match self {
            Self::MessageCreated { match_id, .. } => *match_id,
            Self::MatchRemoved { match_id } => *match_id,
        }
    }
}
