use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{Decision, Item, Match, Message};

// -- JWT Claims --

/// Claims carried by tokens from the session provider. The server only
/// validates these; it never stores credentials.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub username: String,
    pub exp: usize,
}

// -- Decisions --

/// Both fields are optional on the wire so that a missing field surfaces as
/// a 400 with a JSON error body instead of a deserializer rejection.
#[derive(Debug, Deserialize)]
pub struct RecordDecisionRequest {
    pub item_id: Option<Uuid>,
    pub liked: Option<bool>,
}

#[derive(Debug, Serialize)]
pub struct RecordDecisionResponse {
    pub decision: Decision,
    #[serde(rename = "match")]
    pub matched: Option<Match>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DecisionHistoryEntry {
    pub decision: Decision,
    pub item: Item,
    pub owner: UserSummary,
}

// -- Matches --

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserSummary {
    pub id: Uuid,
    pub name: String,
    pub image: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemSummary {
    pub id: Uuid,
    pub name: String,
    pub image_url: String,
}

/// A match as seen from one participant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchSummary {
    pub id: Uuid,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub other_user: UserSummary,
    pub user_item: ItemSummary,
    pub other_user_item: ItemSummary,
}

// -- Messages --

#[derive(Debug, Deserialize)]
pub struct SendMessageRequest {
    #[serde(default)]
    pub content: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct MessageResponse {
    #[serde(flatten)]
    pub message: Message,
    pub is_mine: bool,
}

impl MessageResponse {
    pub fn for_reader(message: Message, reader: Uuid) -> Self {
        let is_mine = message.sender_id == reader;
        Self { message, is_mine }
    }
}

// -- Uploads --

#[derive(Debug, Serialize, Deserialize)]
pub struct UploadResponse {
    pub success: bool,
    pub url: String,
    pub key: String,
}
