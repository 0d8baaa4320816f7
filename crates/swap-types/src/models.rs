use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::api::Claims;

/// The caller as resolved by the session provider. Handlers receive this
/// explicitly; nothing looks the current user up ambiently.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub user_id: Uuid,
    pub name: String,
}

impl From<Claims> for Identity {
    fn from(claims: Claims) -> Self {
        Self {
            user_id: claims.sub,
            name: claims.username,
        }
    }
}

/// A tradeable item ("snack") posted by exactly one owner.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Item {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub name: String,
    pub description: String,
    pub location: String,
    pub image_url: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// The user-editable fields of an item. Used for both create and update.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ItemFields {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub location: String,
    #[serde(default)]
    pub image_url: String,
}

impl ItemFields {
    /// All four fields must be present and non-blank.
    pub fn is_complete(&self) -> bool {
        [&self.name, &self.description, &self.location, &self.image_url]
            .iter()
            .all(|f| !f.trim().is_empty())
    }
}

/// One user's like/dislike verdict on another user's item.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Decision {
    pub id: Uuid,
    pub user_id: Uuid,
    pub item_id: Uuid,
    pub liked: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Mutual like between two users over a specific item pair.
///
/// `item1` belongs to `user1` and `item2` to `user2`. Which user ends up on
/// side 1 is arbitrary (the one whose like completed the match), so queries
/// must always check both orderings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Match {
    pub id: Uuid,
    pub user1_id: Uuid,
    pub user2_id: Uuid,
    pub item1_id: Uuid,
    pub item2_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Match {
    /// The other participant, seen from `user_id`.
    pub fn counterpart(&self, user_id: Uuid) -> Uuid {
        if self.user1_id == user_id {
            self.user2_id
        } else {
            self.user1_id
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub match_id: Uuid,
    pub sender_id: Uuid,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub read: bool,
}
