//! The documents this client reads and writes, in their stored shape.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::{
    AppError,
    backend::{Fields, Record, clock::opt_timestamp},
};

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for UserId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<&str> for UserId {
    fn from(id: &str) -> Self {
        Self(id.to_owned())
    }
}

impl From<&UserId> for serde_json::Value {
    fn from(id: &UserId) -> Self {
        serde_json::Value::String(id.0.clone())
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Gm,
    Player,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Gm => "gm",
            Role::Player => "player",
        }
    }
}

impl FromStr for Role {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "gm" => Ok(Role::Gm),
            "player" => Ok(Role::Player),
            other => Err(AppError::InvalidRole(other.to_owned())),
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    pub theme: String,
    pub notifications: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            theme: "dark".to_owned(),
            notifications: true,
        }
    }
}

/// `users/{uid}`: one per signed-up identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    #[serde(default)]
    pub email: Option<String>,
    pub display_name: String,
    pub role: Role,
    #[serde(default, with = "opt_timestamp", skip_serializing_if = "Option::is_none")]
    pub created_at: Option<OffsetDateTime>,
    #[serde(default, with = "opt_timestamp", skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<OffsetDateTime>,
    #[serde(default)]
    pub settings: Settings,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CampaignStatus {
    #[default]
    Active,
    Archived,
}

/// `campaigns/{id}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Campaign {
    #[serde(skip)]
    pub id: String,
    pub name: String,
    pub master_id: UserId,
    #[serde(default)]
    pub master_email: Option<String>,
    #[serde(default)]
    pub players: Vec<UserId>,
    pub join_code: String,
    #[serde(default)]
    pub map_id: Option<String>,
    #[serde(default)]
    pub status: CampaignStatus,
    #[serde(default, with = "opt_timestamp", skip_serializing_if = "Option::is_none")]
    pub created_at: Option<OffsetDateTime>,
}

/// `campaigns/{id}/characters/{id}`: a free-form sheet with an owner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Character {
    #[serde(skip)]
    pub id: String,
    pub owner_id: UserId,
    #[serde(default, with = "opt_timestamp", skip_serializing_if = "Option::is_none")]
    pub created_at: Option<OffsetDateTime>,
    #[serde(default, with = "opt_timestamp", skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<OffsetDateTime>,
    #[serde(flatten)]
    pub sheet: Fields,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    #[default]
    Message,
    Roll,
    System,
}

/// `campaigns/{id}/chat/{id}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    #[serde(skip)]
    pub id: String,
    pub text: String,
    #[serde(rename = "type", default)]
    pub kind: MessageKind,
    pub user_id: UserId,
    #[serde(default)]
    pub user_name: String,
    #[serde(default)]
    pub user_role: Option<Role>,
    #[serde(default, with = "opt_timestamp", skip_serializing_if = "Option::is_none")]
    pub created_at: Option<OffsetDateTime>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dice_notation: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Vec<i64>>,
}

/// `campaigns/{id}/drawings/{id}`: a line or shape; the geometry is opaque.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Drawing {
    #[serde(skip)]
    pub id: String,
    #[serde(default)]
    pub map_type: Option<String>,
    #[serde(default)]
    pub user_id: Option<UserId>,
    #[serde(default, with = "opt_timestamp", skip_serializing_if = "Option::is_none")]
    pub created_at: Option<OffsetDateTime>,
    #[serde(flatten)]
    pub shape: Fields,
}

/// `campaigns/{id}/texts/{id}`: a text label placed on the map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextNote {
    #[serde(skip)]
    pub id: String,
    #[serde(default)]
    pub map_type: Option<String>,
    #[serde(default)]
    pub user_id: Option<UserId>,
    #[serde(default, with = "opt_timestamp", skip_serializing_if = "Option::is_none")]
    pub created_at: Option<OffsetDateTime>,
    #[serde(flatten)]
    pub payload: Fields,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageKind {
    Emoji,
    Url,
}

/// `campaigns/{id}/tokens/{id}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Token {
    #[serde(skip)]
    pub id: String,
    pub name: String,
    pub image: String,
    pub image_type: ImageKind,
    pub border_color: String,
    pub x: f64,
    pub y: f64,
    #[serde(default)]
    pub map_type: Option<String>,
    pub size: u32,
    #[serde(default)]
    pub created_by: Option<UserId>,
    #[serde(default, with = "opt_timestamp", skip_serializing_if = "Option::is_none")]
    pub created_at: Option<OffsetDateTime>,
    #[serde(flatten)]
    pub attributes: Fields,
}

macro_rules! record_impl {
    ($($T:ty),*) => {
        $(
            impl Record for $T {
                fn id(&self) -> &str {
                    &self.id
                }

                fn set_id(&mut self, id: String) {
                    self.id = id;
                }
            }
        )*
    };
}

record_impl!(Campaign, Character, ChatMessage, Drawing, TextNote, Token);

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::backend::{CollectionPath, Document};

    #[test]
    fn roles_parse_strictly() {
        assert_eq!("gm".parse::<Role>().unwrap(), Role::Gm);
        assert_eq!("player".parse::<Role>().unwrap(), Role::Player);
        assert!(matches!("GM".parse::<Role>(), Err(AppError::InvalidRole(r)) if r == "GM"));
    }

    #[test]
    fn character_keeps_free_form_fields() {
        let doc = Document {
            path: CollectionPath::campaign("c1", "characters").doc("ch1"),
            data: json!({
                "ownerId": "u1",
                "name": "Borin",
                "race": "gmur",
                "createdAt": "2026-03-01T10:00:00.000000000Z",
            })
            .as_object()
            .cloned()
            .unwrap(),
        };

        let character: Character = doc.decode_record().unwrap();
        assert_eq!(character.id, "ch1");
        assert_eq!(character.owner_id, UserId::from("u1"));
        assert!(character.created_at.is_some());
        assert_eq!(character.sheet["name"], json!("Borin"));
        assert!(!character.sheet.contains_key("ownerId"));
    }

    #[test]
    fn chat_message_kind_is_stored_as_type() {
        let message = ChatMessage {
            id: "m1".to_owned(),
            text: "hello".to_owned(),
            kind: MessageKind::System,
            user_id: UserId::from("u1"),
            user_name: "gm".to_owned(),
            user_role: Some(Role::Gm),
            created_at: None,
            dice_notation: None,
            result: None,
            details: None,
        };

        let value = serde_json::to_value(&message).unwrap();
        assert_eq!(
            value,
            json!({ "text": "hello", "type": "system", "userId": "u1", "userName": "gm", "userRole": "gm" })
        );
    }
}
