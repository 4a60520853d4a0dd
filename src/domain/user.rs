use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::game::TeamId;

/// Document id prefix for participant records
pub const USER_ID_PREFIX: &str = "user:";

/// The participant record this process registers with the game server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(rename = "_rev", default, skip_serializing_if = "String::is_empty")]
    pub revision: String,
    #[serde(rename = "team")]
    pub team_id: TeamId,
    #[serde(rename = "game", default)]
    pub game_number: u64,
}

impl UserRecord {
    /// Fresh, unsaved record with a random participant id
    pub fn new(team_id: TeamId) -> Self {
        Self::with_id(format!("{}{}", USER_ID_PREFIX, Uuid::new_v4()), team_id)
    }

    pub fn with_id(id: impl Into<String>, team_id: TeamId) -> Self {
        Self {
            id: id.into(),
            revision: String::new(),
            team_id,
            game_number: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_user_ids_are_unique() {
        let a = UserRecord::new(TeamId::Red);
        let b = UserRecord::new(TeamId::Red);
        assert!(a.id.starts_with(USER_ID_PREFIX));
        assert_ne!(a.id, b.id);
        assert!(a.revision.is_empty());
    }

    #[test]
    fn test_user_wire_format() {
        let json = r#"{"_id":"user:42","_rev":"3-ff","team":1,"game":9}"#;
        let user: UserRecord = serde_json::from_str(json).unwrap();
        assert_eq!(user.team_id, TeamId::Blue);
        assert_eq!(user.game_number, 9);
        assert_eq!(user.revision, "3-ff");
    }
}
