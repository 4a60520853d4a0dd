use serde::{Deserialize, Serialize};

use super::game::TeamId;

/// Document id prefix for votes; one vote document per participant
pub const VOTE_ID_PREFIX: &str = "vote:";

/// A participant's proposed move for the current turn
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutgoingVote {
    #[serde(rename = "_id")]
    pub id: String,
    /// Empty until the document has been written once
    #[serde(rename = "_rev", default, skip_serializing_if = "String::is_empty")]
    pub revision: String,
    #[serde(rename = "turn")]
    pub turn_number: u64,
    #[serde(rename = "piece")]
    pub piece_id: usize,
    #[serde(rename = "team")]
    pub team_id: TeamId,
    #[serde(rename = "game")]
    pub game_number: u64,
    /// Start square followed by every landing square
    #[serde(rename = "locations", default)]
    pub square_sequence: Vec<i32>,
}

impl OutgoingVote {
    /// Vote document id derived from a participant's user id (`user:<uuid>` or bare uuid)
    pub fn id_for_participant(participant_id: &str) -> String {
        let bare = participant_id
            .strip_prefix(super::user::USER_ID_PREFIX)
            .unwrap_or(participant_id);
        format!("{}{}", VOTE_ID_PREFIX, bare)
    }

    pub fn is_persisted(&self) -> bool {
        !self.revision.is_empty()
    }

    /// Destination squares, without the start square
    pub fn destinations(&self) -> &[i32] {
        self.square_sequence.get(1..).unwrap_or(&[])
    }
}
