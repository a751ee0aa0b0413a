//! Meeting domain types.
//!
//! The lifecycle state machine lives in `state`; the closed participant role
//! set and the generated document types live here.

pub mod state;

pub use state::MeetingState;

use serde::{Deserialize, Serialize};

/// Participant role in the board meeting. Closed set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Chair,
    BoardMember,
    Alternate,
    ManagingDirector,
    Observer,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Chair => "chair",
            Self::BoardMember => "board_member",
            Self::Alternate => "alternate",
            Self::ManagingDirector => "managing_director",
            Self::Observer => "observer",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "chair" => Some(Self::Chair),
            "board_member" => Some(Self::BoardMember),
            "alternate" => Some(Self::Alternate),
            "managing_director" => Some(Self::ManagingDirector),
            "observer" => Some(Self::Observer),
            _ => None,
        }
    }

    /// Board membership is derived from the role, never stored independently.
    pub fn is_board_member(&self) -> bool {
        matches!(self, Self::Chair | Self::BoardMember | Self::Alternate)
    }

    /// Ranking used by the speaker mapping heuristic: the chair is assumed
    /// to speak the most, then the managing director, then ordinary board
    /// members, then everyone else.
    pub fn speaking_weight(&self) -> u32 {
        match self {
            Self::Chair => 100,
            Self::ManagingDirector => 80,
            Self::BoardMember => 50,
            _ => 10,
        }
    }
}

/// The three generated document types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentType {
    Minutes,
    Actions,
    Decisions,
}

impl DocumentType {
    pub const ALL: [DocumentType; 3] = [Self::Minutes, Self::Actions, Self::Decisions];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Minutes => "minutes",
            Self::Actions => "actions",
            Self::Decisions => "decisions",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "minutes" => Some(Self::Minutes),
            "actions" => Some(Self::Actions),
            "decisions" => Some(Self::Decisions),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_parse_roundtrip() {
        for role in [
            Role::Chair,
            Role::BoardMember,
            Role::Alternate,
            Role::ManagingDirector,
            Role::Observer,
        ] {
            assert_eq!(Role::parse(role.as_str()), Some(role));
        }
        assert_eq!(Role::parse("styreleder"), None);
    }

    #[test]
    fn test_board_membership_derivation() {
        assert!(Role::Chair.is_board_member());
        assert!(Role::BoardMember.is_board_member());
        assert!(Role::Alternate.is_board_member());
        assert!(!Role::ManagingDirector.is_board_member());
        assert!(!Role::Observer.is_board_member());
    }

    #[test]
    fn test_speaking_weight_order() {
        assert!(Role::Chair.speaking_weight() > Role::ManagingDirector.speaking_weight());
        assert!(Role::ManagingDirector.speaking_weight() > Role::BoardMember.speaking_weight());
        assert_eq!(
            Role::Observer.speaking_weight(),
            Role::Alternate.speaking_weight()
        );
    }

    #[test]
    fn test_document_type_parse() {
        assert_eq!(DocumentType::parse("minutes"), Some(DocumentType::Minutes));
        assert_eq!(DocumentType::parse("report"), None);
    }
}
