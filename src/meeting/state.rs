//! Meeting lifecycle states and the transition table.
//!
//! The state is a closed enum persisted as text. Every change goes through
//! `can_transition_to`, so a row can never skip ahead or leave a terminal
//! state by accident.

use serde::{Deserialize, Serialize};

/// Lifecycle state of a meeting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MeetingState {
    Created,
    Uploading,
    Diarizing,
    Transcribing,
    Summarizing,
    Ready,
    Failed,
}

impl MeetingState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Uploading => "uploading",
            Self::Diarizing => "diarizing",
            Self::Transcribing => "transcribing",
            Self::Summarizing => "summarizing",
            Self::Ready => "ready",
            Self::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "created" => Some(Self::Created),
            "uploading" => Some(Self::Uploading),
            "diarizing" => Some(Self::Diarizing),
            "transcribing" => Some(Self::Transcribing),
            "summarizing" => Some(Self::Summarizing),
            "ready" => Some(Self::Ready),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Ready | Self::Failed)
    }

    /// Chunk uploads are only accepted in these states.
    pub fn accepts_uploads(&self) -> bool {
        matches!(self, Self::Created | Self::Uploading)
    }

    pub fn is_processing(&self) -> bool {
        matches!(self, Self::Diarizing | Self::Transcribing | Self::Summarizing)
    }

    /// Whether `self -> next` is a legal transition.
    ///
    /// `failed` is reachable from every non-terminal state. `failed ->
    /// diarizing` is admitted so an explicit re-finalize can restart the
    /// pipeline from the top; nothing leaves `failed` automatically.
    pub fn can_transition_to(&self, next: MeetingState) -> bool {
        use MeetingState::*;
        match (*self, next) {
            (Created, Uploading) => true,
            (Uploading, Diarizing) => true,
            (Diarizing, Transcribing) => true,
            (Transcribing, Summarizing) => true,
            (Summarizing, Ready) => true,
            (Failed, Diarizing) => true,
            (from, Failed) if !from.is_terminal() => true,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_as_str_roundtrip() {
        for state in [
            MeetingState::Created,
            MeetingState::Uploading,
            MeetingState::Diarizing,
            MeetingState::Transcribing,
            MeetingState::Summarizing,
            MeetingState::Ready,
            MeetingState::Failed,
        ] {
            assert_eq!(MeetingState::parse(state.as_str()), Some(state));
        }
        assert_eq!(MeetingState::parse("bogus"), None);
    }

    #[test]
    fn test_happy_path_is_monotone() {
        let path = [
            MeetingState::Created,
            MeetingState::Uploading,
            MeetingState::Diarizing,
            MeetingState::Transcribing,
            MeetingState::Summarizing,
            MeetingState::Ready,
        ];
        for pair in path.windows(2) {
            assert!(pair[0].can_transition_to(pair[1]), "{:?}", pair);
        }
        // No skipping ahead
        assert!(!MeetingState::Created.can_transition_to(MeetingState::Diarizing));
        assert!(!MeetingState::Uploading.can_transition_to(MeetingState::Summarizing));
        // No moving backwards
        assert!(!MeetingState::Transcribing.can_transition_to(MeetingState::Diarizing));
    }

    #[test]
    fn test_failed_reachable_from_every_non_terminal_state() {
        for state in [
            MeetingState::Created,
            MeetingState::Uploading,
            MeetingState::Diarizing,
            MeetingState::Transcribing,
            MeetingState::Summarizing,
        ] {
            assert!(state.can_transition_to(MeetingState::Failed));
        }
        assert!(!MeetingState::Ready.can_transition_to(MeetingState::Failed));
        assert!(!MeetingState::Failed.can_transition_to(MeetingState::Failed));
    }

    #[test]
    fn test_terminal_states() {
        assert!(MeetingState::Ready.is_terminal());
        assert!(MeetingState::Failed.is_terminal());
        assert!(!MeetingState::Summarizing.is_terminal());
        // Ready is fully absorbing; Failed only admits an explicit restart.
        assert!(!MeetingState::Ready.can_transition_to(MeetingState::Diarizing));
        assert!(MeetingState::Failed.can_transition_to(MeetingState::Diarizing));
    }
}
