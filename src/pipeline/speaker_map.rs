//! Mapping diarization speaker labels to meeting participants.
//!
//! Diarization only produces anonymous labels (SPK00, SPK01, ...). We pair
//! them with participants by a simple heuristic: the speaker with the most
//! total talk time is assumed to be the participant with the weightiest role
//! (the chair usually runs the meeting), and so on down both lists. Labels
//! left over when participants run out get a synthetic "Ukjent" name so they
//! still appear in the transcript.

use std::collections::HashMap;

use crate::db::participants::ParticipantRecord;
use crate::services::DiarizationSegment;

#[derive(Debug, Clone, PartialEq)]
pub enum SpeakerTarget {
    /// Matched to a stored participant (by row id).
    Participant(i64),
    /// No participant left to pair with; display name for the label.
    Unknown(String),
}

/// Pair each distinct speaker label with a target, deterministically.
///
/// Labels are ordered by total speaking duration, longest first; ties keep
/// first-appearance order. Participants are ordered by role weight, heaviest
/// first; ties keep insertion order. The two orderings are zipped.
pub fn map_speakers(
    segments: &[DiarizationSegment],
    participants: &[ParticipantRecord],
) -> Vec<(String, SpeakerTarget)> {
    let mut durations: HashMap<&str, f64> = HashMap::new();
    let mut label_order: Vec<&str> = Vec::new();
    for segment in segments {
        if !durations.contains_key(segment.speaker.as_str()) {
            label_order.push(&segment.speaker);
        }
        *durations.entry(&segment.speaker).or_insert(0.0) += segment.duration();
    }

    let mut labels = label_order.clone();
    // Stable sort keeps first-appearance order for equal durations.
    labels.sort_by(|a, b| {
        durations[b]
            .partial_cmp(&durations[a])
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut ranked: Vec<&ParticipantRecord> = participants.iter().collect();
    ranked.sort_by_key(|p| std::cmp::Reverse(p.role.speaking_weight()));

    labels
        .into_iter()
        .enumerate()
        .map(|(i, label)| {
            let target = match ranked.get(i) {
                Some(p) => SpeakerTarget::Participant(p.id),
                None => SpeakerTarget::Unknown(format!("Ukjent {label}")),
            };
            (label.to_string(), target)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::meeting::Role;

    fn seg(speaker: &str, start: f64, end: f64) -> DiarizationSegment {
        DiarizationSegment {
            start,
            end,
            speaker: speaker.to_string(),
        }
    }

    fn participant(id: i64, name: &str, role: Role) -> ParticipantRecord {
        ParticipantRecord {
            id,
            meeting_id: 1,
            name: name.to_string(),
            role,
            email: None,
            is_board_member: role.is_board_member(),
            is_present: true,
            speaker_label: None,
            enrollment_clip_path: None,
        }
    }

    #[test]
    fn test_longest_speaker_gets_weightiest_role() {
        let segments = vec![seg("SPK00", 0.0, 120.0), seg("SPK01", 120.0, 150.0)];
        let participants = vec![
            participant(1, "Ola", Role::BoardMember),
            participant(2, "Kari", Role::Chair),
        ];

        let mapping = map_speakers(&segments, &participants);
        assert_eq!(
            mapping,
            vec![
                ("SPK00".to_string(), SpeakerTarget::Participant(2)),
                ("SPK01".to_string(), SpeakerTarget::Participant(1)),
            ]
        );
    }

    #[test]
    fn test_excess_labels_become_unknown() {
        let segments = vec![
            seg("SPK00", 0.0, 60.0),
            seg("SPK01", 60.0, 90.0),
            seg("SPK02", 90.0, 100.0),
        ];
        let participants = vec![participant(1, "Kari", Role::Chair)];

        let mapping = map_speakers(&segments, &participants);
        assert_eq!(mapping[0].1, SpeakerTarget::Participant(1));
        assert_eq!(
            mapping[1].1,
            SpeakerTarget::Unknown("Ukjent SPK01".to_string())
        );
        assert_eq!(
            mapping[2].1,
            SpeakerTarget::Unknown("Ukjent SPK02".to_string())
        );
    }

    #[test]
    fn test_duration_sums_across_segments() {
        // SPK01 speaks twice for 40s total, beating SPK00's single 30s turn.
        let segments = vec![
            seg("SPK00", 0.0, 30.0),
            seg("SPK01", 30.0, 50.0),
            seg("SPK01", 50.0, 70.0),
        ];
        let participants = vec![
            participant(1, "Ola", Role::BoardMember),
            participant(2, "Kari", Role::Chair),
        ];

        let mapping = map_speakers(&segments, &participants);
        assert_eq!(mapping[0].0, "SPK01");
        assert_eq!(mapping[0].1, SpeakerTarget::Participant(2));
    }

    #[test]
    fn test_ties_keep_first_appearance_and_insertion_order() {
        let segments = vec![seg("SPK01", 0.0, 30.0), seg("SPK00", 30.0, 60.0)];
        let participants = vec![
            participant(1, "Ola", Role::BoardMember),
            participant(2, "Per", Role::BoardMember),
        ];

        let mapping = map_speakers(&segments, &participants);
        // Equal durations: SPK01 appeared first. Equal weights: Ola inserted first.
        assert_eq!(
            mapping,
            vec![
                ("SPK01".to_string(), SpeakerTarget::Participant(1)),
                ("SPK00".to_string(), SpeakerTarget::Participant(2)),
            ]
        );
    }

    #[test]
    fn test_every_label_mapped_exactly_once() {
        let segments = vec![
            seg("SPK02", 0.0, 10.0),
            seg("SPK00", 10.0, 25.0),
            seg("SPK01", 25.0, 26.0),
            seg("SPK00", 26.0, 27.0),
        ];
        let mapping = map_speakers(&segments, &[]);
        let mut labels: Vec<&str> = mapping.iter().map(|(l, _)| l.as_str()).collect();
        labels.sort();
        assert_eq!(labels, vec!["SPK00", "SPK01", "SPK02"]);
    }

    #[test]
    fn test_participants_paired_at_most_once() {
        let segments = vec![seg("SPK00", 0.0, 10.0), seg("SPK01", 10.0, 20.0)];
        let participants = vec![
            participant(1, "Kari", Role::Chair),
            participant(2, "Ola", Role::Observer),
        ];
        let mapping = map_speakers(&segments, &participants);
        let ids: Vec<i64> = mapping
            .iter()
            .filter_map(|(_, t)| match t {
                SpeakerTarget::Participant(id) => Some(*id),
                SpeakerTarget::Unknown(_) => None,
            })
            .collect();
        assert_eq!(ids, vec![1, 2]);
    }

    #[test]
    fn test_empty_segments_map_to_nothing() {
        let participants = vec![participant(1, "Kari", Role::Chair)];
        assert!(map_speakers(&[], &participants).is_empty());
    }
}
