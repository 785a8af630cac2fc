//! Signal aggregation.
//!
//! Reduces the set of participants' latest signals into one session summary.
//! The reduction is deterministic and side-effect-free: identical latest
//! signals always produce identical means and advisory note.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;

use super::models::Participant;

/// Mean confusion above this triggers the "high confusion" note.
const CONFUSION_THRESHOLD: f64 = 0.6;

/// Mean stress above this triggers the "elevated stress" note.
const STRESS_THRESHOLD: f64 = 0.6;

/// Mean engagement above this triggers the "strong engagement" note.
const ENGAGEMENT_THRESHOLD: f64 = 0.7;

/// Aggregated view of a session's participant signals.
///
/// When no participant has sent a signal yet, only `participants`, `status`
/// and `updated_at` are populated.
#[derive(Debug, Clone, Serialize)]
pub struct SessionSummary {
    /// Number of participants in the session (with or without a signal).
    pub participants: usize,
    /// "waiting" until the first signal arrives.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<&'static str>,
    /// Mean engagement across participants with a signal.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub engagement: Option<f64>,
    /// Mean confusion across participants with a signal.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confusion: Option<f64>,
    /// Mean stress across participants with a signal.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stress: Option<f64>,
    /// One advisory note derived from the means.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<&'static str>,
    /// When the summary was computed.
    pub updated_at: DateTime<Utc>,
}

/// Compute the summary for the given participant set.
pub fn summarize(participants: &HashMap<String, Participant>) -> SessionSummary {
    let signals: Vec<_> = participants
        .values()
        .filter_map(|p| p.latest_signal.as_ref())
        .collect();

    if signals.is_empty() {
        return SessionSummary {
            participants: participants.len(),
            status: Some("waiting"),
            engagement: None,
            confusion: None,
            stress: None,
            note: None,
            updated_at: Utc::now(),
        };
    }

    let count = signals.len() as f64;
    let engagement = signals.iter().map(|s| s.engagement).sum::<f64>() / count;
    let confusion = signals.iter().map(|s| s.confusion).sum::<f64>() / count;
    let stress = signals.iter().map(|s| s.stress).sum::<f64>() / count;

    SessionSummary {
        participants: participants.len(),
        status: None,
        engagement: Some(round3(engagement)),
        confusion: Some(round3(confusion)),
        stress: Some(round3(stress)),
        note: Some(advisory_note(engagement, confusion, stress)),
        updated_at: Utc::now(),
    }
}

/// Derive the advisory note from raw (unrounded) means.
///
/// Thresholds are strict: a mean of exactly 0.6 or 0.7 does not trigger.
fn advisory_note(engagement: f64, confusion: f64, stress: f64) -> &'static str {
    if confusion > CONFUSION_THRESHOLD {
        "high confusion"
    } else if stress > STRESS_THRESHOLD {
        "elevated stress"
    } else if engagement > ENGAGEMENT_THRESHOLD {
        "strong engagement"
    } else {
        "steady"
    }
}

fn round3(value: f64) -> f64 {
    (value * 1000.0).round() / 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::models::Signal;

    fn participant(id: &str, signal: Option<(f64, f64, f64)>) -> Participant {
        let mut p = Participant::new(id, id);
        if let Some((engagement, confusion, stress)) = signal {
            p.latest_signal = Some(Signal {
                engagement,
                confusion,
                stress,
                tone: None,
                energy: None,
                sentiment: None,
                timestamp: Utc::now(),
            });
        }
        p
    }

    fn participants(specs: &[(&str, Option<(f64, f64, f64)>)]) -> HashMap<String, Participant> {
        specs
            .iter()
            .map(|(id, s)| (id.to_string(), participant(id, *s)))
            .collect()
    }

    #[test]
    fn test_empty_session_is_waiting() {
        let summary = summarize(&HashMap::new());
        assert_eq!(summary.participants, 0);
        assert_eq!(summary.status, Some("waiting"));
        assert!(summary.engagement.is_none());
        assert!(summary.note.is_none());
    }

    #[test]
    fn test_participants_without_signals_are_waiting() {
        let summary = summarize(&participants(&[("a", None), ("b", None)]));
        assert_eq!(summary.participants, 2);
        assert_eq!(summary.status, Some("waiting"));
    }

    #[test]
    fn test_signalless_participants_excluded_from_means() {
        let summary = summarize(&participants(&[
            ("a", Some((0.8, 0.2, 0.2))),
            ("b", None),
        ]));
        assert_eq!(summary.participants, 2);
        assert_eq!(summary.engagement, Some(0.8));
        assert_eq!(summary.confusion, Some(0.2));
    }

    #[test]
    fn test_note_high_confusion() {
        let summary = summarize(&participants(&[("a", Some((0.5, 0.61, 0.3)))]));
        assert_eq!(summary.note, Some("high confusion"));
    }

    #[test]
    fn test_note_elevated_stress() {
        let summary = summarize(&participants(&[("a", Some((0.5, 0.4, 0.65)))]));
        assert_eq!(summary.note, Some("elevated stress"));
    }

    #[test]
    fn test_note_strong_engagement() {
        let summary = summarize(&participants(&[("a", Some((0.75, 0.2, 0.2)))]));
        assert_eq!(summary.note, Some("strong engagement"));
    }

    #[test]
    fn test_note_steady_when_moderate() {
        let summary = summarize(&participants(&[("a", Some((0.5, 0.4, 0.4)))]));
        assert_eq!(summary.note, Some("steady"));
    }

    #[test]
    fn test_note_thresholds_are_strict() {
        // Exactly at the threshold does not trigger.
        let summary = summarize(&participants(&[("a", Some((0.5, 0.6, 0.2)))]));
        assert_eq!(summary.note, Some("steady"));

        let summary = summarize(&participants(&[("a", Some((0.7, 0.2, 0.2)))]));
        assert_eq!(summary.note, Some("steady"));

        let summary = summarize(&participants(&[("a", Some((0.2, 0.2, 0.6)))]));
        assert_eq!(summary.note, Some("steady"));
    }

    #[test]
    fn test_confusion_takes_priority_over_stress() {
        let summary = summarize(&participants(&[("a", Some((0.9, 0.7, 0.9)))]));
        assert_eq!(summary.note, Some("high confusion"));
    }

    #[test]
    fn test_means_rounded_to_three_decimals() {
        let summary = summarize(&participants(&[
            ("a", Some((1.0, 0.0, 0.0))),
            ("b", Some((0.0, 0.0, 0.0))),
            ("c", Some((0.0, 0.0, 0.0))),
        ]));
        // 1/3 rounds to 0.333
        assert_eq!(summary.engagement, Some(0.333));
    }

    #[test]
    fn test_two_participant_scenario() {
        // A: {0.9, 0.1, 0.1}, B: {0.5, 0.7, 0.2}
        let summary = summarize(&participants(&[
            ("a", Some((0.9, 0.1, 0.1))),
            ("b", Some((0.5, 0.7, 0.2))),
        ]));
        assert_eq!(summary.participants, 2);
        assert_eq!(summary.engagement, Some(0.7));
        assert_eq!(summary.confusion, Some(0.4));
        assert_eq!(summary.stress, Some(0.15));
        // confusion mean 0.4 is below the threshold
        assert_eq!(summary.note, Some("steady"));
    }

    #[test]
    fn test_summary_is_deterministic() {
        let set = participants(&[
            ("a", Some((0.9, 0.1, 0.1))),
            ("b", Some((0.5, 0.7, 0.2))),
        ]);
        let first = summarize(&set);
        let second = summarize(&set);
        assert_eq!(first.engagement, second.engagement);
        assert_eq!(first.confusion, second.confusion);
        assert_eq!(first.stress, second.stress);
        assert_eq!(first.note, second.note);
    }
}
