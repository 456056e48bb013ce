//! Recommendation computed once votes are revealed.

use indexmap::IndexMap;

use crate::state::room::{JudgeConfidence, JudgeMetadata, JudgeState};

/// Pluggable recommendation algorithm.
pub trait VoteJudge: Send + Sync {
    /// Recommend a value from `deck` for the revealed `votes` (name to value).
    fn evaluate(&self, votes: &IndexMap<String, String>, deck: &[String], now: i64) -> JudgeState;
}

/// Median of the numeric votes, snapped to the nearest deck card at or above it.
///
/// Confidence follows how many numeric deck cards the votes span: adjacent
/// cards are `high`, one card apart is `medium`, anything wider is `low`.
#[derive(Debug, Default, Clone, Copy)]
pub struct MedianJudge;

const ALGORITHM: &str = "median";

impl VoteJudge for MedianJudge {
    fn evaluate(&self, votes: &IndexMap<String, String>, deck: &[String], now: i64) -> JudgeState {
        let mut numeric: Vec<f64> = votes.values().filter_map(|v| parse_card(v)).collect();
        numeric.sort_by(f64::total_cmp);

        let numeric_deck: Vec<(f64, &String)> = deck
            .iter()
            .filter_map(|card| parse_card(card).map(|value| (value, card)))
            .collect();

        let total_votes = votes.len();
        let Some((&low, &high)) = numeric.first().zip(numeric.last()) else {
            return JudgeState {
                score: None,
                confidence: JudgeConfidence::Low,
                metadata: JudgeMetadata {
                    algorithm: ALGORITHM.to_string(),
                    numeric_votes: 0,
                    total_votes,
                    spread: None,
                    needs_discussion: total_votes > 0,
                },
                computed_at: now,
            };
        };

        let median = median(&numeric);
        let score = numeric_deck
            .iter()
            .filter(|(value, _)| *value >= median)
            .min_by(|a, b| a.0.total_cmp(&b.0))
            .or_else(|| numeric_deck.iter().max_by(|a, b| a.0.total_cmp(&b.0)))
            .map(|(_, card)| (*card).clone());

        let steps = deck_position(&numeric_deck, high).saturating_sub(deck_position(&numeric_deck, low));
        let confidence = match steps {
            0 | 1 => JudgeConfidence::High,
            2 => JudgeConfidence::Medium,
            _ => JudgeConfidence::Low,
        };
        let has_unknowns = numeric.len() < total_votes;

        JudgeState {
            score,
            confidence,
            metadata: JudgeMetadata {
                algorithm: ALGORITHM.to_string(),
                numeric_votes: numeric.len(),
                total_votes,
                spread: Some(high - low),
                needs_discussion: confidence == JudgeConfidence::Low || has_unknowns,
            },
            computed_at: now,
        }
    }
}

fn parse_card(value: &str) -> Option<f64> {
    let trimmed = value.trim();
    let parsed = match trimmed {
        "½" => Some(0.5),
        _ => trimmed.parse::<f64>().ok(),
    };
    parsed.filter(|v| v.is_finite())
}

fn median(sorted: &[f64]) -> f64 {
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}

/// Index of the first numeric card at or above `value`.
fn deck_position(deck: &[(f64, &String)], value: f64) -> usize {
    let mut values: Vec<f64> = deck.iter().map(|(v, _)| *v).collect();
    values.sort_by(f64::total_cmp);
    values
        .iter()
        .position(|card| *card >= value)
        .unwrap_or(values.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::settings::default_estimate_options;

    fn votes(pairs: &[(&str, &str)]) -> IndexMap<String, String> {
        pairs
            .iter()
            .map(|(name, vote)| (name.to_string(), vote.to_string()))
            .collect()
    }

    #[test]
    fn agreeing_votes_are_high_confidence() {
        let deck = default_estimate_options();
        let state = MedianJudge.evaluate(&votes(&[("a", "5"), ("b", "5"), ("c", "8")]), &deck, 9);
        assert_eq!(state.score.as_deref(), Some("5"));
        assert_eq!(state.confidence, JudgeConfidence::High);
        assert_eq!(state.metadata.numeric_votes, 3);
        assert_eq!(state.metadata.spread, Some(3.0));
        assert!(!state.metadata.needs_discussion);
        assert_eq!(state.computed_at, 9);
    }

    #[test]
    fn median_between_cards_rounds_up() {
        let deck = default_estimate_options();
        let state = MedianJudge.evaluate(&votes(&[("a", "3"), ("b", "8")]), &deck, 0);
        assert_eq!(state.score.as_deref(), Some("8"));
        assert_eq!(state.confidence, JudgeConfidence::Medium);
    }

    #[test]
    fn wide_or_unknown_votes_need_discussion() {
        let deck = default_estimate_options();
        let wide = MedianJudge.evaluate(&votes(&[("a", "1"), ("b", "21")]), &deck, 0);
        assert_eq!(wide.confidence, JudgeConfidence::Low);
        assert!(wide.metadata.needs_discussion);

        let unknown = MedianJudge.evaluate(&votes(&[("a", "3"), ("b", "?")]), &deck, 0);
        assert_eq!(unknown.score.as_deref(), Some("3"));
        assert!(unknown.metadata.needs_discussion);
    }

    #[test]
    fn no_numeric_votes_gives_no_score() {
        let deck = default_estimate_options();
        let state = MedianJudge.evaluate(&votes(&[("a", "coffee")]), &deck, 0);
        assert_eq!(state.score, None);
        assert_eq!(state.metadata.numeric_votes, 0);
        assert_eq!(state.metadata.total_votes, 1);
    }
}
