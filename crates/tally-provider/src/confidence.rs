// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Heuristic confidence scoring for provider responses.
//!
//! Starts from a per-provider baseline and nudges it by surface features
//! of the response text. Deliberately crude: the score feeds synthesis
//! ranking, not any user-facing guarantee.

use std::sync::LazyLock;

use regex::Regex;

/// Phrases that suggest the model is hedging.
const HEDGING_PHRASES: [&str; 3] = ["not sure", "might be", "uncertain"];

static LIST_STRUCTURE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^\s*(?:\d+\.|[-*])\s").unwrap());

/// Score a response body against a provider baseline.
///
/// +0.05 for length over 500 chars, +0.05 for visible structure (code
/// fences or numbered/bulleted lists), −0.10 for hedging phrases;
/// clamped to [0.10, 0.95].
pub fn score(content: &str, baseline: f64) -> f64 {
    let mut score = baseline;

    if content.len() > 500 {
        score += 0.05;
    }

    if content.contains("```") || LIST_STRUCTURE.is_match(content) {
        score += 0.05;
    }

    let lower = content.to_lowercase();
    if HEDGING_PHRASES.iter().any(|phrase| lower.contains(phrase)) {
        score -= 0.10;
    }

    score.clamp(0.10, 0.95)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn baseline_for_plain_short_answer() {
        assert!((score("Paris.", 0.80) - 0.80).abs() < f64::EPSILON);
    }

    #[test]
    fn long_responses_gain() {
        let long = "detail ".repeat(100);
        assert!((score(&long, 0.80) - 0.85).abs() < f64::EPSILON);
    }

    #[test]
    fn code_fences_count_as_structure() {
        let content = "Here:\n```rust\nfn main() {}\n```";
        assert!((score(content, 0.80) - 0.85).abs() < f64::EPSILON);
    }

    #[test]
    fn numbered_and_bulleted_lists_count_as_structure() {
        assert!((score("1. first\n2. second", 0.80) - 0.85).abs() < f64::EPSILON);
        assert!((score("- one\n- two", 0.80) - 0.85).abs() < f64::EPSILON);
    }

    #[test]
    fn hedging_costs_a_tenth() {
        assert!((score("I'm Not Sure about that.", 0.80) - 0.70).abs() < f64::EPSILON);
        assert!((score("it might be true", 0.80) - 0.70).abs() < f64::EPSILON);
    }

    #[test]
    fn adjustments_combine() {
        // Long + structured + hedging: 0.75 + 0.05 + 0.05 - 0.10.
        let content = format!("- {}\nI'm uncertain though.", "x".repeat(600));
        assert!((score(&content, 0.75) - 0.75).abs() < f64::EPSILON);
    }

    #[test]
    fn score_is_clamped() {
        assert!((score("uncertain", 0.11) - 0.10).abs() < f64::EPSILON);
        let strong = format!("```{}```", "y".repeat(600));
        assert!((score(&strong, 0.95) - 0.95).abs() < f64::EPSILON);
    }
}
