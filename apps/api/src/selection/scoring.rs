//! Keyword and indicator sub-scores and their weighted combination.

use serde::{Deserialize, Serialize};

use crate::selection::indicators::{IndicatorFlags, IndicatorKey};

pub const KEYWORD_WEIGHT: f64 = 0.6;
pub const INDICATOR_WEIGHT: f64 = 0.4;

/// Per-category score for one selection call. Never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreEntry {
    pub category_id: String,
    pub final_score: f64,
    pub keyword_score: f64,
    pub indicator_score: f64,
}

/// True when either keyword contains the other. Inputs are already lowercase.
pub fn keywords_overlap(user_keyword: &str, category_keyword: &str) -> bool {
    category_keyword.contains(user_keyword) || user_keyword.contains(category_keyword)
}

/// Share of user keywords that overlap at least one category keyword.
pub fn calculate_keyword_score(user_keywords: &[String], category_keywords: &[String]) -> f64 {
    if user_keywords.is_empty() || category_keywords.is_empty() {
        return 0.0;
    }

    let matches = user_keywords
        .iter()
        .filter(|uk| category_keywords.iter().any(|ck| keywords_overlap(uk, ck)))
        .count();

    (matches as f64 / user_keywords.len() as f64).min(1.0)
}

/// Share of a category's indicator labels whose mapped flag is set.
/// Unknown labels stay in the denominator.
pub fn calculate_indicator_score(
    user_indicators: &IndicatorFlags,
    category_indicators: &[String],
) -> f64 {
    if category_indicators.is_empty() {
        return 0.0;
    }

    let matches = category_indicators
        .iter()
        .filter_map(|label| IndicatorKey::from_label(label))
        .filter(|key| user_indicators.get(*key))
        .count();

    (matches as f64 / category_indicators.len() as f64).min(1.0)
}

/// 0.6 * keyword + 0.4 * indicator
pub fn combine_scores(keyword_score: f64, indicator_score: f64) -> f64 {
    (KEYWORD_WEIGHT * keyword_score + INDICATOR_WEIGHT * indicator_score).clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn words(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_keyword_score_zero_when_user_keywords_empty() {
        assert_eq!(calculate_keyword_score(&[], &words(&["join"])), 0.0);
    }

    #[test]
    fn test_keyword_score_zero_when_category_keywords_empty() {
        assert_eq!(calculate_keyword_score(&words(&["join"]), &[]), 0.0);
    }

    #[test]
    fn test_keyword_containment_works_both_ways() {
        assert_eq!(
            calculate_keyword_score(&words(&["joining"]), &words(&["join"])),
            1.0
        );
        assert_eq!(
            calculate_keyword_score(&words(&["volunteer"]), &words(&["volunteers"])),
            1.0
        );
    }

    #[test]
    fn test_keyword_score_is_normalized_by_user_keywords() {
        let score = calculate_keyword_score(
            &words(&["hiring", "coordinator", "today", "apply"]),
            &words(&["hiring", "apply"]),
        );
        assert!((score - 0.5).abs() < f64::EPSILON, "Score was {score}");
    }

    #[test]
    fn test_duplicate_user_keywords_each_count() {
        let score = calculate_keyword_score(
            &words(&["hiring", "hiring", "today"]),
            &words(&["hiring"]),
        );
        assert!((score - 2.0 / 3.0).abs() < 1e-9, "Score was {score}");
    }

    #[test]
    fn test_indicator_score_full_match() {
        let flags = IndicatorFlags {
            has_cta: true,
            ..Default::default()
        };
        assert_eq!(
            calculate_indicator_score(&flags, &words(&["call to action"])),
            1.0
        );
    }

    #[test]
    fn test_indicator_score_no_match() {
        let flags = IndicatorFlags::default();
        assert_eq!(
            calculate_indicator_score(&flags, &words(&["call to action"])),
            0.0
        );
    }

    #[test]
    fn test_indicator_score_empty_labels() {
        let flags = IndicatorFlags {
            has_cta: true,
            ..Default::default()
        };
        assert_eq!(calculate_indicator_score(&flags, &[]), 0.0);
    }

    #[test]
    fn test_unknown_labels_dilute_the_score() {
        let flags = IndicatorFlags {
            has_date: true,
            ..Default::default()
        };
        let score = calculate_indicator_score(
            &flags,
            &words(&["Deadline", "text-heavy content", "nature or landscape themes", "event announcement"]),
        );
        assert!((score - 0.25).abs() < f64::EPSILON, "Score was {score}");
    }

    #[test]
    fn test_combined_score_weights() {
        assert!((combine_scores(1.0, 1.0) - 1.0).abs() < f64::EPSILON);
        assert!((combine_scores(0.5, 1.0) - 0.7).abs() < 1e-9);
        assert_eq!(combine_scores(0.5, 0.0), 0.3);
    }
}
