//! Category selector. Picks the design category that best fits a piece of user text.
//!
//! Pure and synchronous: no I/O, no shared state. Missing or thin analysis data
//! never produces an error; it produces a low-confidence result that falls back
//! to the recommended or primary category so generation can always proceed.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::selection::indicators::detect_content_indicators;
use crate::selection::keywords::extract_keywords;
use crate::selection::models::{AnalysisBundle, CategoryDefinition};
use crate::selection::scoring::{
    calculate_indicator_score, calculate_keyword_score, combine_scores, keywords_overlap,
    ScoreEntry,
};

/// Scores below this fall back instead of selecting the top category.
pub const MIN_CONFIDENCE: f64 = 0.3;

const MAX_REASONING_KEYWORDS: usize = 5;
const MAX_REASONING_INDICATORS: usize = 3;

// ────────────────────────────────────────────────────────────────────────────
// Output data models
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    pub keyword_score: f64,
    pub indicator_score: f64,
    pub final_score: f64,
}

/// How a threshold fallback picked its category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionMethod {
    FallbackToRecommendation,
    FallbackToPrimary,
}

/// Decision returned to the generation prompt builder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectionResult {
    pub selected_category_id: Option<String>,
    pub confidence_score: f64, // 0.0 to 1.0
    pub reasoning: String,
    pub category_data: Option<CategoryDefinition>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scores_breakdown: Option<ScoreBreakdown>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selection_method: Option<SelectionMethod>,
}

impl SelectionResult {
    fn unselected(reasoning: &str) -> Self {
        Self {
            selected_category_id: None,
            confidence_score: 0.0,
            reasoning: reasoning.to_string(),
            category_data: None,
            scores_breakdown: None,
            selection_method: None,
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Selection algorithm
// ────────────────────────────────────────────────────────────────────────────

/// Selects the category whose selection logic best matches `user_text`.
///
/// Algorithm:
/// 1. Bail out with an empty result when there is no selector data or no categories
/// 2. Extract keywords and content indicators from the text once
/// 3. Score every available category that has selection logic:
///    final = 0.6 * keyword_score + 0.4 * indicator_score
/// 4. Stable-sort descending (ties keep `available_categories` order)
/// 5. Top score < 0.3 → recommended category, else primary category
/// 6. Otherwise return the top category with reasoning and a score breakdown
pub fn select_category_for_generation(
    user_text: &str,
    analysis: Option<&AnalysisBundle>,
) -> SelectionResult {
    let Some(bundle) = analysis else {
        return SelectionResult::unselected("No category selector data available in analysis");
    };
    let Some(selector) = bundle.generation_category_selector.as_ref() else {
        return SelectionResult::unselected("No category selector data available in analysis");
    };

    if bundle.categories.is_empty() {
        return SelectionResult::unselected("No categories available");
    }

    let user_keywords = extract_keywords(user_text);
    let user_indicators = detect_content_indicators(user_text);

    let mut category_scores: Vec<ScoreEntry> = selector
        .available_categories
        .iter()
        .filter_map(|category_id| {
            let logic = selector.selection_logic.get(category_id)?;
            let keyword_score = calculate_keyword_score(&user_keywords, &logic.keywords);
            let indicator_score =
                calculate_indicator_score(&user_indicators, &logic.content_indicators);
            Some(ScoreEntry {
                category_id: category_id.clone(),
                final_score: combine_scores(keyword_score, indicator_score),
                keyword_score,
                indicator_score,
            })
        })
        .collect();

    if category_scores.is_empty() {
        let primary_id = bundle.analysis_metadata.primary_category.clone();
        return SelectionResult {
            category_data: lookup(bundle, primary_id.as_deref()),
            selected_category_id: primary_id,
            confidence_score: 0.0,
            reasoning:
                "No scoring data available, defaulting to primary category (most recent post)"
                    .to_string(),
            scores_breakdown: None,
            selection_method: None,
        };
    }

    // sort_by is stable, so equal scores keep their input order
    category_scores.sort_by(|a, b| {
        b.final_score
            .partial_cmp(&a.final_score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    for entry in &category_scores {
        debug!(
            "Category '{}': final={:.2} keyword={:.2} indicator={:.2}",
            entry.category_id, entry.final_score, entry.keyword_score, entry.indicator_score
        );
    }

    let best = &category_scores[0];

    if best.final_score < MIN_CONFIDENCE {
        return low_confidence_fallback(bundle, best.final_score);
    }

    let selected = lookup(bundle, Some(&best.category_id));
    if selected.is_none() {
        warn!(
            "Selected category '{}' has selection logic but no category record",
            best.category_id
        );
    }

    let category_keywords = selector
        .selection_logic
        .get(&best.category_id)
        .map(|logic| logic.keywords.as_slice())
        .unwrap_or_default();
    let matched_keywords: Vec<&str> = user_keywords
        .iter()
        .filter(|uk| category_keywords.iter().any(|ck| keywords_overlap(uk, ck)))
        .map(String::as_str)
        .collect();

    let mut reasoning_parts = Vec::new();

    if !matched_keywords.is_empty() {
        let shown: Vec<&str> = matched_keywords
            .iter()
            .take(MAX_REASONING_KEYWORDS)
            .copied()
            .collect();
        reasoning_parts.push(format!("Detected keywords: {}", shown.join(", ")));
    }

    if best.indicator_score > 0.0 {
        let active = user_indicators.active();
        if !active.is_empty() {
            let shown: Vec<&str> = active
                .iter()
                .take(MAX_REASONING_INDICATORS)
                .copied()
                .collect();
            reasoning_parts.push(format!("Content indicators: {}", shown.join(", ")));
        }
    }

    let category_name = selected
        .as_ref()
        .map(CategoryDefinition::display_name)
        .unwrap_or("unknown");
    reasoning_parts.push(format!("High match with '{category_name}' category"));

    SelectionResult {
        selected_category_id: Some(best.category_id.clone()),
        confidence_score: round2(best.final_score),
        reasoning: format!("{}.", reasoning_parts.join(". ")),
        category_data: selected,
        scores_breakdown: Some(ScoreBreakdown {
            keyword_score: round2(best.keyword_score),
            indicator_score: round2(best.indicator_score),
            final_score: round2(best.final_score),
        }),
        selection_method: None,
    }
}

/// Top score was under the threshold: prefer the analyzer's recommendation,
/// otherwise the primary category.
fn low_confidence_fallback(bundle: &AnalysisBundle, best_score: f64) -> SelectionResult {
    let metadata = &bundle.analysis_metadata;

    let recommendation = metadata
        .recommended_category_for_generation
        .as_ref()
        .and_then(|rec| rec.category_id.as_deref().map(|id| (id, rec.reasoning.as_deref())));

    if let Some((recommended_id, reason)) = recommendation {
        return SelectionResult {
            selected_category_id: Some(recommended_id.to_string()),
            confidence_score: round2(best_score),
            reasoning: format!(
                "Low confidence match (score: {best_score:.2}). Using recommended: {}",
                reason.unwrap_or("Most recent post style")
            ),
            category_data: lookup(bundle, Some(recommended_id)),
            scores_breakdown: None,
            selection_method: Some(SelectionMethod::FallbackToRecommendation),
        };
    }

    let primary_id = metadata.primary_category.clone();
    SelectionResult {
        category_data: lookup(bundle, primary_id.as_deref()),
        selected_category_id: primary_id,
        confidence_score: round2(best_score),
        reasoning: format!(
            "Low confidence match (score: {best_score:.2}). Defaulting to primary category (most recent post)"
        ),
        scores_breakdown: None,
        selection_method: Some(SelectionMethod::FallbackToPrimary),
    }
}

fn lookup(bundle: &AnalysisBundle, category_id: Option<&str>) -> Option<CategoryDefinition> {
    category_id.and_then(|id| bundle.find_category(id)).cloned()
}

/// Rounds half to even on the exact binary value, matching the `{:.2}` text
/// in the reasoning line.
fn round2(value: f64) -> f64 {
    format!("{value:.2}")
        .parse::<f64>()
        .unwrap_or(value)
        .clamp(0.0, 1.0)
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    fn bundle(value: Value) -> AnalysisBundle {
        serde_json::from_value(value).unwrap()
    }

    fn hiring_bundle() -> AnalysisBundle {
        bundle(json!({
            "analysis_metadata": {"primary_category": "event_recap"},
            "categories": [
                {"category_id": "event_recap", "category_name": "Event Recap", "purpose": "storytelling"},
                {"category_id": "hiring_post", "category_name": "Hiring Post", "purpose": "call_to_action"}
            ],
            "generation_category_selector": {
                "available_categories": ["event_recap", "hiring_post"],
                "selection_logic": {
                    "event_recap": {
                        "keywords": ["story", "event", "community"],
                        "content_indicators": ["past event recap"],
                        "purpose": "storytelling"
                    },
                    "hiring_post": {
                        "keywords": ["hiring", "volunteer", "apply"],
                        "content_indicators": ["call to action"],
                        "purpose": "call_to_action"
                    }
                }
            }
        }))
    }

    #[test]
    fn test_missing_bundle_returns_empty_selection() {
        let result = select_category_for_generation("anything", None);
        assert!(result.selected_category_id.is_none());
        assert_eq!(result.confidence_score, 0.0);
        assert!(result.category_data.is_none());
        assert_eq!(
            result.reasoning,
            "No category selector data available in analysis"
        );
    }

    #[test]
    fn test_missing_selector_returns_empty_selection() {
        let analysis = bundle(json!({
            "categories": [{"category_id": "a", "category_name": "A"}]
        }));
        let result = select_category_for_generation("hiring", Some(&analysis));
        assert!(result.selected_category_id.is_none());
        assert_eq!(result.confidence_score, 0.0);
    }

    #[test]
    fn test_no_categories_returns_empty_selection() {
        let analysis = bundle(json!({
            "analysis_metadata": {"primary_category": "a"},
            "generation_category_selector": {"available_categories": ["a"], "selection_logic": {}}
        }));
        let result = select_category_for_generation("hiring", Some(&analysis));
        assert!(result.selected_category_id.is_none());
        assert_eq!(result.reasoning, "No categories available");
    }

    #[test]
    fn test_no_selection_logic_falls_back_to_primary() {
        let analysis = bundle(json!({
            "analysis_metadata": {"primary_category": "fallback_single_category"},
            "categories": [{"category_id": "fallback_single_category", "category_name": "All Posts"}],
            "generation_category_selector": {
                "available_categories": ["fallback_single_category"],
                "selection_logic": {}
            }
        }));
        let result = select_category_for_generation("We're hiring!", Some(&analysis));

        assert_eq!(
            result.selected_category_id.as_deref(),
            Some("fallback_single_category")
        );
        assert_eq!(result.confidence_score, 0.0);
        assert!(result.reasoning.contains("No scoring data available"));
        assert_eq!(
            result.category_data.as_ref().map(|c| c.display_name()),
            Some("All Posts")
        );
        assert!(result.selection_method.is_none());
    }

    #[test]
    fn test_hiring_text_selects_hiring_category() {
        let analysis = hiring_bundle();
        let result = select_category_for_generation(
            "We're hiring a new volunteer coordinator, apply today!",
            Some(&analysis),
        );

        assert_eq!(result.selected_category_id.as_deref(), Some("hiring_post"));
        assert!(result.confidence_score >= MIN_CONFIDENCE);

        // keywords: we're, hiring, volunteer, coordinator, apply, today → 3 of 6 match
        let breakdown = result.scores_breakdown.expect("breakdown on confident match");
        assert_eq!(breakdown.keyword_score, 0.5);
        assert_eq!(breakdown.indicator_score, 1.0);
        assert_eq!(breakdown.final_score, 0.7);
        assert_eq!(result.confidence_score, 0.7);

        assert_eq!(
            result.reasoning,
            "Detected keywords: hiring, volunteer, apply. \
             Content indicators: has_cta, has_announcement. \
             High match with 'Hiring Post' category."
        );
        assert_eq!(
            result.category_data.as_ref().and_then(|c| c.category_id.as_deref()),
            Some("hiring_post")
        );
        assert!(result.selection_method.is_none());
    }

    #[test]
    fn test_unmatched_text_falls_back_to_primary() {
        let analysis = hiring_bundle();
        let result = select_category_for_generation("xyz", Some(&analysis));

        assert_eq!(result.selected_category_id.as_deref(), Some("event_recap"));
        assert_eq!(result.confidence_score, 0.0);
        assert_eq!(result.selection_method, Some(SelectionMethod::FallbackToPrimary));
        assert_eq!(
            result.reasoning,
            "Low confidence match (score: 0.00). Defaulting to primary category (most recent post)"
        );
        assert!(result.scores_breakdown.is_none());
    }

    #[test]
    fn test_low_score_prefers_recommendation() {
        let mut analysis = hiring_bundle();
        analysis.analysis_metadata = serde_json::from_value(json!({
            "primary_category": "event_recap",
            "recommended_category_for_generation": {
                "category_id": "hiring_post",
                "reasoning": "Most engaging recent style"
            }
        }))
        .unwrap();

        let result = select_category_for_generation("xyz", Some(&analysis));
        assert_eq!(result.selected_category_id.as_deref(), Some("hiring_post"));
        assert_eq!(
            result.selection_method,
            Some(SelectionMethod::FallbackToRecommendation)
        );
        assert!(result
            .reasoning
            .ends_with("Using recommended: Most engaging recent style"));
        assert!(result.category_data.is_some());
    }

    #[test]
    fn test_recommendation_without_id_uses_primary() {
        let mut analysis = hiring_bundle();
        analysis.analysis_metadata = serde_json::from_value(json!({
            "primary_category": "event_recap",
            "recommended_category_for_generation": {"reasoning": "n/a"}
        }))
        .unwrap();

        let result = select_category_for_generation("xyz", Some(&analysis));
        assert_eq!(result.selected_category_id.as_deref(), Some("event_recap"));
        assert_eq!(result.selection_method, Some(SelectionMethod::FallbackToPrimary));
    }

    #[test]
    fn test_score_of_exactly_threshold_is_confident() {
        // one of two keywords matches, no indicators: 0.6 * 0.5 = 0.3
        let analysis = bundle(json!({
            "analysis_metadata": {"primary_category": "other"},
            "categories": [
                {"category_id": "target", "category_name": "Target"},
                {"category_id": "other", "category_name": "Other"}
            ],
            "generation_category_selector": {
                "available_categories": ["target"],
                "selection_logic": {
                    "target": {"keywords": ["garden"], "content_indicators": []}
                }
            }
        }));
        let result = select_category_for_generation("gardening workshop", Some(&analysis));

        assert_eq!(result.selected_category_id.as_deref(), Some("target"));
        assert_eq!(result.confidence_score, 0.3);
        assert!(result.selection_method.is_none());
        assert_eq!(
            result.reasoning,
            "Detected keywords: gardening. High match with 'Target' category."
        );
    }

    #[test]
    fn test_ties_go_to_first_available_category() {
        let analysis = bundle(json!({
            "analysis_metadata": {"primary_category": "second"},
            "categories": [
                {"category_id": "first", "category_name": "First"},
                {"category_id": "second", "category_name": "Second"}
            ],
            "generation_category_selector": {
                "available_categories": ["first", "second"],
                "selection_logic": {
                    "second": {"keywords": ["launch"]},
                    "first": {"keywords": ["launch"]}
                }
            }
        }));
        let result = select_category_for_generation("launch party", Some(&analysis));
        assert_eq!(result.selected_category_id.as_deref(), Some("first"));
    }

    #[test]
    fn test_categories_without_logic_are_skipped() {
        let analysis = bundle(json!({
            "analysis_metadata": {"primary_category": "a"},
            "categories": [
                {"category_id": "a", "category_name": "A"},
                {"category_id": "b", "category_name": "B"}
            ],
            "generation_category_selector": {
                "available_categories": ["a", "b"],
                "selection_logic": {"b": {"keywords": ["recipe"]}}
            }
        }));
        let result = select_category_for_generation("recipe", Some(&analysis));
        assert_eq!(result.selected_category_id.as_deref(), Some("b"));
        assert_eq!(result.confidence_score, 0.6);
    }

    #[test]
    fn test_winner_without_category_record_does_not_panic() {
        let analysis = bundle(json!({
            "analysis_metadata": {"primary_category": "a"},
            "categories": [{"category_id": "a", "category_name": "A"}],
            "generation_category_selector": {
                "available_categories": ["ghost"],
                "selection_logic": {"ghost": {"keywords": ["recipe"]}}
            }
        }));
        let result = select_category_for_generation("recipe", Some(&analysis));

        assert_eq!(result.selected_category_id.as_deref(), Some("ghost"));
        assert!(result.category_data.is_none());
        assert!(result.reasoning.ends_with("High match with 'unknown' category."));
    }

    #[test]
    fn test_reasoning_caps_keywords_and_indicators() {
        let analysis = bundle(json!({
            "analysis_metadata": {"primary_category": "all"},
            "categories": [{"category_id": "all", "category_name": "All"}],
            "generation_category_selector": {
                "available_categories": ["all"],
                "selection_logic": {
                    "all": {
                        "keywords": ["alpha", "bravo", "charlie", "delta", "echo", "foxtrot"],
                        "content_indicators": ["deadline"]
                    }
                }
            }
        }));
        let result = select_category_for_generation(
            "alpha bravo charlie delta echo foxtrot: join our new story in june?",
            Some(&analysis),
        );

        assert!(result.reasoning.starts_with(
            "Detected keywords: alpha, bravo, charlie, delta, echo. \
             Content indicators: has_date, has_cta, has_narrative. "
        ));
    }

    #[test]
    fn test_indicator_clause_omitted_when_indicator_score_zero() {
        let mut analysis = hiring_bundle();
        if let Some(selector) = analysis.generation_category_selector.as_mut() {
            if let Some(logic) = selector.selection_logic.get_mut("hiring_post") {
                logic.content_indicators = vec!["deadline reminder".to_string()];
            }
        }
        let result = select_category_for_generation("hiring", Some(&analysis));
        assert_eq!(result.selected_category_id.as_deref(), Some("hiring_post"));
        assert!(!result.reasoning.contains("Content indicators"));
    }

    #[test]
    fn test_confidence_always_within_bounds() {
        let analysis = hiring_bundle();
        let inputs = [
            "",
            "?",
            "xyz",
            "hiring hiring hiring apply volunteer",
            "Join our story: volunteer stories from June 6/14/2025!",
        ];
        for text in inputs {
            let result = select_category_for_generation(text, Some(&analysis));
            assert!(
                (0.0..=1.0).contains(&result.confidence_score),
                "Out of range for {text:?}: {}",
                result.confidence_score
            );
        }
    }

    #[test]
    fn test_result_json_shape() {
        let analysis = hiring_bundle();
        let fallback = serde_json::to_value(select_category_for_generation("xyz", Some(&analysis)))
            .unwrap();
        assert_eq!(fallback["selection_method"], json!("fallback_to_primary"));
        assert!(fallback.get("scores_breakdown").is_none());

        let confident =
            serde_json::to_value(select_category_for_generation("apply now", Some(&analysis)))
                .unwrap();
        assert!(confident.get("selection_method").is_none());
        assert_eq!(confident["scores_breakdown"]["indicator_score"], json!(1.0));
    }

    #[test]
    fn test_round2_ties_go_to_even() {
        assert_eq!(round2(0.625), 0.62);
        assert_eq!(round2(0.125), 0.12);
        assert_eq!(round2(0.375), 0.38);
        assert_eq!(round2(0.666), 0.67);
        assert_eq!(round2(1.2), 1.0);
    }

    #[test]
    fn test_confident_score_on_exact_tie_rounds_to_even() {
        // 3 of 8 keywords match (0.375) and the single indicator matches (1.0):
        // 0.6 * 0.375 + 0.4 * 1.0 = 0.625
        let result = select_category_for_generation(
            "hiring volunteer apply people today morning office building",
            Some(&hiring_bundle()),
        );

        assert_eq!(result.selected_category_id.as_deref(), Some("hiring_post"));
        assert_eq!(result.confidence_score, 0.62);
        let breakdown = result.scores_breakdown.unwrap();
        assert_eq!(breakdown.final_score, 0.62);
        assert_eq!(breakdown.indicator_score, 1.0);
    }

    #[test]
    fn test_low_confidence_score_matches_reasoning_text() {
        // 1 of 8 keywords and 1 of 8 indicator labels: 0.6 / 8 + 0.4 / 8 = 0.125
        let analysis = bundle(json!({
            "analysis_metadata": {"primary_category": "hiring_post"},
            "categories": [{"category_id": "hiring_post", "category_name": "Hiring Post"}],
            "generation_category_selector": {
                "available_categories": ["hiring_post"],
                "selection_logic": {
                    "hiring_post": {
                        "keywords": ["hiring"],
                        "content_indicators": [
                            "call to action", "deadline", "past event recap", "event announcement",
                            "seasonal", "giveaway", "partnership", "milestone"
                        ]
                    }
                }
            }
        }));

        let result = select_category_for_generation(
            "hiring people today morning office building garden kitchen",
            Some(&analysis),
        );

        assert_eq!(result.selected_category_id.as_deref(), Some("hiring_post"));
        assert_eq!(result.selection_method, Some(SelectionMethod::FallbackToPrimary));
        assert_eq!(result.confidence_score, 0.12);
        assert!(
            result.reasoning.starts_with("Low confidence match (score: 0.12)."),
            "unexpected reasoning: {}",
            result.reasoning
        );
    }

    #[test]
    fn test_null_lists_behave_like_missing_ones() {
        let analysis = bundle(json!({
            "analysis_metadata": {"primary_category": "a"},
            "categories": null,
            "generation_category_selector": {"available_categories": ["a"], "selection_logic": {}}
        }));
        let result = select_category_for_generation("hiring", Some(&analysis));
        assert_eq!(result.reasoning, "No categories available");

        let analysis = bundle(json!({
            "categories": [{"category_id": "hiring_post", "category_name": "Hiring Post"}],
            "generation_category_selector": {
                "available_categories": ["hiring_post"],
                "selection_logic": {
                    "hiring_post": {"keywords": null, "content_indicators": ["call to action"]}
                }
            }
        }));
        let result = select_category_for_generation("We're hiring", Some(&analysis));
        assert_eq!(result.selected_category_id.as_deref(), Some("hiring_post"));
        let breakdown = result.scores_breakdown.unwrap();
        assert_eq!(breakdown.keyword_score, 0.0);
        assert_eq!(breakdown.final_score, 0.4);
    }
}

