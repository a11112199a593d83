//! Content indicator detection: six fixed textual-pattern flags.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

static RE_DATE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"\b(january|february|march|april|may|june|july|august|september|october|november|december|\d{1,2}/\d{1,2}(/\d{2,4})?)",
    )
    .expect("valid regex")
});

const CTA_TERMS: &[&str] = &[
    "apply",
    "join",
    "sign up",
    "register",
    "volunteer",
    "hiring",
    "deadline",
];
const NARRATIVE_TERMS: &[&str] = &["story", "experience", "testimonial", "journey", "impact"];
const EDUCATIONAL_TERMS: &[&str] = &["learn", "how to", "tips", "guide", "tutorial", "fact"];
const ANNOUNCEMENT_TERMS: &[&str] = &[
    "announcing",
    "new",
    "launching",
    "introducing",
    "reminder",
];

/// Category indicator labels understood by scoring. Anything else is ignored.
pub const KNOWN_INDICATOR_LABELS: &[&str] = &[
    "call to action",
    "deadline",
    "team expansion",
    "past event recap",
    "volunteer stories",
    "impact showcase",
    "event announcement",
    "deadline reminder",
    "date-specific info",
];

/// Name of a single indicator flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndicatorKey {
    HasDate,
    HasCta,
    HasNarrative,
    HasEducational,
    HasAnnouncement,
    HasQuestion,
}

impl IndicatorKey {
    /// All keys in reporting order.
    pub const ALL: [IndicatorKey; 6] = [
        IndicatorKey::HasDate,
        IndicatorKey::HasCta,
        IndicatorKey::HasNarrative,
        IndicatorKey::HasEducational,
        IndicatorKey::HasAnnouncement,
        IndicatorKey::HasQuestion,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            IndicatorKey::HasDate => "has_date",
            IndicatorKey::HasCta => "has_cta",
            IndicatorKey::HasNarrative => "has_narrative",
            IndicatorKey::HasEducational => "has_educational",
            IndicatorKey::HasAnnouncement => "has_announcement",
            IndicatorKey::HasQuestion => "has_question",
        }
    }

    /// Maps a category's human-readable indicator label onto a flag.
    ///
    /// Closed vocabulary (`KNOWN_INDICATOR_LABELS`): any other label returns
    /// `None` and is ignored by scoring.
    pub fn from_label(label: &str) -> Option<Self> {
        match label.to_lowercase().as_str() {
            "call to action" | "team expansion" => Some(IndicatorKey::HasCta),
            "deadline" | "deadline reminder" | "date-specific info" => Some(IndicatorKey::HasDate),
            "past event recap" | "volunteer stories" | "impact showcase" => {
                Some(IndicatorKey::HasNarrative)
            }
            "event announcement" => Some(IndicatorKey::HasAnnouncement),
            _ => None,
        }
    }
}

/// The six content flags detected in a piece of user text.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndicatorFlags {
    pub has_date: bool,
    pub has_cta: bool,
    pub has_narrative: bool,
    pub has_educational: bool,
    pub has_announcement: bool,
    pub has_question: bool,
}

impl IndicatorFlags {
    pub fn get(&self, key: IndicatorKey) -> bool {
        match key {
            IndicatorKey::HasDate => self.has_date,
            IndicatorKey::HasCta => self.has_cta,
            IndicatorKey::HasNarrative => self.has_narrative,
            IndicatorKey::HasEducational => self.has_educational,
            IndicatorKey::HasAnnouncement => self.has_announcement,
            IndicatorKey::HasQuestion => self.has_question,
        }
    }

    /// Names of the flags that are set, in reporting order.
    pub fn active(&self) -> Vec<&'static str> {
        IndicatorKey::ALL
            .iter()
            .filter(|key| self.get(**key))
            .map(IndicatorKey::as_str)
            .collect()
    }
}

/// Scans text for the six content indicators. Plain substring checks, so
/// "newsletter" counts as an announcement and "mayor" as a date.
pub fn detect_content_indicators(text: &str) -> IndicatorFlags {
    let text_lower = text.to_lowercase();
    let contains_any = |terms: &[&str]| terms.iter().any(|t| text_lower.contains(t));

    IndicatorFlags {
        has_date: RE_DATE.is_match(&text_lower),
        has_cta: contains_any(CTA_TERMS),
        has_narrative: contains_any(NARRATIVE_TERMS),
        has_educational: contains_any(EDUCATIONAL_TERMS),
        has_announcement: contains_any(ANNOUNCEMENT_TERMS),
        has_question: text.contains('?'),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cta_with_month_name() {
        let flags = detect_content_indicators("Apply by March 5th!");
        assert_eq!(
            flags,
            IndicatorFlags {
                has_date: true,
                has_cta: true,
                ..Default::default()
            }
        );
    }

    #[test]
    fn test_numeric_dates() {
        assert!(detect_content_indicators("Doors open 6/14").has_date);
        assert!(detect_content_indicators("Due 12/01/2025").has_date);
        assert!(!detect_content_indicators("Rated 5 stars").has_date);
    }

    #[test]
    fn test_month_match_is_case_insensitive() {
        assert!(detect_content_indicators("SEPTEMBER kickoff").has_date);
    }

    #[test]
    fn test_question_mark_anywhere() {
        assert!(detect_content_indicators("Ready?").has_question);
        assert!(!detect_content_indicators("Ready.").has_question);
    }

    #[test]
    fn test_multi_word_terms() {
        let flags = detect_content_indicators("How to sign up for our tutorial");
        assert!(flags.has_cta);
        assert!(flags.has_educational);
        assert!(!flags.has_narrative);
    }

    #[test]
    fn test_substring_matching_is_loose() {
        // "news" contains "new"
        assert!(detect_content_indicators("Big news").has_announcement);
        assert!(detect_content_indicators("Our journey so far").has_narrative);
    }

    #[test]
    fn test_empty_text_sets_nothing() {
        assert_eq!(detect_content_indicators(""), IndicatorFlags::default());
    }

    #[test]
    fn test_active_flags_follow_fixed_order() {
        let flags = IndicatorFlags {
            has_question: true,
            has_cta: true,
            has_date: true,
            ..Default::default()
        };
        assert_eq!(flags.active(), vec!["has_date", "has_cta", "has_question"]);
    }

    #[test]
    fn test_label_lookup_is_case_insensitive_and_closed() {
        assert_eq!(
            IndicatorKey::from_label("Call To Action"),
            Some(IndicatorKey::HasCta)
        );
        assert_eq!(
            IndicatorKey::from_label("date-specific info"),
            Some(IndicatorKey::HasDate)
        );
        assert_eq!(IndicatorKey::from_label("uses gradients or vibrant colors"), None);
    }

    #[test]
    fn test_every_known_label_maps_to_a_flag() {
        for label in KNOWN_INDICATOR_LABELS {
            assert!(
                IndicatorKey::from_label(label).is_some(),
                "Label {label:?} has no flag"
            );
        }
    }

    #[test]
    fn test_flags_serialize_with_six_keys() {
        let value = serde_json::to_value(IndicatorFlags::default()).unwrap();
        let keys: Vec<_> = value.as_object().unwrap().keys().cloned().collect();
        assert_eq!(keys.len(), 6);
        assert!(keys.contains(&"has_announcement".to_string()));
    }
}
