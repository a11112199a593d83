//! Keyword extraction for category matching.

use once_cell::sync::Lazy;
use regex::Regex;

/// Function words dropped before matching. Most are also caught by the length
/// filter.
const STOP_WORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "by", "for", "from", "has", "he", "in", "is", "it",
    "its", "of", "on", "that", "the", "to", "was", "will", "with", "we", "our", "you", "your",
    "this", "these", "those", "about",
];

/// Tokens must be strictly longer than this (in chars) to count as keywords.
const MIN_KEYWORD_CHARS: usize = 3;

/// Anything that is not a word char, whitespace, apostrophe or hyphen.
static RE_PUNCTUATION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^\w\s'-]").expect("valid regex"));

/// Extracts lowercase keywords from free text.
///
/// Punctuation becomes a space (so "coordinator,apply" splits in two) while
/// hyphenated and contracted tokens survive intact. Short tokens and stop-words
/// are dropped. Order and duplicates are preserved.
pub fn extract_keywords(text: &str) -> Vec<String> {
    let lowered = text.to_lowercase();
    let cleaned = RE_PUNCTUATION.replace_all(&lowered, " ");

    cleaned
        .split_whitespace()
        .filter(|word| word.chars().count() > MIN_KEYWORD_CHARS)
        .filter(|word| !STOP_WORDS.contains(word))
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_text_yields_no_keywords() {
        assert!(extract_keywords("").is_empty());
    }

    #[test]
    fn test_short_words_and_stop_words_are_dropped() {
        assert_eq!(
            extract_keywords("We are hiring a volunteer coordinator"),
            vec!["hiring", "volunteer", "coordinator"]
        );
        assert_eq!(extract_keywords("The quick fox is in it"), vec!["quick"]);
    }

    #[test]
    fn test_long_stop_words_are_dropped() {
        assert!(extract_keywords("these those about that with your will from").is_empty());
    }

    #[test]
    fn test_punctuation_splits_but_hyphen_and_apostrophe_survive() {
        assert_eq!(
            extract_keywords("Follow-up:coordinator,apply! We're ready"),
            vec!["follow-up", "coordinator", "apply", "we're", "ready"]
        );
    }

    #[test]
    fn test_keywords_are_lowercased_and_keep_duplicates() {
        assert_eq!(
            extract_keywords("Volunteer VOLUNTEER volunteer"),
            vec!["volunteer", "volunteer", "volunteer"]
        );
    }

    #[test]
    fn test_length_counts_chars_not_bytes() {
        // "café" is four chars but five bytes; "été" is three chars.
        assert_eq!(extract_keywords("café été"), vec!["café"]);
    }
}
