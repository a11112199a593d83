// Prompt builders for the canvas workflow.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

/// Appended to every edit so the model leaves untouched areas alone.
pub const EDIT_PRESERVATION_SUFFIX: &str = ", maintaining the same style, color, size, shape, \
    font, case, position, lighting, and background for everything not explicitly changed";

/// Wrapper sent to the image-capable chat model.
pub const GENERATION_INSTRUCTION: &str =
    "Generate an image based on this description. The image should be high quality. Description: ";

static RE_QUOTED_INSTRUCTION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?i)Instruction:\s*["']([^"']+)["']"#).expect("valid regex"));
static RE_BARE_INSTRUCTION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)Instruction:\s*(.+?)(?:\.|$)").expect("valid regex"));
static RE_DO_NOT_MODIFY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\s*Do not modify.*$").expect("valid regex"));

pub fn editing_prompt(user_task: &str) -> String {
    format!("{user_task}{EDIT_PRESERVATION_SUFFIX}")
}

/// Region edits ("make the text in the top-left red") run without turbo.
pub fn is_region_edit(prompt: &str) -> bool {
    prompt.to_lowercase().contains(" in the ")
}

/// Appends the design context block used for first-pass generation. Absent
/// parts are skipped; with neither present the prompt is returned unchanged.
pub fn generation_prompt(
    prompt: &str,
    universal_elements: Option<&Value>,
    category_design: Option<&Value>,
) -> String {
    let mut context_parts = Vec::new();
    if let Some(main) = universal_elements {
        context_parts.push(format!("Universal Design Elements:\n{}", pretty(main)));
    }
    if let Some(category) = category_design {
        context_parts.push(format!("Category Design System:\n{}", pretty(category)));
    }

    if context_parts.is_empty() {
        return prompt.to_string();
    }
    format!("{prompt}\n\n---\nDesign Context:\n{}", context_parts.join("\n\n"))
}

fn pretty(value: &Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
}

/// Pulls the human instruction out of a region-annotated prompt for display
/// in the session history. Plain prompts come back trimmed.
pub fn extract_user_prompt(full_prompt: &str) -> String {
    if let Some(caps) = RE_QUOTED_INSTRUCTION.captures(full_prompt) {
        return caps[1].trim().to_string();
    }

    if let Some(caps) = RE_BARE_INSTRUCTION.captures(full_prompt) {
        let instruction = caps[1].trim();
        return RE_DO_NOT_MODIFY
            .replace(instruction, "")
            .trim()
            .to_string();
    }

    full_prompt.trim().to_string()
}
