// Shared prompt fragments. Each feature module that calls the LLM keeps its own
// prompts.rs alongside it; only cross-cutting pieces live here.

/// Appended to every analysis prompt that asks for design descriptions which
/// later feed an image model. Raw values tend to be rendered as visible text.
pub const DESCRIPTIVE_VALUES_INSTRUCTION: &str = "\
    When writing any prompt-ready description, use descriptive names for colors, \
    sizes and angles (\"deep magenta\", \"slightly tilted\") instead of hex codes, \
    percentages, degrees or pixel values.";
