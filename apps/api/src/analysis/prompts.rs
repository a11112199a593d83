// All LLM prompt constants for the Analysis module.
// Reuses the descriptive-values fragment from llm_client::prompts.

/// System prompt for both analysis phases.
pub const ANALYSIS_SYSTEM: &str = "You are a senior brand designer who reverse-engineers \
    social media design systems from example posts. \
    You MUST respond with valid JSON only. \
    Do NOT include any text outside the JSON object. \
    Do NOT use markdown code fences.";

/// Phase 1 prompt. Replace `{post_count}`, `{indicator_labels}` and
/// `{posts_json}` before sending. Images follow the text part in post order.
pub const CATEGORY_DETECTION_PROMPT: &str = r##"You are looking at {post_count} recent posts from one account. Post 1 is the newest.

Group the posts into 2-4 categories. A category combines WHAT the post is about (hiring call, event recap, announcement, educational tip, testimonial) with HOW it looks (photo collage, bold type on flat color, gradient poster). Do not create a category per post: a category needs at least two posts, except that Post 1 may form its own category when it fits nowhere else. Every post number must appear in exactly one category.

For each category also say how a new piece of text could be recognised as belonging to it:
- "selection_keywords": 5-15 lowercase words longer than three letters that would appear in a caption for this category.
- "content_indicators": zero or more labels taken ONLY from this list: {indicator_labels}

Then report which elements are identical across ALL posts.

Return a JSON object with this EXACT schema:
{
  "categories": [
    {
      "category_id": "snake_case_id",
      "category_name": "Human readable name",
      "category_description": "Two sentences on the content theme and visual style.",
      "post_assignments": [1, 3],
      "purpose": "call_to_action",
      "selection_keywords": ["hiring", "volunteer", "apply"],
      "content_indicators": ["call to action", "deadline"],
      "color_palette_notes": "Single palette: candy pink and royal blue",
      "logo_consistency": "ALWAYS bottom-right"
    }
  ],
  "universal_elements": {
    "canvas_consistent": true,
    "canvas_dimensions": {"width": 1080, "height": 1350, "aspect_ratio": "4:5"},
    "logo_position_consistent": true,
    "universal_logo_position": "top-right",
    "fonts_consistent": true,
    "universal_fonts": ["Montserrat"],
    "brand_colors_present": true,
    "core_brand_colors": [{"hex": "#FF58C1", "name": "vibrant candy pink"}]
  }
}

Posts:
{posts_json}"##;

/// Phase 2 prompt. Replace `{category_name}`, `{category_description}`,
/// `{descriptive_values}` and `{posts_json}` before sending.
pub const DESIGN_SYSTEM_PROMPT: &str = r##"These posts belong to the "{category_name}" category: {category_description}

Build a reusable design system that lets an image model create a NEW post in this category without access to the originals. Post 1 is the primary reference; keep an element only if it also appears in other posts or is prominent in Post 1. The image model has no access to the original photos, icons or brand assets, so describe every element well enough to redraw it.

If a post is a carousel, describe the cover image separately from the content slides.

{descriptive_values}

Return a JSON object with this schema:
{
  "design_system": {
    "canvas": {"width": 1080, "height": 1350, "background": "description"},
    "color_palette": [{"name": "deep magenta", "usage": "headline text"}],
    "typography": {
      "headline": {"font_family": "Montserrat", "weight": "extra bold", "case": "uppercase", "size": "very large"},
      "body": {"font_family": "Montserrat", "weight": "regular", "size": "small"}
    },
    "layout": "description of the grid and element placement",
    "decorations": ["description of each recurring shape or sticker"]
  },
  "consistency_tracking": {
    "logo_placement": {"primary_position": "bottom-right", "description": "white wordmark, small"}
  },
  "image_sequence": {
    "is_carousel": false,
    "thumbnail_style": "direction for the cover image",
    "content_slide_style": "direction for later slides"
  },
  "color_palette_notes": "one sentence",
  "prompt_template": "A ready-to-use image prompt with [PLACEHOLDERS] for the new text"
}

Posts:
{posts_json}"##;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detection_prompt_keeps_full_schema() {
        assert!(CATEGORY_DETECTION_PROMPT.contains(r##""hex": "#FF58C1""##));
        assert!(CATEGORY_DETECTION_PROMPT.contains("\"core_brand_colors\""));
        assert!(CATEGORY_DETECTION_PROMPT.ends_with("Posts:\n{posts_json}"));
        for placeholder in ["{post_count}", "{indicator_labels}", "{posts_json}"] {
            assert!(
                CATEGORY_DETECTION_PROMPT.contains(placeholder),
                "missing {placeholder}"
            );
        }
    }

    #[test]
    fn test_design_system_prompt_placeholders() {
        for placeholder in [
            "{category_name}",
            "{category_description}",
            "{descriptive_values}",
            "{posts_json}",
        ] {
            assert!(DESIGN_SYSTEM_PROMPT.contains(placeholder), "missing {placeholder}");
        }
        assert!(DESIGN_SYSTEM_PROMPT.ends_with("Posts:\n{posts_json}"));
    }

    #[test]
    fn test_analysis_system_demands_json_only() {
        assert!(ANALYSIS_SYSTEM.contains("valid JSON only"));
        assert!(ANALYSIS_SYSTEM.contains("markdown code fences"));
    }
}
