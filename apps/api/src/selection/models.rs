//! Typed view of the analysis bundle written by the design analyzer.
//!
//! Every field is defaulted so a partially populated bundle still parses.
//! Anything not modelled here lands in a flattened `extra` map and is written
//! back unchanged, so category design systems round-trip verbatim.

use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// Full analysis output for one social-media handle.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalysisBundle {
    #[serde(default)]
    pub analysis_metadata: AnalysisMetadata,
    #[serde(default, deserialize_with = "null_as_default")]
    pub categories: Vec<CategoryDefinition>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generation_category_selector: Option<CategorySelectorData>,
    /// universal_design_elements, cross_category_patterns, ...
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl AnalysisBundle {
    /// Looks up a category record by id. Records without an id never match.
    pub fn find_category(&self, category_id: &str) -> Option<&CategoryDefinition> {
        self.categories
            .iter()
            .find(|c| c.category_id.as_deref() == Some(category_id))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalysisMetadata {
    /// Category holding the most recent post; the default generation target.
    #[serde(default)]
    pub primary_category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recommended_category_for_generation: Option<CategoryRecommendation>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CategoryRecommendation {
    #[serde(default)]
    pub category_id: Option<String>,
    #[serde(default)]
    pub reasoning: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// One inferred content category together with its design-system payload.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CategoryDefinition {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category_description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub purpose: Option<String>,
    /// design_system, prompt_template, consistency_tracking, post_count, ...
    #[serde(flatten)]
    pub design: Map<String, Value>,
}

impl CategoryDefinition {
    pub fn display_name(&self) -> &str {
        self.category_name.as_deref().unwrap_or("unknown")
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CategorySelectorData {
    /// Scoring order. Also the tie-break order.
    #[serde(default, deserialize_with = "null_as_default")]
    pub available_categories: Vec<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub selection_logic: BTreeMap<String, SelectionLogic>,
}

/// Matching hints for a single category.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SelectionLogic {
    #[serde(default, deserialize_with = "null_as_default")]
    pub keywords: Vec<String>,
    /// Human-readable labels such as "call to action" or "deadline".
    #[serde(default, deserialize_with = "null_as_default")]
    pub content_indicators: Vec<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub purpose: String,
}

/// Explicit `null` reads the same as a missing key.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}
