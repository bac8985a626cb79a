//! LLM model catalog with availability merged from the provider.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// One known or discovered LLM model.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ModelInfo {
    pub id: String,
    pub name: String,
    pub provider: String,
    pub description: String,
    #[serde(default)]
    pub capabilities: Vec<String>,
    #[serde(default)]
    pub available: bool,
}

fn catalog_entry(id: &str, name: &str, description: &str) -> ModelInfo {
    ModelInfo {
        id: id.to_string(),
        name: name.to_string(),
        provider: "openai-compatible".to_string(),
        description: description.to_string(),
        capabilities: vec![
            "text-analysis".to_string(),
            "character-extraction".to_string(),
            "segmentation".to_string(),
        ],
        available: false,
    }
}

/// Built-in catalog shown before the provider is probed.
pub fn default_model_catalog() -> Vec<ModelInfo> {
    vec![
        catalog_entry(
            "gpt-4o-mini",
            "GPT-4o mini",
            "Fast and cost-effective model for extraction and segmentation.",
        ),
        catalog_entry(
            "gpt-4.1-mini",
            "GPT-4.1 mini",
            "Balanced reasoning model for robust character analysis.",
        ),
        catalog_entry(
            "gpt-4o",
            "GPT-4o",
            "High quality model for nuanced story understanding.",
        ),
    ]
}

/// Merge provider-probed model ids into the built-in catalog.
///
/// Known ids flip to available; unknown ids are appended as discovered
/// entries. With no probed ids only the configured default (if listed)
/// flips.
pub fn merge_probed_models(
    probed_ids: &[String],
    configured_default: &str,
) -> Vec<ModelInfo> {
    let mut catalog = default_model_catalog();

    if probed_ids.is_empty() {
        for item in &mut catalog {
            if item.id == configured_default {
                item.available = true;
            }
        }
        return catalog;
    }

    for model_id in probed_ids {
        if let Some(existing) = catalog.iter_mut().find(|item| &item.id == model_id) {
            existing.available = true;
        } else {
            let mut discovered = catalog_entry(
                model_id,
                model_id,
                "Discovered dynamically from configured provider.",
            );
            discovered.available = true;
            catalog.push(discovered);
        }
    }
    catalog
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_marks_known_and_appends_unknown() {
        let probed = vec!["gpt-4o".to_string(), "qwen-plus".to_string()];
        let merged = merge_probed_models(&probed, "gpt-4o-mini");
        let known = merged.iter().find(|m| m.id == "gpt-4o").unwrap();
        assert!(known.available);
        let discovered = merged.iter().find(|m| m.id == "qwen-plus").unwrap();
        assert!(discovered.available);
        let untouched = merged.iter().find(|m| m.id == "gpt-4o-mini").unwrap();
        assert!(!untouched.available);
    }

    #[test]
    fn test_merge_without_probe_flips_default_only() {
        let merged = merge_probed_models(&[], "gpt-4o");
        assert!(merged.iter().find(|m| m.id == "gpt-4o").unwrap().available);
        assert!(!merged.iter().find(|m| m.id == "gpt-4o-mini").unwrap().available);
    }
}
