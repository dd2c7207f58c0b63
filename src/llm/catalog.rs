use log::warn;
use serde::Serialize;

pub const DEFAULT_MODEL: &str = "llama3-70b-8192";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ModelDescriptor {
    pub id: &'static str,
    pub owner: &'static str,
    #[serde(rename = "contextWindow")]
    pub context_window: u32,
}

pub const AVAILABLE_MODELS: &[ModelDescriptor] = &[
    ModelDescriptor { id: "gemma2-9b-it", owner: "Google", context_window: 8192 },
    ModelDescriptor { id: "llama3-8b-8192", owner: "Meta", context_window: 8192 },
    ModelDescriptor { id: "llama-3.2-90b-vision-preview", owner: "Meta", context_window: 8192 },
    ModelDescriptor { id: "llama3-70b-8192", owner: "Meta", context_window: 8192 },
    ModelDescriptor { id: "llama-3.2-11b-vision-preview", owner: "Meta", context_window: 8192 },
    ModelDescriptor { id: "llama-3.2-3b-preview", owner: "Meta", context_window: 8192 },
    ModelDescriptor { id: "llama-3.2-1b-preview", owner: "Meta", context_window: 8192 },
    ModelDescriptor { id: "llama-3.1-8b-instant", owner: "Meta", context_window: 131072 },
];

pub fn find_model(id: &str) -> Option<&'static ModelDescriptor> {
    let id = id.trim();
    AVAILABLE_MODELS.iter().find(|m| m.id == id)
}

/// Returns the catalog id for `id`, or the default model when it is unknown.
pub fn resolve_model_id(id: &str) -> &'static str {
    match find_model(id) {
        Some(model) => model.id,
        None => {
            warn!("Invalid model ID: {}, falling back to default", id);
            DEFAULT_MODEL
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_model_is_in_catalog() {
        assert!(find_model(DEFAULT_MODEL).is_some());
    }

    #[test]
    fn known_ids_resolve_to_themselves() {
        for model in AVAILABLE_MODELS {
            assert_eq!(resolve_model_id(model.id), model.id);
        }
        assert_eq!(resolve_model_id(" gemma2-9b-it "), "gemma2-9b-it");
    }

    #[test]
    fn unknown_ids_fall_back_to_default() {
        assert_eq!(resolve_model_id("gpt-4o"), DEFAULT_MODEL);
        assert_eq!(resolve_model_id(""), DEFAULT_MODEL);
        assert_eq!(resolve_model_id("llama3-groq-70b-8192-tool-use-preview"), DEFAULT_MODEL);
    }

    #[test]
    fn catalog_ids_are_unique() {
        let mut ids: Vec<_> = AVAILABLE_MODELS.iter().map(|m| m.id).collect();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), AVAILABLE_MODELS.len());
    }
}
