use indexmap::IndexMap;

pub const DEFAULT_THINKING_BUDGET: u32 = 32_768;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelSpec {
    pub name: String,
    pub service: String,
    pub capabilities: Vec<String>,
    pub thinking_budget: Option<u32>,
}

impl ModelSpec {
    pub fn supports(&self, capability: &str) -> bool {
        self.capabilities.iter().any(|item| item == capability)
    }
}

#[derive(Debug, Clone)]
pub struct ModelRegistry {
    models: IndexMap<String, ModelSpec>,
}

impl ModelRegistry {
    pub fn new(models: Option<IndexMap<String, ModelSpec>>) -> Self {
        Self {
            models: models.unwrap_or_else(default_models),
        }
    }

    pub fn get(&self, name: &str) -> Option<&ModelSpec> {
        self.models.get(name)
    }

    pub fn list(&self) -> impl Iterator<Item = &ModelSpec> {
        self.models.values()
    }

    pub fn by_capability(&self, capability: &str, service: Option<&str>) -> Vec<ModelSpec> {
        self.models
            .values()
            .filter(|model| model.supports(capability))
            .filter(|model| service.map(|name| model.service == name).unwrap_or(true))
            .cloned()
            .collect()
    }

    pub fn ensure(&self, name: &str, capability: &str) -> Option<ModelSpec> {
        let model = self.get(name)?;
        if model.supports(capability) {
            return Some(model.clone());
        }
        None
    }
}

fn default_models() -> IndexMap<String, ModelSpec> {
    let mut map = IndexMap::new();

    let mut insert =
        |name: &str, service: &str, capabilities: &[&str], thinking_budget: Option<u32>| {
            map.insert(
                name.to_string(),
                ModelSpec {
                    name: name.to_string(),
                    service: service.to_string(),
                    capabilities: capabilities
                        .iter()
                        .map(|item| (*item).to_string())
                        .collect(),
                    thinking_budget,
                },
            );
        };

    insert(
        "gemini-3-pro-preview",
        "gemini",
        &["text", "structured", "analysis"],
        Some(DEFAULT_THINKING_BUDGET),
    );
    insert("gemini-3-pro-image-preview", "gemini", &["image"], None);
    insert("veo-3.1-fast-generate-preview", "gemini", &["video"], None);
    insert(
        "gemini-2.5-flash",
        "gemini",
        &["text", "structured", "analysis"],
        Some(8_192),
    );
    insert("gemini-2.5-flash-image", "gemini", &["image"], None);
    insert("veo-3.1-generate-preview", "gemini", &["video"], None);
    insert(
        "dryrun-text-1",
        "dryrun",
        &["text", "structured", "analysis"],
        None,
    );
    insert("dryrun-image-1", "dryrun", &["image"], None);
    insert("dryrun-video-1", "dryrun", &["video"], None);

    map
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_cover_every_capability_per_service() {
        let registry = ModelRegistry::new(None);
        for capability in ["text", "structured", "image", "video", "analysis"] {
            assert!(!registry.by_capability(capability, Some("gemini")).is_empty());
            assert!(!registry.by_capability(capability, Some("dryrun")).is_empty());
        }
    }

    #[test]
    fn first_gemini_text_model_thinks_with_full_budget() {
        let registry = ModelRegistry::new(None);
        let text = registry.by_capability("text", Some("gemini"));
        assert_eq!(text[0].name, "gemini-3-pro-preview");
        assert_eq!(text[0].thinking_budget, Some(DEFAULT_THINKING_BUDGET));
    }

    #[test]
    fn ensure_checks_capability() {
        let registry = ModelRegistry::new(None);
        assert!(registry.ensure("veo-3.1-fast-generate-preview", "video").is_some());
        assert!(registry.ensure("veo-3.1-fast-generate-preview", "text").is_none());
        assert!(registry.ensure("missing", "text").is_none());
    }
}
