use super::registry::{ModelRegistry, ModelSpec};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelSelection {
    pub model: ModelSpec,
    pub requested: Option<String>,
    pub fallback_reason: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ModelSelector {
    pub registry: ModelRegistry,
}

impl ModelSelector {
    pub fn new(registry: Option<ModelRegistry>) -> Self {
        Self {
            registry: registry.unwrap_or_else(|| ModelRegistry::new(None)),
        }
    }

    /// Picks `requested` when it serves `capability` on `service`, otherwise
    /// the first registered model that does, with the reason recorded.
    pub fn select(
        &self,
        requested: Option<&str>,
        capability: &str,
        service: Option<&str>,
    ) -> Result<ModelSelection, String> {
        let (fallback_reason, requested_text) = if let Some(requested_value) = requested {
            if let Some(model) = self
                .registry
                .ensure(requested_value, capability)
                .filter(|model| service.map(|name| model.service == name).unwrap_or(true))
            {
                return Ok(ModelSelection {
                    model,
                    requested: Some(requested_value.to_string()),
                    fallback_reason: None,
                });
            }
            (
                Some(format!(
                    "Requested model '{requested_value}' unavailable for capability '{capability}'."
                )),
                Some(requested_value.to_string()),
            )
        } else {
            (None, None)
        };

        let candidates = self.registry.by_capability(capability, service);
        let Some(model) = candidates.first().cloned() else {
            return Err(match service {
                Some(name) => format!(
                    "No models available for capability '{capability}' on service '{name}'."
                ),
                None => format!("No models available for capability '{capability}'."),
            });
        };
        Ok(ModelSelection {
            model,
            requested: requested_text,
            fallback_reason,
        })
    }
}

#[cfg(test)]
mod tests {
    use indexmap::IndexMap;

    use super::*;

    fn spec(name: &str, service: &str, capabilities: &[&str]) -> ModelSpec {
        ModelSpec {
            name: name.to_string(),
            service: service.to_string(),
            capabilities: capabilities.iter().map(|item| item.to_string()).collect(),
            thinking_budget: None,
        }
    }

    #[test]
    fn selector_falls_back_when_requested_model_unavailable() {
        let mut models = IndexMap::new();
        models.insert("veo-a".to_string(), spec("veo-a", "gemini", &["video"]));
        let selection = ModelSelector::new(Some(ModelRegistry::new(Some(models))))
            .select(Some("missing"), "video", None)
            .unwrap();
        assert_eq!(selection.model.name, "veo-a");
        assert_eq!(selection.requested.as_deref(), Some("missing"));
        assert_eq!(
            selection.fallback_reason.as_deref(),
            Some("Requested model 'missing' unavailable for capability 'video'.")
        );
    }

    #[test]
    fn selector_no_request_uses_service_default_silently() {
        let selection = ModelSelector::new(None)
            .select(None, "image", Some("dryrun"))
            .unwrap();
        assert_eq!(selection.model.name, "dryrun-image-1");
        assert!(selection.fallback_reason.is_none());
    }

    #[test]
    fn selector_rejects_model_from_other_service() {
        let selection = ModelSelector::new(None)
            .select(Some("gemini-3-pro-preview"), "text", Some("dryrun"))
            .unwrap();
        assert_eq!(selection.model.name, "dryrun-text-1");
        assert!(selection.fallback_reason.is_some());
    }

    #[test]
    fn selector_errors_when_no_models_for_capability() {
        let mut models = IndexMap::new();
        models.insert("text-only".to_string(), spec("text-only", "gemini", &["text"]));
        let err = ModelSelector::new(Some(ModelRegistry::new(Some(models))))
            .select(Some("veo"), "video", None)
            .err()
            .unwrap_or_default();
        assert_eq!(err, "No models available for capability 'video'.");
    }
}
