use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use anyhow::Result;
use atelier_contracts::requests::{AspectRatio, ImageSize, ReferenceMedia};
use serde_json::Value;

mod adapter;
mod dryrun;
mod gemini;
mod poller;
mod studio;

pub use adapter::{
    ModelChoice, ModelOverrides, RequestAdapter, DEFAULT_ANALYSIS_QUERY, IMAGE_ASPECT_RATIO,
    STYLE_ADVICE_FALLBACK, STYLE_TEMPERATURE, VIDEO_RESOLUTION,
};
pub use dryrun::DryrunService;
pub use gemini::GeminiService;
pub use poller::{PollPolicy, PolledVideo, VideoPoller, DEFAULT_POLL_INTERVAL};
pub use studio::{
    Notification, NotificationLevel, Notifier, RunOutcome, StudioSession,
    ESTIMATE_UNAVAILABLE_MESSAGE, GENERATION_FAILED_MESSAGE, NO_IMAGE_MESSAGE,
    VIDEO_FAILED_MESSAGE,
};

#[derive(Debug, Clone, PartialEq)]
pub struct TextCall {
    pub model: String,
    pub prompt: String,
    pub thinking_budget: Option<u32>,
    pub temperature: Option<f32>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StructuredCall {
    pub model: String,
    pub prompt: String,
    pub thinking_budget: Option<u32>,
    pub schema: Value,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ImageCall {
    pub model: String,
    pub prompt: String,
    pub aspect_ratio: String,
    pub image_size: ImageSize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct VideoCall {
    pub model: String,
    pub prompt: String,
    pub aspect_ratio: AspectRatio,
    pub resolution: String,
    pub number_of_videos: u32,
    pub image: Option<ReferenceMedia>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisCall {
    pub model: String,
    pub media: ReferenceMedia,
    pub query: String,
    pub thinking_budget: Option<u32>,
}

#[derive(Clone, PartialEq, Eq)]
pub struct InlineData {
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

impl fmt::Debug for InlineData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InlineData")
            .field("mime_type", &self.mime_type)
            .field("bytes", &format_args!("<{} bytes>", self.bytes.len()))
            .finish()
    }
}

/// One fragment of a generated candidate.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContentPart {
    pub text: Option<String>,
    pub inline_data: Option<InlineData>,
}

/// In-flight video job as last reported by the service.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OperationHandle {
    pub name: String,
    pub done: bool,
    pub locator: Option<String>,
    pub error: Option<String>,
}

/// Transport boundary to the generative service. Every call is a single
/// request; implementations do not retry.
pub trait GenerativeService: Send + Sync {
    fn name(&self) -> &str;
    fn generate_text(&self, call: &TextCall, credential: &str) -> Result<Option<String>>;
    fn generate_structured(&self, call: &StructuredCall, credential: &str)
        -> Result<Option<String>>;
    fn generate_image(&self, call: &ImageCall, credential: &str) -> Result<Vec<ContentPart>>;
    fn generate_video(&self, call: &VideoCall, credential: &str) -> Result<OperationHandle>;
    fn poll_video_operation(
        &self,
        handle: &OperationHandle,
        credential: &str,
    ) -> Result<OperationHandle>;
    fn analyze_media(&self, call: &AnalysisCall, credential: &str) -> Result<Option<String>>;
}

#[derive(Default)]
pub struct GenerativeServiceRegistry {
    services: BTreeMap<String, Arc<dyn GenerativeService>>,
}

impl GenerativeServiceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<S: GenerativeService + 'static>(&mut self, service: S) {
        self.services
            .insert(service.name().to_string(), Arc::new(service));
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn GenerativeService>> {
        self.services.get(name).cloned()
    }

    pub fn names(&self) -> Vec<String> {
        self.services.keys().cloned().collect()
    }
}

pub fn default_service_registry() -> GenerativeServiceRegistry {
    let mut registry = GenerativeServiceRegistry::new();
    registry.register(DryrunService::default());
    registry.register(GeminiService::new());
    registry
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_registry_includes_gemini_and_dryrun() {
        let registry = default_service_registry();
        assert_eq!(registry.names(), vec!["dryrun", "gemini"]);
        assert!(registry.get("gemini").is_some());
        assert!(registry.get("openai").is_none());
    }

    #[test]
    fn inline_data_debug_hides_bytes() {
        let part = InlineData {
            mime_type: "image/png".to_string(),
            bytes: vec![1, 2, 3],
        };
        assert_eq!(
            format!("{part:?}"),
            "InlineData { mime_type: \"image/png\", bytes: <3 bytes> }"
        );
    }
}
