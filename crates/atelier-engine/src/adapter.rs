use std::sync::Arc;
use std::time::Instant;

use atelier_contracts::credentials::CredentialProvider;
use atelier_contracts::errors::{AdapterError, AdapterErrorKind};
use atelier_contracts::events::{EventPayload, EventWriter};
use atelier_contracts::models::{ModelSelector, ModelSpec};
use atelier_contracts::requests::{
    AspectRatio, GenerationRequest, ImageSize, OperationKind, ReferenceMedia,
};
use atelier_contracts::results::{FabricEstimate, GenerationResult, MediaResult};
use serde_json::{json, Map, Value};

use crate::poller::{PollPolicy, VideoPoller};
use crate::{AnalysisCall, GenerativeService, ImageCall, StructuredCall, TextCall, VideoCall};

pub const STYLE_ADVICE_FALLBACK: &str = "Neural analysis interrupted.";
pub const DEFAULT_ANALYSIS_QUERY: &str = "Analyze this fashion item for construction details.";
pub const STYLE_TEMPERATURE: f32 = 0.7;
pub const IMAGE_ASPECT_RATIO: &str = "1:1";
pub const VIDEO_RESOLUTION: &str = "720p";

/// Per-capability model names requested by the caller.
#[derive(Debug, Clone, Default)]
pub struct ModelOverrides {
    pub text: Option<String>,
    pub structured: Option<String>,
    pub image: Option<String>,
    pub video: Option<String>,
    pub analysis: Option<String>,
}

impl ModelOverrides {
    fn for_capability(&self, capability: &str) -> Option<&str> {
        match capability {
            "text" => self.text.as_deref(),
            "structured" => self.structured.as_deref(),
            "image" => self.image.as_deref(),
            "video" => self.video.as_deref(),
            "analysis" => self.analysis.as_deref(),
            _ => None,
        }
    }
}

/// The model serving each operation kind for one adapter.
#[derive(Debug, Clone)]
pub struct ModelChoice {
    pub text: ModelSpec,
    pub structured: ModelSpec,
    pub image: ModelSpec,
    pub video: ModelSpec,
    pub analysis: ModelSpec,
}

impl ModelChoice {
    /// Resolves every capability against `service`, returning fallback
    /// reasons as warnings.
    pub fn resolve(
        selector: &ModelSelector,
        service: &str,
        overrides: &ModelOverrides,
    ) -> anyhow::Result<(Self, Vec<String>)> {
        let mut warnings = Vec::new();
        let mut pick = |capability: &str| -> anyhow::Result<ModelSpec> {
            let selection = selector
                .select(
                    overrides.for_capability(capability),
                    capability,
                    Some(service),
                )
                .map_err(anyhow::Error::msg)?;
            if let Some(reason) = selection.fallback_reason {
                warnings.push(reason);
            }
            Ok(selection.model)
        };
        let choice = Self {
            text: pick("text")?,
            structured: pick("structured")?,
            image: pick("image")?,
            video: pick("video")?,
            analysis: pick("analysis")?,
        };
        Ok((choice, warnings))
    }

    pub fn model_for(&self, kind: OperationKind) -> &ModelSpec {
        match kind {
            OperationKind::StyleAdvice => &self.text,
            OperationKind::FabricEstimate => &self.structured,
            OperationKind::Image => &self.image,
            OperationKind::Video => &self.video,
            OperationKind::Analysis => &self.analysis,
        }
    }
}

/// Turns one user intent into calls against the generative service and
/// normalizes the reply. Nothing is retried or cached.
pub struct RequestAdapter {
    service: Arc<dyn GenerativeService>,
    credentials: Arc<dyn CredentialProvider>,
    models: ModelChoice,
    poller: VideoPoller,
    events: Option<EventWriter>,
}

impl RequestAdapter {
    pub fn new(
        service: Arc<dyn GenerativeService>,
        credentials: Arc<dyn CredentialProvider>,
        models: ModelChoice,
    ) -> Self {
        Self {
            service,
            credentials,
            models,
            poller: VideoPoller::new(PollPolicy::default()),
            events: None,
        }
    }

    pub fn with_poller(mut self, poller: VideoPoller) -> Self {
        self.poller = poller;
        self
    }

    pub fn with_events(mut self, events: EventWriter) -> Self {
        self.events = Some(events);
        self
    }

    pub fn service_name(&self) -> &str {
        self.service.name()
    }

    pub fn models(&self) -> &ModelChoice {
        &self.models
    }

    pub fn credentials(&self) -> &dyn CredentialProvider {
        self.credentials.as_ref()
    }

    fn emit(&self, event_type: &str, payload: Value) {
        let Some(events) = self.events.as_ref() else {
            return;
        };
        let payload = match payload {
            Value::Object(map) => map,
            _ => EventPayload::new(),
        };
        // Event log failures never fail the generation.
        let _ = events.emit(event_type, payload);
    }

    fn ensure_credential(&self) -> Result<String, AdapterError> {
        if !self.credentials.has_credential() {
            self.emit("credential_requested", json!({}));
            self.credentials.request_credential().map_err(|err| {
                AdapterError::new(
                    AdapterErrorKind::MissingCredential,
                    format!("credential selection failed: {err:#}"),
                )
            })?;
        }
        self.credentials
            .credential()
            .ok_or_else(AdapterError::missing_credential)
    }

    pub fn request_style_advice(&self, measurements: &str) -> Result<String, AdapterError> {
        let credential = self.ensure_credential()?;
        let call = TextCall {
            model: self.models.text.name.clone(),
            prompt: style_advice_prompt(measurements),
            thinking_budget: self.models.text.thinking_budget,
            temperature: Some(STYLE_TEMPERATURE),
        };
        let text = self
            .service
            .generate_text(&call, &credential)
            .map_err(|err| AdapterError::classify(&err))?;
        Ok(text.unwrap_or_else(|| STYLE_ADVICE_FALLBACK.to_string()))
    }

    /// `Ok(None)` means "estimate unavailable": the service answered, but not
    /// with the expected structure.
    pub fn request_fabric_estimate(
        &self,
        garment_type: &str,
        measurements: &str,
    ) -> Result<Option<FabricEstimate>, AdapterError> {
        let credential = self.ensure_credential()?;
        let call = StructuredCall {
            model: self.models.structured.name.clone(),
            prompt: fabric_estimate_prompt(garment_type, measurements),
            thinking_budget: self.models.structured.thinking_budget,
            schema: FabricEstimate::response_schema(),
        };
        let text = self
            .service
            .generate_structured(&call, &credential)
            .map_err(|err| AdapterError::classify(&err))?;
        Ok(text.and_then(|raw| serde_json::from_str::<FabricEstimate>(&raw).ok()))
    }

    /// First inline payload of the response, if any.
    pub fn request_image(
        &self,
        prompt: &str,
        size: ImageSize,
    ) -> Result<Option<MediaResult>, AdapterError> {
        let credential = self.ensure_credential()?;
        let call = ImageCall {
            model: self.models.image.name.clone(),
            prompt: prompt.to_string(),
            aspect_ratio: IMAGE_ASPECT_RATIO.to_string(),
            image_size: size,
        };
        let parts = self
            .service
            .generate_image(&call, &credential)
            .map_err(|err| AdapterError::classify(&err))?;
        Ok(parts
            .into_iter()
            .find_map(|part| part.inline_data)
            .map(|inline| MediaResult::Inline {
                mime_type: inline.mime_type,
                bytes: inline.bytes,
            }))
    }

    /// Submits the job, waits it out, and returns the locator with the
    /// credential appended.
    pub fn request_video(
        &self,
        prompt: &str,
        aspect_ratio: AspectRatio,
        reference_image: Option<&ReferenceMedia>,
    ) -> Result<String, AdapterError> {
        let credential = self.ensure_credential()?;
        let call = VideoCall {
            model: self.models.video.name.clone(),
            prompt: prompt.to_string(),
            aspect_ratio,
            resolution: VIDEO_RESOLUTION.to_string(),
            number_of_videos: 1,
            image: reference_image.cloned(),
        };
        let handle = self
            .service
            .generate_video(&call, &credential)
            .map_err(|err| AdapterError::classify(&err))?;
        self.emit(
            "video_submitted",
            json!({
                "operation": handle.name,
                "done": handle.done,
                "model": call.model,
            }),
        );
        let polled = self.poller.await_completion(
            self.service.as_ref(),
            handle,
            &credential,
            self.events.as_ref(),
        )?;
        Ok(format!("{}&key={credential}", polled.locator))
    }

    pub fn request_analysis(
        &self,
        media: &ReferenceMedia,
        query: &str,
    ) -> Result<String, AdapterError> {
        let credential = self.ensure_credential()?;
        let query = if query.trim().is_empty() {
            DEFAULT_ANALYSIS_QUERY
        } else {
            query
        };
        let call = AnalysisCall {
            model: self.models.analysis.name.clone(),
            media: media.clone(),
            query: query.to_string(),
            thinking_budget: self.models.analysis.thinking_budget,
        };
        self.service
            .analyze_media(&call, &credential)
            .map_err(|err| AdapterError::classify(&err))?
            .ok_or_else(|| AdapterError::malformed("analysis returned no text"))
    }

    /// Runs one request end to end. `Ok(None)` is only produced by the
    /// estimate and image kinds.
    pub fn execute(
        &self,
        request: &GenerationRequest,
    ) -> Result<Option<GenerationResult>, AdapterError> {
        let kind = request.kind();
        let model = self.models.model_for(kind).name.clone();
        let started = Instant::now();
        self.emit(
            "generation_started",
            json!({
                "kind": kind.as_str(),
                "service": self.service.name(),
                "model": model,
                "request": request.summary(),
            }),
        );

        let outcome = match request {
            GenerationRequest::StyleAdvice { measurements } => self
                .request_style_advice(measurements)
                .map(|text| Some(GenerationResult::Text(text))),
            GenerationRequest::FabricEstimate {
                garment_type,
                measurements,
            } => self
                .request_fabric_estimate(garment_type, measurements)
                .map(|estimate| estimate.map(GenerationResult::Estimate)),
            GenerationRequest::Image { prompt, size } => self
                .request_image(prompt, *size)
                .map(|media| media.map(GenerationResult::Media)),
            GenerationRequest::Video {
                prompt,
                aspect_ratio,
                reference_image,
            } => self
                .request_video(prompt, *aspect_ratio, reference_image.as_ref())
                .map(|locator| Some(GenerationResult::Media(MediaResult::Locator(locator)))),
            GenerationRequest::Analysis { media, query } => self
                .request_analysis(media, query)
                .map(|text| Some(GenerationResult::Text(text))),
        };

        let mut payload = Map::new();
        payload.insert("kind".to_string(), json!(kind.as_str()));
        payload.insert("model".to_string(), json!(model));
        payload.insert(
            "elapsed_s".to_string(),
            json!(started.elapsed().as_secs_f64()),
        );
        match &outcome {
            Ok(result) => {
                payload.insert(
                    "result".to_string(),
                    result
                        .as_ref()
                        .map(GenerationResult::summary)
                        .unwrap_or(Value::Null),
                );
                self.emit("generation_completed", Value::Object(payload));
            }
            Err(err) => {
                payload.insert("error_kind".to_string(), json!(err.kind().as_str()));
                payload.insert("error".to_string(), json!(err.message()));
                self.emit("generation_failed", Value::Object(payload));
            }
        }
        outcome
    }
}

fn style_advice_prompt(measurements: &str) -> String {
    format!(
        "You are a bespoke tailor. Study these body measurements: {}.\n\
         Give a considered, high-end fitting consultation covering:\n\
         1. Silhouettes that balance these proportions.\n\
         2. Cloth weight and drape to favour.\n\
         3. Concrete tailoring adjustments for a made-to-measure fit.",
        measurements.trim()
    )
}

fn fabric_estimate_prompt(garment_type: &str, measurements: &str) -> String {
    format!(
        "Estimate how many meters of cloth are needed to cut a {} from these measurements: {}.\n\
         Account for seam allowances, nap direction and stripe or check matching.",
        garment_type.trim(),
        measurements.trim()
    )
}
