use std::env;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use atelier_contracts::credentials::non_empty_env;
use atelier_contracts::errors::RemoteStatus;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use reqwest::blocking::{Client as HttpClient, Response as HttpResponse};
use serde_json::{json, Map, Value};

use crate::{
    AnalysisCall, ContentPart, GenerativeService, ImageCall, InlineData, OperationHandle,
    StructuredCall, TextCall, VideoCall,
};

const DEFAULT_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Gemini REST transport: `generateContent` for text, structured, image and
/// analysis calls, `predictLongRunning` plus operation polling for video.
pub struct GeminiService {
    api_base: String,
    http: HttpClient,
    request_timeout: Duration,
}

impl Default for GeminiService {
    fn default() -> Self {
        Self::new()
    }
}

impl GeminiService {
    pub fn new() -> Self {
        let api_base = env::var("GEMINI_API_BASE")
            .ok()
            .map(|value| value.trim().trim_end_matches('/').to_string())
            .filter(|value| !value.is_empty())
            .unwrap_or_else(|| DEFAULT_API_BASE.to_string());
        Self::with_api_base(&api_base)
    }

    pub fn with_api_base(api_base: &str) -> Self {
        Self {
            api_base: api_base.trim().trim_end_matches('/').to_string(),
            http: HttpClient::new(),
            request_timeout: Duration::from_secs_f64(request_timeout_seconds(
                non_empty_env("GEMINI_REQUEST_TIMEOUT").as_deref(),
            )),
        }
    }

    pub fn api_base(&self) -> &str {
        &self.api_base
    }

    fn model_endpoint(&self, model: &str, method: &str) -> String {
        let trimmed = model.trim();
        let model_path = if trimmed.starts_with("models/") {
            trimmed.to_string()
        } else {
            format!("models/{trimmed}")
        };
        format!("{}/{}:{}", self.api_base, model_path, method)
    }

    fn operation_endpoint(&self, name: &str) -> String {
        format!("{}/{}", self.api_base, name.trim().trim_start_matches('/'))
    }

    fn post_json(&self, endpoint: &str, credential: &str, payload: &Value) -> Result<Value> {
        let response = self
            .http
            .post(endpoint)
            .query(&[("key", credential)])
            .timeout(self.request_timeout)
            .json(payload)
            .send()
            .with_context(|| format!("Gemini request failed ({endpoint})"))?;
        response_json_or_error("Gemini", response)
    }

    fn get_json(&self, endpoint: &str, credential: &str) -> Result<Value> {
        let response = self
            .http
            .get(endpoint)
            .query(&[("key", credential)])
            .timeout(self.request_timeout)
            .send()
            .with_context(|| format!("Gemini poll request failed ({endpoint})"))?;
        response_json_or_error("Gemini poll", response)
    }

    /// Fetches the bytes behind a finished video locator.
    pub fn download(&self, locator: &str) -> Result<(Vec<u8>, Option<String>)> {
        let response = self
            .http
            .get(locator)
            .timeout(self.request_timeout)
            .send()
            .context("failed downloading generated media")?;
        if !response.status().is_success() {
            let code = response.status().as_u16();
            let body = response.text().unwrap_or_default();
            return Err(remote_status_error("Generated media download", code, &body));
        }
        let mime_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        let bytes = response
            .bytes()
            .context("failed reading generated media bytes")?
            .to_vec();
        Ok((bytes, mime_type))
    }

    fn generation_config(thinking_budget: Option<u32>, temperature: Option<f32>) -> Map<String, Value> {
        let mut config = Map::new();
        if let Some(budget) = thinking_budget {
            config.insert(
                "thinkingConfig".to_string(),
                json!({ "thinkingBudget": budget }),
            );
        }
        if let Some(temperature) = temperature {
            config.insert("temperature".to_string(), json!(temperature));
        }
        config
    }

    fn user_contents(parts: Vec<Value>) -> Value {
        Value::Array(vec![json!({
            "role": "user",
            "parts": parts,
        })])
    }

    fn text_payload(call: &TextCall) -> Value {
        json!({
            "contents": Self::user_contents(vec![json!({ "text": call.prompt })]),
            "generationConfig": Self::generation_config(call.thinking_budget, call.temperature),
        })
    }

    fn structured_payload(call: &StructuredCall) -> Value {
        let mut config = Self::generation_config(call.thinking_budget, None);
        config.insert(
            "responseMimeType".to_string(),
            Value::String("application/json".to_string()),
        );
        config.insert("responseSchema".to_string(), call.schema.clone());
        json!({
            "contents": Self::user_contents(vec![json!({ "text": call.prompt })]),
            "generationConfig": config,
        })
    }

    fn image_payload(call: &ImageCall) -> Value {
        json!({
            "contents": Self::user_contents(vec![json!({ "text": call.prompt })]),
            "generationConfig": {
                "responseModalities": ["TEXT", "IMAGE"],
                "imageConfig": {
                    "aspectRatio": call.aspect_ratio,
                    "imageSize": call.image_size.as_str(),
                },
            },
        })
    }

    fn analysis_payload(call: &AnalysisCall) -> Value {
        let parts = vec![
            json!({
                "inlineData": {
                    "mimeType": call.media.mime_type,
                    "data": call.media.base64(),
                }
            }),
            json!({ "text": call.query }),
        ];
        json!({
            "contents": Self::user_contents(parts),
            "generationConfig": Self::generation_config(call.thinking_budget, None),
        })
    }

    fn video_payload(call: &VideoCall) -> Value {
        let mut instance = Map::new();
        instance.insert("prompt".to_string(), Value::String(call.prompt.clone()));
        if let Some(image) = call.image.as_ref() {
            instance.insert(
                "image".to_string(),
                json!({
                    "bytesBase64Encoded": image.base64(),
                    "mimeType": image.mime_type,
                }),
            );
        }
        json!({
            "instances": [Value::Object(instance)],
            "parameters": {
                "aspectRatio": call.aspect_ratio.as_str(),
                "resolution": call.resolution,
                "sampleCount": call.number_of_videos.max(1),
            },
        })
    }

    fn first_candidate_parts(payload: &Value) -> Vec<Value> {
        payload
            .get("candidates")
            .and_then(Value::as_array)
            .and_then(|rows| rows.first())
            .and_then(|candidate| candidate.get("content"))
            .and_then(|content| content.get("parts"))
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default()
    }

    /// Joins the non-thought text parts of the first candidate.
    fn extract_text(payload: &Value) -> Option<String> {
        let text = Self::first_candidate_parts(payload)
            .iter()
            .filter(|part| !part.get("thought").and_then(Value::as_bool).unwrap_or(false))
            .filter_map(|part| part.get("text").and_then(Value::as_str))
            .collect::<Vec<&str>>()
            .join("");
        if text.trim().is_empty() {
            return None;
        }
        Some(text)
    }

    fn extract_parts(payload: &Value) -> Result<Vec<ContentPart>> {
        let mut out = Vec::new();
        for part in Self::first_candidate_parts(payload) {
            let text = part
                .get("text")
                .and_then(Value::as_str)
                .map(str::to_string);
            let inline = part
                .get("inlineData")
                .or_else(|| part.get("inline_data"))
                .and_then(Value::as_object);
            let inline_data = match inline {
                Some(inline) => {
                    let data = inline
                        .get("data")
                        .and_then(Value::as_str)
                        .unwrap_or_default();
                    if data.is_empty() {
                        None
                    } else {
                        let bytes = BASE64
                            .decode(data.as_bytes())
                            .context("Gemini inline data base64 decode failed")?;
                        let mime_type = inline
                            .get("mimeType")
                            .or_else(|| inline.get("mime_type"))
                            .and_then(Value::as_str)
                            .unwrap_or("image/png")
                            .to_string();
                        Some(InlineData { mime_type, bytes })
                    }
                }
                None => None,
            };
            out.push(ContentPart { text, inline_data });
        }
        Ok(out)
    }

    fn operation_from_payload(payload: &Value) -> Result<OperationHandle> {
        let Some(name) = payload
            .get("name")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|value| !value.is_empty())
        else {
            bail!("Gemini video operation missing name");
        };
        let done = payload.get("done").and_then(Value::as_bool).unwrap_or(false);
        let error = payload.get("error").map(|error| {
            error
                .get("message")
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| error.to_string())
        });
        let locator = payload.get("response").and_then(|response| {
            response
                .pointer("/generateVideoResponse/generatedSamples/0/video/uri")
                .or_else(|| response.pointer("/generatedVideos/0/video/uri"))
                .and_then(Value::as_str)
                .map(str::to_string)
        });
        Ok(OperationHandle {
            name: name.to_string(),
            done,
            locator,
            error,
        })
    }
}

impl GenerativeService for GeminiService {
    fn name(&self) -> &str {
        "gemini"
    }

    fn generate_text(&self, call: &TextCall, credential: &str) -> Result<Option<String>> {
        let endpoint = self.model_endpoint(&call.model, "generateContent");
        let payload = self.post_json(&endpoint, credential, &Self::text_payload(call))?;
        Ok(Self::extract_text(&payload))
    }

    fn generate_structured(
        &self,
        call: &StructuredCall,
        credential: &str,
    ) -> Result<Option<String>> {
        let endpoint = self.model_endpoint(&call.model, "generateContent");
        let payload = self.post_json(&endpoint, credential, &Self::structured_payload(call))?;
        Ok(Self::extract_text(&payload))
    }

    fn generate_image(&self, call: &ImageCall, credential: &str) -> Result<Vec<ContentPart>> {
        let endpoint = self.model_endpoint(&call.model, "generateContent");
        let payload = self.post_json(&endpoint, credential, &Self::image_payload(call))?;
        Self::extract_parts(&payload)
    }

    fn generate_video(&self, call: &VideoCall, credential: &str) -> Result<OperationHandle> {
        let endpoint = self.model_endpoint(&call.model, "predictLongRunning");
        let payload = self.post_json(&endpoint, credential, &Self::video_payload(call))?;
        Self::operation_from_payload(&payload)
    }

    fn poll_video_operation(
        &self,
        handle: &OperationHandle,
        credential: &str,
    ) -> Result<OperationHandle> {
        let endpoint = self.operation_endpoint(&handle.name);
        let payload = self.get_json(&endpoint, credential)?;
        Self::operation_from_payload(&payload)
    }

    fn analyze_media(&self, call: &AnalysisCall, credential: &str) -> Result<Option<String>> {
        let endpoint = self.model_endpoint(&call.model, "generateContent");
        let payload = self.post_json(&endpoint, credential, &Self::analysis_payload(call))?;
        Ok(Self::extract_text(&payload))
    }
}

fn request_timeout_seconds(raw: Option<&str>) -> f64 {
    raw.and_then(|value| value.trim().parse::<f64>().ok())
        .filter(|value| value.is_finite())
        .unwrap_or(90.0)
        .clamp(15.0, 300.0)
}

fn response_json_or_error(label: &str, response: HttpResponse) -> Result<Value> {
    let status = response.status();
    let code = status.as_u16();
    let body = response
        .text()
        .with_context(|| format!("{label} response body read failed"))?;
    if !status.is_success() {
        return Err(remote_status_error(label, code, &body));
    }
    let parsed: Value = serde_json::from_str(&body)
        .with_context(|| format!("{label} returned invalid JSON payload"))?;
    Ok(parsed)
}

/// Prefers the service's `error.message` over the raw body.
fn remote_status_error(label: &str, code: u16, body: &str) -> anyhow::Error {
    let message = serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|value| {
            value
                .pointer("/error/message")
                .and_then(Value::as_str)
                .map(str::to_string)
        })
        .unwrap_or_else(|| body.to_string());
    anyhow::Error::new(RemoteStatus {
        code,
        body: truncate_text(&message, 512),
    })
    .context(format!("{label} request failed ({code})"))
}

fn truncate_text(value: &str, max_chars: usize) -> String {
    if value.chars().count() <= max_chars {
        return value.to_string();
    }
    value.chars().take(max_chars).collect::<String>() + "…"
}
