use std::fmt;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FabricEstimate {
    pub meters: f64,
    pub reasoning: String,
    pub confidence: f64,
}

impl FabricEstimate {
    /// JSON schema handed to the structured-output endpoint.
    pub fn response_schema() -> Value {
        json!({
            "type": "OBJECT",
            "properties": {
                "meters": { "type": "NUMBER" },
                "reasoning": { "type": "STRING" },
                "confidence": { "type": "NUMBER" },
            },
            "required": ["meters", "reasoning", "confidence"],
        })
    }
}

#[derive(Clone, PartialEq)]
pub enum MediaResult {
    Inline { mime_type: String, bytes: Vec<u8> },
    Locator(String),
}

impl fmt::Debug for MediaResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MediaResult::Inline { mime_type, bytes } => f
                .debug_struct("Inline")
                .field("mime_type", mime_type)
                .field("bytes", &format_args!("<{} bytes>", bytes.len()))
                .finish(),
            MediaResult::Locator(_) => f.write_str("Locator(<redacted>)"),
        }
    }
}

impl MediaResult {
    /// `data:` URL for inline payloads, the locator itself otherwise.
    pub fn to_url(&self) -> String {
        match self {
            MediaResult::Inline { mime_type, bytes } => {
                format!("data:{mime_type};base64,{}", BASE64.encode(bytes))
            }
            MediaResult::Locator(url) => url.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum GenerationResult {
    Text(String),
    Estimate(FabricEstimate),
    Media(MediaResult),
}

impl GenerationResult {
    pub fn kind_label(&self) -> &'static str {
        match self {
            GenerationResult::Text(_) => "text",
            GenerationResult::Estimate(_) => "estimate",
            GenerationResult::Media(MediaResult::Inline { .. }) => "inline_media",
            GenerationResult::Media(MediaResult::Locator(_)) => "media_locator",
        }
    }

    /// Loggable description that never carries media bytes or locators,
    /// since video locators embed the credential.
    pub fn summary(&self) -> Value {
        match self {
            GenerationResult::Text(text) => json!({
                "kind": self.kind_label(),
                "chars": text.chars().count(),
            }),
            GenerationResult::Estimate(estimate) => json!({
                "kind": self.kind_label(),
                "meters": estimate.meters,
                "confidence": estimate.confidence,
            }),
            GenerationResult::Media(MediaResult::Inline { mime_type, bytes }) => json!({
                "kind": self.kind_label(),
                "mime_type": mime_type,
                "bytes": bytes.len(),
            }),
            GenerationResult::Media(MediaResult::Locator(_)) => json!({
                "kind": self.kind_label(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn estimate_parses_from_structured_text() -> anyhow::Result<()> {
        let estimate: FabricEstimate = serde_json::from_str(
            r#"{"meters": 3.2, "reasoning": "double-breasted", "confidence": 0.85}"#,
        )?;
        assert_eq!(estimate.meters, 3.2);
        assert_eq!(estimate.reasoning, "double-breasted");
        assert_eq!(estimate.confidence, 0.85);
        Ok(())
    }

    #[test]
    fn estimate_requires_every_field() {
        let parsed = serde_json::from_str::<FabricEstimate>(r#"{"meters": 3.2}"#);
        assert!(parsed.is_err());
    }

    #[test]
    fn inline_media_renders_as_data_url() {
        let media = MediaResult::Inline {
            mime_type: "image/png".to_string(),
            bytes: b"png".to_vec(),
        };
        assert_eq!(media.to_url(), "data:image/png;base64,cG5n");
    }

    #[test]
    fn locator_summary_and_debug_hide_credential() {
        let result = GenerationResult::Media(MediaResult::Locator(
            "https://cdn/video123&key=secret".to_string(),
        ));
        assert_eq!(result.kind_label(), "media_locator");
        assert!(!result.summary().to_string().contains("secret"));
        assert!(!format!("{result:?}").contains("secret"));
    }
}
