use std::fmt;
use std::fs;
use std::path::Path;

use anyhow::{bail, Context, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde_json::{json, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationKind {
    StyleAdvice,
    FabricEstimate,
    Image,
    Video,
    Analysis,
}

impl OperationKind {
    pub const ALL: [OperationKind; 5] = [
        OperationKind::StyleAdvice,
        OperationKind::FabricEstimate,
        OperationKind::Image,
        OperationKind::Video,
        OperationKind::Analysis,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            OperationKind::StyleAdvice => "style_advice",
            OperationKind::FabricEstimate => "fabric_estimate",
            OperationKind::Image => "image",
            OperationKind::Video => "video",
            OperationKind::Analysis => "analysis",
        }
    }

    /// Model capability a request of this kind must be served by.
    pub fn capability(self) -> &'static str {
        match self {
            OperationKind::StyleAdvice => "text",
            OperationKind::FabricEstimate => "structured",
            OperationKind::Image => "image",
            OperationKind::Video => "video",
            OperationKind::Analysis => "analysis",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ImageSize {
    #[default]
    OneK,
    TwoK,
    FourK,
}

impl ImageSize {
    pub fn as_str(self) -> &'static str {
        match self {
            ImageSize::OneK => "1K",
            ImageSize::TwoK => "2K",
            ImageSize::FourK => "4K",
        }
    }

    pub fn parse(raw: &str) -> Result<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "1k" => Ok(ImageSize::OneK),
            "2k" => Ok(ImageSize::TwoK),
            "4k" => Ok(ImageSize::FourK),
            other => bail!("unsupported image size '{other}' (expected 1K, 2K or 4K)"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AspectRatio {
    #[default]
    Landscape,
    Portrait,
}

impl AspectRatio {
    pub fn as_str(self) -> &'static str {
        match self {
            AspectRatio::Landscape => "16:9",
            AspectRatio::Portrait => "9:16",
        }
    }

    pub fn parse(raw: &str) -> Result<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "16:9" | "landscape" | "wide" => Ok(AspectRatio::Landscape),
            "9:16" | "portrait" | "tall" => Ok(AspectRatio::Portrait),
            other => bail!("unsupported aspect ratio '{other}' (expected 16:9 or 9:16)"),
        }
    }
}

/// Binary media attached to a request, e.g. a reference frame for video or
/// an uploaded garment photo for analysis.
#[derive(Clone, PartialEq, Eq)]
pub struct ReferenceMedia {
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

impl fmt::Debug for ReferenceMedia {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReferenceMedia")
            .field("mime_type", &self.mime_type)
            .field("bytes", &format_args!("<{} bytes>", self.bytes.len()))
            .finish()
    }
}

impl ReferenceMedia {
    pub fn new(mime_type: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            mime_type: mime_type.into(),
            bytes,
        }
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        let bytes = fs::read(path).with_context(|| format!("failed reading {}", path.display()))?;
        let mime_type = mime_for_path(path).unwrap_or("application/octet-stream");
        Ok(Self::new(mime_type, bytes))
    }

    /// Accepts `data:<mime>;base64,<payload>`. The prefix is dropped and
    /// only the decoded payload is kept.
    pub fn from_data_url(raw: &str) -> Result<Self> {
        let trimmed = raw.trim();
        let Some(rest) = trimmed.strip_prefix("data:") else {
            bail!("media is not a data URL");
        };
        let Some((header, payload)) = rest.split_once(',') else {
            bail!("data URL missing payload separator");
        };
        let Some(mime_type) = header.strip_suffix(";base64") else {
            bail!("data URL is not base64 encoded");
        };
        let bytes = BASE64
            .decode(payload.as_bytes())
            .context("data URL base64 decode failed")?;
        let mime_type = if mime_type.is_empty() {
            "application/octet-stream"
        } else {
            mime_type
        };
        Ok(Self::new(mime_type, bytes))
    }

    pub fn base64(&self) -> String {
        BASE64.encode(&self.bytes)
    }

    pub fn is_image(&self) -> bool {
        self.mime_type.starts_with("image/")
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum GenerationRequest {
    StyleAdvice {
        measurements: String,
    },
    FabricEstimate {
        garment_type: String,
        measurements: String,
    },
    Image {
        prompt: String,
        size: ImageSize,
    },
    Video {
        prompt: String,
        aspect_ratio: AspectRatio,
        reference_image: Option<ReferenceMedia>,
    },
    Analysis {
        media: ReferenceMedia,
        query: String,
    },
}

impl GenerationRequest {
    pub fn kind(&self) -> OperationKind {
        match self {
            GenerationRequest::StyleAdvice { .. } => OperationKind::StyleAdvice,
            GenerationRequest::FabricEstimate { .. } => OperationKind::FabricEstimate,
            GenerationRequest::Image { .. } => OperationKind::Image,
            GenerationRequest::Video { .. } => OperationKind::Video,
            GenerationRequest::Analysis { .. } => OperationKind::Analysis,
        }
    }

    /// Loggable description. Media bytes are reduced to their type and size.
    pub fn summary(&self) -> Value {
        match self {
            GenerationRequest::StyleAdvice { measurements } => json!({
                "kind": self.kind().as_str(),
                "measurements": measurements,
            }),
            GenerationRequest::FabricEstimate {
                garment_type,
                measurements,
            } => json!({
                "kind": self.kind().as_str(),
                "garment_type": garment_type,
                "measurements": measurements,
            }),
            GenerationRequest::Image { prompt, size } => json!({
                "kind": self.kind().as_str(),
                "prompt": prompt,
                "size": size.as_str(),
            }),
            GenerationRequest::Video {
                prompt,
                aspect_ratio,
                reference_image,
            } => json!({
                "kind": self.kind().as_str(),
                "prompt": prompt,
                "aspect_ratio": aspect_ratio.as_str(),
                "reference_image": reference_image.as_ref().map(media_summary),
            }),
            GenerationRequest::Analysis { media, query } => json!({
                "kind": self.kind().as_str(),
                "query": query,
                "media": media_summary(media),
            }),
        }
    }
}

fn media_summary(media: &ReferenceMedia) -> Value {
    json!({
        "mime_type": media.mime_type,
        "bytes": media.bytes.len(),
    })
}

pub fn mime_for_path(path: &Path) -> Option<&'static str> {
    let ext = path
        .extension()
        .and_then(|value| value.to_str())
        .map(|value| value.to_ascii_lowercase())?;
    match ext.as_str() {
        "png" => Some("image/png"),
        "jpg" | "jpeg" => Some("image/jpeg"),
        "webp" => Some("image/webp"),
        "gif" => Some("image/gif"),
        "heic" => Some("image/heic"),
        "mp4" => Some("video/mp4"),
        "mov" => Some("video/quicktime"),
        "webm" => Some("video/webm"),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_url_prefix_is_stripped() -> anyhow::Result<()> {
        let raw = format!("data:image/png;base64,{}", BASE64.encode(b"frame"));
        let media = ReferenceMedia::from_data_url(&raw)?;
        assert_eq!(media.mime_type, "image/png");
        assert_eq!(media.bytes, b"frame");
        assert_eq!(media.base64(), BASE64.encode(b"frame"));
        Ok(())
    }

    #[test]
    fn data_url_rejects_plain_text() {
        assert!(ReferenceMedia::from_data_url("hello").is_err());
        assert!(ReferenceMedia::from_data_url("data:image/png,abc").is_err());
    }

    #[test]
    fn media_from_path_infers_mime() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("jacket.JPG");
        fs::write(&path, b"jpeg-bytes")?;
        let media = ReferenceMedia::from_path(&path)?;
        assert_eq!(media.mime_type, "image/jpeg");
        assert!(media.is_image());
        Ok(())
    }

    #[test]
    fn size_and_ratio_parse_loosely() -> anyhow::Result<()> {
        assert_eq!(ImageSize::parse("2k")?, ImageSize::TwoK);
        assert_eq!(ImageSize::parse(" 4K ")?, ImageSize::FourK);
        assert!(ImageSize::parse("8K").is_err());
        assert_eq!(AspectRatio::parse("portrait")?, AspectRatio::Portrait);
        assert_eq!(AspectRatio::parse("16:9")?, AspectRatio::Landscape);
        assert!(AspectRatio::parse("1:1").is_err());
        Ok(())
    }

    #[test]
    fn summary_omits_media_bytes() {
        let request = GenerationRequest::Analysis {
            media: ReferenceMedia::new("image/png", vec![0u8; 64]),
            query: "seams".to_string(),
        };
        let summary = request.summary();
        assert_eq!(summary["kind"], json!("analysis"));
        assert_eq!(summary["media"]["bytes"], json!(64));
        assert!(!summary.to_string().contains("AAAA"));
    }

    #[test]
    fn every_kind_maps_to_a_capability() {
        let capabilities: Vec<&str> = OperationKind::ALL
            .iter()
            .map(|kind| kind.capability())
            .collect();
        assert_eq!(
            capabilities,
            vec!["text", "structured", "image", "video", "analysis"]
        );
    }
}
