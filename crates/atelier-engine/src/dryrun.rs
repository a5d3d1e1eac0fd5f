use std::collections::HashMap;
use std::io::Cursor;
use std::sync::Mutex;

use anyhow::{Context, Result};
use atelier_contracts::requests::ImageSize;
use image::{ImageFormat, Rgb, RgbImage};
use serde_json::json;
use sha2::{Digest, Sha256};

use crate::{
    AnalysisCall, ContentPart, GenerativeService, ImageCall, InlineData, OperationHandle,
    StructuredCall, TextCall, VideoCall,
};

/// Offline stand-in for the generative service. Output is derived from the
/// prompt so repeated runs are stable.
pub struct DryrunService {
    polls_until_done: u32,
    operations: Mutex<HashMap<String, u32>>,
}

impl Default for DryrunService {
    fn default() -> Self {
        Self::new(2)
    }
}

impl DryrunService {
    pub fn new(polls_until_done: u32) -> Self {
        Self {
            polls_until_done,
            operations: Mutex::new(HashMap::new()),
        }
    }

    fn garment_meters(garment_type: &str) -> f64 {
        let lowered = garment_type.to_ascii_lowercase();
        // Compound names precede the words they contain.
        let table = [
            ("three-piece", 3.8),
            ("waistcoat", 1.0),
            ("vest", 1.0),
            ("suit", 3.5),
            ("overcoat", 3.2),
            ("coat", 3.0),
            ("dress", 2.5),
            ("blazer", 2.0),
            ("jacket", 2.0),
            ("shirt", 1.8),
            ("trouser", 1.4),
            ("pants", 1.4),
            ("skirt", 1.2),
        ];
        table
            .iter()
            .find(|(needle, _)| lowered.contains(needle))
            .map(|(_, meters)| *meters)
            .unwrap_or(2.2)
    }

    #[cfg(test)]
    fn tracked_operations(&self) -> usize {
        self.operations.lock().map(|ops| ops.len()).unwrap_or_default()
    }

    fn placeholder_png(prompt: &str, size: ImageSize) -> Result<Vec<u8>> {
        let edge = match size {
            ImageSize::OneK => 64,
            ImageSize::TwoK => 128,
            ImageSize::FourK => 256,
        };
        let (r, g, b) = color_from_prompt(prompt);
        let mut image = RgbImage::new(edge, edge);
        for pixel in image.pixels_mut() {
            *pixel = Rgb([r, g, b]);
        }
        let mut bytes = Vec::new();
        image
            .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
            .context("failed to encode dryrun image")?;
        Ok(bytes)
    }
}

impl GenerativeService for DryrunService {
    fn name(&self) -> &str {
        "dryrun"
    }

    fn generate_text(&self, call: &TextCall, _credential: &str) -> Result<Option<String>> {
        Ok(Some(format!(
            "[{}] Balance the frame with a structured shoulder, a mid-weight worsted with \
             clean drape, and a suppressed waist taken in along the side seams. Notes: {}",
            call.model,
            clamp_text(&call.prompt, 160)
        )))
    }

    fn generate_structured(
        &self,
        call: &StructuredCall,
        _credential: &str,
    ) -> Result<Option<String>> {
        let meters = Self::garment_meters(&call.prompt);
        let payload = json!({
            "meters": meters,
            "reasoning": format!(
                "Base yardage of {meters:.1} m for this garment plus seam allowance and nap matching."
            ),
            "confidence": 0.6,
        });
        Ok(Some(serde_json::to_string(&payload)?))
    }

    fn generate_image(&self, call: &ImageCall, _credential: &str) -> Result<Vec<ContentPart>> {
        let bytes = Self::placeholder_png(&call.prompt, call.image_size)?;
        Ok(vec![
            ContentPart {
                text: Some(format!("Dryrun render for {}", clamp_text(&call.prompt, 60))),
                inline_data: None,
            },
            ContentPart {
                text: None,
                inline_data: Some(InlineData {
                    mime_type: "image/png".to_string(),
                    bytes,
                }),
            },
        ])
    }

    fn generate_video(&self, call: &VideoCall, _credential: &str) -> Result<OperationHandle> {
        let id = short_id(&format!("{}|{}", call.prompt, call.aspect_ratio.as_str()));
        let name = format!("operations/dryrun-{id}");
        let mut operations = self
            .operations
            .lock()
            .map_err(|_| anyhow::anyhow!("dryrun operation table poisoned"))?;
        let handle = pending_or_done(&name, 0, self.polls_until_done);
        if !handle.done {
            operations.insert(name, 0);
        }
        Ok(handle)
    }

    fn poll_video_operation(
        &self,
        handle: &OperationHandle,
        _credential: &str,
    ) -> Result<OperationHandle> {
        let mut operations = self
            .operations
            .lock()
            .map_err(|_| anyhow::anyhow!("dryrun operation table poisoned"))?;
        let Some(polls) = operations.get_mut(&handle.name) else {
            anyhow::bail!("Requested entity was not found: {}", handle.name);
        };
        *polls += 1;
        let next = pending_or_done(&handle.name, *polls, self.polls_until_done);
        if next.done {
            operations.remove(&handle.name);
        }
        Ok(next)
    }

    fn analyze_media(&self, call: &AnalysisCall, _credential: &str) -> Result<Option<String>> {
        Ok(Some(format!(
            "Dryrun analysis of {} ({} bytes): {}",
            call.media.mime_type,
            call.media.bytes.len(),
            clamp_text(&call.query, 160)
        )))
    }
}

fn pending_or_done(name: &str, polls: u32, polls_until_done: u32) -> OperationHandle {
    let done = polls >= polls_until_done;
    let id = name.trim_start_matches("operations/dryrun-");
    OperationHandle {
        name: name.to_string(),
        done,
        locator: done.then(|| format!("dryrun://video/{id}?alt=media")),
        error: None,
    }
}

fn color_from_prompt(prompt: &str) -> (u8, u8, u8) {
    let mut hasher = Sha256::new();
    hasher.update(prompt.as_bytes());
    let digest = hasher.finalize();
    (digest[0], digest[1], digest[2])
}

fn short_id(seed: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(seed.as_bytes());
    let digest = hasher.finalize();
    hex::encode(&digest[..4])
}

fn clamp_text(text: &str, max_chars: usize) -> String {
    let trimmed = text.trim();
    if trimmed.chars().count() <= max_chars {
        return trimmed.to_string();
    }
    trimmed.chars().take(max_chars).collect::<String>() + "…"
}

#[cfg(test)]
mod tests {
    use atelier_contracts::requests::{AspectRatio, ImageSize};
    use atelier_contracts::results::FabricEstimate;

    use super::*;

    #[test]
    fn structured_output_parses_as_estimate() -> Result<()> {
        let service = DryrunService::default();
        let text = service
            .generate_structured(
                &StructuredCall {
                    model: "dryrun-text-1".to_string(),
                    prompt: "double-breasted overcoat for Chest: 102 cm".to_string(),
                    thinking_budget: None,
                    schema: FabricEstimate::response_schema(),
                },
                "dryrun",
            )?
            .unwrap_or_default();
        let estimate: FabricEstimate = serde_json::from_str(&text)?;
        assert_eq!(estimate.meters, 3.2);
        Ok(())
    }

    #[test]
    fn compound_garment_names_win_over_contained_words() {
        assert_eq!(DryrunService::garment_meters("Waistcoat"), 1.0);
        assert_eq!(DryrunService::garment_meters("tweed vest"), 1.0);
        assert_eq!(DryrunService::garment_meters("three-piece suit"), 3.8);
        assert_eq!(DryrunService::garment_meters("overcoat"), 3.2);
        assert_eq!(DryrunService::garment_meters("car coat"), 3.0);
        assert_eq!(DryrunService::garment_meters("kilt"), 2.2);
    }

    #[test]
    fn image_is_a_decodable_png_sized_by_tier() -> Result<()> {
        let service = DryrunService::default();
        let parts = service.generate_image(
            &ImageCall {
                model: "dryrun-image-1".to_string(),
                prompt: "navy chalk stripe".to_string(),
                aspect_ratio: "1:1".to_string(),
                image_size: ImageSize::TwoK,
            },
            "dryrun",
        )?;
        let inline = parts
            .iter()
            .find_map(|part| part.inline_data.as_ref())
            .ok_or_else(|| anyhow::anyhow!("no inline part"))?;
        let decoded = image::load_from_memory(&inline.bytes)?;
        assert_eq!(decoded.width(), 128);
        Ok(())
    }

    #[test]
    fn video_finishes_after_configured_polls() -> Result<()> {
        let service = DryrunService::new(2);
        let call = VideoCall {
            model: "dryrun-video-1".to_string(),
            prompt: "a tailored coat on a mannequin".to_string(),
            aspect_ratio: AspectRatio::Landscape,
            resolution: "720p".to_string(),
            number_of_videos: 1,
            image: None,
        };
        let handle = service.generate_video(&call, "dryrun")?;
        assert!(!handle.done);
        let first = service.poll_video_operation(&handle, "dryrun")?;
        assert!(!first.done);
        let second = service.poll_video_operation(&first, "dryrun")?;
        assert!(second.done);
        assert!(second
            .locator
            .as_deref()
            .unwrap_or_default()
            .starts_with("dryrun://video/"));
        assert_eq!(service.tracked_operations(), 0);
        assert!(service.poll_video_operation(&second, "dryrun").is_err());
        Ok(())
    }

    #[test]
    fn unknown_operation_is_not_found() {
        let service = DryrunService::default();
        let handle = OperationHandle {
            name: "operations/missing".to_string(),
            ..OperationHandle::default()
        };
        let err = service.poll_video_operation(&handle, "dryrun").err();
        assert!(err
            .map(|err| err.to_string().contains("Requested entity was not found"))
            .unwrap_or(false));
    }

    #[test]
    fn zero_poll_video_is_done_on_submit() -> Result<()> {
        let service = DryrunService::new(0);
        let handle = service.generate_video(
            &VideoCall {
                model: "dryrun-video-1".to_string(),
                prompt: "linen".to_string(),
                aspect_ratio: AspectRatio::Portrait,
                resolution: "720p".to_string(),
                number_of_videos: 1,
                image: None,
            },
            "dryrun",
        )?;
        assert!(handle.done);
        assert!(handle.locator.is_some());
        assert_eq!(service.tracked_operations(), 0);
        Ok(())
    }
}
