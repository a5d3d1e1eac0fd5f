use std::fs;
use std::io::{self, BufRead, IsTerminal, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use atelier_contracts::credentials::{
    mask_credential, CredentialProvider, EnvCredentialProvider, StaticCredentialProvider,
    CREDENTIAL_ENV_KEYS,
};
use atelier_contracts::events::EventWriter;
use atelier_contracts::measurements::{format_measurements, Measurement};
use atelier_contracts::models::{ModelRegistry, ModelSelector};
use atelier_contracts::receipts::{build_receipt, write_receipt, ReceiptArtifacts};
use atelier_contracts::requests::{AspectRatio, GenerationRequest, ImageSize, ReferenceMedia};
use atelier_contracts::results::{GenerationResult, MediaResult};
use atelier_engine::{
    default_service_registry, GeminiService, ModelChoice, ModelOverrides, Notification,
    NotificationLevel, Notifier, PollPolicy, RequestAdapter, RunOutcome, StudioSession,
    VideoPoller,
};
use clap::{Args, Parser, Subcommand};
use serde_json::{json, Value};
use sha2::{Digest, Sha256};

#[derive(Debug, Parser)]
#[command(name = "atelier-rs", version, about = "Atelier tailoring studio CLI")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Fitting consultation for a set of measurements.
    Style(StyleArgs),
    /// Cloth yardage estimate for one garment.
    Estimate(EstimateArgs),
    Image(ImageArgs),
    Video(VideoArgs),
    /// Construction analysis of a photo or clip.
    Analyze(AnalyzeArgs),
    Models(ModelsArgs),
}

#[derive(Debug, Args)]
struct CommonArgs {
    #[arg(long)]
    out: PathBuf,
    #[arg(long)]
    events: Option<PathBuf>,
    #[arg(long, default_value = "gemini")]
    service: String,
    #[arg(long)]
    text_model: Option<String>,
    #[arg(long)]
    structured_model: Option<String>,
    #[arg(long)]
    image_model: Option<String>,
    #[arg(long)]
    video_model: Option<String>,
    #[arg(long)]
    analysis_model: Option<String>,
}

impl CommonArgs {
    fn overrides(&self) -> ModelOverrides {
        ModelOverrides {
            text: self.text_model.clone(),
            structured: self.structured_model.clone(),
            image: self.image_model.clone(),
            video: self.video_model.clone(),
            analysis: self.analysis_model.clone(),
        }
    }

    fn events_path(&self) -> PathBuf {
        self.events
            .clone()
            .unwrap_or_else(|| self.out.join("events.jsonl"))
    }
}

#[derive(Debug, Parser)]
struct StyleArgs {
    #[command(flatten)]
    common: CommonArgs,
    /// `label=value[cm|in]`, repeatable.
    #[arg(long = "measurement", required = true)]
    measurements: Vec<String>,
}

#[derive(Debug, Parser)]
struct EstimateArgs {
    #[command(flatten)]
    common: CommonArgs,
    #[arg(long)]
    garment: String,
    #[arg(long = "measurement", required = true)]
    measurements: Vec<String>,
}

#[derive(Debug, Parser)]
struct ImageArgs {
    #[command(flatten)]
    common: CommonArgs,
    #[arg(long)]
    prompt: String,
    #[arg(long, default_value = "1K")]
    size: String,
}

#[derive(Debug, Parser)]
struct VideoArgs {
    #[command(flatten)]
    common: CommonArgs,
    #[arg(long)]
    prompt: String,
    #[arg(long, default_value = "16:9")]
    aspect: String,
    /// Starting frame: an image path or a `data:` URL.
    #[arg(long)]
    reference: Option<String>,
    /// Seconds between status polls (1-120).
    #[arg(long)]
    poll_interval: Option<f64>,
    #[arg(long)]
    max_polls: Option<u32>,
    /// Fetch the finished video into `--out`.
    #[arg(long)]
    download: bool,
    /// Print the locator without masking the credential.
    #[arg(long)]
    show_key: bool,
}

#[derive(Debug, Parser)]
struct AnalyzeArgs {
    #[command(flatten)]
    common: CommonArgs,
    /// Image or video path, or a `data:` URL.
    #[arg(long)]
    media: String,
    #[arg(long, default_value = "")]
    query: String,
}

#[derive(Debug, Parser)]
struct ModelsArgs {
    #[arg(long)]
    capability: Option<String>,
    #[arg(long)]
    service: Option<String>,
}

#[derive(Debug, Default)]
struct VideoOptions {
    poll_interval: Option<f64>,
    max_polls: Option<u32>,
    download: bool,
    show_key: bool,
}

fn main() {
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("atelier-rs error: {err:#}");
            std::process::exit(1);
        }
    }
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    match cli.command {
        Command::Style(args) => {
            let measurements = parse_measurements(&args.measurements)?;
            run_generation(
                &args.common,
                GenerationRequest::StyleAdvice { measurements },
                VideoOptions::default(),
            )
        }
        Command::Estimate(args) => {
            let measurements = parse_measurements(&args.measurements)?;
            run_generation(
                &args.common,
                GenerationRequest::FabricEstimate {
                    garment_type: args.garment.clone(),
                    measurements,
                },
                VideoOptions::default(),
            )
        }
        Command::Image(args) => run_generation(
            &args.common,
            GenerationRequest::Image {
                prompt: args.prompt.clone(),
                size: ImageSize::parse(&args.size)?,
            },
            VideoOptions::default(),
        ),
        Command::Video(args) => {
            let reference_image = args.reference.as_deref().map(load_media).transpose()?;
            if let Some(reference) = reference_image.as_ref() {
                if !reference.is_image() {
                    bail!("--reference must be an image, got {}", reference.mime_type);
                }
            }
            run_generation(
                &args.common,
                GenerationRequest::Video {
                    prompt: args.prompt.clone(),
                    aspect_ratio: AspectRatio::parse(&args.aspect)?,
                    reference_image,
                },
                VideoOptions {
                    poll_interval: args.poll_interval,
                    max_polls: args.max_polls,
                    download: args.download,
                    show_key: args.show_key,
                },
            )
        }
        Command::Analyze(args) => run_generation(
            &args.common,
            GenerationRequest::Analysis {
                media: load_media(&args.media)?,
                query: args.query.clone(),
            },
            VideoOptions::default(),
        ),
        Command::Models(args) => {
            list_models(&args);
            Ok(0)
        }
    }
}

fn run_generation(
    common: &CommonArgs,
    request: GenerationRequest,
    video: VideoOptions,
) -> Result<i32> {
    fs::create_dir_all(&common.out)
        .with_context(|| format!("failed to create {}", common.out.display()))?;
    let run_id = uuid::Uuid::new_v4().to_string();
    let events = EventWriter::new(common.events_path(), run_id.clone());

    let registry = default_service_registry();
    let Some(service) = registry.get(&common.service) else {
        bail!(
            "unknown service '{}' (available: {})",
            common.service,
            registry.names().join(", ")
        );
    };
    let credentials: Arc<dyn CredentialProvider> = if service.name() == "dryrun" {
        Arc::new(StaticCredentialProvider::new(Some("dryrun")))
    } else {
        Arc::new(PromptCredentialProvider::default())
    };

    let (models, warnings) = ModelChoice::resolve(
        &ModelSelector::new(None),
        service.name(),
        &common.overrides(),
    )?;
    for warning in &warnings {
        eprintln!("warning: {warning}");
    }

    let mut policy = PollPolicy::from_env();
    if let Some(seconds) = video.poll_interval.filter(|value| value.is_finite()) {
        policy.interval = Duration::from_secs_f64(seconds.clamp(1.0, 120.0));
    }
    if let Some(max_polls) = video.max_polls.filter(|value| *value > 0) {
        policy.max_polls = Some(max_polls);
    }

    let kind = request.kind();
    let model = models.model_for(kind).name.clone();
    let service_name = service.name().to_string();
    let adapter = RequestAdapter::new(service, Arc::clone(&credentials), models)
        .with_poller(VideoPoller::new(policy))
        .with_events(events.clone());

    let mut session = StudioSession::new(StderrNotifier);
    let outcome = session.run(&adapter, &request);
    let result = session.take_result();

    let stamp = chrono::Utc::now().timestamp_millis();
    let artifact_id = artifact_id(&run_id, stamp);
    let artifact_path = match result.as_ref() {
        Some(GenerationResult::Text(text)) => {
            println!("{text}");
            None
        }
        Some(GenerationResult::Estimate(estimate)) => {
            println!("{}", serde_json::to_string_pretty(estimate)?);
            None
        }
        Some(GenerationResult::Media(MediaResult::Inline { mime_type, bytes })) => {
            let path = artifact_path(&common.out, stamp, &artifact_id, mime_type);
            fs::write(&path, bytes)
                .with_context(|| format!("failed to write {}", path.display()))?;
            println!("{}", path.display());
            Some(path)
        }
        Some(GenerationResult::Media(MediaResult::Locator(locator))) => {
            let shown = if video.show_key {
                locator.clone()
            } else {
                mask_locator(locator, credentials.credential().as_deref())
            };
            println!("{shown}");
            if video.download {
                download_video(&service_name, locator, &common.out, stamp, &artifact_id)?
            } else {
                None
            }
        }
        None => None,
    };

    let receipt_path = common.out.join(format!("receipt-{stamp}-{artifact_id}.json"));
    let mut result_summary = result
        .as_ref()
        .map(GenerationResult::summary)
        .unwrap_or_else(|| json!({}));
    if let Value::Object(map) = &mut result_summary {
        map.insert("outcome".to_string(), json!(outcome_label(outcome)));
    }
    let receipt = build_receipt(
        &request.summary(),
        &result_summary,
        &service_name,
        &model,
        &warnings,
        &ReceiptArtifacts {
            artifact_path: artifact_path.as_deref(),
            receipt_path: Some(&receipt_path),
        },
    );
    write_receipt(&receipt_path, &receipt)
        .with_context(|| format!("failed to write {}", receipt_path.display()))?;

    match outcome {
        RunOutcome::Completed | RunOutcome::Empty => Ok(0),
        RunOutcome::Failed(_) | RunOutcome::Busy => {
            eprintln!("details logged to {}", events.path().display());
            Ok(1)
        }
    }
}

fn download_video(
    service: &str,
    locator: &str,
    out: &Path,
    stamp: i64,
    artifact_id: &str,
) -> Result<Option<PathBuf>> {
    if service == "dryrun" {
        eprintln!("dryrun videos have no downloadable content; skipping download");
        return Ok(None);
    }
    let (bytes, mime_type) = GeminiService::new().download(locator)?;
    let mime_type = mime_type.unwrap_or_else(|| "video/mp4".to_string());
    let path = artifact_path(out, stamp, artifact_id, &mime_type);
    fs::write(&path, bytes).with_context(|| format!("failed to write {}", path.display()))?;
    println!("{}", path.display());
    Ok(Some(path))
}

fn list_models(args: &ModelsArgs) {
    let registry = ModelRegistry::new(None);
    for model in registry.list() {
        if let Some(capability) = args.capability.as_deref() {
            if !model.supports(capability) {
                continue;
            }
        }
        if let Some(service) = args.service.as_deref() {
            if model.service != service {
                continue;
            }
        }
        println!(
            "{}",
            json!({
                "name": model.name,
                "service": model.service,
                "capabilities": model.capabilities,
                "thinking_budget": model.thinking_budget,
            })
        );
    }
}

fn parse_measurements(raw: &[String]) -> Result<String> {
    let parsed = raw
        .iter()
        .map(|item| Measurement::parse(item))
        .collect::<Result<Vec<_>>>()?;
    Ok(format_measurements(&parsed))
}

fn load_media(raw: &str) -> Result<ReferenceMedia> {
    if raw.trim_start().starts_with("data:") {
        return ReferenceMedia::from_data_url(raw);
    }
    ReferenceMedia::from_path(Path::new(raw))
}

fn artifact_id(run_id: &str, stamp: i64) -> String {
    let mut hasher = Sha256::new();
    hasher.update(run_id.as_bytes());
    hasher.update(stamp.to_le_bytes());
    hex::encode(&hasher.finalize()[..6])
}

fn artifact_path(out: &Path, stamp: i64, artifact_id: &str, mime_type: &str) -> PathBuf {
    out.join(format!(
        "artifact-{stamp}-{artifact_id}.{}",
        extension_for_mime(mime_type)
    ))
}

fn extension_for_mime(mime_type: &str) -> &'static str {
    match mime_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
        .as_str()
    {
        "image/png" => "png",
        "image/jpeg" | "image/jpg" => "jpg",
        "image/webp" => "webp",
        "image/gif" => "gif",
        "video/mp4" => "mp4",
        "video/webm" => "webm",
        "video/quicktime" => "mov",
        _ => "bin",
    }
}

fn mask_locator(locator: &str, credential: Option<&str>) -> String {
    match credential.filter(|value| !value.is_empty()) {
        Some(credential) => locator.replace(credential, &mask_credential(credential)),
        None => locator.to_string(),
    }
}

fn outcome_label(outcome: RunOutcome) -> &'static str {
    match outcome {
        RunOutcome::Completed => "completed",
        RunOutcome::Empty => "empty",
        RunOutcome::Failed(_) => "failed",
        RunOutcome::Busy => "busy",
    }
}

struct StderrNotifier;

impl Notifier for StderrNotifier {
    fn notify(&self, notification: &Notification) {
        let level = match notification.level {
            NotificationLevel::Info => "notice",
            NotificationLevel::Error => "error",
        };
        match notification.error_kind {
            Some(kind) => eprintln!("{level} [{}]: {}", kind.as_str(), notification.message),
            None => eprintln!("{level}: {}", notification.message),
        }
    }

    /// A key picked now would go unused once this run exits, so point at the
    /// variables read on the next run instead of prompting.
    fn reselect_credential(&self, _credentials: &dyn CredentialProvider) -> Result<()> {
        eprintln!(
            "notice: set {} to a different key and re-run",
            CREDENTIAL_ENV_KEYS.join(" or ")
        );
        Ok(())
    }
}

/// Environment keys first; when none is set and stdin is a terminal, asks
/// for one on selection.
#[derive(Default)]
struct PromptCredentialProvider {
    env: EnvCredentialProvider,
    entered: Mutex<Option<String>>,
}

impl CredentialProvider for PromptCredentialProvider {
    fn has_credential(&self) -> bool {
        self.credential().is_some()
    }

    fn request_credential(&self) -> Result<()> {
        let stdin = io::stdin();
        if !stdin.is_terminal() {
            return Ok(());
        }
        eprint!("Gemini API key: ");
        io::stderr().flush()?;
        let mut line = String::new();
        stdin
            .lock()
            .read_line(&mut line)
            .context("failed reading API key from stdin")?;
        let value = line.trim();
        let mut entered = self
            .entered
            .lock()
            .map_err(|_| anyhow::anyhow!("credential lock poisoned"))?;
        *entered = (!value.is_empty()).then(|| value.to_string());
        Ok(())
    }

    fn credential(&self) -> Option<String> {
        let entered = self.entered.lock().ok().and_then(|guard| guard.clone());
        entered.or_else(|| self.env.credential())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn common(out: &Path) -> CommonArgs {
        CommonArgs {
            out: out.to_path_buf(),
            events: None,
            service: "dryrun".to_string(),
            text_model: None,
            structured_model: None,
            image_model: None,
            video_model: None,
            analysis_model: None,
        }
    }

    fn receipts_in(dir: &Path) -> Result<Vec<Value>> {
        let mut rows = Vec::new();
        for entry in fs::read_dir(dir)? {
            let path = entry?.path();
            let name = path
                .file_name()
                .and_then(|name| name.to_str())
                .unwrap_or_default();
            if name.starts_with("receipt-") && name.ends_with(".json") {
                rows.push(serde_json::from_str(&fs::read_to_string(&path)?)?);
            }
        }
        Ok(rows)
    }

    #[test]
    fn locator_credential_is_masked() {
        assert_eq!(
            mask_locator("https://cdn/video123&key=AIzaSyExample42", Some("AIzaSyExample42")),
            "https://cdn/video123&key=AI****42"
        );
        assert_eq!(mask_locator("https://cdn/v", None), "https://cdn/v");
    }

    #[test]
    fn extensions_follow_mime_type() {
        assert_eq!(extension_for_mime("image/png"), "png");
        assert_eq!(extension_for_mime("video/mp4; codecs=avc1"), "mp4");
        assert_eq!(extension_for_mime("application/x-unknown"), "bin");
    }

    #[test]
    fn measurements_are_normalized_for_prompts() -> Result<()> {
        let text = parse_measurements(&["chest=102cm".to_string(), "inseam=32in".to_string()])?;
        assert_eq!(text, "Chest: 102 cm, Inseam: 32 inch");
        assert!(parse_measurements(&["chest".to_string()]).is_err());
        Ok(())
    }

    #[test]
    fn dryrun_image_writes_artifact_and_receipt() -> Result<()> {
        let temp = tempfile::tempdir()?;
        let code = run_generation(
            &common(temp.path()),
            GenerationRequest::Image {
                prompt: "charcoal flannel".to_string(),
                size: ImageSize::OneK,
            },
            VideoOptions::default(),
        )?;
        assert_eq!(code, 0);

        let artifact = fs::read_dir(temp.path())?
            .filter_map(|entry| entry.ok().map(|entry| entry.path()))
            .find(|path| {
                path.file_name()
                    .and_then(|name| name.to_str())
                    .map(|name| name.starts_with("artifact-") && name.ends_with(".png"))
                    .unwrap_or(false)
            });
        assert!(artifact.is_some());

        let receipts = receipts_in(temp.path())?;
        assert_eq!(receipts.len(), 1);
        assert_eq!(receipts[0]["service"], json!("dryrun"));
        assert_eq!(receipts[0]["model"], json!("dryrun-image-1"));
        assert_eq!(receipts[0]["result"]["outcome"], json!("completed"));
        assert!(temp.path().join("events.jsonl").exists());
        Ok(())
    }

    #[test]
    fn failed_video_does_not_prompt_for_a_key() -> Result<()> {
        let credentials = StaticCredentialProvider::new(Some("good-key"));
        let mut session = StudioSession::new(StderrNotifier);
        assert!(session.begin());
        let outcome = session.finish(
            atelier_contracts::requests::OperationKind::Video,
            Err(atelier_contracts::errors::AdapterError::remote(
                "429: quota exhausted",
            )),
            &credentials,
        );
        assert!(matches!(outcome, RunOutcome::Failed(_)));
        assert_eq!(credentials.request_count(), 0);
        assert_eq!(credentials.credential().as_deref(), Some("good-key"));
        Ok(())
    }

    #[test]
    fn unknown_service_is_rejected() -> Result<()> {
        let temp = tempfile::tempdir()?;
        let mut args = common(temp.path());
        args.service = "openai".to_string();
        let err = run_generation(
            &args,
            GenerationRequest::StyleAdvice {
                measurements: "Chest: 100 cm".to_string(),
            },
            VideoOptions::default(),
        )
        .err()
        .map(|err| err.to_string())
        .unwrap_or_default();
        assert!(err.contains("unknown service 'openai'"));
        Ok(())
    }
}
