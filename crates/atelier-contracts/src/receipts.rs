use std::path::Path;

use chrono::{SecondsFormat, Utc};
use serde_json::{Map, Value};

pub const RECEIPT_SCHEMA_VERSION: u64 = 1;

#[derive(Debug, Clone, Default)]
pub struct ReceiptArtifacts<'a> {
    pub artifact_path: Option<&'a Path>,
    pub receipt_path: Option<&'a Path>,
}

pub fn build_receipt(
    request_summary: &Value,
    result_summary: &Value,
    service: &str,
    model: &str,
    warnings: &[String],
    artifacts: &ReceiptArtifacts<'_>,
) -> Value {
    let mut root = Map::new();
    root.insert(
        "schema_version".to_string(),
        Value::Number(RECEIPT_SCHEMA_VERSION.into()),
    );
    root.insert("request".to_string(), sanitize_payload(request_summary));
    root.insert("result".to_string(), sanitize_payload(result_summary));
    root.insert("service".to_string(), Value::String(service.to_string()));
    root.insert("model".to_string(), Value::String(model.to_string()));
    root.insert(
        "warnings".to_string(),
        Value::Array(warnings.iter().cloned().map(Value::String).collect()),
    );

    let mut paths = Map::new();
    for (key, path) in [
        ("artifact_path", artifacts.artifact_path),
        ("receipt_path", artifacts.receipt_path),
    ] {
        if let Some(path) = path {
            paths.insert(
                key.to_string(),
                Value::String(path.to_string_lossy().to_string()),
            );
        }
    }
    root.insert("artifacts".to_string(), Value::Object(paths));
    root.insert(
        "ts".to_string(),
        Value::String(Utc::now().to_rfc3339_opts(SecondsFormat::Micros, false)),
    );
    Value::Object(root)
}

pub fn write_receipt(path: &Path, payload: &Value) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, serde_json::to_string_pretty(payload)?)?;
    Ok(())
}

fn sanitize_payload(value: &Value) -> Value {
    match value {
        Value::Null => Value::Null,
        Value::Bool(_) | Value::Number(_) | Value::String(_) => value.clone(),
        Value::Array(rows) => Value::Array(rows.iter().map(sanitize_payload).collect()),
        Value::Object(map) => {
            let mut out = Map::new();
            for (key, row) in map {
                let lowered = key.to_ascii_lowercase();
                if matches!(
                    lowered.as_str(),
                    "data" | "image_bytes" | "bytes_base64" | "key" | "api_key" | "locator"
                ) {
                    out.insert(key.clone(), Value::String("<omitted>".to_string()));
                    continue;
                }
                out.insert(key.clone(), sanitize_payload(row));
            }
            Value::Object(out)
        }
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use serde_json::json;

    use super::*;

    #[test]
    fn receipt_records_request_result_and_paths() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let artifact = temp.path().join("artifact-1.png");
        let receipt_path = temp.path().join("receipt-1.json");
        let receipt = build_receipt(
            &json!({"kind": "image", "prompt": "linen blazer", "size": "2K"}),
            &json!({"kind": "inline_media", "bytes": 512}),
            "dryrun",
            "dryrun-image-1",
            &["Requested model 'x' unavailable.".to_string()],
            &ReceiptArtifacts {
                artifact_path: Some(&artifact),
                receipt_path: Some(&receipt_path),
            },
        );
        write_receipt(&receipt_path, &receipt)?;

        let parsed: Value = serde_json::from_str(&fs::read_to_string(&receipt_path)?)?;
        assert_eq!(parsed["schema_version"], json!(RECEIPT_SCHEMA_VERSION));
        assert_eq!(parsed["request"]["prompt"], json!("linen blazer"));
        assert_eq!(parsed["model"], json!("dryrun-image-1"));
        assert_eq!(parsed["warnings"].as_array().map(Vec::len), Some(1));
        assert!(parsed["artifacts"]["artifact_path"]
            .as_str()
            .unwrap_or_default()
            .ends_with("artifact-1.png"));
        Ok(())
    }

    #[test]
    fn sanitize_omits_payloads_and_keys() {
        let cleaned = sanitize_payload(&json!({
            "media": {"data": "AAAA", "mime_type": "image/png"},
            "key": "AIza",
            "rows": [{"locator": "https://cdn/v&key=AIza"}],
        }));
        assert_eq!(cleaned["media"]["data"], json!("<omitted>"));
        assert_eq!(cleaned["media"]["mime_type"], json!("image/png"));
        assert_eq!(cleaned["key"], json!("<omitted>"));
        assert_eq!(cleaned["rows"][0]["locator"], json!("<omitted>"));
    }
}
