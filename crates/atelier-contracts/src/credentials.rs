use std::env;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use anyhow::Result;

/// Access to the caller-supplied credential of the generative service.
///
/// `request_credential` is the host's selection affordance: a key picker,
/// a prompt, or a re-read of the environment.
pub trait CredentialProvider: Send + Sync {
    fn has_credential(&self) -> bool;
    fn request_credential(&self) -> Result<()>;
    fn credential(&self) -> Option<String>;
}

pub const CREDENTIAL_ENV_KEYS: [&str; 3] = ["GEMINI_API_KEY", "GOOGLE_API_KEY", "API_KEY"];

#[derive(Debug, Default, Clone, Copy)]
pub struct EnvCredentialProvider;

impl CredentialProvider for EnvCredentialProvider {
    fn has_credential(&self) -> bool {
        self.credential().is_some()
    }

    fn request_credential(&self) -> Result<()> {
        // Nothing to select; the next `credential()` call re-reads the env.
        Ok(())
    }

    fn credential(&self) -> Option<String> {
        CREDENTIAL_ENV_KEYS.iter().find_map(|key| non_empty_env(key))
    }
}

#[derive(Debug, Default)]
pub struct StaticCredentialProvider {
    value: Mutex<Option<String>>,
    on_request: Option<String>,
    requests: AtomicUsize,
}

impl StaticCredentialProvider {
    pub fn new(value: Option<&str>) -> Self {
        Self {
            value: Mutex::new(value.map(str::to_string)),
            on_request: None,
            requests: AtomicUsize::new(0),
        }
    }

    /// Starts empty and becomes `value` once selection is requested.
    pub fn selected_on_request(value: &str) -> Self {
        Self {
            value: Mutex::new(None),
            on_request: Some(value.to_string()),
            requests: AtomicUsize::new(0),
        }
    }

    pub fn request_count(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }
}

impl CredentialProvider for StaticCredentialProvider {
    fn has_credential(&self) -> bool {
        self.credential().is_some()
    }

    fn request_credential(&self) -> Result<()> {
        self.requests.fetch_add(1, Ordering::SeqCst);
        if let Some(selected) = self.on_request.as_ref() {
            let mut guard = self
                .value
                .lock()
                .map_err(|_| anyhow::anyhow!("credential lock poisoned"))?;
            *guard = Some(selected.clone());
        }
        Ok(())
    }

    fn credential(&self) -> Option<String> {
        self.value
            .lock()
            .ok()
            .and_then(|guard| guard.clone())
            .filter(|value| !value.trim().is_empty())
    }
}

pub fn non_empty_env(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

/// Keeps the first and last two characters, enough to tell keys apart in
/// terminal output.
pub fn mask_credential(value: &str) -> String {
    let chars: Vec<char> = value.chars().collect();
    if chars.len() <= 6 {
        return "****".to_string();
    }
    let head: String = chars[..2].iter().collect();
    let tail: String = chars[chars.len() - 2..].iter().collect();
    format!("{head}****{tail}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn static_provider_selects_on_request() -> Result<()> {
        let provider = StaticCredentialProvider::selected_on_request("key-123");
        assert!(!provider.has_credential());
        provider.request_credential()?;
        assert!(provider.has_credential());
        assert_eq!(provider.credential().as_deref(), Some("key-123"));
        assert_eq!(provider.request_count(), 1);
        Ok(())
    }

    #[test]
    fn blank_static_credential_counts_as_missing() {
        let provider = StaticCredentialProvider::new(Some("   "));
        assert!(!provider.has_credential());
    }

    #[test]
    fn mask_keeps_edges_only() {
        assert_eq!(mask_credential("AIzaSyExample42"), "AI****42");
        assert_eq!(mask_credential("short"), "****");
    }
}
