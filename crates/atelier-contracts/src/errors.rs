use std::fmt;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum AdapterErrorKind {
    Remote,
    MalformedResponse,
    NotFound,
    MissingCredential,
}

impl AdapterErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            AdapterErrorKind::Remote => "remote_error",
            AdapterErrorKind::MalformedResponse => "malformed_response",
            AdapterErrorKind::NotFound => "not_found",
            AdapterErrorKind::MissingCredential => "missing_credential",
        }
    }
}

/// HTTP-level failure reported by the generative service.
#[derive(Debug, Clone)]
pub struct RemoteStatus {
    pub code: u16,
    pub body: String,
}

impl fmt::Display for RemoteStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "remote service returned {}: {}", self.code, self.body)
    }
}

impl std::error::Error for RemoteStatus {}

#[derive(Debug)]
pub struct AdapterError {
    kind: AdapterErrorKind,
    message: String,
}

impl AdapterError {
    pub fn new(kind: AdapterErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn remote(message: impl Into<String>) -> Self {
        Self::new(AdapterErrorKind::Remote, message)
    }

    pub fn malformed(message: impl Into<String>) -> Self {
        Self::new(AdapterErrorKind::MalformedResponse, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(AdapterErrorKind::NotFound, message)
    }

    pub fn missing_credential() -> Self {
        Self::new(
            AdapterErrorKind::MissingCredential,
            "no credential selected for the generative service",
        )
    }

    pub fn kind(&self) -> AdapterErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// Maps a transport failure onto the adapter taxonomy by walking its
    /// cause chain.
    pub fn classify(err: &anyhow::Error) -> Self {
        let message = format!("{err:#}");
        for cause in err.chain() {
            if let Some(status) = cause.downcast_ref::<RemoteStatus>() {
                if status.code == 404 {
                    return Self::not_found(message);
                }
            }
            if cause.downcast_ref::<serde_json::Error>().is_some()
                || cause.downcast_ref::<base64::DecodeError>().is_some()
            {
                return Self::malformed(message);
            }
        }
        if message.contains("Requested entity was not found") {
            return Self::not_found(message);
        }
        Self::remote(message)
    }
}

impl fmt::Display for AdapterError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind.as_str(), self.message)
    }
}

impl std::error::Error for AdapterError {}
