use atelier_contracts::credentials::CredentialProvider;
use atelier_contracts::errors::{AdapterError, AdapterErrorKind};
use atelier_contracts::requests::{GenerationRequest, OperationKind};
use atelier_contracts::results::GenerationResult;

use crate::adapter::RequestAdapter;

pub const GENERATION_FAILED_MESSAGE: &str =
    "Generation failed. Please ensure you have a valid API key selected.";
pub const VIDEO_FAILED_MESSAGE: &str =
    "Requested entity was not found. Please re-select your API key.";
pub const ESTIMATE_UNAVAILABLE_MESSAGE: &str =
    "Fabric estimate unavailable. The service did not return a usable answer.";
pub const NO_IMAGE_MESSAGE: &str = "The service returned no image for this prompt.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationLevel {
    Info,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub level: NotificationLevel,
    pub message: String,
    pub kind: OperationKind,
    pub error_kind: Option<AdapterErrorKind>,
}

/// User-facing surface of the host: alerts plus the key picker.
pub trait Notifier {
    fn notify(&self, notification: &Notification);

    /// Offers key re-selection after a failed video. Hosts that cannot use
    /// a newly selected key within the same run override this with a no-op.
    fn reselect_credential(&self, credentials: &dyn CredentialProvider) -> anyhow::Result<()> {
        credentials.request_credential()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    Completed,
    Empty,
    Failed(AdapterErrorKind),
    /// A generation was already in progress; nothing was submitted.
    Busy,
}

/// Per-view generation state: the in-progress guard and the last result.
pub struct StudioSession<N: Notifier> {
    notifier: N,
    is_generating: bool,
    result: Option<GenerationResult>,
}

impl<N: Notifier> StudioSession<N> {
    pub fn new(notifier: N) -> Self {
        Self {
            notifier,
            is_generating: false,
            result: None,
        }
    }

    pub fn notifier(&self) -> &N {
        &self.notifier
    }

    pub fn is_generating(&self) -> bool {
        self.is_generating
    }

    pub fn result(&self) -> Option<&GenerationResult> {
        self.result.as_ref()
    }

    pub fn take_result(&mut self) -> Option<GenerationResult> {
        self.result.take()
    }

    /// Marks the session busy and clears the previous result. Returns `false`
    /// when a generation is already running.
    pub fn begin(&mut self) -> bool {
        if self.is_generating {
            return false;
        }
        self.is_generating = true;
        self.result = None;
        true
    }

    /// Settles a generation started with [`begin`](Self::begin).
    pub fn finish(
        &mut self,
        kind: OperationKind,
        outcome: Result<Option<GenerationResult>, AdapterError>,
        credentials: &dyn CredentialProvider,
    ) -> RunOutcome {
        self.is_generating = false;
        match outcome {
            Ok(Some(result)) => {
                self.result = Some(result);
                RunOutcome::Completed
            }
            Ok(None) => {
                let message = match kind {
                    OperationKind::FabricEstimate => ESTIMATE_UNAVAILABLE_MESSAGE,
                    _ => NO_IMAGE_MESSAGE,
                };
                self.notifier.notify(&Notification {
                    level: NotificationLevel::Info,
                    message: message.to_string(),
                    kind,
                    error_kind: None,
                });
                RunOutcome::Empty
            }
            Err(err) => {
                self.result = None;
                let message = if kind == OperationKind::Video {
                    VIDEO_FAILED_MESSAGE
                } else {
                    GENERATION_FAILED_MESSAGE
                };
                self.notifier.notify(&Notification {
                    level: NotificationLevel::Error,
                    message: message.to_string(),
                    kind,
                    error_kind: Some(err.kind()),
                });
                if kind == OperationKind::Video {
                    // A failed video usually means the selected key lost access.
                    if let Err(selection) = self.notifier.reselect_credential(credentials) {
                        self.notifier.notify(&Notification {
                            level: NotificationLevel::Error,
                            message: format!("API key selection failed: {selection:#}"),
                            kind,
                            error_kind: Some(AdapterErrorKind::MissingCredential),
                        });
                    }
                }
                RunOutcome::Failed(err.kind())
            }
        }
    }

    pub fn run(&mut self, adapter: &RequestAdapter, request: &GenerationRequest) -> RunOutcome {
        if !self.begin() {
            return RunOutcome::Busy;
        }
        let outcome = adapter.execute(request);
        self.finish(request.kind(), outcome, adapter.credentials())
    }
}
