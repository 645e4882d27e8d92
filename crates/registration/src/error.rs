use std::time::Duration;
use thiserror::Error;

/// Failures talking to the disposable-mailbox API
#[derive(Debug, Clone, Error)]
pub enum MailApiError {
    #[error("mail api request failed: {0}")]
    Transport(String),

    #[error("mail api returned HTTP {status} for {endpoint}")]
    Status { endpoint: String, status: u16 },

    #[error("could not decode mail api response from {endpoint}: {reason}")]
    Decode { endpoint: String, reason: String },

    #[error("mail api offers no active domain")]
    NoDomain,
}

impl From<reqwest::Error> for MailApiError {
    fn from(e: reqwest::Error) -> Self {
        MailApiError::Transport(e.to_string())
    }
}

/// Failures of a single browser primitive
#[derive(Debug, Clone, Error)]
pub enum BrowserError {
    #[error("failed to launch browser: {0}")]
    Launch(String),

    #[error("browser engine {0} has no driver available")]
    EngineUnavailable(megagen_core::BrowserEngine),

    #[error("navigation to {url} failed: {reason}")]
    Navigation { url: String, reason: String },

    #[error("timed out after {waited:?} waiting for {selector}")]
    Timeout { selector: String, waited: Duration },

    #[error("{action} on {selector} failed: {reason}")]
    Action {
        action: &'static str,
        selector: String,
        reason: String,
    },

    #[error("script evaluation failed: {0}")]
    Script(String),

    #[error("no secondary page is open")]
    NoSecondaryPage,
}

/// Terminal failure of a provisioning run
#[derive(Debug, Clone, Error)]
pub enum WorkflowError {
    #[error("mailbox acquisition exhausted after {attempts} attempts (last error: {last_error})")]
    AcquisitionExhausted { attempts: u32, last_error: String },

    #[error("no message arrived after {attempts} polls of {address}")]
    PollExhausted { attempts: u32, address: String },

    #[error("no confirmation link in message {message_id}")]
    Extraction { message_id: String },

    #[error("[{step}] timed out after {timeout:?} waiting for {selector}")]
    UiTimeout {
        step: &'static str,
        selector: String,
        timeout: Duration,
        /// Page content captured when the timeout was hit, if any
        snapshot: Option<String>,
    },

    #[error("[{step}] navigation to {url} failed: {reason}")]
    Navigation {
        step: &'static str,
        url: String,
        reason: String,
    },

    #[error("[{step}] browser error: {source}")]
    Browser {
        step: &'static str,
        #[source]
        source: BrowserError,
    },
}

impl WorkflowError {
    /// Attach the workflow step to a browser failure
    pub fn from_browser(step: &'static str, error: BrowserError) -> Self {
        match error {
            BrowserError::Timeout { selector, waited } => WorkflowError::UiTimeout {
                step,
                selector,
                timeout: waited,
                snapshot: None,
            },
            BrowserError::Navigation { url, reason } => WorkflowError::Navigation { step, url, reason },
            other => WorkflowError::Browser { step, source: other },
        }
    }

    /// The workflow step that failed
    pub fn step(&self) -> &'static str {
        match self {
            WorkflowError::AcquisitionExhausted { .. } => "acquire",
            WorkflowError::PollExhausted { .. } | WorkflowError::Extraction { .. } => "mail_retrieved",
            WorkflowError::UiTimeout { step, .. }
            | WorkflowError::Navigation { step, .. }
            | WorkflowError::Browser { step, .. } => *step,
        }
    }

    pub fn snapshot(&self) -> Option<&str> {
        match self {
            WorkflowError::UiTimeout { snapshot, .. } => snapshot.as_deref(),
            _ => None,
        }
    }
}
