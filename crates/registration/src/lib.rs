//! Account provisioning through a browser-driven signup form and a
//! disposable-mailbox confirmation loop.

pub mod backoff;
pub mod browser;
pub mod email;
pub mod error;
pub mod mail_tm;
pub mod mailbox;
pub mod orchestrator;
pub mod state;

pub use backoff::{BackoffPolicy, RetryState, Sleeper, TokioSleeper};
pub use browser::{BrowserLauncher, BrowserSession, ChromeSession, EngineLauncher, LaunchSettings, PageRole};
pub use error::{BrowserError, MailApiError, WorkflowError};
pub use mail_tm::MailTmClient;
pub use mailbox::{ConfirmationMessage, MailApi, Mailbox, MailboxHandle};
pub use orchestrator::*;
pub use state::*;
