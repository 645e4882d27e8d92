//! Disposable mailbox acquisition and polling.
//!
//! [`Mailbox`] wraps a [`MailApi`] with two independent bounded retry loops:
//! one for creating the mailbox, one for waiting on its first message.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{info, warn};

use crate::backoff::{BackoffPolicy, RetryState, Sleeper};
use crate::error::{MailApiError, WorkflowError};

/// An authenticated disposable mailbox
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MailboxHandle {
    pub id: String,
    pub address: String,
    pub password: String,
    /// Bearer token for listing messages
    pub token: String,
}

/// Raw content of a delivered message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfirmationMessage {
    pub id: String,
    pub from: String,
    pub subject: String,
    pub body: String,
}

/// The two endpoints of a disposable-mailbox provider
#[async_trait]
pub trait MailApi: Send + Sync {
    /// Create a new mailbox and log into it
    async fn create_account(&self) -> Result<MailboxHandle, MailApiError>;

    /// Messages in the mailbox, first-arrived first. A client may return only the first.
    async fn list_messages(&self, handle: &MailboxHandle) -> Result<Vec<ConfirmationMessage>, MailApiError>;
}

#[async_trait]
impl<T: MailApi + ?Sized> MailApi for Arc<T> {
    async fn create_account(&self) -> Result<MailboxHandle, MailApiError> {
        (**self).create_account().await
    }

    async fn list_messages(&self, handle: &MailboxHandle) -> Result<Vec<ConfirmationMessage>, MailApiError> {
        (**self).list_messages(handle).await
    }
}

pub struct Mailbox<A> {
    api: A,
    acquire_policy: BackoffPolicy,
    poll_policy: BackoffPolicy,
    sleeper: Arc<dyn Sleeper>,
}

impl<A: MailApi> Mailbox<A> {
    pub fn new(
        api: A,
        acquire_policy: BackoffPolicy,
        poll_policy: BackoffPolicy,
        sleeper: Arc<dyn Sleeper>,
    ) -> Self {
        Self {
            api,
            acquire_policy,
            poll_policy,
            sleeper,
        }
    }

    /// Obtain a fresh mailbox, backing off on every provider failure
    pub async fn acquire(&self) -> Result<MailboxHandle, WorkflowError> {
        let mut retry = RetryState::new(self.acquire_policy);
        let mut last_error = String::from("no attempt made");

        while !retry.exhausted() {
            match self.api.create_account().await {
                Ok(handle) => {
                    info!(address = %handle.address, attempts = retry.attempt() + 1, "mailbox acquired");
                    return Ok(handle);
                }
                Err(e) => {
                    last_error = e.to_string();
                    let delay = retry.record_failure();
                    if retry.exhausted() {
                        break;
                    }
                    warn!(
                        attempt = retry.attempt(),
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "mailbox creation failed, retrying"
                    );
                    self.sleeper.sleep(delay).await;
                }
            }
        }

        Err(WorkflowError::AcquisitionExhausted {
            attempts: retry.attempt(),
            last_error,
        })
    }

    /// Wait for the first message delivered to `handle`
    pub async fn poll_first_message(&self, handle: &MailboxHandle) -> Result<ConfirmationMessage, WorkflowError> {
        let mut retry = RetryState::new(self.poll_policy);

        while !retry.exhausted() {
            let outcome = self.api.list_messages(handle).await;
            let reason = match outcome {
                Ok(messages) => match messages.into_iter().next() {
                    Some(message) => {
                        info!(subject = %message.subject, from = %message.from, "found mail");
                        return Ok(message);
                    }
                    None => "inbox empty".to_string(),
                },
                Err(e) => e.to_string(),
            };

            let delay = retry.record_failure();
            if retry.exhausted() {
                break;
            }
            warn!(
                attempt = retry.attempt(),
                delay_ms = delay.as_millis() as u64,
                reason = %reason,
                "no mail yet, polling again"
            );
            self.sleeper.sleep(delay).await;
        }

        Err(WorkflowError::PollExhausted {
            attempts: retry.attempt(),
            address: handle.address.clone(),
        })
    }
}
