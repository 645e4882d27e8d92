//! In-memory stand-ins for the browser and mailbox provider

#![allow(dead_code)]

use async_trait::async_trait;
use megagen_core::config::{RetryConfig, WorkflowConfig};
use megagen_registration::{
    BackoffPolicy, BrowserError, BrowserLauncher, BrowserSession, ConfirmationMessage, MailApi, MailApiError,
    Mailbox, MailboxHandle, PageRole, ProvisioningRunner, RegistrationWorkflow, Sleeper, WorkflowSettings,
};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const CONFIRM_LINK: &str = "https://mega.nz/#confirmQUFBQUFBQUFB";

#[derive(Default)]
pub struct RecordingSleeper {
    pub slept: Mutex<Vec<Duration>>,
}

#[async_trait]
impl Sleeper for RecordingSleeper {
    async fn sleep(&self, duration: Duration) {
        self.slept.lock().unwrap().push(duration);
    }
}

/// Mail provider that hands out one fixed mailbox and one fixed message
pub struct StaticMailApi {
    pub fail_create: bool,
    pub body: String,
    pub empty_polls: AtomicU32,
}

impl StaticMailApi {
    pub fn with_link() -> Self {
        Self {
            fail_create: false,
            body: format!(r#"<p>Verify</p><a href="{}">Verify my email</a>"#, CONFIRM_LINK),
            empty_polls: AtomicU32::new(0),
        }
    }

    pub fn with_body(body: &str) -> Self {
        Self {
            body: body.to_string(),
            ..Self::with_link()
        }
    }

    pub fn failing() -> Self {
        Self {
            fail_create: true,
            ..Self::with_link()
        }
    }
}

#[async_trait]
impl MailApi for StaticMailApi {
    async fn create_account(&self) -> Result<MailboxHandle, MailApiError> {
        if self.fail_create {
            return Err(MailApiError::Status {
                endpoint: "/accounts".to_string(),
                status: 422,
            });
        }
        Ok(MailboxHandle {
            id: "123".to_string(),
            address: "a@b.test".to_string(),
            password: "pw".to_string(),
            token: "token".to_string(),
        })
    }

    async fn list_messages(&self, _handle: &MailboxHandle) -> Result<Vec<ConfirmationMessage>, MailApiError> {
        let remaining = self.empty_polls.load(Ordering::SeqCst);
        if remaining > 0 {
            self.empty_polls.store(remaining - 1, Ordering::SeqCst);
            return Ok(vec![]);
        }
        Ok(vec![ConfirmationMessage {
            id: "msg-1".to_string(),
            from: "welcome@mega.nz".to_string(),
            subject: "MEGA email verification required".to_string(),
            body: self.body.clone(),
        }])
    }
}

/// What the mock browser should get wrong
#[derive(Debug, Clone, Default)]
pub struct Faults {
    /// Direct clicks on this selector fail with an action error
    pub fail_click: Option<String>,
    /// Direct clicks fail but script clicks succeed
    pub obscured: Option<String>,
    /// Waiting for this selector times out
    pub timeout_on: Option<String>,
    pub fail_launch: bool,
}

#[derive(Debug, Clone, Default)]
pub struct BrowserLog {
    pub actions: Arc<Mutex<Vec<String>>>,
    pub close_all_calls: Arc<AtomicU32>,
    pub launches: Arc<AtomicU32>,
}

impl BrowserLog {
    pub fn actions(&self) -> Vec<String> {
        self.actions.lock().unwrap().clone()
    }

    pub fn close_all_calls(&self) -> u32 {
        self.close_all_calls.load(Ordering::SeqCst)
    }

    fn push(&self, entry: String) {
        self.actions.lock().unwrap().push(entry);
    }
}

pub struct MockSession {
    log: BrowserLog,
    faults: Faults,
    secondary_open: bool,
}

impl MockSession {
    fn check_page(&self, page: PageRole) -> Result<(), BrowserError> {
        if page == PageRole::Confirmation && !self.secondary_open {
            return Err(BrowserError::NoSecondaryPage);
        }
        Ok(())
    }
}

#[async_trait]
impl BrowserSession for MockSession {
    async fn navigate(&mut self, page: PageRole, url: &str) -> Result<(), BrowserError> {
        self.check_page(page)?;
        self.log.push(format!("navigate {:?} {}", page, url));
        Ok(())
    }

    async fn wait_for_element(&mut self, page: PageRole, selector: &str, timeout: Duration) -> Result<(), BrowserError> {
        self.check_page(page)?;
        self.log.push(format!("wait {}", selector));
        if self.faults.timeout_on.as_deref() == Some(selector) {
            return Err(BrowserError::Timeout {
                selector: selector.to_string(),
                waited: timeout,
            });
        }
        Ok(())
    }

    async fn type_text(&mut self, page: PageRole, selector: &str, text: &str) -> Result<(), BrowserError> {
        self.check_page(page)?;
        self.log.push(format!("type {} {}", selector, text));
        Ok(())
    }

    async fn click(&mut self, page: PageRole, selector: &str) -> Result<(), BrowserError> {
        self.check_page(page)?;
        self.log.push(format!("click {}", selector));
        let blocked = [&self.faults.fail_click, &self.faults.obscured]
            .into_iter()
            .any(|s| s.as_deref() == Some(selector));
        if blocked {
            return Err(BrowserError::Action {
                action: "click",
                selector: selector.to_string(),
                reason: "element is covered by another element".to_string(),
            });
        }
        Ok(())
    }

    async fn force_click(&mut self, page: PageRole, selector: &str) -> Result<(), BrowserError> {
        self.check_page(page)?;
        self.log.push(format!("force_click {}", selector));
        if self.faults.fail_click.as_deref() == Some(selector) {
            return Err(BrowserError::Action {
                action: "force_click",
                selector: selector.to_string(),
                reason: "element not found".to_string(),
            });
        }
        Ok(())
    }

    async fn evaluate(&mut self, page: PageRole, _script: &str) -> Result<serde_json::Value, BrowserError> {
        self.check_page(page)?;
        Ok(serde_json::Value::Null)
    }

    async fn page_content(&mut self, page: PageRole) -> Result<String, BrowserError> {
        self.check_page(page)?;
        Ok("<html><body>Something went wrong</body></html>".to_string())
    }

    async fn open_secondary_page(&mut self) -> Result<(), BrowserError> {
        self.log.push("open_secondary".to_string());
        self.secondary_open = true;
        Ok(())
    }

    async fn close_secondary_page(&mut self) -> Result<(), BrowserError> {
        if self.secondary_open {
            self.log.push("close_secondary".to_string());
        }
        self.secondary_open = false;
        Ok(())
    }

    async fn close_all(&mut self) -> Result<(), BrowserError> {
        self.log.close_all_calls.fetch_add(1, Ordering::SeqCst);
        self.secondary_open = false;
        Ok(())
    }
}

pub struct MockLauncher {
    pub log: BrowserLog,
    pub faults: Faults,
}

#[async_trait]
impl BrowserLauncher for MockLauncher {
    type Session = MockSession;

    async fn launch(&self) -> Result<MockSession, BrowserError> {
        self.log.launches.fetch_add(1, Ordering::SeqCst);
        if self.faults.fail_launch {
            return Err(BrowserError::Launch("no chrome binary".to_string()));
        }
        Ok(MockSession {
            log: self.log.clone(),
            faults: self.faults.clone(),
            secondary_open: false,
        })
    }
}

pub fn fast_policy(limit: u32) -> BackoffPolicy {
    BackoffPolicy::from(&RetryConfig {
        base_delay_ms: 10,
        max_delay_ms: 100,
        max_attempts: limit,
    })
}

pub fn runner(
    api: StaticMailApi,
    faults: Faults,
) -> (ProvisioningRunner<MockLauncher, StaticMailApi>, BrowserLog, Arc<RecordingSleeper>) {
    let sleeper = Arc::new(RecordingSleeper::default());
    let mailbox = Mailbox::new(api, fast_policy(3), fast_policy(5), sleeper.clone());
    let settings = WorkflowSettings::from_config(&WorkflowConfig::default()).unwrap();
    let workflow = RegistrationWorkflow::new(mailbox, settings, sleeper.clone());

    let log = BrowserLog::default();
    let launcher = MockLauncher {
        log: log.clone(),
        faults,
    };

    (ProvisioningRunner::new(launcher, workflow), log, sleeper)
}
