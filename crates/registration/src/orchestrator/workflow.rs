use megagen_core::config::{SignupSelectors, WorkflowConfig};
use megagen_core::{ConfigError, Identity};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use url::Url;

use crate::backoff::Sleeper;
use crate::browser::{BrowserSession, PageRole};
use crate::state::*;
use crate::email::{generate_name, generate_password, ConfirmationLinkPattern};
use crate::error::{BrowserError, WorkflowError};
use crate::mailbox::{MailApi, Mailbox, MailboxHandle};

/// Workflow parameters resolved from configuration
#[derive(Debug, Clone)]
pub struct WorkflowSettings {
    pub signup_url: String,
    pub link_pattern: ConfirmationLinkPattern,
    pub element_timeout: Duration,
    pub onboarding_timeout: Duration,
    pub settle_delay: Duration,
    pub password_length: usize,
    pub selectors: SignupSelectors,
}

impl WorkflowSettings {
    pub fn from_config(config: &WorkflowConfig) -> Result<Self, ConfigError> {
        let link_pattern = ConfirmationLinkPattern::new(&config.confirm_link_pattern)
            .map_err(|e| ConfigError::Invalid(format!("workflow.confirm_link_pattern: {}", e)))?;

        Ok(Self {
            signup_url: config.signup_url.clone(),
            link_pattern,
            element_timeout: Duration::from_secs(config.element_timeout_secs),
            onboarding_timeout: Duration::from_secs(config.onboarding_timeout_secs),
            settle_delay: Duration::from_millis(config.settle_delay_ms),
            password_length: config.password_length.max(14),
            selectors: config.selectors.clone(),
        })
    }
}

/// Drives one signup from blank form to confirmed account
pub struct RegistrationWorkflow<A> {
    mailbox: Mailbox<A>,
    settings: WorkflowSettings,
    sleeper: Arc<dyn Sleeper>,
}

impl<A: MailApi> RegistrationWorkflow<A> {
    pub fn new(mailbox: Mailbox<A>, settings: WorkflowSettings, sleeper: Arc<dyn Sleeper>) -> Self {
        Self {
            mailbox,
            settings,
            sleeper,
        }
    }

    /// Run every step in order. Stops at the first error; the caller owns cleanup of `session`.
    pub async fn run<S>(&self, session: &mut S, context: &mut WorkflowContext) -> Result<Identity, WorkflowError>
    where
        S: BrowserSession + ?Sized,
    {
        let handle = self.mailbox.acquire().await?;
        let identity = self.create_identity(&handle);
        info!(email = %identity.email, name = %identity.display_name(), "identity created");

        self.fill_form(session, &identity).await?;
        context.transition(WorkflowState::FormFilled);

        self.enter_password(session, &identity).await?;
        context.transition(WorkflowState::PasswordEntered);
        info!("registered account successfully");

        self.sleeper.sleep(self.settings.settle_delay).await;
        let link = self.retrieve_confirmation_link(&handle).await?;
        context.transition(WorkflowState::MailRetrieved);

        self.visit_confirmation(session, &link, &identity).await?;
        context.transition(WorkflowState::ConfirmationVisited);

        self.complete_onboarding(session).await?;
        context.transition(WorkflowState::Completed);

        if let Err(e) = session.close_secondary_page().await {
            warn!("failed to close confirmation page: {}", e);
        }

        info!(email = %identity.email, "verified account");
        Ok(identity)
    }

    fn create_identity(&self, handle: &MailboxHandle) -> Identity {
        let (first_name, last_name) = generate_name();

        Identity {
            first_name,
            last_name,
            email: handle.address.clone(),
            password: generate_password(self.settings.password_length),
            mailbox_id: handle.id.clone(),
            mailbox_password: handle.password.clone(),
        }
    }

    async fn fill_form<S>(&self, session: &mut S, identity: &Identity) -> Result<(), WorkflowError>
    where
        S: BrowserSession + ?Sized,
    {
        const STEP: &str = "form_filled";
        let sel = &self.settings.selectors;
        let page = PageRole::Signup;
        let step_err = |e| WorkflowError::from_browser(STEP, e);

        session.navigate(page, &self.settings.signup_url).await.map_err(step_err)?;
        session
            .wait_for_element(page, &sel.form, self.settings.element_timeout)
            .await
            .map_err(step_err)?;
        session.type_text(page, &sel.first_name, &identity.first_name).await.map_err(step_err)?;
        session.type_text(page, &sel.last_name, &identity.last_name).await.map_err(step_err)?;
        session.type_text(page, &sel.email, &identity.email).await.map_err(step_err)?;

        Ok(())
    }

    async fn enter_password<S>(&self, session: &mut S, identity: &Identity) -> Result<(), WorkflowError>
    where
        S: BrowserSession + ?Sized,
    {
        const STEP: &str = "password_entered";
        let sel = &self.settings.selectors;
        let page = PageRole::Signup;
        let step_err = |e| WorkflowError::from_browser(STEP, e);

        for field in [&sel.password, &sel.password_confirm] {
            session.click(page, field).await.map_err(step_err)?;
            session.type_text(page, field, &identity.password).await.map_err(step_err)?;
        }

        click_with_fallback(session, page, &sel.terms_checkbox).await.map_err(step_err)?;
        session
            .wait_for_element(page, &sel.understand_checkbox, self.settings.element_timeout)
            .await
            .map_err(step_err)?;
        click_with_fallback(session, page, &sel.understand_checkbox).await.map_err(step_err)?;
        session.click(page, &sel.submit).await.map_err(step_err)?;

        Ok(())
    }

    async fn retrieve_confirmation_link(&self, handle: &MailboxHandle) -> Result<String, WorkflowError> {
        let message = self.mailbox.poll_first_message(handle).await?;

        let link = self
            .settings
            .link_pattern
            .extract(&message.body)
            .filter(|link| Url::parse(link).is_ok());

        match link {
            Some(link) => {
                info!(link = %link, "found confirmation link");
                Ok(link)
            }
            None => {
                error!(message_id = %message.id, subject = %message.subject, "message has no confirmation link");
                Err(WorkflowError::Extraction { message_id: message.id })
            }
        }
    }

    async fn visit_confirmation<S>(&self, session: &mut S, link: &str, identity: &Identity) -> Result<(), WorkflowError>
    where
        S: BrowserSession + ?Sized,
    {
        const STEP: &str = "confirmation_visited";
        let sel = &self.settings.selectors;
        let page = PageRole::Confirmation;
        let step_err = |e| WorkflowError::from_browser(STEP, e);

        session.open_secondary_page().await.map_err(step_err)?;
        session.navigate(page, link).await.map_err(step_err)?;
        session
            .wait_for_element(page, &sel.confirm_password, self.settings.element_timeout)
            .await
            .map_err(step_err)?;
        session.click(page, &sel.confirm_password).await.map_err(step_err)?;
        session
            .type_text(page, &sel.confirm_password, &identity.password)
            .await
            .map_err(step_err)?;
        session.click(page, &sel.confirm_button).await.map_err(step_err)?;

        Ok(())
    }

    /// A missing onboarding element is fatal; the page is captured before failing
    async fn complete_onboarding<S>(&self, session: &mut S) -> Result<(), WorkflowError>
    where
        S: BrowserSession + ?Sized,
    {
        const STEP: &str = "completed";
        let selector = &self.settings.selectors.onboarding;
        let page = PageRole::Confirmation;

        match session
            .wait_for_element(page, selector, self.settings.onboarding_timeout)
            .await
        {
            Ok(()) => {}
            Err(BrowserError::Timeout { selector, waited }) => {
                let snapshot = match session.page_content(page).await {
                    Ok(content) => Some(content),
                    Err(e) => {
                        warn!("could not capture page content: {}", e);
                        None
                    }
                };
                error!(
                    selector = %selector,
                    captured_bytes = snapshot.as_ref().map_or(0, String::len),
                    "onboarding element never appeared"
                );
                return Err(WorkflowError::UiTimeout {
                    step: STEP,
                    selector,
                    timeout: waited,
                    snapshot,
                });
            }
            Err(e) => return Err(WorkflowError::from_browser(STEP, e)),
        }

        session
            .click(page, selector)
            .await
            .map_err(|e| WorkflowError::from_browser(STEP, e))
    }
}

/// Click directly, falling back to a script click when the element can't be reached
async fn click_with_fallback<S>(session: &mut S, page: PageRole, selector: &str) -> Result<(), BrowserError>
where
    S: BrowserSession + ?Sized,
{
    match session.click(page, selector).await {
        Ok(()) => Ok(()),
        Err(BrowserError::Action { reason, .. }) => {
            warn!(selector, reason = %reason, "direct click failed, clicking via script");
            session.force_click(page, selector).await
        }
        Err(e) => Err(e),
    }
}
