use megagen_core::{AppConfig, ConfigError, Identity};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use crate::backoff::{BackoffPolicy, Sleeper, TokioSleeper};
use crate::browser::{BrowserLauncher, BrowserSession, EngineLauncher, LaunchSettings};
use crate::error::WorkflowError;
use crate::mail_tm::MailTmClient;
use crate::mailbox::{MailApi, Mailbox};
use crate::orchestrator::workflow::{RegistrationWorkflow, WorkflowSettings};
use crate::state::*;

/// Top-level driver: one browser session, one workflow, guaranteed cleanup
pub struct ProvisioningRunner<L, A> {
    launcher: L,
    workflow: RegistrationWorkflow<A>,
}

impl ProvisioningRunner<EngineLauncher, MailTmClient> {
    /// Runner wired to the real browser and mail.tm
    pub fn from_config(config: &AppConfig) -> Result<Self, ConfigError> {
        let api = MailTmClient::new(
            &config.mailbox.api_base,
            Duration::from_secs(config.mailbox.request_timeout_secs),
        )
        .map_err(|e| ConfigError::Invalid(format!("mail api client: {}", e)))?;

        let sleeper: Arc<dyn Sleeper> = Arc::new(TokioSleeper);
        let mailbox = Mailbox::new(
            api,
            BackoffPolicy::from(&config.mailbox.acquire),
            BackoffPolicy::from(&config.mailbox.poll),
            sleeper.clone(),
        );
        let settings = WorkflowSettings::from_config(&config.workflow)?;
        let launcher = EngineLauncher::new(LaunchSettings::from_config(config));

        Ok(Self::new(launcher, RegistrationWorkflow::new(mailbox, settings, sleeper)))
    }
}

impl<L, A> ProvisioningRunner<L, A>
where
    L: BrowserLauncher,
    A: MailApi,
{
    pub fn new(launcher: L, workflow: RegistrationWorkflow<A>) -> Self {
        Self { launcher, workflow }
    }

    pub async fn run(&self) -> Result<Identity, WorkflowError> {
        self.run_detailed().await.result
    }

    /// Run the workflow once and report how far it got
    pub async fn run_detailed(&self) -> ProvisioningReport {
        let mut context = WorkflowContext::new();

        let mut session = match self.launcher.launch().await {
            Ok(session) => session,
            Err(e) => {
                let error = WorkflowError::from_browser("launch", e);
                error!("{}", error);
                context.fail(error.clone());
                return ProvisioningReport::new(Err(error), context);
            }
        };

        let result = self.workflow.run(&mut session, &mut context).await;

        // Runs on every exit path of the workflow
        if let Err(e) = session.close_all().await {
            warn!("failed to close browser session: {}", e);
        }

        if let Err(e) = &result {
            error!("{}", e);
            context.fail(e.clone());
        }

        let report = ProvisioningReport::new(result, context);
        info!("{}", report.summary());
        report
    }
}
