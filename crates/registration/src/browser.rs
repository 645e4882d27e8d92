use async_trait::async_trait;
use headless_chrome::{Browser, LaunchOptionsBuilder, Tab};
use megagen_core::config::{AppConfig, RetryConfig};
use megagen_core::BrowserEngine;
use std::ffi::OsStr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::backoff::BackoffPolicy;
use crate::error::BrowserError;

const ELEMENT_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Which of the session's two pages an action targets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PageRole {
    /// The page that fills and submits the signup form
    Signup,
    /// Opened only to visit the confirmation link
    Confirmation,
}

/// The browser primitives the registration workflow needs
#[async_trait]
pub trait BrowserSession: Send {
    async fn navigate(&mut self, page: PageRole, url: &str) -> Result<(), BrowserError>;

    /// Fails with [`BrowserError::Timeout`] if `selector` does not appear within `timeout`
    async fn wait_for_element(&mut self, page: PageRole, selector: &str, timeout: Duration) -> Result<(), BrowserError>;

    async fn type_text(&mut self, page: PageRole, selector: &str, text: &str) -> Result<(), BrowserError>;

    async fn click(&mut self, page: PageRole, selector: &str) -> Result<(), BrowserError>;

    /// Click through a script call, for elements an overlay keeps the pointer from reaching
    async fn force_click(&mut self, page: PageRole, selector: &str) -> Result<(), BrowserError>;

    async fn evaluate(&mut self, page: PageRole, script: &str) -> Result<serde_json::Value, BrowserError>;

    async fn page_content(&mut self, page: PageRole) -> Result<String, BrowserError>;

    async fn open_secondary_page(&mut self) -> Result<(), BrowserError>;

    async fn close_secondary_page(&mut self) -> Result<(), BrowserError>;

    /// Release every page and the browser process
    async fn close_all(&mut self) -> Result<(), BrowserError>;
}

/// Creates one [`BrowserSession`] per provisioning run
#[async_trait]
pub trait BrowserLauncher: Send + Sync {
    type Session: BrowserSession;

    async fn launch(&self) -> Result<Self::Session, BrowserError>;
}

/// Browser launch parameters, fixed for the life of the process
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchSettings {
    pub engine: BrowserEngine,
    pub headless: bool,
    pub args: Vec<String>,
    pub window_size: (u32, u32),
    pub executable: Option<PathBuf>,
    pub ignore_https_errors: bool,
    /// The connection to the browser is dropped after this long without events
    pub idle_timeout: Duration,
}

impl LaunchSettings {
    pub fn from_config(app: &AppConfig) -> Self {
        let config = &app.browser;
        let mut args = config.launch_args.clone();
        if !config.user_agent.is_empty() && !args.iter().any(|a| a.starts_with("--user-agent=")) {
            args.push(format!("--user-agent={}", config.user_agent));
        }

        Self {
            engine: config.engine,
            headless: config.headless,
            args,
            window_size: (config.window_width, config.window_height),
            executable: config.executable.as_ref().map(PathBuf::from),
            ignore_https_errors: config.ignore_https_errors,
            idle_timeout: config
                .idle_timeout_secs
                .map(Duration::from_secs)
                .unwrap_or_else(|| idle_budget(app)),
        }
    }
}

/// Longest stretch a run can leave its pages untouched: both mailbox loops
/// running out of attempts, plus the settle delay and the page waits.
fn idle_budget(app: &AppConfig) -> Duration {
    let request_timeout = Duration::from_secs(app.mailbox.request_timeout_secs);
    let loop_budget = |retry: &RetryConfig| {
        let policy = BackoffPolicy::from(retry);
        policy
            .total_delay()
            .saturating_add(request_timeout.saturating_mul(retry.max_attempts))
    };

    [
        loop_budget(&app.mailbox.acquire),
        loop_budget(&app.mailbox.poll),
        Duration::from_millis(app.workflow.settle_delay_ms),
        Duration::from_secs(app.workflow.element_timeout_secs),
        Duration::from_secs(app.workflow.onboarding_timeout_secs),
    ]
    .into_iter()
    .fold(Duration::ZERO, Duration::saturating_add)
}

/// How each engine is brought up
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineDriver {
    /// Driven over the Chrome DevTools protocol
    DevTools,
    /// No driver in this build
    Unavailable,
}

const ENGINE_DRIVERS: [(BrowserEngine, EngineDriver); 3] = [
    (BrowserEngine::Chromium, EngineDriver::DevTools),
    (BrowserEngine::Firefox, EngineDriver::Unavailable),
    (BrowserEngine::Webkit, EngineDriver::Unavailable),
];

pub fn driver_for(engine: BrowserEngine) -> EngineDriver {
    ENGINE_DRIVERS
        .iter()
        .find(|(e, _)| *e == engine)
        .map(|(_, driver)| *driver)
        .unwrap_or(EngineDriver::Unavailable)
}

/// Launches the configured engine
#[derive(Debug, Clone)]
pub struct EngineLauncher {
    settings: LaunchSettings,
}

impl EngineLauncher {
    pub fn new(settings: LaunchSettings) -> Self {
        Self { settings }
    }
}

#[async_trait]
impl BrowserLauncher for EngineLauncher {
    type Session = ChromeSession;

    async fn launch(&self) -> Result<ChromeSession, BrowserError> {
        match driver_for(self.settings.engine) {
            EngineDriver::DevTools => ChromeSession::launch(&self.settings),
            EngineDriver::Unavailable => Err(BrowserError::EngineUnavailable(self.settings.engine)),
        }
    }
}

/// A headless Chrome process with a signup tab and an optional confirmation tab
pub struct ChromeSession {
    browser: Option<Browser>,
    signup: Arc<Tab>,
    confirmation: Option<Arc<Tab>>,
}

impl ChromeSession {
    pub fn launch(settings: &LaunchSettings) -> Result<Self, BrowserError> {
        let args: Vec<&OsStr> = settings.args.iter().map(OsStr::new).collect();

        let mut builder = LaunchOptionsBuilder::default();
        builder
            .headless(settings.headless)
            .window_size(Some(settings.window_size))
            .ignore_certificate_errors(settings.ignore_https_errors)
            .idle_browser_timeout(settings.idle_timeout)
            .args(args);

        if let Some(path) = &settings.executable {
            builder.path(Some(path.clone()));
        }

        let launch_options = builder.build().map_err(|e| BrowserError::Launch(e.to_string()))?;
        let browser = Browser::new(launch_options).map_err(|e| BrowserError::Launch(e.to_string()))?;
        let signup = browser.new_tab().map_err(|e| BrowserError::Launch(e.to_string()))?;

        info!(
            engine = %settings.engine,
            headless = settings.headless,
            idle_timeout_secs = settings.idle_timeout.as_secs(),
            "browser launched"
        );

        Ok(Self {
            browser: Some(browser),
            signup,
            confirmation: None,
        })
    }

    fn tab(&self, page: PageRole) -> Result<&Arc<Tab>, BrowserError> {
        match page {
            PageRole::Signup => Ok(&self.signup),
            PageRole::Confirmation => self.confirmation.as_ref().ok_or(BrowserError::NoSecondaryPage),
        }
    }

    fn browser(&self) -> Result<&Browser, BrowserError> {
        self.browser
            .as_ref()
            .ok_or_else(|| BrowserError::Launch("browser already closed".to_string()))
    }
}

/// `document.querySelector(...).click()` returning whether the element existed
fn script_click(selector: &str) -> String {
    // JSON string syntax is a valid JS string literal
    let quoted = serde_json::Value::String(selector.to_string()).to_string();
    format!(
        "(() => {{ const el = document.querySelector({}); if (!el) {{ return false; }} el.click(); return true; }})()",
        quoted
    )
}

/// Whether the point a pointer click would land on belongs to the element
fn hit_test_script(selector: &str) -> String {
    let quoted = serde_json::Value::String(selector.to_string()).to_string();
    format!(
        "(() => {{ const el = document.querySelector({}); if (!el) {{ return false; }} \
         el.scrollIntoView({{ block: 'center', inline: 'center' }}); \
         const rect = el.getBoundingClientRect(); \
         const hit = document.elementFromPoint(rect.left + rect.width / 2, rect.top + rect.height / 2); \
         return hit !== null && (hit === el || el.contains(hit)); }})()",
        quoted
    )
}

#[async_trait]
impl BrowserSession for ChromeSession {
    async fn navigate(&mut self, page: PageRole, url: &str) -> Result<(), BrowserError> {
        let tab = self.tab(page)?;
        info!("navigating to {}", url);

        tab.navigate_to(url)
            .and_then(|t| t.wait_until_navigated())
            .map_err(|e| BrowserError::Navigation {
                url: url.to_string(),
                reason: e.to_string(),
            })?;

        Ok(())
    }

    async fn wait_for_element(&mut self, page: PageRole, selector: &str, timeout: Duration) -> Result<(), BrowserError> {
        let tab = self.tab(page)?.clone();
        let started = Instant::now();

        loop {
            if tab.find_element(selector).is_ok() {
                debug!(selector, elapsed_ms = started.elapsed().as_millis() as u64, "element present");
                return Ok(());
            }

            if started.elapsed() >= timeout {
                return Err(BrowserError::Timeout {
                    selector: selector.to_string(),
                    waited: timeout,
                });
            }

            tokio::time::sleep(ELEMENT_POLL_INTERVAL).await;
        }
    }

    async fn type_text(&mut self, page: PageRole, selector: &str, text: &str) -> Result<(), BrowserError> {
        let tab = self.tab(page)?;
        let action_error = |reason: String| BrowserError::Action {
            action: "type",
            selector: selector.to_string(),
            reason,
        };

        let element = tab.find_element(selector).map_err(|e| action_error(e.to_string()))?;
        element.type_into(text).map_err(|e| action_error(e.to_string()))?;
        Ok(())
    }

    async fn click(&mut self, page: PageRole, selector: &str) -> Result<(), BrowserError> {
        let tab = self.tab(page)?;
        let action_error = |reason: String| BrowserError::Action {
            action: "click",
            selector: selector.to_string(),
            reason,
        };

        let element = tab.find_element(selector).map_err(|e| action_error(e.to_string()))?;

        // Element::click dispatches at the midpoint without checking what is on top
        let reachable = tab
            .evaluate(&hit_test_script(selector), false)
            .map_err(|e| BrowserError::Script(e.to_string()))?;
        if reachable.value.as_ref().and_then(serde_json::Value::as_bool) != Some(true) {
            return Err(action_error("obscured".to_string()));
        }

        element.click().map_err(|e| action_error(e.to_string()))?;
        Ok(())
    }

    async fn force_click(&mut self, page: PageRole, selector: &str) -> Result<(), BrowserError> {
        let clicked = self.evaluate(page, &script_click(selector)).await?;
        if clicked.as_bool() == Some(true) {
            Ok(())
        } else {
            Err(BrowserError::Action {
                action: "force_click",
                selector: selector.to_string(),
                reason: "element not found".to_string(),
            })
        }
    }

    async fn evaluate(&mut self, page: PageRole, script: &str) -> Result<serde_json::Value, BrowserError> {
        let tab = self.tab(page)?;
        let result = tab
            .evaluate(script, false)
            .map_err(|e| BrowserError::Script(e.to_string()))?;
        Ok(result.value.unwrap_or(serde_json::Value::Null))
    }

    async fn page_content(&mut self, page: PageRole) -> Result<String, BrowserError> {
        self.tab(page)?
            .get_content()
            .map_err(|e| BrowserError::Script(e.to_string()))
    }

    async fn open_secondary_page(&mut self) -> Result<(), BrowserError> {
        let tab = self
            .browser()?
            .new_tab()
            .map_err(|e| BrowserError::Launch(e.to_string()))?;
        self.confirmation = Some(tab);
        Ok(())
    }

    async fn close_secondary_page(&mut self) -> Result<(), BrowserError> {
        if let Some(tab) = self.confirmation.take() {
            tab.close(false).map_err(|e| BrowserError::Script(e.to_string()))?;
        }
        Ok(())
    }

    async fn close_all(&mut self) -> Result<(), BrowserError> {
        if let Err(e) = self.close_secondary_page().await {
            warn!("failed to close confirmation page: {}", e);
        }
        if let Err(e) = self.signup.close(false) {
            debug!("signup page already gone: {}", e);
        }
        // Dropping the handle terminates the browser process
        if self.browser.take().is_some() {
            info!("browser closed");
        }
        Ok(())
    }
}
