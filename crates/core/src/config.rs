use serde::Deserialize;
use std::path::Path;

use crate::error::ConfigError;
use crate::types::BrowserEngine;

const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:126.0) Gecko/20100101 Firefox/126.0";

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct AppConfig {
    pub browser: BrowserConfig,
    pub mailbox: MailboxConfig,
    pub workflow: WorkflowConfig,
    pub output: OutputConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct BrowserConfig {
    pub engine: BrowserEngine,
    pub headless: bool,
    pub launch_args: Vec<String>,
    pub user_agent: String,
    pub window_width: u32,
    pub window_height: u32,
    /// Explicit browser binary; falls back to the engine's lookup when unset
    pub executable: Option<String>,
    pub ignore_https_errors: bool,
    /// How long the browser connection may go without events. Unset means
    /// long enough for both mailbox loops and the page waits.
    pub idle_timeout_secs: Option<u64>,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct MailboxConfig {
    pub api_base: String,
    pub request_timeout_secs: u64,
    pub acquire: RetryConfig,
    pub poll: RetryConfig,
}

#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct RetryConfig {
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub max_attempts: u32,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct WorkflowConfig {
    pub signup_url: String,
    /// Regex with one capture group around the confirmation URL
    pub confirm_link_pattern: String,
    pub element_timeout_secs: u64,
    pub onboarding_timeout_secs: u64,
    pub settle_delay_ms: u64,
    pub password_length: usize,
    pub selectors: SignupSelectors,
}

/// CSS selectors of the target service's signup and confirmation pages
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct SignupSelectors {
    pub form: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub password: String,
    pub password_confirm: String,
    pub terms_checkbox: String,
    pub understand_checkbox: String,
    pub submit: String,
    pub confirm_password: String,
    pub confirm_button: String,
    pub onboarding: String,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct OutputConfig {
    pub accounts_file: String,
    pub account_format: String,
    pub diagnostics_dir: String,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            engine: BrowserEngine::Chromium,
            headless: true,
            launch_args: default_launch_args(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            window_width: 1280,
            window_height: 900,
            executable: None,
            ignore_https_errors: true,
            idle_timeout_secs: None,
        }
    }
}

impl Default for MailboxConfig {
    fn default() -> Self {
        Self {
            api_base: "https://api.mail.tm".to_string(),
            request_timeout_secs: 30,
            acquire: RetryConfig {
                base_delay_ms: 1_000,
                max_delay_ms: 30_000,
                max_attempts: 20,
            },
            poll: RetryConfig {
                base_delay_ms: 1_500,
                max_delay_ms: 30_000,
                max_attempts: 30,
            },
        }
    }
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            signup_url: "https://mega.nz/register".to_string(),
            confirm_link_pattern: r#"href="(https://mega\.nz/#confirm[^ ][^"]*)"#.to_string(),
            element_timeout_secs: 30,
            onboarding_timeout_secs: 30,
            settle_delay_ms: 1_500,
            password_length: 14,
            selectors: SignupSelectors::default(),
        }
    }
}

impl Default for SignupSelectors {
    fn default() -> Self {
        Self {
            form: "#register_form".to_string(),
            first_name: "#register-firstname-registerpage2".to_string(),
            last_name: "#register-lastname-registerpage2".to_string(),
            email: "#register-email-registerpage2".to_string(),
            password: "#register-password-registerpage2".to_string(),
            password_confirm: "#register-password-registerpage3".to_string(),
            terms_checkbox: "#register-check-registerpage2".to_string(),
            understand_checkbox: ".understand-check".to_string(),
            submit: ".register-button".to_string(),
            confirm_password: "#login-password2".to_string(),
            confirm_button: ".login-button".to_string(),
            onboarding: "#freeStart".to_string(),
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            accounts_file: "accounts.txt".to_string(),
            account_format: "{email}:{password}".to_string(),
            diagnostics_dir: "diagnostics".to_string(),
        }
    }
}

fn default_launch_args() -> Vec<String> {
    [
        "--no-sandbox",
        "--disable-setuid-sandbox",
        "--disable-infobars",
        "--window-position=0,0",
        "--ignore-certificate-errors",
        "--ignore-certificate-errors-spki-list",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

impl AppConfig {
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let config: AppConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_toml_str(&raw)
    }

    /// Apply environment overrides from an iterator of (key, value) pairs
    pub fn apply_overrides<I, K, V>(&mut self, vars: I) -> Result<(), ConfigError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        for (key, value) in vars {
            let value: String = value.into();
            match key.as_ref() {
                "MEGAGEN_ENGINE" => {
                    self.browser.engine = value.parse().map_err(|_| ConfigError::InvalidOverride {
                        key: "MEGAGEN_ENGINE",
                        value: value.clone(),
                    })?;
                }
                "MEGAGEN_HEADLESS" => {
                    self.browser.headless = value != "0" && value.to_lowercase() != "false";
                }
                "MEGAGEN_SIGNUP_URL" => {
                    self.workflow.signup_url = value;
                }
                "CHROME_PATH" => {
                    self.browser.executable = Some(value);
                }
                _ => {}
            }
        }
        self.validate()
    }

    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        self.apply_overrides(std::env::vars())
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.workflow.password_length < 14 {
            return Err(ConfigError::Invalid(format!(
                "workflow.password_length must be at least 14 (got {})",
                self.workflow.password_length
            )));
        }
        for (name, retry) in [("acquire", &self.mailbox.acquire), ("poll", &self.mailbox.poll)] {
            if retry.max_delay_ms < retry.base_delay_ms {
                return Err(ConfigError::Invalid(format!(
                    "mailbox.{}.max_delay_ms is below base_delay_ms",
                    name
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = AppConfig::from_toml_str("").unwrap();
        assert_eq!(config.browser.engine, BrowserEngine::Chromium);
        assert_eq!(config.browser.idle_timeout_secs, None);
        assert_eq!(config.mailbox.acquire.max_attempts, 20);
        assert_eq!(config.mailbox.poll.base_delay_ms, 1_500);
        assert_eq!(config.workflow.selectors.onboarding, "#freeStart");
        assert_eq!(config.output.account_format, "{email}:{password}");
    }

    #[test]
    fn test_partial_section() {
        let config = AppConfig::from_toml_str(
            r#"
            [browser]
            engine = "firefox"
            headless = false

            [mailbox.poll]
            base_delay_ms = 500
            max_delay_ms = 4000
            max_attempts = 5
            "#,
        )
        .unwrap();

        assert_eq!(config.browser.engine, BrowserEngine::Firefox);
        assert!(!config.browser.headless);
        assert_eq!(config.browser.user_agent, DEFAULT_USER_AGENT);
        assert_eq!(config.mailbox.poll.max_attempts, 5);
        assert_eq!(config.mailbox.acquire.max_attempts, 20);
    }

    #[test]
    fn test_short_password_rejected() {
        let err = AppConfig::from_toml_str("[workflow]\npassword_length = 8\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn test_overrides() {
        let mut config = AppConfig::default();
        config
            .apply_overrides([
                ("MEGAGEN_ENGINE", "webkit"),
                ("MEGAGEN_HEADLESS", "false"),
                ("CHROME_PATH", "/opt/chrome"),
                ("UNRELATED", "x"),
            ])
            .unwrap();

        assert_eq!(config.browser.engine, BrowserEngine::Webkit);
        assert!(!config.browser.headless);
        assert_eq!(config.browser.executable.as_deref(), Some("/opt/chrome"));

        let err = config.apply_overrides([("MEGAGEN_ENGINE", "lynx")]).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidOverride { .. }));
    }
}
