mod cli;
mod commands;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::warn;

use megagen_core::config::AppConfig;

use crate::cli::Cli;

const DEFAULT_CONFIG: &str = include_str!("../config/default.toml");

fn main() -> Result<()> {
    // One workflow at a time; waits are the only suspension points
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    runtime.block_on(async_main())
}

async fn async_main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = load_config(&cli)?;

    commands::register::run(config, cli.loops).await
}

fn load_config(cli: &Cli) -> Result<AppConfig> {
    let config_str = match std::fs::read_to_string(&cli.config) {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            warn!(path = %cli.config, "config file not found, using defaults");
            DEFAULT_CONFIG.to_string()
        }
        Err(e) => return Err(e).with_context(|| format!("failed to read config file {}", cli.config)),
    };
    let mut config = AppConfig::from_toml_str(&config_str)?;

    config.apply_env_overrides()?;

    // Command-line flags win over file and environment
    if let Some(engine) = cli.engine {
        config.browser.engine = engine;
    }
    if cli.headful {
        config.browser.headless = false;
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_embedded_default_config_parses() {
        let config = AppConfig::from_toml_str(DEFAULT_CONFIG).unwrap();
        let defaults = AppConfig::default();

        assert_eq!(config.workflow.confirm_link_pattern, defaults.workflow.confirm_link_pattern);
        assert_eq!(config.browser.launch_args, defaults.browser.launch_args);
        assert_eq!(config.mailbox.poll, defaults.mailbox.poll);
        assert_eq!(config.workflow.selectors.submit, defaults.workflow.selectors.submit);
    }

    #[test]
    fn test_cli_flags_override_config() {
        let cli = Cli::parse_from(["megagen", "--config", "/nonexistent.toml", "--engine", "firefox", "--headful", "-l", "3"]);
        let config = load_config(&cli).unwrap();

        assert_eq!(config.browser.engine, megagen_core::BrowserEngine::Firefox);
        assert!(!config.browser.headless);
        assert_eq!(cli.loops, 3);
    }

    #[test]
    fn test_unreadable_config_is_an_error() {
        let dir = std::env::temp_dir().to_string_lossy().into_owned();
        let cli = Cli::parse_from(["megagen", "--config", dir.as_str()]);

        let err = load_config(&cli).unwrap_err();
        assert!(err.to_string().contains("failed to read config file"));
    }
}
