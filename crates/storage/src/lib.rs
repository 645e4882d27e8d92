use anyhow::{Context, Result};
use megagen_core::config::OutputConfig;
use megagen_core::Identity;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tracing::info;

/// Appends provisioned accounts to a text file and keeps diagnostic page dumps
#[derive(Debug, Clone)]
pub struct CredentialStore {
    accounts_file: PathBuf,
    account_format: String,
    diagnostics_dir: PathBuf,
}

impl CredentialStore {
    pub fn new(config: &OutputConfig) -> Self {
        Self {
            accounts_file: PathBuf::from(&config.accounts_file),
            account_format: config.account_format.clone(),
            diagnostics_dir: PathBuf::from(&config.diagnostics_dir),
        }
    }

    pub fn accounts_file(&self) -> &Path {
        &self.accounts_file
    }

    /// Render one account line from the configured format
    pub fn format_account(&self, identity: &Identity) -> String {
        [
            ("{email}", identity.email.as_str()),
            ("{password}", identity.password.as_str()),
            ("{first_name}", identity.first_name.as_str()),
            ("{last_name}", identity.last_name.as_str()),
            ("{mailbox_id}", identity.mailbox_id.as_str()),
            ("{mailbox_password}", identity.mailbox_password.as_str()),
        ]
        .into_iter()
        .fold(self.account_format.clone(), |line, (placeholder, value)| {
            line.replace(placeholder, value)
        })
    }

    pub async fn save(&self, identity: &Identity) -> Result<()> {
        ensure_parent(&self.accounts_file).await?;

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.accounts_file)
            .await
            .with_context(|| format!("opening {}", self.accounts_file.display()))?;

        let mut line = self.format_account(identity);
        line.push('\n');
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;

        info!(path = %self.accounts_file.display(), email = %identity.email, "saved credentials");
        Ok(())
    }

    /// Write captured page content; returns the file it landed in
    pub async fn save_snapshot(&self, label: &str, content: &str) -> Result<PathBuf> {
        tokio::fs::create_dir_all(&self.diagnostics_dir)
            .await
            .with_context(|| format!("creating {}", self.diagnostics_dir.display()))?;

        let stamp = chrono::Utc::now().format("%Y%m%dT%H%M%S%.3fZ");
        let path = self.diagnostics_dir.join(format!("{}-{}.html", label, stamp));
        tokio::fs::write(&path, content).await?;

        info!(path = %path.display(), bytes = content.len(), "saved page snapshot");
        Ok(path)
    }
}

async fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }
    Ok(())
}
