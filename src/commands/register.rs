use anyhow::Result;
use megagen_core::AppConfig;
use megagen_registration::ProvisioningRunner;
use megagen_storage::CredentialStore;
use tracing::{error, info, warn};

/// Provision `loops` accounts sequentially, each with its own browser and mailbox
pub async fn run(config: AppConfig, loops: u32) -> Result<()> {
    let runner = ProvisioningRunner::from_config(&config)?;
    let store = CredentialStore::new(&config.output);
    let mut failed = 0u32;

    for i in 0..loops {
        if loops > 1 {
            info!("loop {}/{}", i + 1, loops);
        }

        let report = runner.run_detailed().await;
        match report.result {
            Ok(identity) => {
                println!("Email: {}\nPassword: {}", identity.email, identity.password);
                if let Err(e) = store.save(&identity).await {
                    error!("failed to save credentials for {}: {:#}", identity.email, e);
                    failed += 1;
                }
            }
            Err(e) => {
                failed += 1;
                if let Some(snapshot) = e.snapshot() {
                    if let Err(save_err) = store.save_snapshot(e.step(), snapshot).await {
                        warn!("failed to save page snapshot: {:#}", save_err);
                    }
                }
            }
        }
    }

    if failed > 0 {
        anyhow::bail!("{} of {} provisioning runs failed", failed, loops);
    }

    info!(accounts_file = %store.accounts_file().display(), "all runs succeeded");
    Ok(())
}
