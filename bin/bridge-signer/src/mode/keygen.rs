//! Generates the group key together with the other parties.

use anyhow::{bail, Context};
use tokio::time::sleep;
use tracing::info;
use tss_bridge_signer::keygen::KeygenSession;

use super::init_network;
use crate::{config::Config, constants::KEYGEN_LINGER};

/// Runs key generation at the configured time and writes the share.
pub(crate) async fn bootstrap(config: Config) -> anyhow::Result<()> {
    let tss = &config.tss;
    tss.check_backend()?;
    let start_time = tss
        .keygen_start_time
        .context("key generation needs tss.keygen_start_time")?;
    if tss.share_path.exists() {
        bail!(
            "refusing to overwrite the key share at {}",
            tss.share_path.display()
        );
    }

    let network = init_network(&config).await?;
    // a round needs the leader plus `threshold` acceptors
    if tss.threshold == 0 || tss.threshold >= network.parties.len() {
        bail!(
            "threshold {} out of range for {} parties",
            tss.threshold,
            network.parties.len()
        );
    }
    network.manager.set_ready(true);

    let start_ms = u64::try_from(start_time.timestamp_millis())
        .context("tss.keygen_start_time is before the unix epoch")?;
    info!(
        %start_time,
        parties = network.parties.len(),
        threshold = tss.threshold,
        "key generation scheduled"
    );

    let share = KeygenSession::new(
        network.manager.clone(),
        network.transport.clone(),
        tss.backend.build(),
        network.parties.clone(),
        tss.threshold,
        start_ms,
        tss.keygen_timeout,
    )
    .run()
    .await?;
    share.save(&tss.share_path).await?;
    info!(public_key = %share.public_key, "key generation complete");

    // slower parties may still need our messages
    sleep(KEYGEN_LINGER).await;
    for task in network.tasks {
        task.abort();
    }

    Ok(())
}
