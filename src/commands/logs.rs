//! Follow a unit's log

use std::time::Duration;
use sysd_client::{Journal, JournalConfig, Since};

pub async fn logs(
    config: JournalConfig,
    name: &str,
    since_secs: u64,
    follow_for: Option<u64>,
) -> Result<(), Box<dyn std::error::Error>> {
    let journal = Journal::new(config);
    let since = Since::Ago(Duration::from_secs(since_secs));

    let until = async move {
        match follow_for {
            Some(secs) => {
                tokio::select! {
                    _ = tokio::time::sleep(Duration::from_secs(secs)) => {}
                    _ = tokio::signal::ctrl_c() => {}
                }
            }
            None => {
                if let Err(e) = tokio::signal::ctrl_c().await {
                    log::warn!("Failed to listen for Ctrl+C: {}", e);
                    std::future::pending::<()>().await;
                }
            }
        }
    };

    let mut stdout = tokio::io::stdout();
    let stopped = journal.write_logs_to(&mut stdout, name, since, until).await?;
    log::debug!("Stopped following {}: {:?}", name, stopped);

    Ok(())
}
