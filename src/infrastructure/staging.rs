use crate::config::RelayConfig;
use crate::services::staging::StagingStore;
use std::sync::Arc;
use tracing::info;

/// Create the staging directory and clear out anything a previous run left
/// past the retention window.
pub async fn setup_staging(config: &RelayConfig) -> anyhow::Result<Arc<StagingStore>> {
    let staging = StagingStore::new(&config.staging_dir);
    staging.ensure_dir().await?;
    info!("📂 Staging directory: {}", config.staging_dir.display());

    let report = staging.sweep_expired(config.staging_retention).await?;
    info!(
        "🧹 Startup sweep: scanned={} removed={} failed={}",
        report.scanned, report.removed, report.failed
    );

    Ok(Arc::new(staging))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, SystemTime};

    #[tokio::test]
    async fn test_setup_creates_missing_directory() {
        let root = tempfile::tempdir().unwrap();
        let staging_dir = root.path().join("uploads");
        let config = RelayConfig::development(&staging_dir);

        let staging = setup_staging(&config).await.unwrap();

        assert!(staging_dir.is_dir());
        assert_eq!(staging.dir(), staging_dir.as_path());
    }

    #[tokio::test]
    async fn test_setup_sweeps_leftovers_from_previous_run() {
        let root = tempfile::tempdir().unwrap();
        let stale = root.path().join("1000-left-behind.pdf");
        let fresh = root.path().join("2000-in-flight.pdf");
        std::fs::write(&stale, b"stale").unwrap();
        std::fs::write(&fresh, b"fresh").unwrap();
        std::fs::File::options()
            .write(true)
            .open(&stale)
            .unwrap()
            .set_modified(SystemTime::now() - Duration::from_secs(2 * 60 * 60))
            .unwrap();

        let config = RelayConfig::development(root.path());
        setup_staging(&config).await.unwrap();

        assert!(!stale.exists());
        assert!(fresh.exists());
    }
}
