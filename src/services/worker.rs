use crate::config::RelayConfig;
use crate::services::staging::StagingStore;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{Instant, MissedTickBehavior, interval, interval_at};

/// Background task that keeps the staging directory bounded: it executes due
/// deferred deletions and runs the retention sweep on a fixed period.
pub struct StagingWorker {
    staging: Arc<StagingStore>,
    retention: Duration,
    sweep_interval: Duration,
    deletion_tick: Duration,
    shutdown: watch::Receiver<bool>,
}

impl StagingWorker {
    pub fn new(
        staging: Arc<StagingStore>,
        config: &RelayConfig,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            staging,
            retention: config.staging_retention,
            sweep_interval: config.cleanup_interval,
            deletion_tick: config.deletion_tick,
            shutdown,
        }
    }

    pub async fn run(mut self) {
        tracing::info!(
            "🚀 Staging worker started (sweep every {:?}, retention {:?})",
            self.sweep_interval,
            self.retention
        );

        // The startup sweep has already run, so the first periodic one waits a full interval
        let mut sweep = interval_at(Instant::now() + self.sweep_interval, self.sweep_interval);
        sweep.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut reaper = interval(self.deletion_tick);
        reaper.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                changed = self.shutdown.changed() => {
                    if changed.is_err() || *self.shutdown.borrow() {
                        break;
                    }
                }
                _ = sweep.tick() => {
                    self.perform_sweep().await;
                }
                _ = reaper.tick() => {
                    let processed = self.staging.run_due_deletions().await;
                    if processed > 0 {
                        tracing::debug!("Deferred deletion removed {} staged files", processed);
                    }
                }
            }
        }

        let flushed = self.staging.flush_deletions().await;
        tracing::info!(
            "🛑 Staging worker shutting down ({} pending deletions flushed)",
            flushed
        );
    }

    async fn perform_sweep(&self) {
        match self.staging.sweep_expired(self.retention).await {
            Ok(report) => tracing::info!(
                "🧹 Staging sweep: scanned={} removed={} failed={}",
                report.scanned,
                report.removed,
                report.failed
            ),
            Err(e) => tracing::error!(
                "Staging sweep of {} failed: {}",
                self.staging.dir().display(),
                e
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::clock::ManualClock;
    use std::path::Path;
    use std::time::SystemTime;

    async fn wait_until_gone(path: &Path) -> bool {
        for _ in 0..200 {
            if !path.exists() {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        !path.exists()
    }

    #[tokio::test]
    async fn test_reaper_removes_due_deletions_while_running() {
        let dir = tempfile::tempdir().unwrap();
        let clock = Arc::new(ManualClock::new(SystemTime::now()));
        let staging = Arc::new(StagingStore::with_clock(dir.path(), clock.clone()));
        let staged = staging.save(&b"abc"[..], "x.pdf", 16).await.unwrap();
        staging.schedule_deletion(&staged.path, Duration::from_secs(60));

        let mut config = RelayConfig::development(dir.path());
        config.deletion_tick = Duration::from_millis(10);
        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn(StagingWorker::new(staging.clone(), &config, rx).run());

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(staged.path.exists());
        assert_eq!(staging.pending_deletions(), 1);

        clock.advance(Duration::from_secs(61));
        assert!(wait_until_gone(&staged.path).await);
        assert_eq!(staging.pending_deletions(), 0);

        tx.send(true).unwrap();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_periodic_sweep_removes_expired_files() {
        let dir = tempfile::tempdir().unwrap();
        let clock = Arc::new(ManualClock::new(SystemTime::now()));
        let staging = Arc::new(StagingStore::with_clock(dir.path(), clock.clone()));
        let staged = staging.save(&b"abc"[..], "old.docx", 16).await.unwrap();

        let mut config = RelayConfig::development(dir.path());
        config.cleanup_interval = Duration::from_millis(20);
        clock.advance(Duration::from_secs(2 * 60 * 60));

        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn(StagingWorker::new(staging.clone(), &config, rx).run());

        assert!(wait_until_gone(&staged.path).await);
        assert_eq!(staging.pending_deletions(), 0);

        tx.send(true).unwrap();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_worker_flushes_pending_deletions_on_shutdown() {
        let dir = tempfile::tempdir().unwrap();
        let staging = Arc::new(StagingStore::new(dir.path()));
        let staged = staging.save(&b"abc"[..], "x.pdf", 16).await.unwrap();
        staging.schedule_deletion(&staged.path, Duration::from_secs(3600));

        let (tx, rx) = watch::channel(false);
        let config = RelayConfig::development(dir.path());
        let handle = tokio::spawn(StagingWorker::new(staging.clone(), &config, rx).run());

        tx.send(true).unwrap();
        handle.await.unwrap();

        assert!(!staged.path.exists());
        assert_eq!(staging.pending_deletions(), 0);
    }
}
