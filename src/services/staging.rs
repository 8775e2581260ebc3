use crate::models::StagedFile;
use crate::services::clock::{Clock, SystemClock, epoch_millis};
use crate::services::error::{RelayError, RelayResult};
use crate::utils::validation::sanitize_filename;
use chrono::{DateTime, Utc};
use std::io::ErrorKind;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime};
use tokio::fs;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};

const COPY_BUFFER_BYTES: usize = 64 * 1024;

struct PendingDeletion {
    path: PathBuf,
    due: SystemTime,
}

/// Queues its paths for deferred deletion when dropped, however the owner
/// goes away (completion, error or a cancelled request future).
pub struct DeferredDeletion {
    staging: Arc<StagingStore>,
    paths: Vec<PathBuf>,
    delay: Duration,
}

impl fmt::Debug for DeferredDeletion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeferredDeletion")
            .field("paths", &self.paths)
            .field("delay", &self.delay)
            .finish()
    }
}

impl Drop for DeferredDeletion {
    fn drop(&mut self) {
        for path in &self.paths {
            self.staging.schedule_deletion(path, self.delay);
        }
    }
}

/// Outcome of one pass over the staging directory.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SweepReport {
    pub scanned: usize,
    pub removed: usize,
    pub failed: usize,
}

/// Disk-backed staging area for uploads and conversion results.
///
/// Names carry a strictly increasing millisecond stamp, so concurrent
/// requests never collide without any locking on the directory. Files leave
/// the store through the deferred-deletion queue or the retention sweep.
pub struct StagingStore {
    dir: PathBuf,
    clock: Arc<dyn Clock>,
    last_stamp: AtomicU64,
    pending: Mutex<Vec<PendingDeletion>>,
}

impl StagingStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self::with_clock(dir, Arc::new(SystemClock))
    }

    pub fn with_clock(dir: impl Into<PathBuf>, clock: Arc<dyn Clock>) -> Self {
        Self {
            dir: dir.into(),
            clock,
            last_stamp: AtomicU64::new(0),
            pending: Mutex::new(Vec::new()),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub async fn ensure_dir(&self) -> RelayResult<()> {
        fs::create_dir_all(&self.dir).await?;
        Ok(())
    }

    /// Next staging stamp: wall-clock milliseconds, bumped past the previous
    /// stamp when two callers land in the same millisecond.
    fn next_stamp(&self) -> u64 {
        let now = epoch_millis(self.clock.now());
        let mut current = self.last_stamp.load(Ordering::Relaxed);
        loop {
            let candidate = now.max(current + 1);
            match self.last_stamp.compare_exchange_weak(
                current,
                candidate,
                Ordering::AcqRel,
                Ordering::Relaxed,
            ) {
                Ok(_) => return candidate,
                Err(actual) => current = actual,
            }
        }
    }

    /// Fresh path for an inbound upload.
    pub fn upload_path(&self, suggested_name: &str) -> PathBuf {
        let name = sanitize_filename(suggested_name);
        self.dir.join(format!("{}-{}", self.next_stamp(), name))
    }

    /// Fresh path for a downloaded conversion result.
    pub fn result_path(&self, extension: &str) -> PathBuf {
        self.dir.join(format!("converted-{}.{}", self.next_stamp(), extension))
    }

    /// Persist an inbound stream under a fresh unique name.
    ///
    /// The stream is cut off once it passes `limit` bytes; the partial file
    /// is removed on that and on any other failure.
    pub async fn save<R>(
        &self,
        reader: R,
        suggested_name: &str,
        limit: usize,
    ) -> RelayResult<StagedFile>
    where
        R: AsyncRead + Unpin + Send,
    {
        let path = self.upload_path(suggested_name);
        match self.write_limited(&path, reader, limit).await {
            Ok(size) => {
                tracing::debug!("Staged {} ({} bytes)", path.display(), size);
                Ok(StagedFile {
                    path,
                    created_at: DateTime::<Utc>::from(self.clock.now()),
                    size,
                })
            }
            Err(e) => {
                if let Err(cleanup) = remove_if_present(&path).await {
                    tracing::warn!(
                        "Failed to remove partial upload {}: {}",
                        path.display(),
                        cleanup
                    );
                }
                Err(e)
            }
        }
    }

    async fn write_limited<R>(&self, path: &Path, mut reader: R, limit: usize) -> RelayResult<u64>
    where
        R: AsyncRead + Unpin + Send,
    {
        let mut file = fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(path)
            .await?;

        let mut buffer = vec![0u8; COPY_BUFFER_BYTES];
        let mut total: u64 = 0;
        loop {
            let n = reader.read(&mut buffer).await?;
            if n == 0 {
                break;
            }
            total += n as u64;
            if total > limit as u64 {
                return Err(RelayError::PayloadTooLarge { limit });
            }
            file.write_all(&buffer[..n]).await?;
        }
        file.flush().await?;
        file.sync_all().await?;
        Ok(total)
    }

    /// Record a file produced outside `save` (a downloaded result).
    pub async fn adopt(&self, path: PathBuf) -> RelayResult<StagedFile> {
        let size = fs::metadata(&path).await?.len();
        Ok(StagedFile {
            path,
            created_at: DateTime::<Utc>::from(self.clock.now()),
            size,
        })
    }

    /// Queue `path` for removal once `delay` has elapsed on the store's clock.
    pub fn schedule_deletion(&self, path: &Path, delay: Duration) {
        let due = self.clock.now() + delay;
        let mut pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
        pending.push(PendingDeletion {
            path: path.to_path_buf(),
            due,
        });
        tracing::debug!("Deletion of {} scheduled in {:?}", path.display(), delay);
    }

    /// Guard that schedules deletion of `paths` once it is dropped.
    pub fn defer_deletion(
        self: &Arc<Self>,
        paths: Vec<PathBuf>,
        delay: Duration,
    ) -> DeferredDeletion {
        DeferredDeletion {
            staging: Arc::clone(self),
            paths,
            delay,
        }
    }

    pub fn pending_deletions(&self) -> usize {
        self.pending.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Delete every queued file whose delay has run out. Returns how many
    /// entries were processed.
    pub async fn run_due_deletions(&self) -> usize {
        let now = self.clock.now();
        let due: Vec<PathBuf> = {
            let mut pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
            let (due, keep): (Vec<_>, Vec<_>) = pending.drain(..).partition(|p| p.due <= now);
            *pending = keep;
            due.into_iter().map(|p| p.path).collect()
        };
        self.delete_all(due).await
    }

    /// Delete every queued file regardless of its due time.
    pub async fn flush_deletions(&self) -> usize {
        let all: Vec<PathBuf> = {
            let mut pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
            pending.drain(..).map(|p| p.path).collect()
        };
        self.delete_all(all).await
    }

    async fn delete_all(&self, paths: Vec<PathBuf>) -> usize {
        let count = paths.len();
        for path in paths {
            if let Err(e) = self.delete(&path).await {
                tracing::warn!("Deferred deletion of {} failed: {}", path.display(), e);
            }
        }
        count
    }

    /// Remove a staged file. A file that is already gone is not an error.
    pub async fn delete(&self, path: &Path) -> RelayResult<()> {
        remove_if_present(path).await?;
        Ok(())
    }

    /// Remove every entry whose modification time is older than `max_age`.
    /// Failures on single entries are logged and skipped.
    pub async fn sweep_expired(&self, max_age: Duration) -> RelayResult<SweepReport> {
        let now = self.clock.now();
        let mut report = SweepReport::default();
        let mut entries = match fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(report),
            Err(e) => return Err(e.into()),
        };

        loop {
            let entry = match entries.next_entry().await {
                Ok(Some(entry)) => entry,
                Ok(None) => break,
                Err(e) => {
                    tracing::warn!("Sweep stopped reading {}: {}", self.dir.display(), e);
                    report.failed += 1;
                    break;
                }
            };
            report.scanned += 1;
            let path = entry.path();

            let modified = match entry.metadata().await.and_then(|m| {
                if m.is_file() {
                    m.modified().map(Some)
                } else {
                    Ok(None)
                }
            }) {
                Ok(Some(modified)) => modified,
                Ok(None) => continue,
                Err(e) => {
                    tracing::warn!("Sweep could not stat {}: {}", path.display(), e);
                    report.failed += 1;
                    continue;
                }
            };

            let age = now.duration_since(modified).unwrap_or(Duration::ZERO);
            if age <= max_age {
                continue;
            }

            match remove_if_present(&path).await {
                Ok(()) => report.removed += 1,
                Err(e) => {
                    tracing::warn!("Sweep could not remove {}: {}", path.display(), e);
                    report.failed += 1;
                }
            }
        }

        Ok(report)
    }
}

async fn remove_if_present(path: &Path) -> std::io::Result<()> {
    match fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}
