//! Instance Lock
//!
//! Cross-process mutual exclusion over the physical device. The record is a
//! single line `"<pid> <unix-seconds>"` at a well-known path. A starting
//! instance that finds a live holder waits a bounded window for it to go
//! away (an old process still tearing down after a quick restart) and
//! concedes if it does not. Records left by dead processes are overwritten.
//!
//! The record is written to a private file and hard-linked into place, so it
//! appears complete or not at all and two instances racing past a stale
//! record cannot both win.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use nix::errno::Errno;
use nix::sys::signal::kill;
use nix::unistd::Pid;
use tokio::io::AsyncWriteExt;
use tokio::time::{sleep, Instant};

use crate::error::{DeckError, Result};

// ============================================================================
// Configuration
// ============================================================================

/// Where the lock lives and how long to wait for a live holder
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LockConfig {
    /// Lock record path
    pub path: PathBuf,
    /// How long to wait for a live holder to exit (default: 5 seconds)
    pub wait: Duration,
    /// Holder poll interval while waiting (default: 250ms)
    pub poll: Duration,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            path: default_lock_path(),
            wait: Duration::from_secs(5),
            poll: Duration::from_millis(250),
        }
    }
}

impl LockConfig {
    /// Lock config at a specific path with default timing
    #[must_use]
    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            ..Self::default()
        }
    }

    /// Set the wait window
    #[must_use]
    pub fn with_wait(mut self, wait: Duration) -> Self {
        self.wait = wait;
        self
    }

    /// Set the poll interval
    #[must_use]
    pub fn with_poll(mut self, poll: Duration) -> Self {
        self.poll = poll;
        self
    }
}

/// Default lock path
///
/// Uses `$XDG_RUNTIME_DIR/deck/deck.lock`, otherwise `/tmp/deck-$UID/deck.lock`
#[must_use]
pub fn default_lock_path() -> PathBuf {
    if let Some(runtime_dir) = dirs::runtime_dir() {
        runtime_dir.join("deck").join("deck.lock")
    } else {
        let uid = unsafe { libc::getuid() };
        PathBuf::from(format!("/tmp/deck-{uid}/deck.lock"))
    }
}

// ============================================================================
// Lock record
// ============================================================================

/// Contents of a lock record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockRecord {
    /// Holder process id
    pub pid: i32,
    /// When the holder took the lock
    pub acquired_at: DateTime<Utc>,
}

impl LockRecord {
    fn current() -> Self {
        Self {
            pid: std::process::id() as i32,
            acquired_at: Utc::now(),
        }
    }

    fn parse(line: &str) -> Option<Self> {
        let mut fields = line.split_whitespace();
        let pid = fields.next()?.parse().ok()?;
        // Bare-pid records from older writers carry no timestamp
        let acquired_at = fields
            .next()
            .and_then(|ts| ts.parse().ok())
            .and_then(|ts| DateTime::from_timestamp(ts, 0))
            .unwrap_or_default();
        Some(Self { pid, acquired_at })
    }

    fn encode(&self) -> String {
        format!("{} {}\n", self.pid, self.acquired_at.timestamp())
    }

    /// Whether the holder process still exists
    ///
    /// Signal 0 only probes; EPERM means the process exists under another user.
    #[must_use]
    pub fn is_alive(&self) -> bool {
        if self.pid <= 0 {
            return false;
        }
        matches!(kill(Pid::from_raw(self.pid), None), Ok(()) | Err(Errno::EPERM))
    }

    fn is_ours(&self) -> bool {
        self.pid == std::process::id() as i32
    }
}

/// Result of trying to take the lock
#[derive(Debug)]
pub enum LockOutcome {
    /// This process now holds the lock
    Acquired(InstanceLock),
    /// A live process kept the lock for the whole wait window
    Contended {
        /// The holder's process id
        pid: i32,
    },
}

// ============================================================================
// Lock guard
// ============================================================================

/// A held instance lock
///
/// Dropping the guard removes the record if it still belongs to this process.
#[derive(Debug)]
pub struct InstanceLock {
    path: PathBuf,
    record: LockRecord,
    released: bool,
}

impl InstanceLock {
    /// Take the lock, waiting up to `config.wait` for a live holder.
    ///
    /// # Errors
    ///
    /// Returns [`DeckError::Lock`] if the record cannot be read or written.
    pub async fn acquire(config: &LockConfig) -> Result<LockOutcome> {
        let path = config.path.as_path();
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|source| lock_error(path, source))?;
        }

        let deadline = Instant::now() + config.wait;
        loop {
            match Self::holder(path).await? {
                Some(record) if record.is_ours() => {
                    tracing::debug!(path = ?path, "Lock record already names this process");
                    remove_record(path).await?;
                }
                Some(record) if record.is_alive() => {
                    if Instant::now() >= deadline {
                        tracing::info!(
                            pid = record.pid,
                            since = %record.acquired_at,
                            "Another instance still holds the device, conceding"
                        );
                        return Ok(LockOutcome::Contended { pid: record.pid });
                    }
                    tracing::debug!(pid = record.pid, "Waiting for lock holder to exit");
                    sleep(config.poll).await;
                    continue;
                }
                Some(record) => {
                    tracing::warn!(pid = record.pid, path = ?path, "Removing stale lock record");
                    remove_record(path).await?;
                }
                // Missing, or malformed and unable to name a holder
                None => remove_record(path).await?,
            }

            match Self::write_new(path).await {
                Ok(lock) => return Ok(LockOutcome::Acquired(lock)),
                // Lost a race with another starter; re-check who holds it
                Err(e) if e.kind() == ErrorKind::AlreadyExists => continue,
                Err(source) => return Err(lock_error(path, source)),
            }
        }
    }

    async fn write_new(path: &Path) -> std::io::Result<Self> {
        let record = LockRecord::current();
        let staging = path.with_extension(format!("lock.{}", record.pid));

        let mut file = tokio::fs::File::create(&staging).await?;
        file.write_all(record.encode().as_bytes()).await?;
        file.sync_all().await?;
        drop(file);

        let linked = tokio::fs::hard_link(&staging, path).await;
        if let Err(e) = tokio::fs::remove_file(&staging).await {
            tracing::debug!(error = %e, path = ?staging, "Failed to remove staging record");
        }
        linked?;

        tracing::info!(pid = record.pid, path = ?path, "Instance lock acquired");
        Ok(Self {
            path: path.to_path_buf(),
            record,
            released: false,
        })
    }

    /// Read the current lock record.
    ///
    /// A missing file is `None`. So is an unparseable one: it cannot name a
    /// live holder and is overwritten like a stale record.
    ///
    /// # Errors
    ///
    /// Returns [`DeckError::Lock`] on read errors other than not-found.
    pub async fn holder(path: &Path) -> Result<Option<LockRecord>> {
        match tokio::fs::read_to_string(path).await {
            Ok(contents) => {
                let record = LockRecord::parse(contents.lines().next().unwrap_or(""));
                if record.is_none() {
                    tracing::warn!(path = ?path, "Ignoring malformed lock record");
                }
                Ok(record)
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(source) => Err(lock_error(path, source)),
        }
    }

    /// Record path
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The record this process wrote
    #[must_use]
    pub fn record(&self) -> LockRecord {
        self.record
    }

    /// Remove the record if it still names this process.
    ///
    /// Failures are logged; release runs on the shutdown path.
    pub async fn release(mut self) {
        self.released = true;
        match Self::holder(&self.path).await {
            Ok(Some(record)) if record.pid == self.record.pid => {
                match tokio::fs::remove_file(&self.path).await {
                    Ok(()) => tracing::info!(path = ?self.path, "Instance lock released"),
                    Err(e) => tracing::warn!(error = %e, path = ?self.path, "Failed to remove lock record"),
                }
            }
            Ok(_) => tracing::warn!(path = ?self.path, "Lock record no longer ours, leaving it"),
            Err(e) => tracing::warn!(error = %e, "Failed to read lock record on release"),
        }
    }
}

impl Drop for InstanceLock {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        let ours = std::fs::read_to_string(&self.path)
            .ok()
            .and_then(|c| LockRecord::parse(c.lines().next().unwrap_or("")))
            .is_some_and(|r| r.pid == self.record.pid);
        if ours {
            if let Err(e) = std::fs::remove_file(&self.path) {
                tracing::warn!(error = %e, path = ?self.path, "Failed to remove lock record");
            }
        }
    }
}

async fn remove_record(path: &Path) -> Result<()> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(source) => Err(lock_error(path, source)),
    }
}

fn lock_error(path: &Path, source: std::io::Error) -> DeckError {
    DeckError::Lock {
        path: path.to_path_buf(),
        source,
    }
}
