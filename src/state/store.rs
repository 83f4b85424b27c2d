// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Durable storage for [`DeviceState`] with a short-lived read cache.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use tempfile::NamedTempFile;

use super::DeviceState;
use crate::error::StorageError;

/// Source of time for the store.
pub trait Clock: Send + Sync {
    /// Monotonic time, used for cache freshness.
    fn now(&self) -> Instant;

    /// Wall-clock time, used for `updated_at`.
    fn utc_now(&self) -> DateTime<Utc>;
}

/// The system clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn utc_now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// In-memory copy of the last record read or written.
#[derive(Debug, Default)]
struct CachedState {
    state: Option<DeviceState>,
    refreshed_at: Option<Instant>,
    /// Bumped on every write so a slow reader cannot overwrite a newer
    /// record with the one it read earlier.
    generation: u64,
}

impl CachedState {
    fn fresh(&self, now: Instant, ttl: Duration) -> Option<&DeviceState> {
        let refreshed_at = self.refreshed_at?;
        if now.saturating_duration_since(refreshed_at) < ttl {
            self.state.as_ref()
        } else {
            None
        }
    }

    fn fill(&mut self, state: DeviceState, at: Instant) {
        self.state = Some(state);
        self.refreshed_at = Some(at);
    }
}

/// Persists the last commanded [`DeviceState`] to a JSON file.
///
/// Reads take a shared lock on the file and writes an exclusive one; each
/// lock is held for the file I/O only. Writes go to a temporary file in the
/// same directory that then replaces the state file, so a reader never sees
/// a partial record even across a crash.
///
/// Reads are served from memory while the cached record is younger than
/// [`StateStore::CACHE_TTL`].
///
/// # Examples
///
/// ```no_run
/// use psu_bridge::state::{DeviceState, StateStore};
///
/// # fn example() -> Result<(), psu_bridge::error::StorageError> {
/// let store = StateStore::new("/var/lib/psu-bridge/state.json");
/// let mut state = store.load()?;
/// state.voltage = Some(54.0);
/// let saved = store.save(state)?;
/// assert!(saved.updated_at.is_some());
/// # Ok(())
/// # }
/// ```
pub struct StateStore {
    path: PathBuf,
    file_lock: RwLock<()>,
    cache: Mutex<CachedState>,
    clock: Arc<dyn Clock>,
    disk_reads: AtomicU64,
}

impl std::fmt::Debug for StateStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateStore")
            .field("path", &self.path)
            .field("disk_reads", &self.disk_reads())
            .finish_non_exhaustive()
    }
}

impl StateStore {
    /// How long a cached record is served without touching the disk.
    pub const CACHE_TTL: Duration = Duration::from_secs(1);

    /// Creates a store backed by the file at `path`.
    ///
    /// Nothing is read or created until the first [`load`](Self::load) or
    /// [`save`](Self::save).
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self::with_clock(path, Arc::new(SystemClock))
    }

    /// Creates a store with a custom clock.
    #[must_use]
    pub fn with_clock(path: impl Into<PathBuf>, clock: Arc<dyn Clock>) -> Self {
        Self {
            path: path.into(),
            file_lock: RwLock::new(()),
            cache: Mutex::new(CachedState::default()),
            clock,
            disk_reads: AtomicU64::new(0),
        }
    }

    /// Path of the state file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of times the state file has been read.
    #[must_use]
    pub fn disk_reads(&self) -> u64 {
        self.disk_reads.load(Ordering::Relaxed)
    }

    /// Returns the current state.
    ///
    /// Served from the cache when fresh. Otherwise the file is read and
    /// missing fields are backfilled. When there is no file yet, the default
    /// record is written and returned.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the file cannot be read, parsed or created.
    pub fn load(&self) -> Result<DeviceState, StorageError> {
        let now = self.clock.now();
        let generation = {
            let cache = self.cache.lock();
            if let Some(state) = cache.fresh(now, Self::CACHE_TTL) {
                return Ok(state.clone());
            }
            cache.generation
        };

        let state = match self.read_record()? {
            Some(state) => state,
            None => self.bootstrap()?,
        };

        let mut cache = self.cache.lock();
        if cache.generation == generation {
            cache.fill(state.clone(), now);
        }
        Ok(state)
    }

    /// Stamps `state` with the current time and persists it.
    ///
    /// The cache is updated only after the write succeeded.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the record cannot be written. The previous
    /// record stays intact in that case.
    pub fn save(&self, mut state: DeviceState) -> Result<DeviceState, StorageError> {
        state.touch(self.clock.utc_now());

        let _guard = self.file_lock.write();
        self.write_file(&state)?;
        // Still under the write lock, so cache order matches file order.
        let mut cache = self.cache.lock();
        cache.generation = cache.generation.wrapping_add(1);
        cache.fill(state.clone(), self.clock.now());
        drop(cache);

        tracing::debug!(path = %self.path.display(), "Saved device state");
        Ok(state)
    }

    fn read_record(&self) -> Result<Option<DeviceState>, StorageError> {
        let _guard = self.file_lock.read();
        self.read_file()
    }

    /// Writes the default record unless another caller got there first.
    fn bootstrap(&self) -> Result<DeviceState, StorageError> {
        let _guard = self.file_lock.write();
        if let Some(state) = self.read_file()? {
            return Ok(state);
        }
        let state = DeviceState::default();
        self.write_file(&state)?;
        tracing::info!(path = %self.path.display(), "Created initial state file");
        Ok(state)
    }

    /// Reads the state file. Caller holds a lock.
    fn read_file(&self) -> Result<Option<DeviceState>, StorageError> {
        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        self.disk_reads.fetch_add(1, Ordering::Relaxed);
        Ok(Some(serde_json::from_str(&contents)?))
    }

    /// Replaces the state file. Caller holds the write lock.
    fn write_file(&self, state: &DeviceState) -> Result<(), StorageError> {
        let dir = match self.path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir,
            _ => Path::new("."),
        };
        fs::create_dir_all(dir)?;

        let mut tmp = NamedTempFile::new_in(dir)?;
        serde_json::to_writer(&mut tmp, state)?;
        tmp.flush()?;
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path)?;
        sync_dir(dir)?;
        Ok(())
    }
}

/// Flushes the directory entry so a completed rename survives a crash.
#[cfg(unix)]
fn sync_dir(dir: &Path) -> io::Result<()> {
    fs::File::open(dir)?.sync_all()
}

#[cfg(not(unix))]
#[allow(clippy::unnecessary_wraps)]
fn sync_dir(_dir: &Path) -> io::Result<()> {
    Ok(())
}
