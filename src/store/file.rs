//! Durable, file-backed activity store.

use super::{ActivityIndex, ActivityLog, ActivityStore, ScanRange};
use crate::error::{FeedError, Result};
use crate::types::{Activity, ActivityId, ActivityInput};
use fs2::FileExt;
use lru::LruCache;
use parking_lot::Mutex;
use std::fs::{self, File};
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};

/// Magic bytes for the store manifest.
const STORE_MAGIC: &[u8; 4] = b"AFS\0";

/// Current store format version.
const STORE_VERSION: u8 = 1;

/// Store configuration.
#[derive(Clone, Debug)]
pub struct StoreConfig {
    /// Base directory for the store.
    pub path: PathBuf,

    /// Number of decoded activities kept in memory.
    pub cache_size: usize,

    /// Fsync every N appends.
    pub sync_interval: u64,

    /// Whether to create the store if it doesn't exist.
    pub create_if_missing: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("./data"),
            cache_size: 1024,
            sync_interval: ActivityLog::DEFAULT_SYNC_INTERVAL,
            create_if_missing: true,
        }
    }
}

/// The durable activity store.
///
/// Holds an exclusive lock on its directory for as long as it is open.
pub struct FileStore {
    config: StoreConfig,

    /// Lock file for exclusive access.
    _lock_file: File,

    log: ActivityLog,

    index: ActivityIndex,

    /// Recently read or written activities.
    cache: Mutex<LruCache<ActivityId, Activity>>,

    /// Serializes appends so index order matches log order.
    write_lock: Mutex<()>,
}

impl FileStore {
    /// Open an existing store or create a new one.
    pub fn open_or_create(config: StoreConfig) -> Result<Self> {
        if config.path.join("MANIFEST").exists() {
            Self::open(config)
        } else if config.create_if_missing {
            Self::create(config)
        } else {
            Err(FeedError::NotInitialized)
        }
    }

    /// Create a new store.
    pub fn create(config: StoreConfig) -> Result<Self> {
        fs::create_dir_all(&config.path)?;
        Self::write_manifest(&config.path)?;
        Self::load(config)
    }

    /// Open an existing store.
    pub fn open(config: StoreConfig) -> Result<Self> {
        Self::verify_manifest(&config.path)?;
        Self::load(config)
    }

    fn load(config: StoreConfig) -> Result<Self> {
        let lock_file = Self::acquire_lock(&config.path)?;

        let (log, entries) = ActivityLog::open_with_sync_interval(
            config.path.join("activities.log"),
            config.sync_interval,
        )?;

        let index = ActivityIndex::new();
        for (offset, activity) in &entries {
            index.add(activity.id, activity.kind, *offset);
        }

        let cache_size = NonZeroUsize::new(config.cache_size.max(1)).unwrap_or(NonZeroUsize::MIN);
        let mut cache = LruCache::new(cache_size);
        // The tail is what catch-up and the first history page read.
        for (_, activity) in entries.into_iter().rev().take(cache_size.get()) {
            cache.put(activity.id, activity);
        }

        tracing::info!(
            path = %config.path.display(),
            activities = index.len(),
            "opened activity store"
        );

        Ok(Self {
            config,
            _lock_file: lock_file,
            log,
            index,
            cache: Mutex::new(cache),
            write_lock: Mutex::new(()),
        })
    }

    /// Store configuration.
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Force sync to disk.
    pub fn sync(&self) -> Result<()> {
        self.log.sync()
    }

    fn read(&self, id: ActivityId, offset: u64) -> Result<Activity> {
        if let Some(activity) = self.cache.lock().get(&id).cloned() {
            return Ok(activity);
        }

        let activity = self.log.read_at(offset)?;
        self.cache.lock().put(id, activity.clone());
        Ok(activity)
    }

    fn write_manifest(path: &Path) -> Result<()> {
        use std::io::Write;

        let mut file = File::create(path.join("MANIFEST"))?;
        file.write_all(STORE_MAGIC)?;
        file.write_all(&[STORE_VERSION])?;
        file.sync_all()?;

        Ok(())
    }

    fn verify_manifest(path: &Path) -> Result<()> {
        use std::io::Read;

        let mut file = File::open(path.join("MANIFEST"))?;

        let mut magic = [0u8; 4];
        file.read_exact(&mut magic)?;
        if &magic != STORE_MAGIC {
            return Err(FeedError::InvalidFormat("Invalid store magic".into()));
        }

        let mut version = [0u8; 1];
        file.read_exact(&mut version)?;
        if version[0] != STORE_VERSION {
            return Err(FeedError::InvalidFormat(format!(
                "Unsupported store version: {}",
                version[0]
            )));
        }

        Ok(())
    }

    fn acquire_lock(path: &Path) -> Result<File> {
        let lock_file = File::create(path.join("LOCK"))?;

        lock_file
            .try_lock_exclusive()
            .map_err(|_| FeedError::Locked)?;

        Ok(lock_file)
    }
}

impl ActivityStore for FileStore {
    fn append(&self, input: ActivityInput) -> Result<Activity> {
        let _lock = self.write_lock.lock();

        let (activity, offset) = self.log.append(input)?;
        self.index.add(activity.id, activity.kind, offset);
        self.cache.lock().put(activity.id, activity.clone());

        tracing::debug!(id = %activity.id, kind = %activity.kind, offset, "appended activity");
        Ok(activity)
    }

    fn scan(&self, range: &ScanRange) -> Result<Vec<Activity>> {
        self.index
            .scan(range)
            .into_iter()
            .map(|(id, offset)| self.read(id, offset))
            .collect()
    }

    fn get(&self, id: ActivityId) -> Result<Option<Activity>> {
        match self.index.offset_of(id) {
            Some(offset) => self.read(id, offset).map(Some),
            None => Ok(None),
        }
    }

    fn latest_id(&self) -> Option<ActivityId> {
        self.index.last_id()
    }

    fn len(&self) -> usize {
        self.index.len()
    }
}

impl Drop for FileStore {
    fn drop(&mut self) {
        // Best-effort sync on drop
        let _ = self.sync();
    }
}
