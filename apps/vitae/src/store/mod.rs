//! Profile Store — the single source of truth for "what is the current data
//! for profile P".
//!
//! Records are loaded lazily and revalidated on every `get`: if the data
//! source on disk is newer than the mtime observed at load time, the record is
//! reloaded before returning. A failed reload leaves the previous record in
//! place, so the last good state survives a broken edit.
//!
//! The cache sits behind an `RwLock` so the watch loop and a manual rebuild can
//! share one store. Parsing happens outside the lock; the finished record is
//! swapped in whole.

pub mod loader;

use std::collections::{BTreeSet, HashMap, HashSet};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::SystemTime;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::clock::{self, Timestamp};
use crate::errors::BuildError;
use crate::models::ProfileData;

pub use loader::{JsonProfileLoader, ProfileLoader};

/// Opaque profile identifier: the data-source file stem and the artifact base name.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProfileId(String);

impl ProfileId {
    pub fn new(id: impl Into<String>) -> Self {
        ProfileId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ProfileId {
    fn from(id: &str) -> Self {
        ProfileId(id.to_string())
    }
}

impl fmt::Display for ProfileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A loaded profile. Replaced whole on reload, never patched.
#[derive(Debug, Clone)]
pub struct ProfileRecord {
    pub id: ProfileId,
    pub data: Arc<ProfileData>,
    pub loaded_at: SystemTime,
    /// Data-source mtime observed just before the load.
    pub source_mtime: Timestamp,
}

#[derive(Default)]
struct CacheState {
    records: HashMap<ProfileId, ProfileRecord>,
    invalidated: HashSet<ProfileId>,
}

pub struct ProfileStore {
    input_dir: PathBuf,
    loader: Arc<dyn ProfileLoader>,
    cache: RwLock<CacheState>,
}

impl ProfileStore {
    pub fn new(input_dir: impl Into<PathBuf>, loader: Arc<dyn ProfileLoader>) -> Self {
        Self {
            input_dir: input_dir.into(),
            loader,
            cache: RwLock::new(CacheState::default()),
        }
    }

    /// A store reading `<input_dir>/<id>.json`.
    pub fn json(input_dir: impl Into<PathBuf>) -> Self {
        Self::new(input_dir, Arc::new(JsonProfileLoader))
    }

    pub fn input_dir(&self) -> &Path {
        &self.input_dir
    }

    /// Location of the data source for `id`.
    pub fn source_path(&self, id: &ProfileId) -> PathBuf {
        self.input_dir
            .join(format!("{}.{}", id.as_str(), self.loader.extension()))
    }

    /// Current on-disk mtime of the data source (never cached).
    pub fn source_mtime(&self, id: &ProfileId) -> Timestamp {
        clock::mtime(&self.source_path(id))
    }

    /// Maps a path inside the input directory back to the profile it defines.
    pub fn profile_for_path(&self, path: &Path) -> Option<ProfileId> {
        let relative = path.strip_prefix(&self.input_dir).ok()?;
        if relative.components().count() != 1 {
            return None;
        }
        let ext = relative.extension()?.to_str()?;
        if ext != self.loader.extension() {
            return None;
        }
        relative
            .file_stem()
            .and_then(|s| s.to_str())
            .map(ProfileId::from)
    }

    /// Enumerates every data source in the input directory.
    pub fn list_profiles(&self) -> Result<BTreeSet<ProfileId>, BuildError> {
        let entries = std::fs::read_dir(&self.input_dir)
            .map_err(|e| BuildError::io(&self.input_dir, e))?;

        Ok(entries
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| path.is_file())
            .filter_map(|path| self.profile_for_path(&path))
            .collect())
    }

    /// True if a data source exists on disk for `id`.
    pub fn contains(&self, id: &ProfileId) -> bool {
        self.source_path(id).is_file()
    }

    /// Returns the current data for `id`, reloading first if the source is
    /// newer than the cached record or the record was invalidated.
    pub fn get(&self, id: &ProfileId) -> Result<Arc<ProfileData>, BuildError> {
        let path = self.source_path(id);
        let current_mtime = clock::mtime(&path);
        if current_mtime.is_none() {
            return Err(BuildError::NotFound(id.clone()));
        }

        {
            let cache = self.cache.read().unwrap_or_else(PoisonError::into_inner);
            if let Some(record) = cache.records.get(id) {
                let fresh = !cache.invalidated.contains(id)
                    && !clock::is_newer(current_mtime, record.source_mtime);
                if fresh {
                    return Ok(Arc::clone(&record.data));
                }
            }
        }

        self.reload(id, &path, current_mtime)
    }

    fn reload(
        &self,
        id: &ProfileId,
        path: &Path,
        source_mtime: Timestamp,
    ) -> Result<Arc<ProfileData>, BuildError> {
        debug!("Loading profile '{id}' from {}", path.display());

        let data = match self.loader.load(path) {
            Ok(data) => Arc::new(data),
            Err(e) => {
                warn!("Profile '{id}' failed to load; keeping last good data: {e:#}");
                return Err(BuildError::Load {
                    id: id.clone(),
                    path: path.to_path_buf(),
                    reason: format!("{e:#}"),
                });
            }
        };

        let record = ProfileRecord {
            id: id.clone(),
            data: Arc::clone(&data),
            loaded_at: SystemTime::now(),
            source_mtime,
        };

        let mut cache = self.cache.write().unwrap_or_else(PoisonError::into_inner);
        // A concurrent reload may already have stored a newer parse.
        let superseded = cache
            .records
            .get(id)
            .is_some_and(|existing| clock::is_newer(existing.source_mtime, source_mtime));
        if superseded {
            if let Some(existing) = cache.records.get(id) {
                return Ok(Arc::clone(&existing.data));
            }
        }
        cache.records.insert(id.clone(), record);
        cache.invalidated.remove(id);
        info!("Loaded profile '{id}'");

        Ok(data)
    }

    /// Forces the next `get` for `id` to reload regardless of mtimes.
    pub fn invalidate(&self, id: &ProfileId) {
        let mut cache = self.cache.write().unwrap_or_else(PoisonError::into_inner);
        cache.invalidated.insert(id.clone());
    }

    /// Drops everything cached for `id`. Used once its data source is gone, so
    /// template scans stop reporting it.
    pub fn evict(&self, id: &ProfileId) {
        let mut cache = self.cache.write().unwrap_or_else(PoisonError::into_inner);
        if cache.records.remove(id).is_some() {
            debug!("Evicted profile '{id}'");
        }
        cache.invalidated.remove(id);
    }

    /// The last successfully loaded data, without touching the data source.
    pub fn last_good(&self, id: &ProfileId) -> Option<Arc<ProfileData>> {
        let cache = self.cache.read().unwrap_or_else(PoisonError::into_inner);
        cache.records.get(id).map(|r| Arc::clone(&r.data))
    }

    pub fn record(&self, id: &ProfileId) -> Option<ProfileRecord> {
        let cache = self.cache.read().unwrap_or_else(PoisonError::into_inner);
        cache.records.get(id).cloned()
    }

    /// Template selection for `id`: current data if it loads, else the last good data.
    pub fn template_of(&self, id: &ProfileId) -> Result<Option<String>, BuildError> {
        match self.get(id) {
            Ok(data) => Ok(Some(data.template_selector().to_string())),
            Err(BuildError::Load { .. }) => Ok(self
                .last_good(id)
                .map(|d| d.template_selector().to_string())),
            Err(e) => Err(e),
        }
    }

    /// Cached profiles currently selecting `template`. A linear scan: profile
    /// counts are small.
    pub fn profiles_using_template(&self, template: &str) -> Vec<ProfileId> {
        let cache = self.cache.read().unwrap_or_else(PoisonError::into_inner);
        let mut ids: Vec<ProfileId> = cache
            .records
            .values()
            .filter(|r| r.data.template_selector() == template)
            .map(|r| r.id.clone())
            .collect();
        ids.sort();
        ids
    }
}
