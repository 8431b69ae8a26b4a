//! Size-bounded on-disk byte store shared by DEM and map tile lookups.

use crate::{credentials::CREDENTIALS_FILE, CacheConfig, TrailError};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use log::debug;
use std::{
    collections::BTreeSet,
    fs::{self, File},
    io::ErrorKind,
    path::{Path, PathBuf},
    sync::{Mutex, PoisonError},
    time::{Duration, SystemTime},
};

/// The cache never evicts itself below this many entries.
const MIN_ENTRIES: usize = 2;

/// Smallest step between two handed out access stamps.
const STAMP_STEP: Duration = Duration::from_micros(1);

pub struct TileCache {
    /// Flat directory holding one file per entry.
    root: PathBuf,

    max_size_bytes: u64,

    /// Entries which count toward size but are never evicted.
    retain: BTreeSet<String>,

    /// Last access stamp written to an entry's mtime.
    ///
    /// Stamps strictly increase so that recency survives coarse
    /// clocks and back to back touches.
    clock: Mutex<SystemTime>,

    /// Serializes eviction scans.
    eviction: Mutex<()>,
}

impl TileCache {
    pub fn new(config: &CacheConfig) -> Result<Self, TrailError> {
        fs::create_dir_all(&config.root)?;
        let mut retain = config.retain.clone();
        retain.insert(CREDENTIALS_FILE.to_owned());
        debug!(
            "cache at {:?}, max {} bytes, retaining {retain:?}",
            config.root, config.max_size_bytes
        );
        Ok(Self {
            root: config.root.clone(),
            max_size_bytes: config.max_size_bytes,
            retain,
            clock: Mutex::new(SystemTime::UNIX_EPOCH),
            eviction: Mutex::new(()),
        })
    }

    /// Returns the path of entry `filename`, if present, refreshing
    /// its access time.
    ///
    /// The path must not be retained past the current operation since
    /// any later `store` may evict the entry.
    pub fn probe(&self, filename: &str) -> Result<Option<PathBuf>, TrailError> {
        let path = self.entry_path(filename)?;
        if !path.is_file() {
            return Ok(None);
        }
        self.touch(&path)?;
        debug!("cache hit {filename}");
        Ok(Some(path))
    }

    /// Returns the content of entry `filename`, base64 decoding it
    /// when `encoded`.
    pub fn load(&self, filename: &str, encoded: bool) -> Result<Option<Vec<u8>>, TrailError> {
        let Some(path) = self.probe(filename)? else {
            return Ok(None);
        };
        let raw = fs::read(path)?;
        if encoded {
            Ok(Some(BASE64.decode(raw.trim_ascii())?))
        } else {
            Ok(Some(raw))
        }
    }

    /// Writes entry `filename`, base64 encoding `bytes` when
    /// `encoded`, then evicts least recently used entries until the
    /// cache fits its size bound.
    pub fn store(&self, filename: &str, bytes: &[u8], encoded: bool) -> Result<PathBuf, TrailError> {
        let path = self.entry_path(filename)?;
        if encoded {
            fs::write(&path, BASE64.encode(bytes))?;
        } else {
            fs::write(&path, bytes)?;
        }
        self.touch(&path)?;
        debug!("cached {filename}, {} bytes", bytes.len());
        self.evict()?;
        Ok(path)
    }

    /// Deletes entry `filename`. A missing entry is not an error.
    pub fn remove(&self, filename: &str) -> Result<(), TrailError> {
        let path = self.entry_path(filename)?;
        match fs::remove_file(&path) {
            Ok(()) => {
                debug!("removed {filename}");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Returns the total size in bytes of all entries.
    pub fn size(&self) -> Result<u64, TrailError> {
        Ok(self.entries()?.iter().map(|entry| entry.len).sum())
    }
}

struct Entry {
    accessed: SystemTime,
    len: u64,
    name: String,
}

/// Private API
impl TileCache {
    fn entry_path(&self, filename: &str) -> Result<PathBuf, TrailError> {
        let plain = Path::new(filename).file_name().and_then(std::ffi::OsStr::to_str);
        if filename.is_empty() || plain != Some(filename) {
            return Err(TrailError::CacheKey(filename.to_owned()));
        }
        Ok(self.root.join(filename))
    }

    fn next_stamp(&self) -> SystemTime {
        let mut last = self.clock.lock().unwrap_or_else(PoisonError::into_inner);
        let now = SystemTime::now();
        let stamp = if now > *last { now } else { *last + STAMP_STEP };
        *last = stamp;
        stamp
    }

    fn touch(&self, path: &Path) -> Result<(), TrailError> {
        let stamp = self.next_stamp();
        File::options().write(true).open(path)?.set_modified(stamp)?;
        Ok(())
    }

    fn entries(&self) -> Result<Vec<Entry>, TrailError> {
        let mut entries = Vec::new();
        for dir_entry in fs::read_dir(&self.root)? {
            let dir_entry = dir_entry?;
            let meta = dir_entry.metadata()?;
            if !meta.is_file() {
                continue;
            }
            entries.push(Entry {
                accessed: meta.modified()?,
                len: meta.len(),
                name: dir_entry.file_name().to_string_lossy().into_owned(),
            });
        }
        Ok(entries)
    }

    fn evict(&self) -> Result<(), TrailError> {
        let _scan = self.eviction.lock().unwrap_or_else(PoisonError::into_inner);
        let mut candidates = self.entries()?;
        let mut size: u64 = candidates.iter().map(|entry| entry.len).sum();
        // Most recent first, so that `pop` yields the least recent.
        candidates.sort_by(|a, b| b.accessed.cmp(&a.accessed));
        while candidates.len() > MIN_ENTRIES && size > self.max_size_bytes {
            let Some(entry) = candidates.pop() else {
                break;
            };
            if self.retain.contains(&entry.name) {
                continue;
            }
            debug!("removing {} from cache", entry.name);
            fs::remove_file(self.root.join(&entry.name))?;
            size -= entry.len;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::TileCache;
    use crate::{CacheConfig, TrailError};
    use std::collections::BTreeSet;
    use tempfile::TempDir;

    fn cache(dir: &TempDir, max_size_bytes: u64, retain: &[&str]) -> TileCache {
        TileCache::new(&CacheConfig {
            root: dir.path().to_path_buf(),
            max_size_bytes,
            retain: retain.iter().map(|name| (*name).to_owned()).collect::<BTreeSet<_>>(),
        })
        .unwrap()
    }

    #[test]
    fn test_load_missing_is_none() {
        let dir = TempDir::new().unwrap();
        let cache = cache(&dir, 1024, &[]);
        assert!(cache.probe("absent.png").unwrap().is_none());
        assert!(cache.load("absent.png", false).unwrap().is_none());
    }

    #[test]
    fn test_store_then_load() {
        let dir = TempDir::new().unwrap();
        let cache = cache(&dir, 1024, &[]);
        let path = cache.store("OTM-1-0-0.png", b"tile", false).unwrap();
        assert_eq!(path, dir.path().join("OTM-1-0-0.png"));
        assert_eq!(cache.load("OTM-1-0-0.png", false).unwrap().unwrap(), b"tile");
        assert_eq!(cache.probe("OTM-1-0-0.png").unwrap(), Some(path));

        // Overwrite semantics.
        cache.store("OTM-1-0-0.png", b"other", false).unwrap();
        assert_eq!(cache.load("OTM-1-0-0.png", false).unwrap().unwrap(), b"other");
    }

    #[test]
    fn test_remove() {
        let dir = TempDir::new().unwrap();
        let cache = cache(&dir, 1024, &[]);
        cache.store("N44W072.SRTMGL1.hgt.zip", b"<html>", false).unwrap();
        cache.remove("N44W072.SRTMGL1.hgt.zip").unwrap();
        assert!(cache.load("N44W072.SRTMGL1.hgt.zip", false).unwrap().is_none());
        cache.remove("N44W072.SRTMGL1.hgt.zip").unwrap();
        assert!(matches!(cache.remove("../N44W072"), Err(TrailError::CacheKey(_))));
    }

    #[test]
    fn test_encoded_entries() {
        let dir = TempDir::new().unwrap();
        let cache = cache(&dir, 1024, &[]);
        let path = cache.store("secret.dat", b"user:pass", true).unwrap();
        assert_eq!(std::fs::read_to_string(path).unwrap(), "dXNlcjpwYXNz");
        assert_eq!(cache.load("secret.dat", true).unwrap().unwrap(), b"user:pass");
    }

    #[test]
    fn test_rejects_paths_as_keys() {
        let dir = TempDir::new().unwrap();
        let cache = cache(&dir, 1024, &[]);
        for key in ["", "../escape", "sub/dir.png", ".."] {
            assert!(matches!(
                cache.store(key, b"x", false),
                Err(TrailError::CacheKey(_))
            ));
        }
    }

    #[test]
    fn test_evicts_least_recent() {
        let dir = TempDir::new().unwrap();
        let cache = cache(&dir, 10, &[]);
        cache.store("A", b"aaaaa", false).unwrap();
        cache.store("B", b"bbbbb", false).unwrap();
        cache.store("C", b"ccccc", false).unwrap();
        assert!(!dir.path().join("A").exists());
        assert!(dir.path().join("B").exists());
        assert!(dir.path().join("C").exists());
        assert_eq!(cache.size().unwrap(), 10);
    }

    #[test]
    fn test_read_refreshes_recency() {
        let dir = TempDir::new().unwrap();
        let cache = cache(&dir, 10, &[]);
        cache.store("A", b"aaaaa", false).unwrap();
        cache.store("B", b"bbbbb", false).unwrap();
        cache.load("A", false).unwrap();
        cache.store("C", b"ccccc", false).unwrap();
        assert!(dir.path().join("A").exists());
        assert!(!dir.path().join("B").exists());
        assert!(dir.path().join("C").exists());
    }

    #[test]
    fn test_never_below_two_entries() {
        let dir = TempDir::new().unwrap();
        let cache = cache(&dir, 1, &[]);
        cache.store("A", b"aaaaa", false).unwrap();
        cache.store("B", b"bbbbb", false).unwrap();
        assert_eq!(cache.size().unwrap(), 10);
        cache.store("C", b"ccccc", false).unwrap();
        assert_eq!(cache.size().unwrap(), 10);
        assert!(!dir.path().join("A").exists());
    }

    #[test]
    fn test_retained_entries_are_skipped() {
        let dir = TempDir::new().unwrap();
        let cache = cache(&dir, 10, &["R"]);
        cache.store("R", b"rrrrr", false).unwrap();
        cache.store("A", b"aaaaa", false).unwrap();
        cache.store("B", b"bbbbb", false).unwrap();
        cache.store("C", b"ccccc", false).unwrap();
        // R is the least recent but protected, so A goes instead.
        assert!(dir.path().join("R").exists());
        assert!(!dir.path().join("A").exists());
        assert!(dir.path().join("B").exists());
        assert!(dir.path().join("C").exists());
    }

    #[test]
    fn test_credentials_always_retained() {
        let dir = TempDir::new().unwrap();
        let cache = cache(&dir, 10, &[]);
        cache.store(crate::credentials::CREDENTIALS_FILE, b"u:p", true).unwrap();
        for name in ["A", "B", "C", "D"] {
            cache.store(name, b"xxxxx", false).unwrap();
        }
        assert!(dir.path().join(crate::credentials::CREDENTIALS_FILE).exists());
    }
}
