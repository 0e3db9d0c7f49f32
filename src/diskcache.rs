use crate::key::{AssetKey, cache_file_name};
use image::RgbaImage;
use log::{info, warn};
use std::path::{Path, PathBuf};
use twox_hash::XxHash64;

/// One enabled content pack, as reported by the host's mod/content manager.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ContentPack {
    pub id: String,
    pub version: String,
}

impl ContentPack {
    pub fn new(id: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            version: version.into(),
        }
    }
}

/// Fingerprint of the enabled content manifest. Any pack added, removed or
/// re-versioned changes it, which invalidates every cached generated map.
pub fn manifest_fingerprint(packs: &[ContentPack]) -> u64 {
    let mut manifest = String::new();
    for pack in packs {
        manifest.push_str(&pack.id);
        manifest.push_str(&pack.version);
    }
    XxHash64::oneshot(0, manifest.as_bytes())
}

/// On-disk store for generated normal maps: one PNG per asset key in
/// `cache_dir`, gated by a fingerprint file holding the manifest hash the
/// cache was built against (as a decimal integer).
pub struct DiskCache {
    cache_dir: PathBuf,
    fingerprint_path: PathBuf,
    // Validity is checked once per session per fingerprint value.
    checked: Option<(u64, bool)>,
}

impl DiskCache {
    pub fn new(cache_dir: impl Into<PathBuf>, fingerprint_path: impl Into<PathBuf>) -> Self {
        Self {
            cache_dir: cache_dir.into(),
            fingerprint_path: fingerprint_path.into(),
            checked: None,
        }
    }

    /// Whether the cache was built against `current`. A missing or
    /// unreadable fingerprint file means invalid. The answer is memoized
    /// for the session; only `commit` can flip it to valid.
    pub fn is_valid(&mut self, current: u64) -> bool {
        if let Some((fp, valid)) = self.checked {
            if fp == current {
                return valid;
            }
        }
        let stored = std::fs::read_to_string(&self.fingerprint_path)
            .ok()
            .and_then(|s| s.trim().parse::<u64>().ok());
        let valid = stored == Some(current);
        if !valid {
            info!(
                "Generated-map cache is stale or absent (stored {:?}, current {current}); regenerating.",
                stored
            );
        }
        self.checked = Some((current, valid));
        valid
    }

    /// Persists `current` as the committed fingerprint. Only called after
    /// generation has produced up-to-date files.
    pub fn commit(&mut self, current: u64) -> std::io::Result<()> {
        ensure_parent(&self.fingerprint_path)?;
        std::fs::write(&self.fingerprint_path, format!("{current}"))?;
        self.checked = Some((current, true));
        Ok(())
    }

    pub fn cached_map_path(&self, key: &AssetKey) -> PathBuf {
        self.cache_dir.join(cache_file_name(key))
    }

    /// The cached file's path when the cache is valid for `current` and the
    /// file actually exists; `None` means the caller must synthesize.
    pub fn cached_if_valid(&mut self, key: &AssetKey, current: u64) -> Option<PathBuf> {
        if !self.is_valid(current) {
            return None;
        }
        let path = self.cached_map_path(key);
        path.is_file().then_some(path)
    }

    /// Writes a generated map. A failed write is logged and returns `None`;
    /// the in-memory image stays usable and next session regenerates.
    pub fn store(&self, key: &AssetKey, image: &RgbaImage) -> Option<PathBuf> {
        let path = self.cached_map_path(key);
        if let Err(e) = ensure_parent(&path) {
            warn!("Cannot create cache directory for '{}': {e}", path.display());
            return None;
        }
        match image.save(&path) {
            Ok(()) => Some(path),
            Err(e) => {
                warn!("Cannot write generated map '{}': {e}", path.display());
                None
            }
        }
    }
}

fn ensure_parent(path: &Path) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    Ok(())
}
