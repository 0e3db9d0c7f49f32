//! Material/normal/surface map cache for a real-time 2D sprite renderer.
//!
//! The cache maps semantic asset keys (owner id, object role, animation
//! frame) to texture entries per map kind, deduplicates entries that share a
//! backing sprite, tracks a VRAM estimate across load/unload, reconciles the
//! resident set against the host's active-object context in cooperative
//! batches, and synthesizes missing normal maps from the visible-light
//! sprite with a fingerprint-gated disk cache.

pub mod backend;
pub mod config;
pub mod diskcache;
pub mod key;
pub mod scheduler;
pub mod store;
pub mod synth;
pub mod table;

#[cfg(test)]
pub(crate) mod testutil;

pub use backend::{LoadError, ResourceBackend, TextureHandle};
pub use config::Settings;
pub use diskcache::{ContentPack, DiskCache, manifest_fingerprint};
pub use key::{AssetKey, MapKind, ObjectRole, anim_frame_path};
pub use scheduler::{ActiveContext, BatchStatus, ContextObject, ObjectGraph, Reconciliation};
pub use store::{EntryRef, OwnerOverlay, ResidentStore};

use log::{info, warn};
use rustc_hash::FxHashSet;
use std::path::Path;

/// The cache façade: resident store, disk-backed generation and the
/// negative-lookup memo, behind one instance owned by the host. No global
/// state; drop it and everything it tracked goes with it (GPU handles should
/// be released first via an empty reconcile).
pub struct MapCache {
    store: ResidentStore,
    disk: DiskCache,
    packs: Vec<ContentPack>,
    /// Keys whose synthesis was attempted and failed. Checked before any
    /// expensive work so a missing sprite costs one lookup per session.
    failed_autogen: FxHashSet<AssetKey>,
}

impl MapCache {
    pub fn new(settings: &Settings) -> Self {
        Self {
            store: ResidentStore::new(),
            disk: DiskCache::new(&settings.cache_dir, &settings.fingerprint_file),
            packs: Vec::new(),
            failed_autogen: FxHashSet::default(),
        }
    }

    pub fn store(&self) -> &ResidentStore {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut ResidentStore {
        &mut self.store
    }

    /// The enabled content packs the disk cache is validated against. Call
    /// once at startup and again whenever the enabled set changes.
    pub fn set_content_packs(&mut self, packs: Vec<ContentPack>) {
        self.packs = packs;
    }

    pub fn fingerprint(&self) -> u64 {
        manifest_fingerprint(&self.packs)
    }

    /// Registers all rows of a texture table file. See [`table::load_table`].
    pub fn load_table<P: AsRef<Path>>(
        &mut self,
        backend: &mut dyn ResourceBackend,
        path: P,
        overwrite: bool,
    ) -> usize {
        table::load_table(&mut self.store, backend, path, overwrite)
    }

    /// Plain lookup. Applies the session overlay if one is given; invalid
    /// entries resolve to `None` so the renderer falls back to the bare
    /// sprite.
    pub fn get(
        &self,
        kind: MapKind,
        key: &AssetKey,
        overlay: Option<&OwnerOverlay>,
    ) -> Option<EntryRef> {
        let key = match overlay {
            Some(o) => o.apply(key),
            None => key.clone(),
        };
        self.store
            .resolve(kind, &key)
            .filter(|e| !e.borrow().invalid)
    }

    /// Lookup that also loads the entry if it is not resident yet — the
    /// last-minute path for objects that appear without having been part of
    /// any reconciled context.
    pub fn get_loaded(
        &mut self,
        backend: &mut dyn ResourceBackend,
        kind: MapKind,
        key: &AssetKey,
        overlay: Option<&OwnerOverlay>,
    ) -> Option<EntryRef> {
        let entry = self.get(kind, key, overlay)?;
        let _ = self.store.ensure_loaded(backend, &entry);
        entry.borrow().resident.then(|| entry.clone())
    }

    /// Resolves a normal map, synthesizing one from `sprite_path` if none is
    /// registered.
    ///
    /// When the disk cache is valid and already holds a file for this key,
    /// synthesis is bypassed and the file is registered as an ordinary
    /// backing path. A fresh synthesis is written to the cache and the
    /// manifest fingerprint committed; if the write fails the image is
    /// uploaded from memory so the current session still gets the map.
    /// Failed attempts are remembered and not retried this session.
    ///
    /// `allow_generation` gates generation for objects that opt out of it;
    /// `mark_generated` controls whether the entry is treated as generated
    /// (evicted when generation is disabled) or as hand-authored.
    #[allow(clippy::too_many_arguments)]
    pub fn get_or_generate(
        &mut self,
        backend: &mut dyn ResourceBackend,
        settings: &Settings,
        key: AssetKey,
        sprite_path: &str,
        allow_generation: bool,
        mark_generated: bool,
    ) -> Option<EntryRef> {
        let key = key.canonical();
        if let Some(entry) = self.store.resolve(MapKind::Normal, &key) {
            let invalid = entry.borrow().invalid;
            return (!invalid).then_some(entry);
        }
        if self.failed_autogen.contains(&key) {
            return None;
        }
        if !allow_generation || !settings.auto_gen_normals || !settings.load_normal {
            return None;
        }

        let fp = manifest_fingerprint(&self.packs);
        if let Some(cached) = self.disk.cached_if_valid(&key, fp) {
            return Some(self.store.register(
                backend,
                MapKind::Normal,
                key,
                Some(cached.to_string_lossy().into_owned()),
                1.0,
                mark_generated,
                false,
                false,
            ));
        }

        let Some(source) = synth::load_source(sprite_path) else {
            self.failed_autogen.insert(key);
            return None;
        };
        let Some(generated) = synth::synthesize(&source) else {
            warn!("No visible pixels in '{sprite_path}'; cannot generate a normal map for '{key}'.");
            self.failed_autogen.insert(key);
            return None;
        };

        match self.disk.store(&key, &generated) {
            Some(path) => {
                if let Err(e) = self.disk.commit(fp) {
                    warn!("Could not commit the cache fingerprint: {e}");
                }
                Some(self.store.register(
                    backend,
                    MapKind::Normal,
                    key,
                    Some(path.to_string_lossy().into_owned()),
                    1.0,
                    mark_generated,
                    false,
                    false,
                ))
            }
            None => match backend.load_texture_from_image(&generated) {
                Ok(handle) => Some(self.store.register_in_memory(
                    MapKind::Normal,
                    key,
                    handle,
                    1.0,
                    mark_generated,
                )),
                Err(e) => {
                    warn!("Backend refused in-memory upload for '{key}': {e}");
                    self.failed_autogen.insert(key);
                    None
                }
            },
        }
    }

    /// Full generation pass: synthesizes a normal map for every catalog
    /// entry that has none, then commits the manifest fingerprint so the
    /// next session trusts the cache directory. Returns the number of maps
    /// resolved through generation (fresh or from a valid cache).
    pub fn auto_generate_missing(
        &mut self,
        backend: &mut dyn ResourceBackend,
        settings: &Settings,
        catalog: &[(AssetKey, String)],
    ) -> usize {
        if !settings.auto_gen_normals || !settings.load_normal {
            return 0;
        }
        let mut resolved = 0;
        for (key, sprite_path) in catalog {
            if self.store.resolve(MapKind::Normal, key).is_some() {
                continue;
            }
            if self
                .get_or_generate(backend, settings, key.clone(), sprite_path, true, true)
                .is_some()
            {
                resolved += 1;
            }
        }
        let fp = manifest_fingerprint(&self.packs);
        if let Err(e) = self.disk.commit(fp) {
            warn!("Could not commit the cache fingerprint: {e}");
        }
        info!("Normal-map generation pass resolved {resolved} map(s).");
        resolved
    }

    /// Starts a reconciliation pass over this cache's store. The host pumps
    /// the returned [`Reconciliation`] once per frame and must not start
    /// another pass until it reports `Done`.
    pub fn begin_reconcile(
        &mut self,
        backend: &mut dyn ResourceBackend,
        settings: &Settings,
        graph: &dyn ObjectGraph,
        context: Option<&ActiveContext>,
    ) -> Reconciliation {
        scheduler::reconcile(&mut self.store, backend, settings, graph, context)
    }
}
