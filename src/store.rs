use crate::backend::{LoadError, ResourceBackend, estimated_bytes};
use crate::key::{AssetKey, MapKind};
use log::warn;
use rustc_hash::FxHashMap;
use std::cell::RefCell;
use std::rc::Rc;

/// Shared handle to one cache entry. Multiple keys that link to the same
/// backing path hold clones of the same `Rc`, so residency and the VRAM
/// charge are observed by all of them.
pub type EntryRef = Rc<RefCell<TextureEntry>>;

#[derive(Debug)]
pub struct TextureEntry {
    pub path: Option<String>,
    pub handle: Option<crate::backend::TextureHandle>,
    /// Normal-map strength multiplier, carried through to the renderer.
    pub magnitude: f32,
    pub generated: bool,
    /// Set once a load attempt fails. Never cleared, never retried this
    /// session.
    pub invalid: bool,
    pub resident: bool,
    pub always_resident: bool,
    pub estimated_bytes: u64,
}

impl TextureEntry {
    fn new(path: Option<String>, magnitude: f32, generated: bool, always_resident: bool) -> Self {
        Self {
            path,
            handle: None,
            magnitude,
            generated,
            invalid: false,
            resident: false,
            always_resident,
            estimated_bytes: 0,
        }
    }
}

#[derive(Default)]
struct KindTable {
    by_key: FxHashMap<AssetKey, EntryRef>,
    by_path: FxHashMap<String, EntryRef>,
}

/// The key->entry tables (one per map kind), the path index used for
/// linking, and the running VRAM estimate. One instance per cache; no
/// process-wide state.
pub struct ResidentStore {
    tables: [KindTable; 3],
    vram_bytes: u64,
}

impl Default for ResidentStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ResidentStore {
    pub fn new() -> Self {
        Self {
            tables: [KindTable::default(), KindTable::default(), KindTable::default()],
            vram_bytes: 0,
        }
    }

    /// Find-or-fail lookup. Never creates entries.
    pub fn resolve(&self, kind: MapKind, key: &AssetKey) -> Option<EntryRef> {
        self.tables[kind.index()].by_key.get(key).cloned()
    }

    /// Sole creation path for cache entries.
    ///
    /// The path index is consulted first: if another key already owns an
    /// entry with the same backing path, the new key is bound to that entry
    /// (linking) instead of creating a duplicate. With `overwrite` set, an
    /// existing binding for `key` is replaced; if the old entry was loaded
    /// under a different path and no other key still references it, its
    /// resource is released so the overwrite cannot leak a resident orphan.
    #[allow(clippy::too_many_arguments)]
    pub fn register(
        &mut self,
        backend: &mut dyn ResourceBackend,
        kind: MapKind,
        key: AssetKey,
        path: Option<String>,
        magnitude: f32,
        generated: bool,
        always_resident: bool,
        overwrite: bool,
    ) -> EntryRef {
        let key = key.canonical();

        if let Some(existing) = self.tables[kind.index()].by_key.get(&key).cloned() {
            if !overwrite {
                return existing;
            }
            if existing.borrow().path != path {
                self.unbind_orphan(backend, kind, &key, &existing);
            } else {
                return existing;
            }
        }

        let table = &mut self.tables[kind.index()];
        let entry = match path.as_deref().and_then(|p| table.by_path.get(p)).cloned() {
            Some(linked) => {
                {
                    let mut e = linked.borrow_mut();
                    if (e.magnitude - magnitude).abs() > f32::EPSILON {
                        warn!(
                            "Map magnitude conflict for '{key}' ({} map): {} vs {}. Keeping {}.",
                            kind, e.magnitude, magnitude, e.magnitude
                        );
                    }
                    e.always_resident |= always_resident;
                }
                linked
            }
            None => {
                let entry = Rc::new(RefCell::new(TextureEntry::new(
                    path.clone(),
                    magnitude,
                    generated,
                    always_resident,
                )));
                if let Some(p) = path {
                    table.by_path.insert(p, Rc::clone(&entry));
                }
                entry
            }
        };
        table.by_key.insert(key, Rc::clone(&entry));
        entry
    }

    /// Release the old entry's resource if this overwrite leaves it with no
    /// remaining key bound to it.
    fn unbind_orphan(
        &mut self,
        backend: &mut dyn ResourceBackend,
        kind: MapKind,
        key: &AssetKey,
        old: &EntryRef,
    ) {
        let table = &mut self.tables[kind.index()];
        table.by_key.remove(key);
        let still_referenced = table.by_key.values().any(|e| Rc::ptr_eq(e, old));
        if !still_referenced {
            if let Some(p) = old.borrow().path.clone() {
                table.by_path.remove(&p);
            }
            self.unload(backend, old);
        }
    }

    /// Adopts an already-uploaded texture as a cache entry (a generated map
    /// whose disk write failed). Pathless, so it cannot come back once
    /// unloaded; the next session regenerates it.
    pub fn register_in_memory(
        &mut self,
        kind: MapKind,
        key: AssetKey,
        handle: crate::backend::TextureHandle,
        magnitude: f32,
        generated: bool,
    ) -> EntryRef {
        let bytes = estimated_bytes(handle.width, handle.height);
        let mut e = TextureEntry::new(None, magnitude, generated, false);
        e.handle = Some(handle);
        e.resident = true;
        e.estimated_bytes = bytes;
        self.vram_bytes += bytes;
        let entry = Rc::new(RefCell::new(e));
        self.tables[kind.index()]
            .by_key
            .insert(key.canonical(), Rc::clone(&entry));
        entry
    }

    /// Load an entry's resource if it is not already resident.
    ///
    /// A failed attempt marks the entry invalid; later calls short-circuit
    /// without touching the backend. Pathless entries (negative-lookup
    /// placeholders from linking) are permanently non-loadable.
    pub fn ensure_loaded(
        &mut self,
        backend: &mut dyn ResourceBackend,
        entry: &EntryRef,
    ) -> Result<(), LoadError> {
        let mut e = entry.borrow_mut();
        if e.resident {
            return Ok(());
        }
        if e.invalid {
            return Err(LoadError::PermanentlyInvalid);
        }
        let Some(path) = e.path.clone() else {
            e.invalid = true;
            return Err(LoadError::MissingPath);
        };
        match backend.load_texture(&path) {
            Ok(handle) => {
                let bytes = estimated_bytes(handle.width, handle.height);
                e.handle = Some(handle);
                e.resident = true;
                e.estimated_bytes = bytes;
                self.vram_bytes += bytes;
                Ok(())
            }
            Err(err) => {
                warn!("Failed to load texture '{path}': {err}. Entry disabled for this session.");
                e.invalid = true;
                Err(err)
            }
        }
    }

    /// Idempotent inverse of `ensure_loaded`.
    pub fn unload(&mut self, backend: &mut dyn ResourceBackend, entry: &EntryRef) {
        let mut e = entry.borrow_mut();
        if !e.resident {
            return;
        }
        if let Some(handle) = e.handle.take() {
            backend.unload_texture(handle);
        }
        self.vram_bytes -= e.estimated_bytes;
        e.estimated_bytes = 0;
        e.resident = false;
    }

    /// Running estimate of resident bytes. Equals the exact sum of
    /// `estimated_bytes` over resident entries.
    pub fn vram_estimate(&self) -> u64 {
        self.vram_bytes
    }

    pub fn entries(&self, kind: MapKind) -> impl Iterator<Item = &EntryRef> {
        self.tables[kind.index()].by_key.values()
    }

    pub fn entry_for_path(&self, kind: MapKind, path: &str) -> Option<EntryRef> {
        self.tables[kind.index()].by_path.get(path).cloned()
    }

    pub fn len(&self, kind: MapKind) -> usize {
        self.tables[kind.index()].by_key.len()
    }

    pub fn is_empty(&self, kind: MapKind) -> bool {
        self.tables[kind.index()].by_key.is_empty()
    }
}

/// Session-scoped owner-id substitutions (e.g. a boss variant borrowing
/// another hull's maps for one battle). The caller owns the overlay, passes
/// it per lookup, and drops or clears it when the session ends; the store
/// never retains a reference to it.
#[derive(Debug, Default)]
pub struct OwnerOverlay {
    subs: FxHashMap<String, String>,
}

impl OwnerOverlay {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, from: impl Into<String>, to: impl Into<String>) {
        self.subs.insert(from.into(), to.into());
    }

    pub fn clear(&mut self) {
        self.subs.clear();
    }

    /// Rewrite the owner id if a substitution is registered.
    pub fn apply(&self, key: &AssetKey) -> AssetKey {
        match self.subs.get(&key.owner) {
            Some(sub) => AssetKey::new(sub.clone(), key.role, key.frame),
            None => key.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{OwnerOverlay, ResidentStore};
    use crate::backend::estimated_bytes;
    use crate::key::{AssetKey, MapKind, ObjectRole};
    use crate::testutil::TestBackend;
    use std::rc::Rc;

    fn key(owner: &str) -> AssetKey {
        AssetKey::new(owner, ObjectRole::Ship, 0)
    }

    #[test]
    fn shared_path_links_to_one_entry() {
        let mut store = ResidentStore::new();
        let mut backend = TestBackend::new(64, 64);

        let a = store.register(
            &mut backend,
            MapKind::Material,
            key("kite_a"),
            Some("ships/kite.png".into()),
            1.0,
            false,
            false,
            false,
        );
        let b = store.register(
            &mut backend,
            MapKind::Material,
            key("kite_b"),
            Some("ships/kite.png".into()),
            1.0,
            false,
            false,
            false,
        );
        assert!(Rc::ptr_eq(&a, &b), "same backing path must share one entry");

        store.ensure_loaded(&mut backend, &a).unwrap();
        assert_eq!(
            store.vram_estimate(),
            estimated_bytes(64, 64),
            "linked keys carry a single VRAM charge"
        );
        assert_eq!(backend.loads, 1);

        store.unload(&mut backend, &b);
        assert!(!a.borrow().resident, "unload through one key is seen by the other");
        assert_eq!(store.vram_estimate(), 0);
    }

    #[test]
    fn vram_total_tracks_residency_exactly() {
        let mut store = ResidentStore::new();
        let mut backend = TestBackend::new(128, 32);

        let a = store.register(
            &mut backend,
            MapKind::Material,
            key("a"),
            Some("a.png".into()),
            1.0,
            false,
            false,
            false,
        );
        let b = store.register(
            &mut backend,
            MapKind::Material,
            key("b"),
            Some("b.png".into()),
            1.0,
            false,
            false,
            false,
        );

        store.ensure_loaded(&mut backend, &a).unwrap();
        store.ensure_loaded(&mut backend, &b).unwrap();
        assert_eq!(store.vram_estimate(), 2 * estimated_bytes(128, 32));

        // Idempotent in both directions.
        store.ensure_loaded(&mut backend, &a).unwrap();
        assert_eq!(store.vram_estimate(), 2 * estimated_bytes(128, 32));
        assert_eq!(backend.loads, 2, "resident entry must not hit the backend again");

        store.unload(&mut backend, &a);
        store.unload(&mut backend, &a);
        assert_eq!(store.vram_estimate(), estimated_bytes(128, 32));
    }

    #[test]
    fn failed_load_is_never_retried() {
        let mut store = ResidentStore::new();
        let mut backend = TestBackend::new(64, 64);
        backend.fail_path("broken.png");

        let e = store.register(
            &mut backend,
            MapKind::Normal,
            key("broken"),
            Some("broken.png".into()),
            1.0,
            false,
            false,
            false,
        );
        assert!(store.ensure_loaded(&mut backend, &e).is_err());
        assert!(e.borrow().invalid);
        assert!(store.ensure_loaded(&mut backend, &e).is_err());
        assert_eq!(backend.loads, 1, "invalid entries must not re-invoke the backend");
        assert!(!e.borrow().resident);
    }

    #[test]
    fn pathless_entries_never_load() {
        let mut store = ResidentStore::new();
        let mut backend = TestBackend::new(64, 64);
        let e = store.register(
            &mut backend,
            MapKind::Normal,
            key("ghost"),
            None,
            1.0,
            false,
            false,
            false,
        );
        assert!(store.ensure_loaded(&mut backend, &e).is_err());
        assert_eq!(backend.loads, 0);
        assert!(e.borrow().invalid);
    }

    #[test]
    fn magnitude_conflict_keeps_first() {
        let mut store = ResidentStore::new();
        let mut backend = TestBackend::new(64, 64);
        let a = store.register(
            &mut backend,
            MapKind::Normal,
            key("gun_a"),
            Some("gun.png".into()),
            1.0,
            false,
            false,
            false,
        );
        let _b = store.register(
            &mut backend,
            MapKind::Normal,
            key("gun_b"),
            Some("gun.png".into()),
            0.25,
            false,
            false,
            false,
        );
        assert_eq!(a.borrow().magnitude, 1.0, "first registered magnitude wins");
    }

    #[test]
    fn overwrite_unloads_the_orphaned_entry() {
        let mut store = ResidentStore::new();
        let mut backend = TestBackend::new(64, 64);

        let old = store.register(
            &mut backend,
            MapKind::Material,
            key("hull"),
            Some("old.png".into()),
            1.0,
            false,
            false,
            false,
        );
        store.ensure_loaded(&mut backend, &old).unwrap();
        assert_eq!(store.vram_estimate(), estimated_bytes(64, 64));

        let new = store.register(
            &mut backend,
            MapKind::Material,
            key("hull"),
            Some("new.png".into()),
            1.0,
            false,
            false,
            true,
        );
        assert!(!Rc::ptr_eq(&old, &new));
        assert!(!old.borrow().resident, "orphaned entry must be released");
        assert_eq!(store.vram_estimate(), 0);
        assert_eq!(backend.unloads, 1);

        // Without overwrite the existing binding is kept.
        let kept = store.register(
            &mut backend,
            MapKind::Material,
            key("hull"),
            Some("other.png".into()),
            1.0,
            false,
            false,
            false,
        );
        assert!(Rc::ptr_eq(&kept, &new));
    }

    #[test]
    fn overlay_substitutes_owner_ids() {
        let mut overlay = OwnerOverlay::new();
        overlay.set("boss_hull", "kite_a");
        let k = overlay.apply(&key("boss_hull"));
        assert_eq!(k.owner, "kite_a");
        assert_eq!(overlay.apply(&key("other")).owner, "other");
        overlay.clear();
        assert_eq!(overlay.apply(&key("boss_hull")).owner, "boss_hull");
    }
}
