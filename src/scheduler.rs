use crate::backend::ResourceBackend;
use crate::config::Settings;
use crate::key::{AssetKey, MapKind};
use crate::store::{EntryRef, ResidentStore};
use log::{info, trace};
use rustc_hash::FxHashSet;
use smallvec::SmallVec;
use std::collections::VecDeque;
use std::rc::Rc;

/// Opaque reference to a domain object. The cache never looks inside the id;
/// only the host's `ObjectGraph` can interpret it.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ContextObject(pub String);

/// The "currently relevant" objects for one reconciliation pass. Transient:
/// built by the host, consumed once, never persisted by the cache.
#[derive(Debug, Default)]
pub struct ActiveContext {
    pub objects: Vec<ContextObject>,
}

impl ActiveContext {
    pub fn new(objects: Vec<ContextObject>) -> Self {
        Self { objects }
    }
}

/// The only seam through which domain-specific traversal happens. The host
/// implements it over its own object model (hulls, fitted weapons, carried
/// munitions); the cache stays domain-agnostic.
pub trait ObjectGraph {
    /// Direct sub-objects carried by `obj`. The scheduler walks these
    /// transitively with cycle protection, so returning only direct children
    /// is sufficient.
    fn carried_objects(&self, obj: &ContextObject) -> Vec<ContextObject>;

    /// Asset keys for the renderable parts of `obj`. The same keys are
    /// looked up in every enabled map-kind table.
    fn asset_keys(&self, obj: &ContextObject) -> SmallVec<[AssetKey; 4]>;
}

#[derive(Debug, PartialEq, Eq)]
pub enum BatchStatus {
    /// More entries remain; call `run_batch` again next tick.
    Pending,
    Done,
}

/// In-flight load work from one `reconcile` call. The host pumps
/// `run_batch` once per frame until `Done`; it must not start another
/// reconciliation while one is pending.
pub struct Reconciliation {
    pending: VecDeque<(MapKind, EntryRef)>,
}

impl Reconciliation {
    /// Processes up to `batch_yield_every` entries, then yields. Policy is
    /// re-read from `settings` on every entry, so a mid-pass settings reload
    /// is honored: entries whose map kind or generation policy has been
    /// disabled since the pass started are skipped, not half-loaded.
    pub fn run_batch(
        &mut self,
        store: &mut ResidentStore,
        backend: &mut dyn ResourceBackend,
        settings: &Settings,
    ) -> BatchStatus {
        let budget = settings.batch_yield_every.max(1);
        for _ in 0..budget {
            let Some((kind, entry)) = self.pending.pop_front() else {
                break;
            };
            if !settings.map_enabled(kind) {
                trace!("Skipping {kind} map load: kind disabled mid-pass");
                continue;
            }
            if entry.borrow().generated && !settings.auto_gen_normals {
                trace!("Skipping generated map load: generation disabled mid-pass");
                continue;
            }
            // Load failures are warned and latched inside the store; a bad
            // entry never aborts the pass.
            let _ = store.ensure_loaded(backend, &entry);
        }
        if self.pending.is_empty() {
            info!(
                "Reconciliation complete. Estimated map VRAM: {:.2} MB",
                store.vram_estimate() as f64 / (1024.0 * 1024.0)
            );
            BatchStatus::Done
        } else {
            BatchStatus::Pending
        }
    }

    pub fn is_done(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn remaining(&self) -> usize {
        self.pending.len()
    }
}

/// One pass of the preload/eviction policy.
///
/// Computes the desired resident set — the context walk when `context` is
/// given, every registered entry when `preload_all_maps` is on, nothing
/// otherwise, always unioned with `always_resident` entries — then evicts
/// resident entries outside it synchronously and returns the loads as a
/// batched `Reconciliation`.
pub fn reconcile(
    store: &mut ResidentStore,
    backend: &mut dyn ResourceBackend,
    settings: &Settings,
    graph: &dyn ObjectGraph,
    context: Option<&ActiveContext>,
) -> Reconciliation {
    info!(
        "Reconciling maps. Estimated map VRAM before: {:.2} MB",
        store.vram_estimate() as f64 / (1024.0 * 1024.0)
    );

    let mut desired: Vec<(MapKind, EntryRef)> = Vec::new();
    let mut desired_ptrs: FxHashSet<(usize, usize)> = FxHashSet::default();
    let push = |desired: &mut Vec<(MapKind, EntryRef)>,
                    desired_ptrs: &mut FxHashSet<(usize, usize)>,
                    kind: MapKind,
                    entry: &EntryRef| {
        if desired_ptrs.insert((kind.index(), Rc::as_ptr(entry) as usize)) {
            desired.push((kind, Rc::clone(entry)));
        }
    };

    match context {
        Some(ctx) => {
            for key in context_keys(graph, ctx) {
                for kind in MapKind::ALL {
                    if !settings.map_enabled(kind) {
                        continue;
                    }
                    if let Some(entry) = store.resolve(kind, &key) {
                        push(&mut desired, &mut desired_ptrs, kind, &entry);
                    }
                }
            }
        }
        None if settings.preload_all_maps => {
            for kind in MapKind::ALL {
                if !settings.map_enabled(kind) {
                    continue;
                }
                for entry in store.entries(kind) {
                    push(&mut desired, &mut desired_ptrs, kind, entry);
                }
            }
        }
        None => {}
    }

    // Always-resident entries are kept regardless of the context; generated
    // entries are dropped when generation is off so a disabled feature never
    // forces a load.
    for kind in MapKind::ALL {
        if !settings.map_enabled(kind) {
            continue;
        }
        for entry in store.entries(kind) {
            if entry.borrow().always_resident {
                push(&mut desired, &mut desired_ptrs, kind, entry);
            }
        }
    }
    if !settings.auto_gen_normals {
        desired.retain(|(kind, entry)| {
            let keep = !entry.borrow().generated;
            if !keep {
                desired_ptrs.remove(&(kind.index(), Rc::as_ptr(entry) as usize));
            }
            keep
        });
    }

    // Synchronous eviction of everything outside the desired set.
    let mut evict: Vec<EntryRef> = Vec::new();
    for kind in MapKind::ALL {
        for entry in store.entries(kind) {
            let in_desired = desired_ptrs.contains(&(kind.index(), Rc::as_ptr(entry) as usize));
            if !in_desired && entry.borrow().resident {
                evict.push(Rc::clone(entry));
            }
        }
    }
    for entry in &evict {
        store.unload(backend, entry);
    }
    info!(
        "Evicted {} map(s); {} load(s) queued.",
        evict.len(),
        desired.len()
    );

    desired.retain(|(_, entry)| !entry.borrow().resident && !entry.borrow().invalid);
    Reconciliation {
        pending: desired.into(),
    }
}

/// Walks the context objects plus everything they transitively carry and
/// collects their asset keys. Visits each object once even if the carry
/// graph has shared children.
fn context_keys(graph: &dyn ObjectGraph, ctx: &ActiveContext) -> Vec<AssetKey> {
    let mut visited: FxHashSet<ContextObject> = FxHashSet::default();
    let mut queue: VecDeque<ContextObject> = ctx.objects.iter().cloned().collect();
    let mut keys = Vec::new();
    while let Some(obj) = queue.pop_front() {
        if !visited.insert(obj.clone()) {
            continue;
        }
        keys.extend(graph.asset_keys(&obj));
        queue.extend(graph.carried_objects(&obj));
    }
    keys
}
