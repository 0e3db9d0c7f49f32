use crate::backend::ResourceBackend;
use crate::key::{AssetKey, MapKind, ObjectRole};
use crate::store::ResidentStore;
use log::{info, warn};
use serde::Deserialize;
use std::path::Path;

/// One row of a texture table file. Tables are JSON arrays of these.
#[derive(Debug, Deserialize)]
struct TableRow {
    id: String,
    role: String,
    map: String,
    path: String,
    frame: Option<u32>,
    magnitude: Option<f32>,
    #[serde(default)]
    always: bool,
}

/// Loads a texture table and registers every valid row into the store.
///
/// Malformed rows are skipped with a warning; a bad row never aborts the
/// rest of the table. With `overwrite` set, duplicate keys replace earlier
/// rows (load-order priority); otherwise the first registration wins.
/// Returns the number of rows registered.
pub fn load_table<P: AsRef<Path>>(
    store: &mut ResidentStore,
    backend: &mut dyn ResourceBackend,
    path: P,
    overwrite: bool,
) -> usize {
    let path = path.as_ref();
    let content = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) => {
            warn!("Could not read texture table '{}': {e}", path.display());
            return 0;
        }
    };
    let rows: Vec<serde_json::Value> = match serde_json::from_str(&content) {
        Ok(r) => r,
        Err(e) => {
            warn!("Texture table '{}' is not a JSON array: {e}", path.display());
            return 0;
        }
    };

    let mut registered = 0;
    for (i, value) in rows.into_iter().enumerate() {
        let row: TableRow = match serde_json::from_value(value) {
            Ok(r) => r,
            Err(e) => {
                warn!("Skipping row {i} of '{}': {e}", path.display());
                continue;
            }
        };
        if register_row(store, backend, &row, overwrite, path, i) {
            registered += 1;
        }
    }
    info!("Loaded {} texture table rows from '{}'.", registered, path.display());
    registered
}

fn register_row(
    store: &mut ResidentStore,
    backend: &mut dyn ResourceBackend,
    row: &TableRow,
    overwrite: bool,
    table_path: &Path,
    index: usize,
) -> bool {
    let Some(kind) = MapKind::parse(&row.map) else {
        warn!(
            "Skipping row {index} of '{}': unknown map kind '{}'",
            table_path.display(),
            row.map
        );
        return false;
    };
    let Some(role) = ObjectRole::parse(&row.role) else {
        warn!(
            "Skipping row {index} of '{}': unknown object role '{}'",
            table_path.display(),
            row.role
        );
        return false;
    };
    if row.id.is_empty() || row.path.is_empty() {
        warn!(
            "Skipping row {index} of '{}': empty id or path",
            table_path.display()
        );
        return false;
    }

    let mut frame = row.frame.unwrap_or(0);
    if frame != 0 && !role.animated() {
        warn!(
            "Row {index} of '{}': role '{role}' has no animation frames; ignoring frame {frame}",
            table_path.display()
        );
        frame = 0;
    }

    let key = AssetKey::new(row.id.clone(), role, frame);
    store.register(
        backend,
        kind,
        key,
        Some(row.path.clone()),
        row.magnitude.unwrap_or(1.0),
        false,
        row.always,
        overwrite,
    );
    true
}
