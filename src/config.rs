use log::warn;
use std::collections::HashMap;
use std::path::Path;

// --- Minimal INI reader ---
// Keys are stored flat as (section, key) pairs; nesting buys nothing for a
// settings file this small.
#[derive(Debug, Default)]
pub struct SimpleIni {
    values: HashMap<(String, String), String>,
}

impl SimpleIni {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load<P: AsRef<Path>>(&mut self, path: P) -> Result<(), std::io::Error> {
        let content = std::fs::read_to_string(path)?;
        self.values.clear();

        let mut section = String::new();
        for raw_line in content.lines() {
            let line = raw_line.trim();
            if line.is_empty() || line.starts_with(';') || line.starts_with('#') {
                continue;
            }
            if let Some(name) = line.strip_prefix('[').and_then(|r| r.strip_suffix(']')) {
                section = name.trim().to_string();
            } else if let Some((key, value)) = line.split_once('=') {
                let key = key.trim();
                if !key.is_empty() {
                    self.values
                        .insert((section.clone(), key.to_string()), value.trim().to_string());
                }
            }
        }

        Ok(())
    }

    pub fn get(&self, section: &str, key: &str) -> Option<String> {
        self.values
            .get(&(section.to_string(), key.to_string()))
            .cloned()
    }
}

#[inline(always)]
fn parse_flag(raw: &str) -> Option<bool> {
    let v = raw.trim();
    if v.is_empty() {
        return None;
    }
    if v.eq_ignore_ascii_case("true") || v.eq_ignore_ascii_case("yes") || v.eq_ignore_ascii_case("on")
    {
        return Some(true);
    }
    if v.eq_ignore_ascii_case("false") || v.eq_ignore_ascii_case("no") || v.eq_ignore_ascii_case("off")
    {
        return Some(false);
    }
    v.parse::<u8>().ok().map(|n| n != 0)
}

/// Policy flags for the map cache. The host owns an instance and may reload
/// it at runtime; reconciliation reads it fresh at the start of each pass and
/// re-checks it at every batch boundary, so a mid-pass reload is honored.
#[derive(Debug, Clone)]
pub struct Settings {
    pub load_material: bool,
    pub load_normal: bool,
    pub load_surface: bool,
    /// Keep every registered map resident instead of tracking the active set.
    pub preload_all_maps: bool,
    /// Synthesize normal maps for objects that lack one.
    pub auto_gen_normals: bool,
    /// Entries processed per reconciliation batch before yielding back to the
    /// host frame loop.
    pub batch_yield_every: usize,
    pub cache_dir: String,
    pub fingerprint_file: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            load_material: true,
            load_normal: true,
            load_surface: true,
            preload_all_maps: false,
            auto_gen_normals: true,
            batch_yield_every: 10,
            cache_dir: "cache/normals".to_string(),
            fingerprint_file: "cache/normals_fingerprint".to_string(),
        }
    }
}

impl Settings {
    /// Whether the given map kind participates in loading at all.
    #[inline(always)]
    pub fn map_enabled(&self, kind: crate::key::MapKind) -> bool {
        match kind {
            crate::key::MapKind::Material => self.load_material,
            crate::key::MapKind::Normal => self.load_normal,
            crate::key::MapKind::Surface => self.load_surface,
        }
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Settings {
        let mut conf = SimpleIni::new();
        if let Err(e) = conf.load(&path) {
            warn!(
                "Could not read settings '{}': {e}. Using defaults.",
                path.as_ref().display()
            );
            return Settings::default();
        }
        Settings::from_ini(&conf)
    }

    pub fn from_ini(conf: &SimpleIni) -> Settings {
        let default = Settings::default();
        Settings {
            load_material: conf
                .get("Maps", "LoadMaterial")
                .and_then(|v| parse_flag(&v))
                .unwrap_or(default.load_material),
            load_normal: conf
                .get("Maps", "LoadNormal")
                .and_then(|v| parse_flag(&v))
                .unwrap_or(default.load_normal),
            load_surface: conf
                .get("Maps", "LoadSurface")
                .and_then(|v| parse_flag(&v))
                .unwrap_or(default.load_surface),
            preload_all_maps: conf
                .get("Maps", "PreloadAllMaps")
                .and_then(|v| parse_flag(&v))
                .unwrap_or(default.preload_all_maps),
            auto_gen_normals: conf
                .get("Maps", "AutoGenNormals")
                .and_then(|v| parse_flag(&v))
                .unwrap_or(default.auto_gen_normals),
            batch_yield_every: conf
                .get("Maps", "BatchYieldEvery")
                .and_then(|v| v.parse::<usize>().ok())
                .map_or(default.batch_yield_every, |v| v.max(1)),
            cache_dir: conf
                .get("Cache", "Dir")
                .filter(|v| !v.is_empty())
                .unwrap_or(default.cache_dir),
            fingerprint_file: conf
                .get("Cache", "FingerprintFile")
                .filter(|v| !v.is_empty())
                .unwrap_or(default.fingerprint_file),
        }
    }
}
