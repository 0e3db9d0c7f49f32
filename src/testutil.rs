use crate::backend::{LoadError, ResourceBackend, TextureHandle};
use std::collections::HashSet;

/// Backend double for tests: hands out fixed-size handles, counts calls and
/// fails on demand.
pub struct TestBackend {
    pub width: u32,
    pub height: u32,
    pub loads: usize,
    pub unloads: usize,
    next_id: u64,
    failing: HashSet<String>,
}

impl TestBackend {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            loads: 0,
            unloads: 0,
            next_id: 1,
            failing: HashSet::new(),
        }
    }

    pub fn fail_path(&mut self, path: &str) {
        self.failing.insert(path.to_string());
    }
}

impl ResourceBackend for TestBackend {
    fn load_texture(&mut self, path: &str) -> Result<TextureHandle, LoadError> {
        self.loads += 1;
        if self.failing.contains(path) {
            return Err(LoadError::Rejected(format!("test backend refuses '{path}'")));
        }
        let id = self.next_id;
        self.next_id += 1;
        Ok(TextureHandle {
            id,
            width: self.width,
            height: self.height,
        })
    }

    fn load_texture_from_image(
        &mut self,
        image: &image::RgbaImage,
    ) -> Result<TextureHandle, LoadError> {
        self.loads += 1;
        let id = self.next_id;
        self.next_id += 1;
        Ok(TextureHandle {
            id,
            width: image.width(),
            height: image.height(),
        })
    }

    fn unload_texture(&mut self, _handle: TextureHandle) {
        self.unloads += 1;
    }
}

/// Opt into log output for a test (`RUST_LOG=debug cargo test -- --nocapture`).
pub fn init_logs() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Unique scratch directory for fs-touching tests.
pub fn temp_dir(tag: &str) -> std::path::PathBuf {
    let dir = std::env::temp_dir().join(format!(
        "litmaps_{tag}_{}_{:?}",
        std::process::id(),
        std::thread::current().id()
    ));
    std::fs::create_dir_all(&dir).unwrap();
    dir
}
