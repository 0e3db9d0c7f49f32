use std::error::Error;
use std::fmt;

/// Handle to a texture resource owned by the rendering backend. The cache
/// never interprets `id`; width/height feed the VRAM estimate.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TextureHandle {
    pub id: u64,
    pub width: u32,
    pub height: u32,
}

/// The GPU seam. The host's rendering layer implements this; the cache calls
/// it only from the one thread that owns the GL/graphics context.
pub trait ResourceBackend {
    fn load_texture(&mut self, path: &str) -> Result<TextureHandle, LoadError>;

    /// Upload pixels that exist only in memory (a synthesized map whose disk
    /// write failed). Such a texture has no backing path and cannot be
    /// reloaded after an unload.
    fn load_texture_from_image(&mut self, image: &image::RgbaImage)
    -> Result<TextureHandle, LoadError>;

    fn unload_texture(&mut self, handle: TextureHandle);
}

#[derive(Debug)]
pub enum LoadError {
    /// The entry failed a previous load attempt and is never retried this
    /// session.
    PermanentlyInvalid,
    /// The entry has no backing path to load from.
    MissingPath,
    Io(std::io::Error),
    /// The backend refused the resource (bad format, zero-sized, out of
    /// texture units, ...).
    Rejected(String),
}

impl fmt::Display for LoadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoadError::PermanentlyInvalid => write!(f, "entry is marked permanently invalid"),
            LoadError::MissingPath => write!(f, "entry has no backing path"),
            LoadError::Io(e) => write!(f, "i/o error: {e}"),
            LoadError::Rejected(msg) => write!(f, "backend rejected texture: {msg}"),
        }
    }
}

impl Error for LoadError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            LoadError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for LoadError {
    fn from(e: std::io::Error) -> Self {
        LoadError::Io(e)
    }
}

/// VRAM cost estimate for a resident texture: 16/3 bytes per texel, the
/// fixed-point approximation of a mipmapped RGBA texture's footprint.
#[inline(always)]
pub fn estimated_bytes(width: u32, height: u32) -> u64 {
    ((16.0 * f64::from(width) * f64::from(height)) / 3.0).round() as u64
}

#[cfg(test)]
mod tests {
    use super::estimated_bytes;

    #[test]
    fn estimate_matches_sixteen_thirds_per_texel() {
        assert_eq!(estimated_bytes(0, 0), 0);
        assert_eq!(estimated_bytes(1, 1), 5, "16/3 rounds to 5");
        assert_eq!(estimated_bytes(256, 128), 174_763);
    }
}
