use glam::Vec3;
use image::RgbaImage;
use log::warn;
use std::sync::LazyLock;

const EPSILON: f64 = 1e-6;
/// Depth scale of the Sobel reconstruction; smaller values exaggerate relief.
const SOBEL_DZ: f64 = 0.133333;
/// Target alpha-weighted RMS contrast of the height field.
const TARGET_CONTRAST: f64 = 0.288_675_134_594_812_9; // sqrt(3) / 6
/// Lateral edge-fade strength. Hand-tuned to approximate hull curvature;
/// asymmetric on purpose (hulls are longer than they are wide).
const LATERAL_FADE: f64 = 1.75;

/// Normalized separable blur kernel: center tap plus 15 offsets weighted
/// `1/i^2`, so the full symmetric 31-tap kernel sums to 1.
static BLUR_KERNEL: LazyLock<[f64; 16]> = LazyLock::new(|| {
    let mut kernel = [0.0; 16];
    for (i, w) in kernel.iter_mut().enumerate() {
        *w = 1.0 / (((i + 1) * (i + 1)) as f64);
    }
    let sum = kernel[0] + 2.0 * kernel[1..].iter().sum::<f64>();
    for w in &mut kernel {
        *w /= sum;
    }
    kernel
});

/// Decodes a source sprite for synthesis. Errors are warned, not propagated:
/// a missing sprite degrades to "no generated map" at the call site.
pub fn load_source(path: &str) -> Option<RgbaImage> {
    match image::open(path) {
        Ok(img) => Some(img.to_rgba8()),
        Err(e) => {
            warn!("Cannot read sprite '{path}' for normal-map generation: {e}");
            None
        }
    }
}

/// Synthesizes a normal map from a visible-light sprite.
///
/// Pure function of the pixels: luminance height field, exponent correction
/// to mean 0.5, gain/bias to a standardized RMS contrast, lateral/longitudinal
/// edge fade, separable blur, then Sobel normal reconstruction packed as
/// `0.5 + 0.5*n` with the source alpha preserved. The output has the source
/// dimensions, so it stays texel-aligned with the sprite it was derived
/// from. Returns `None` for an empty or fully transparent source.
pub fn synthesize(src: &RgbaImage) -> Option<RgbaImage> {
    let (w, h) = (src.width() as usize, src.height() as usize);
    if w == 0 || h == 0 {
        return None;
    }

    // Luminosity as height. Alpha-premultiplied, alpha-weighted statistics.
    let mut height = vec![0.0f64; w * h];
    let mut alpha_plane = vec![0u8; w * h];
    let mut avg_luminosity = 0.0;
    let mut pixel_weight = 0.0;
    for y in 0..h {
        for x in 0..w {
            let p = src.get_pixel(x as u32, y as u32);
            let alpha = f64::from(p[3]) / 255.0;
            let red = f64::from(p[0]) / 255.0 * alpha;
            let green = f64::from(p[1]) / 255.0 * alpha;
            let blue = f64::from(p[2]) / 255.0 * alpha;
            let lum = (0.299 * red * red + 0.587 * green * green + 0.114 * blue * blue)
                .sqrt()
                .clamp(0.0, 1.0);
            height[x + y * w] = lum;
            alpha_plane[x + y * w] = p[3];
            avg_luminosity += lum;
            pixel_weight += alpha;
        }
    }
    if pixel_weight <= EPSILON {
        return None;
    }
    avg_luminosity /= pixel_weight;

    // Exponentiate so the average luminosity lands near 0.5, preserving
    // relative highs and lows.
    let exponent = if avg_luminosity > EPSILON {
        0.5f64.ln() / avg_luminosity.ln()
    } else {
        1.0
    };
    let mut avg = 0.0;
    for v in &mut height {
        *v = v.powf(exponent);
        avg += *v;
    }
    avg /= pixel_weight;

    // Gain/bias the height field to mean 0.5 and RMS contrast sqrt(3)/6,
    // then fade strongly toward the lateral edges and gently toward the
    // longitudinal ones to approximate hull geometry.
    let mut rms = 0.0;
    for (v, a) in height.iter().zip(&alpha_plane) {
        let dev = v - avg;
        rms += dev * dev * f64::from(*a) / 255.0;
    }
    rms = (rms / pixel_weight).sqrt();
    let mult = if rms > EPSILON { TARGET_CONTRAST / rms } else { 1.0 };
    let bias = 0.5 - avg * mult;
    for y in 0..h {
        let y_ratio = if h > 1 { y as f64 / (h - 1) as f64 } else { 0.5 };
        for x in 0..w {
            let x_ratio = if w > 1 { x as f64 / (w - 1) as f64 } else { 0.5 };
            let cross_fade = (1.0 - LATERAL_FADE * (x_ratio - 0.5).abs()).sqrt()
                * (1.0 - (y_ratio - 0.5).abs()).sqrt();
            let v = &mut height[x + y * w];
            *v = (((*v * mult + bias) * cross_fade) + (cross_fade - 0.25)) / LATERAL_FADE;
        }
    }

    // Two-pass separable blur, clamped at the edges, to suggest
    // medium-scale geometry.
    let kernel = &*BLUR_KERNEL;
    let mut blurred = vec![0.0f64; w * h];
    for y in 0..h {
        for x in 0..w {
            let mut acc = height[x + y * w] * kernel[0];
            for (i, k) in kernel.iter().enumerate().skip(1) {
                let x1 = x.saturating_sub(i);
                let x2 = (x + i).min(w - 1);
                acc += height[x1 + y * w] * k;
                acc += height[x2 + y * w] * k;
            }
            blurred[x + y * w] = acc;
        }
    }
    for y in 0..h {
        for x in 0..w {
            let mut acc = blurred[x + y * w] * kernel[0];
            for (i, k) in kernel.iter().enumerate().skip(1) {
                let y1 = y.saturating_sub(i);
                let y2 = (y + i).min(h - 1);
                acc += blurred[x + y1 * w] * k;
                acc += blurred[x + y2 * w] * k;
            }
            height[x + y * w] = acc;
        }
    }

    Some(normals_from_height(&height, &alpha_plane, w, h))
}

/// Sobel gradient of the height field, packed into RGB with the alpha plane
/// carried through unchanged.
fn normals_from_height(height: &[f64], alpha: &[u8], w: usize, h: usize) -> RgbaImage {
    let mut out = RgbaImage::new(w as u32, h as u32);
    let at = |x: usize, y: usize| height[x + y * w];
    for y in 0..h {
        for x in 0..w {
            let xl = x.saturating_sub(1);
            let xr = (x + 1).min(w - 1);
            let yt = y.saturating_sub(1);
            let yb = (y + 1).min(h - 1);

            let dx = at(xl, yt) + 2.0 * at(xl, y) + at(xl, yb)
                - at(xr, yt)
                - 2.0 * at(xr, y)
                - at(xr, yb);
            let dy = at(xl, yt) + 2.0 * at(x, yt) + at(xr, yt)
                - at(xl, yb)
                - 2.0 * at(x, yb)
                - at(xr, yb);
            let n = Vec3::new(dx as f32, dy as f32, SOBEL_DZ as f32).normalize();

            let pack = |c: f32| ((0.5 + 0.5 * c) * 255.0).round().clamp(0.0, 255.0) as u8;
            out.put_pixel(
                x as u32,
                y as u32,
                image::Rgba([pack(n.x), pack(n.y), pack(n.z), alpha[x + y * w]]),
            );
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::synthesize;
    use image::{Rgba, RgbaImage};

    fn uniform_square(size: u32, color: [u8; 4]) -> RgbaImage {
        RgbaImage::from_pixel(size, size, Rgba(color))
    }

    #[test]
    fn transparent_or_empty_sources_yield_none() {
        assert!(synthesize(&RgbaImage::new(0, 0)).is_none());
        assert!(synthesize(&uniform_square(16, [200, 200, 200, 0])).is_none());
    }

    #[test]
    fn transparent_margins_keep_the_source_dimensions() {
        let mut src = RgbaImage::new(16, 16);
        for y in 2..14 {
            for x in 2..14 {
                src.put_pixel(x, y, Rgba([120, 120, 120, 255]));
            }
        }
        let out = synthesize(&src).expect("visible pixels must synthesize");
        assert_eq!(
            out.dimensions(),
            (16, 16),
            "output must stay texel-aligned with the source sprite"
        );
        assert_eq!(out.get_pixel(0, 0)[3], 0, "transparent margin carries through");
        assert_eq!(out.get_pixel(8, 8)[3], 255);
    }

    #[test]
    fn alpha_is_preserved_from_the_source() {
        let mut src = uniform_square(16, [90, 140, 60, 255]);
        src.put_pixel(5, 5, Rgba([90, 140, 60, 77]));
        let out = synthesize(&src).unwrap();
        assert_eq!(out.get_pixel(5, 5)[3], 77);
        assert_eq!(out.get_pixel(0, 0)[3], 255);
    }

    #[test]
    fn synthesis_is_deterministic() {
        let mut src = uniform_square(24, [100, 100, 100, 255]);
        for x in 0..24 {
            src.put_pixel(x, 12, Rgba([230, 230, 230, 255]));
        }
        let a = synthesize(&src).unwrap();
        let b = synthesize(&src).unwrap();
        assert_eq!(a.as_raw(), b.as_raw(), "identical pixels must give identical output");
    }

    #[test]
    fn uniform_square_averages_to_an_up_normal() {
        let out = synthesize(&uniform_square(32, [128, 128, 128, 255])).unwrap();
        let mut sum = [0.0f64; 3];
        let mut count = 0.0;
        for p in out.pixels() {
            for c in 0..3 {
                sum[c] += f64::from(p[c]) / 255.0 * 2.0 - 1.0;
            }
            count += 1.0;
        }
        let mean: Vec<f64> = sum.iter().map(|s| s / count).collect();
        assert!(
            mean[0].abs() < 0.1 && mean[1].abs() < 0.1,
            "lateral components cancel on a flat source: {mean:?}"
        );
        assert!(mean[2] > 0.5, "flat source points out of the surface: {mean:?}");
    }
}
