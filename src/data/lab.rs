//! sRGB <-> CIE Lab conversion (D65 white point)
//!
//! Used by lab colorization, where the network sees lightness and predicts
//! the two chroma channels.

const EPSILON: f32 = 6.0 / 29.0;
const WHITE_X: f32 = 0.950456;
const WHITE_Z: f32 = 1.088754;

fn srgb_to_linear(c: f32) -> f32 {
    if c <= 0.04045 {
        c / 12.92
    } else {
        ((c + 0.055) / 1.055).powf(2.4)
    }
}

fn linear_to_srgb(c: f32) -> f32 {
    let c = c.clamp(0.0, 1.0);
    if c <= 0.0031308 {
        c * 12.92
    } else {
        1.055 * c.powf(1.0 / 2.4) - 0.055
    }
}

fn lab_f(t: f32) -> f32 {
    if t > EPSILON.powi(3) {
        t.cbrt()
    } else {
        t / (3.0 * EPSILON * EPSILON) + 4.0 / 29.0
    }
}

fn lab_f_inv(f: f32) -> f32 {
    if f > EPSILON {
        f.powi(3)
    } else {
        3.0 * EPSILON * EPSILON * (f - 4.0 / 29.0)
    }
}

/// Convert an sRGB pixel with channels in `[0, 1]` to `[L, a, b]`
///
/// `L` lies in `[0, 100]`, `a` and `b` roughly in `[-110, 110]`.
pub fn rgb_to_lab(rgb: [f32; 3]) -> [f32; 3] {
    let [r, g, b] = rgb.map(srgb_to_linear);

    let x = (0.412453 * r + 0.357580 * g + 0.180423 * b) / WHITE_X;
    let y = 0.212671 * r + 0.715160 * g + 0.072169 * b;
    let z = (0.019334 * r + 0.119193 * g + 0.950227 * b) / WHITE_Z;

    let (fx, fy, fz) = (lab_f(x), lab_f(y), lab_f(z));
    [116.0 * fy - 16.0, 500.0 * (fx - fy), 200.0 * (fy - fz)]
}

/// Convert `[L, a, b]` back to an sRGB pixel clamped to `[0, 1]`
pub fn lab_to_rgb(lab: [f32; 3]) -> [f32; 3] {
    let [l, a, b] = lab;
    let fy = (l + 16.0) / 116.0;
    let fx = fy + a / 500.0;
    let fz = fy - b / 200.0;

    let x = lab_f_inv(fx) * WHITE_X;
    let y = lab_f_inv(fy);
    let z = lab_f_inv(fz) * WHITE_Z;

    let r = 3.2404542 * x - 1.5371385 * y - 0.4985314 * z;
    let g = -0.9692660 * x + 1.8760108 * y + 0.0415560 * z;
    let b = 0.0556434 * x - 0.2040259 * y + 1.0572252 * z;

    [r, g, b].map(linear_to_srgb)
}

/// Lightness `[0, 100]` to `[-1, 1]`
pub fn normalize_lightness(l: f32) -> f32 {
    l / 50.0 - 1.0
}

/// Chroma `[-110, 110]` to `[-1, 1]`
pub fn normalize_chroma(c: f32) -> f32 {
    c / 110.0
}

pub fn denormalize_lightness(l: f32) -> f32 {
    (l + 1.0) * 50.0
}

pub fn denormalize_chroma(c: f32) -> f32 {
    c * 110.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_white_and_black() {
        let white = rgb_to_lab([1.0, 1.0, 1.0]);
        assert!((white[0] - 100.0).abs() < 0.1);
        assert!(white[1].abs() < 0.1 && white[2].abs() < 0.1);

        let black = rgb_to_lab([0.0, 0.0, 0.0]);
        assert!(black[0].abs() < 1e-3);
    }

    #[test]
    fn test_lab_inverse() {
        for rgb in [[0.2, 0.4, 0.6], [0.9, 0.1, 0.3], [0.5, 0.5, 0.5]] {
            let back = lab_to_rgb(rgb_to_lab(rgb));
            for (expected, actual) in rgb.iter().zip(back.iter()) {
                assert!((expected - actual).abs() < 1e-3, "{rgb:?} -> {back:?}");
            }
        }
    }

    #[test]
    fn test_normalization_range() {
        assert_eq!(normalize_lightness(0.0), -1.0);
        assert_eq!(normalize_lightness(100.0), 1.0);
        assert_eq!(denormalize_chroma(normalize_chroma(-55.0)), -55.0);
    }
}
