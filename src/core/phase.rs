//! Fixed-point phase arithmetic in signed 16-bit turns.
//!
//! One full turn (2π radians) is 65 536 units, so `i16` wrapping addition and
//! subtraction are exact modulo 2π with no per-bin range reduction. The
//! synthesis multiplier recovers radians as `π · value / 0x8000`.

use rustfft::num_complex::Complex;

/// Phase value in 1/65536ths of a turn.
pub type Turns = i16;

/// Radians represented by one half of the `Turns` range.
const HALF_TURN_RADIANS: f64 = std::f64::consts::PI;

/// Converts an angle in radians (any range) to fixed-point turns.
#[inline]
pub fn from_radians(radians: f32) -> Turns {
    // Round in f64 and truncate to the low 16 bits; ±π both map to the same
    // wrapped value.
    let scaled = (radians as f64 * (32768.0 / HALF_TURN_RADIANS)).round();
    scaled as i64 as Turns
}

/// Unit complex number `exp(i · π · turns / 0x8000)`.
#[inline]
pub fn to_complex(turns: Turns) -> Complex<f32> {
    let radians = turns as f32 * (std::f32::consts::PI / 32768.0);
    Complex::new(radians.cos(), radians.sin())
}

/// Phase advance of bin `bin` of a `1 << log2_length` transform over `hop`
/// samples, wrapped to turns. `hop` may be negative for reverse playback.
#[inline]
pub fn bin_advance(bin: usize, hop: i64, log2_length: u32) -> Turns {
    debug_assert!(log2_length <= 16);
    let advance = (bin as i64 * hop) << (16 - log2_length);
    advance as Turns
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::PI;

    #[test]
    fn test_from_radians_quarters() {
        assert_eq!(from_radians(0.0), 0);
        assert_eq!(from_radians(PI / 2.0), 0x4000);
        assert_eq!(from_radians(-PI / 2.0), -0x4000);
        // ±π wrap to the same fixed-point value.
        assert_eq!(from_radians(PI), from_radians(-PI));
    }

    #[test]
    fn test_from_radians_wraps() {
        // 2π + x and x are the same angle.
        let a = from_radians(2.0 * PI + 0.25);
        let b = from_radians(0.25);
        assert!((a as i32 - b as i32).abs() <= 1);
    }

    #[test]
    fn test_to_complex_roundtrip() {
        for &t in &[0i16, 0x2000, -0x2000, 0x7fff, i16::MIN] {
            let c = to_complex(t);
            assert!((c.norm() - 1.0).abs() < 1e-5);
            let back = from_radians(c.arg());
            assert!((back as i32 - t as i32).abs() <= 2, "t={}", t);
        }
    }

    #[test]
    fn test_bin_advance_nominal() {
        // Bin 1 over one full transform length is exactly one turn: wraps
        // back to zero.
        assert_eq!(bin_advance(1, 4096, 12), 0);
        // Bin 1 over half the transform length is half a turn.
        assert_eq!(bin_advance(1, 2048, 12), i16::MIN);
        // Negative hop mirrors.
        assert_eq!(bin_advance(1, -1024, 12), -0x4000);
        // Synthesis hop of an 8x oversampled transform: one eighth turn per
        // bin index.
        assert_eq!(bin_advance(1, 512, 12), 0x2000);
        assert_eq!(bin_advance(3, 512, 12), 0x6000);
    }

    #[test]
    fn test_bin_advance_additivity() {
        // Advance over a+b equals advance over a plus advance over b, in
        // wrapping arithmetic.
        for bin in [0usize, 1, 7, 100, 2047] {
            let a = bin_advance(bin, 300, 12);
            let b = bin_advance(bin, 212, 12);
            let ab = bin_advance(bin, 512, 12);
            assert_eq!(a.wrapping_add(b), ab);
        }
    }
}
