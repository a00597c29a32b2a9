//! Internal lookup tables for the sequence interpreter and the sinc resampler.

use std::sync::OnceLock;

/// Tick lengths addressed by WAIT and NOTE commands.
///
/// The driver encodes 49 usable durations: every value up to a full beat
/// (24 ticks), then coarser steps up to four beats. WAIT commands index the
/// table directly; NOTE commands skip the zero entry.
pub const LENGTH_TABLE: [u8; 49] = [
    0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15, 16, 17, 18, 19, 20, 21, 22, 23, 24, 28,
    30, 32, 36, 40, 42, 44, 48, 52, 54, 56, 60, 64, 66, 68, 72, 76, 78, 80, 84, 88, 90, 92, 96,
];

/// Filter half-width in source samples; the kernel spans `2 * SINC_RADIUS` taps.
pub const SINC_RADIUS: usize = 8;

/// Sub-sample resolution of the windowed-sinc lookup table.
const SINC_RESOLUTION: usize = 256;

const SINC_LUT_LEN: usize = SINC_RADIUS * SINC_RESOLUTION + 2;

fn sinc_lut() -> &'static [f32; SINC_LUT_LEN] {
    static LUT: OnceLock<[f32; SINC_LUT_LEN]> = OnceLock::new();
    LUT.get_or_init(|| {
        let mut lut = [0.0f32; SINC_LUT_LEN];
        for (i, entry) in lut.iter_mut().enumerate() {
            let x = i as f64 / SINC_RESOLUTION as f64;
            let sinc = if x == 0.0 {
                1.0
            } else {
                let px = std::f64::consts::PI * x;
                px.sin() / px
            };
            // Hann window over the kernel's support
            let window = if x < SINC_RADIUS as f64 {
                0.5 + 0.5 * (std::f64::consts::PI * x / SINC_RADIUS as f64).cos()
            } else {
                0.0
            };
            *entry = (sinc * window) as f32;
        }
        lut
    })
}

/// Windowed-sinc kernel value at offset `x` (in source samples).
#[inline]
pub fn sinc_window(x: f32) -> f32 {
    let ax = x.abs();
    if ax >= SINC_RADIUS as f32 {
        return 0.0;
    }
    let scaled = ax * SINC_RESOLUTION as f32;
    let idx = scaled as usize;
    let frac = scaled - idx as f32;
    let lut = sinc_lut();
    lut[idx] + (lut[idx + 1] - lut[idx]) * frac
}
