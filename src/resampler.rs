//! Pull-driven resamplers.
//!
//! A resampler converts an arbitrary-rate source stream to the mixing rate.
//! The caller asks for N output samples at a phase increment (source samples
//! per output sample); the resampler calls back into the voice for source
//! data as needed. When the callback signals end-of-stream the remaining
//! output is padded with silence and `process` returns `false`.

use crate::tables::{sinc_window, SINC_RADIUS};

/// Source data callback.
///
/// Appends up to `needed` samples to the buffer. Returns `false` once the
/// source is exhausted (the append may be partial in that case).
pub type SourceFetch<'a> = &'a mut dyn FnMut(&mut Vec<f32>, usize) -> bool;

/// Streaming sample-rate converter.
pub trait Resampler: Send {
    /// Fill `output` at `phase_inc` source samples per output sample.
    ///
    /// Returns `false` when the source ended during this block; the tail of
    /// `output` is zero in that case.
    fn process(&mut self, output: &mut [f32], phase_inc: f32, fetch: SourceFetch) -> bool;
}

/// Shared buffering for all resampler kinds: a window of source samples and
/// a fractional read position inside it.
#[derive(Debug)]
struct SourceWindow {
    buffer: Vec<f32>,
    pos: f32,
    ended: bool,
}

impl SourceWindow {
    fn new(history: usize) -> Self {
        SourceWindow {
            buffer: vec![0.0; history],
            pos: history as f32,
            ended: false,
        }
    }

    /// Ensure the buffer holds at least `required` samples, fetching (or
    /// zero-padding after end-of-stream) as needed.
    fn require(&mut self, required: usize, fetch: SourceFetch) {
        if self.buffer.len() < required && !self.ended {
            let missing = required - self.buffer.len();
            if !fetch(&mut self.buffer, missing) {
                self.ended = true;
            }
        }
        if self.buffer.len() < required {
            self.buffer.resize(required, 0.0);
        }
    }

    /// Drop consumed samples, keeping `history` samples before the read
    /// position.
    fn trim(&mut self, history: usize) {
        let keep_from = self.pos as isize - history as isize;
        if keep_from > 0 {
            let keep_from = (keep_from as usize).min(self.buffer.len());
            self.buffer.drain(..keep_from);
            self.pos -= keep_from as f32;
        }
    }
}

/// Nearest-neighbour resampler (the hardware's own ladder).
#[derive(Debug)]
pub struct NearestResampler {
    window: SourceWindow,
}

impl NearestResampler {
    /// Create a nearest-neighbour resampler.
    pub fn new() -> Self {
        NearestResampler {
            window: SourceWindow::new(0),
        }
    }
}

impl Default for NearestResampler {
    fn default() -> Self {
        Self::new()
    }
}

impl Resampler for NearestResampler {
    fn process(&mut self, output: &mut [f32], phase_inc: f32, fetch: SourceFetch) -> bool {
        let w = &mut self.window;
        // +2 absorbs float drift between the projected end position and the
        // incrementally accumulated one.
        let last = w.pos + phase_inc * output.len().saturating_sub(1) as f32;
        w.require(last as usize + 2, fetch);

        for out in output.iter_mut() {
            *out = w.buffer[w.pos as usize];
            w.pos += phase_inc;
        }
        w.trim(0);
        !w.ended
    }
}

/// Linear-interpolation resampler.
#[derive(Debug)]
pub struct LinearResampler {
    window: SourceWindow,
}

impl LinearResampler {
    /// Create a linear resampler.
    pub fn new() -> Self {
        LinearResampler {
            window: SourceWindow::new(0),
        }
    }
}

impl Default for LinearResampler {
    fn default() -> Self {
        Self::new()
    }
}

impl Resampler for LinearResampler {
    fn process(&mut self, output: &mut [f32], phase_inc: f32, fetch: SourceFetch) -> bool {
        let w = &mut self.window;
        let last = w.pos + phase_inc * output.len().saturating_sub(1) as f32;
        w.require(last as usize + 3, fetch);

        for out in output.iter_mut() {
            let base = w.pos as usize;
            let frac = w.pos - base as f32;
            let a = w.buffer[base];
            let b = w.buffer[base + 1];
            *out = a + (b - a) * frac;
            w.pos += phase_inc;
        }
        w.trim(0);
        !w.ended
    }
}

/// 16-tap windowed-sinc resampler.
///
/// Used for the noise voice unconditionally (band-limiting the LFSR's sharp
/// edges) and for PCM voices when configured.
#[derive(Debug)]
pub struct SincResampler {
    window: SourceWindow,
}

impl SincResampler {
    /// Create a sinc resampler with a zeroed history window.
    pub fn new() -> Self {
        SincResampler {
            window: SourceWindow::new(SINC_RADIUS),
        }
    }
}

impl Default for SincResampler {
    fn default() -> Self {
        Self::new()
    }
}

impl Resampler for SincResampler {
    fn process(&mut self, output: &mut [f32], phase_inc: f32, fetch: SourceFetch) -> bool {
        let w = &mut self.window;
        let last = w.pos + phase_inc * output.len().saturating_sub(1) as f32;
        w.require(last as usize + SINC_RADIUS + 2, fetch);

        for out in output.iter_mut() {
            let center = w.pos as usize;
            let mut acc = 0.0f32;
            // taps span [center - RADIUS + 1, center + RADIUS]
            for k in (center + 1 - SINC_RADIUS)..=(center + SINC_RADIUS) {
                acc += w.buffer[k] * sinc_window(w.pos - k as f32);
            }
            *out = acc;
            w.pos += phase_inc;
        }
        w.trim(SINC_RADIUS);
        !w.ended
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Feed an endless ramp 0, 1, 2, ... into the resampler.
    fn ramp_fetch() -> impl FnMut(&mut Vec<f32>, usize) -> bool {
        let mut next = 0.0f32;
        move |buf, needed| {
            for _ in 0..needed {
                buf.push(next);
                next += 1.0;
            }
            true
        }
    }

    fn identity_check(rs: &mut dyn Resampler, tolerance: f32) {
        let mut fetch = ramp_fetch();
        let mut out = vec![0.0f32; 64];
        // Two consecutive blocks must keep continuity across the trim.
        assert!(rs.process(&mut out, 1.0, &mut fetch));
        for (i, &v) in out.iter().enumerate() {
            assert!(
                (v - i as f32).abs() <= tolerance,
                "sample {i}: got {v}"
            );
        }
        assert!(rs.process(&mut out, 1.0, &mut fetch));
        for (i, &v) in out.iter().enumerate() {
            let expected = (64 + i) as f32;
            assert!(
                (v - expected).abs() <= tolerance * expected.max(1.0),
                "sample {i}: got {v}, expected {expected}"
            );
        }
    }

    #[test]
    fn test_nearest_identity() {
        identity_check(&mut NearestResampler::new(), 0.0);
    }

    #[test]
    fn test_linear_identity() {
        identity_check(&mut LinearResampler::new(), 1e-5);
    }

    #[test]
    fn test_sinc_identity() {
        // The sinc kernel starts against a zeroed history window, so skip the
        // first block before checking the identity law.
        let mut rs = SincResampler::new();
        let mut fetch = ramp_fetch();
        let mut out = vec![0.0f32; 64];
        assert!(rs.process(&mut out, 1.0, &mut fetch));
        assert!(rs.process(&mut out, 1.0, &mut fetch));
        for (i, &v) in out.iter().enumerate() {
            let expected = (64 + i) as f32;
            assert!(
                (v - expected).abs() / expected < 1e-3,
                "sample {i}: got {v}, expected {expected}"
            );
        }
    }

    #[test]
    fn test_end_of_stream_pads_zero() {
        let mut served = false;
        let mut fetch = move |buf: &mut Vec<f32>, _needed: usize| {
            if !served {
                buf.extend_from_slice(&[1.0; 8]);
                served = true;
            }
            false
        };
        let mut rs = NearestResampler::new();
        let mut out = vec![0.5f32; 16];
        let alive = rs.process(&mut out, 1.0, &mut fetch);
        assert!(!alive);
        assert_eq!(&out[..8], &[1.0; 8]);
        assert_eq!(&out[8..], &[0.0; 8]);
    }

    #[test]
    fn test_downsampling_consumes_faster() {
        let mut fetch = ramp_fetch();
        let mut rs = NearestResampler::new();
        let mut out = vec![0.0f32; 8];
        assert!(rs.process(&mut out, 2.0, &mut fetch));
        assert_eq!(out, vec![0.0, 2.0, 4.0, 6.0, 8.0, 10.0, 12.0, 14.0]);
    }

    #[test]
    fn test_upsampling_interpolates() {
        let mut fetch = ramp_fetch();
        let mut rs = LinearResampler::new();
        let mut out = vec![0.0f32; 8];
        assert!(rs.process(&mut out, 0.5, &mut fetch));
        assert_eq!(out, vec![0.0, 0.5, 1.0, 1.5, 2.0, 2.5, 3.0, 3.5]);
    }
}
