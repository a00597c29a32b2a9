//! Player configuration.
//!
//! The synthesizer takes all game-specific engine parameters as an explicit
//! [`PlayerConfig`] value; there is no process-wide configuration state.

use crate::constants::{sample_rate_for, FRAME_RATE};
use crate::{Mp2kError, Result};

/// Reverb algorithm selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReverbKind {
    /// No reverb processing
    None,
    /// The driver's plain single-tap feedback delay
    #[default]
    Normal,
    /// Game Boy Player style dual-tap, variant 1
    Gs1,
    /// Game Boy Player style dual-tap, variant 2 (wider second tap)
    Gs2,
    /// Multi-tap variant with stereo spread
    Mgat,
}

/// Resampling algorithm for PCM voices.
///
/// The noise voice always uses the windowed-sinc path regardless of this
/// setting; the sharp-edged LFSR stream aliases badly under the cheaper
/// interpolators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResamplerKind {
    /// Nearest-neighbour (the hardware's own behavior)
    Nearest,
    /// Linear interpolation
    #[default]
    Linear,
    /// 16-tap windowed sinc
    Sinc,
}

/// Engine parameters for one game.
///
/// Mirrors the sound-mode word a game passes to the driver at boot, plus the
/// host-side limits. Validated once at construction of the stream generator.
#[derive(Debug, Clone, Copy)]
pub struct PlayerConfig {
    /// Master PCM volume, 0..=15
    pub pcm_vol: u8,
    /// Reverb intensity, 0..=127 (may be overridden per song)
    pub engine_rev: u8,
    /// Index into the engine sample-rate table, 0..=13
    pub engine_freq: u8,
    /// Reverb algorithm
    pub reverb: ReverbKind,
    /// Maximum number of sequencer tracks honored in a song header
    pub track_limit: u8,
    /// Maximum number of simultaneous PCM voices
    pub polyphony_limit: u8,
    /// PCM resampling quality
    pub resampler: ResamplerKind,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        PlayerConfig {
            pcm_vol: 15,
            engine_rev: 0,
            engine_freq: 3, // 13379 Hz, the most common game setting
            reverb: ReverbKind::Normal,
            track_limit: 16,
            polyphony_limit: 12,
            resampler: ResamplerKind::Linear,
        }
    }
}

impl PlayerConfig {
    /// Validate the configuration and resolve the output sample rate.
    ///
    /// # Errors
    ///
    /// Returns [`Mp2kError::Config`] for an undefined engine frequency
    /// index, out-of-range volume/reverb values or a zero track limit.
    pub fn validate(&self) -> Result<u32> {
        let rate = sample_rate_for(self.engine_freq).ok_or_else(|| {
            Mp2kError::Config(format!("undefined engine frequency index {}", self.engine_freq))
        })?;
        if self.pcm_vol > 15 {
            return Err(Mp2kError::Config(format!(
                "pcm volume {} out of range 0..=15",
                self.pcm_vol
            )));
        }
        if self.engine_rev > 127 {
            return Err(Mp2kError::Config(format!(
                "reverb level {} out of range 0..=127",
                self.engine_rev
            )));
        }
        if self.track_limit == 0 {
            return Err(Mp2kError::Config("track limit must be at least 1".into()));
        }
        if self.polyphony_limit == 0 {
            return Err(Mp2kError::Config("polyphony limit must be at least 1".into()));
        }
        Ok(rate)
    }

    /// Output samples per engine frame (the size of one block per channel).
    pub fn block_samples(&self) -> Result<usize> {
        Ok((self.validate()? / FRAME_RATE) as usize)
    }

    /// Master gain applied to PCM voices.
    #[inline]
    pub fn pcm_master_gain(&self) -> f32 {
        (self.pcm_vol as f32 + 1.0) / 16.0
    }
}
