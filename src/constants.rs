//! MP2K Hardware Constants
//!
//! Bit-exact tables and engine parameters shared across the synthesizer.

/// Sequencer ticks per quarter note.
pub const TICKS_PER_BEAT: u32 = 24;

/// Engine frames per second. One output block covers exactly one frame.
pub const FRAME_RATE: u32 = 60;

/// Envelope sub-steps per engine frame (CGB voices step on each quarter frame).
pub const ENV_STEPS_PER_FRAME: u8 = 4;

/// Base sampling rate of the free-running noise LFSR in Hz.
pub const NOISE_SAMPLING_RATE: f32 = 65536.0;

/// Maximum nesting depth of pattern calls before a track is halted.
pub const PATTERN_STACK_DEPTH: usize = 3;

/// Output sample rates indexed by the game's engine-frequency setting.
///
/// The driver selects its mixing rate from this table via a 4-bit field in
/// the game's sound-mode word. Entries 14 and 15 are not defined by the
/// driver; they are kept as 0 and rejected at configuration time.
pub const SAMPLE_RATE_TABLE: [u32; 16] = [
    5734, 7884, 10512, 13379, 15768, 18157, 21024, 26758, 31536, 36314, 40137, 42048, 44100,
    48000, 0, 0,
];

/// CGB 4-bit volume mapping (16 input steps collapse to 8 output levels).
///
/// The hardware only resolves the upper 3 bits of the 4-bit volume, which is
/// why consecutive entries repeat.
pub const CGB_VOLUME_TABLE: [u8; 16] = [0, 0, 1, 1, 2, 2, 3, 3, 4, 4, 5, 5, 6, 6, 7, 7];

/// Square-wave duty patterns, 8 samples per period.
///
/// Index order matches the duty field of a square instrument:
/// 12.5%, 25%, 50%, 75%.
pub const DUTY_PATTERNS: [[f32; 8]; 4] = [
    [1.0, -1.0, -1.0, -1.0, -1.0, -1.0, -1.0, -1.0],
    [1.0, 1.0, -1.0, -1.0, -1.0, -1.0, -1.0, -1.0],
    [1.0, 1.0, 1.0, 1.0, -1.0, -1.0, -1.0, -1.0],
    [1.0, 1.0, 1.0, 1.0, 1.0, 1.0, -1.0, -1.0],
];

/// Look up the output sample rate for an engine-frequency index.
///
/// Returns `None` for the two undefined table slots and out-of-range input.
#[inline]
pub fn sample_rate_for(engine_freq: u8) -> Option<u32> {
    match SAMPLE_RATE_TABLE.get(engine_freq as usize) {
        Some(&rate) if rate > 0 => Some(rate),
        _ => None,
    }
}

/// Normalized CGB channel volume for a 4-bit level.
///
/// Masks the input to the valid range [0, 15] and maps the table's 3-bit
/// output step to 0.0..=1.0.
#[inline]
pub fn cgb_volume(level: u8) -> f32 {
    CGB_VOLUME_TABLE[(level & 0x0F) as usize] as f32 / 7.0
}
