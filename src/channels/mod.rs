//! Voice implementations.
//!
//! Four voice families share one capability interface: PCM sample playback
//! and the three CGB-style synthesis channels (square, programmable wave,
//! noise). The voice pool drives them through [`Voice`] trait objects; the
//! DSP work per block dwarfs the dispatch cost.

mod noise;
mod pcm;
mod square;
mod wave;

pub use noise::NoiseVoice;
pub use pcm::PcmVoice;
pub use square::SquareVoice;
pub use wave::WaveVoice;

use crate::constants::cgb_volume;
use crate::envelope::Envelope;
use crate::types::{Adsr, EnvState, Note};

/// Which CGB channel a voice occupies.
///
/// A track owns at most one voice of each kind; allocating a second one
/// preempts the first (fast release). PCM voices are unconstrained apart
/// from the global polyphony budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CgbKind {
    /// First square channel
    Sq1,
    /// Second square channel
    Sq2,
    /// Programmable wave channel
    Wave,
    /// Noise channel
    Noise,
}

/// Per-block mixing parameters handed to every voice.
#[derive(Debug, Clone, Copy)]
pub struct MixingArgs {
    /// Output sample rate in Hz
    pub sample_rate: u32,
    /// Master gain applied to PCM voices
    pub pcm_master_gain: f32,
}

/// Capability interface shared by all voice kinds.
pub trait Voice: Send {
    /// Index of the owning track.
    fn track_index(&self) -> usize;

    /// CGB channel occupied by this voice, `None` for PCM.
    fn cgb_kind(&self) -> Option<CgbKind>;

    /// The sequenced note driving this voice.
    fn note(&self) -> Note;

    /// Current envelope phase.
    fn state(&self) -> EnvState;

    /// Allocation priority inherited from the track.
    fn priority(&self) -> u8;

    /// Monotonic allocation stamp (older voices have smaller values).
    fn age(&self) -> u64;

    /// Update target volume and pan from the owning track.
    fn set_volume(&mut self, vol: u8, pan: i8);

    /// Update pitch offset in cents relative to the note's key.
    fn set_pitch(&mut self, cents: i32);

    /// Move the envelope into its release phase.
    fn release(&mut self, fast: bool);

    /// Silence and retire the voice immediately.
    fn kill(&mut self);

    /// Advance the gate timer by one tick; releases the voice when the gate
    /// expires. Tie notes never expire on their own.
    fn tick_gate(&mut self);

    /// Render one engine frame additively into an interleaved stereo buffer.
    fn process(&mut self, buffer: &mut [f32], args: &MixingArgs);
}

/// Everything a voice needs from its track at allocation time.
#[derive(Debug, Clone, Copy)]
pub struct VoiceParams {
    /// Index of the owning track
    pub track_idx: usize,
    /// The note to play (key already shifted / overridden)
    pub note: Note,
    /// Envelope rates from the instrument
    pub adsr: Adsr,
    /// Track volume at allocation
    pub vol: u8,
    /// Track pan at allocation
    pub pan: i8,
    /// Pan offset forced by the instrument
    pub inst_pan: i8,
    /// Track pitch offset in cents at allocation
    pub pitch_cents: i32,
    /// Monotonic allocation stamp
    pub age: u64,
    /// Allocation priority inherited from the track
    pub priority: u8,
}

/// State shared by every voice implementation: note, envelope, owner and the
/// smoothed stereo gain pair.
#[derive(Debug)]
pub(crate) struct VoiceCommon {
    pub track_idx: usize,
    pub note: Note,
    pub env: Envelope,
    pub priority: u8,
    pub age: u64,
    pub vol: u8,
    pub pan: i8,
    pub inst_pan: i8,
    pub pitch_cents: i32,
    /// Previous frame's gain pair, smoothing origin
    pub from_gain: (f32, f32),
}

/// CGB pan positions. The hardware routes each channel hard left, hard
/// right or to both outputs; there is no intermediate panning.
const CGB_PAN_THRESHOLD: i8 = 21;

impl VoiceCommon {
    pub fn new(p: VoiceParams) -> Self {
        VoiceCommon {
            track_idx: p.track_idx,
            note: p.note,
            env: Envelope::new(p.adsr),
            priority: p.priority,
            age: p.age,
            vol: p.vol,
            pan: combine_pan(p.pan, p.inst_pan),
            inst_pan: p.inst_pan,
            pitch_cents: p.pitch_cents,
            from_gain: (0.0, 0.0),
        }
    }

    /// Apply a track volume/pan update, folding in the instrument pan.
    pub fn set_volume(&mut self, vol: u8, pan: i8) {
        self.vol = vol;
        self.pan = combine_pan(pan, self.inst_pan);
    }

    /// Continuous equal-split stereo gains for PCM voices.
    pub fn pcm_gains(&self) -> (f32, f32) {
        let vol = (self.vol as f32 * self.note.velocity as f32) / (127.0 * 127.0);
        let l = vol * (64 - self.pan as i32) as f32 / 128.0;
        let r = vol * (64 + self.pan as i32) as f32 / 128.0;
        (l, r)
    }

    /// Hard-panned gains for CGB voices, quantized through the 4-bit volume
    /// table.
    pub fn cgb_gains(&self) -> (f32, f32) {
        let scaled = (self.vol as u32 * self.note.velocity as u32) / 127;
        let vol = cgb_volume((scaled >> 3) as u8);
        let left = self.pan <= CGB_PAN_THRESHOLD;
        let right = self.pan >= -CGB_PAN_THRESHOLD;
        (if left { vol } else { 0.0 }, if right { vol } else { 0.0 })
    }

    pub fn tick_gate(&mut self) {
        if self.note.length > 0 {
            self.note.length -= 1;
            if self.note.length == 0 {
                self.env.release(false);
            }
        }
    }

    /// Mix one frame of mono `samples` into the interleaved stereo `buffer`,
    /// applying the per-sample envelope ramp and smoothing the gain pair from
    /// the previous frame's values.
    pub fn mix_frame(&mut self, samples: &[f32], buffer: &mut [f32], target: (f32, f32)) {
        let count = samples.len();
        debug_assert_eq!(buffer.len(), 2 * count, "stereo block size mismatch");
        let (tl, tr) = target;
        let (fl, fr) = self.from_gain;
        let inv = 1.0 / count as f32;
        for (i, &s) in samples.iter().enumerate() {
            let env = self.env.interpolated(i, count);
            let t = i as f32 * inv;
            buffer[2 * i] += s * env * (fl + (tl - fl) * t);
            buffer[2 * i + 1] += s * env * (fr + (tr - fr) * t);
        }
        self.from_gain = (tl, tr);
    }
}

#[inline]
fn combine_pan(track_pan: i8, inst_pan: i8) -> i8 {
    (track_pan as i32 + inst_pan as i32).clamp(-64, 63) as i8
}
