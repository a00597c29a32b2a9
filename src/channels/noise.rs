//! CGB noise voice.

use super::{CgbKind, MixingArgs, Voice, VoiceCommon, VoiceParams};
use crate::constants::{ENV_STEPS_PER_FRAME, NOISE_SAMPLING_RATE};
use crate::resampler::{Resampler, SincResampler};
use crate::types::{EnvState, NoisePattern, Note};

/// Pitch ratio clamp; beyond this the resampled LFSR is inaudible aliasing.
const MIN_RATIO: f32 = 1.0 / 16.0;
const MAX_RATIO: f32 = 16.0;

/// The hardware noise shift register.
///
/// Seeded to all ones on note start; each step shifts right with the XOR of
/// the two lowest bits fed back into the top bit (bit 14 in fine mode,
/// bit 6 in rough mode).
#[derive(Debug, Clone)]
struct Lfsr {
    reg: u16,
    pattern: NoisePattern,
}

impl Lfsr {
    fn new(pattern: NoisePattern) -> Self {
        let reg = match pattern {
            NoisePattern::Fine => 0x7FFF,
            NoisePattern::Rough => 0x7F,
        };
        Lfsr { reg, pattern }
    }

    #[inline]
    fn next(&mut self) -> f32 {
        let out = self.reg & 1;
        let feedback = (self.reg ^ (self.reg >> 1)) & 1;
        self.reg >>= 1;
        match self.pattern {
            NoisePattern::Fine => self.reg |= feedback << 14,
            NoisePattern::Rough => self.reg |= feedback << 6,
        }
        if out != 0 {
            1.0
        } else {
            -1.0
        }
    }
}

/// A voice playing the free-running LFSR stream.
///
/// The register is clocked at a fixed 65 536 Hz and the stream is then
/// sinc-resampled to the mixing rate; the key only scales the resampling
/// ratio. Each voice owns its register, so concurrent noise notes never
/// share a sequence.
pub struct NoiseVoice {
    common: VoiceCommon,
    lfsr: Lfsr,
    resampler: SincResampler,
    ratio: f32,
    scratch: Vec<f32>,
}

impl NoiseVoice {
    /// Allocate a noise voice.
    pub fn new(params: VoiceParams, pattern: NoisePattern) -> Self {
        let pitch = params.pitch_cents;
        let mut voice = NoiseVoice {
            common: VoiceCommon::new(params),
            lfsr: Lfsr::new(pattern),
            resampler: SincResampler::new(),
            ratio: 1.0,
            scratch: Vec::new(),
        };
        voice.set_pitch(pitch);
        voice
    }
}

impl Voice for NoiseVoice {
    fn track_index(&self) -> usize {
        self.common.track_idx
    }

    fn cgb_kind(&self) -> Option<CgbKind> {
        Some(CgbKind::Noise)
    }

    fn note(&self) -> Note {
        self.common.note
    }

    fn state(&self) -> EnvState {
        self.common.env.state()
    }

    fn priority(&self) -> u8 {
        self.common.priority
    }

    fn age(&self) -> u64 {
        self.common.age
    }

    fn set_volume(&mut self, vol: u8, pan: i8) {
        self.common.set_volume(vol, pan);
    }

    fn set_pitch(&mut self, cents: i32) {
        self.common.pitch_cents = cents;
        let semis = (self.common.note.midi_key as i32 - 60) as f32 + cents as f32 / 100.0;
        self.ratio = (semis / 12.0).exp2().clamp(MIN_RATIO, MAX_RATIO);
    }

    fn release(&mut self, fast: bool) {
        self.common.env.release(fast);
    }

    fn kill(&mut self) {
        self.common.env.kill();
    }

    fn tick_gate(&mut self) {
        self.common.tick_gate();
    }

    fn process(&mut self, buffer: &mut [f32], args: &MixingArgs) {
        if self.common.env.is_dead() {
            return;
        }
        for _ in 0..ENV_STEPS_PER_FRAME {
            self.common.env.step_quarter();
        }

        let count = buffer.len() / 2;
        self.scratch.clear();
        self.scratch.resize(count, 0.0);

        let phase_inc = NOISE_SAMPLING_RATE * self.ratio / args.sample_rate as f32;
        let lfsr = &mut self.lfsr;
        self.resampler
            .process(&mut self.scratch, phase_inc, &mut |buf, needed| {
                for _ in 0..needed {
                    buf.push(lfsr.next());
                }
                true
            });

        let target = self.common.cgb_gains();
        self.common.mix_frame(&self.scratch, buffer, target);
    }
}
