//! CGB programmable-wave voice.

use super::{CgbKind, MixingArgs, Voice, VoiceCommon, VoiceParams};
use crate::constants::ENV_STEPS_PER_FRAME;
use crate::resampler::{Resampler, SincResampler};
use crate::types::{EnvState, Note};

/// Samples per waveform period (32 nibbles).
const WAVE_LEN: usize = 32;

/// Source sample rate that produces A4 (440 Hz) from a 32-sample period.
const A4_SOURCE_RATE: f32 = 14080.0;

/// The programmable 4-bit wave channel.
///
/// The 16 packed waveform bytes are unpacked to floats once at note start
/// and the buffer is played cyclically from then on.
pub struct WaveVoice {
    common: VoiceCommon,
    wave: [f32; WAVE_LEN],
    wave_pos: usize,
    resampler: SincResampler,
    freq: f32,
    scratch: Vec<f32>,
}

impl WaveVoice {
    /// Allocate a wave voice from 16 packed waveform bytes.
    pub fn new(params: VoiceParams, wave_data: [u8; 16]) -> Self {
        let mut wave = [0.0f32; WAVE_LEN];
        for (i, out) in wave.iter_mut().enumerate() {
            let byte = wave_data[i / 2];
            let nibble = if i % 2 == 0 { byte >> 4 } else { byte & 0x0F };
            *out = (nibble as f32 - 7.5) / 7.5;
        }
        let pitch = params.pitch_cents;
        let mut voice = WaveVoice {
            common: VoiceCommon::new(params),
            wave,
            wave_pos: 0,
            resampler: SincResampler::new(),
            freq: 0.0,
            scratch: Vec::new(),
        };
        voice.set_pitch(pitch);
        voice
    }
}

impl Voice for WaveVoice {
    fn track_index(&self) -> usize {
        self.common.track_idx
    }

    fn cgb_kind(&self) -> Option<CgbKind> {
        Some(CgbKind::Wave)
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
        let semis = (self.common.note.midi_key as i32 - 69) as f32 + cents as f32 / 100.0;
        self.freq = A4_SOURCE_RATE * (semis / 12.0).exp2();
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

        let phase_inc = self.freq / args.sample_rate as f32;
        let wave = &self.wave;
        let pos = &mut self.wave_pos;
        self.resampler
            .process(&mut self.scratch, phase_inc, &mut |buf, needed| {
                for _ in 0..needed {
                    buf.push(wave[*pos]);
                    *pos = (*pos + 1) % WAVE_LEN;
                }
                true
            });

        let target = self.common.cgb_gains();
        self.common.mix_frame(&self.scratch, buffer, target);
    }
}
