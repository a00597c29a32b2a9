//! CGB square-wave voice.

use super::{CgbKind, MixingArgs, Voice, VoiceCommon, VoiceParams};
use crate::constants::{DUTY_PATTERNS, ENV_STEPS_PER_FRAME};
use crate::resampler::{Resampler, SincResampler};
use crate::types::{EnvState, Note, WaveDuty};

/// Period of the duty patterns in source samples.
const PATTERN_LEN: usize = 8;

/// Source sample rate that produces A4 (440 Hz) from an 8-sample pattern.
const A4_SOURCE_RATE: f32 = 3520.0;

/// One of the two hardware square channels, fed by a fixed duty pattern and
/// band-limited through the sinc resampler to keep the edges clean.
pub struct SquareVoice {
    common: VoiceCommon,
    kind: CgbKind,
    pattern: &'static [f32; PATTERN_LEN],
    pattern_pos: usize,
    resampler: SincResampler,
    freq: f32,
    scratch: Vec<f32>,
}

impl SquareVoice {
    /// Allocate a square voice on channel `kind` (`Sq1` or `Sq2`).
    pub fn new(params: VoiceParams, kind: CgbKind, duty: WaveDuty) -> Self {
        debug_assert!(matches!(kind, CgbKind::Sq1 | CgbKind::Sq2));
        let pitch = params.pitch_cents;
        let mut voice = SquareVoice {
            common: VoiceCommon::new(params),
            kind,
            pattern: &DUTY_PATTERNS[duty as usize],
            pattern_pos: 0,
            resampler: SincResampler::new(),
            freq: 0.0,
            scratch: Vec::new(),
        };
        voice.set_pitch(pitch);
        voice
    }
}

impl Voice for SquareVoice {
    fn track_index(&self) -> usize {
        self.common.track_idx
    }

    fn cgb_kind(&self) -> Option<CgbKind> {
        Some(self.kind)
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
        let pattern = self.pattern;
        let pos = &mut self.pattern_pos;
        self.resampler
            .process(&mut self.scratch, phase_inc, &mut |buf, needed| {
                for _ in 0..needed {
                    buf.push(pattern[*pos]);
                    *pos = (*pos + 1) % PATTERN_LEN;
                }
                true
            });

        let target = self.common.cgb_gains();
        self.common.mix_frame(&self.scratch, buffer, target);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn voice(duty: WaveDuty) -> SquareVoice {
        let params = VoiceParams {
            track_idx: 0,
            note: Note::new(69, 127, 24),
            adsr: crate::types::Adsr::default(),
            vol: 127,
            pan: 0,
            inst_pan: 0,
            pitch_cents: 0,
            age: 0,
            priority: 0,
        };
        SquareVoice::new(params, CgbKind::Sq1, duty)
    }

    #[test]
    fn test_a4_frequency_mapping() {
        let v = voice(WaveDuty::D50);
        // Source rate for A4 is 8 samples per 440 Hz cycle
        assert!((v.freq - 3520.0).abs() < 0.01);
    }

    #[test]
    fn test_octave_shift() {
        let mut v = voice(WaveDuty::D50);
        v.set_pitch(1200);
        assert!((v.freq - 7040.0).abs() < 0.01);
    }

    #[test]
    fn test_duty_dc_offset() {
        // Average of one full pattern period matches (duty - 0.5) * 2
        let expected = [-0.75, -0.5, 0.0, 0.5];
        for (duty, &want) in [WaveDuty::D12, WaveDuty::D25, WaveDuty::D50, WaveDuty::D75]
            .iter()
            .zip(expected.iter())
        {
            let pattern = &DUTY_PATTERNS[*duty as usize];
            let avg: f32 = pattern.iter().sum::<f32>() / PATTERN_LEN as f32;
            assert!((avg - want).abs() < 1e-6);
        }
    }

    #[test]
    fn test_produces_output_then_dies_on_release() {
        let mut v = voice(WaveDuty::D50);
        let args = MixingArgs {
            sample_rate: 13379,
            pcm_master_gain: 1.0,
        };
        let mut block = vec![0.0f32; 2 * 222];
        v.process(&mut block, &args);
        assert!(block.iter().any(|&s| s != 0.0));

        v.release(false);
        // Instant release (default ADSR): dead after the next frame step
        let mut block2 = vec![0.0f32; 2 * 222];
        v.process(&mut block2, &args);
        assert_eq!(v.state(), EnvState::Dead);
    }
}
