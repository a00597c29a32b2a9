//! PCM sample voice.

use super::{CgbKind, MixingArgs, Voice, VoiceCommon, VoiceParams};
use crate::config::ResamplerKind;
use crate::resampler::{LinearResampler, NearestResampler, Resampler, SincResampler};
use crate::types::{EnvState, Note, SampleInfo};

/// Read cursor over a ROM-resident sample, including loop handling.
#[derive(Debug)]
struct SampleCursor {
    info: SampleInfo,
    pos: u32,
}

impl SampleCursor {
    /// Append up to `needed` samples; returns `false` once a one-shot sample
    /// runs out (or a degenerate loop would make no progress).
    fn fetch(&mut self, buf: &mut Vec<f32>, needed: usize) -> bool {
        let mut remaining = needed;
        while remaining > 0 {
            if self.pos >= self.info.end_pos {
                if self.info.loop_enabled && self.info.loop_pos < self.info.end_pos {
                    self.pos = self.info.loop_pos;
                } else {
                    return false;
                }
            }
            let run = remaining.min((self.info.end_pos - self.pos) as usize);
            for i in 0..run {
                buf.push(self.info.sample_at(self.pos + i as u32));
            }
            self.pos += run as u32;
            remaining -= run;
        }
        true
    }
}

/// A voice playing an instrument sample through the configured resampler.
pub struct PcmVoice {
    common: VoiceCommon,
    cursor: SampleCursor,
    resampler: Box<dyn Resampler>,
    /// Playback frequency in Hz after pitch/key mapping
    freq: f32,
    /// Fixed-frequency instruments ignore the note key
    fixed_pitch: bool,
    scratch: Vec<f32>,
}

impl PcmVoice {
    /// Allocate a PCM voice playing `sample`.
    pub fn new(params: VoiceParams, sample: SampleInfo, fixed_pitch: bool, kind: ResamplerKind) -> Self {
        let resampler: Box<dyn Resampler> = match kind {
            ResamplerKind::Nearest => Box::new(NearestResampler::new()),
            ResamplerKind::Linear => Box::new(LinearResampler::new()),
            ResamplerKind::Sinc => Box::new(SincResampler::new()),
        };
        let pitch = params.pitch_cents;
        let mut voice = PcmVoice {
            common: VoiceCommon::new(params),
            cursor: SampleCursor {
                info: sample,
                pos: 0,
            },
            resampler,
            freq: 0.0,
            fixed_pitch,
            scratch: Vec::new(),
        };
        voice.set_pitch(pitch);
        voice
    }

    /// Current read position in the sample, in source frames.
    pub fn sample_pos(&self) -> u32 {
        self.cursor.pos
    }
}

impl Voice for PcmVoice {
    fn track_index(&self) -> usize {
        self.common.track_idx
    }

    fn cgb_kind(&self) -> Option<CgbKind> {
        None
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
        let key = if self.fixed_pitch {
            60
        } else {
            self.common.note.midi_key as i32
        };
        let semis = (key - 60) as f32 + cents as f32 / 100.0;
        self.freq = self.cursor.info.mid_c_freq * (semis / 12.0).exp2();
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
        self.common.env.step_frame();

        let count = buffer.len() / 2;
        self.scratch.clear();
        self.scratch.resize(count, 0.0);

        // Bound the source consumption per block; degenerate instrument data
        // can otherwise request absurd fetch bursts.
        let phase_inc = (self.freq / args.sample_rate as f32).min(128.0);
        let cursor = &mut self.cursor;
        let alive = self.resampler.process(&mut self.scratch, phase_inc, &mut |buf, n| {
            cursor.fetch(buf, n)
        });

        let (tl, tr) = self.common.pcm_gains();
        let target = (tl * args.pcm_master_gain, tr * args.pcm_master_gain);
        self.common.mix_frame(&self.scratch, buffer, target);

        if !alive {
            // One-shot sample ran dry: fade out fast so the pool can reclaim
            // the voice.
            self.common.env.release(true);
        }
    }
}
