//! ADSR envelope engine.
//!
//! One envelope instance lives inside every voice. The state machine runs at
//! the engine frame rate; between frames the output level is linearly
//! interpolated from the previous frame's level to avoid zipper noise. CGB
//! voices additionally subdivide each frame into four interpolation steps
//! and only advance the state machine when the step counter wraps.

use crate::constants::ENV_STEPS_PER_FRAME;
use crate::types::{Adsr, EnvState};

/// Release factor used when a voice is preempted and has to get out of the
/// way quickly: level quarters every frame, reaching silence within four.
const FAST_RELEASE_RATE: u8 = 0x40;

/// Envelope state machine with one-frame level smoothing.
#[derive(Debug, Clone)]
pub struct Envelope {
    adsr: Adsr,
    state: EnvState,
    level: u8,
    from_level: u8,
    inter_step: u8,
}

impl Envelope {
    /// Create an idle envelope with the given rates.
    pub fn new(adsr: Adsr) -> Self {
        Envelope {
            adsr,
            state: EnvState::Init,
            level: 0,
            from_level: 0,
            inter_step: 0,
        }
    }

    /// Current phase.
    #[inline]
    pub fn state(&self) -> EnvState {
        self.state
    }

    /// Level at the end of the current frame.
    #[inline]
    pub fn level(&self) -> u8 {
        self.level
    }

    /// Level at the start of the current frame (smoothing origin).
    #[inline]
    pub fn from_level(&self) -> u8 {
        self.from_level
    }

    /// True once the voice can be reclaimed.
    #[inline]
    pub fn is_dead(&self) -> bool {
        self.state == EnvState::Dead
    }

    /// Advance the state machine by one engine frame.
    pub fn step_frame(&mut self) {
        self.from_level = self.level;

        match self.state {
            EnvState::Init => {
                self.level = 0;
                self.from_level = 0;
                self.state = EnvState::Attack;
                self.run_attack();
            }
            EnvState::Attack => self.run_attack(),
            EnvState::Decay => self.run_decay(),
            EnvState::Sustain => {
                if self.adsr.sus == 0 {
                    self.level = 0;
                    self.state = EnvState::Dead;
                }
            }
            EnvState::Release => {
                self.level = ((self.level as u32 * self.adsr.rel as u32) >> 8) as u8;
                if self.level == 0 {
                    self.state = EnvState::Dead;
                }
            }
            EnvState::Dead => {}
        }
    }

    /// Advance one quarter-frame interpolation step (CGB cadence).
    ///
    /// The state machine itself only moves when the step counter wraps, so
    /// four calls equal one [`step_frame`](Self::step_frame).
    pub fn step_quarter(&mut self) {
        if self.inter_step == 0 {
            self.step_frame();
        }
        self.inter_step = (self.inter_step + 1) % ENV_STEPS_PER_FRAME;
    }

    fn run_attack(&mut self) {
        if self.adsr.att >= 0xFF {
            self.level = 0xFF;
        } else {
            self.level = self.level.saturating_add(self.adsr.att);
        }
        if self.level == 0xFF {
            self.state = EnvState::Decay;
        }
    }

    fn run_decay(&mut self) {
        let decayed = ((self.level as u32 * self.adsr.dec as u32) >> 8) as u8;
        if decayed <= self.adsr.sus {
            self.level = self.adsr.sus;
            self.state = EnvState::Sustain;
            if self.adsr.sus == 0 {
                self.state = EnvState::Dead;
            }
        } else {
            self.level = decayed;
        }
    }

    /// Force the envelope into its release phase.
    ///
    /// `fast` overrides the programmed release rate so a replacement voice
    /// can take over within a few frames.
    pub fn release(&mut self, fast: bool) {
        if fast {
            self.adsr.rel = self.adsr.rel.min(FAST_RELEASE_RATE);
        }
        if self.state < EnvState::Release {
            self.state = EnvState::Release;
        }
    }

    /// Immediately silence and retire the envelope.
    pub fn kill(&mut self) {
        self.level = 0;
        self.from_level = 0;
        self.state = EnvState::Dead;
    }

    /// Smoothed level for sample `index` of a period spanning `count` samples,
    /// normalized to 0.0..=1.0.
    #[inline]
    pub fn interpolated(&self, index: usize, count: usize) -> f32 {
        let from = self.from_level as f32;
        let to = self.level as f32;
        (from + (to - from) * index as f32 / count as f32) / 255.0
    }
}
