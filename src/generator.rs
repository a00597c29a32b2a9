//! Block renderer.
//!
//! `StreamGenerator` drives the whole pipeline: it advances the sequence by
//! one engine frame of tempo time, dispatches due bytecode events on every
//! track, allocates and retires voices, pulls one frame of audio out of each
//! voice into its track's stereo buffer and runs the track reverbs.
//!
//! Everything is single-threaded and pull-driven; one call to
//! [`StreamGenerator::process_and_get_audio`] produces exactly one block and
//! never suspends.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::channels::{
    MixingArgs, NoiseVoice, PcmVoice, SquareVoice, Voice, VoiceParams, WaveVoice,
};
use crate::config::PlayerConfig;
use crate::constants::{FRAME_RATE, TICKS_PER_BEAT};
use crate::instruments::VoiceSource;
use crate::reverb::{make_reverb, Reverb};
use crate::rom::Rom;
use crate::sequence::Sequence;
use crate::tables::LENGTH_TABLE;
use crate::types::{CgbDef, EnvState, Note};
use crate::Result;

/// Upper bound on zero-delay events per track per tick. Well-formed songs
/// dispatch a handful; hitting the bound means the bytecode loops without a
/// wait and the track is halted as a data error.
const MAX_EVENTS_PER_TICK: u32 = 1024;

/// Command bytes. Values below 0x80 are data; 0x80..=0xB0 encode waits and
/// 0xD0..=0xFF notes, both through the shared length table.
const CMD_WAIT_BASE: u8 = 0x80;
const CMD_FINE: u8 = 0xB1;
const CMD_GOTO: u8 = 0xB2;
const CMD_PATT: u8 = 0xB3;
const CMD_PEND: u8 = 0xB4;
const CMD_PRIO: u8 = 0xBA;
const CMD_TEMPO: u8 = 0xBB;
const CMD_KEYSH: u8 = 0xBC;
const CMD_VOICE: u8 = 0xBD;
const CMD_VOL: u8 = 0xBE;
const CMD_PAN: u8 = 0xBF;
const CMD_BEND: u8 = 0xC0;
const CMD_BENDR: u8 = 0xC1;
const CMD_LFOS: u8 = 0xC2;
const CMD_LFODL: u8 = 0xC3;
const CMD_MOD: u8 = 0xC4;
const CMD_MODT: u8 = 0xC5;
const CMD_TUNE: u8 = 0xC8;
const CMD_XCMD: u8 = 0xCD;
const CMD_EOT: u8 = 0xCE;
const CMD_TIE: u8 = 0xCF;
const CMD_NOTE_BASE: u8 = 0xD0;

/// Center value for PAN/BEND/TUNE operands.
const OPERAND_CENTER: u8 = 0x40;

/// The synthesizer's block renderer.
///
/// Owns the sequence, the voice pool and the per-track output buffers. The
/// ROM image is shared read-only and must outlive the generator.
pub struct StreamGenerator {
    seq: Sequence,
    cfg: PlayerConfig,
    sample_rate: u32,
    block_samples: usize,
    args: MixingArgs,
    track_buffers: Vec<Vec<f32>>,
    reverbs: Vec<Box<dyn Reverb>>,
    voices: Vec<Box<dyn Voice>>,
    next_age: u64,
    /// Samples of tempo time not yet consumed by a tick
    tick_debt: f64,
    /// Stop a track after this many backward jumps (None plays forever)
    loop_limit: Option<u32>,
}

impl StreamGenerator {
    /// Set up playback of the song whose header is at image offset
    /// `song_pos`.
    ///
    /// Fails on an invalid configuration or an unreadable song header.
    pub fn new(rom: Arc<Rom>, song_pos: usize, cfg: PlayerConfig) -> Result<Self> {
        let sample_rate = cfg.validate()?;
        let block_samples = (sample_rate / FRAME_RATE) as usize;
        let seq = Sequence::new(rom, song_pos, cfg.track_limit)?;

        let rev_level = seq.info().reverb_override().unwrap_or(cfg.engine_rev);
        let intensity = rev_level as f32 / 128.0;
        let track_count = seq.tracks.len();
        let reverbs = (0..track_count)
            .map(|_| make_reverb(cfg.reverb, intensity, block_samples))
            .collect();

        Ok(StreamGenerator {
            seq,
            cfg,
            sample_rate,
            block_samples,
            args: MixingArgs {
                sample_rate,
                pcm_master_gain: cfg.pcm_master_gain(),
            },
            track_buffers: vec![vec![0.0; 2 * block_samples]; track_count],
            reverbs,
            voices: Vec::new(),
            next_age: 0,
            tick_debt: 0.0,
            loop_limit: None,
        })
    }

    /// Bound playback of looping songs: a track halts once it has taken
    /// `limit` backward jumps. `None` (the default) plays loops forever.
    pub fn set_loop_limit(&mut self, limit: Option<u32>) {
        self.loop_limit = limit;
    }

    /// Samples per track channel in one block.
    pub fn buffer_unit_count(&self) -> usize {
        self.block_samples
    }

    /// Output sample rate in Hz.
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// The sequence being played.
    pub fn sequence(&self) -> &Sequence {
        &self.seq
    }

    /// Mute or unmute a track. Muted tracks keep dispatching events but
    /// allocate no voices.
    pub fn set_track_mute(&mut self, track: usize, mute: bool) {
        if let Some(t) = self.seq.tracks.get_mut(track) {
            t.muted = mute;
            if mute {
                for v in self.voices.iter_mut().filter(|v| v.track_index() == track) {
                    v.release(false);
                }
            }
        }
    }

    /// True once the song ended naturally: every track halted and every
    /// voice retired.
    pub fn has_stream_ended(&self) -> bool {
        self.seq.all_tracks_done() && self.voices.is_empty()
    }

    /// Number of voices currently sounding (including releasing ones).
    pub fn active_voice_count(&self) -> usize {
        self.voices.len()
    }

    /// Restart the song from the beginning, clearing all voices, reverb
    /// tails and tempo state.
    pub fn reset(&mut self) {
        self.seq.reset();
        self.voices.clear();
        for rev in &mut self.reverbs {
            rev.reset();
        }
        for buf in &mut self.track_buffers {
            buf.fill(0.0);
        }
        self.tick_debt = 0.0;
        self.next_age = 0;
    }

    /// Samples of tempo time covered by one sequencer tick.
    fn samples_per_tick(&self) -> f64 {
        (self.sample_rate as f64 * 60.0) / (self.seq.bpm as f64 * TICKS_PER_BEAT as f64)
    }

    /// Render one block and return the per-track stereo buffers.
    ///
    /// Each entry holds `2 * buffer_unit_count()` interleaved samples for the
    /// matching track index. Values are unclipped; the expected range is
    /// -1.0..=1.0 but the sum of many voices may exceed it.
    pub fn process_and_get_audio(&mut self) -> Result<&[Vec<f32>]> {
        // 1. Advance the sequence by one frame of tempo time. Tick 0 fires
        //    at the very first sample.
        self.tick_debt += self.block_samples as f64;
        while self.tick_debt > 0.0 {
            self.run_tick();
            self.tick_debt -= self.samples_per_tick();
        }

        // 2. Render voices into their track buffers, allocation order within
        //    a track, ascending track order overall (summation order is part
        //    of the output contract).
        for buf in &mut self.track_buffers {
            buf.fill(0.0);
        }
        for voice in &mut self.voices {
            let track = voice.track_index();
            voice.process(&mut self.track_buffers[track], &self.args);
        }

        // 3. Retire dead voices.
        self.voices.retain(|v| v.state() != EnvState::Dead);

        // 4. Reverb, one instance per track.
        for (buf, rev) in self.track_buffers.iter_mut().zip(self.reverbs.iter_mut()) {
            rev.process(buf);
        }

        Ok(&self.track_buffers)
    }

    /// Sum the current per-track buffers into a master stereo block.
    ///
    /// `out` must hold `2 * buffer_unit_count()` samples. Tracks are summed
    /// in index order.
    pub fn mix_master_into(&self, out: &mut [f32]) {
        assert_eq!(out.len(), 2 * self.block_samples, "master block size mismatch");
        out.fill(0.0);
        for buf in &self.track_buffers {
            for (o, &s) in out.iter_mut().zip(buf.iter()) {
                *o += s;
            }
        }
    }

    /// Execute one sequencer tick across all tracks and age every gate.
    fn run_tick(&mut self) {
        // Voices allocated during this tick keep their full gate time.
        let tick_start_age = self.next_age;

        for idx in 0..self.seq.tracks.len() {
            {
                let track = &mut self.seq.tracks[idx];
                if track.enabled && track.wait_ticks > 0 {
                    track.wait_ticks -= 1;
                }
            }

            let mut budget = MAX_EVENTS_PER_TICK;
            loop {
                let track = &self.seq.tracks[idx];
                if !track.enabled || track.wait_ticks > 0 {
                    break;
                }
                if budget == 0 {
                    warn!(track = idx, "bytecode loops without a wait, halting track");
                    self.halt_track(idx);
                    break;
                }
                budget -= 1;
                self.dispatch_event(idx);
            }

            let track = &mut self.seq.tracks[idx];
            track.step_lfo();
            track.tick_count += 1;
            let vol = track.output_volume();
            let pan = track.output_pan();
            let cents = track.pitch_cents();
            for v in self.voices.iter_mut().filter(|v| v.track_index() == idx) {
                v.set_volume(vol, pan);
                v.set_pitch(cents);
            }
        }

        for v in &mut self.voices {
            if v.age() < tick_start_age {
                v.tick_gate();
            }
        }
        self.seq.tick += 1;
    }

    /// Halt a track and release whatever it still has sounding.
    fn halt_track(&mut self, idx: usize) {
        self.seq.tracks[idx].halt();
        for v in self.voices.iter_mut().filter(|v| v.track_index() == idx) {
            v.release(false);
        }
    }

    /// Read one event at the track's program counter and apply it.
    fn dispatch_event(&mut self, idx: usize) {
        let rom = Arc::clone(self.seq.rom());

        let cmd = {
            let track = &mut self.seq.tracks[idx];
            let byte = match rom.read_u8(track.pos) {
                Ok(b) => b,
                Err(e) => {
                    warn!(track = idx, error = %e, "sequence read past ROM end");
                    self.halt_track(idx);
                    return;
                }
            };
            if byte < 0x80 {
                // Running status: re-dispatch the previous command, the data
                // byte stays in place as its first operand.
                if track.last_cmd < 0x80 {
                    warn!(track = idx, pos = track.pos, "data byte without running status");
                    self.halt_track(idx);
                    return;
                }
                track.last_cmd
            } else {
                track.pos += 1;
                if byte >= CMD_VOICE {
                    track.last_cmd = byte;
                }
                byte
            }
        };

        match cmd {
            CMD_WAIT_BASE..=0xB0 => {
                let ticks = LENGTH_TABLE[(cmd - CMD_WAIT_BASE) as usize] as u32;
                self.seq.tracks[idx].wait_ticks = ticks;
            }
            CMD_FINE => {
                self.halt_track(idx);
            }
            CMD_GOTO => match self.read_pointer_operand(idx) {
                Some(target) => {
                    let track = &mut self.seq.tracks[idx];
                    track.goto_count += 1;
                    let over_limit = self
                        .loop_limit
                        .is_some_and(|limit| track.goto_count > limit);
                    if over_limit {
                        self.halt_track(idx);
                    } else {
                        self.seq.tracks[idx].pos = target;
                    }
                }
                None => self.halt_track(idx),
            },
            CMD_PATT => match self.read_pointer_operand(idx) {
                Some(target) => {
                    let track = &mut self.seq.tracks[idx];
                    let return_pos = track.pos;
                    if track.push_call(return_pos) {
                        track.pos = target;
                    } else {
                        warn!(track = idx, "pattern call stack overflow");
                        self.halt_track(idx);
                    }
                }
                None => self.halt_track(idx),
            },
            CMD_PEND => {
                let track = &mut self.seq.tracks[idx];
                if let Some(return_pos) = track.pop_call() {
                    track.pos = return_pos;
                } else {
                    // A stray PEND outside a pattern is ignored, matching the
                    // driver.
                    debug!(track = idx, "PEND without pattern call");
                }
            }
            CMD_PRIO => {
                if let Some(prio) = self.read_byte_operand(idx) {
                    self.seq.tracks[idx].priority = prio;
                }
            }
            CMD_TEMPO => {
                if let Some(half_bpm) = self.read_byte_operand(idx) {
                    self.seq.bpm = half_bpm as u16 * 2;
                }
            }
            CMD_KEYSH => {
                if let Some(shift) = self.read_byte_operand_raw(idx) {
                    self.seq.tracks[idx].keyshift = shift as i8;
                }
            }
            CMD_VOICE => {
                if let Some(program) = self.read_byte_operand(idx) {
                    self.seq.tracks[idx].program = program;
                }
            }
            CMD_VOL => {
                if let Some(vol) = self.read_byte_operand(idx) {
                    self.seq.tracks[idx].vol = vol;
                }
            }
            CMD_PAN => {
                if let Some(pan) = self.read_byte_operand(idx) {
                    self.seq.tracks[idx].pan = pan.wrapping_sub(OPERAND_CENTER) as i8;
                }
            }
            CMD_BEND => {
                if let Some(bend) = self.read_byte_operand(idx) {
                    self.seq.tracks[idx].bend = bend.wrapping_sub(OPERAND_CENTER) as i8;
                }
            }
            CMD_BENDR => {
                if let Some(range) = self.read_byte_operand(idx) {
                    self.seq.tracks[idx].bend_range = range;
                }
            }
            CMD_LFOS => {
                if let Some(speed) = self.read_byte_operand(idx) {
                    self.seq.tracks[idx].lfo_speed = speed;
                }
            }
            CMD_LFODL => {
                if let Some(delay) = self.read_byte_operand(idx) {
                    self.seq.tracks[idx].lfo_delay = delay;
                }
            }
            CMD_MOD => {
                if let Some(depth) = self.read_byte_operand(idx) {
                    self.seq.tracks[idx].mod_depth = depth;
                }
            }
            CMD_MODT => {
                if let Some(target) = self.read_byte_operand(idx) {
                    self.seq.tracks[idx].mod_target = match target {
                        1 => crate::track::ModTarget::Volume,
                        2 => crate::track::ModTarget::Pan,
                        _ => crate::track::ModTarget::Pitch,
                    };
                }
            }
            CMD_TUNE => {
                if let Some(tune) = self.read_byte_operand(idx) {
                    self.seq.tracks[idx].tune = tune.wrapping_sub(OPERAND_CENTER) as i8;
                }
            }
            CMD_XCMD => {
                // Extension command: sub-command byte plus one argument.
                // Pseudo-echo and the other extensions have no audible
                // counterpart here; parse and skip.
                let _ = self.read_byte_operand(idx);
                let _ = self.read_byte_operand(idx);
            }
            CMD_EOT => {
                let key = self.read_optional_operand(idx);
                self.end_of_tie(idx, key);
            }
            CMD_TIE => {
                if let Some(note) = self.read_note_operands(idx, -1) {
                    self.play_note(idx, note);
                }
            }
            CMD_NOTE_BASE..=0xFF => {
                let gate = LENGTH_TABLE[(cmd - CMD_NOTE_BASE) as usize + 1] as i16;
                if let Some(note) = self.read_note_operands(idx, gate) {
                    self.play_note(idx, note);
                }
            }
            _ => {
                warn!(track = idx, "unknown sequence command 0x{cmd:02X}");
                self.halt_track(idx);
            }
        }
    }

    /// Read a mandatory data-byte operand (< 0x80). Halts the track on a
    /// truncated or malformed stream and returns `None`.
    fn read_byte_operand(&mut self, idx: usize) -> Option<u8> {
        let byte = self.read_byte_operand_raw(idx)?;
        if byte >= 0x80 {
            warn!(track = idx, "command byte where operand expected");
            self.halt_track(idx);
            return None;
        }
        Some(byte)
    }

    /// Read a mandatory operand byte without the data-byte range check
    /// (KEYSH is signed and may legitimately be >= 0x80).
    fn read_byte_operand_raw(&mut self, idx: usize) -> Option<u8> {
        let rom = Arc::clone(self.seq.rom());
        let track = &mut self.seq.tracks[idx];
        match rom.read_u8(track.pos) {
            Ok(byte) => {
                track.pos += 1;
                Some(byte)
            }
            Err(e) => {
                warn!(track = idx, error = %e, "operand read past ROM end");
                self.halt_track(idx);
                None
            }
        }
    }

    /// Peek the next byte and consume it only if it is a data byte.
    fn read_optional_operand(&mut self, idx: usize) -> Option<u8> {
        let rom = Arc::clone(self.seq.rom());
        let track = &mut self.seq.tracks[idx];
        match rom.read_u8(track.pos) {
            Ok(byte) if byte < 0x80 => {
                track.pos += 1;
                Some(byte)
            }
            _ => None,
        }
    }

    /// Read a 4-byte AGB pointer operand.
    fn read_pointer_operand(&mut self, idx: usize) -> Option<usize> {
        let rom = Arc::clone(self.seq.rom());
        let track = &mut self.seq.tracks[idx];
        match rom.read_pointer(track.pos) {
            Ok(target) => {
                track.pos += 4;
                Some(target)
            }
            Err(e) => {
                warn!(track = idx, error = %e, "bad pointer operand");
                None
            }
        }
    }

    /// Parse the optional key / velocity / extra-length operands of a NOTE
    /// or TIE command, falling back to the running-status memory.
    fn read_note_operands(&mut self, idx: usize, gate: i16) -> Option<Note> {
        let mut gate = gate;
        let (key, vel) = {
            match self.read_optional_operand(idx) {
                Some(key) => {
                    self.seq.tracks[idx].last_key = key;
                    match self.read_optional_operand(idx) {
                        Some(vel) => {
                            self.seq.tracks[idx].last_vel = vel;
                            if gate > 0 {
                                if let Some(extra) = self.read_optional_operand(idx) {
                                    gate += extra as i16;
                                }
                            }
                            (key, vel)
                        }
                        None => (key, self.seq.tracks[idx].last_vel),
                    }
                }
                None => {
                    let track = &self.seq.tracks[idx];
                    (track.last_key, track.last_vel)
                }
            }
        };
        Some(Note::new(key, vel, gate))
    }

    /// Release tied voices on `idx`; with a key operand only the matching
    /// ones, otherwise all of them.
    fn end_of_tie(&mut self, idx: usize, key: Option<u8>) {
        let shifted = key.map(|k| {
            (k as i32 + self.seq.tracks[idx].keyshift as i32).clamp(0, 127) as u8
        });
        for v in self.voices.iter_mut() {
            if v.track_index() != idx || !v.note().is_tie() {
                continue;
            }
            if shifted.is_none() || shifted == Some(v.note().midi_key) {
                v.release(false);
            }
        }
    }

    /// Resolve the instrument and allocate a voice for `note`.
    fn play_note(&mut self, idx: usize, note: Note) {
        let (program, muted, vol, pan, cents, priority, keyshift) = {
            let t = &self.seq.tracks[idx];
            (
                t.program,
                t.muted,
                t.output_volume(),
                t.output_pan(),
                t.pitch_cents(),
                t.priority,
                t.keyshift,
            )
        };
        if muted {
            return;
        }

        let key = (note.midi_key as i32 + keyshift as i32).clamp(0, 127) as u8;
        let selection = match self.seq.bank().select(program, key) {
            Ok(sel) => sel,
            Err(e) => {
                warn!(track = idx, program, error = %e, "instrument lookup failed");
                self.halt_track(idx);
                return;
            }
        };

        let note = Note {
            midi_key: selection.key_override.unwrap_or(key),
            ..note
        };
        let params = VoiceParams {
            track_idx: idx,
            note,
            adsr: selection.adsr,
            vol,
            pan,
            inst_pan: selection.pan.unwrap_or(0),
            pitch_cents: cents,
            age: self.next_age,
            priority,
        };

        let voice: Box<dyn Voice> = match selection.source {
            VoiceSource::Cgb { kind, def } => {
                // Hardware-accurate preemption: a track owns one voice per
                // CGB channel, the newcomer fast-releases the incumbent.
                for v in self.voices.iter_mut() {
                    if v.track_index() == idx && v.cgb_kind() == Some(kind) {
                        v.release(true);
                    }
                }
                match def {
                    CgbDef::Square(duty) => Box::new(SquareVoice::new(params, kind, duty)),
                    CgbDef::Wave(data) => Box::new(WaveVoice::new(params, data)),
                    CgbDef::Noise(pattern) => Box::new(NoiseVoice::new(params, pattern)),
                }
            }
            VoiceSource::Pcm {
                sample,
                fixed_pitch,
            } => {
                if !self.reclaim_pcm_slot() {
                    debug!(track = idx, key = note.midi_key, "polyphony limit, note dropped");
                    return;
                }
                Box::new(PcmVoice::new(params, sample, fixed_pitch, self.cfg.resampler))
            }
        };

        self.next_age += 1;
        self.voices.push(voice);
        self.seq.tracks[idx].restart_lfo();
    }

    /// Make room for one more PCM voice.
    ///
    /// Within budget nothing happens. Over budget the oldest, lowest-priority
    /// *released* voice is cut; a voice still in attack or sustain is never
    /// preempted, in which case the new note loses instead.
    fn reclaim_pcm_slot(&mut self) -> bool {
        let pcm_count = self
            .voices
            .iter()
            .filter(|v| v.cgb_kind().is_none() && v.state() != EnvState::Dead)
            .count();
        if pcm_count < self.cfg.polyphony_limit as usize {
            return true;
        }

        let candidate = self
            .voices
            .iter_mut()
            .filter(|v| v.cgb_kind().is_none() && v.state() == EnvState::Release)
            .min_by_key(|v| (v.priority(), v.age()));
        match candidate {
            Some(v) => {
                v.kill();
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ReverbKind;

    /// Assemble a ROM with a song header at offset 0, a voicegroup holding a
    /// single 50% square instrument, and the given track bytecode streams.
    fn make_rom(tracks: &[&[u8]]) -> Arc<Rom> {
        let header_len = 8 + 4 * tracks.len();
        let voicegroup_pos = header_len;
        let mut track_pos = voicegroup_pos + 12;

        let mut data = Vec::new();
        data.push(tracks.len() as u8);
        data.push(1); // blocks
        data.push(0); // priority
        data.push(0); // reverb
        data.extend_from_slice(&(0x0800_0000u32 + voicegroup_pos as u32).to_le_bytes());
        for t in tracks {
            data.extend_from_slice(&(0x0800_0000u32 + track_pos as u32).to_le_bytes());
            track_pos += t.len();
        }
        // Voicegroup entry 0: square 1, 50% duty, sustained envelope.
        let mut entry = [0u8; 12];
        entry[0] = 0x01;
        entry[4..8].copy_from_slice(&2u32.to_le_bytes());
        entry[8..12].copy_from_slice(&[255, 0, 255, 165]);
        data.extend_from_slice(&entry);
        for t in tracks {
            data.extend_from_slice(t);
        }
        Arc::new(Rom::new(data))
    }

    fn generator(tracks: &[&[u8]]) -> StreamGenerator {
        let cfg = PlayerConfig {
            reverb: ReverbKind::None,
            ..PlayerConfig::default()
        };
        StreamGenerator::new(make_rom(tracks), 0, cfg).unwrap()
    }

    #[test]
    fn test_silent_track_ends_immediately() {
        let mut gen = generator(&[&[0xB1]]);
        let blocks = gen.process_and_get_audio().unwrap();
        assert_eq!(blocks.len(), 1);
        assert!(blocks[0].iter().all(|&s| s == 0.0));
        assert!(gen.has_stream_ended());
    }

    #[test]
    fn test_block_shape() {
        let mut gen = generator(&[&[0xB1], &[0xB1]]);
        let unit = gen.buffer_unit_count();
        let blocks = gen.process_and_get_audio().unwrap();
        assert_eq!(blocks.len(), 2);
        for b in blocks {
            assert_eq!(b.len(), 2 * unit);
        }
    }

    #[test]
    fn test_note_produces_audio_then_stream_ends() {
        // VOICE 0, VOL 127, N24 key 60 vel 127, WAIT 24, FINE
        let song: &[u8] = &[0xBD, 0, 0xBE, 127, 0xE7, 60, 127, 0x98, 0xB1];
        let mut gen = generator(&[song]);

        let blocks = gen.process_and_get_audio().unwrap();
        assert!(
            blocks[0].iter().any(|&s| s != 0.0),
            "first block of a note should be audible"
        );

        let mut ended = false;
        for _ in 0..600 {
            gen.process_and_get_audio().unwrap();
            if gen.has_stream_ended() {
                ended = true;
                break;
            }
        }
        assert!(ended, "stream never ended");
    }

    #[test]
    fn test_running_status_repeats_notes() {
        // One explicit note, then two running-status notes (bare data bytes).
        let song: &[u8] = &[
            0xBD, 0, 0xBE, 127, //
            0xD0, 60, 100, // N01 c4
            0x81, // W01
            62, // running status: N01 d4
            0x81, // W01
            64, // running status: N01 e4
            0x98, // W24
            0xB1,
        ];
        let mut gen = generator(&[song]);
        let mut peak_early = 0.0f32;
        for _ in 0..8 {
            let blocks = gen.process_and_get_audio().unwrap();
            peak_early = blocks[0].iter().fold(peak_early, |m, &s| m.max(s.abs()));
        }
        assert!(peak_early > 0.0);
        assert!(!gen.sequence().tracks[0].enabled || gen.sequence().tracks[0].wait_ticks > 0);
    }

    #[test]
    fn test_tempo_halves_wait_blocks() {
        // Same 24-tick wait at 75 and 150 bpm; the faster song must finish
        // in roughly half the blocks.
        let slow: &[u8] = &[0x98, 0xB1]; // W24, FINE
        let fast: &[u8] = &[0xBB, 75, 0x98, 0xB1]; // TEMPO 150bpm, W24, FINE

        let count_blocks = |song: &[u8]| {
            let mut gen = generator(&[song]);
            let mut blocks = 0;
            while !gen.has_stream_ended() {
                gen.process_and_get_audio().unwrap();
                blocks += 1;
                assert!(blocks < 10_000);
            }
            blocks
        };

        let slow_blocks = count_blocks(slow);
        let fast_blocks = count_blocks(fast);
        assert!(
            (slow_blocks as f64 / fast_blocks as f64 - 2.0).abs() < 0.2,
            "expected ~2x: slow={slow_blocks} fast={fast_blocks}"
        );
    }

    #[test]
    fn test_goto_loops_forever() {
        // W24 then GOTO back to the wait: the stream must never end.
        let mut song = vec![0x98u8];
        song.push(0xB2);
        // Track data starts at header(12) + voicegroup(12) = 24
        song.extend_from_slice(&(0x0800_0000u32 + 24).to_le_bytes());
        let mut gen = generator(&[&song]);
        for _ in 0..200 {
            gen.process_and_get_audio().unwrap();
        }
        assert!(!gen.has_stream_ended());
        assert!(gen.sequence().tracks[0].enabled);
    }

    #[test]
    fn test_unknown_command_halts_track_only() {
        // Track 0 hits a reserved opcode, track 1 plays on.
        let bad: &[u8] = &[0xB7, 0xB1];
        let good: &[u8] = &[0x98, 0x98, 0xB1];
        let mut gen = generator(&[bad, good]);
        gen.process_and_get_audio().unwrap();
        assert!(!gen.sequence().tracks[0].enabled);
        assert!(gen.sequence().tracks[1].enabled);
        assert!(!gen.has_stream_ended());
    }

    #[test]
    fn test_pattern_call_and_return() {
        // PATT to a shared lick, then FINE after the return.
        // Layout: track starts at 24.
        //   24: PATT -> 31
        //   29: W24 (0x98)
        //   30: FINE
        //   31: pattern body: VOL 127, PEND
        let mut song = vec![0xB3u8];
        song.extend_from_slice(&(0x0800_0000u32 + 31).to_le_bytes());
        song.push(0x98); // returns here: W24
        song.push(0xB1); // FINE
        song.extend_from_slice(&[0xBE, 127, 0xB4]); // pattern body at 31
        let mut gen = generator(&[&song]);
        gen.process_and_get_audio().unwrap();
        assert_eq!(gen.sequence().tracks[0].vol, 127, "pattern body executed");
        assert!(gen.sequence().tracks[0].enabled);
        // Let the wait elapse; the FINE after the return must end the song.
        for _ in 0..200 {
            gen.process_and_get_audio().unwrap();
        }
        assert!(gen.has_stream_ended());
    }

    #[test]
    fn test_reset_replays_identically() {
        let song: &[u8] = &[0xBD, 0, 0xBE, 127, 0xE7, 60, 127, 0x98, 0xB1];
        let mut gen = generator(&[song]);
        let first: Vec<f32> = gen.process_and_get_audio().unwrap()[0].clone();
        for _ in 0..10 {
            gen.process_and_get_audio().unwrap();
        }
        gen.reset();
        let replay: Vec<f32> = gen.process_and_get_audio().unwrap()[0].clone();
        assert_eq!(first, replay, "reset playback must be bit-identical");
    }
}
