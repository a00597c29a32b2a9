//! Song header parsing and the sequencer track set.

use std::sync::Arc;

use crate::instruments::InstrumentBank;
use crate::rom::Rom;
use crate::track::Track;
use crate::{Mp2kError, Result};

/// Default tempo before any TEMPO command executes.
const DEFAULT_BPM: u16 = 75;

/// Parsed song header.
#[derive(Debug, Clone, Copy)]
pub struct SongInfo {
    /// Number of tracks actually instantiated (may be clamped by the
    /// configured track limit)
    pub track_count: u8,
    /// Driver block count (unused by the synthesizer, kept for display)
    pub block_count: u8,
    /// Base priority of the song's player
    pub priority: u8,
    /// Song reverb byte; bit 7 set means the low bits override the engine
    /// reverb level
    pub reverb: u8,
}

impl SongInfo {
    /// Per-song reverb level override, if the song requests one.
    pub fn reverb_override(&self) -> Option<u8> {
        if self.reverb & 0x80 != 0 {
            Some(self.reverb & 0x7F)
        } else {
            None
        }
    }
}

/// The set of tracks of one song plus global playback state.
///
/// The sequence owns its tracks exclusively; voices refer back to them by
/// index only.
#[derive(Debug)]
pub struct Sequence {
    rom: Arc<Rom>,
    song_pos: usize,
    info: SongInfo,
    bank: InstrumentBank,
    /// Sequencer tracks, index-stable for the lifetime of the song
    pub tracks: Vec<Track>,
    /// Current tempo in beats per minute
    pub bpm: u16,
    /// Global ticks elapsed
    pub tick: u64,
}

impl Sequence {
    /// Parse the song header at image offset `song_pos` and set up tracks.
    ///
    /// At most `track_limit` tracks are instantiated; extra header entries
    /// are ignored. A song with zero tracks is valid and immediately over.
    pub fn new(rom: Arc<Rom>, song_pos: usize, track_limit: u8) -> Result<Self> {
        let header_count = rom.read_u8(song_pos)?;
        let block_count = rom.read_u8(song_pos + 1)?;
        let priority = rom.read_u8(song_pos + 2)?;
        let reverb = rom.read_u8(song_pos + 3)?;

        let track_count = header_count.min(track_limit);
        let voicegroup_pos = if header_count > 0 {
            rom.read_pointer(song_pos + 4)?
        } else {
            // A trackless song never references its voicegroup
            0
        };

        let mut tracks = Vec::with_capacity(track_count as usize);
        for i in 0..track_count as usize {
            let pos = rom.read_pointer(song_pos + 8 + 4 * i).map_err(|e| {
                Mp2kError::Data(format!("track {i} pointer: {e}"))
            })?;
            let mut track = Track::new(pos);
            track.priority = priority;
            tracks.push(track);
        }

        let bank = InstrumentBank::new(Arc::clone(&rom), voicegroup_pos);
        Ok(Sequence {
            rom,
            song_pos,
            info: SongInfo {
                track_count,
                block_count,
                priority,
                reverb,
            },
            bank,
            tracks,
            bpm: DEFAULT_BPM,
            tick: 0,
        })
    }

    /// The ROM image this sequence reads from.
    pub fn rom(&self) -> &Arc<Rom> {
        &self.rom
    }

    /// The song's instrument bank.
    pub fn bank(&self) -> &InstrumentBank {
        &self.bank
    }

    /// Parsed header fields.
    pub fn info(&self) -> &SongInfo {
        &self.info
    }

    /// True once every track has halted (FINE or data error).
    pub fn all_tracks_done(&self) -> bool {
        self.tracks.iter().all(|t| !t.enabled)
    }

    /// Restart the song from the beginning.
    ///
    /// Rebuilds every track from the header and resets tempo and tick
    /// counters. Infallible: the header was validated at construction.
    pub fn reset(&mut self) {
        for (i, track) in self.tracks.iter_mut().enumerate() {
            let pos = self
                .rom
                .read_pointer(self.song_pos + 8 + 4 * i)
                .expect("validated at construction");
            let muted = track.muted;
            *track = Track::new(pos);
            track.priority = self.info.priority;
            track.muted = muted;
        }
        self.bpm = DEFAULT_BPM;
        self.tick = 0;
    }
}
