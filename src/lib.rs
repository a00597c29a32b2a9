//! MP2K (Sappy) Sound Engine Synthesizer
//!
//! A software renderer for the sound driver used by the majority of Game Boy
//! Advance titles. It interprets a ROM's sequence data and instrument tables
//! and synthesizes the result as floating-point PCM.
//!
//! # Features
//! - Tick-accurate sequence interpreter (24 PPQN, running status, pattern calls)
//! - PCM voices with nearest/linear/sinc resampling
//! - CGB-style square, programmable wave and LFSR noise voices
//! - Shared ADSR envelope engine with quarter-frame stepping
//! - Per-track stereo mixing with plain/GS/MGAT reverb
//! - Block streaming with back-pressure (ring buffer + audio device)
//! - WAV export of the master mix or individual tracks
//!
//! # Quick start
//! ```no_run
//! use std::sync::Arc;
//! use mp2k::{PlayerConfig, Rom, StreamGenerator};
//!
//! # fn main() -> mp2k::Result<()> {
//! let rom = Arc::new(Rom::new(std::fs::read("game.gba")?));
//! let song_pos = rom.song_table_entry(0x08F2_0000, 3)?;
//! let mut gen = StreamGenerator::new(rom, song_pos, PlayerConfig::default())?;
//! while !gen.has_stream_ended() {
//!     let tracks = gen.process_and_get_audio()?;
//!     // feed `tracks` to a mixer, file writer or audio device
//! }
//! # Ok(())
//! # }
//! ```
//!
//! The crate only produces audio blocks; song selection, configuration files
//! and user interaction are the caller's concern.

#![warn(missing_docs)]

pub mod constants;
mod tables;

mod config;
mod envelope;
mod instruments;
mod resampler;
mod rom;
mod types;

mod channels;
mod generator;
mod reverb;
mod sequence;
mod track;

pub mod export;
pub mod streaming;

/// Error types for the MP2K synthesizer.
///
/// Recoverable sequence-data problems are contained at the track level (the
/// offending track halts, the rest of the song keeps playing) and never show
/// up here; this enum covers the fatal cases that propagate to the caller.
#[derive(thiserror::Error, Debug)]
pub enum Mp2kError {
    /// IO error from the streaming or export path
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed ROM data that prevents playback from starting
    #[error("bad ROM data: {0}")]
    Data(String),

    /// Invalid player configuration
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl From<String> for Mp2kError {
    fn from(msg: String) -> Self {
        Mp2kError::Other(msg)
    }
}

impl From<&str> for Mp2kError {
    fn from(msg: &str) -> Self {
        Mp2kError::Other(msg.to_string())
    }
}

/// Result type for synthesizer operations
pub type Result<T> = std::result::Result<T, Mp2kError>;

// Public API exports
pub use channels::CgbKind;
pub use config::{PlayerConfig, ResamplerKind, ReverbKind};
pub use constants::{cgb_volume, sample_rate_for};
pub use generator::StreamGenerator;
pub use instruments::{InstrumentBank, VoiceSelection, VoiceSource};
pub use rom::Rom;
pub use sequence::{Sequence, SongInfo};
pub use track::{ModTarget, Track};
pub use types::{Adsr, CgbDef, EnvState, Note, NoisePattern, SampleInfo, WaveDuty};
