//! WAV rendering via hound.
//!
//! Drives the stream generator block by block until the song ends (or the
//! configured caps kick in) and writes the result as 16-bit stereo WAV,
//! either as one master mix or as one file per track.

use std::path::Path;

use super::{apply_fade_out, normalize_samples, ExportConfig};
use crate::generator::StreamGenerator;
use crate::{Mp2kError, Result};

/// Render the song to a single stereo WAV file (all tracks summed).
///
/// The generator is reset first, so the render always covers the song from
/// the start.
///
/// # Examples
///
/// ```no_run
/// use std::sync::Arc;
/// use mp2k::export::{render_song_to_wav, ExportConfig};
/// use mp2k::{PlayerConfig, Rom, StreamGenerator};
///
/// # fn main() -> mp2k::Result<()> {
/// let rom = Arc::new(Rom::new(std::fs::read("game.gba")?));
/// let song = rom.song_table_entry(0x08F2_0000, 7)?;
/// let mut gen = StreamGenerator::new(rom, song, PlayerConfig::default())?;
/// render_song_to_wav(&mut gen, "song007.wav", ExportConfig::default().fade_out(2.0))?;
/// # Ok(())
/// # }
/// ```
pub fn render_song_to_wav<P: AsRef<Path>>(
    gen: &mut StreamGenerator,
    path: P,
    config: ExportConfig,
) -> Result<()> {
    let mut master = render_master(gen, &config)?;
    post_process(&mut master, gen.sample_rate(), &config);
    write_wav(path.as_ref(), &master, gen.sample_rate())
}

/// Render the song to one WAV file per track.
///
/// Files are named `<base>.00.wav`, `<base>.01.wav`, ... next to `base`.
pub fn render_tracks_to_wav<P: AsRef<Path>>(
    gen: &mut StreamGenerator,
    base: P,
    config: ExportConfig,
) -> Result<()> {
    let mut per_track = render_split(gen, &config)?;
    let base = base.as_ref();
    for (i, samples) in per_track.iter_mut().enumerate() {
        post_process(samples, gen.sample_rate(), &config);
        let mut name = base.as_os_str().to_os_string();
        name.push(format!(".{i:02}.wav"));
        write_wav(Path::new(&name), samples, gen.sample_rate())?;
    }
    Ok(())
}

fn block_budget(gen: &StreamGenerator, config: &ExportConfig) -> usize {
    let blocks_per_second = gen.sample_rate() as f32 / gen.buffer_unit_count() as f32;
    (config.max_seconds * blocks_per_second) as usize
}

fn render_master(gen: &mut StreamGenerator, config: &ExportConfig) -> Result<Vec<f32>> {
    gen.reset();
    gen.set_loop_limit(Some(config.loop_limit));

    let block_len = 2 * gen.buffer_unit_count();
    let mut master = Vec::new();
    let mut block = vec![0.0f32; block_len];
    for _ in 0..block_budget(gen, config) {
        if gen.has_stream_ended() {
            break;
        }
        gen.process_and_get_audio()?;
        gen.mix_master_into(&mut block);
        master.extend_from_slice(&block);
    }
    Ok(master)
}

fn render_split(gen: &mut StreamGenerator, config: &ExportConfig) -> Result<Vec<Vec<f32>>> {
    gen.reset();
    gen.set_loop_limit(Some(config.loop_limit));

    let track_count = gen.sequence().tracks.len();
    let mut streams = vec![Vec::new(); track_count];
    for _ in 0..block_budget(gen, config) {
        if gen.has_stream_ended() {
            break;
        }
        let blocks = gen.process_and_get_audio()?;
        for (stream, block) in streams.iter_mut().zip(blocks.iter()) {
            stream.extend_from_slice(block);
        }
    }
    Ok(streams)
}

fn post_process(samples: &mut [f32], sample_rate: u32, config: &ExportConfig) {
    if config.normalize {
        normalize_samples(samples);
    }
    if config.fade_out > 0.0 {
        apply_fade_out(samples, config.fade_out, sample_rate);
    }
}

fn write_wav(path: &Path, samples: &[f32], sample_rate: u32) -> Result<()> {
    let spec = hound::WavSpec {
        channels: 2,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(path, spec)
        .map_err(|e| Mp2kError::Other(format!("failed to create {}: {e}", path.display())))?;
    for &s in samples {
        let value = (s.clamp(-1.0, 1.0) * i16::MAX as f32) as i16;
        writer
            .write_sample(value)
            .map_err(|e| Mp2kError::Other(format!("failed to write sample: {e}")))?;
    }
    writer
        .finalize()
        .map_err(|e| Mp2kError::Other(format!("failed to finalize WAV: {e}")))?;
    Ok(())
}
