//! Benchmarks for the block renderer hot path
//!
//! Run with: cargo bench --bench generator

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use std::hint::black_box;
use std::sync::Arc;

use mp2k::{PlayerConfig, ResamplerKind, ReverbKind, Rom, StreamGenerator};

/// Build a looping test song: `voices` square notes spread over as many
/// tracks, each looping a four-beat phrase forever.
fn looping_rom(voices: usize) -> Arc<Rom> {
    const VOICEGROUP: usize = 0x100;
    const TRACK_BASE: usize = 0x200;
    const TRACK_STRIDE: usize = 0x40;

    let mut data = vec![0u8; TRACK_BASE + voices * TRACK_STRIDE];
    data[0] = voices as u8;
    data[1] = 1;
    data[4..8].copy_from_slice(&(0x0800_0000u32 + VOICEGROUP as u32).to_le_bytes());

    // Voicegroup entry 0: 50% square, sustained, short release.
    let entry_pos = VOICEGROUP;
    data[entry_pos] = 0x01;
    data[entry_pos + 4..entry_pos + 8].copy_from_slice(&2u32.to_le_bytes());
    data[entry_pos + 8..entry_pos + 12].copy_from_slice(&[255, 0, 255, 64]);

    for i in 0..voices {
        let pos = TRACK_BASE + i * TRACK_STRIDE;
        data[8 + 4 * i..12 + 4 * i].copy_from_slice(&(0x0800_0000u32 + pos as u32).to_le_bytes());
        let key = 48 + (i as u8 % 24);
        let body = [
            0xBD, 0, // VOICE 0
            0xBE, 112, // VOL
            0xE7, key, 120, // N24
            0x98, // W24
        ];
        data[pos..pos + body.len()].copy_from_slice(&body);
        // GOTO back to the note
        let note_pos = 0x0800_0000u32 + (pos + 4) as u32;
        data[pos + body.len()] = 0xB2;
        data[pos + body.len() + 1..pos + body.len() + 5].copy_from_slice(&note_pos.to_le_bytes());
    }
    Arc::new(Rom::new(data))
}

fn bench_block_rendering(c: &mut Criterion) {
    let mut group = c.benchmark_group("process_block");

    for &voices in [1usize, 4, 8].iter() {
        let cfg = PlayerConfig {
            reverb: ReverbKind::Normal,
            engine_rev: 64,
            ..PlayerConfig::default()
        };
        let mut gen = StreamGenerator::new(looping_rom(voices), 0, cfg).unwrap();
        // Warm up past the first notes so the pool is populated.
        for _ in 0..8 {
            gen.process_and_get_audio().unwrap();
        }
        group.bench_with_input(BenchmarkId::from_parameter(voices), &voices, |b, _| {
            b.iter(|| {
                black_box(gen.process_and_get_audio().unwrap());
            });
        });
    }

    group.finish();
}

/// One track looping a PCM note over a 2000-sample looped sample.
fn pcm_rom() -> Arc<Rom> {
    const VOICEGROUP: usize = 0x100;
    const TRACK: usize = 0x200;
    const SAMPLE: usize = 0x300;
    const SAMPLE_LEN: u32 = 2000;

    let mut data = vec![0u8; SAMPLE + 16 + SAMPLE_LEN as usize];
    data[0] = 1;
    data[1] = 1;
    data[4..8].copy_from_slice(&(0x0800_0000u32 + VOICEGROUP as u32).to_le_bytes());
    data[8..12].copy_from_slice(&(0x0800_0000u32 + TRACK as u32).to_le_bytes());

    data[VOICEGROUP] = 0x00;
    data[VOICEGROUP + 4..VOICEGROUP + 8]
        .copy_from_slice(&(0x0800_0000u32 + SAMPLE as u32).to_le_bytes());
    data[VOICEGROUP + 8..VOICEGROUP + 12].copy_from_slice(&[255, 0, 255, 64]);

    data[SAMPLE..SAMPLE + 4].copy_from_slice(&0x4000_0000u32.to_le_bytes());
    data[SAMPLE + 4..SAMPLE + 8].copy_from_slice(&(15768u32 * 1024).to_le_bytes());
    data[SAMPLE + 8..SAMPLE + 12].copy_from_slice(&0u32.to_le_bytes());
    data[SAMPLE + 12..SAMPLE + 16].copy_from_slice(&SAMPLE_LEN.to_le_bytes());
    for i in 0..SAMPLE_LEN as usize {
        data[SAMPLE + 16 + i] = ((i * 13) % 251) as u8;
    }

    let body = [0xBD, 0, 0xBE, 112, 0xE7, 60, 120, 0x98];
    data[TRACK..TRACK + body.len()].copy_from_slice(&body);
    let note_pos = 0x0800_0000u32 + (TRACK + 4) as u32;
    data[TRACK + body.len()] = 0xB2;
    data[TRACK + body.len() + 1..TRACK + body.len() + 5].copy_from_slice(&note_pos.to_le_bytes());
    Arc::new(Rom::new(data))
}

fn bench_resampler_kinds(c: &mut Criterion) {
    let mut group = c.benchmark_group("resampler");

    for (name, kind) in [
        ("nearest", ResamplerKind::Nearest),
        ("linear", ResamplerKind::Linear),
        ("sinc", ResamplerKind::Sinc),
    ] {
        let cfg = PlayerConfig {
            reverb: ReverbKind::None,
            resampler: kind,
            ..PlayerConfig::default()
        };
        let mut gen = StreamGenerator::new(pcm_rom(), 0, cfg).unwrap();
        for _ in 0..8 {
            gen.process_and_get_audio().unwrap();
        }
        group.bench_function(name, |b| {
            b.iter(|| {
                black_box(gen.process_and_get_audio().unwrap());
            });
        });
    }

    group.finish();
}

fn bench_master_mixdown(c: &mut Criterion) {
    let cfg = PlayerConfig::default();
    let mut gen = StreamGenerator::new(looping_rom(8), 0, cfg).unwrap();
    let mut master = vec![0.0f32; 2 * gen.buffer_unit_count()];
    gen.process_and_get_audio().unwrap();

    c.bench_function("master_mixdown", |b| {
        b.iter(|| {
            gen.mix_master_into(black_box(&mut master));
        });
    });
}

criterion_group!(
    benches,
    bench_block_rendering,
    bench_resampler_kinds,
    bench_master_mixdown
);
criterion_main!(benches);
