//! Benchmarks for per-member channel mixing.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use std::sync::Arc;

use lan_voice_relay::{
    audio::Frame,
    channels::{ChannelRegistry, SessionId},
    constants::DEFAULT_BUFFER_SIZE,
    mixer::{mix_frames, Mixer},
};

fn frame_averaging(c: &mut Criterion) {
    let mut group = c.benchmark_group("mix_frames");

    for contributors in [1usize, 4, 16] {
        let frames: Vec<Frame> = (0..contributors)
            .map(|i| Frame::filled(DEFAULT_BUFFER_SIZE, 0.9 - i as f32 * 0.05))
            .collect();
        group.bench_with_input(
            BenchmarkId::from_parameter(contributors),
            &frames,
            |b, frames| b.iter(|| mix_frames(black_box(frames), DEFAULT_BUFFER_SIZE)),
        );
    }

    group.finish();
}

fn channel_pass(c: &mut Criterion) {
    let mut group = c.benchmark_group("mixer_pass");

    for members in [2usize, 8, 32] {
        let registry = Arc::new(ChannelRegistry::new());
        let joined: Vec<_> = (0..members)
            .map(|i| {
                let addr = format!("10.0.0.{}:5000", i + 1).parse().unwrap();
                registry.join("bench", SessionId::new(), addr).unwrap()
            })
            .collect();
        let mixer = Mixer::new(registry.clone(), DEFAULT_BUFFER_SIZE);
        let requester = joined[0].clone();
        let frame = Frame::filled(DEFAULT_BUFFER_SIZE, 0.25);

        group.bench_function(BenchmarkId::from_parameter(members), |b| {
            b.iter(|| {
                for member in &joined[1..] {
                    member.push_frame(frame.clone());
                }
                black_box(mixer.mix_for(&requester))
            })
        });
    }

    group.finish();
}

criterion_group!(benches, frame_averaging, channel_pass);
criterion_main!(benches);
