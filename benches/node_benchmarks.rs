use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use dasp_signal::Signal;
use schall::analysis::{Analyser, FrequencyBars, VolumeMeter};
use schall::nodes::{PlayerMessage, SamplePlayer};
use schall::{AudioRoot, DecodedAudio, OfflineDevice};

fn noise(frames: usize, channels: usize, rate: u32) -> Arc<DecodedAudio> {
    let samples = dasp_signal::noise(0x2545_f491).take(frames * channels).map(|s| s as f32).collect();
    Arc::new(DecodedAudio::new(samples, channels, rate))
}

fn playing_root(voices: usize, rate: u32) -> AudioRoot {
    let device = OfflineDevice::new(48000, 2).with_capacity(1 << 20);
    let mut root = AudioRoot::new(device);
    let context = root.ensure_context().unwrap();
    let audio = noise(48000 * 60, 2, rate);
    for _ in 0..voices {
        let mut source = context.add_source(SamplePlayer::new(Arc::clone(&audio))).unwrap();
        source.send(PlayerMessage::Start).unwrap();
    }
    root
}

pub fn criterion_benchmark(c: &mut Criterion) {
    c.bench_function("AudioContext.render(1) 16 voices", |b| {
        let mut root = playing_root(16, 48000);
        b.iter(|| black_box(root.context_mut().unwrap().render(1)))
    });

    c.bench_function("AudioContext.render(1) 16 voices resampled", |b| {
        let mut root = playing_root(16, 44100);
        b.iter(|| black_box(root.context_mut().unwrap().render(1)))
    });

    c.bench_function("Analyser.byte_frequency_data(2048)", |b| {
        let mut root = playing_root(1, 48000);
        let mut analyser = Analyser::new(2048, 0.3);
        analyser.sync(root.context_mut());
        let mut data = vec![0u8; analyser.frequency_bin_count()];
        b.iter(|| {
            root.context_mut().unwrap().render(1);
            analyser.byte_frequency_data(black_box(&mut data));
        })
    });

    c.bench_function("frame: meter + bars", |b| {
        let mut root = playing_root(4, 48000);
        let mut meter = VolumeMeter::new();
        let mut bars = FrequencyBars::new();
        b.iter(|| {
            root.context_mut().unwrap().render(12);
            black_box(meter.update(root.context_mut()));
            black_box(bars.update(root.context_mut(), 800.0));
        })
    });
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
