use std::path::{Path, PathBuf};

use assert_approx_eq::assert_approx_eq;
use schall::analysis::VolumeMeter;
use schall::{Decode, Error, Fetch, Fetcher, LoadStatus, OfflineDevice, Schall, Sound, SymphoniaDecoder, BLOCK_SIZE};

/// Write a WAV file holding `frames` frames of a constant `value`.
fn write_wav(dir: &Path, name: &str, sample_rate: u32, channels: u16, frames: usize, value: i16) -> PathBuf {
    let path = dir.join(name);
    let spec = hound::WavSpec {
        channels,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(&path, spec).unwrap();
    for _ in 0..frames * channels as usize {
        writer.write_sample(value).unwrap();
    }
    writer.finalize().unwrap();
    path
}

fn url(path: &Path) -> String {
    path.to_str().unwrap().to_owned()
}

#[tokio::test]
async fn decodes_a_wav_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_wav(dir.path(), "half.wav", 44100, 2, 4410, 16384);

    let bytes = Fetcher::new().fetch(&url(&path)).await.unwrap();
    let audio = SymphoniaDecoder.decode(bytes, Some("wav")).await.unwrap();

    assert_eq!(audio.sample_rate(), 44100);
    assert_eq!(audio.channels(), 2);
    assert_eq!(audio.frames(), 4410);
    assert_approx_eq!(audio.duration().as_secs_f32(), 0.1);
    assert!(audio.samples().iter().all(|&s| (s - 0.5).abs() < 1e-4));
}

#[tokio::test]
async fn loads_plays_and_reaps() {
    let dir = tempfile::tempdir().unwrap();
    let kick = url(&write_wav(dir.path(), "kick.wav", 48000, 1, BLOCK_SIZE * 10, 16384));
    let broken = dir.path().join("broken.wav");
    std::fs::write(&broken, b"RIFF but not really").unwrap();
    let broken = url(&broken);

    let device = OfflineDevice::new(48000, 2);
    let capture = device.capture();
    let mut schall = Schall::new(device).with_bank(vec![
        Sound { title: "Kick".into(), url: kick.clone() },
        Sound { title: "Broken".into(), url: broken.clone() },
    ]);

    let report = schall.preload(None).await;
    assert_eq!(report.loaded, vec![kick.clone()]);
    assert_eq!(report.failed, vec![broken.clone()]);
    let status = schall.status();
    assert!(matches!(status[0].1, LoadStatus::Loaded(info) if info.frames == BLOCK_SIZE * 10));
    assert_eq!(status[1].1, LoadStatus::Failed);

    schall.ensure_context().unwrap();
    assert_eq!(schall.play_many([&kick, &broken, &kick]).await, 2);

    let mut meter = VolumeMeter::new();
    meter.update(schall.root_mut().context_mut());

    schall.root_mut().context_mut().unwrap().render(4);
    let out = capture.drain();
    assert_eq!(out.len(), 4 * BLOCK_SIZE * 2);
    assert!(out.iter().all(|&s| (s - 1.0).abs() < 1e-4));
    assert_approx_eq!(meter.update(schall.root_mut().context_mut()), 1.0, 0.01);

    schall.set_volume(0.5);
    schall.root_mut().context_mut().unwrap().render(8);
    assert_eq!(schall.tick(), 2);
    assert!(schall.sessions().is_empty());

    let tail = capture.drain();
    assert!(tail[tail.len() - 1] == 0.0, "silent after both sessions ended");

    schall.close().await;
    assert_eq!(schall.state(), None);
}

#[tokio::test]
async fn foreign_rate_file_is_audible() {
    let dir = tempfile::tempdir().unwrap();
    let snare = url(&write_wav(dir.path(), "snare.wav", 44100, 2, 44100, 8192));

    let device = OfflineDevice::new(48000, 2);
    let capture = device.capture();
    let mut schall = Schall::new(device);
    schall.load([&snare]).await;

    schall.ensure_context().unwrap();
    schall.play(&snare).await.unwrap();
    schall.root_mut().context_mut().unwrap().render(32);

    let out = capture.drain();
    assert_approx_eq!(out[out.len() - 1], 0.25, 1e-3);
    assert_eq!(schall.tick(), 0);
    assert_eq!(schall.sessions().len(), 1);
}

#[tokio::test]
async fn missing_sound_is_not_played() {
    let mut schall = Schall::new(OfflineDevice::new(48000, 2));
    schall.ensure_context().unwrap();

    let report = schall.load(["/no/such/file.wav"]).await;
    assert_eq!(report.failed.len(), 1);
    assert!(matches!(schall.play("/no/such/file.wav").await, Err(Error::NotLoaded(_))));
    assert!(schall.sessions().is_empty());
}

#[tokio::test]
#[ignore = "needs an audio output device"]
#[cfg(feature = "cpal_sink")]
async fn plays_on_the_default_device() {
    let dir = tempfile::tempdir().unwrap();
    let path = url(&write_wav(dir.path(), "beep.wav", 48000, 1, 4800, 4096));

    use schall::CpalDevice;

    let device = CpalDevice::default_output().expect("no default output");
    let mut schall = Schall::new(device);
    schall.load([&path]).await;
    schall.ensure_context().unwrap();
    schall.play(&path).await.unwrap();

    while !schall.sessions().is_empty() {
        schall.tick();
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    schall.close().await;
}
