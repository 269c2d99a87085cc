use std::collections::VecDeque;

use tracing::debug;

use crate::context::AudioContext;

use super::surface::{Color, Surface};
use super::Analyser;

/// Peak amplitudes kept for display.
pub const HISTORY_LEN: usize = 500;

/// Peak deviation from the 128 midpoint over every 4th byte, scaled to
/// `0..=100`.
pub fn peak_amplitude(data: &[u8]) -> u8 {
    let peak = data
        .iter()
        .step_by(4)
        .map(|&b| (b as i16 - 128).unsigned_abs())
        .max()
        .unwrap_or(0);
    (peak as f32 / 128.0 * 100.0).round().min(100.0) as u8
}

/// Records a rolling history of peak amplitudes while recording is on and
/// draws it as a bar chart.
pub struct WaveformRecorder {
    analyser: Analyser,
    data: Vec<u8>,
    history: VecDeque<u8>,
    recording: bool,
}

impl Default for WaveformRecorder {
    fn default() -> Self {
        Self::new()
    }
}

impl WaveformRecorder {
    pub const FFT_SIZE: usize = 2048;
    pub const SMOOTHING: f32 = 0.3;

    pub fn new() -> Self {
        let analyser = Analyser::new(Self::FFT_SIZE, Self::SMOOTHING);
        Self {
            data: vec![128; analyser.fft_size()],
            analyser,
            history: VecDeque::with_capacity(HISTORY_LEN),
            recording: false,
        }
    }

    pub fn start(&mut self) {
        if !self.recording {
            debug!("waveform recording started");
        }
        self.recording = true;
    }

    pub fn stop(&mut self) {
        if self.recording {
            debug!(points = self.history.len(), "waveform recording stopped");
        }
        self.recording = false;
    }

    /// Drop the history and stop recording.
    pub fn reset(&mut self) {
        self.history.clear();
        self.recording = false;
    }

    pub fn is_recording(&self) -> bool {
        self.recording
    }

    /// Recorded peaks, oldest first.
    pub fn history(&self) -> &VecDeque<u8> {
        &self.history
    }

    /// Sample one peak if recording and redraw the whole history.
    ///
    /// Returns whether a frame was drawn: nothing is drawn while stopped or
    /// without a live context.
    pub fn render(&mut self, context: Option<&mut AudioContext>, surface: &mut impl Surface) -> bool {
        if !self.analyser.sync(context) {
            return false;
        }
        if !self.recording {
            self.analyser.listen();
            return false;
        }

        self.analyser.byte_time_domain_data(&mut self.data);
        self.record(peak_amplitude(&self.data));

        self.draw(surface);
        true
    }

    fn record(&mut self, amplitude: u8) {
        if self.history.len() == HISTORY_LEN {
            self.history.pop_front();
        }
        self.history.push_back(amplitude);
    }

    fn draw(&self, surface: &mut impl Surface) {
        let (width, height) = (surface.width(), surface.height());
        surface.clear(Color::BLACK);

        if !self.history.is_empty() {
            let bar_width = width / self.history.len() as f32;
            for (i, &amplitude) in self.history.iter().enumerate() {
                let h = amplitude as f32 / 100.0 * height * 0.9;
                surface.fill_rect(i as f32 * bar_width, height / 2.0 - h / 2.0, bar_width, h, Color::ORANGE);
            }
        }

        if self.recording {
            surface.fill_rect(width - 15.0, 5.0, 10.0, 10.0, Color::RED);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::surface::testing::Recorder;
    use crate::device::OfflineDevice;
    use crate::nodes::{PlayerMessage, SamplePlayer};
    use crate::{AudioRoot, DecodedAudio};
    use assert_approx_eq::assert_approx_eq;
    use std::sync::Arc;

    #[test]
    fn peak_scans_every_fourth_byte() {
        assert_eq!(peak_amplitude(&[]), 0);
        assert_eq!(peak_amplitude(&[128; 32]), 0);
        assert_eq!(peak_amplitude(&[128, 0, 0, 0, 192]), 50);
        assert_eq!(peak_amplitude(&[0]), 100);
        assert_eq!(peak_amplitude(&[255]), 99);
    }

    #[tokio::test]
    async fn records_only_while_recording() {
        let mut root = AudioRoot::new(OfflineDevice::new(48000, 1));
        let mut recorder = WaveformRecorder::new();
        let mut surface = Recorder::new(800.0, 200.0);

        let context = root.ensure_context().unwrap();
        let audio = Arc::new(DecodedAudio::new(vec![0.5; 48000], 1, 48000));
        let mut source = context.add_source(SamplePlayer::new(audio)).unwrap();
        source.send(PlayerMessage::Start).unwrap();

        assert!(!recorder.render(root.context_mut(), &mut surface));
        assert!(recorder.history().is_empty());

        recorder.start();
        root.context_mut().unwrap().render(40);
        assert!(recorder.render(root.context_mut(), &mut surface));
        assert_eq!(recorder.history().iter().copied().collect::<Vec<_>>(), vec![50]);

        // clear, one bar, indicator
        assert_eq!(surface.rects.len(), 3);
        let (x, y, w, h, color) = surface.rects[1];
        assert_eq!((x, w, color), (0.0, 800.0, Color::ORANGE));
        assert_approx_eq!(y, 55.0, 1e-3);
        assert_approx_eq!(h, 90.0, 1e-3);
        assert_eq!(surface.rects[2], (785.0, 5.0, 10.0, 10.0, Color::RED));

        recorder.stop();
        assert!(!recorder.render(root.context_mut(), &mut surface));
        assert_eq!(recorder.history().len(), 1);

        recorder.start();
        recorder.reset();
        assert!(!recorder.is_recording());
        assert!(recorder.history().is_empty());
    }

    #[test]
    fn full_history_drops_the_oldest() {
        let mut recorder = WaveformRecorder::new();
        for i in 0..HISTORY_LEN {
            recorder.record((i % 101) as u8);
        }
        assert_eq!(recorder.history().front(), Some(&0));

        recorder.record(42);
        assert_eq!(recorder.history().len(), HISTORY_LEN);
        assert_eq!(recorder.history().front(), Some(&1));
        assert_eq!(recorder.history().back(), Some(&42));
    }

    #[tokio::test]
    async fn history_is_capped() {
        let mut root = AudioRoot::new(OfflineDevice::new(48000, 1));
        root.ensure_context().unwrap();
        let mut recorder = WaveformRecorder::new();
        let mut surface = Recorder::new(800.0, 200.0);

        recorder.start();
        for _ in 0..HISTORY_LEN + 20 {
            recorder.render(root.context_mut(), &mut surface);
        }
        assert_eq!(recorder.history().len(), HISTORY_LEN);
    }
}
