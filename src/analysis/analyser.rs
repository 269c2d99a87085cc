//! Time- and frequency-domain snapshots of the post-gain signal.

use std::f32::consts::PI;
use std::sync::Arc;

use rustfft::num_complex::Complex;
use rustfft::{Fft, FftPlanner};

use crate::context::{AudioContext, ContextState, TapReader};

const MIN_DECIBELS: f32 = -100.0;
const MAX_DECIBELS: f32 = -30.0;

/// Reads a tap on the shared gain and produces byte-scaled snapshots.
///
/// Time-domain bytes map `-1.0..=1.0` onto `0..=255` with silence at 128.
/// Frequency bytes are Blackman-windowed FFT magnitudes, smoothed over time
/// and mapped from `-100..-30` dB onto `0..=255`.
///
/// Every buffer is sized at construction; taking a snapshot never allocates.
pub struct Analyser {
    fft_size: usize,
    smoothing: f32,
    reader: Option<TapReader>,

    history: Vec<f32>,
    write: usize,

    fft: Arc<dyn Fft<f32>>,
    window: Vec<f32>,
    spectrum: Vec<Complex<f32>>,
    scratch: Vec<Complex<f32>>,
    smoothed: Vec<f32>,
}

impl Analyser {
    /// `fft_size` is rounded up to a power of two of at least 32.
    /// `smoothing` (`0.0..1.0`) weighs the previous spectrum against the new one.
    pub fn new(fft_size: usize, smoothing: f32) -> Self {
        let fft_size = fft_size.max(32).next_power_of_two();
        let fft = FftPlanner::new().plan_fft_forward(fft_size);
        let scratch = vec![Complex::default(); fft.get_inplace_scratch_len()];

        let window = (0..fft_size)
            .map(|i| {
                let x = i as f32 / fft_size as f32;
                0.42 - 0.5 * (2.0 * PI * x).cos() + 0.08 * (4.0 * PI * x).cos()
            })
            .collect();

        Self {
            fft_size,
            smoothing: smoothing.clamp(0.0, 1.0),
            reader: None,
            history: vec![0.0; fft_size],
            write: 0,
            fft,
            window,
            spectrum: vec![Complex::default(); fft_size],
            scratch,
            smoothed: vec![0.0; fft_size / 2],
        }
    }

    pub fn fft_size(&self) -> usize {
        self.fft_size
    }

    pub fn frequency_bin_count(&self) -> usize {
        self.fft_size / 2
    }

    pub fn is_attached(&self) -> bool {
        self.reader.is_some()
    }

    /// Follow the root's current context: attach to a live one, drop the tap
    /// when the context is gone, closed, or replaced. Returns whether a tap
    /// is attached afterwards.
    pub fn sync(&mut self, context: Option<&mut AudioContext>) -> bool {
        match context {
            Some(context) if context.state() != ContextState::Closed => {
                let stale = self
                    .reader
                    .as_ref()
                    .map_or(true, |r| r.context() != context.id() || r.is_detached());
                if stale {
                    if let Some(old) = self.reader.take() {
                        context.detach_tap(old);
                    }
                    self.reset();
                    self.reader = context.attach_tap(self.fft_size * 8);
                }
            }
            _ => {
                if self.reader.take().is_some() {
                    self.reset();
                }
            }
        }
        self.reader.is_some()
    }

    /// Forget everything heard so far.
    pub fn reset(&mut self) {
        self.history.iter_mut().for_each(|s| *s = 0.0);
        self.smoothed.iter_mut().for_each(|s| *s = 0.0);
        self.write = 0;
    }

    /// Move whatever the tap delivered since the last call into the window.
    ///
    /// The snapshot methods do this themselves; call it directly on frames
    /// that take no snapshot so the tap does not fill up with stale audio.
    pub fn listen(&mut self) {
        let Some(reader) = self.reader.as_mut() else { return };
        let history = &mut self.history;
        let write = &mut self.write;
        let len = history.len();
        reader.drain(|sample| {
            history[*write] = sample;
            *write = (*write + 1) % len;
        });
    }

    /// Entry `i` of the sample window, oldest first.
    #[inline]
    fn windowed(&self, i: usize) -> f32 {
        self.history[(self.write + i) % self.fft_size]
    }

    /// Fill `out` with the oldest `out.len()` samples of the most recent
    /// `fft_size` samples.
    pub fn byte_time_domain_data(&mut self, out: &mut [u8]) {
        self.listen();
        for (i, byte) in out.iter_mut().take(self.fft_size).enumerate() {
            *byte = (128.0 * (1.0 + self.windowed(i))).floor().clamp(0.0, 255.0) as u8;
        }
    }

    /// Fill `out` with up to `fft_size / 2` frequency bins, lowest first.
    pub fn byte_frequency_data(&mut self, out: &mut [u8]) {
        self.listen();

        for i in 0..self.fft_size {
            self.spectrum[i] = Complex::new(self.windowed(i) * self.window[i], 0.0);
        }
        self.fft.process_with_scratch(&mut self.spectrum, &mut self.scratch);

        let norm = 1.0 / self.fft_size as f32;
        let tau = self.smoothing;
        for (smoothed, bin) in self.smoothed.iter_mut().zip(self.spectrum.iter()) {
            *smoothed = tau * *smoothed + (1.0 - tau) * bin.norm() * norm;
        }

        let scale = 255.0 / (MAX_DECIBELS - MIN_DECIBELS);
        for (byte, &magnitude) in out.iter_mut().zip(self.smoothed.iter()) {
            let db = 20.0 * magnitude.log10();
            *byte = (scale * (db - MIN_DECIBELS)).floor().clamp(0.0, 255.0) as u8;
        }
    }
}
