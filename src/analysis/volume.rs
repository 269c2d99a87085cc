use crate::context::AudioContext;

use super::Analyser;

/// Loudness of the shared output as a single `0.0..=1.0` value.
///
/// Call [`update`](Self::update) once per display frame. Without a live
/// context the level reads 0.
pub struct VolumeMeter {
    analyser: Analyser,
    data: Vec<u8>,
    level: f32,
}

impl Default for VolumeMeter {
    fn default() -> Self {
        Self::new()
    }
}

impl VolumeMeter {
    pub const FFT_SIZE: usize = 256;

    pub fn new() -> Self {
        let analyser = Analyser::new(Self::FFT_SIZE, 0.8);
        let data = vec![128; analyser.frequency_bin_count()];
        Self { analyser, data, level: 0.0 }
    }

    /// Take a fresh reading from the context's post-gain signal.
    pub fn update(&mut self, context: Option<&mut AudioContext>) -> f32 {
        self.level = if self.analyser.sync(context) {
            self.analyser.byte_time_domain_data(&mut self.data);
            rms(&self.data)
        } else {
            0.0
        };
        self.level
    }

    /// The most recent reading.
    pub fn level(&self) -> f32 {
        self.level
    }
}

/// Root mean square of time-domain bytes, where 128 is silence.
pub fn rms(data: &[u8]) -> f32 {
    if data.is_empty() {
        return 0.0;
    }
    let sum: f32 = data
        .iter()
        .map(|&b| {
            let v = (b as f32 - 128.0) / 128.0;
            v * v
        })
        .sum();
    (sum / data.len() as f32).sqrt()
}
