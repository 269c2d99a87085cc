use crate::context::AudioContext;

use super::surface::{Color, Surface};
use super::Analyser;

/// One bar of the frequency display, in surface pixels.
#[derive(Clone, Copy, PartialEq, Debug)]
pub struct Bar {
    pub x: f32,
    pub width: f32,
    pub height: f32,
}

/// Lay out one bar per frequency bin across `width` pixels.
///
/// Bars are `2.5` bins wide so the upper (mostly quiet) bins run off the
/// right edge; each starts where the previous one ended. Heights are the
/// byte magnitude scaled by `0.8`.
pub fn compute_bars(data: &[u8], width: f32, bars: &mut Vec<Bar>) {
    bars.clear();
    if data.is_empty() {
        return;
    }
    let bar_width = (width / data.len() as f32) * 2.5;
    let mut x = 0.0;
    for &magnitude in data {
        bars.push(Bar {
            x,
            width: bar_width,
            height: magnitude as f32 * 0.8,
        });
        x += bar_width;
    }
}

/// Spectrum bars of the shared output, redrawn every display frame.
pub struct FrequencyBars {
    analyser: Analyser,
    data: Vec<u8>,
    bars: Vec<Bar>,
}

impl Default for FrequencyBars {
    fn default() -> Self {
        Self::new()
    }
}

impl FrequencyBars {
    pub const FFT_SIZE: usize = 128;
    pub const SMOOTHING: f32 = 0.8;

    pub fn new() -> Self {
        let analyser = Analyser::new(Self::FFT_SIZE, Self::SMOOTHING);
        let bins = analyser.frequency_bin_count();
        Self {
            analyser,
            data: vec![0; bins],
            bars: Vec::with_capacity(bins),
        }
    }

    /// Take a spectrum snapshot and lay it out across `width` pixels.
    /// Returns false, leaving the previous bars, when there is no live context.
    pub fn update(&mut self, context: Option<&mut AudioContext>, width: f32) -> bool {
        if !self.analyser.sync(context) {
            return false;
        }
        self.analyser.byte_frequency_data(&mut self.data);
        compute_bars(&self.data, width, &mut self.bars);
        true
    }

    pub fn bars(&self) -> &[Bar] {
        &self.bars
    }

    /// Update and paint: black background, white bars standing on the
    /// bottom edge. Draws nothing when there is no live context.
    pub fn draw(&mut self, context: Option<&mut AudioContext>, surface: &mut impl Surface) -> bool {
        if !self.update(context, surface.width()) {
            return false;
        }
        let height = surface.height();
        surface.clear(Color::BLACK);
        for bar in &self.bars {
            surface.fill_rect(bar.x, height - bar.height, bar.width, bar.height, Color::WHITE);
        }
        true
    }
}
