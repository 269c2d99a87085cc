//! Shared volume control

use crate::node::{AudioNode, Buffer, Input, ProcessContext};

/// Messages to control gain
#[derive(Clone, Copy, Debug)]
pub enum GainMessage {
    /// Set the gain (0.0 = silence, 1.0 = unity). Clamped to that range.
    SetGain(f32),
}

/// A volume control that passes audio through with amplitude scaling.
///
/// Every input is summed before scaling, so any number of sources can feed
/// it directly. Gain changes are smoothed per sample to avoid clicks.
pub struct Gain {
    channels: usize,
    gain: f32,
    smoothed_gain: f32,
    /// 0.0 = instant, closer to 1.0 = slower
    smooth_coeff: f32,
}

impl Gain {
    pub fn new(gain: f32, channels: usize) -> Self {
        let gain = gain.clamp(0.0, 1.0);
        Self {
            channels: channels.max(1),
            gain,
            smoothed_gain: gain,
            smooth_coeff: 0.995, // ~4ms at 48kHz
        }
    }

    /// Disable smoothing for instant gain changes
    pub fn without_smoothing(mut self) -> Self {
        self.smooth_coeff = 0.0;
        self
    }

    #[inline]
    pub fn gain(&self) -> f32 {
        self.gain
    }
}

impl AudioNode for Gain {
    type Message = GainMessage;

    fn process(
        &mut self,
        _ctx: &ProcessContext,
        messages: impl Iterator<Item = GainMessage>,
        inputs: &[Input],
        outputs: &mut [Buffer],
    ) {
        for msg in messages {
            match msg {
                GainMessage::SetGain(g) => self.gain = g.clamp(0.0, 1.0),
            }
        }

        outputs.iter_mut().for_each(Buffer::silence);
        for input in inputs {
            let in_buffers = input.buffers();
            if in_buffers.is_empty() {
                continue;
            }
            for (ch, out) in outputs.iter_mut().enumerate() {
                let src = &in_buffers[ch.min(in_buffers.len() - 1)];
                for (o, &s) in out.iter_mut().zip(src.iter()) {
                    *o += s;
                }
            }
        }

        let target = self.gain;
        let coeff = self.smooth_coeff;
        let mut end_gain = self.smoothed_gain;

        // every channel follows the same gain curve
        for out in outputs.iter_mut() {
            let mut gain = self.smoothed_gain;
            for sample in out.iter_mut() {
                gain = target + coeff * (gain - target);
                *sample *= gain;
            }
            end_gain = gain;
        }

        self.smoothed_gain = end_gain;
    }

    #[inline]
    fn num_inputs(&self) -> usize { 1 }

    #[inline]
    fn num_outputs(&self) -> usize {
        self.channels
    }
}
