//! Resampling source node
//!
//! Consumes interleaved audio from a ring buffer at one sample rate and
//! outputs it at the graph's sample rate. Bridges a per-rate sub-graph back
//! into the main graph.

use rtrb::Consumer;

use crate::node::{AudioNode, Buffer, Input, ProcessContext};

const MAX_CHANNELS: usize = 8;

/// Reads from a ring buffer and resamples to the graph's sample rate
/// using linear interpolation.
///
/// On underrun the rest of the block is silent and interpolation resumes
/// from the last frame once samples arrive again.
pub struct ResamplingSource {
    consumer: Consumer<f32>,
    channels: usize,
    input_sample_rate: u32,

    /// Fractional position between `prev` and `curr`
    position: f64,
    prev: [f32; MAX_CHANNELS],
    curr: [f32; MAX_CHANNELS],
    primed: bool,
}

impl ResamplingSource {
    /// - `consumer`: interleaved samples at `input_sample_rate`
    /// - `channels`: channels per frame in the ring (at most 8)
    pub fn new(consumer: Consumer<f32>, channels: usize, input_sample_rate: u32) -> Self {
        Self {
            consumer,
            channels: channels.clamp(1, MAX_CHANNELS),
            input_sample_rate,
            position: 0.0,
            prev: [0.0; MAX_CHANNELS],
            curr: [0.0; MAX_CHANNELS],
            primed: false,
        }
    }

    pub fn input_sample_rate(&self) -> u32 {
        self.input_sample_rate
    }

    /// Shift `curr` into `prev` and read the next frame into `curr`.
    fn next_frame(&mut self) -> bool {
        if self.consumer.slots() < self.channels {
            return false;
        }
        self.prev = self.curr;
        for ch in 0..self.channels {
            // slots() guaranteed a whole frame
            self.curr[ch] = self.consumer.pop().unwrap_or(0.0);
        }
        true
    }
}

impl AudioNode for ResamplingSource {
    type Message = ();

    fn process(
        &mut self,
        ctx: &ProcessContext,
        _messages: impl Iterator<Item = ()>,
        _inputs: &[Input],
        outputs: &mut [Buffer],
    ) {
        let ratio = self.input_sample_rate as f64 / ctx.sample_rate as f64;

        if !self.primed {
            self.primed = self.next_frame() && self.next_frame();
            if !self.primed {
                outputs.iter_mut().for_each(Buffer::silence);
                return;
            }
        }

        for i in 0..ctx.buffer_size {
            while self.position >= 1.0 {
                if !self.next_frame() {
                    for buffer in outputs.iter_mut() {
                        buffer[i..].iter_mut().for_each(|s| *s = 0.0);
                    }
                    return;
                }
                self.position -= 1.0;
            }

            let t = self.position as f32;
            for (ch, buffer) in outputs.iter_mut().enumerate() {
                let ch = ch % self.channels;
                buffer[i] = self.prev[ch] + t * (self.curr[ch] - self.prev[ch]);
            }
            self.position += ratio;
        }
    }

    #[inline]
    fn num_outputs(&self) -> usize {
        self.channels
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::BLOCK_SIZE;
    use rtrb::RingBuffer;

    #[test]
    fn upsamples_by_interpolating() {
        let (mut producer, consumer) = RingBuffer::new(1024);
        for i in 0..200 {
            producer.push(i as f32).unwrap();
        }
        let mut source = ResamplingSource::new(consumer, 1, 24000);
        let ctx = ProcessContext { sample_rate: 48000, buffer_size: BLOCK_SIZE };
        let mut out = [Buffer::SILENT];
        source.process(&ctx, core::iter::empty(), &[], &mut out);

        assert_eq!(out[0][0], 0.0);
        assert_eq!(out[0][1], 0.5);
        assert_eq!(out[0][2], 1.0);
        assert_eq!(out[0][9], 4.5);
    }

    #[test]
    fn underrun_is_silent() {
        let (_producer, consumer) = RingBuffer::<f32>::new(64);
        let mut source = ResamplingSource::new(consumer, 2, 44100);
        let ctx = ProcessContext { sample_rate: 48000, buffer_size: BLOCK_SIZE };
        let mut out = [Buffer::SILENT, Buffer::SILENT];
        out.iter_mut().for_each(|b| b.iter_mut().for_each(|s| *s = 1.0));
        source.process(&ctx, core::iter::empty(), &[], &mut out);
        assert!(out.iter().all(|b| b.iter().all(|&s| s == 0.0)));
    }
}
