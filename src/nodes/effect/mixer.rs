//! Mixer effect - sums multiple inputs together

use crate::node::{AudioNode, Buffer, Input, ProcessContext};

/// A mixer that sums multiple inputs together
///
/// Each input is summed with equal weight. The output has `channels` channels.
/// A mono input is copied to every output channel; extra input channels are
/// ignored.
pub struct Mixer {
    channels: usize,
}

impl Mixer {
    pub fn new(channels: usize) -> Self {
        Self { channels: channels.max(1) }
    }

    pub fn stereo() -> Self {
        Self::new(2)
    }
}

impl AudioNode for Mixer {
    type Message = ();

    fn process(
        &mut self,
        _ctx: &ProcessContext,
        _messages: impl Iterator<Item = Self::Message>,
        inputs: &[Input],
        output: &mut [Buffer],
    ) {
        output.iter_mut().for_each(Buffer::silence);

        for input in inputs {
            let input_channels = input.buffers().len();
            if input_channels == 0 {
                continue;
            }

            for (out_ch, out_buf) in output.iter_mut().enumerate() {
                let in_buf = &input.buffers()[out_ch.min(input_channels - 1)];
                for (out_sample, in_sample) in out_buf.iter_mut().zip(in_buf.iter()) {
                    *out_sample += *in_sample;
                }
            }
        }
    }

    fn num_inputs(&self) -> usize {
        usize::MAX
    }

    fn num_outputs(&self) -> usize {
        self.channels
    }
}
