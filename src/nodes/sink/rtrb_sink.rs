//! Ring buffer sink

use rtrb::Producer;

use crate::node::{AudioNode, Buffer, Input, ProcessContext};

/// A sink that pushes interleaved audio into an rtrb ring buffer.
///
/// Feeds a sub-graph's output to its resampling bridge, and captures the
/// rendered signal of an [`OfflineDevice`](crate::OfflineDevice).
/// A block that does not fit entirely is skipped rather than split.
pub struct RtrbSink {
    producer: Producer<f32>,
    channels: usize,
}

impl RtrbSink {
    pub fn new(producer: Producer<f32>, channels: usize) -> Self {
        Self {
            producer,
            channels: channels.max(1),
        }
    }

    /// Returns how many sample slots are available
    #[inline]
    pub fn available(&self) -> usize {
        self.producer.slots()
    }
}

impl AudioNode for RtrbSink {
    type Message = ();

    fn process(
        &mut self,
        ctx: &ProcessContext,
        _messages: impl Iterator<Item = ()>,
        inputs: &[Input],
        _outputs: &mut [Buffer],
    ) {
        let buffer_len = ctx.buffer_size;
        if self.producer.slots() < buffer_len * self.channels {
            return;
        }

        let buffers = inputs.first().map_or(&[][..], |i| i.buffers());
        for i in 0..buffer_len {
            for ch in 0..self.channels {
                let sample = match buffers.len() {
                    0 => 0.0,
                    n => buffers[ch.min(n - 1)][i],
                };
                let _ = self.producer.push(sample);
            }
        }
    }

    #[inline]
    fn num_inputs(&self) -> usize { 1 }

    #[inline]
    fn num_outputs(&self) -> usize { 0 }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::testing::Constant;
    use crate::graph::AudioGraph;
    use crate::node::BLOCK_SIZE;
    use rtrb::RingBuffer;

    #[test]
    fn interleaves_and_skips_when_full() {
        let (producer, mut consumer) = RingBuffer::new(BLOCK_SIZE * 2 + 10);
        let mut graph = AudioGraph::new(48000);
        let source = graph.add(Constant(vec![0.5, -0.5])).id();
        let sink = graph.add(RtrbSink::new(producer, 2)).id();
        graph.connect(source, sink);
        graph.set_terminal(sink);

        graph.process();
        assert_eq!(consumer.slots(), BLOCK_SIZE * 2);
        assert_eq!(consumer.pop(), Ok(0.5));
        assert_eq!(consumer.pop(), Ok(-0.5));

        graph.process();
        assert_eq!(consumer.slots(), BLOCK_SIZE * 2 - 2);
    }
}
