//! Pass-through analysis tap

use rtrb::Producer;

use crate::node::{AudioNode, Buffer, Input, ProcessContext};

/// Identifies one reader attached to a [`Tap`].
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct TapId(pub(crate) u64);

#[derive(Debug)]
pub enum TapMessage {
    /// Start copying the signal into `producer`.
    Attach(TapId, Producer<f32>),
    /// Stop copying to the reader with this id.
    Detach(TapId),
}

/// Passes its input through unchanged while copying a mono mixdown to every
/// attached reader.
///
/// Readers that fall behind lose samples (the newest ones are dropped);
/// readers whose consumer has been dropped are detached automatically.
pub struct Tap {
    channels: usize,
    readers: Vec<(TapId, Producer<f32>)>,
}

impl Tap {
    pub fn new(channels: usize) -> Self {
        Self {
            channels: channels.max(1),
            readers: Vec::with_capacity(4),
        }
    }
}

impl AudioNode for Tap {
    type Message = TapMessage;

    fn process(
        &mut self,
        _ctx: &ProcessContext,
        messages: impl Iterator<Item = TapMessage>,
        inputs: &[Input],
        outputs: &mut [Buffer],
    ) {
        for msg in messages {
            match msg {
                TapMessage::Attach(id, producer) => self.readers.push((id, producer)),
                TapMessage::Detach(id) => self.readers.retain(|(r, _)| *r != id),
            }
        }
        self.readers.retain(|(_, p)| !p.is_abandoned());

        let in_buffers = inputs.first().map_or(&[][..], |i| i.buffers());
        if in_buffers.is_empty() {
            outputs.iter_mut().for_each(Buffer::silence);
        } else {
            for (ch, out) in outputs.iter_mut().enumerate() {
                out.copy_from_slice(&in_buffers[ch.min(in_buffers.len() - 1)]);
            }
        }

        if self.readers.is_empty() || outputs.is_empty() {
            return;
        }

        let scale = 1.0 / outputs.len() as f32;
        for i in 0..outputs[0].len() {
            let mono = outputs.iter().map(|b| b[i]).sum::<f32>() * scale;
            for (_, producer) in self.readers.iter_mut() {
                let _ = producer.push(mono);
            }
        }
    }

    #[inline]
    fn num_inputs(&self) -> usize { 1 }

    #[inline]
    fn num_outputs(&self) -> usize {
        self.channels
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::testing::{frame, harness};
    use crate::node::BLOCK_SIZE;
    use rtrb::RingBuffer;

    #[test]
    fn passes_through_and_copies_mixdown() {
        let (mut graph, mut tap, captured) = harness(Tap::new(2), &[&[0.5, 0.25]]);
        let (producer, mut consumer) = RingBuffer::new(256);

        tap.send(TapMessage::Attach(TapId(1), producer)).unwrap();
        graph.process();
        assert_eq!(frame(&captured, 0), vec![0.5, 0.25]);
        assert_eq!(consumer.slots(), BLOCK_SIZE);
        assert_eq!(consumer.pop(), Ok(0.375));

        tap.send(TapMessage::Detach(TapId(1))).unwrap();
        graph.process();
        assert_eq!(consumer.slots(), BLOCK_SIZE - 1);
    }

    #[test]
    fn drops_abandoned_readers() {
        let mut tap = Tap::new(1);
        let ctx = ProcessContext { sample_rate: 48000, buffer_size: BLOCK_SIZE };
        let (producer, consumer) = RingBuffer::new(256);
        let mut out = [Buffer::SILENT];
        tap.process(&ctx, core::iter::once(TapMessage::Attach(TapId(3), producer)), &[], &mut out);
        drop(consumer);
        tap.process(&ctx, core::iter::empty(), &[], &mut out);
        assert!(tap.readers.is_empty());
    }
}
