//! CPAL audio output sink

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};

use cpal::traits::{DeviceTrait, StreamTrait};
use cpal::{SampleFormat, SupportedStreamConfig};
use rtrb::{Consumer, Producer, RingBuffer};
use tracing::{debug, error, warn};

use crate::device::{StreamCommand, StreamControl};
use crate::error::Error;
use crate::node::{AudioNode, Buffer, Input, ProcessContext};

/// A sink that outputs audio to a CPAL device
///
/// The CPAL stream lives on its own thread; this node feeds samples into a
/// ring buffer the stream consumes. The stream is started as soon as it is
/// built and can then be paused, resumed and closed through the
/// [`StreamControl`] returned by [`CpalSink::new`].
pub struct CpalSink {
    buffer: Producer<f32>,
    channels: usize,
    had_underrun: Arc<AtomicBool>,
}

impl CpalSink {
    /// Create a new sink for the given device and config
    pub fn new(device: &cpal::Device, config: &SupportedStreamConfig) -> (Self, StreamControl) {
        let channels = config.channels() as usize;
        let sample_format = config.sample_format();
        let stream_config = config.config();
        let sample_rate = stream_config.sample_rate.0;

        // ~100ms of audio to absorb scheduling jitter
        let buffer_samples = ((sample_rate as f32 * 0.1) as usize) * channels;
        let buffer_size = buffer_samples.next_power_of_two().max(8192);
        let (producer, consumer) = RingBuffer::<f32>::new(buffer_size);

        let had_underrun = Arc::new(AtomicBool::new(false));
        let (commands_tx, commands) = mpsc::channel();

        let device = device.clone();
        let underrun = had_underrun.clone();
        std::thread::spawn(move || {
            let stream = build_stream(&device, sample_format, &stream_config, consumer, underrun);
            run_stream(stream, commands);
        });

        let sink = Self {
            buffer: producer,
            channels,
            had_underrun,
        };
        (sink, StreamControl::new(commands_tx))
    }
}

/// Owns the stream on the device thread and answers control commands until
/// closed or until the [`StreamControl`] is dropped.
fn run_stream(stream: Result<cpal::Stream, Error>, commands: mpsc::Receiver<StreamCommand>) {
    let stream = match stream {
        Ok(stream) => stream,
        Err(err) => {
            error!(%err, "failed to build output stream");
            let reason = err.to_string();
            for cmd in commands.iter() {
                cmd.fail(&reason);
            }
            return;
        }
    };

    if let Err(err) = stream.play() {
        warn!(%err, "output stream did not start");
    }

    for cmd in commands.iter() {
        match cmd {
            StreamCommand::Play(ack) => {
                let _ = ack.send(stream.play().map_err(|e| Error::AudioOutput(e.to_string())));
            }
            StreamCommand::Pause(ack) => {
                let _ = ack.send(stream.pause().map_err(|e| Error::AudioOutput(e.to_string())));
            }
            StreamCommand::Close(ack) => {
                drop(stream);
                debug!("output stream closed");
                let _ = ack.send(());
                return;
            }
        }
    }
}

fn build_stream(
    device: &cpal::Device,
    sample_format: SampleFormat,
    stream_config: &cpal::StreamConfig,
    mut consumer: Consumer<f32>,
    had_underrun: Arc<AtomicBool>,
) -> Result<cpal::Stream, Error> {
    let on_error = |err: cpal::StreamError| error!(%err, "cpal stream error");

    let mut next = move |len: usize, write: &mut dyn FnMut(usize, f32)| {
        let mut underrun = false;
        for i in 0..len {
            let s = consumer.pop().unwrap_or_else(|_| {
                underrun = true;
                0.0
            });
            write(i, s);
        }
        if underrun {
            had_underrun.store(true, Ordering::Relaxed);
        }
    };

    let stream = match sample_format {
        SampleFormat::F32 => device.build_output_stream(
            stream_config,
            move |data: &mut [f32], _| next(data.len(), &mut |i, s| data[i] = s),
            on_error,
            None,
        ),
        SampleFormat::I16 => device.build_output_stream(
            stream_config,
            move |data: &mut [i16], _| {
                next(data.len(), &mut |i, s| data[i] = (s.clamp(-1.0, 1.0) * i16::MAX as f32) as i16)
            },
            on_error,
            None,
        ),
        SampleFormat::U16 => device.build_output_stream(
            stream_config,
            move |data: &mut [u16], _| {
                next(data.len(), &mut |i, s| {
                    data[i] = ((s.clamp(-1.0, 1.0) + 1.0) * 0.5 * u16::MAX as f32) as u16
                })
            },
            on_error,
            None,
        ),
        other => return Err(Error::AudioOutput(format!("unsupported sample format: {other:?}"))),
    };

    stream.map_err(|e| Error::AudioOutput(e.to_string()))
}

impl AudioNode for CpalSink {
    type Message = ();

    fn process(
        &mut self,
        ctx: &ProcessContext,
        _messages: impl Iterator<Item = ()>,
        inputs: &[Input],
        _outputs: &mut [Buffer],
    ) {
        let buffer_len = ctx.buffer_size;

        if self.had_underrun.swap(false, Ordering::Relaxed) {
            debug!("output underrun");
        }

        // generating faster than the device consumes: skip rather than split
        if self.buffer.slots() < buffer_len * self.channels {
            return;
        }

        let buffers = inputs.first().map_or(&[][..], |i| i.buffers());
        for i in 0..buffer_len {
            for ch in 0..self.channels {
                let sample = match buffers.len() {
                    0 => 0.0,
                    n => buffers[ch.min(n - 1)][i],
                };
                let _ = self.buffer.push(sample);
            }
        }
    }

    #[inline]
    fn num_inputs(&self) -> usize { 1 }

    #[inline]
    fn num_outputs(&self) -> usize { 0 }
}
