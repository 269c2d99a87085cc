//! Output devices and control of their streams.
//!
//! An [`OutputDevice`] knows its sample rate and channel count and can add a
//! sink for itself to an [`AudioGraph`]. Opening also hands back a
//! [`StreamControl`], the asynchronous play/pause/close switch of the
//! underlying hardware stream.
//!
//! - [`CpalDevice`] - a real sound card (requires the `cpal_sink` feature)
//! - [`OfflineDevice`] - renders into memory; for headless use and tests

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::mpsc;

use rtrb::{Consumer, RingBuffer};
use tokio::sync::oneshot;

#[cfg(feature = "cpal_sink")]
use cpal::traits::{DeviceTrait, HostTrait};

use crate::error::{Error, Result};
use crate::graph::AudioGraph;
use crate::node::NodeId;
use crate::nodes::RtrbSink;

/// A place rendered audio can go.
pub trait OutputDevice {
    fn name(&self) -> &str;

    /// Sample rate in Hz the device consumes.
    fn sample_rate(&self) -> u32;

    fn channels(&self) -> usize;

    /// Add a sink node for this device to `graph`.
    ///
    /// Returns the sink's id and the control for the stream behind it. The
    /// stream may still be binding to hardware when this returns.
    fn open(&self, graph: &mut AudioGraph) -> Result<(NodeId, StreamControl)>;
}

pub(crate) enum StreamCommand {
    Play(oneshot::Sender<Result<()>>),
    Pause(oneshot::Sender<Result<()>>),
    Close(oneshot::Sender<()>),
}

impl StreamCommand {
    #[cfg_attr(not(feature = "cpal_sink"), allow(dead_code))]
    pub(crate) fn fail(self, reason: &str) {
        match self {
            StreamCommand::Play(ack) | StreamCommand::Pause(ack) => {
                let _ = ack.send(Err(Error::AudioOutput(reason.to_owned())));
            }
            StreamCommand::Close(ack) => {
                let _ = ack.send(());
            }
        }
    }
}

/// Asynchronous switch for an output stream running on another thread.
///
/// A detached control (offline rendering) acknowledges everything at once.
pub struct StreamControl {
    commands: Option<mpsc::Sender<StreamCommand>>,
}

impl StreamControl {
    #[cfg_attr(not(feature = "cpal_sink"), allow(dead_code))]
    pub(crate) fn new(commands: mpsc::Sender<StreamCommand>) -> Self {
        Self { commands: Some(commands) }
    }

    pub fn detached() -> Self {
        Self { commands: None }
    }

    /// Resume the stream. Completes once the device has acknowledged.
    pub async fn play(&self) -> Result<()> {
        self.request(StreamCommand::Play).await
    }

    /// Pause the stream. Completes once the device has acknowledged.
    pub async fn pause(&self) -> Result<()> {
        self.request(StreamCommand::Pause).await
    }

    /// Release the stream and the hardware behind it.
    pub async fn close(self) {
        let Some(commands) = self.commands else { return };
        let (ack, done) = oneshot::channel();
        if commands.send(StreamCommand::Close(ack)).is_ok() {
            let _ = done.await;
        }
    }

    async fn request(&self, command: fn(oneshot::Sender<Result<()>>) -> StreamCommand) -> Result<()> {
        let Some(commands) = &self.commands else { return Ok(()) };
        let gone = || Error::AudioOutput("output stream thread has exited".into());

        let (ack, done) = oneshot::channel();
        commands.send(command(ack)).map_err(|_| gone())?;
        done.await.map_err(|_| gone())?
    }
}

/// Renders into an in-memory ring instead of a sound card.
///
/// Read what was rendered through the [`OfflineCapture`] from
/// [`capture`](Self::capture); each `open` starts a fresh capture ring.
pub struct OfflineDevice {
    sample_rate: u32,
    channels: usize,
    capacity: usize,
    capture: OfflineCapture,
}

impl OfflineDevice {
    pub fn new(sample_rate: u32, channels: usize) -> Self {
        Self {
            sample_rate,
            channels: channels.max(1),
            capacity: 1 << 16,
            capture: OfflineCapture::default(),
        }
    }

    /// Capture ring size in samples. Blocks that do not fit are skipped.
    pub fn with_capacity(mut self, samples: usize) -> Self {
        self.capacity = samples;
        self
    }

    pub fn capture(&self) -> OfflineCapture {
        self.capture.clone()
    }
}

impl OutputDevice for OfflineDevice {
    fn name(&self) -> &str {
        "offline"
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn channels(&self) -> usize {
        self.channels
    }

    fn open(&self, graph: &mut AudioGraph) -> Result<(NodeId, StreamControl)> {
        let (producer, consumer) = RingBuffer::new(self.capacity);
        *self.capture.consumer.borrow_mut() = Some(consumer);
        let handle = graph.add(RtrbSink::new(producer, self.channels));
        Ok((handle.id(), StreamControl::detached()))
    }
}

/// Reader for what an [`OfflineDevice`] rendered, as interleaved samples.
#[derive(Clone, Default)]
pub struct OfflineCapture {
    consumer: Rc<RefCell<Option<Consumer<f32>>>>,
}

impl OfflineCapture {
    /// Take everything rendered since the last call.
    pub fn drain(&self) -> Vec<f32> {
        let mut consumer = self.consumer.borrow_mut();
        let Some(consumer) = consumer.as_mut() else { return Vec::new() };
        let mut samples = Vec::with_capacity(consumer.slots());
        while let Ok(s) = consumer.pop() {
            samples.push(s);
        }
        samples
    }

    /// Number of rendered samples waiting to be drained.
    pub fn len(&self) -> usize {
        self.consumer.borrow().as_ref().map_or(0, |c| c.slots())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A discovered audio output device.
///
/// Use [`CpalDevice::default_output`] to get the system default,
/// [`CpalDevice::list_outputs`] to enumerate all devices, or
/// [`CpalDevice::find`] to pick one by name.
#[cfg(feature = "cpal_sink")]
pub struct CpalDevice {
    device: cpal::Device,
    config: cpal::SupportedStreamConfig,
    name: String,
}

#[cfg(feature = "cpal_sink")]
impl CpalDevice {
    fn from_device(device: cpal::Device) -> Option<Self> {
        let config = device.default_output_config().ok()?;
        let name = device.name().unwrap_or_else(|_| "Unknown".into());
        Some(Self { device, config, name })
    }

    /// The system's default output device, if there is one.
    pub fn default_output() -> Option<Self> {
        cpal::default_host().default_output_device().and_then(Self::from_device)
    }

    /// All output devices. Empty if enumeration fails.
    pub fn list_outputs() -> Vec<Self> {
        cpal::default_host()
            .output_devices()
            .map(|devices| devices.filter_map(Self::from_device).collect())
            .unwrap_or_default()
    }

    /// The first output device whose name contains `name`.
    pub fn find(name: &str) -> Option<Self> {
        Self::list_outputs().into_iter().find(|d| d.name.contains(name))
    }
}

#[cfg(feature = "cpal_sink")]
impl OutputDevice for CpalDevice {
    fn name(&self) -> &str {
        &self.name
    }

    fn sample_rate(&self) -> u32 {
        self.config.sample_rate().0
    }

    fn channels(&self) -> usize {
        self.config.channels() as usize
    }

    fn open(&self, graph: &mut AudioGraph) -> Result<(NodeId, StreamControl)> {
        let (sink, control) = crate::nodes::CpalSink::new(&self.device, &self.config);
        let handle = graph.add(sink);
        Ok((handle.id(), control))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn detached_control_acknowledges_immediately() {
        let control = StreamControl::detached();
        assert!(control.play().await.is_ok());
        assert!(control.pause().await.is_ok());
        control.close().await;
    }

    #[tokio::test]
    async fn commands_are_answered_by_the_stream_thread() {
        let (tx, rx) = mpsc::channel();
        let control = StreamControl::new(tx);
        std::thread::spawn(move || {
            for cmd in rx.iter() {
                match cmd {
                    StreamCommand::Play(ack) => {
                        let _ = ack.send(Ok(()));
                    }
                    other => other.fail("no hardware"),
                }
            }
        });

        assert!(control.play().await.is_ok());
        assert!(matches!(control.pause().await, Err(Error::AudioOutput(_))));
        control.close().await;
    }

    #[tokio::test]
    async fn exited_stream_thread_is_an_error() {
        let (tx, rx) = mpsc::channel();
        drop(rx);
        let control = StreamControl::new(tx);
        assert!(control.play().await.is_err());
    }

    #[test]
    fn offline_capture_reads_the_sink() {
        let device = OfflineDevice::new(48000, 2).with_capacity(1024);
        let capture = device.capture();
        assert!(capture.is_empty());

        let mut graph = AudioGraph::new(device.sample_rate());
        let (sink, _control) = device.open(&mut graph).unwrap();
        assert!(graph.set_terminal(sink));

        graph.process();
        assert_eq!(capture.len(), 128);
        assert!(capture.drain().iter().all(|&s| s == 0.0));
        assert!(capture.is_empty());
    }
}
