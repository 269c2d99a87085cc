//! The audio context and the root that owns it.
//!
//! An [`AudioContext`] is one running instance of the signal path:
//!
//! ```text
//! players (device rate) ──────────────────────────────┐
//! players (other rate) → Mixer → RtrbSink ⇒ Resampler ┴→ bus Mixer → Gain → Tap → device sink
//! ```
//!
//! Players whose native rate differs from the device rate live in a
//! sub-graph at their own rate, bridged back through a ring buffer and a
//! [`ResamplingSource`]. The shared [`Gain`] sits after the bus so every
//! source goes through it, and the [`Tap`] sits after the gain so analysis
//! sees exactly the audible signal.
//!
//! [`AudioRoot`] owns at most one context, creates it lazily and drives its
//! lifecycle: `absent → running → suspended ⇄ running`, and from any state
//! `→ closed → absent`. Requests for any other transition are no-ops.

use std::time::Instant;

use hashbrown::HashMap;
use rtrb::{Consumer, RingBuffer};
use tracing::{debug, info, warn};

use crate::device::{OutputDevice, StreamControl};
use crate::error::{Error, Result};
use crate::graph::{AudioGraph, NodeHandle};
use crate::node::{AudioNode, NodeId, BLOCK_SIZE};
use crate::nodes::{Gain, GainMessage, Mixer, PlayerMessage, ResamplingSource, RtrbSink, SamplePlayer, Tap, TapId, TapMessage};

/// Blocks rendered ahead of the wall clock by [`AudioContext::pump`].
pub const DEFAULT_LEAD_BLOCKS: u64 = 4;

/// Distinguishes successive contexts of one [`AudioRoot`].
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct ContextId(u64);

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum ContextState {
    Suspended,
    Running,
    Closed,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum GraphKey {
    Main,
    Sub(u32),
}

/// A playback source added to an [`AudioContext`].
pub struct SourceHandle {
    node: NodeHandle<PlayerMessage>,
    graph: GraphKey,
}

impl SourceHandle {
    /// Send a message to the player. Returns it back if it could not be queued.
    pub fn send(&mut self, msg: PlayerMessage) -> core::result::Result<(), PlayerMessage> {
        self.node.send(msg)
    }

    pub fn id(&self) -> NodeId {
        self.node.id()
    }
}

/// Read side of an analysis tap: a mono copy of the post-gain signal.
pub struct TapReader {
    id: TapId,
    context: ContextId,
    consumer: Consumer<f32>,
}

impl TapReader {
    /// The context whose signal this reader receives.
    pub fn context(&self) -> ContextId {
        self.context
    }

    /// Pop every sample that arrived since the last call into `f`.
    pub fn drain(&mut self, mut f: impl FnMut(f32)) {
        while let Ok(sample) = self.consumer.pop() {
            f(sample);
        }
    }

    /// True once the tap node feeding this reader no longer exists.
    pub fn is_detached(&self) -> bool {
        self.consumer.is_abandoned()
    }
}

struct SubGraph {
    graph: AudioGraph,
    mixer: NodeId,
    blocks_processed: u64,
}

struct Pacing {
    origin: Instant,
    blocks: u64,
}

/// One instance of the signal path bound to an output device.
pub struct AudioContext {
    id: ContextId,
    state: ContextState,
    sample_rate: u32,
    channels: usize,

    main: AudioGraph,
    sub_graphs: HashMap<u32, SubGraph>,
    bus: NodeId,
    gain: NodeHandle<GainMessage>,
    gain_value: f32,
    tap: NodeHandle<TapMessage>,
    next_tap: u64,

    stream: StreamControl,
    blocks_rendered: u64,
    lead_blocks: u64,
    pacing: Option<Pacing>,
}

impl AudioContext {
    fn new(id: ContextId, device: &dyn OutputDevice, lead_blocks: u64) -> Result<Self> {
        let sample_rate = device.sample_rate();
        let channels = device.channels().max(1);

        let mut main = AudioGraph::new(sample_rate);
        let (sink, stream) = device.open(&mut main)?;

        let bus = main.add(Mixer::new(channels)).id();
        let gain = main.add(Gain::new(1.0, channels));
        let tap = main.add(Tap::new(channels));

        let routed = main.connect(bus, gain.id())
            && main.connect(gain.id(), tap.id())
            && main.connect(tap.id(), sink)
            && main.set_terminal(sink);
        if !routed {
            return Err(Error::AudioOutput("could not route the output chain".into()));
        }

        Ok(Self {
            id,
            state: ContextState::Running,
            sample_rate,
            channels,
            main,
            sub_graphs: HashMap::new(),
            bus,
            gain,
            gain_value: 1.0,
            tap,
            next_tap: 0,
            stream,
            blocks_rendered: 0,
            lead_blocks,
            pacing: None,
        })
    }

    pub fn id(&self) -> ContextId {
        self.id
    }

    pub fn state(&self) -> ContextState {
        self.state
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    /// Blocks rendered since the context was created.
    pub fn blocks_rendered(&self) -> u64 {
        self.blocks_rendered
    }

    /// Current control value of the shared gain.
    pub fn gain(&self) -> f32 {
        self.gain_value
    }

    fn set_gain(&mut self, value: f32) {
        self.gain_value = value;
        if self.gain.send(GainMessage::SetGain(value)).is_err() {
            warn!(value, "gain queue full, volume change dropped");
        }
    }

    /// Add a player, routed into the bus (through a resampling sub-graph when
    /// its rate differs from the device rate). The player stays silent until
    /// it receives [`PlayerMessage::Start`].
    pub fn add_source(&mut self, player: SamplePlayer) -> Result<SourceHandle> {
        if self.state == ContextState::Closed {
            return Err(Error::ContextClosed);
        }

        let (graph, key, target) = match player.native_sample_rate() {
            Some(rate) if rate != self.sample_rate => {
                let sub = self.sub_graph(rate);
                let mixer = sub.mixer;
                (&mut sub.graph, GraphKey::Sub(rate), mixer)
            }
            _ => (&mut self.main, GraphKey::Main, self.bus),
        };

        let node = graph.add(player);
        if !graph.connect(node.id(), target) {
            graph.remove(node.id());
            return Err(Error::PlaybackStart("could not route source".into()));
        }

        Ok(SourceHandle { node, graph: key })
    }

    /// Disconnect and drop a source. Returns whether it was still present.
    pub fn remove_source(&mut self, source: &SourceHandle) -> bool {
        match source.graph {
            GraphKey::Main => self.main.remove(source.id()),
            GraphKey::Sub(rate) => self.sub_graphs.get_mut(&rate).map_or(false, |sub| sub.graph.remove(source.id())),
        }
    }

    fn sub_graph(&mut self, rate: u32) -> &mut SubGraph {
        let channels = self.channels;
        let main = &mut self.main;
        let bus = self.bus;

        self.sub_graphs.entry(rate).or_insert_with(|| {
            // ~100ms of audio between the sub-graph and the main graph
            let buffer_size = ((rate as f32 * 0.1) as usize * channels).next_power_of_two().max(8192);
            let (producer, consumer) = RingBuffer::<f32>::new(buffer_size);

            let mut graph = AudioGraph::new(rate);
            let mixer = graph.add(Mixer::new(channels)).id();
            let sink = graph.add(RtrbSink::new(producer, channels)).id();
            graph.connect(mixer, sink);
            graph.set_terminal(sink);

            let resampler = main.add(ResamplingSource::new(consumer, channels, rate)).id();
            main.connect(resampler, bus);

            debug!(rate, "created resampling sub-graph");
            SubGraph { graph, mixer, blocks_processed: 0 }
        })
    }

    /// Attach an analysis reader after the shared gain.
    ///
    /// `capacity` is the reader's ring size in samples; samples that do not
    /// fit are dropped. Returns `None` if the context is closed or the tap's
    /// queue is full.
    pub fn attach_tap(&mut self, capacity: usize) -> Option<TapReader> {
        if self.state == ContextState::Closed {
            return None;
        }
        let id = TapId(self.next_tap);
        self.next_tap += 1;

        let (producer, consumer) = RingBuffer::new(capacity.max(BLOCK_SIZE));
        self.tap.send(TapMessage::Attach(id, producer)).ok()?;
        Some(TapReader { id, context: self.id, consumer })
    }

    pub fn detach_tap(&mut self, reader: TapReader) {
        if reader.context == self.id {
            let _ = self.tap.send(TapMessage::Detach(reader.id));
        }
    }

    /// Render `blocks` blocks, if the context is running. Returns how many
    /// were rendered.
    pub fn render(&mut self, blocks: usize) -> usize {
        if self.state != ContextState::Running {
            return 0;
        }
        for _ in 0..blocks {
            self.render_block();
        }
        if let Some(pacing) = self.pacing.as_mut() {
            pacing.blocks += blocks as u64;
        }
        blocks
    }

    fn render_block(&mut self) {
        // keep every resampler fed for the block about to be rendered
        let main_rate = self.sample_rate as f64;
        let main_blocks = self.blocks_rendered + 1;

        for (rate, sub) in self.sub_graphs.iter_mut() {
            let ratio = *rate as f64 / main_rate;
            let blocks_needed = ((main_blocks as f64) * ratio).ceil() as u64 + 4;

            while sub.blocks_processed < blocks_needed {
                sub.graph.process();
                sub.blocks_processed += 1;
            }
        }

        self.main.process();
        self.blocks_rendered += 1;
    }

    /// Render whatever the wall clock says is due, staying `lead_blocks`
    /// ahead. Call this regularly while running; returns the blocks rendered.
    ///
    /// The clock starts at the first call after creation or resume. After a
    /// stall of more than a second the clock restarts instead of catching up.
    pub fn pump(&mut self) -> usize {
        if self.state != ContextState::Running {
            return 0;
        }

        let pacing = self.pacing.get_or_insert_with(|| Pacing { origin: Instant::now(), blocks: 0 });
        let blocks_per_sec = self.sample_rate as f64 / BLOCK_SIZE as f64;
        let target = (pacing.origin.elapsed().as_secs_f64() * blocks_per_sec) as u64 + self.lead_blocks;
        let due = target.saturating_sub(pacing.blocks);

        if due as f64 > blocks_per_sec {
            debug!(due, "render clock fell behind, restarting");
            self.pacing = Some(Pacing { origin: Instant::now(), blocks: 0 });
            return self.render(self.lead_blocks as usize);
        }

        self.render(due as usize)
    }

    fn shutdown(mut self) -> StreamControl {
        self.state = ContextState::Closed;
        self.stream
    }
}

/// Owns the (at most one) [`AudioContext`] and the device it renders to.
pub struct AudioRoot {
    device: Box<dyn OutputDevice>,
    context: Option<AudioContext>,
    next_context: u64,
    lead_blocks: u64,
}

impl AudioRoot {
    pub fn new(device: impl OutputDevice + 'static) -> Self {
        Self {
            device: Box::new(device),
            context: None,
            next_context: 0,
            lead_blocks: DEFAULT_LEAD_BLOCKS,
        }
    }

    /// Blocks to render ahead of the wall clock in [`AudioContext::pump`].
    pub fn with_lead_blocks(mut self, blocks: u64) -> Self {
        self.lead_blocks = blocks;
        self
    }

    pub fn device(&self) -> &dyn OutputDevice {
        self.device.as_ref()
    }

    /// The live context, created (running, with unity gain) if absent.
    pub fn ensure_context(&mut self) -> Result<&mut AudioContext> {
        if self.context.is_none() {
            let id = ContextId(self.next_context);
            let context = AudioContext::new(id, self.device.as_ref(), self.lead_blocks)?;
            self.next_context += 1;
            info!(
                device = self.device.name(),
                sample_rate = context.sample_rate(),
                channels = context.channels(),
                "audio context created"
            );
            self.context = Some(context);
        }
        self.context.as_mut().ok_or(Error::NoContext)
    }

    /// Close the context and release the device stream. No-op when absent.
    ///
    /// Completes once the stream has been released; a later
    /// [`ensure_context`](Self::ensure_context) creates a fresh context.
    pub async fn close_context(&mut self) {
        let Some(context) = self.context.take() else { return };
        let id = context.id();
        context.shutdown().close().await;
        info!(?id, "audio context closed");
    }

    /// Resume a suspended context. No-op in any other state.
    pub async fn resume_context(&mut self) -> Result<()> {
        let Some(context) = self.context.as_mut() else { return Ok(()) };
        if context.state != ContextState::Suspended {
            debug!(state = ?context.state, "resume ignored");
            return Ok(());
        }
        context.stream.play().await?;
        context.state = ContextState::Running;
        context.pacing = None;
        debug!("audio context resumed");
        Ok(())
    }

    /// Suspend a running context. No-op in any other state.
    pub async fn suspend_context(&mut self) -> Result<()> {
        let Some(context) = self.context.as_mut() else { return Ok(()) };
        if context.state != ContextState::Running {
            debug!(state = ?context.state, "suspend ignored");
            return Ok(());
        }
        context.stream.pause().await?;
        context.state = ContextState::Suspended;
        context.pacing = None;
        debug!("audio context suspended");
        Ok(())
    }

    /// Set the shared gain, clamped to `[0, 1]`. No-op without a context.
    pub fn set_volume(&mut self, volume: f32) {
        if volume.is_nan() {
            warn!("ignoring NaN volume");
            return;
        }
        if let Some(context) = self.context.as_mut() {
            context.set_gain(volume.clamp(0.0, 1.0));
        }
    }

    /// Control value of the shared gain, if there is a context.
    pub fn volume(&self) -> Option<f32> {
        self.context.as_ref().map(AudioContext::gain)
    }

    pub fn state(&self) -> Option<ContextState> {
        self.context.as_ref().map(AudioContext::state)
    }

    pub fn context(&self) -> Option<&AudioContext> {
        self.context.as_ref()
    }

    pub fn context_mut(&mut self) -> Option<&mut AudioContext> {
        self.context.as_mut()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::OfflineDevice;
    use crate::DecodedAudio;
    use std::sync::Arc;

    fn root() -> (AudioRoot, crate::device::OfflineCapture) {
        let device = OfflineDevice::new(48000, 2);
        let capture = device.capture();
        (AudioRoot::new(device), capture)
    }

    fn constant(value: f32, frames: usize, rate: u32) -> Arc<DecodedAudio> {
        Arc::new(DecodedAudio::new(vec![value; frames], 1, rate))
    }

    #[tokio::test]
    async fn lifecycle_transitions() {
        let (mut root, _) = root();
        assert_eq!(root.state(), None);
        root.resume_context().await.unwrap();
        assert_eq!(root.state(), None);

        let first = root.ensure_context().unwrap().id();
        assert_eq!(root.state(), Some(ContextState::Running));
        assert_eq!(root.ensure_context().unwrap().id(), first);

        root.resume_context().await.unwrap();
        assert_eq!(root.state(), Some(ContextState::Running));

        root.suspend_context().await.unwrap();
        assert_eq!(root.state(), Some(ContextState::Suspended));
        root.suspend_context().await.unwrap();
        assert_eq!(root.state(), Some(ContextState::Suspended));

        root.resume_context().await.unwrap();
        assert_eq!(root.state(), Some(ContextState::Running));

        root.close_context().await;
        assert_eq!(root.state(), None);
        root.close_context().await;

        let second = root.ensure_context().unwrap().id();
        assert_ne!(first, second);
    }

    #[tokio::test]
    async fn suspended_context_renders_nothing() {
        let (mut root, capture) = root();
        root.ensure_context().unwrap();
        root.suspend_context().await.unwrap();

        assert_eq!(root.context_mut().unwrap().render(4), 0);
        assert!(capture.is_empty());
    }

    #[test]
    fn volume_is_clamped_and_starts_at_unity() {
        let (mut root, _) = root();
        root.set_volume(0.5);
        assert_eq!(root.volume(), None);

        root.ensure_context().unwrap();
        assert_eq!(root.volume(), Some(1.0));
        root.set_volume(1.7);
        assert_eq!(root.volume(), Some(1.0));
        root.set_volume(-0.2);
        assert_eq!(root.volume(), Some(0.0));
        root.set_volume(f32::NAN);
        assert_eq!(root.volume(), Some(0.0));
    }

    #[test]
    fn source_plays_through_gain_to_device() {
        let (mut root, capture) = root();
        let context = root.ensure_context().unwrap();
        let mut source = context.add_source(SamplePlayer::new(constant(0.5, 8192, 48000))).unwrap();
        source.send(PlayerMessage::Start).unwrap();

        context.render(2);
        let out = capture.drain();
        assert_eq!(out.len(), 2 * BLOCK_SIZE * 2);
        assert!(out.iter().all(|&s| s == 0.5));

        root.set_volume(0.5);
        root.context_mut().unwrap().render(100);
        let out = capture.drain();
        let last = out[out.len() - 1];
        assert!((last - 0.25).abs() < 1e-3, "last sample {last}");
    }

    #[test]
    fn foreign_rate_source_is_resampled() {
        let (mut root, capture) = root();
        let context = root.ensure_context().unwrap();
        let mut source = context.add_source(SamplePlayer::new(constant(0.5, 24000, 24000))).unwrap();
        source.send(PlayerMessage::Start).unwrap();

        context.render(20);
        let out = capture.drain();
        assert!(out[out.len() - 1] > 0.49, "resampled signal reaches the device");
        assert!(context.remove_source(&source));
        assert!(!context.remove_source(&source));
    }

    #[test]
    fn taps_follow_the_context() {
        let (mut root, _) = root();
        let context = root.ensure_context().unwrap();
        let mut source = context.add_source(SamplePlayer::new(constant(0.5, 8192, 48000))).unwrap();
        source.send(PlayerMessage::Start).unwrap();

        let mut reader = context.attach_tap(4096).unwrap();
        assert_eq!(reader.context(), context.id());
        context.render(3);

        let mut seen = Vec::new();
        reader.drain(|s| seen.push(s));
        assert_eq!(seen.len(), 3 * BLOCK_SIZE);
        assert!(seen.iter().all(|&s| s == 0.5));
    }

    #[tokio::test]
    async fn closing_detaches_taps() {
        let (mut root, _) = root();
        let reader = root.ensure_context().unwrap().attach_tap(1024).unwrap();
        root.close_context().await;
        assert!(reader.is_detached());
    }
}
