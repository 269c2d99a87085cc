//! Core node trait and context types.

pub use dasp_graph::{Buffer, Input};

/// Number of frames processed per block.
pub const BLOCK_SIZE: usize = Buffer::LEN;

/// Information available during audio processing.
///
/// Passed to every [`AudioNode::process`] call.
#[derive(Clone, Copy, Debug)]
pub struct ProcessContext {
    /// Sample rate of the graph in Hz (e.g., 44100, 48000)
    pub sample_rate: u32,
    /// Number of samples per buffer (always [`BLOCK_SIZE`])
    pub buffer_size: usize,
}

/// Identifier for a node within one [`AudioGraph`](crate::AudioGraph).
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct NodeId(pub(crate) u32);

/// The core trait for audio processing nodes.
///
/// Nodes come in three shapes:
/// - **Sources** generate audio (0 inputs, 1+ outputs), e.g. [`SamplePlayer`](crate::nodes::SamplePlayer)
/// - **Effects** transform audio (1+ inputs, 1+ outputs), e.g. [`Gain`](crate::nodes::Gain)
/// - **Sinks** consume audio (1+ inputs, 0 outputs), e.g. [`RtrbSink`](crate::nodes::RtrbSink)
///
/// # Message-Based Parameters
///
/// Nodes never share mutable state with the control side. Parameter changes
/// arrive as messages, drained at the start of `process()`:
///
/// ```
/// use schall::{AudioNode, Buffer, Input, ProcessContext};
///
/// enum ToneMessage {
///     SetLevel(f32),
/// }
///
/// struct Dc {
///     level: f32,
/// }
///
/// impl AudioNode for Dc {
///     type Message = ToneMessage;
///
///     fn process(
///         &mut self,
///         _ctx: &ProcessContext,
///         messages: impl Iterator<Item = ToneMessage>,
///         _inputs: &[Input],
///         outputs: &mut [Buffer],
///     ) {
///         for msg in messages {
///             match msg {
///                 ToneMessage::SetLevel(l) => self.level = l,
///             }
///         }
///         for sample in outputs[0].iter_mut() {
///             *sample = self.level;
///         }
///     }
/// }
/// ```
pub trait AudioNode: Send + 'static {
    /// Message type for parameter updates. Use `()` for nodes without parameters.
    type Message: Send + 'static;

    /// Process one block of audio.
    ///
    /// Drain `messages`, read `inputs` (one [`Input`] per connected upstream
    /// node), and write every buffer in `outputs`.
    fn process(
        &mut self,
        ctx: &ProcessContext,
        messages: impl Iterator<Item = Self::Message>,
        inputs: &[Input],
        outputs: &mut [Buffer],
    );

    /// Number of audio inputs (0 for sources).
    fn num_inputs(&self) -> usize { 0 }

    /// Number of audio output channels.
    fn num_outputs(&self) -> usize { 1 }

    /// Native sample rate of this node, if it has one.
    ///
    /// Sources with fixed sample rates (decoded audio) return `Some(rate)`.
    /// When it differs from the device rate, the
    /// [`AudioContext`](crate::AudioContext) places the node in a sub-graph at
    /// that rate and resamples the result.
    fn native_sample_rate(&self) -> Option<u32> { None }
}
