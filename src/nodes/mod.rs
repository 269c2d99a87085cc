//! Built-in audio nodes.
//!
//! ## Sources ([`source`])
//!
//! - [`SamplePlayer`] - Play a decoded sound once, reporting its natural end
//! - [`ResamplingSource`] - Read from ring buffer with sample rate conversion (sub-graph bridge)
//!
//! ## Effects ([`effect`])
//!
//! - [`Mixer`] - Sum multiple inputs together
//! - [`Gain`] - Shared volume control with smoothing
//! - [`Tap`] - Pass-through that copies the signal to analysis readers
//!
//! ## Sinks ([`sink`])
//!
//! - [`RtrbSink`] - Write to ring buffer (sub-graphs, offline capture)
//! - [`CpalSink`] - Output to system audio device (requires `cpal_sink` feature)

pub mod source;
pub mod effect;
pub mod sink;

pub use source::{EndNotifier, PlayerMessage, ResamplingSource, SamplePlayer};
pub use effect::{Gain, GainMessage, Mixer, Tap, TapId, TapMessage};
pub use sink::RtrbSink;

#[cfg(feature = "cpal_sink")]
pub use sink::CpalSink;
