//! schall - a sample player core on a message-passing audio graph
//!
//! - Sounds are fetched and decoded once into a shared [`BufferCache`]
//! - Every playback is a one-shot [`SamplePlayer`](nodes::SamplePlayer) node
//!   that reports its own end; [`Sessions`] tracks the ones in flight
//! - All sources go through one shared gain, followed by a tap that feeds
//!   the [`analysis`] adapters
//! - Nodes receive parameters via message ring buffers, not shared state
//! - Sounds at a foreign sample rate play through resampling sub-graphs
//!
//! [`Schall`] ties these together; the lower layers are public for callers
//! that want their own arrangement.

mod cache;
mod config;
mod context;
mod decode;
mod device;
mod error;
mod fetch;
mod graph;
mod node;
mod schall;
mod session;

pub mod analysis;
pub mod nodes;

pub use cache::{AudioInfo, BufferCache, LoadReport, LoadStatus};
pub use config::{Config, OutputConfig, Sound};
pub use context::{AudioContext, AudioRoot, ContextId, ContextState, SourceHandle, TapReader, DEFAULT_LEAD_BLOCKS};
pub use decode::{decode_bytes, Decode, DecodedAudio, SymphoniaDecoder};
pub use device::{OfflineCapture, OfflineDevice, OutputDevice, StreamControl};
pub use error::{Error, Result};
pub use fetch::{extension, Fetch, Fetcher};
pub use graph::{AudioGraph, NodeHandle};
pub use node::{AudioNode, Buffer, Input, NodeId, ProcessContext, BLOCK_SIZE};
pub use schall::Schall;
pub use session::{SessionId, Sessions};

#[cfg(feature = "cpal_sink")]
pub use device::CpalDevice;
