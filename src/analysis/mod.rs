//! Passive analysis of the shared output.
//!
//! Every adapter owns an [`Analyser`] that reads a tap placed after the
//! shared gain, so what it measures is what is heard. Adapters are driven
//! once per display frame by the caller and follow the root's context as it
//! is created, closed and recreated.

mod analyser;
mod frequency;
mod surface;
mod volume;
mod waveform;

pub use analyser::Analyser;
pub use frequency::{compute_bars, Bar, FrequencyBars};
pub use surface::{Color, Surface};
pub use volume::{rms, VolumeMeter};
pub use waveform::{peak_amplitude, WaveformRecorder, HISTORY_LEN};
