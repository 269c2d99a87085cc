//! Error types for schall.

use thiserror::Error;

/// Everything that can go wrong while loading, playing or configuring sounds.
///
/// Batch operations ([`BufferCache::load`](crate::BufferCache::load),
/// [`Sessions::play_many`](crate::Sessions::play_many),
/// [`Sessions::stop_all`](crate::Sessions::stop_all)) log these and carry on;
/// single operations hand them back to the caller.
#[derive(Error, Debug)]
pub enum Error {
    /// The bytes behind an identifier could not be retrieved.
    #[error("failed to fetch {url}: {reason}")]
    Fetch { url: String, reason: String },

    /// The bytes were retrieved but are not playable audio.
    #[error("failed to decode audio: {0}")]
    Decode(String),

    /// A playback source could not be created or started.
    #[error("failed to start playback: {0}")]
    PlaybackStart(String),

    #[error("no audio context")]
    NoContext,

    #[error("audio context is closed")]
    ContextClosed,

    #[error("sound not loaded: {0}")]
    NotLoaded(String),

    /// The output device refused to open, play or pause.
    #[error("audio output error: {0}")]
    AudioOutput(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl From<toml::de::Error> for Error {
    fn from(err: toml::de::Error) -> Self {
        Error::Config(err.to_string())
    }
}
