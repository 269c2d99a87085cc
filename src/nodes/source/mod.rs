mod player;
mod resampling_source;

pub use player::*;
pub use resampling_source::*;
