#[cfg(feature = "cpal_sink")]
mod cpal_sink;
mod rtrb_sink;

#[cfg(feature = "cpal_sink")]
pub use cpal_sink::*;
pub use rtrb_sink::*;
