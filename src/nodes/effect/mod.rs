mod gain;
mod mixer;
mod tap;

pub use gain::*;
pub use mixer::*;
pub use tap::*;
