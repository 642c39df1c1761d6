//! Device module - Boundaries to the LED hardware, the Art-Net network and
//! the audio player.

mod artnet;
mod audio;
mod strip;

pub use artnet::*;
pub use audio::*;
pub use strip::*;
