//! Pixel Show - Capture and synchronized playback of Art-Net LED shows.
//!
//! Live DMX universes are recorded into save bundles while a trigger channel
//! is held, then replayed onto LED strips in step with an external audio
//! track.
//!
//! # Architecture
//!
//! - `schema`: Configuration and the output-to-universe topology
//! - `show`: Frame codec, save bundles, the recorder and the player
//! - `device`: Boundaries to the strips, the Art-Net network and audio
//! - `controller`: Idle/record/playback mode switching
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::atomic::AtomicBool;
//! use std::time::Duration;
//!
//! use pixel_show::{
//!     device::{MemoryStrip, NoAudio, share},
//!     show::{Bundle, MonotonicClock, Player},
//! };
//!
//! let bundle = Bundle::load("./saves/2024-05-01-20-15-00_save").unwrap();
//! let strip = share(MemoryStrip::new(bundle.topology().pixel_counts()));
//! let mut player = Player::new(bundle, strip, NoAudio, MonotonicClock::shared());
//!
//! player.play();
//! player.run(Duration::from_millis(10), &AtomicBool::new(false));
//! println!("Delivered {:?} frames", player.stats().frames);
//! player.deinit();
//! ```

pub mod controller;
pub mod device;
pub mod schema;
pub mod show;

// Re-export commonly used types
pub use schema::{ShowConfig, Topology};
pub use show::{Bundle, Player, Recorder, ShowError};
