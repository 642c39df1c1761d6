//! Capture and synchronized playback of pixel shows.
//!
//! A session is stored as a save bundle: a directory holding the universe
//! layout and one append-only frame log per universe.
//!
//! # Bundle Layout
//!
//! ```text
//! 2024-05-01-20-15-00_save/
//!   metadata.txt   5 lines: universe count, output count, pixel counts,
//!                  universe -> output table, universe -> sub-index table
//!   U0.txt         one frame per line: "<seconds> r0 g0 b0 r1 g1 b1 ..."
//!   U1.txt
//!   ...
//!   audio.wav      optional soundtrack played alongside the lights
//! ```
//!
//! The [`Recorder`] writes bundles from live Art-Net input gated by a
//! trigger channel; the [`Player`] replays them against a shared clock
//! anchor that is also handed to the external audio process.

mod bundle;
mod clock;
mod format;
mod player;
mod recorder;
mod scheduler;

use std::path::PathBuf;

pub use bundle::{AUDIO_FILE, BUNDLE_SUFFIX, Bundle, session_name};
pub use clock::{Anchor, Clock, ManualClock, MonotonicClock, ScaledClock, SharedClock};
pub use format::{
    Decoded, Frame, FrameReader, FrameWriter, METADATA_FIELDS, METADATA_FILE, Rgb, decode_frame,
    decode_metadata, encode_frame, encode_metadata, frame_log_name,
};
pub use player::{PlaybackStats, Player, PlayerState, Pump};
pub use recorder::{RecordState, Recorder, RecordingStats};
pub use scheduler::FrameScheduler;

/// Errors raised while writing or reading save bundles.
#[derive(Debug, thiserror::Error)]
pub enum ShowError {
    #[error("Save bundle {0} already exists")]
    BundleExists(PathBuf),

    #[error("Save bundle {0} has no metadata")]
    MissingMetadata(PathBuf),

    #[error("Corrupt metadata on line {line}: {reason}")]
    CorruptMetadata { line: usize, reason: String },

    #[error("Corrupt frame on line {line}: {reason}")]
    CorruptFrame { line: usize, reason: String },

    #[error("Frame log for universe {universe} missing at {path}")]
    MissingFrameLog { universe: usize, path: PathBuf },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ShowError>;
