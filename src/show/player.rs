//! Frame-synchronized player for save bundles.

use std::fs::File;
use std::io::BufReader;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use super::bundle::Bundle;
use super::clock::{Anchor, SharedClock};
use super::format::{Decoded, Frame, FrameReader};
use super::scheduler::FrameScheduler;
use super::ShowError;
use crate::device::{AudioSink, SharedStrip, StripDriver};
use crate::schema::Topology;

/// Player lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerState {
    Stopped,
    Playing,
    /// Every universe reached the end of its log.
    Finished,
}

/// Outcome of [`Player::pump`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pump {
    /// Next frame is due after this delay.
    Waiting(Duration),
    Finished,
    Stopped,
}

/// Delivery statistics for the current pass.
#[derive(Debug, Clone, Default)]
pub struct PlaybackStats {
    /// Frames delivered per universe.
    pub frames: Vec<u64>,
    /// Worst delay between a frame's logged offset and its delivery.
    pub max_lateness: Duration,
    /// Universes cut short by unreadable frames.
    pub corrupt: Vec<usize>,
}

impl PlaybackStats {
    pub fn total_frames(&self) -> u64 {
        self.frames.iter().sum()
    }
}

#[derive(Default)]
struct Track {
    reader: Option<FrameReader<BufReader<File>>>,
    /// Frame read ahead, delivered when its offset comes due.
    pending: Option<Frame>,
    done: bool,
}

/// Replays a save bundle onto a strip in sync with an audio sink.
///
/// Each universe has one entry in a due-time queue. When it fires, the frame
/// read ahead for it is written to the strip and the next frame is read and
/// queued at its logged offset from the anchor. Delays are always computed
/// against the live clock, so a late frame never pushes the ones after it.
///
/// Usage:
/// ```ignore
/// let bundle = Bundle::load("./saves/show_save")?;
/// let strip = share(MemoryStrip::new(bundle.topology().pixel_counts()));
/// let mut player = Player::new(bundle, strip, NoAudio, MonotonicClock::shared());
/// loop {
///     player.play();
///     player.run(Duration::from_millis(10), &cancel);
///     if player.state() != PlayerState::Finished {
///         break;
///     }
/// }
/// player.deinit();
/// ```
///
/// Dropping a player that was not deinitialized stops the audio and blanks
/// the strip without waiting for the teardown grace.
pub struct Player<D: StripDriver, A: AudioSink> {
    bundle: Bundle,
    strip: SharedStrip<D>,
    audio: A,
    clock: SharedClock,
    teardown_grace: Duration,
    tracks: Vec<Track>,
    scheduler: FrameScheduler,
    anchor: Option<Anchor>,
    state: PlayerState,
    remaining: usize,
    stats: PlaybackStats,
    /// Logs closed and strip blanked since the last `play`.
    released: bool,
}

impl<D: StripDriver, A: AudioSink> Player<D, A> {
    pub fn new(bundle: Bundle, strip: SharedStrip<D>, audio: A, clock: SharedClock) -> Self {
        let universes = bundle.topology().universe_count();
        Self {
            bundle,
            strip,
            audio,
            clock,
            teardown_grace: Duration::from_millis(200),
            tracks: (0..universes).map(|_| Track::default()).collect(),
            scheduler: FrameScheduler::new(),
            anchor: None,
            state: PlayerState::Stopped,
            remaining: 0,
            stats: PlaybackStats::default(),
            released: true,
        }
    }

    /// Time [`Player::deinit`] waits before releasing resources.
    pub fn with_teardown_grace(mut self, grace: Duration) -> Self {
        self.teardown_grace = grace;
        self
    }

    pub fn bundle(&self) -> &Bundle {
        &self.bundle
    }

    pub fn topology(&self) -> &Topology {
        self.bundle.topology()
    }

    pub fn state(&self) -> PlayerState {
        self.state
    }

    pub fn is_finished(&self) -> bool {
        self.state == PlayerState::Finished
    }

    pub fn stats(&self) -> &PlaybackStats {
        &self.stats
    }

    /// Anchor of the current pass.
    pub fn anchor(&self) -> Option<Anchor> {
        self.anchor
    }

    pub fn strip(&self) -> &SharedStrip<D> {
        &self.strip
    }

    /// Start a pass from the beginning of every log.
    ///
    /// The anchor is taken first and then handed to the audio sink so both
    /// target the same epoch. A universe whose log cannot be opened is
    /// skipped with a warning.
    pub fn play(&mut self) {
        self.scheduler.clear();
        let universes = self.tracks.len();
        self.stats = PlaybackStats {
            frames: vec![0; universes],
            ..Default::default()
        };
        self.remaining = universes;
        self.released = false;

        for universe in 0..universes {
            let track = &mut self.tracks[universe];
            track.pending = None;
            track.done = false;
            let opened = match track.reader.as_mut() {
                Some(reader) => reader.rewind().map_err(ShowError::from),
                None => self
                    .bundle
                    .open_log(universe)
                    .map(|reader| track.reader = Some(reader)),
            };
            if let Err(e) = opened {
                log::warn!("Skipping universe {universe}: {e}");
                track.reader = None;
                track.done = true;
                self.remaining -= 1;
            }
        }

        let anchor = Anchor::capture(self.clock.as_ref());
        self.anchor = Some(anchor);
        if let Err(e) = self.audio.launch(&anchor) {
            log::warn!("Audio playback unavailable: {e}");
        }
        self.state = PlayerState::Playing;
        log::info!(
            "Playing {} ({} universes)",
            self.bundle.root().display(),
            universes
        );

        for (universe, track) in self.tracks.iter().enumerate() {
            if !track.done {
                self.scheduler.schedule(universe, Duration::ZERO);
            }
        }
        if self.remaining == 0 {
            self.finish();
        }
    }

    /// Fire every universe that is due and report when to call again.
    ///
    /// Entries popped after the session left `Playing` are dropped.
    pub fn pump(&mut self) -> Pump {
        loop {
            match self.state {
                PlayerState::Playing => {}
                PlayerState::Finished => return Pump::Finished,
                PlayerState::Stopped => return Pump::Stopped,
            }
            let Some(anchor) = self.anchor else {
                return Pump::Stopped;
            };

            let now = anchor.elapsed(self.clock.as_ref());
            match self.scheduler.pop_due(now) {
                Some(universe) => self.fire(universe, now),
                None => {
                    return match self.scheduler.next_due() {
                        Some(due) => Pump::Waiting(due.saturating_sub(now)),
                        None => Pump::Finished,
                    };
                }
            }
        }
    }

    fn fire(&mut self, universe: usize, now: Duration) {
        let track = &mut self.tracks[universe];
        if track.done {
            return;
        }

        if let Some(frame) = track.pending.take() {
            let range = self.bundle.topology().pixel_range(universe);
            if let Some(spec) = self.bundle.topology().universe(universe) {
                // Pixels past the output's declared length are dropped.
                let len = frame.pixels.len().min(range.len());
                self.strip
                    .lock()
                    .write_span(spec.output, range.start, &frame.pixels[..len]);
            }
            self.stats.frames[universe] += 1;
            let lateness = now.saturating_sub(offset_duration(frame.offset));
            self.stats.max_lateness = self.stats.max_lateness.max(lateness);
        }

        let next = match track.reader.as_mut() {
            Some(reader) => reader.next_frame(),
            None => Ok(Decoded::EndOfStream),
        };
        match next {
            Ok(Decoded::Frame(frame)) => {
                let due = offset_duration(frame.offset);
                track.pending = Some(frame);
                self.scheduler.schedule(universe, due);
            }
            Ok(Decoded::EndOfStream) => self.finish_universe(universe),
            Err(e) => {
                log::warn!("Universe {universe} stopped: {e}");
                self.stats.corrupt.push(universe);
                self.finish_universe(universe);
            }
        }
    }

    fn finish_universe(&mut self, universe: usize) {
        self.tracks[universe].done = true;
        self.remaining = self.remaining.saturating_sub(1);
        log::debug!("Universe {universe} reached end of stream");
        if self.remaining == 0 {
            self.finish();
        }
    }

    fn finish(&mut self) {
        self.audio.terminate();
        self.state = PlayerState::Finished;
        log::info!(
            "Playback finished, {} frames delivered",
            self.stats.total_frames()
        );
    }

    /// Flush every output to the hardware.
    pub fn refresh(&self) {
        self.strip.lock().show_all();
    }

    /// Drive the current pass until it finishes or `cancel` is set.
    ///
    /// Strips are refreshed every `refresh` independently of frame delivery.
    pub fn run(&mut self, refresh: Duration, cancel: &AtomicBool) -> PlayerState {
        let mut next_refresh = self.clock.now();
        loop {
            if cancel.load(Ordering::Acquire) {
                return self.state;
            }
            let pump = self.pump();

            let now = self.clock.now();
            if now >= next_refresh {
                self.refresh();
                next_refresh = now + refresh;
            }

            match pump {
                Pump::Waiting(delay) => {
                    std::thread::sleep(delay.min(next_refresh.saturating_sub(now)));
                }
                Pump::Finished | Pump::Stopped => {
                    self.refresh();
                    return self.state;
                }
            }
        }
    }

    /// End the pass and stop the audio. Safe in any state.
    pub fn stop(&mut self) {
        if self.state != PlayerState::Stopped {
            log::info!("Stopping playback");
        }
        self.state = PlayerState::Stopped;
        self.scheduler.clear();
        self.audio.terminate();
    }

    /// Stop, let in-flight work drain, close the logs and blank the strip.
    pub fn deinit(&mut self) {
        self.stop();
        if !self.teardown_grace.is_zero() {
            std::thread::sleep(self.teardown_grace);
        }
        self.release();
    }

    fn release(&mut self) {
        self.stop();
        for track in &mut self.tracks {
            track.reader = None;
            track.pending = None;
        }
        let mut strip = self.strip.lock();
        strip.blank_all();
        strip.show_all();
        self.released = true;
    }
}

impl<D: StripDriver, A: AudioSink> Drop for Player<D, A> {
    fn drop(&mut self) {
        if !self.released {
            log::debug!("Player dropped without deinit, releasing");
            self.release();
        }
    }
}

fn offset_duration(offset: f64) -> Duration {
    Duration::try_from_secs_f64(offset).unwrap_or(Duration::MAX)
}
