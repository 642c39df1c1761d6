//! Trigger-gated recorder for live Art-Net pixel frames.

use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use super::bundle::Bundle;
use super::clock::{Anchor, SharedClock};
use super::format::{FrameWriter, Rgb};
use super::Result;
use crate::device::{FrameCallback, SharedStrip, StripDriver, UniverseSource};
use crate::schema::{CHANNELS_PER_UNIVERSE, Correction, Topology, sanitize_trigger};

/// Recorder session state.
///
/// `Idle -> Armed` on [`Recorder::record`], `Armed -> Capturing` on the
/// trigger's rising edge, `Capturing -> Gated` when the trigger drops, and
/// any state `-> Stopped` on [`Recorder::stop_record`]. A gated session
/// ignores input until it is armed again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordState {
    Idle,
    Armed,
    Capturing,
    Gated,
    Stopped,
}

/// Summary of a closed recording session.
#[derive(Debug, Clone)]
pub struct RecordingStats {
    /// Bundle directory.
    pub bundle: PathBuf,
    /// Frames written per universe.
    pub frames: Vec<u64>,
}

impl RecordingStats {
    pub fn total_frames(&self) -> u64 {
        self.frames.iter().sum()
    }
}

impl std::fmt::Display for RecordingStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} frames across {} universes in {}",
            self.total_frames(),
            self.frames.len(),
            self.bundle.display()
        )
    }
}

struct Session {
    state: RecordState,
    anchor: Option<Anchor>,
    bundle: Option<PathBuf>,
    logs: Vec<FrameWriter<BufWriter<File>>>,
}

impl Session {
    fn close(&mut self) -> Option<RecordingStats> {
        if self.state != RecordState::Idle {
            self.state = RecordState::Stopped;
        }
        self.anchor = None;

        let bundle = self.bundle.take()?;
        let frames = self
            .logs
            .drain(..)
            .enumerate()
            .map(|(universe, writer)| {
                let written = writer.frames_written();
                if let Err(e) = writer.close() {
                    log::debug!("Closing log of universe {universe} failed: {e}");
                }
                written
            })
            .collect();

        let stats = RecordingStats { bundle, frames };
        log::info!("Stopped recording: {stats}");
        Some(stats)
    }
}

struct Shared<D> {
    topology: Topology,
    trigger_value: u8,
    corrections: Vec<Correction>,
    strip: SharedStrip<D>,
    clock: SharedClock,
    session: Mutex<Session>,
}

impl<D> Drop for Shared<D> {
    fn drop(&mut self) {
        // Last handle gone with a session still open.
        self.session.get_mut().close();
    }
}

/// Records live universe frames into a save bundle.
///
/// Frames are only written while channel 512 of universe 0 holds the trigger
/// value. Every written frame is also mirrored into the strip buffer; the
/// caller flushes it with [`Recorder::refresh`].
///
/// Usage:
/// ```ignore
/// let recorder = Recorder::new(&[120], 0, strip, clock);
/// recorder.record("show_save", Path::new("./saves"))?;
/// recorder.attach(&listener);
/// loop {
///     recorder.refresh();
///     std::thread::sleep(Duration::from_millis(100));
/// }
/// recorder.deinit(Duration::from_millis(200));
/// ```
pub struct Recorder<D> {
    shared: Arc<Shared<D>>,
}

impl<D> Clone for Recorder<D> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<D: StripDriver + 'static> Recorder<D> {
    /// Create a recorder for the given outputs.
    ///
    /// Out-of-range parameters are corrected and logged, see
    /// [`Recorder::corrections`].
    pub fn new(
        pixel_counts: &[usize],
        trigger_value: i64,
        strip: SharedStrip<D>,
        clock: SharedClock,
    ) -> Self {
        let (topology, mut corrections) = Topology::from_pixel_counts(pixel_counts);
        let (trigger_value, trigger_correction) = sanitize_trigger(trigger_value);
        corrections.extend(trigger_correction);

        Self {
            shared: Arc::new(Shared {
                topology,
                trigger_value,
                corrections,
                strip,
                clock,
                session: Mutex::new(Session {
                    state: RecordState::Idle,
                    anchor: None,
                    bundle: None,
                    logs: Vec::new(),
                }),
            }),
        }
    }

    pub fn topology(&self) -> &Topology {
        &self.shared.topology
    }

    pub fn trigger_value(&self) -> u8 {
        self.shared.trigger_value
    }

    /// Parameters corrected at construction.
    pub fn corrections(&self) -> &[Correction] {
        &self.shared.corrections
    }

    pub fn state(&self) -> RecordState {
        self.shared.session.lock().state
    }

    pub fn strip(&self) -> &SharedStrip<D> {
        &self.shared.strip
    }

    /// Arm a new session writing to `dir/name`.
    ///
    /// Fails with [`ShowError::BundleExists`](super::ShowError::BundleExists)
    /// if the bundle is already there. A session still open is closed first.
    pub fn record(&self, name: &str, dir: &Path) -> Result<PathBuf> {
        self.stop_record();

        let (bundle, logs) = Bundle::create(dir, name, &self.shared.topology)?;
        let mut session = self.shared.session.lock();
        session.logs = logs;
        session.bundle = Some(bundle.root().to_path_buf());
        session.anchor = Some(Anchor::capture(self.shared.clock.as_ref()));
        session.state = RecordState::Armed;

        log::info!(
            "Enabled recording to {}, waiting for trigger {} on universe 0 channel 512",
            bundle.root().display(),
            self.shared.trigger_value
        );
        Ok(bundle.root().to_path_buf())
    }

    /// Handle one universe frame from the network.
    ///
    /// Frames shorter than 512 channels are treated as zero-padded.
    pub fn on_frame(&self, universe: usize, data: &[u8]) {
        let shared = &*self.shared;
        if universe >= shared.topology.universe_count() {
            return;
        }

        let mut session = shared.session.lock();
        if !matches!(session.state, RecordState::Armed | RecordState::Capturing) {
            return;
        }

        if universe == 0 {
            let trigger = data.get(CHANNELS_PER_UNIVERSE - 1).copied().unwrap_or(0);
            let latched = session.state == RecordState::Capturing;
            if trigger == shared.trigger_value && !latched {
                log::info!("Got trigger, recording started");
                session.anchor = Some(Anchor::capture(shared.clock.as_ref()));
                session.state = RecordState::Capturing;
            } else if trigger != shared.trigger_value && latched {
                log::info!("Got trigger, recording ended");
                session.state = RecordState::Gated;
            }
        }

        if session.state != RecordState::Capturing {
            return;
        }

        let offset = session
            .anchor
            .map_or(Duration::ZERO, |anchor| anchor.elapsed(shared.clock.as_ref()))
            .as_secs_f64();
        let range = shared.topology.pixel_range(universe);
        let pixels: Vec<Rgb> = (0..range.len())
            .map(|i| {
                let channel = |c: usize| data.get(i * 3 + c).copied().unwrap_or(0);
                Rgb::new(channel(0), channel(1), channel(2))
            })
            .collect();

        if let Some(writer) = session.logs.get_mut(universe) {
            if let Err(e) = writer.append(offset, &pixels) {
                log::error!("Failed to write frame for universe {universe}: {e}");
            }
        }

        if let Some(spec) = shared.topology.universe(universe) {
            shared.strip.lock().write_span(spec.output, range.start, &pixels);
        }
    }

    /// Callback feeding frames of `universe` into this recorder.
    pub fn callback(&self, universe: usize) -> FrameCallback {
        let recorder = self.clone();
        Arc::new(move |data: &[u8]| recorder.on_frame(universe, data))
    }

    /// Register a callback for every universe of the topology.
    pub fn attach<S: UniverseSource + ?Sized>(&self, source: &S) {
        for universe in 0..self.shared.topology.universe_count() {
            source.register_listener(universe as u16, self.callback(universe));
        }
    }

    /// Flush the monitored pixels of every output to the strip.
    pub fn refresh(&self) {
        self.shared.strip.lock().show_all();
    }

    /// Close the current session.
    ///
    /// Idempotent: returns the session summary the first time and `None`
    /// once nothing is open. Close failures are logged and ignored.
    pub fn stop_record(&self) -> Option<RecordingStats> {
        self.shared.session.lock().close()
    }

    /// Stop recording and wait `grace` so in-flight callbacks drain.
    pub fn deinit(&self, grace: Duration) -> Option<RecordingStats> {
        let stats = self.stop_record();
        if !grace.is_zero() {
            std::thread::sleep(grace);
        }
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{MemoryStrip, share};
    use crate::show::{Decoded, ManualClock, ShowError};
    use std::fs;
    use tempfile::tempdir;

    fn universe_frame(pixels: &[Rgb], trigger: u8) -> Vec<u8> {
        let mut data = vec![0u8; CHANNELS_PER_UNIVERSE];
        for (i, p) in pixels.iter().enumerate() {
            data[i * 3..i * 3 + 3].copy_from_slice(&[p.r, p.g, p.b]);
        }
        data[CHANNELS_PER_UNIVERSE - 1] = trigger;
        data
    }

    fn recorder(counts: &[usize], trigger: i64) -> (Recorder<MemoryStrip>, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new());
        let strip = share(MemoryStrip::new(counts));
        (Recorder::new(counts, trigger, strip, clock.clone()), clock)
    }

    fn log_lines(bundle: &Path, universe: usize) -> Vec<String> {
        fs::read_to_string(bundle.join(format!("U{universe}.txt")))
            .unwrap()
            .lines()
            .map(str::to_string)
            .collect()
    }

    #[test]
    fn test_frames_ignored_until_armed() {
        let (recorder, _) = recorder(&[10], 0);
        recorder.on_frame(0, &universe_frame(&[Rgb::new(1, 1, 1)], 0));
        assert_eq!(recorder.state(), RecordState::Idle);
        assert_eq!(recorder.strip().lock().buffer(0)[0], Rgb::BLACK);
    }

    #[test]
    fn test_trigger_edges() {
        let dir = tempdir().unwrap();
        let (recorder, clock) = recorder(&[10], 0);
        let bundle = recorder.record("edges", dir.path()).unwrap();

        let mut states = Vec::new();
        for (step, trigger) in [5u8, 5, 0, 0, 5].into_iter().enumerate() {
            clock.set(Duration::from_millis(100 * step as u64));
            let color = Rgb::new(step as u8, 0, 0);
            recorder.on_frame(0, &universe_frame(&[color; 10], trigger));
            states.push(recorder.state());
        }

        assert_eq!(
            states,
            vec![
                RecordState::Armed,
                RecordState::Armed,
                RecordState::Capturing,
                RecordState::Capturing,
                RecordState::Gated,
            ]
        );

        let lines = log_lines(&bundle, 0);
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("0 2 0 0"));
        assert!(lines[1].starts_with("0.1 3 0 0"));

        // Gated sessions stay closed even if the trigger returns.
        recorder.on_frame(0, &universe_frame(&[Rgb::BLACK; 10], 0));
        assert_eq!(recorder.state(), RecordState::Gated);
        assert_eq!(log_lines(&bundle, 0).len(), 2);
    }

    #[test]
    fn test_only_universe_zero_gates() {
        let dir = tempdir().unwrap();
        let (recorder, _) = recorder(&[200], 0);
        let bundle = recorder.record("gate", dir.path()).unwrap();

        // Trigger value on universe 1 does not start capture.
        recorder.on_frame(1, &universe_frame(&[Rgb::new(1, 2, 3); 30], 0));
        assert_eq!(recorder.state(), RecordState::Armed);

        recorder.on_frame(0, &universe_frame(&[Rgb::new(4, 4, 4); 170], 0));
        // A non-trigger byte on universe 1 does not stop it either.
        recorder.on_frame(1, &universe_frame(&[Rgb::new(1, 2, 3); 30], 9));
        assert_eq!(recorder.state(), RecordState::Capturing);

        assert_eq!(log_lines(&bundle, 0).len(), 1);
        let line = &log_lines(&bundle, 1)[0];
        assert_eq!(line.split_whitespace().count(), 1 + 30 * 3);

        let strip = recorder.strip().lock();
        assert_eq!(strip.buffer(0)[169], Rgb::new(4, 4, 4));
        assert_eq!(strip.buffer(0)[170], Rgb::new(1, 2, 3));
        assert_eq!(strip.buffer(0)[199], Rgb::new(1, 2, 3));
    }

    #[test]
    fn test_anchor_restarts_on_trigger() {
        let dir = tempdir().unwrap();
        let (recorder, clock) = recorder(&[1], 0);
        let bundle = recorder.record("anchor", dir.path()).unwrap();

        clock.set(Duration::from_secs(5));
        recorder.on_frame(0, &universe_frame(&[Rgb::new(1, 1, 1)], 0));
        clock.set(Duration::from_millis(5500));
        recorder.on_frame(0, &universe_frame(&[Rgb::new(1, 1, 1)], 0));

        let lines = log_lines(&bundle, 0);
        assert_eq!(lines, vec!["0 1 1 1", "0.5 1 1 1"]);
    }

    #[test]
    fn test_short_frames_are_padded() {
        let dir = tempdir().unwrap();
        let (recorder, _) = recorder(&[3], 0);
        let bundle = recorder.record("short", dir.path()).unwrap();

        recorder.on_frame(0, &[7, 8, 9, 10]);
        assert_eq!(log_lines(&bundle, 0), vec!["0 7 8 9 10 0 0 0 0 0"]);
    }

    #[test]
    fn test_refresh_shows_monitored_pixels() {
        let dir = tempdir().unwrap();
        let (recorder, _) = recorder(&[2], 0);
        recorder.record("monitor", dir.path()).unwrap();
        recorder.on_frame(0, &universe_frame(&[Rgb::new(9, 9, 9); 2], 0));

        assert_eq!(recorder.strip().lock().shown(0)[0], Rgb::BLACK);
        recorder.refresh();
        assert_eq!(recorder.strip().lock().shown(0)[0], Rgb::new(9, 9, 9));
    }

    #[test]
    fn test_record_refuses_existing_bundle() {
        let dir = tempdir().unwrap();
        let (recorder, _) = recorder(&[10], 0);
        recorder.record("dup", dir.path()).unwrap();
        recorder.stop_record();
        let err = recorder.record("dup", dir.path()).unwrap_err();
        assert!(matches!(err, ShowError::BundleExists(_)));
        assert_eq!(recorder.state(), RecordState::Stopped);
    }

    #[test]
    fn test_stop_record_is_idempotent() {
        let dir = tempdir().unwrap();
        let (recorder, _) = recorder(&[10], 0);
        let bundle = recorder.record("stop", dir.path()).unwrap();
        recorder.on_frame(0, &universe_frame(&[Rgb::new(1, 2, 3); 10], 0));

        let stats = recorder.stop_record().unwrap();
        assert_eq!(stats.bundle, bundle);
        assert_eq!(stats.frames, vec![1]);
        assert_eq!(recorder.state(), RecordState::Stopped);

        assert!(recorder.stop_record().is_none());
        assert!(recorder.deinit(Duration::ZERO).is_none());
        assert_eq!(recorder.state(), RecordState::Stopped);

        recorder.on_frame(0, &universe_frame(&[Rgb::new(1, 2, 3); 10], 0));
        assert_eq!(log_lines(&bundle, 0).len(), 1);
    }

    #[test]
    fn test_dropping_last_handle_closes_session() {
        let dir = tempdir().unwrap();
        let (recorder, _) = recorder(&[4], 0);
        let bundle = recorder.record("dropped", dir.path()).unwrap();
        let callback = recorder.callback(0);
        callback(&universe_frame(&[Rgb::new(6, 6, 6); 4], 0)[..]);
        assert_eq!(recorder.state(), RecordState::Capturing);

        drop(recorder);
        // The callback still holds the session open.
        callback(&universe_frame(&[Rgb::new(7, 7, 7); 4], 0)[..]);
        drop(callback);

        let reloaded = Bundle::load(&bundle).unwrap();
        let mut reader = reloaded.open_log(0).unwrap();
        let mut frames = Vec::new();
        while let Decoded::Frame(frame) = reader.next_frame().unwrap() {
            frames.push(frame.pixels[0]);
        }
        assert_eq!(frames, vec![Rgb::new(6, 6, 6), Rgb::new(7, 7, 7)]);
    }

    #[test]
    fn test_corrections_recorded() {
        let (recorder, _) = recorder(&[700, 1, 1, 1, 1], 256);
        assert_eq!(recorder.trigger_value(), 255);
        assert_eq!(recorder.topology().pixel_counts(), &[680, 1, 1, 1]);
        assert_eq!(recorder.corrections().len(), 3);
    }

    #[test]
    fn test_callback_and_attach() {
        struct Collect(Mutex<Vec<(u16, FrameCallback)>>);
        impl UniverseSource for Collect {
            fn register_listener(&self, universe: u16, callback: FrameCallback) {
                self.0.lock().push((universe, callback));
            }
        }

        let dir = tempdir().unwrap();
        let (recorder, _) = recorder(&[200], 0);
        let bundle = recorder.record("attach", dir.path()).unwrap();

        let source = Collect(Mutex::new(Vec::new()));
        recorder.attach(&source);
        let callbacks = source.0.into_inner();
        assert_eq!(callbacks.iter().map(|(u, _)| *u).collect::<Vec<_>>(), vec![0, 1]);

        (callbacks[0].1)(&universe_frame(&[Rgb::new(1, 1, 1); 170], 0)[..]);
        (callbacks[1].1)(&universe_frame(&[Rgb::new(2, 2, 2); 30], 0)[..]);
        let stats = recorder.stop_record().unwrap();
        assert_eq!(stats.frames, vec![1, 1]);

        let reloaded = Bundle::load(&bundle).unwrap();
        let mut reader = reloaded.open_log(1).unwrap();
        match reader.next_frame().unwrap() {
            Decoded::Frame(frame) => assert_eq!(frame.pixels, vec![Rgb::new(2, 2, 2); 30]),
            Decoded::EndOfStream => panic!("expected a frame"),
        }
    }
}
