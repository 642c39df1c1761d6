//! Mode controller switching between idle, recording and playback.
//!
//! Commands stand in for the two hardware buttons: pressing the button of
//! the active mode returns to idle, pressing the other one switches over.

use std::io;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{Receiver, RecvTimeoutError};
use std::time::Duration;

use crate::device::{ArtNetListener, SharedStrip, StripDriver, audio_for};
use crate::schema::ShowConfig;
use crate::show::{Bundle, Player, Pump, Recorder, SharedClock, ShowError, session_name};

const IDLE_POLL: Duration = Duration::from_millis(100);

/// Operating mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Idle,
    Record,
    Playback,
}

/// Operator input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Record,
    Play,
    Idle,
    Quit,
}

#[derive(Debug, thiserror::Error)]
#[error("Unknown command '{0}' (expected record, play, idle or quit)")]
pub struct UnknownCommand(String);

impl FromStr for Command {
    type Err = UnknownCommand;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "r" | "record" => Ok(Command::Record),
            "p" | "play" => Ok(Command::Play),
            "i" | "idle" => Ok(Command::Idle),
            "q" | "quit" | "exit" => Ok(Command::Quit),
            other => Err(UnknownCommand(other.to_string())),
        }
    }
}

/// Failures that abort a mode and fall back to idle.
#[derive(Debug, thiserror::Error)]
pub enum ModeError {
    #[error("Failed to start Art-Net listener: {0}")]
    Listener(#[source] io::Error),

    #[error("No save bundle found in {0}")]
    NoBundle(PathBuf),

    #[error(transparent)]
    Show(#[from] ShowError),
}

enum Next {
    Switch(Mode),
    Quit,
}

/// Runs the show until told to quit.
///
/// The strip is shared by every session so the hardware stays owned by one
/// driver for the lifetime of the process.
pub struct ModeController<D> {
    config: ShowConfig,
    strip: SharedStrip<D>,
    clock: SharedClock,
    mode: Mode,
    passes: u64,
}

impl<D: StripDriver + 'static> ModeController<D> {
    pub fn new(config: ShowConfig, strip: SharedStrip<D>, clock: SharedClock) -> Self {
        Self {
            config,
            strip,
            clock,
            mode: Mode::Idle,
            passes: 0,
        }
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn strip(&self) -> &SharedStrip<D> {
        &self.strip
    }

    /// Playback passes completed by the most recent playback session.
    pub fn passes(&self) -> u64 {
        self.passes
    }

    /// Process commands until `Quit`, a closed channel or `interrupt`.
    ///
    /// The active session is always torn down before returning.
    pub fn run(&mut self, commands: &Receiver<Command>, interrupt: &AtomicBool) {
        log::info!("Controller idle, waiting for a command");
        loop {
            let next = match self.mode {
                Mode::Idle => self.idle(commands, interrupt),
                Mode::Record => self.record(commands, interrupt),
                Mode::Playback => self.playback(commands, interrupt),
            };
            let next = next.unwrap_or_else(|e| {
                log::error!("{:?} mode failed: {e}", self.mode);
                Next::Switch(Mode::Idle)
            });

            match next {
                Next::Switch(mode) => {
                    if mode != self.mode {
                        log::info!("Switching to {mode:?} mode");
                    }
                    self.mode = mode;
                }
                Next::Quit => {
                    self.mode = Mode::Idle;
                    log::info!("Controller stopped");
                    return;
                }
            }
        }
    }

    fn idle(&self, commands: &Receiver<Command>, interrupt: &AtomicBool) -> Result<Next, ModeError> {
        loop {
            match wait_for_command(commands, IDLE_POLL, interrupt) {
                Some(Command::Record) => return Ok(Next::Switch(Mode::Record)),
                Some(Command::Play) => return Ok(Next::Switch(Mode::Playback)),
                Some(Command::Quit) => return Ok(Next::Quit),
                Some(Command::Idle) | None => {}
            }
            if interrupt.load(Ordering::Acquire) {
                return Ok(Next::Quit);
            }
        }
    }

    fn record(&self, commands: &Receiver<Command>, interrupt: &AtomicBool) -> Result<Next, ModeError> {
        let mut listener =
            ArtNetListener::bind(self.config.artnet_bind.as_str()).map_err(ModeError::Listener)?;
        let recorder = Recorder::new(
            &self.config.pixel_counts,
            self.config.trigger_value,
            self.strip.clone(),
            self.clock.clone(),
        );
        recorder.record(&session_name(), &self.config.save_dir)?;
        recorder.attach(&listener);

        let refresh = self.config.record_refresh();
        let next = loop {
            recorder.refresh();
            match wait_for_command(commands, refresh, interrupt) {
                Some(Command::Record | Command::Idle) => break Next::Switch(Mode::Idle),
                Some(Command::Play) => break Next::Switch(Mode::Playback),
                Some(Command::Quit) => break Next::Quit,
                None if interrupt.load(Ordering::Acquire) => break Next::Quit,
                None => {}
            }
        };

        listener.shutdown();
        if let Some(stats) = recorder.deinit(self.config.teardown_grace()) {
            log::info!("Saved {stats}");
        }
        Ok(next)
    }

    fn playback(
        &mut self,
        commands: &Receiver<Command>,
        interrupt: &AtomicBool,
    ) -> Result<Next, ModeError> {
        let save_dir = &self.config.save_dir;
        let root = Bundle::newest_in(save_dir)
            .map_err(ShowError::from)?
            .ok_or_else(|| ModeError::NoBundle(save_dir.clone()))?;
        let bundle = Bundle::load(&root)?;
        log::info!("Selected bundle {}", root.display());

        let audio = audio_for(&self.config.audio, bundle.audio_file());
        let mut player = Player::new(bundle, self.strip.clone(), audio, self.clock.clone())
            .with_teardown_grace(self.config.teardown_grace());
        player.play();
        self.passes = 0;

        let refresh = self.config.playback_refresh();
        let mut looping = true;
        let next = loop {
            let wait = match player.pump() {
                Pump::Waiting(delay) => delay.min(refresh),
                Pump::Finished if looping => {
                    self.passes += 1;
                    if player.stats().total_frames() == 0 {
                        log::warn!("{} holds no frames, not looping", root.display());
                        looping = false;
                    } else {
                        player.refresh();
                        player.play();
                    }
                    refresh
                }
                Pump::Finished | Pump::Stopped => refresh,
            };
            player.refresh();

            match wait_for_command(commands, wait, interrupt) {
                Some(Command::Play | Command::Idle) => break Next::Switch(Mode::Idle),
                Some(Command::Record) => break Next::Switch(Mode::Record),
                Some(Command::Quit) => break Next::Quit,
                None if interrupt.load(Ordering::Acquire) => break Next::Quit,
                None => {}
            }
        };

        player.deinit();
        Ok(next)
    }
}

/// Wait up to `timeout` for a command. A closed channel reads as `Quit`.
fn wait_for_command(
    commands: &Receiver<Command>,
    timeout: Duration,
    interrupt: &AtomicBool,
) -> Option<Command> {
    if interrupt.load(Ordering::Acquire) {
        return None;
    }
    match commands.recv_timeout(timeout) {
        Ok(command) => Some(command),
        Err(RecvTimeoutError::Timeout) => None,
        Err(RecvTimeoutError::Disconnected) => Some(Command::Quit),
    }
}
