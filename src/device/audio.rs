//! External audio playback boundary.

use std::io;
use std::path::PathBuf;
use std::process::{Child, Command, Stdio};

use crate::schema::AudioConfig;
use crate::show::Anchor;

/// Soundtrack started alongside playback.
///
/// The sink receives the same anchor the player schedules frames against and
/// runs on its own from then on; there is no drift feedback.
pub trait AudioSink: Send {
    /// Start the soundtrack relative to `anchor`.
    fn launch(&mut self, anchor: &Anchor) -> io::Result<()>;

    /// Stop the soundtrack. Calling it when nothing runs is a no-op.
    fn terminate(&mut self);

    fn is_running(&mut self) -> bool;
}

/// Silent sink.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoAudio;

impl AudioSink for NoAudio {
    fn launch(&mut self, _anchor: &Anchor) -> io::Result<()> {
        Ok(())
    }

    fn terminate(&mut self) {}

    fn is_running(&mut self) -> bool {
        false
    }
}

/// Soundtrack played by an external process.
///
/// Spawned as `program args... <file> <anchor-unix-seconds>`; the process
/// is expected to exit on its own at end of file.
#[derive(Debug)]
pub struct ProcessAudio {
    program: String,
    args: Vec<String>,
    file: PathBuf,
    child: Option<Child>,
}

impl ProcessAudio {
    pub fn new(program: impl Into<String>, args: Vec<String>, file: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args,
            file: file.into(),
            child: None,
        }
    }

    /// Build from config; `None` when no command or file is available.
    pub fn from_config(config: &AudioConfig, file: Option<PathBuf>) -> Option<Self> {
        let (program, args) = config.command.split_first()?;
        let file = file.or_else(|| config.file.clone())?;
        Some(Self::new(program.clone(), args.to_vec(), file))
    }

    pub fn file(&self) -> &PathBuf {
        &self.file
    }
}

impl AudioSink for ProcessAudio {
    fn launch(&mut self, anchor: &Anchor) -> io::Result<()> {
        self.terminate();
        if !self.file.is_file() {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("audio file {} not found", self.file.display()),
            ));
        }

        let child = Command::new(&self.program)
            .args(&self.args)
            .arg(&self.file)
            .arg(format!("{:.6}", anchor.unix_seconds()))
            .stdin(Stdio::null())
            .spawn()?;
        log::info!(
            "Playing back audio {} (pid {})",
            self.file.display(),
            child.id()
        );
        self.child = Some(child);
        Ok(())
    }

    fn terminate(&mut self) {
        if let Some(mut child) = self.child.take() {
            if let Err(e) = child.kill() {
                log::debug!("Audio process already gone: {e}");
            }
            let _ = child.wait();
        }
    }

    fn is_running(&mut self) -> bool {
        match self.child.as_mut().map(|c| c.try_wait()) {
            Some(Ok(None)) => true,
            Some(_) => {
                self.child = None;
                false
            }
            None => false,
        }
    }
}

impl Drop for ProcessAudio {
    fn drop(&mut self) {
        self.terminate();
    }
}

/// Audio sink for a show: an external process when configured, else silence.
pub fn audio_for(config: &AudioConfig, bundle_audio: Option<PathBuf>) -> Box<dyn AudioSink> {
    match ProcessAudio::from_config(config, bundle_audio) {
        Some(process) => Box::new(process),
        None => Box::new(NoAudio),
    }
}

impl<A: AudioSink + ?Sized> AudioSink for Box<A> {
    fn launch(&mut self, anchor: &Anchor) -> io::Result<()> {
        (**self).launch(anchor)
    }

    fn terminate(&mut self) {
        (**self).terminate()
    }

    fn is_running(&mut self) -> bool {
        (**self).is_running()
    }
}
