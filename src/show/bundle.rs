//! Save bundle directories.

use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use super::format::{
    FrameReader, FrameWriter, METADATA_FILE, decode_metadata, encode_metadata, frame_log_name,
};
use super::{Result, ShowError};
use crate::schema::Topology;

/// Suffix of bundle directory names produced by [`session_name`].
pub const BUNDLE_SUFFIX: &str = "_save";

/// Optional soundtrack stored inside a bundle.
pub const AUDIO_FILE: &str = "audio.wav";

/// Timestamped bundle name, e.g. `2024-05-01-20-15-00_save`.
pub fn session_name() -> String {
    format!(
        "{}{BUNDLE_SUFFIX}",
        chrono::Local::now().format("%Y-%m-%d-%H-%M-%S")
    )
}

/// A save bundle on disk with its validated topology.
#[derive(Debug, Clone)]
pub struct Bundle {
    root: PathBuf,
    topology: Topology,
}

impl Bundle {
    /// Create a new bundle directory `dir/name`.
    ///
    /// Metadata is written and synced before any frame log exists. Returns
    /// the bundle and one empty log writer per universe.
    pub fn create(
        dir: &Path,
        name: &str,
        topology: &Topology,
    ) -> Result<(Self, Vec<FrameWriter<BufWriter<File>>>)> {
        fs::create_dir_all(dir)?;
        let root = dir.join(name);
        match fs::create_dir(&root) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                return Err(ShowError::BundleExists(root));
            }
            Err(e) => return Err(e.into()),
        }

        let partial = PartialBundle::new(&root);
        let mut metadata = File::create(root.join(METADATA_FILE))?;
        metadata.write_all(encode_metadata(topology).as_bytes())?;
        metadata.sync_all()?;

        let logs = (0..topology.universe_count())
            .map(|universe| {
                File::create(root.join(frame_log_name(universe)))
                    .map(|file| FrameWriter::new(BufWriter::new(file)))
            })
            .collect::<io::Result<Vec<_>>>()?;
        partial.commit();

        Ok((
            Self {
                root,
                topology: topology.clone(),
            },
            logs,
        ))
    }

    /// Load and validate an existing bundle.
    ///
    /// Bundles without metadata, with inconsistent metadata or with a
    /// missing frame log are rejected.
    pub fn load<P: AsRef<Path>>(root: P) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        let metadata_path = root.join(METADATA_FILE);
        if !metadata_path.is_file() {
            return Err(ShowError::MissingMetadata(root));
        }
        let topology = decode_metadata(&fs::read_to_string(&metadata_path)?)?;

        for universe in 0..topology.universe_count() {
            let path = root.join(frame_log_name(universe));
            if !path.is_file() {
                return Err(ShowError::MissingFrameLog { universe, path });
            }
        }

        Ok(Self { root, topology })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn topology(&self) -> &Topology {
        &self.topology
    }

    pub fn log_path(&self, universe: usize) -> PathBuf {
        self.root.join(frame_log_name(universe))
    }

    /// Open a universe's frame log for reading.
    pub fn open_log(&self, universe: usize) -> Result<FrameReader<BufReader<File>>> {
        let path = self.log_path(universe);
        match File::open(&path) {
            Ok(file) => Ok(FrameReader::new(BufReader::new(file))),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                Err(ShowError::MissingFrameLog { universe, path })
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Soundtrack stored with the bundle, if any.
    pub fn audio_file(&self) -> Option<PathBuf> {
        let path = self.root.join(AUDIO_FILE);
        path.is_file().then_some(path)
    }

    /// Most recently created bundle directory in `dir`.
    ///
    /// Only directories named with [`BUNDLE_SUFFIX`] are considered.
    pub fn newest_in<P: AsRef<Path>>(dir: P) -> io::Result<Option<PathBuf>> {
        let mut newest: Option<(SystemTime, PathBuf)> = None;
        for entry in fs::read_dir(dir)? {
            let entry = entry?;
            let path = entry.path();
            let is_bundle = path
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.ends_with(BUNDLE_SUFFIX));
            if !is_bundle || !path.is_dir() {
                continue;
            }
            let meta = entry.metadata()?;
            let created = meta.created().or_else(|_| meta.modified())?;
            if newest.as_ref().is_none_or(|(time, _)| created > *time) {
                newest = Some((created, path));
            }
        }
        Ok(newest.map(|(_, path)| path))
    }
}

/// Removes a half-written bundle directory unless committed.
struct PartialBundle<'a> {
    root: &'a Path,
    committed: bool,
}

impl<'a> PartialBundle<'a> {
    fn new(root: &'a Path) -> Self {
        Self {
            root,
            committed: false,
        }
    }

    fn commit(mut self) {
        self.committed = true;
    }
}

impl Drop for PartialBundle<'_> {
    fn drop(&mut self) {
        if self.committed {
            return;
        }
        log::warn!("Removing incomplete bundle {}", self.root.display());
        if let Err(e) = fs::remove_dir_all(self.root) {
            log::debug!("Failed to remove {}: {e}", self.root.display());
        }
    }
}
