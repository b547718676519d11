use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use derive_more::{Display, Error};

const SECS_PER_DAY: u64 = 24 * 60 * 60;

/// Configure how long local backup files are kept.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct RetentionWindow {
    /// Files older than this many days are pruned.
    pub days: u32,
}

impl Default for RetentionWindow {
    fn default() -> Self {
        Self { days: 7 }
    }
}

#[derive(Debug, Display, Error)]
/// Errors while pruning the backup directory.
pub enum PruneError {
    /// The directory itself can't be listed.
    #[display("Reading {} failed: {source}", dir.display())]
    ReadDir { dir: PathBuf, source: io::Error },
    /// An entry of the directory can't be read.
    #[display("Reading a directory entry failed: {_0}")]
    DirEntry(io::Error),
    /// Inspecting or removing a file failed.
    #[display("Pruning {} failed: {source}", path.display())]
    File { path: PathBuf, source: io::Error },
}

/// Outcome of a prune pass.
#[derive(Debug, Default)]
pub struct Pruned {
    /// Removed files, sorted.
    pub removed: Vec<PathBuf>,
    /// Entries that couldn't be pruned; the pass continued past them.
    pub errors: Vec<PruneError>,
}

impl Pruned {
    pub fn is_success(&self) -> bool {
        self.errors.is_empty()
    }
}

impl RetentionWindow {
    pub fn new(days: u32) -> Self {
        Self { days }
    }

    fn duration(&self) -> Duration {
        Duration::from_secs(u64::from(self.days) * SECS_PER_DAY)
    }

    /// Returns if a file last modified at `modified` is outside the window.
    ///
    /// Modification times in the future are never expired.
    pub fn expired(&self, modified: SystemTime, now: SystemTime) -> bool {
        now.duration_since(modified)
            .is_ok_and(|age| age > self.duration())
    }

    /// Removes every expired regular file directly inside `dir`.
    ///
    /// Subdirectories are left alone. A failing entry doesn't stop the pass.
    pub fn prune(&self, dir: &Path, now: SystemTime) -> Pruned {
        match fs::read_dir(dir) {
            Ok(entries) => self.prune_paths(entries.map(|entry| entry.map(|e| e.path())), now),
            Err(source) => Pruned {
                removed: Vec::new(),
                errors: vec![PruneError::ReadDir {
                    dir: dir.to_path_buf(),
                    source,
                }],
            },
        }
    }

    fn prune_paths(
        &self,
        paths: impl IntoIterator<Item = io::Result<PathBuf>>,
        now: SystemTime,
    ) -> Pruned {
        let mut pruned = Pruned::default();

        for path in paths {
            let path = match path {
                Ok(path) => path,
                Err(e) => {
                    log::warn!(target: "retention", "Reading a directory entry failed: {e}");
                    pruned.errors.push(PruneError::DirEntry(e));
                    continue;
                }
            };

            match self.prune_file(&path, now) {
                Ok(true) => pruned.removed.push(path),
                Ok(false) => {}
                Err(source) => {
                    log::warn!(target: "retention", "Pruning {} failed: {source}", path.display());
                    pruned.errors.push(PruneError::File { path, source });
                }
            }
        }

        pruned.removed.sort();
        pruned
    }

    /// Removes `path` if it is an expired regular file.
    ///
    /// A file that vanished in the meantime counts as already pruned.
    fn prune_file(&self, path: &Path, now: SystemTime) -> io::Result<bool> {
        let metadata = match fs::symlink_metadata(path) {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                log::debug!(target: "retention", "Backup vanished before pruning: {}", path.display());
                return Ok(false);
            }
            Err(e) => return Err(e),
        };

        if !metadata.is_file() {
            return Ok(false);
        }
        if !self.expired(metadata.modified()?, now) {
            log::trace!(target: "retention", "Keeping backup: {}", path.display());
            return Ok(false);
        }

        log::debug!(target: "retention", "Removing expired backup: {}", path.display());
        match fs::remove_file(path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e),
        }
    }
}
