use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use tracing::{debug, warn};

use crate::{wrap_io_err, Error};

/// Directory a temporary file for `target` must live in so the final rename
/// stays on one filesystem
pub(crate) fn target_dir(target: &Path) -> &Path {
    match target.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    }
}

/// A package being written next to its target. Nothing is visible at the
/// target until [`PendingWrite::commit`]; dropping or aborting removes the
/// temporary file.
pub struct PendingWrite {
    tmp: NamedTempFile,
    target: PathBuf,
}

impl PendingWrite {
    pub fn new(target: impl AsRef<Path>) -> Result<PendingWrite, Error> {
        let target = target.as_ref().to_path_buf();
        let dir = target_dir(&target);
        let tmp = tempfile::Builder::new()
            .prefix(".nvpk.")
            .suffix(".tmp")
            .tempfile_in(dir)
            .map_err(wrap_io_err!(dir, "Creating temporary package file"))?;
        debug!("Writing {} through {}", target.display(), tmp.path().display());
        Ok(PendingWrite { tmp, target })
    }

    pub fn file(&mut self) -> &mut File {
        self.tmp.as_file_mut()
    }

    pub fn path(&self) -> &Path {
        self.tmp.path()
    }

    pub fn target(&self) -> &Path {
        &self.target
    }

    /// Flush, sync and rename onto the target
    pub fn commit(self) -> Result<File, Error> {
        self.finish(true)
    }

    /// Like [`PendingWrite::commit`], but fails if the target appeared in
    /// the meantime
    pub fn commit_new(self) -> Result<File, Error> {
        self.finish(false)
    }

    fn finish(mut self, overwrite: bool) -> Result<File, Error> {
        let target = self.target;
        self.tmp
            .as_file_mut()
            .flush()
            .map_err(wrap_io_err!(self.tmp.path(), "Flushing package"))?;
        self.tmp
            .as_file()
            .sync_all()
            .map_err(wrap_io_err!(self.tmp.path(), "Syncing package"))?;
        let persisted = if overwrite {
            self.tmp.persist(&target)
        } else {
            self.tmp.persist_noclobber(&target)
        };
        persisted.map_err(|err| Error::io(err.error, &target, "Renaming package into place"))
    }

    pub fn abort(self) {
        let path = self.tmp.path().to_path_buf();
        if let Err(err) = self.tmp.close() {
            warn!("Failed to remove {}: {}", path.display(), err);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;

    #[test]
    fn commit_replaces_target() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("out.nvpk");
        fs::write(&target, b"old").unwrap();

        let mut pending = PendingWrite::new(&target).unwrap();
        pending.file().write_all(b"new").unwrap();
        assert_eq!(fs::read(&target).unwrap(), b"old");
        pending.commit().unwrap();

        assert_eq!(fs::read(&target).unwrap(), b"new");
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn commit_new_keeps_existing_target() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("out.nvpk");

        let mut pending = PendingWrite::new(&target).unwrap();
        pending.file().write_all(b"late").unwrap();
        fs::write(&target, b"raced").unwrap();
        let err = pending.commit_new().unwrap_err();

        assert_eq!(err.kind(), novuspack_core::ErrorKind::Io);
        assert_eq!(fs::read(&target).unwrap(), b"raced");
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn abort_leaves_no_trace() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("out.nvpk");

        let mut pending = PendingWrite::new(&target).unwrap();
        pending.file().write_all(b"partial").unwrap();
        let tmp = pending.path().to_path_buf();
        pending.abort();

        assert!(!tmp.exists());
        assert!(!target.exists());
    }
}
