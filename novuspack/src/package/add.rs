//! Adding and removing files.
use std::fs::{self, Metadata};
use std::path::{Path, PathBuf};

use novuspack_core::{is_special_type, path, SPECIAL_FILE_TYPE_START};
use tracing::{debug, info, warn};

use super::{clean_path, open_source, path_str, Package};
use crate::entry::FileEntry;
use crate::ext::to_nanos;
use crate::hierarchy::FilesystemInfo;
use crate::options::AddFileOptions;
use crate::store::Removal;
use crate::{wrap_io_err, Error};

/// Host directory `depth` levels above the directory holding `path`. A
/// negative depth reaches the root.
fn derive_base(path: &Path, depth: i32) -> PathBuf {
    if depth < 0 {
        return path
            .ancestors()
            .last()
            .map(Path::to_path_buf)
            .unwrap_or_default();
    }
    let mut base = path.parent().unwrap_or_else(|| Path::new(""));
    for _ in 0..depth {
        match base.parent() {
            Some(parent) => base = parent,
            None => break,
        }
    }
    base.to_path_buf()
}

fn strip_base(fs_path: &Path, base: &Path, field: &'static str) -> Result<String, Error> {
    let (fs_path, base) = (clean_path(fs_path), clean_path(base));
    let relative = fs_path.strip_prefix(&base).map_err(|_| {
        Error::validation(
            "path is outside the base directory",
            field,
            fs_path.display(),
            format!("path below {}", base.display()),
        )
    })?;
    Ok(path::normalize(path_str(relative)?)?)
}

/// Reserved special types belong to the engine
fn check_file_type(options: &AddFileOptions) -> Result<(), Error> {
    if is_special_type(options.file_type) {
        return Err(Error::validation(
            "file type is reserved for special files",
            "file_type",
            options.file_type,
            format!("type below {}", SPECIAL_FILE_TYPE_START),
        ));
    }
    Ok(())
}

#[cfg(unix)]
fn capture(info: &mut FilesystemInfo, metadata: &Metadata, options: &AddFileOptions) {
    use std::os::unix::fs::MetadataExt;

    info.is_executable = metadata.mode() & 0o111 != 0;
    if options.preserve_permissions {
        info.mode = Some(metadata.mode());
        info.mod_time = metadata.modified().ok().map(to_nanos);
    }
    if options.preserve_ownership {
        info.uid = Some(metadata.uid());
        info.gid = Some(metadata.gid());
    }
}

#[cfg(not(unix))]
fn capture(info: &mut FilesystemInfo, metadata: &Metadata, options: &AddFileOptions) {
    if options.preserve_permissions {
        info.mod_time = metadata.modified().ok().map(to_nanos);
    }
}

impl Package {
    /// Package path for a host file under the placement options
    pub(crate) fn determine_stored_path(
        &mut self,
        fs_path: &Path,
        options: &AddFileOptions,
    ) -> Result<String, Error> {
        let count = options.placement_count();
        if count > 1 {
            return Err(Error::validation(
                "only one of stored_path, base_path, preserve_depth and flatten may be set",
                "options",
                count,
                "at most one placement option",
            ));
        }

        if let Some(stored) = options.stored_path.as_deref() {
            return Ok(path::normalize(stored)?);
        }
        if options.flatten {
            let name = fs_path.file_name().ok_or_else(|| {
                Error::validation("path has no file name", "path", fs_path.display(), "file path")
            })?;
            return Ok(path::normalize(path_str(Path::new(name))?)?);
        }
        if let Some(base) = options.base_path.as_deref() {
            return strip_base(fs_path, base, "base_path");
        }
        if let Some(depth) = options.preserve_depth {
            return strip_base(fs_path, &derive_base(fs_path, depth), "preserve_depth");
        }
        if fs_path.is_relative() {
            return Ok(path::normalize(path_str(fs_path)?)?);
        }

        let base = match self.session_base.as_ref() {
            Some(base) => base.clone(),
            None => {
                let base = derive_base(fs_path, 1);
                info!("Session base set to {}", base.display());
                self.session_base = Some(base.clone());
                base
            }
        };
        strip_base(fs_path, &base, "session_base")
    }

    /// Add a host file. Identical content already in the package is shared
    /// instead of stored twice. Returns the ID of the entry holding the data.
    pub fn add_file(
        &mut self,
        fs_path: impl AsRef<Path>,
        options: &AddFileOptions,
    ) -> Result<u64, Error> {
        self.ensure_open("add_file")?;
        check_file_type(options)?;
        let raw = fs_path.as_ref();
        let fs_path = match raw.to_str() {
            Some(text) if text.trim().is_empty() => {
                return Err(Error::validation(
                    "file path cannot be empty",
                    "path",
                    "",
                    "non-empty path",
                ))
            }
            Some(text) => PathBuf::from(text.trim()),
            None => raw.to_path_buf(),
        };

        let mut metadata = fs::symlink_metadata(&fs_path)
            .map_err(wrap_io_err!(fs_path, "Inspecting source file"))?;
        if metadata.file_type().is_symlink() {
            if !options.follow_symlinks {
                return Err(Error::validation(
                    "symlinks are not followed",
                    "path",
                    fs_path.display(),
                    "regular file or follow_symlinks",
                ));
            }
            metadata =
                fs::metadata(&fs_path).map_err(wrap_io_err!(fs_path, "Following symlink"))?;
        }
        if metadata.is_dir() {
            return Err(Error::validation(
                "path is a directory",
                "path",
                fs_path.display(),
                "regular file",
            ));
        }

        let stored = self.determine_stored_path(&fs_path, options)?;
        let size = metadata.len();
        let file = open_source(&fs_path)?;
        let mut entry = FileEntry::from_external(
            self.store.next_file_id(),
            stored.clone(),
            file,
            fs_path.clone(),
            size,
        );
        entry.meta.file_type = options.file_type;

        let duplicate = if !options.allow_duplicate && self.store.has_size(size) {
            let crc = entry.ensure_checksum()?;
            self.store.find_duplicate(size, crc)?
        } else {
            None
        };
        let file_id = self.place_entry(entry, duplicate, &stored, options)?;

        let provenance = &mut self.hierarchy.ensure_file(&stored).filesystem;
        capture(provenance, &metadata, options);
        self.hierarchy.associate(&stored, file_id);
        self.touch_metadata();

        debug!("Added {} as {} (file {})", fs_path.display(), stored, file_id);
        Ok(file_id)
    }

    /// Add in-memory content at package path `path`
    pub fn add_file_from_memory(
        &mut self,
        path: &str,
        data: Vec<u8>,
        options: &AddFileOptions,
    ) -> Result<u64, Error> {
        self.ensure_open("add_file_from_memory")?;
        check_file_type(options)?;
        path::validate(path)?;
        let stored = path::normalize(path)?;

        let mut entry = FileEntry::from_memory(self.store.next_file_id(), stored.clone(), data);
        entry.meta.file_type = options.file_type;
        let size = entry.meta.original_size;
        let duplicate = if options.allow_duplicate {
            None
        } else {
            self.store.find_duplicate(size, entry.meta.raw_checksum)?
        };
        let file_id = self.place_entry(entry, duplicate, &stored, options)?;

        self.hierarchy.ensure_file(&stored);
        self.hierarchy.associate(&stored, file_id);
        self.touch_metadata();

        debug!("Added {} bytes as {} (file {})", size, stored, file_id);
        Ok(file_id)
    }

    /// Store `entry` or, when `duplicate` holds the same content, alias it
    fn place_entry(
        &mut self,
        entry: FileEntry,
        duplicate: Option<u64>,
        stored: &str,
        options: &AddFileOptions,
    ) -> Result<u64, Error> {
        if let Ok(Some(warning)) = path::check_length(stored) {
            warn!("{}: {}", stored, warning);
        }

        let owner = self.store.owner_of_path(stored);
        if owner.is_some() && !options.allow_overwrite {
            return Err(Error::validation(
                "file already exists at specified path",
                "path",
                stored,
                "unused path or allow_overwrite",
            ));
        }

        match duplicate {
            Some(file_id) if owner == Some(file_id) => {
                debug!("{} already holds identical content", stored);
                Ok(file_id)
            }
            Some(file_id) => {
                if owner.is_some() {
                    self.detach_path(stored);
                }
                self.store.add_alias(file_id, stored.to_string())?;
                self.touch_metadata();
                Ok(file_id)
            }
            None => {
                if owner.is_some() {
                    self.detach_path(stored);
                }
                let file_id = self.store.insert(entry)?;
                self.touch_content();
                Ok(file_id)
            }
        }
    }

    fn detach_path(&mut self, stored: &str) -> Option<Removal> {
        let removal = self.store.remove_path(stored)?;
        self.hierarchy.disassociate(stored, removal.file_id());
        match removal {
            Removal::Entry(_) => self.touch_content(),
            Removal::Alias { .. } => self.touch_metadata(),
        }
        Some(removal)
    }

    /// Remove one stored path. The entry goes away with its last path.
    pub fn remove_file(&mut self, path: &str) -> Result<(), Error> {
        self.ensure_open("remove_file")?;
        if path.trim().is_empty() {
            return Err(Error::validation(
                "file path cannot be empty",
                "path",
                "",
                "non-empty path",
            ));
        }
        let stored = path::normalize(path)?;
        match self.detach_path(&stored) {
            Some(removal) => {
                debug!("Removed {} ({:?})", stored, removal);
                Ok(())
            }
            None => Err(Error::validation(
                "file not found at specified path",
                "path",
                stored,
                "existing file path",
            )),
        }
    }

    pub fn add_file_pattern(
        &mut self,
        pattern: &str,
        _options: &AddFileOptions,
    ) -> Result<Vec<u64>, Error> {
        if pattern.trim().is_empty() {
            return Err(Error::validation("pattern cannot be empty", "pattern", "", "glob pattern"));
        }
        Err(Error::Unsupported {
            operation: "add_file_pattern",
        })
    }

    pub fn add_directory(
        &mut self,
        dir: impl AsRef<Path>,
        _options: &AddFileOptions,
    ) -> Result<Vec<u64>, Error> {
        if dir.as_ref().as_os_str().is_empty() {
            return Err(Error::validation("directory cannot be empty", "path", "", "directory path"));
        }
        Err(Error::Unsupported {
            operation: "add_directory",
        })
    }

    pub fn remove_file_pattern(&mut self, pattern: &str) -> Result<Vec<String>, Error> {
        if pattern.trim().is_empty() {
            return Err(Error::validation("pattern cannot be empty", "pattern", "", "glob pattern"));
        }
        Err(Error::Unsupported {
            operation: "remove_file_pattern",
        })
    }

    pub fn remove_directory(&mut self, path: &str) -> Result<Vec<String>, Error> {
        if path.trim().is_empty() {
            return Err(Error::validation("directory cannot be empty", "path", "", "directory path"));
        }
        Err(Error::Unsupported {
            operation: "remove_directory",
        })
    }
}

#[cfg(test)]
mod tests {
    use novuspack_core::ErrorKind;

    use super::*;

    fn package() -> Package {
        Package::create("out.nvpk").unwrap()
    }

    #[test]
    fn base_derivation() {
        let path = Path::new("/home/user/project/src/main.rs");
        assert_eq!(derive_base(path, 0), Path::new("/home/user/project/src"));
        assert_eq!(derive_base(path, 1), Path::new("/home/user/project"));
        assert_eq!(derive_base(path, 9), Path::new("/"));
        assert_eq!(derive_base(path, -1), Path::new("/"));
    }

    #[test]
    fn placement_options() {
        let mut package = package();
        let path = Path::new("/home/user/project/src/main.rs");

        let flatten = AddFileOptions {
            flatten: true,
            ..AddFileOptions::default()
        };
        assert_eq!(package.determine_stored_path(path, &flatten).unwrap(), "/main.rs");

        let base = AddFileOptions {
            base_path: Some("/home/user".into()),
            ..AddFileOptions::default()
        };
        assert_eq!(
            package.determine_stored_path(path, &base).unwrap(),
            "/project/src/main.rs"
        );

        let outside = AddFileOptions {
            base_path: Some("/srv".into()),
            ..AddFileOptions::default()
        };
        let err = package.determine_stored_path(path, &outside).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);

        let full = AddFileOptions {
            preserve_depth: Some(-1),
            ..AddFileOptions::default()
        };
        assert_eq!(
            package.determine_stored_path(path, &full).unwrap(),
            "/home/user/project/src/main.rs"
        );

        let both = AddFileOptions {
            flatten: true,
            stored_path: Some("x".into()),
            ..AddFileOptions::default()
        };
        assert!(package.determine_stored_path(path, &both).is_err());
        assert!(!package.has_session_base());
    }

    #[test]
    fn session_base_is_sticky() {
        let mut package = package();
        let stored = package
            .determine_stored_path(Path::new("/home/user/project/a.txt"), &AddFileOptions::default())
            .unwrap();
        assert_eq!(stored, "/project/a.txt");
        assert_eq!(package.session_base(), Some(Path::new("/home/user")));

        let stored = package
            .determine_stored_path(Path::new("/home/user/other/b.txt"), &AddFileOptions::default())
            .unwrap();
        assert_eq!(stored, "/other/b.txt");

        let err = package
            .determine_stored_path(Path::new("/etc/passwd"), &AddFileOptions::default())
            .unwrap_err();
        assert_eq!(err.context().unwrap().field, "session_base");
    }

    #[test]
    fn relative_base_path() {
        let mut package = package();
        let base = AddFileOptions {
            base_path: Some("./src".into()),
            ..AddFileOptions::default()
        };
        assert_eq!(
            package.determine_stored_path(Path::new("./src/b.txt"), &base).unwrap(),
            "/b.txt"
        );
        assert_eq!(
            package
                .determine_stored_path(Path::new("src/./nested/../lib/c.rs"), &base)
                .unwrap(),
            "/lib/c.rs"
        );
        assert!(package
            .determine_stored_path(Path::new("./other/b.txt"), &base)
            .is_err());

        let depth = AddFileOptions {
            preserve_depth: Some(0),
            ..AddFileOptions::default()
        };
        assert_eq!(
            package.determine_stored_path(Path::new("./src/b.txt"), &depth).unwrap(),
            "/b.txt"
        );
    }

    #[test]
    fn reserved_file_types_rejected() {
        let mut package = package();
        let reserved = AddFileOptions {
            file_type: novuspack_core::PATH_METADATA_FILE_TYPE,
            ..AddFileOptions::default()
        };
        let err = package
            .add_file_from_memory("user.bin", b"data".to_vec(), &reserved)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert_eq!(err.context().unwrap().field, "file_type");

        let dir = tempfile::tempdir().unwrap();
        let host = dir.path().join("user.bin");
        fs::write(&host, b"data").unwrap();
        let err = package.add_file(&host, &reserved).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert_eq!(package.file_count(), 0);
        assert!(package.path_metadata().is_empty());
    }

    #[test]
    fn memory_dedup_and_overwrite() {
        let mut package = package();
        let options = AddFileOptions::default();
        let a = package.add_file_from_memory("/a", b"same".to_vec(), &options).unwrap();
        let b = package.add_file_from_memory("/b", b"same".to_vec(), &options).unwrap();
        assert_eq!(a, b);
        assert_eq!(package.file_count(), 1);

        let err = package
            .add_file_from_memory("/a", b"same".to_vec(), &options)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);

        let overwrite = AddFileOptions {
            allow_overwrite: true,
            ..AddFileOptions::default()
        };
        let c = package
            .add_file_from_memory("/a", b"different".to_vec(), &overwrite)
            .unwrap();
        assert_ne!(c, a);
        assert_eq!(package.read_file("/a").unwrap(), b"different");
        assert_eq!(package.file_by_id(a).unwrap().paths(), ["/b".to_string()]);

        let dup = AddFileOptions {
            allow_duplicate: true,
            ..AddFileOptions::default()
        };
        let d = package.add_file_from_memory("/c", b"same".to_vec(), &dup).unwrap();
        assert_ne!(d, a);
        assert_eq!(package.file_count(), 3);
    }

    #[test]
    fn add_file_checks_source() {
        let dir = tempfile::tempdir().unwrap();
        let mut package = package();
        let options = AddFileOptions::default();

        let err = package.add_file("  ", &options).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);

        let err = package.add_file(dir.path().join("missing"), &options).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Io);

        let err = package.add_file(dir.path(), &options).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[cfg(unix)]
    #[test]
    fn add_file_records_provenance() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("run.sh");
        fs::write(&script, b"#!/bin/sh\n").unwrap();
        fs::set_permissions(&script, fs::Permissions::from_mode(0o755)).unwrap();

        let mut package = package();
        let options = AddFileOptions::stored_at("bin/run.sh");
        let file_id = package.add_file(&script, &options).unwrap();

        let meta = package.path_metadata_entry("/bin/run.sh").unwrap();
        assert!(meta.filesystem.is_executable);
        assert_eq!(meta.filesystem.mode.map(|m| m & 0o777), Some(0o755));
        assert_eq!(meta.filesystem.uid, None);
        assert_eq!(meta.file_ids, vec![file_id]);
        assert_eq!(package.read_file("bin/run.sh").unwrap(), b"#!/bin/sh\n");
    }

    #[cfg(unix)]
    #[test]
    fn symlinks_follow_option() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("real.txt");
        let link = dir.path().join("link.txt");
        fs::write(&target, b"real").unwrap();
        std::os::unix::fs::symlink(&target, &link).unwrap();

        let mut package = package();
        let no_follow = AddFileOptions {
            follow_symlinks: false,
            flatten: true,
            ..AddFileOptions::default()
        };
        assert!(package.add_file(&link, &no_follow).is_err());

        let follow = AddFileOptions {
            flatten: true,
            ..AddFileOptions::default()
        };
        package.add_file(&link, &follow).unwrap();
        assert_eq!(package.read_file("link.txt").unwrap(), b"real");
    }

    #[test]
    fn remove_file_errors() {
        let mut package = package();
        assert_eq!(
            package.remove_file(" ").unwrap_err().kind(),
            ErrorKind::Validation
        );
        assert_eq!(
            package.remove_file("/nope").unwrap_err().kind(),
            ErrorKind::Validation
        );
        assert_eq!(
            package.remove_file("../escape").unwrap_err().kind(),
            ErrorKind::Validation
        );
    }

    #[test]
    fn unsupported_bulk_operations() {
        let mut package = package();
        let options = AddFileOptions::default();
        assert_eq!(
            package.add_file_pattern("", &options).unwrap_err().kind(),
            ErrorKind::Validation
        );
        assert_eq!(
            package.add_file_pattern("*.txt", &options).unwrap_err().kind(),
            ErrorKind::Unsupported
        );
        assert_eq!(
            package.add_directory("assets", &options).unwrap_err().kind(),
            ErrorKind::Unsupported
        );
        assert_eq!(
            package.remove_file_pattern("*.txt").unwrap_err().kind(),
            ErrorKind::Unsupported
        );
        assert_eq!(
            package.remove_directory("").unwrap_err().kind(),
            ErrorKind::Validation
        );
    }
}
