use std::fs::File;
use std::path::{Component, Path, PathBuf};
use std::time::SystemTime;

use novuspack_core::{path, Comment, FileIndex, Header, HEADER_SIZE};
use tracing::{debug, info};

use crate::cancel::CancelToken;
use crate::entry::FileEntry;
use crate::info::{FileInfo, PackageInfo};
use crate::hierarchy::PathHierarchy;
use crate::store::FileStore;
use crate::transaction::target_dir;
use crate::{wrap_io_err, Error};

mod add;
mod file;
mod paths;
mod write;

/// An open NovusPack package: header, index, entries and path metadata held
/// in memory, payloads read lazily from their sources.
///
/// Not safe for concurrent use; callers sharing one across threads must
/// serialize access themselves.
#[derive(Debug)]
pub struct Package {
    target: Option<PathBuf>,
    /// Handle to the package file payloads are read from
    file: Option<File>,
    header: Header,
    index: FileIndex,
    info: PackageInfo,
    store: FileStore,
    hierarchy: PathHierarchy,
    session_base: Option<PathBuf>,
    cancel: CancelToken,
    is_open: bool,
    content_changed: bool,
    metadata_changed: bool,
}

impl Default for Package {
    fn default() -> Package {
        Package {
            target: None,
            file: None,
            header: Header::new(),
            index: FileIndex::new(HEADER_SIZE as u64),
            info: PackageInfo::default(),
            store: FileStore::new(),
            hierarchy: PathHierarchy::new(),
            session_base: None,
            cancel: CancelToken::new(),
            is_open: false,
            content_changed: false,
            metadata_changed: false,
        }
    }
}

/// Lexically clean a host path: drop `.` and resolve `..` against earlier
/// components
pub(crate) fn clean_path(path: &Path) -> PathBuf {
    let mut cleaned = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match cleaned.components().next_back() {
                Some(Component::Normal(_)) => {
                    cleaned.pop();
                }
                Some(Component::RootDir) | Some(Component::Prefix(_)) => {}
                _ => cleaned.push(component),
            },
            other => cleaned.push(other),
        }
    }
    cleaned
}

impl Package {
    /// Start an empty package that will be written to `path`
    pub fn create(path: impl AsRef<Path>) -> Result<Package, Error> {
        let path = path.as_ref();
        if path.to_string_lossy().trim().is_empty() {
            return Err(Error::validation(
                "package path cannot be empty",
                "path",
                "",
                "non-empty path",
            ));
        }

        let now = Some(SystemTime::now());
        let mut package = Package {
            target: Some(clean_path(path)),
            is_open: true,
            ..Package::default()
        };
        package.info.created = now;
        package.info.modified = now;
        package.info.package_data_version = 1;
        package.info.metadata_version = 1;
        debug!("Created package for {}", path.display());
        Ok(package)
    }

    pub fn create_with_options(
        path: impl AsRef<Path>,
        options: &crate::CreateOptions,
    ) -> Result<Package, Error> {
        let mut package = Package::create(path)?;
        if let Some(comment) = options.comment.as_deref().filter(|c| !c.is_empty()) {
            package.set_comment(comment)?;
        }
        if options.vendor_id != 0 {
            package.set_vendor_id(options.vendor_id);
        }
        if options.app_id != 0 {
            package.set_app_id(options.app_id);
        }
        Ok(package)
    }

    pub fn is_open(&self) -> bool {
        self.is_open
    }

    /// Release the file handle; cached metadata stays available
    pub fn close(&mut self) {
        self.file = None;
        self.is_open = false;
    }

    /// Release the file handle and the whole in-memory model
    pub fn close_with_cleanup(&mut self) {
        self.close();
        self.store.clear();
        self.hierarchy.clear();
        self.index = FileIndex::new(HEADER_SIZE as u64);
        self.header = Header::new();
        self.info = PackageInfo::default();
        self.content_changed = false;
        self.metadata_changed = false;
    }

    pub(crate) fn ensure_open(&self, operation: &'static str) -> Result<(), Error> {
        if self.is_open {
            Ok(())
        } else {
            Err(Error::validation(
                "package is not open",
                "operation",
                operation,
                "open package",
            ))
        }
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Observe `token` during later opens and writes
    pub fn set_cancel_token(&mut self, token: CancelToken) {
        self.cancel = token;
    }

    pub fn info(&self) -> &PackageInfo {
        &self.info
    }

    /// Header as last read or written
    pub fn header(&self) -> &Header {
        &self.header
    }

    pub fn index(&self) -> &FileIndex {
        &self.index
    }

    pub fn target_path(&self) -> Option<&Path> {
        self.target.as_deref()
    }

    /// Point later writes at `path`. The parent directory must exist and
    /// accept new files.
    pub fn set_target_path(&mut self, path: impl AsRef<Path>) -> Result<(), Error> {
        let raw = path.as_ref();
        if raw.to_string_lossy().trim().is_empty() {
            return Err(Error::validation(
                "target path cannot be empty",
                "path",
                "",
                "non-empty path",
            ));
        }
        let path = clean_path(raw);
        let dir = target_dir(&path);
        let metadata = match dir.metadata() {
            Ok(metadata) => metadata,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Err(Error::validation(
                    "target directory does not exist",
                    "path",
                    dir.display(),
                    "existing directory",
                ));
            }
            Err(err) => return Err(Error::io(err, dir, "Inspecting target directory")),
        };
        if !metadata.is_dir() {
            return Err(Error::validation(
                "target parent is not a directory",
                "path",
                dir.display(),
                "directory",
            ));
        }
        tempfile::Builder::new()
            .prefix(".nvpk.check.")
            .tempfile_in(dir)
            .map_err(|source| Error::NotWritable {
                path: dir.to_path_buf(),
                source,
            })?;

        info!("Target path set to {}", path.display());
        self.target = Some(path);
        Ok(())
    }

    pub fn comment(&self) -> &str {
        &self.info.comment
    }

    pub fn has_comment(&self) -> bool {
        !self.info.comment.is_empty()
    }

    /// One trailing NUL is dropped; embedded NULs and oversized comments are
    /// rejected.
    pub fn set_comment(&mut self, comment: &str) -> Result<(), Error> {
        let comment = Comment::new(comment)?;
        self.info.comment = comment.into_text();
        self.info.has_comment = !self.info.comment.is_empty();
        self.metadata_changed = true;
        Ok(())
    }

    pub fn clear_comment(&mut self) {
        self.info.comment.clear();
        self.info.has_comment = false;
        self.metadata_changed = true;
    }

    pub fn vendor_id(&self) -> u32 {
        self.info.vendor_id
    }

    pub fn set_vendor_id(&mut self, vendor_id: u32) {
        self.info.vendor_id = vendor_id;
        self.metadata_changed = true;
    }

    pub fn clear_vendor_id(&mut self) {
        self.set_vendor_id(0);
    }

    pub fn has_vendor_id(&self) -> bool {
        self.info.vendor_id != 0
    }

    pub fn app_id(&self) -> u64 {
        self.info.app_id
    }

    pub fn set_app_id(&mut self, app_id: u64) {
        self.info.app_id = app_id;
        self.metadata_changed = true;
    }

    pub fn clear_app_id(&mut self) {
        self.set_app_id(0);
    }

    pub fn has_app_id(&self) -> bool {
        self.info.app_id != 0
    }

    /// Vendor and application identifiers
    pub fn package_identity(&self) -> (u32, u64) {
        (self.info.vendor_id, self.info.app_id)
    }

    pub fn set_package_identity(&mut self, vendor_id: u32, app_id: u64) {
        self.set_vendor_id(vendor_id);
        self.set_app_id(app_id);
    }

    pub fn clear_package_identity(&mut self) {
        self.set_package_identity(0, 0);
    }

    pub fn session_base(&self) -> Option<&Path> {
        self.session_base.as_deref()
    }

    pub fn has_session_base(&self) -> bool {
        self.session_base.is_some()
    }

    /// Host directory that absolute source paths are stored relative to
    pub fn set_session_base(&mut self, base: impl AsRef<Path>) -> Result<(), Error> {
        let base = base.as_ref();
        if base.as_os_str().is_empty() || !base.is_absolute() {
            return Err(Error::validation(
                "session base must be an absolute path",
                "session_base",
                base.display(),
                "absolute path",
            ));
        }
        self.session_base = Some(clean_path(base));
        Ok(())
    }

    pub fn clear_session_base(&mut self) {
        self.session_base = None;
    }

    pub fn file_count(&self) -> usize {
        self.store.content_count()
    }

    /// Content files sorted by their first display path
    pub fn list_files(&self) -> Vec<FileInfo> {
        let mut files = self.store.content().map(FileInfo::from).collect::<Vec<_>>();
        files.sort_by(|a, b| a.primary_path.cmp(&b.primary_path));
        files
    }

    pub fn file_by_id(&self, file_id: u64) -> Option<&FileEntry> {
        self.store.get(file_id)
    }

    pub fn file_by_path(&self, path: &str) -> Result<&FileEntry, Error> {
        let stored = path::normalize(path)?;
        self.store.find_by_path(&stored).ok_or_else(|| {
            Error::validation(
                "file not found at specified path",
                "path",
                &stored,
                "existing file path",
            )
        })
    }

    pub fn file_by_checksum(&self, crc: u32) -> Option<&FileEntry> {
        self.store.find_by_checksum(crc)
    }

    pub fn entries_by_type(&self, file_type: u16) -> Vec<&FileEntry> {
        self.store.by_type(file_type).collect()
    }

    /// Structural checks over the header, index, entries and path metadata
    pub fn validate(&self) -> Result<(), Error> {
        self.ensure_open("validate")?;
        self.header.validate()?;
        self.index.validate()?;
        for entry in self.store.iter() {
            entry.meta.validate()?;
            for stored in entry.paths() {
                let canonical = path::normalize(stored)?;
                if &canonical != stored {
                    return Err(Error::validation(
                        "stored path is not canonical",
                        "path",
                        stored,
                        canonical,
                    ));
                }
            }
        }
        self.hierarchy.validate()
    }

    /// Keep derived package info in step with the store and hierarchy
    pub(crate) fn refresh_info(&mut self) {
        self.info.refresh_from_store(&self.store);
        self.info.has_per_file_tags = self.hierarchy.has_per_file_tags();
        self.info.has_extended_attrs = self.hierarchy.has_extended_attrs();
    }

    pub(crate) fn touch_content(&mut self) {
        self.content_changed = true;
        self.refresh_info();
    }

    pub(crate) fn touch_metadata(&mut self) {
        self.metadata_changed = true;
        self.refresh_info();
    }

    /// Whether anything changed since the last open or write
    pub fn is_modified(&self) -> bool {
        self.content_changed || self.metadata_changed
    }
}

/// UTF-8 view of a host path for use as a package path
pub(crate) fn path_str(path: &Path) -> Result<&str, Error> {
    path.to_str().ok_or_else(|| {
        Error::validation(
            "path is not valid UTF-8",
            "path",
            path.display(),
            "utf-8 path",
        )
    })
}

pub(crate) fn open_source(path: &Path) -> Result<File, Error> {
    File::open(path).map_err(wrap_io_err!(path, "Opening source file"))
}
