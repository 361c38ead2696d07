//! Reading packages from disk.
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

use novuspack_core::{
    path, Comment, CompressionType, EncryptionType, EntryMeta, FileIndex, Header, RawEntry,
    ENTRY_SIZE, HEADER_SIZE, PATH_METADATA_FILE_TYPE,
};
use tracing::{debug, info, warn};

use super::Package;
use crate::cancel::CancelToken;
use crate::entry::{DataSource, FileEntry};
use crate::guard::ReadOnlyPackage;
use crate::hierarchy::PathHierarchy;
use crate::info::PackageInfo;
use crate::{wrap_io_err, Error};

/// Read `len` bytes at `offset`, failing with a truncation error when the
/// region runs past the end of the file
fn read_region(
    mut file: &File,
    file_len: u64,
    offset: u64,
    len: u64,
    what: &'static str,
) -> Result<Vec<u8>, Error> {
    let available = file_len.saturating_sub(offset);
    if len > available {
        return Err(novuspack_core::Error::Truncated {
            what,
            expected: usize::try_from(len).unwrap_or(usize::MAX),
            actual: usize::try_from(available).unwrap_or(usize::MAX),
        }
        .into());
    }
    let mut buf = vec![0; usize::try_from(len).map_err(novuspack_core::Error::from)?];
    file.seek(SeekFrom::Start(offset))
        .map_err(wrap_io_err!("Seeking package"))?;
    file.read_exact(&mut buf)
        .map_err(wrap_io_err!("Reading package"))?;
    Ok(buf)
}

/// Bytes of one payload, wherever they currently live
pub(crate) fn read_entry_data(package_file: Option<&File>, entry: &FileEntry) -> Result<Vec<u8>, Error> {
    let meta = &entry.meta;
    match entry.source() {
        DataSource::Memory(data) => Ok(data.clone()),
        DataSource::Package { offset } => {
            let file = package_file.ok_or_else(|| {
                Error::validation(
                    "package file is closed",
                    "file_id",
                    meta.file_id,
                    "open package",
                )
            })?;
            let file_len = file
                .metadata()
                .map_err(wrap_io_err!("Inspecting package"))?
                .len();
            let data = read_region(file, file_len, *offset, meta.stored_size, "file data")?;
            let crc = novuspack_core::crc32(&data);
            if crc != meta.stored_checksum {
                return Err(Error::corruption(
                    "stored checksum mismatch",
                    "stored_checksum",
                    format!("{:#010x}", crc),
                    format!("{:#010x}", meta.stored_checksum),
                ));
            }
            Ok(data)
        }
        DataSource::External {
            file,
            path,
            offset,
            size,
        } => {
            let mut file = file;
            let mut data = Vec::new();
            file.seek(SeekFrom::Start(*offset))
                .map_err(wrap_io_err!(path, "Seeking source file"))?;
            file.take(*size)
                .read_to_end(&mut data)
                .map_err(wrap_io_err!(path, "Reading source file"))?;
            if data.len() as u64 != *size {
                return Err(Error::corruption(
                    "source file changed size",
                    "size",
                    data.len(),
                    size,
                ));
            }
            Ok(data)
        }
    }
}

impl Package {
    /// Open an existing package for reading and editing
    pub fn open(path: impl AsRef<Path>) -> Result<Package, Error> {
        Package::open_with_cancel(path, CancelToken::new())
    }

    /// Like [`Package::open`], observing `cancel` between reads
    pub fn open_with_cancel(path: impl AsRef<Path>, cancel: CancelToken) -> Result<Package, Error> {
        Package::load(path.as_ref(), cancel, false)
    }

    /// Open behind a guard that rejects every mutation
    pub fn open_read_only(path: impl AsRef<Path>) -> Result<ReadOnlyPackage, Error> {
        Package::open(path).map(ReadOnlyPackage::new)
    }

    /// Open a package whose index may be damaged. The header must still be
    /// valid; an unreadable index leaves the package without entries.
    pub fn open_broken(path: impl AsRef<Path>) -> Result<Package, Error> {
        Package::load(path.as_ref(), CancelToken::new(), true)
    }

    fn load(path: &Path, cancel: CancelToken, tolerate_index: bool) -> Result<Package, Error> {
        let file = File::open(path).map_err(wrap_io_err!(path, "Opening package"))?;
        let file_len = file
            .metadata()
            .map_err(wrap_io_err!(path, "Inspecting package"))?
            .len();

        cancel.check("open")?;
        let header_bytes = read_region(&file, file_len, 0, HEADER_SIZE as u64, "header")?;
        let header = Header::from_bytes(&header_bytes)?;
        header.validate_offsets(file_len)?;

        cancel.check("open")?;
        let index = match Package::read_index(&file, file_len, &header) {
            Ok(index) => index,
            Err(err) if tolerate_index => {
                warn!("Ignoring damaged index in {}: {}", path.display(), err);
                FileIndex::new(HEADER_SIZE as u64)
            }
            Err(err) => return Err(err),
        };

        let mut package = Package {
            target: Some(path.to_path_buf()),
            cancel,
            ..Package::default()
        };
        for index_entry in index.entries.iter() {
            package.cancel.check("open")?;
            let entry = Package::read_entry(&file, file_len, index_entry.offset())?;
            let file_id = index_entry.file_id();
            if entry.file_id() != file_id {
                return Err(Error::corruption(
                    "index points at a different file entry",
                    "file_id",
                    entry.file_id(),
                    file_id,
                ));
            }
            package.store.insert(entry)?;
        }

        let comment = Package::read_comment(&file, file_len, &header)?;
        package.info = PackageInfo::from_header(&header, comment);
        package.header = header;
        package.index = index;
        package.file = Some(file);
        package.is_open = true;

        package.load_path_metadata()?;
        package.refresh_info();
        package.content_changed = false;
        package.metadata_changed = false;

        info!(
            "Opened {} ({} files, {} special)",
            path.display(),
            package.store.content_count(),
            package.store.len() - package.store.content_count()
        );
        Ok(package)
    }

    fn read_index(file: &File, file_len: u64, header: &Header) -> Result<FileIndex, Error> {
        let (start, size) = (header.index_start, header.index_size);
        if start == 0 {
            return Ok(FileIndex::new(HEADER_SIZE as u64));
        }
        let bytes = read_region(file, file_len, start, size, "index")?;
        Ok(FileIndex::from_bytes(&bytes)?)
    }

    fn read_entry(file: &File, file_len: u64, offset: u64) -> Result<FileEntry, Error> {
        let fixed = read_region(file, file_len, offset, ENTRY_SIZE as u64, "file entry")?;
        let raw = RawEntry::from_bytes(&fixed)?;
        let variable_size = raw.variable_size()? as u64;
        let variable_offset = offset + ENTRY_SIZE as u64;
        let variable = read_region(file, file_len, variable_offset, variable_size, "file entry")?;
        let meta = EntryMeta::parse(&raw, &variable)?;

        let payload_offset = variable_offset + variable_size;
        let end = payload_offset
            .checked_add(meta.stored_size)
            .ok_or(novuspack_core::Error::Overflow)?;
        if end > file_len {
            return Err(novuspack_core::Error::OffsetOutOfBounds {
                field: "stored_size",
                offset: end,
                len: file_len,
            }
            .into());
        }
        debug!("Read {} at {}", meta, offset);
        Ok(FileEntry::from_package(meta, payload_offset))
    }

    fn read_comment(file: &File, file_len: u64, header: &Header) -> Result<String, Error> {
        let (start, size) = (header.comment_start, header.comment_size);
        if start == 0 || size == 0 {
            return Ok(String::new());
        }
        let bytes = read_region(file, file_len, start, size as u64, "comment")?;
        Ok(Comment::parse(&bytes)?.into_text())
    }

    /// Contents of the file stored at `path`
    pub fn read_file(&self, path: &str) -> Result<Vec<u8>, Error> {
        let stored = path::normalize(path)?;
        let entry = self.store.find_by_path(&stored).ok_or_else(|| {
            Error::validation(
                "file not found at specified path",
                "path",
                &stored,
                "existing file path",
            )
        })?;
        if entry.meta.compression() != CompressionType::None {
            return Err(Error::Unsupported {
                operation: "decompression",
            });
        }
        if entry.meta.encryption() != EncryptionType::None {
            return Err(Error::Unsupported {
                operation: "decryption",
            });
        }
        read_entry_data(self.file.as_ref(), entry)
    }

    /// Rebuild the hierarchy from the path metadata special file, if any
    pub fn load_path_metadata(&mut self) -> Result<(), Error> {
        let entry = match self.store.special(PATH_METADATA_FILE_TYPE) {
            Some(entry) => entry,
            None => {
                self.hierarchy = PathHierarchy::new();
                return Ok(());
            }
        };
        let data = read_entry_data(self.file.as_ref(), entry)?;
        let text = String::from_utf8(data).map_err(|_| novuspack_core::Error::InvalidUtf8 {
            what: "path metadata",
        })?;
        let mut hierarchy = PathHierarchy::from_toml(&text)?;
        hierarchy.rebuild_associations(&self.store);
        debug!("Loaded {} path metadata entries", hierarchy.len());
        self.hierarchy = hierarchy;
        Ok(())
    }
}
