//! Serializing a package to disk through a temporary file.
use std::fs::File;
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;
use std::time::SystemTime;

use novuspack_core::{crc32, Comment, FileIndex, Header, HEADER_SIZE, PATH_METADATA_FILE_TYPE};
use tracing::{debug, info};

use super::file::read_entry_data;
use super::Package;
use crate::entry::{DataSource, FileEntry};
use crate::ext::copy_and_checksum;
use crate::hierarchy::PATH_METADATA_FILE_PATH;
use crate::info::PackageInfo;
use crate::transaction::PendingWrite;
use crate::{wrap_io_err, Error, READ_WRITE_CRC_BUF_SIZE};

/// Everything a finished write changes, applied only once the file is in
/// place
struct Written {
    header: Header,
    index: FileIndex,
    info: PackageInfo,
    payload_offsets: Vec<u64>,
}

impl Package {
    /// Persist path metadata, then atomically replace the target
    pub fn write(&mut self) -> Result<(), Error> {
        self.save_path_metadata()?;
        self.safe_write(true)
    }

    /// Write the package to a temporary file beside the target and rename
    /// it into place. Until the rename the target is untouched.
    pub fn safe_write(&mut self, overwrite: bool) -> Result<(), Error> {
        self.ensure_open("safe_write")?;
        let target = self.target.clone().ok_or_else(|| {
            Error::validation(
                "no target path configured",
                "target_path",
                "",
                "configured target path",
            )
        })?;
        if !overwrite && target.exists() {
            return Err(Error::validation(
                "target file already exists",
                "target_path",
                target.display(),
                "new file or overwrite",
            ));
        }

        let mut pending = PendingWrite::new(&target)?;
        let tmp_path = pending.path().to_path_buf();
        let written = match self
            .write_body(pending.file(), &tmp_path)
            .and_then(|written| self.cancel.check("write").map(|()| written))
        {
            Ok(written) => written,
            Err(err) => {
                pending.abort();
                return Err(err);
            }
        };
        let file = if overwrite {
            pending.commit()?
        } else {
            pending.commit_new()?
        };

        for (entry, offset) in self.store.iter_mut().zip(written.payload_offsets.iter()) {
            entry.source = DataSource::Package { offset: *offset };
            entry.checksummed = true;
        }
        self.header = written.header;
        self.index = written.index;
        self.info = written.info;
        self.file = Some(file);
        self.content_changed = false;
        self.metadata_changed = false;

        info!(
            "Wrote {} ({} files, {} bytes stored)",
            target.display(),
            self.info.file_count,
            self.info.total_stored_size
        );
        Ok(())
    }

    /// Header placeholder, interleaved entries and payloads, index, comment,
    /// then the final header
    fn write_body(&mut self, out: &mut File, out_path: &Path) -> Result<Written, Error> {
        let now = SystemTime::now();
        let mut info = self.info.clone();
        if info.created.is_none() {
            info.created = Some(now);
        }
        info.modified = Some(now);
        if self.content_changed {
            info.package_data_version = info.package_data_version.wrapping_add(1);
        }
        if self.metadata_changed {
            info.metadata_version = info.metadata_version.wrapping_add(1);
        }

        let mut header = self.header;
        header.index_start = 0;
        header.index_size = 0;
        header.comment_start = 0;
        header.comment_size = 0;
        header.signature_offset = 0;
        out.write_all(header.as_bytes())
            .map_err(wrap_io_err!(out_path, "Writing header"))?;

        let mut pos = HEADER_SIZE as u64;
        let mut index = FileIndex::new(pos);
        let mut payload_offsets = Vec::with_capacity(self.store.len());
        let mut buf = vec![0; READ_WRITE_CRC_BUF_SIZE];
        let source_file = self.file.as_ref();

        for entry in self.store.iter_mut() {
            index.push(entry.file_id(), pos);
            let meta_bytes = entry.meta.to_bytes()?;
            out.write_all(&meta_bytes)
                .map_err(wrap_io_err!(out_path, "Writing file entry"))?;
            let payload_offset = pos + meta_bytes.len() as u64;

            let crc = write_payload(entry, source_file, out, out_path, &mut buf)?;
            if !entry.checksummed {
                entry.meta.raw_checksum = crc;
                entry.meta.stored_checksum = crc;
                entry.checksummed = true;
                let meta_bytes = entry.meta.to_bytes()?;
                out.seek(SeekFrom::Start(pos))
                    .and_then(|_| out.write_all(&meta_bytes))
                    .and_then(|()| out.seek(SeekFrom::Start(payload_offset + entry.meta.stored_size)))
                    .map_err(wrap_io_err!(out_path, "Rewriting file entry"))?;
            } else if crc != entry.meta.stored_checksum {
                return Err(Error::corruption(
                    format!("checksum mismatch while writing {}", entry.meta),
                    "stored_checksum",
                    format!("{:#010x}", crc),
                    format!("{:#010x}", entry.meta.stored_checksum),
                ));
            }

            debug!("Wrote {} at {}", entry.meta, pos);
            payload_offsets.push(payload_offset);
            pos = payload_offset + entry.meta.stored_size;
            self.cancel.check("write")?;
        }

        let index_bytes = index.to_bytes()?;
        out.write_all(&index_bytes)
            .map_err(wrap_io_err!(out_path, "Writing index"))?;
        header.index_start = pos;
        header.index_size = index_bytes.len() as u64;
        pos += index_bytes.len() as u64;

        info.refresh_from_store(&self.store);
        info.has_per_file_tags = self.hierarchy.has_per_file_tags();
        info.has_extended_attrs = self.hierarchy.has_extended_attrs();
        info.has_comment = !info.comment.is_empty();
        info.is_signed = false;
        if info.has_comment {
            let comment_bytes = Comment::new(&info.comment)?.to_bytes();
            out.write_all(&comment_bytes)
                .map_err(wrap_io_err!(out_path, "Writing comment"))?;
            header.comment_start = pos;
            header.comment_size =
                u32::try_from(comment_bytes.len()).map_err(novuspack_core::Error::from)?;
        }

        info.sync_header(&mut header);
        out.seek(SeekFrom::Start(0))
            .and_then(|_| out.write_all(header.as_bytes()))
            .map_err(wrap_io_err!(out_path, "Rewriting header"))?;

        Ok(Written {
            header,
            index,
            info,
            payload_offsets,
        })
    }

    /// Serialize the hierarchy into its special file, or drop the special
    /// file when there is no path metadata. An unchanged payload is left
    /// alone.
    pub fn save_path_metadata(&mut self) -> Result<(), Error> {
        if self.hierarchy.is_empty() {
            if self.store.remove_special(PATH_METADATA_FILE_TYPE).is_some() {
                self.touch_metadata();
            }
            return Ok(());
        }

        let data = self.hierarchy.to_toml()?.into_bytes();
        if let Some(entry) = self.store.special(PATH_METADATA_FILE_TYPE) {
            let same_checksum = entry.checksummed
                && entry.meta.original_size == data.len() as u64
                && entry.meta.raw_checksum == crc32(&data);
            let same_bytes = same_checksum
                && read_entry_data(self.file.as_ref(), entry).map_or(false, |stored| stored == data);
            if same_bytes {
                return Ok(());
            }
        }

        match self.store.special_mut(PATH_METADATA_FILE_TYPE) {
            Some(entry) => entry.set_data(data),
            None => {
                let mut entry = FileEntry::from_memory(
                    self.store.next_file_id(),
                    PATH_METADATA_FILE_PATH.to_string(),
                    data,
                );
                entry.meta.file_type = PATH_METADATA_FILE_TYPE;
                self.store.insert(entry)?;
            }
        }
        self.touch_metadata();
        Ok(())
    }

    /// In-place writing is not available
    pub fn fast_write(&mut self) -> Result<(), Error> {
        Err(Error::Unsupported {
            operation: "fast_write",
        })
    }

    pub fn defragment(&mut self) -> Result<(), Error> {
        Err(Error::Unsupported {
            operation: "defragment",
        })
    }
}

/// Copy one payload into `out`, returning the CRC32 of what was written
fn write_payload(
    entry: &mut FileEntry,
    source_file: Option<&File>,
    out: &mut File,
    out_path: &Path,
    buf: &mut [u8],
) -> Result<u32, Error> {
    let expected = entry.meta.stored_size;
    let (count, crc) = match &mut entry.source {
        DataSource::Memory(data) => copy_and_checksum(data.as_slice(), &mut *out, buf)
            .map_err(wrap_io_err!(out_path, "Writing file data"))?,
        DataSource::Package { offset } => {
            let mut file = source_file.ok_or_else(|| {
                Error::validation(
                    "package file is closed",
                    "file_id",
                    entry.meta.file_id,
                    "open package",
                )
            })?;
            file.seek(SeekFrom::Start(*offset))
                .map_err(wrap_io_err!("Seeking package"))?;
            copy_and_checksum(file.take(expected), &mut *out, buf)
                .map_err(wrap_io_err!(out_path, "Copying file data"))?
        }
        DataSource::External {
            file,
            path,
            offset,
            size,
        } => {
            file.seek(SeekFrom::Start(*offset))
                .map_err(wrap_io_err!(path, "Seeking source file"))?;
            copy_and_checksum(std::io::Read::by_ref(file).take(*size), &mut *out, buf)
                .map_err(wrap_io_err!(path, "Copying source file"))?
        }
    };
    if count != expected {
        return Err(Error::corruption(
            "file data size changed",
            "stored_size",
            count,
            expected,
        ));
    }
    Ok(crc)
}

#[cfg(test)]
mod tests {
    use std::fs;

    use novuspack_core::ErrorKind;

    use super::*;
    use crate::AddFileOptions;

    #[test]
    fn write_requires_target_and_respects_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("p.nvpk");
        fs::write(&target, b"existing").unwrap();

        let mut package = Package::create(&target).unwrap();
        let err = package.safe_write(false).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert_eq!(fs::read(&target).unwrap(), b"existing");

        package.safe_write(true).unwrap();
        assert_ne!(fs::read(&target).unwrap(), b"existing");
    }

    #[test]
    fn layout_offsets() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("p.nvpk");
        let mut package = Package::create(&target).unwrap();
        package
            .add_file_from_memory("a.txt", b"hello".to_vec(), &AddFileOptions::default())
            .unwrap();
        package.set_comment("note").unwrap();
        package.safe_write(true).unwrap();

        let bytes = fs::read(&target).unwrap();
        let header = Header::from_bytes(&bytes).unwrap();
        let (index_start, index_size) = (header.index_start, header.index_size);
        let (comment_start, comment_size) = (header.comment_start, header.comment_size);
        assert_eq!(package.index().offset_of(1), Some(HEADER_SIZE as u64));
        assert_eq!(index_size, 32);
        assert_eq!(comment_start, index_start + index_size);
        assert_eq!(comment_start + comment_size as u64, bytes.len() as u64);
        assert!(header
            .features()
            .contains(novuspack_core::Features::HAS_PACKAGE_COMMENT));
    }

    #[test]
    fn versions_follow_changes() {
        let dir = tempfile::tempdir().unwrap();
        let mut package = Package::create(dir.path().join("p.nvpk")).unwrap();
        package.safe_write(true).unwrap();
        let (data, meta) = (
            package.info().package_data_version,
            package.info().metadata_version,
        );

        package.safe_write(true).unwrap();
        assert_eq!(package.info().package_data_version, data);
        assert_eq!(package.info().metadata_version, meta);

        package.set_app_id(42);
        package.safe_write(true).unwrap();
        assert_eq!(package.info().package_data_version, data);
        assert_eq!(package.info().metadata_version, meta + 1);
    }

    #[test]
    fn unchanged_path_metadata_keeps_versions() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("p.nvpk");
        let mut package = Package::create(&target).unwrap();
        package
            .add_file_from_memory("a.txt", b"x".to_vec(), &AddFileOptions::default())
            .unwrap();
        package.write().unwrap();
        let versions = (
            package.info().package_data_version,
            package.info().metadata_version,
        );
        package.write().unwrap();
        assert_eq!(
            (package.info().package_data_version, package.info().metadata_version),
            versions
        );

        let mut package = Package::open(&target).unwrap();
        package.write().unwrap();
        package.write().unwrap();
        assert_eq!(
            (package.info().package_data_version, package.info().metadata_version),
            versions
        );

        package.add_directory_metadata("docs", None, None).unwrap();
        package.write().unwrap();
        assert_eq!(package.info().metadata_version, versions.1 + 1);
        assert_eq!(package.info().package_data_version, versions.0);
    }

    #[test]
    fn path_metadata_special_file() {
        let mut package = Package::create("p.nvpk").unwrap();
        package
            .add_file_from_memory("a.txt", b"x".to_vec(), &AddFileOptions::default())
            .unwrap();
        package.save_path_metadata().unwrap();
        let special = package.entries_by_type(PATH_METADATA_FILE_TYPE);
        assert_eq!(special.len(), 1);
        assert_eq!(special[0].paths(), [PATH_METADATA_FILE_PATH.to_string()]);
        assert_eq!(package.file_count(), 1);
        assert!(package.info().has_special_metadata);

        package.remove_file("a.txt").unwrap();
        package.set_path_metadata(Vec::new()).unwrap();
        package.save_path_metadata().unwrap();
        assert!(package.entries_by_type(PATH_METADATA_FILE_TYPE).is_empty());
        assert!(!package.info().has_special_metadata);
    }

    #[test]
    fn unsupported_writes() {
        let mut package = Package::create("p.nvpk").unwrap();
        assert_eq!(package.fast_write().unwrap_err().kind(), ErrorKind::Unsupported);
        assert_eq!(package.defragment().unwrap_err().kind(), ErrorKind::Unsupported);
    }
}
