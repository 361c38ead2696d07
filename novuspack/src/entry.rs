use std::fmt;
use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::PathBuf;

use novuspack_core::{crc32, EntryMeta};

use crate::ext::{copy_and_checksum, EntryMetaExt};
use crate::{wrap_io_err, Error, READ_WRITE_CRC_BUF_SIZE};

/// Where the payload bytes of an entry currently live
pub enum DataSource {
    /// Held in memory
    Memory(Vec<u8>),
    /// At `offset` in the package file this entry was opened from
    Package { offset: u64 },
    /// A region of a file on the host filesystem
    External {
        file: File,
        path: PathBuf,
        offset: u64,
        size: u64,
    },
}

impl fmt::Debug for DataSource {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        use DataSource::*;
        match self {
            Memory(data) => write!(f, "Memory({} bytes)", data.len()),
            Package { offset } => write!(f, "Package(@{})", offset),
            External {
                path, offset, size, ..
            } => write!(f, "External({:?} @{} +{})", path, offset, size),
        }
    }
}

/// One stored payload, its metadata block and where to find its bytes
#[derive(Debug)]
pub struct FileEntry {
    pub meta: EntryMeta,
    pub(crate) source: DataSource,
    /// `meta.raw_checksum` is known to match the payload
    pub(crate) checksummed: bool,
}

impl FileEntry {
    pub fn from_memory(file_id: u64, path: String, data: Vec<u8>) -> FileEntry {
        let mut meta = EntryMeta::new(file_id, path);
        meta.original_size = data.len() as u64;
        meta.stored_size = data.len() as u64;
        meta.raw_checksum = crc32(&data);
        meta.stored_checksum = meta.raw_checksum;
        FileEntry {
            meta,
            source: DataSource::Memory(data),
            checksummed: true,
        }
    }

    /// Checksums stay unknown until the payload is first read
    pub fn from_external(file_id: u64, path: String, file: File, fs_path: PathBuf, size: u64) -> FileEntry {
        let mut meta = EntryMeta::new(file_id, path);
        meta.original_size = size;
        meta.stored_size = size;
        FileEntry {
            meta,
            source: DataSource::External {
                file,
                path: fs_path,
                offset: 0,
                size,
            },
            checksummed: false,
        }
    }

    /// An entry decoded from a package file whose payload starts at `offset`
    pub fn from_package(meta: EntryMeta, offset: u64) -> FileEntry {
        FileEntry {
            meta,
            source: DataSource::Package { offset },
            checksummed: true,
        }
    }

    pub fn file_id(&self) -> u64 {
        self.meta.file_id
    }

    pub fn paths(&self) -> &[String] {
        &self.meta.paths
    }

    pub fn primary_path(&self) -> &str {
        self.meta.primary_path()
    }

    pub fn is_special(&self) -> bool {
        self.meta.is_special()
    }

    pub fn source(&self) -> &DataSource {
        &self.source
    }

    pub fn is_loaded(&self) -> bool {
        matches!(self.source, DataSource::Memory(_))
    }

    /// Replace the payload with in-memory bytes and refresh sizes and checksums
    pub fn set_data(&mut self, data: Vec<u8>) {
        self.meta.original_size = data.len() as u64;
        self.meta.stored_size = data.len() as u64;
        self.meta.raw_checksum = crc32(&data);
        self.meta.stored_checksum = self.meta.raw_checksum;
        self.source = DataSource::Memory(data);
        self.checksummed = true;
    }

    /// Raw checksum of the payload, reading an external source once if it
    /// has not been computed yet
    pub(crate) fn ensure_checksum(&mut self) -> Result<u32, Error> {
        if self.checksummed {
            return Ok(self.meta.raw_checksum);
        }
        let crc = match &mut self.source {
            DataSource::Memory(data) => crc32(data),
            DataSource::External {
                file,
                path,
                offset,
                size,
            } => {
                file.seek(SeekFrom::Start(*offset))
                    .map_err(wrap_io_err!(path, "Seeking source file"))?;
                let mut buf = vec![0; READ_WRITE_CRC_BUF_SIZE.min(*size as usize).max(1)];
                let (count, crc) =
                    copy_and_checksum(file.by_ref().take(*size), io::sink(), &mut buf)
                        .map_err(wrap_io_err!(path, "Checksumming source file"))?;
                if count != *size {
                    return Err(Error::corruption(
                        "source file changed size",
                        "size",
                        count,
                        *size,
                    ));
                }
                crc
            }
            DataSource::Package { .. } => self.meta.raw_checksum,
        };
        self.meta.raw_checksum = crc;
        self.meta.stored_checksum = crc;
        self.checksummed = true;
        Ok(crc)
    }
}
