//! The packed structs represent the on-disk format of a package

use bytemuck::{Pod, Zeroable};

use crate::flags::{join_flags, split_flags, CompressionType, Features};
use crate::{Error, FORMAT_VERSION, HEADER_SIZE, MAGIC};

/// Part 1 of a single-part archive
pub const DEFAULT_ARCHIVE_PART_INFO: u32 = 0x0001_0001;

#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
#[repr(packed, C)]
pub struct Header {
    pub magic: u32,
    pub format_version: u32,
    /// Feature bits and package compression type, see [`crate::flags`]
    pub flags: u32,
    pub package_data_version: u32,
    pub metadata_version: u32,
    pub package_crc: u32,
    /// Nanoseconds since the Unix epoch
    pub created_time: u64,
    /// Nanoseconds since the Unix epoch
    pub modified_time: u64,
    pub locale_id: u32,
    /// Must be zero
    pub reserved: u32,
    pub app_id: u64,
    pub vendor_id: u32,
    pub creator_id: u32,
    pub index_start: u64,
    pub index_size: u64,
    pub archive_chain_id: u64,
    pub archive_part_info: u32,
    pub comment_size: u32,
    pub comment_start: u64,
    /// Zero when the package is not signed
    pub signature_offset: u64,
}

impl Default for Header {
    fn default() -> Self {
        Header::new()
    }
}

impl Header {
    pub fn new() -> Header {
        Header {
            magic: MAGIC,
            format_version: FORMAT_VERSION,
            package_data_version: 1,
            metadata_version: 1,
            archive_part_info: DEFAULT_ARCHIVE_PART_INFO,
            ..Header::zeroed()
        }
    }

    /// Parse and validate a header from the start of `data`
    pub fn from_bytes(data: &[u8]) -> Result<Header, Error> {
        let bytes = data.get(..HEADER_SIZE).ok_or(Error::Truncated {
            what: "header",
            expected: HEADER_SIZE,
            actual: data.len(),
        })?;
        let header = Header::from_bytes_unchecked(bytes)?;
        header.validate()?;
        Ok(header)
    }

    /// Parse a header without validating its fields
    pub fn from_bytes_unchecked(data: &[u8]) -> Result<Header, Error> {
        bytemuck::try_pod_read_unaligned(data).map_err(|_| Error::Truncated {
            what: "header",
            expected: HEADER_SIZE,
            actual: data.len(),
        })
    }

    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::bytes_of(self)
    }

    /// Check magic, version and reserved fields
    pub fn validate(&self) -> Result<(), Error> {
        let (magic, version, reserved) = (self.magic, self.format_version, self.reserved);
        if magic != MAGIC {
            return Err(Error::InvalidMagic(magic));
        }
        if version != FORMAT_VERSION {
            return Err(Error::UnsupportedVersion(version));
        }
        if reserved != 0 {
            return Err(Error::ReservedNotZero {
                what: "reserved",
                value: reserved as u64,
            });
        }
        Ok(())
    }

    /// Every offset is either zero or points within a file of `file_len` bytes
    pub fn validate_offsets(&self, file_len: u64) -> Result<(), Error> {
        let (index_start, index_size) = (self.index_start, self.index_size);
        let (comment_start, comment_size) = (self.comment_start, self.comment_size as u64);
        let signature_offset = self.signature_offset;

        let ranges = [
            ("index_start", index_start, index_size),
            ("comment_start", comment_start, comment_size),
            ("signature_offset", signature_offset, 0),
        ];
        for (field, offset, size) in ranges {
            if offset == 0 {
                continue;
            }
            let end = offset.checked_add(size).ok_or(Error::Overflow)?;
            if offset >= file_len || end > file_len {
                return Err(Error::OffsetOutOfBounds {
                    field,
                    offset,
                    len: file_len,
                });
            }
        }
        Ok(())
    }

    pub fn features(&self) -> Features {
        split_flags(self.flags).0
    }

    pub fn compression_type(&self) -> CompressionType {
        split_flags(self.flags).1
    }

    pub fn set_features(&mut self, features: Features) {
        self.flags = join_flags(self.flags, features, self.compression_type());
    }

    pub fn set_feature(&mut self, feature: Features, enabled: bool) {
        let mut features = self.features();
        features.set(feature, enabled);
        self.set_features(features);
    }

    pub fn is_signed(&self) -> bool {
        self.signature_offset > 0
    }
}
