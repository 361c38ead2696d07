//! The packed structs represent the on-disk format of a file entry
use alloc::string::String;
use alloc::vec::Vec;
use core::fmt::{self, Display};

use bytemuck::{Pod, Zeroable};

use crate::flags::{CompressionType, EncryptionType};
use crate::{path, Error, ENTRY_SIZE};

/// First file type reserved for engine-internal special files
pub const SPECIAL_FILE_TYPE_START: u16 = 65000;
/// Special file carrying the path metadata hierarchy
pub const PATH_METADATA_FILE_TYPE: u16 = 65001;

pub fn is_special_type(file_type: u16) -> bool {
    file_type >= SPECIAL_FILE_TYPE_START
}

pub mod hash_type {
    pub const SHA256: u8 = 0x00;
    pub const SHA512: u8 = 0x01;
    pub const BLAKE3: u8 = 0x02;
    pub const XXH3: u8 = 0x03;
    pub const BLAKE2B: u8 = 0x04;
    pub const BLAKE2S: u8 = 0x05;
    pub const SHA3_256: u8 = 0x06;
    pub const SHA3_512: u8 = 0x07;
    pub const CRC32: u8 = 0x08;
    pub const CRC64: u8 = 0x09;
}

pub mod hash_purpose {
    pub const CONTENT_VERIFICATION: u8 = 0x00;
    pub const DEDUPLICATION: u8 = 0x01;
    pub const INTEGRITY: u8 = 0x02;
    pub const FAST_LOOKUP: u8 = 0x03;
    pub const ERROR_DETECTION: u8 = 0x04;
}

pub mod optional_data_type {
    pub const TAGS: u8 = 0x00;
    pub const PATH_ENCODING: u8 = 0x01;
    pub const PATH_FLAGS: u8 = 0x02;
    pub const COMPRESSION_DICTIONARY: u8 = 0x03;
    pub const SOLID_GROUP_ID: u8 = 0x04;
    pub const FILESYSTEM_FLAGS: u8 = 0x05;
    pub const WINDOWS_ATTRIBUTES: u8 = 0x06;
    pub const EXTENDED_ATTRIBUTES: u8 = 0x07;
    pub const ACL: u8 = 0x08;
}

#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
#[repr(packed, C)]
pub struct RawEntry {
    pub file_id: u64,
    pub original_size: u64,
    pub stored_size: u64,
    /// CRC32 of the content before compression/encryption
    pub raw_checksum: u32,
    /// CRC32 of the bytes as stored in the package
    pub stored_checksum: u32,
    pub file_version: u32,
    pub metadata_version: u32,
    pub path_count: u16,
    pub file_type: u16,
    pub compression_type: u8,
    pub compression_level: u8,
    pub encryption_type: u8,
    pub hash_count: u8,
    /// Relative to the start of the variable section
    pub hash_data_offset: u32,
    pub hash_data_len: u16,
    pub optional_data_len: u16,
    /// Relative to the start of the variable section
    pub optional_data_offset: u32,
    pub reserved: u32,
}

impl RawEntry {
    pub fn from_bytes(data: &[u8]) -> Result<RawEntry, Error> {
        let bytes = data.get(..ENTRY_SIZE).ok_or(Error::Truncated {
            what: "file entry",
            expected: ENTRY_SIZE,
            actual: data.len(),
        })?;
        bytemuck::try_pod_read_unaligned(bytes).map_err(|_| Error::Overflow)
    }

    /// Length of the variable section that follows the fixed part
    pub fn variable_size(&self) -> Result<usize, Error> {
        let (hash_offset, hash_len) = (self.hash_data_offset as usize, self.hash_data_len as usize);
        let (opt_offset, opt_len) = (
            self.optional_data_offset as usize,
            self.optional_data_len as usize,
        );
        let hash_end = hash_offset.checked_add(hash_len).ok_or(Error::Overflow)?;
        let opt_end = opt_offset.checked_add(opt_len).ok_or(Error::Overflow)?;
        Ok(hash_end.max(opt_end))
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct HashEntry {
    pub hash_type: u8,
    pub purpose: u8,
    pub data: Vec<u8>,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct OptionalData {
    pub data_type: u8,
    pub data: Vec<u8>,
}

/// Decoded file entry metadata block
#[derive(Clone, Debug, PartialEq)]
pub struct EntryMeta {
    pub file_id: u64,
    pub file_type: u16,
    pub paths: Vec<String>,
    pub original_size: u64,
    pub stored_size: u64,
    pub raw_checksum: u32,
    pub stored_checksum: u32,
    pub file_version: u32,
    pub metadata_version: u32,
    pub compression_type: u8,
    pub compression_level: u8,
    pub encryption_type: u8,
    pub hashes: Vec<HashEntry>,
    pub optional_data: Vec<OptionalData>,
}

impl Display for EntryMeta {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "id={} type={} paths={:?} size={} stored={} crc={:08x}",
            self.file_id,
            self.file_type,
            self.paths,
            self.original_size,
            self.stored_size,
            self.raw_checksum
        )
    }
}

impl EntryMeta {
    pub fn new(file_id: u64, path: String) -> EntryMeta {
        EntryMeta {
            file_id,
            file_type: 0,
            paths: alloc::vec![path],
            original_size: 0,
            stored_size: 0,
            raw_checksum: 0,
            stored_checksum: 0,
            file_version: 1,
            metadata_version: 1,
            compression_type: 0,
            compression_level: 0,
            encryption_type: 0,
            hashes: Vec::new(),
            optional_data: Vec::new(),
        }
    }

    pub fn path_count(&self) -> u16 {
        self.paths.len() as u16
    }

    pub fn has_path(&self, path: &str) -> bool {
        self.paths.iter().any(|p| p == path)
    }

    pub fn is_special(&self) -> bool {
        is_special_type(self.file_type)
    }

    pub fn compression(&self) -> CompressionType {
        CompressionType::from_u8(self.compression_type)
    }

    pub fn encryption(&self) -> EncryptionType {
        EncryptionType::from_u8(self.encryption_type)
    }

    pub fn has_tags(&self) -> bool {
        self.optional_data
            .iter()
            .any(|opt| opt.data_type == optional_data_type::TAGS && !opt.data.is_empty())
    }

    fn paths_size(&self) -> usize {
        self.paths.iter().map(|p| 2 + p.len()).sum()
    }

    fn hashes_size(&self) -> usize {
        self.hashes.iter().map(|h| 4 + h.data.len()).sum()
    }

    fn optional_size(&self) -> usize {
        self.optional_data.iter().map(|o| 3 + o.data.len()).sum()
    }

    /// Fixed part plus variable section, excluding the payload
    pub fn encoded_size(&self) -> usize {
        ENTRY_SIZE + self.paths_size() + self.hashes_size() + self.optional_size()
    }

    pub fn validate(&self) -> Result<(), Error> {
        if self.file_id == 0 {
            return Err(Error::ZeroFileId { index: 0 });
        }
        if self.paths.is_empty() {
            return Err(Error::NoPaths {
                file_id: self.file_id,
            });
        }
        // Stored paths must already be in the form normalize produces
        for stored in &self.paths {
            if path::normalize(stored).ok().as_deref() != Some(stored.as_str()) {
                return Err(Error::NonCanonicalPath(stored.clone()));
            }
        }
        Ok(())
    }

    pub fn to_raw(&self) -> Result<RawEntry, Error> {
        let paths_size = self.paths_size();
        let hashes_size = self.hashes_size();
        Ok(RawEntry {
            file_id: self.file_id,
            original_size: self.original_size,
            stored_size: self.stored_size,
            raw_checksum: self.raw_checksum,
            stored_checksum: self.stored_checksum,
            file_version: self.file_version,
            metadata_version: self.metadata_version,
            path_count: u16::try_from(self.paths.len())?,
            file_type: self.file_type,
            compression_type: self.compression_type,
            compression_level: self.compression_level,
            encryption_type: self.encryption_type,
            hash_count: u8::try_from(self.hashes.len())?,
            hash_data_offset: u32::try_from(paths_size)?,
            hash_data_len: u16::try_from(hashes_size)?,
            optional_data_len: u16::try_from(self.optional_size())?,
            optional_data_offset: u32::try_from(paths_size + hashes_size)?,
            reserved: 0,
        })
    }

    /// Encode the fixed part followed by the variable section
    pub fn to_bytes(&self) -> Result<Vec<u8>, Error> {
        let raw = self.to_raw()?;
        let mut bytes = Vec::with_capacity(self.encoded_size());
        bytes.extend_from_slice(bytemuck::bytes_of(&raw));
        for path in &self.paths {
            bytes.extend_from_slice(&u16::try_from(path.len())?.to_le_bytes());
            bytes.extend_from_slice(path.as_bytes());
        }
        for hash in &self.hashes {
            bytes.push(hash.hash_type);
            bytes.push(hash.purpose);
            bytes.extend_from_slice(&u16::try_from(hash.data.len())?.to_le_bytes());
            bytes.extend_from_slice(&hash.data);
        }
        for opt in &self.optional_data {
            bytes.push(opt.data_type);
            bytes.extend_from_slice(&u16::try_from(opt.data.len())?.to_le_bytes());
            bytes.extend_from_slice(&opt.data);
        }
        Ok(bytes)
    }

    /// Decode from the fixed part and the variable section that followed it
    pub fn parse(raw: &RawEntry, variable: &[u8]) -> Result<EntryMeta, Error> {
        let reserved = raw.reserved;
        if reserved != 0 {
            return Err(Error::ReservedNotZero {
                what: "entry reserved",
                value: reserved as u64,
            });
        }

        let mut cursor = Cursor::new(variable);
        let path_count = raw.path_count;
        let mut paths = Vec::with_capacity(path_count as usize);
        for _ in 0..path_count {
            let len = cursor.u16()? as usize;
            let bytes = cursor.take(len, "entry path")?;
            let path = core::str::from_utf8(bytes)
                .map_err(|_| Error::InvalidUtf8 { what: "entry path" })?;
            paths.push(String::from(path));
        }

        let mut cursor = Cursor::at(variable, raw.hash_data_offset as usize)?;
        let mut hashes = Vec::with_capacity(raw.hash_count as usize);
        for _ in 0..raw.hash_count {
            let hash_type = cursor.u8()?;
            let purpose = cursor.u8()?;
            let len = cursor.u16()? as usize;
            hashes.push(HashEntry {
                hash_type,
                purpose,
                data: cursor.take(len, "entry hash")?.to_vec(),
            });
        }

        let start = raw.optional_data_offset as usize;
        let end = start
            .checked_add(raw.optional_data_len as usize)
            .ok_or(Error::Overflow)?;
        let section = variable.get(start..end).ok_or(Error::Truncated {
            what: "entry optional data",
            expected: end,
            actual: variable.len(),
        })?;
        let mut cursor = Cursor::new(section);
        let mut optional_data = Vec::new();
        while !cursor.is_empty() {
            let data_type = cursor.u8()?;
            let len = cursor.u16()? as usize;
            optional_data.push(OptionalData {
                data_type,
                data: cursor.take(len, "entry optional data")?.to_vec(),
            });
        }

        let meta = EntryMeta {
            file_id: raw.file_id,
            file_type: raw.file_type,
            paths,
            original_size: raw.original_size,
            stored_size: raw.stored_size,
            raw_checksum: raw.raw_checksum,
            stored_checksum: raw.stored_checksum,
            file_version: raw.file_version,
            metadata_version: raw.metadata_version,
            compression_type: raw.compression_type,
            compression_level: raw.compression_level,
            encryption_type: raw.encryption_type,
            hashes,
            optional_data,
        };
        meta.validate()?;
        Ok(meta)
    }

    /// Decode a complete metadata block held in one buffer
    pub fn from_bytes(data: &[u8]) -> Result<EntryMeta, Error> {
        let raw = RawEntry::from_bytes(data)?;
        EntryMeta::parse(&raw, &data[ENTRY_SIZE..])
    }
}

/// Bounds-checked little-endian reader over the variable section
struct Cursor<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(data: &'a [u8]) -> Self {
        Cursor { data, pos: 0 }
    }

    fn at(data: &'a [u8], pos: usize) -> Result<Self, Error> {
        if pos > data.len() {
            return Err(Error::Truncated {
                what: "entry hash data",
                expected: pos,
                actual: data.len(),
            });
        }
        Ok(Cursor { data, pos })
    }

    fn is_empty(&self) -> bool {
        self.pos >= self.data.len()
    }

    fn take(&mut self, len: usize, what: &'static str) -> Result<&'a [u8], Error> {
        let end = self.pos.checked_add(len).ok_or(Error::Overflow)?;
        let bytes = self.data.get(self.pos..end).ok_or(Error::Truncated {
            what,
            expected: end,
            actual: self.data.len(),
        })?;
        self.pos = end;
        Ok(bytes)
    }

    fn u8(&mut self) -> Result<u8, Error> {
        Ok(self.take(1, "entry field")?[0])
    }

    fn u16(&mut self) -> Result<u16, Error> {
        let bytes = self.take(2, "entry field")?;
        Ok(u16::from_le_bytes([bytes[0], bytes[1]]))
    }
}

#[cfg(test)]
mod tests {
    use alloc::string::ToString;
    use alloc::vec;

    use super::*;

    fn sample() -> EntryMeta {
        let mut meta = EntryMeta::new(3, "/docs/readme.txt".to_string());
        meta.paths.push("/docs/README".to_string());
        meta.original_size = 42;
        meta.stored_size = 42;
        meta.raw_checksum = 0xDEAD_BEEF;
        meta.stored_checksum = 0xDEAD_BEEF;
        meta.hashes.push(HashEntry {
            hash_type: hash_type::CRC32,
            purpose: hash_purpose::DEDUPLICATION,
            data: vec![0xEF, 0xBE, 0xAD, 0xDE],
        });
        meta.optional_data.push(OptionalData {
            data_type: optional_data_type::TAGS,
            data: b"lang=en".to_vec(),
        });
        meta
    }

    #[test]
    fn layout() {
        let meta = sample();
        let bytes = meta.to_bytes().unwrap();
        assert_eq!(bytes.len(), meta.encoded_size());
        assert_eq!(bytes.len(), ENTRY_SIZE + (2 + 16) + (2 + 12) + (4 + 4) + (3 + 7));

        let raw = RawEntry::from_bytes(&bytes).unwrap();
        let (path_count, hash_offset, opt_offset) =
            (raw.path_count, raw.hash_data_offset, raw.optional_data_offset);
        assert_eq!(path_count, 2);
        assert_eq!(hash_offset, 32);
        assert_eq!(opt_offset, 40);
        assert_eq!(raw.variable_size().unwrap(), 50);
        assert_eq!(&bytes[..8], &3u64.to_le_bytes());
    }

    #[test]
    fn round_trip_with_sections() {
        let meta = sample();
        let decoded = EntryMeta::from_bytes(&meta.to_bytes().unwrap()).unwrap();
        assert_eq!(decoded, meta);
        assert!(decoded.has_tags());
        assert!(decoded.has_path("/docs/README"));
    }

    #[test]
    fn rejects_entry_without_paths() {
        let mut meta = sample();
        meta.paths.clear();
        let bytes = meta.to_bytes().unwrap();
        assert_eq!(
            EntryMeta::from_bytes(&bytes).unwrap_err(),
            Error::NoPaths { file_id: 3 }
        );
    }

    #[test]
    fn rejects_escaping_stored_path() {
        let mut meta = sample();
        meta.paths[1] = "/../evil.txt".to_string();
        let err = EntryMeta::from_bytes(&meta.to_bytes().unwrap()).unwrap_err();
        assert_eq!(err, Error::NonCanonicalPath("/../evil.txt".to_string()));
        assert_eq!(err.kind(), crate::ErrorKind::Corruption);

        meta.paths[1] = "docs/relative".to_string();
        assert!(EntryMeta::from_bytes(&meta.to_bytes().unwrap()).is_err());
    }

    #[test]
    fn truncated_variable_section() {
        let bytes = sample().to_bytes().unwrap();
        let err = EntryMeta::from_bytes(&bytes[..ENTRY_SIZE + 10]).unwrap_err();
        assert!(matches!(err, Error::Truncated { .. }));
    }

    #[test]
    fn special_types() {
        assert!(!is_special_type(64999));
        assert!(is_special_type(SPECIAL_FILE_TYPE_START));
        assert!(is_special_type(PATH_METADATA_FILE_TYPE));
    }
}
