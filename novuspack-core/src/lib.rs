#![no_std]
extern crate alloc;

#[cfg(test)]
extern crate std;

#[cfg(not(target_endian = "little"))]
compile_error!("the on-disk structs are read in place and require a little endian target");

use core::mem;

pub use crate::comment::Comment;
pub use crate::entry::{
    hash_purpose, hash_type, is_special_type, optional_data_type, EntryMeta, HashEntry,
    OptionalData, RawEntry, PATH_METADATA_FILE_TYPE, SPECIAL_FILE_TYPE_START,
};
pub use crate::error::{Error, ErrorContext, ErrorKind};
pub use crate::flags::{CompressionType, EncryptionType, Features};
pub use crate::header::Header;
pub use crate::index::{FileIndex, IndexEntry, IndexHeader};

mod comment;
mod entry;
mod error;
pub mod flags;
mod header;
mod index;
pub mod path;

/// "NVPK" read as a little endian u32
pub const MAGIC: u32 = 0x4E56_504B;
pub const FORMAT_VERSION: u32 = 1;
/// Longest comment length field accepted, terminator included
pub const MAX_COMMENT_LENGTH: usize = 1_048_575;

pub const HEADER_SIZE: usize = mem::size_of::<Header>();
pub const ENTRY_SIZE: usize = mem::size_of::<RawEntry>();
pub const INDEX_HEADER_SIZE: usize = mem::size_of::<IndexHeader>();
pub const INDEX_ENTRY_SIZE: usize = mem::size_of::<IndexEntry>();

/// CRC32 (IEEE) used for every checksum in the format
pub fn crc32(data: &[u8]) -> u32 {
    crc32fast::hash(data)
}

#[cfg(test)]
mod tests {
    use core::mem;

    use crate::{
        crc32, Header, IndexEntry, IndexHeader, RawEntry, ENTRY_SIZE, HEADER_SIZE,
        INDEX_ENTRY_SIZE, INDEX_HEADER_SIZE,
    };

    #[test]
    fn header_size() {
        assert_eq!(mem::size_of::<Header>(), 112);
        assert_eq!(HEADER_SIZE, 112);
    }

    #[test]
    fn entry_size() {
        assert_eq!(mem::size_of::<RawEntry>(), 64);
        assert_eq!(ENTRY_SIZE, 64);
    }

    #[test]
    fn index_sizes() {
        assert_eq!(mem::size_of::<IndexHeader>(), 16);
        assert_eq!(INDEX_HEADER_SIZE, 16);
        assert_eq!(mem::size_of::<IndexEntry>(), 16);
        assert_eq!(INDEX_ENTRY_SIZE, 16);
    }

    #[test]
    fn crc_is_ieee() {
        assert_eq!(crc32(b"123456789"), 0xCBF4_3926);
        assert_eq!(crc32(b""), 0);
    }
}
