use alloc::collections::BTreeMap;
use alloc::vec::Vec;

use bytemuck::{Pod, Zeroable};

use crate::{Error, INDEX_ENTRY_SIZE, INDEX_HEADER_SIZE};

/// Fixed prefix of the file index
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
#[repr(packed, C)]
pub struct IndexHeader {
    pub entry_count: u32,
    /// Must be zero
    pub reserved: u32,
    pub first_entry_offset: u64,
}

/// Location of one file entry's metadata block
#[derive(Clone, Copy, Debug, Eq, PartialEq, Pod, Zeroable)]
#[repr(packed, C)]
pub struct IndexEntry {
    pub file_id: u64,
    pub offset: u64,
}

impl IndexEntry {
    pub fn file_id(&self) -> u64 {
        self.file_id
    }

    pub fn offset(&self) -> u64 {
        self.offset
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct FileIndex {
    pub first_entry_offset: u64,
    pub entries: Vec<IndexEntry>,
}

impl FileIndex {
    pub fn new(first_entry_offset: u64) -> FileIndex {
        FileIndex {
            first_entry_offset,
            entries: Vec::new(),
        }
    }

    pub fn push(&mut self, file_id: u64, offset: u64) {
        self.entries.push(IndexEntry { file_id, offset });
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn offset_of(&self, file_id: u64) -> Option<u64> {
        self.entries
            .iter()
            .find(|entry| entry.file_id() == file_id)
            .map(IndexEntry::offset)
    }

    pub fn encoded_size(&self) -> u64 {
        (INDEX_HEADER_SIZE + self.entries.len() * INDEX_ENTRY_SIZE) as u64
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, Error> {
        let header = IndexHeader {
            entry_count: u32::try_from(self.entries.len())?,
            reserved: 0,
            first_entry_offset: self.first_entry_offset,
        };
        let mut bytes = Vec::with_capacity(self.encoded_size() as usize);
        bytes.extend_from_slice(bytemuck::bytes_of(&header));
        bytes.extend_from_slice(bytemuck::cast_slice::<IndexEntry, u8>(self.entries.as_slice()));
        Ok(bytes)
    }

    /// Parse the fixed prefix; returns it unvalidated so the caller can size
    /// the read of the entry table.
    pub fn parse_header(data: &[u8]) -> Result<IndexHeader, Error> {
        let bytes = data.get(..INDEX_HEADER_SIZE).ok_or(Error::Truncated {
            what: "index header",
            expected: INDEX_HEADER_SIZE,
            actual: data.len(),
        })?;
        bytemuck::try_pod_read_unaligned(bytes).map_err(|_| Error::Overflow)
    }

    /// Size in bytes of the entry table that follows `header`
    pub fn entries_size(header: &IndexHeader) -> Result<usize, Error> {
        let count = header.entry_count;
        (count as usize)
            .checked_mul(INDEX_ENTRY_SIZE)
            .ok_or(Error::Overflow)
    }

    /// Build an index from its prefix and the raw entry table, then validate
    pub fn parse(header: IndexHeader, data: &[u8]) -> Result<FileIndex, Error> {
        let size = FileIndex::entries_size(&header)?;
        let table = data.get(..size).ok_or(Error::Truncated {
            what: "index entries",
            expected: size,
            actual: data.len(),
        })?;
        let entries = table
            .chunks_exact(INDEX_ENTRY_SIZE)
            .map(bytemuck::pod_read_unaligned::<IndexEntry>)
            .collect::<Vec<_>>();

        let reserved = header.reserved;
        if reserved != 0 {
            return Err(Error::ReservedNotZero {
                what: "index reserved",
                value: reserved as u64,
            });
        }
        let count = header.entry_count;
        if count as usize != entries.len() {
            return Err(Error::CountMismatch {
                what: "index entry count",
                count: count as u64,
                actual: entries.len() as u64,
            });
        }

        let index = FileIndex {
            first_entry_offset: header.first_entry_offset,
            entries,
        };
        index.validate()?;
        Ok(index)
    }

    /// Parse a complete index held in one buffer
    pub fn from_bytes(data: &[u8]) -> Result<FileIndex, Error> {
        let header = FileIndex::parse_header(data)?;
        FileIndex::parse(header, &data[INDEX_HEADER_SIZE..])
    }

    /// No zero and no duplicate file IDs
    pub fn validate(&self) -> Result<(), Error> {
        let mut seen = BTreeMap::new();
        for (i, entry) in self.entries.iter().enumerate() {
            let file_id = entry.file_id();
            if file_id == 0 {
                return Err(Error::ZeroFileId { index: i });
            }
            if let Some(first) = seen.insert(file_id, i) {
                return Err(Error::DuplicateFileId {
                    file_id,
                    first,
                    second: i,
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> FileIndex {
        let mut index = FileIndex::new(112);
        index.push(1, 112);
        index.push(2, 300);
        index.push(5, 1024);
        index
    }

    #[test]
    fn encoded_layout() {
        let index = sample();
        let bytes = index.to_bytes().unwrap();
        assert_eq!(bytes.len() as u64, index.encoded_size());
        assert_eq!(bytes.len(), 16 + 3 * 16);
        assert_eq!(&bytes[0..4], &3u32.to_le_bytes());
        assert_eq!(&bytes[4..8], &[0; 4]);
        assert_eq!(&bytes[8..16], &112u64.to_le_bytes());
        assert_eq!(&bytes[32..40], &2u64.to_le_bytes());
        assert_eq!(FileIndex::from_bytes(&bytes).unwrap(), index);
        assert_eq!(index.offset_of(5), Some(1024));
        assert_eq!(index.offset_of(3), None);
    }

    #[test]
    fn empty_index() {
        let index = FileIndex::new(112);
        let bytes = index.to_bytes().unwrap();
        assert_eq!(bytes.len(), 16);
        assert!(FileIndex::from_bytes(&bytes).unwrap().is_empty());
    }

    #[test]
    fn truncated_table() {
        let bytes = sample().to_bytes().unwrap();
        let err = FileIndex::from_bytes(&bytes[..40]).unwrap_err();
        assert!(matches!(err, Error::Truncated { .. }));
    }

    #[test]
    fn rejects_zero_and_duplicate_ids() {
        let mut index = sample();
        index.push(2, 2048);
        assert!(matches!(
            index.validate(),
            Err(Error::DuplicateFileId {
                file_id: 2,
                first: 1,
                second: 3
            })
        ));

        let mut index = FileIndex::new(112);
        index.push(0, 112);
        assert_eq!(index.validate(), Err(Error::ZeroFileId { index: 0 }));
    }

    #[test]
    fn rejects_reserved() {
        let mut bytes = sample().to_bytes().unwrap();
        bytes[4] = 1;
        assert!(matches!(
            FileIndex::from_bytes(&bytes),
            Err(Error::ReservedNotZero { .. })
        ));
    }
}
