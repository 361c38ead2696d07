use std::time::SystemTime;

use novuspack_core::{CompressionType, EncryptionType, Features, Header};

use crate::entry::FileEntry;
use crate::ext::{to_nanos, EntryMetaExt, HeaderExt};
use crate::store::FileStore;

/// Package-level data while a package is open. The header is derived from
/// this at write time and this from the header at open time.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PackageInfo {
    pub vendor_id: u32,
    pub app_id: u64,
    /// Empty means no comment block
    pub comment: String,
    pub created: Option<SystemTime>,
    pub modified: Option<SystemTime>,
    pub package_data_version: u32,
    pub metadata_version: u32,
    /// Content files only
    pub file_count: usize,
    pub total_original_size: u64,
    pub total_stored_size: u64,
    pub has_comment: bool,
    pub has_special_metadata: bool,
    pub has_per_file_tags: bool,
    pub has_extended_attrs: bool,
    pub has_encrypted_data: bool,
    pub has_compressed_data: bool,
    pub is_signed: bool,
    pub is_metadata_only: bool,
}

impl PackageInfo {
    pub fn from_header(header: &Header, comment: String) -> PackageInfo {
        let features = header.features();
        PackageInfo {
            vendor_id: header.vendor_id,
            app_id: header.app_id,
            has_comment: !comment.is_empty(),
            comment,
            created: header.created(),
            modified: header.modified(),
            package_data_version: header.package_data_version,
            metadata_version: header.metadata_version,
            file_count: 0,
            total_original_size: 0,
            total_stored_size: 0,
            has_special_metadata: features.contains(Features::HAS_SPECIAL_METADATA),
            has_per_file_tags: features.contains(Features::HAS_PER_FILE_TAGS),
            has_extended_attrs: features.contains(Features::HAS_EXTENDED_ATTRS),
            has_encrypted_data: features.contains(Features::HAS_ENCRYPTED_FILES),
            has_compressed_data: features.contains(Features::HAS_COMPRESSED_FILES),
            is_signed: features.contains(Features::HAS_SIGNATURES),
            is_metadata_only: features.contains(Features::METADATA_ONLY),
        }
    }

    pub fn features(&self) -> Features {
        let mut features = Features::empty();
        features.set(Features::HAS_PACKAGE_COMMENT, self.has_comment);
        features.set(Features::HAS_SPECIAL_METADATA, self.has_special_metadata);
        features.set(Features::HAS_PER_FILE_TAGS, self.has_per_file_tags);
        features.set(Features::HAS_EXTENDED_ATTRS, self.has_extended_attrs);
        features.set(Features::HAS_ENCRYPTED_FILES, self.has_encrypted_data);
        features.set(Features::HAS_COMPRESSED_FILES, self.has_compressed_data);
        features.set(Features::HAS_SIGNATURES, self.is_signed);
        features.set(Features::METADATA_ONLY, self.is_metadata_only);
        features
    }

    /// Copy identifiers, times, counters and feature flags into `header`.
    /// Offsets are left to the writer.
    pub fn sync_header(&self, header: &mut Header) {
        header.vendor_id = self.vendor_id;
        header.app_id = self.app_id;
        header.created_time = self.created.map(to_nanos).unwrap_or(0);
        header.modified_time = self.modified.map(to_nanos).unwrap_or(0);
        header.package_data_version = self.package_data_version;
        header.metadata_version = self.metadata_version;
        header.set_features(self.features());
    }

    /// Recompute counts, totals and the per-entry feature flags
    pub fn refresh_from_store(&mut self, store: &FileStore) {
        self.file_count = store.content_count();
        let (original, stored) = store.totals();
        self.total_original_size = original;
        self.total_stored_size = stored;
        self.has_special_metadata = store.has_special();
        self.has_compressed_data = store
            .iter()
            .any(|e| e.meta.compression() != CompressionType::None);
        self.has_encrypted_data = store
            .iter()
            .any(|e| e.meta.encryption() != EncryptionType::None);
    }
}

/// Listing view of one content entry
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FileInfo {
    pub file_id: u64,
    pub primary_path: String,
    /// Every stored path in display form, sorted
    pub paths: Vec<String>,
    pub file_type: u16,
    pub original_size: u64,
    pub stored_size: u64,
    pub raw_checksum: u32,
    pub stored_checksum: u32,
    pub compression: CompressionType,
    pub encryption: EncryptionType,
    pub file_version: u32,
    pub metadata_version: u32,
}

impl From<&FileEntry> for FileInfo {
    fn from(entry: &FileEntry) -> FileInfo {
        let meta = &entry.meta;
        FileInfo {
            file_id: meta.file_id,
            primary_path: novuspack_core::path::to_display(meta.primary_path()).to_string(),
            paths: meta.display_paths(),
            file_type: meta.file_type,
            original_size: meta.original_size,
            stored_size: meta.stored_size,
            raw_checksum: meta.raw_checksum,
            stored_checksum: meta.stored_checksum,
            compression: meta.compression(),
            encryption: meta.encryption(),
            file_version: meta.file_version,
            metadata_version: meta.metadata_version,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, UNIX_EPOCH};

    use super::*;

    #[test]
    fn header_sync_round_trip() {
        let info = PackageInfo {
            vendor_id: 0x1234,
            app_id: 0xDEAD_BEEF,
            comment: "hello".into(),
            has_comment: true,
            has_per_file_tags: true,
            created: Some(UNIX_EPOCH + Duration::from_secs(1_700_000_000)),
            modified: Some(UNIX_EPOCH + Duration::from_secs(1_700_000_100)),
            package_data_version: 3,
            metadata_version: 5,
            ..PackageInfo::default()
        };
        let mut header = Header::new();
        info.sync_header(&mut header);

        let flags = header.features();
        assert!(flags.contains(Features::HAS_PACKAGE_COMMENT | Features::HAS_PER_FILE_TAGS));
        assert!(!flags.contains(Features::HAS_SIGNATURES));

        let back = PackageInfo::from_header(&header, "hello".into());
        assert_eq!(back, info);
    }

    #[test]
    fn refresh_counts_content_only() {
        let mut store = FileStore::new();
        store
            .insert(FileEntry::from_memory(1, "/a".into(), vec![0; 10]))
            .unwrap();
        let mut special = FileEntry::from_memory(2, "/__meta".into(), vec![0; 4]);
        special.meta.file_type = novuspack_core::PATH_METADATA_FILE_TYPE;
        store.insert(special).unwrap();

        let mut info = PackageInfo::default();
        info.refresh_from_store(&store);
        assert_eq!(info.file_count, 1);
        assert_eq!(info.total_original_size, 14);
        assert!(info.has_special_metadata);
        assert!(!info.has_compressed_data);
    }
}
