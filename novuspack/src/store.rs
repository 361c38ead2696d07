use novuspack_core::is_special_type;
use tracing::debug;

use crate::entry::FileEntry;
use crate::Error;

/// Outcome of detaching one path from the store
#[derive(Debug)]
pub enum Removal {
    /// The entry keeps its other paths
    Alias { file_id: u64, remaining: usize },
    /// The last path went away and the entry with it
    Entry(FileEntry),
}

impl Removal {
    pub fn file_id(&self) -> u64 {
        match self {
            Removal::Alias { file_id, .. } => *file_id,
            Removal::Entry(entry) => entry.file_id(),
        }
    }
}

/// Every file entry of a package, content and special, in write order
#[derive(Debug, Default)]
pub struct FileStore {
    entries: Vec<FileEntry>,
}

impl FileStore {
    pub fn new() -> FileStore {
        FileStore::default()
    }

    /// One more than the largest ID currently held. Removing the entry with
    /// the largest ID frees that ID for reuse.
    pub fn next_file_id(&self) -> u64 {
        self.entries.iter().map(FileEntry::file_id).max().unwrap_or(0) + 1
    }

    pub fn insert(&mut self, entry: FileEntry) -> Result<u64, Error> {
        let file_id = entry.file_id();
        if file_id == 0 {
            return Err(novuspack_core::Error::ZeroFileId {
                index: self.entries.len(),
            }
            .into());
        }
        if let Some(first) = self.position(file_id) {
            return Err(novuspack_core::Error::DuplicateFileId {
                file_id,
                first,
                second: self.entries.len(),
            }
            .into());
        }
        debug!("Inserting file entry {}", entry.meta);
        self.entries.push(entry);
        Ok(file_id)
    }

    fn position(&self, file_id: u64) -> Option<usize> {
        self.entries.iter().position(|e| e.file_id() == file_id)
    }

    pub fn get(&self, file_id: u64) -> Option<&FileEntry> {
        self.entries.iter().find(|e| e.file_id() == file_id)
    }

    pub fn get_mut(&mut self, file_id: u64) -> Option<&mut FileEntry> {
        self.entries.iter_mut().find(|e| e.file_id() == file_id)
    }

    pub fn find_by_path(&self, path: &str) -> Option<&FileEntry> {
        self.entries.iter().find(|e| e.meta.has_path(path))
    }

    pub fn owner_of_path(&self, path: &str) -> Option<u64> {
        self.find_by_path(path).map(FileEntry::file_id)
    }

    /// Whether any content entry has this original size, the cheap first
    /// stage of duplicate detection
    pub fn has_size(&self, size: u64) -> bool {
        self.content().any(|e| e.meta.original_size == size)
    }

    /// Content entry with the same size and raw checksum. Candidates whose
    /// checksum is still unknown are checksummed on the way.
    pub fn find_duplicate(&mut self, size: u64, crc: u32) -> Result<Option<u64>, Error> {
        for entry in self.entries.iter_mut() {
            if entry.is_special() || entry.meta.original_size != size {
                continue;
            }
            if entry.ensure_checksum()? == crc {
                return Ok(Some(entry.file_id()));
            }
        }
        Ok(None)
    }

    pub fn find_by_checksum(&self, crc: u32) -> Option<&FileEntry> {
        self.content()
            .find(|e| e.checksummed && e.meta.raw_checksum == crc)
    }

    /// Attach another path to an existing entry
    pub fn add_alias(&mut self, file_id: u64, path: String) -> Result<(), Error> {
        let entry = self.get_mut(file_id).ok_or_else(|| {
            Error::validation("file entry not found", "file_id", file_id, "existing file id")
        })?;
        if !entry.meta.has_path(&path) {
            entry.meta.paths.push(path);
            entry.meta.metadata_version += 1;
        }
        Ok(())
    }

    /// Detach `path`; the entry is dropped once its last path is gone
    pub fn remove_path(&mut self, path: &str) -> Option<Removal> {
        let index = self.entries.iter().position(|e| e.meta.has_path(path))?;
        let entry = &mut self.entries[index];
        entry.meta.paths.retain(|p| p != path);
        if entry.meta.paths.is_empty() {
            let entry = self.entries.remove(index);
            debug!("Removed file entry {}", entry.file_id());
            Some(Removal::Entry(entry))
        } else {
            entry.meta.metadata_version += 1;
            Some(Removal::Alias {
                file_id: entry.file_id(),
                remaining: entry.meta.paths.len(),
            })
        }
    }

    pub fn special(&self, file_type: u16) -> Option<&FileEntry> {
        self.entries.iter().find(|e| e.meta.file_type == file_type)
    }

    pub fn special_mut(&mut self, file_type: u16) -> Option<&mut FileEntry> {
        self.entries.iter_mut().find(|e| e.meta.file_type == file_type)
    }

    pub fn remove_special(&mut self, file_type: u16) -> Option<FileEntry> {
        let index = self
            .entries
            .iter()
            .position(|e| e.meta.file_type == file_type)?;
        Some(self.entries.remove(index))
    }

    pub fn has_special(&self) -> bool {
        self.entries.iter().any(FileEntry::is_special)
    }

    pub fn iter(&self) -> impl Iterator<Item = &FileEntry> {
        self.entries.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut FileEntry> {
        self.entries.iter_mut()
    }

    /// Entries that hold user content, special files excluded
    pub fn content(&self) -> impl Iterator<Item = &FileEntry> {
        self.entries.iter().filter(|e| !is_special_type(e.meta.file_type))
    }

    pub fn by_type(&self, file_type: u16) -> impl Iterator<Item = &FileEntry> {
        self.entries
            .iter()
            .filter(move |e| e.meta.file_type == file_type)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn content_count(&self) -> usize {
        self.content().count()
    }

    /// Sum of original and stored sizes over every entry
    pub fn totals(&self) -> (u64, u64) {
        self.entries.iter().fold((0, 0), |(original, stored), e| {
            (
                original + e.meta.original_size,
                stored + e.meta.stored_size,
            )
        })
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
