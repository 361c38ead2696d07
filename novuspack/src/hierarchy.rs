//! Path metadata: per-path tags, directory settings and filesystem provenance,
//! kept apart from file content and persisted in a special file.
use std::collections::{BTreeMap, BTreeSet};

use novuspack_core::path;
use serde::{Deserialize, Serialize};

use crate::store::FileStore;
use crate::Error;

/// Stored path of the special file holding the serialized hierarchy
pub const PATH_METADATA_FILE_PATH: &str = "/__NVPK_PATH_65001__.nvpkpath";

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PathKind {
    #[default]
    File,
    Directory,
    FileSymlink,
    DirectorySymlink,
}

impl PathKind {
    pub fn is_directory(self) -> bool {
        matches!(self, PathKind::Directory | PathKind::DirectorySymlink)
    }
}

/// Tag inheritance settings of a directory
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Inheritance {
    pub enabled: bool,
    /// Higher is more specific
    pub priority: i32,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryMetadata {
    #[serde(default)]
    pub created: String,
    #[serde(default)]
    pub modified: String,
    #[serde(default)]
    pub description: String,
}

/// Where a path came from on the host filesystem. Times are nanoseconds
/// since the Unix epoch.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilesystemInfo {
    #[serde(default)]
    pub is_executable: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uid: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gid: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mod_time: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub create_time: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_time: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link_target: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extended_attrs: BTreeMap<String, String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathMetadataEntry {
    pub path: String,
    #[serde(rename = "type", default)]
    pub kind: PathKind,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub properties: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inheritance: Option<Inheritance>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<DirectoryMetadata>,
    #[serde(default)]
    pub filesystem: FilesystemInfo,
    /// File entries stored under this path, rebuilt after every load
    #[serde(skip)]
    pub file_ids: Vec<u64>,
}

impl PathMetadataEntry {
    pub fn file(path: impl Into<String>) -> PathMetadataEntry {
        PathMetadataEntry {
            path: path.into(),
            ..PathMetadataEntry::default()
        }
    }

    /// A directory entry; the trailing `/` is added when missing
    pub fn directory(path: impl Into<String>) -> PathMetadataEntry {
        let mut path = path.into();
        if !path.ends_with('/') {
            path.push('/');
        }
        PathMetadataEntry {
            path,
            kind: PathKind::Directory,
            ..PathMetadataEntry::default()
        }
    }

    pub fn is_directory(&self) -> bool {
        self.kind.is_directory()
    }

    /// Number of path segments below the package root
    pub fn depth(&self) -> usize {
        self.path.split('/').filter(|s| !s.is_empty()).count()
    }

    pub fn validate(&self) -> Result<(), Error> {
        let bare = self.path.strip_suffix('/').unwrap_or(&self.path);
        let canonical = path::normalize(bare)?;
        if canonical != bare {
            return Err(Error::validation(
                "path metadata path is not canonical",
                "path",
                &self.path,
                canonical,
            ));
        }
        if !self.is_directory() {
            if self.path.ends_with('/') {
                return Err(Error::validation(
                    "file path must not end with '/'",
                    "path",
                    &self.path,
                    bare,
                ));
            }
            if self.inheritance.is_some() {
                return Err(Error::validation(
                    "inheritance must be unset for file paths",
                    "inheritance",
                    &self.path,
                    "none for file paths",
                ));
            }
            if self.metadata.is_some() {
                return Err(Error::validation(
                    "metadata must be unset for file paths",
                    "metadata",
                    &self.path,
                    "none for file paths",
                ));
            }
        }
        Ok(())
    }
}

/// Summary of one path and its neighbourhood in the hierarchy
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PathInfo {
    pub entry: PathMetadataEntry,
    pub file_count: usize,
    pub sub_dirs: Vec<String>,
    pub parent_path: Option<String>,
    pub depth: usize,
}

#[derive(Serialize)]
struct DocumentRef<'a> {
    paths: &'a [PathMetadataEntry],
}

#[derive(Deserialize)]
struct Document {
    #[serde(default)]
    paths: Vec<PathMetadataEntry>,
}

#[derive(Clone, Debug, Default)]
pub struct PathHierarchy {
    entries: Vec<PathMetadataEntry>,
}

impl PathHierarchy {
    pub fn new() -> PathHierarchy {
        PathHierarchy::default()
    }

    pub fn entries(&self) -> &[PathMetadataEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn get(&self, path: &str) -> Option<&PathMetadataEntry> {
        self.entries.iter().find(|e| e.path == path)
    }

    pub fn get_mut(&mut self, path: &str) -> Option<&mut PathMetadataEntry> {
        self.entries.iter_mut().find(|e| e.path == path)
    }

    /// Replace every entry. Each is validated; duplicate paths are kept and
    /// reported by [`PathHierarchy::conflicts`].
    pub fn replace(&mut self, entries: Vec<PathMetadataEntry>) -> Result<(), Error> {
        for entry in entries.iter() {
            entry.validate()?;
        }
        self.entries = entries;
        Ok(())
    }

    pub fn insert(&mut self, entry: PathMetadataEntry) -> Result<(), Error> {
        entry.validate()?;
        if self.get(&entry.path).is_some() {
            return Err(Error::validation(
                "path already exists",
                "path",
                &entry.path,
                "path not yet in metadata",
            ));
        }
        self.entries.push(entry);
        Ok(())
    }

    pub fn remove(&mut self, path: &str) -> Result<PathMetadataEntry, Error> {
        let index = self
            .entries
            .iter()
            .position(|e| e.path == path)
            .ok_or_else(|| Error::validation("path not found", "path", path, "existing path"))?;
        Ok(self.entries.remove(index))
    }

    /// Replace the entry stored at `entry.path`, keeping its associations
    pub fn update(&mut self, mut entry: PathMetadataEntry) -> Result<(), Error> {
        entry.validate()?;
        let slot = self.get_mut(&entry.path).ok_or_else(|| {
            Error::validation("path not found", "path", &entry.path, "existing path")
        })?;
        entry.file_ids = std::mem::take(&mut slot.file_ids);
        *slot = entry;
        Ok(())
    }

    /// Computed parent: the path minus its last segment, as a file or
    /// directory entry. A missing parent is not an error.
    pub fn parent(&self, path: &str) -> Option<&PathMetadataEntry> {
        let parent = path::parent(path)?;
        self.get(parent)
            .or_else(|| self.get(&format!("{}/", parent)))
    }

    /// File-kind entry for `path`, created when missing
    pub fn ensure_file(&mut self, path: &str) -> &mut PathMetadataEntry {
        match self.entries.iter().position(|e| e.path == path) {
            Some(index) => &mut self.entries[index],
            None => {
                self.entries.push(PathMetadataEntry::file(path));
                let last = self.entries.len() - 1;
                &mut self.entries[last]
            }
        }
    }

    pub fn associate(&mut self, path: &str, file_id: u64) -> bool {
        match self.get_mut(path) {
            Some(entry) => {
                if !entry.file_ids.contains(&file_id) {
                    entry.file_ids.push(file_id);
                }
                true
            }
            None => false,
        }
    }

    pub fn disassociate(&mut self, path: &str, file_id: u64) -> bool {
        match self.get_mut(path) {
            Some(entry) => {
                let before = entry.file_ids.len();
                entry.file_ids.retain(|id| *id != file_id);
                entry.file_ids.len() != before
            }
            None => false,
        }
    }

    /// Link every stored file path to the entry with exactly the same path
    pub fn rebuild_associations(&mut self, store: &FileStore) {
        for entry in self.entries.iter_mut() {
            entry.file_ids.clear();
        }
        for file in store.content() {
            for file_path in file.paths() {
                self.associate(file_path, file.file_id());
            }
        }
    }

    /// Every directory prefix of every stored file path, `/`-terminated
    pub fn implied_directories(store: &FileStore) -> BTreeSet<String> {
        let mut dirs = BTreeSet::new();
        for file in store.content() {
            for file_path in file.paths() {
                let mut current = path::parent(file_path);
                while let Some(dir) = current {
                    if !dirs.insert(format!("{}/", dir)) {
                        break;
                    }
                    current = path::parent(dir);
                }
            }
        }
        dirs
    }

    pub fn has_per_file_tags(&self) -> bool {
        self.entries.iter().any(|e| !e.properties.is_empty())
    }

    pub fn has_extended_attrs(&self) -> bool {
        self.entries
            .iter()
            .any(|e| !e.filesystem.extended_attrs.is_empty())
    }

    /// Paths that appear on more than one entry
    pub fn conflicts(&self) -> Vec<String> {
        let mut seen = BTreeSet::new();
        let mut conflicts = BTreeSet::new();
        for entry in self.entries.iter() {
            if !seen.insert(entry.path.as_str()) {
                conflicts.insert(entry.path.clone());
            }
        }
        conflicts.into_iter().collect()
    }

    pub fn validate(&self) -> Result<(), Error> {
        for (index, entry) in self.entries.iter().enumerate() {
            entry.validate().map_err(|err| {
                Error::validation(
                    format!("invalid path metadata entry: {}", err),
                    "paths",
                    index,
                    "valid path metadata entry",
                )
            })?;
        }
        Ok(())
    }

    pub fn info(&self, path: &str) -> Option<PathInfo> {
        let entry = self.get(path)?;
        let sub_dirs = self
            .entries
            .iter()
            .filter(|e| e.is_directory() && self.parent(&e.path).map(|p| &p.path) == Some(&entry.path))
            .map(|e| e.path.clone())
            .collect();
        Some(PathInfo {
            entry: entry.clone(),
            file_count: entry.file_ids.len(),
            sub_dirs,
            parent_path: self.parent(path).map(|p| p.path.clone()),
            depth: entry.depth(),
        })
    }

    /// Parent path (empty for none) to the paths directly below it
    pub fn tree(&self) -> BTreeMap<String, Vec<String>> {
        let mut tree: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for entry in self.entries.iter() {
            let parent = self
                .parent(&entry.path)
                .map(|p| p.path.clone())
                .unwrap_or_default();
            tree.entry(parent).or_default().push(entry.path.clone());
        }
        tree
    }

    pub fn to_toml(&self) -> Result<String, Error> {
        Ok(toml::to_string(&DocumentRef {
            paths: &self.entries,
        })?)
    }

    /// Parse and validate a serialized hierarchy. Associations start empty.
    pub fn from_toml(text: &str) -> Result<PathHierarchy, Error> {
        let document: Document = toml::from_str(text)?;
        let hierarchy = PathHierarchy {
            entries: document.paths,
        };
        hierarchy.validate()?;
        Ok(hierarchy)
    }
}

#[cfg(test)]
mod tests {
    use crate::entry::FileEntry;

    use super::*;

    fn sample() -> PathHierarchy {
        let mut hierarchy = PathHierarchy::new();
        let mut docs = PathMetadataEntry::directory("/docs");
        docs.inheritance = Some(Inheritance {
            enabled: true,
            priority: 2,
        });
        hierarchy.insert(docs).unwrap();
        let mut readme = PathMetadataEntry::file("/docs/readme.md");
        readme.properties.insert("lang".into(), "en".into());
        readme.filesystem.mode = Some(0o644);
        hierarchy.insert(readme).unwrap();
        hierarchy
    }

    #[test]
    fn toml_round_trip() {
        let hierarchy = sample();
        let text = hierarchy.to_toml().unwrap();
        assert!(text.contains("[[paths]]"));
        let parsed = PathHierarchy::from_toml(&text).unwrap();
        assert_eq!(parsed.entries(), hierarchy.entries());
        assert!(parsed.has_per_file_tags());
        assert!(!parsed.has_extended_attrs());
    }

    #[test]
    fn rejects_invalid_entries() {
        let mut hierarchy = PathHierarchy::new();
        let mut file = PathMetadataEntry::file("/a.txt");
        file.metadata = Some(DirectoryMetadata::default());
        assert!(hierarchy.insert(file).is_err());
        assert!(hierarchy
            .insert(PathMetadataEntry::file("/a/../../b"))
            .is_err());
        assert!(hierarchy.insert(PathMetadataEntry::file("a/b")).is_err());

        let text = "[[paths]]\npath = \"/x/\"\ntype = \"file\"\n";
        let err = PathHierarchy::from_toml(text).unwrap_err();
        assert_eq!(err.context().unwrap().field, "paths");
    }

    #[test]
    fn duplicates_fail_insert_but_are_reported() {
        let mut hierarchy = sample();
        assert!(hierarchy
            .insert(PathMetadataEntry::file("/docs/readme.md"))
            .is_err());
        let mut entries = hierarchy.entries().to_vec();
        entries.push(PathMetadataEntry::file("/docs/readme.md"));
        hierarchy.replace(entries).unwrap();
        assert_eq!(hierarchy.conflicts(), vec!["/docs/readme.md".to_string()]);
    }

    #[test]
    fn parents_are_looked_up() {
        let hierarchy = sample();
        assert_eq!(hierarchy.parent("/docs/readme.md").unwrap().path, "/docs/");
        assert!(hierarchy.parent("/docs/").is_none());
        assert!(hierarchy.parent("/other/file").is_none());

        let info = hierarchy.info("/docs/").unwrap();
        assert_eq!(info.depth, 1);
        assert_eq!(info.parent_path, None);

        let tree = hierarchy.tree();
        assert_eq!(tree[""], vec!["/docs/".to_string()]);
        assert_eq!(tree["/docs/"], vec!["/docs/readme.md".to_string()]);
    }

    #[test]
    fn associations_follow_store() {
        let mut hierarchy = sample();
        let mut store = FileStore::new();
        store
            .insert(FileEntry::from_memory(1, "/docs/readme.md".into(), b"hi".to_vec()))
            .unwrap();
        store
            .insert(FileEntry::from_memory(2, "/src/lib/mod.rs".into(), b"fn".to_vec()))
            .unwrap();

        hierarchy.rebuild_associations(&store);
        assert_eq!(hierarchy.get("/docs/readme.md").unwrap().file_ids, vec![1]);
        assert!(hierarchy.disassociate("/docs/readme.md", 1));
        assert!(!hierarchy.disassociate("/docs/readme.md", 1));

        let dirs = PathHierarchy::implied_directories(&store);
        let dirs: Vec<_> = dirs.into_iter().collect();
        assert_eq!(dirs, vec!["/docs/", "/src/", "/src/lib/"]);
    }
}
