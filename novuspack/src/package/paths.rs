//! Path metadata operations on an open package.
use std::collections::{BTreeMap, BTreeSet};

use novuspack_core::path;

use super::Package;
use crate::hierarchy::{
    DirectoryMetadata, Inheritance, PathHierarchy, PathInfo, PathMetadataEntry,
};
use crate::Error;

/// Canonical form of a directory path, `/`-terminated
fn directory_path(path: &str) -> Result<String, Error> {
    let mut canonical = path::normalize(path)?;
    canonical.push('/');
    Ok(canonical)
}

impl Package {
    pub fn path_metadata(&self) -> &[PathMetadataEntry] {
        self.hierarchy.entries()
    }

    pub fn path_metadata_entry(&self, path: &str) -> Option<&PathMetadataEntry> {
        self.hierarchy.get(path)
    }

    /// Replace all path metadata. Duplicate paths are accepted here and
    /// reported by [`Package::path_conflicts`].
    pub fn set_path_metadata(&mut self, entries: Vec<PathMetadataEntry>) -> Result<(), Error> {
        self.hierarchy.replace(entries)?;
        self.hierarchy.rebuild_associations(&self.store);
        self.touch_metadata();
        Ok(())
    }

    pub fn add_path_metadata(&mut self, entry: PathMetadataEntry) -> Result<(), Error> {
        self.hierarchy.insert(entry)?;
        self.hierarchy.rebuild_associations(&self.store);
        self.touch_metadata();
        Ok(())
    }

    pub fn remove_path_metadata(&mut self, path: &str) -> Result<PathMetadataEntry, Error> {
        let removed = self.hierarchy.remove(path)?;
        self.touch_metadata();
        Ok(removed)
    }

    pub fn update_path_metadata(&mut self, entry: PathMetadataEntry) -> Result<(), Error> {
        self.hierarchy.update(entry)?;
        self.touch_metadata();
        Ok(())
    }

    pub fn add_directory_metadata(
        &mut self,
        path: &str,
        inheritance: Option<Inheritance>,
        metadata: Option<DirectoryMetadata>,
    ) -> Result<(), Error> {
        let mut entry = PathMetadataEntry::directory(directory_path(path)?);
        entry.inheritance = inheritance;
        entry.metadata = metadata;
        self.add_path_metadata(entry)
    }

    pub fn remove_directory_metadata(&mut self, path: &str) -> Result<PathMetadataEntry, Error> {
        self.remove_path_metadata(&directory_path(path)?)
    }

    pub fn update_directory_metadata(
        &mut self,
        path: &str,
        inheritance: Option<Inheritance>,
        metadata: Option<DirectoryMetadata>,
    ) -> Result<(), Error> {
        let path = directory_path(path)?;
        let entry = self.hierarchy.get_mut(&path).ok_or_else(|| {
            Error::validation("path not found", "path", &path, "existing directory path")
        })?;
        entry.inheritance = inheritance;
        entry.metadata = metadata;
        self.touch_metadata();
        Ok(())
    }

    /// Every entry must be valid and no path may appear twice
    pub fn validate_path_metadata(&self) -> Result<(), Error> {
        self.hierarchy.validate()?;
        let conflicts = self.hierarchy.conflicts();
        if let Some(first) = conflicts.first() {
            return Err(Error::validation(
                format!("{} duplicate path metadata entries", conflicts.len()),
                "path",
                first,
                "unique paths",
            ));
        }
        Ok(())
    }

    pub fn path_conflicts(&self) -> Vec<String> {
        self.hierarchy.conflicts()
    }

    pub fn path_info(&self, path: &str) -> Result<PathInfo, Error> {
        self.hierarchy
            .info(path)
            .ok_or_else(|| Error::validation("path not found", "path", path, "existing path"))
    }

    pub fn list_paths(&self) -> Vec<String> {
        let mut paths = self
            .hierarchy
            .entries()
            .iter()
            .map(|e| e.path.clone())
            .collect::<Vec<_>>();
        paths.sort();
        paths
    }

    /// Directories with explicit metadata plus every directory implied by a
    /// stored file path
    pub fn list_directories(&self) -> Vec<String> {
        let mut dirs = PathHierarchy::implied_directories(&self.store);
        dirs.extend(
            self.hierarchy
                .entries()
                .iter()
                .filter(|e| e.is_directory())
                .map(|e| e.path.clone()),
        );
        dirs.into_iter().collect()
    }

    /// Parent path (empty for top level) to its direct children
    pub fn path_hierarchy(&self) -> BTreeMap<String, Vec<String>> {
        self.hierarchy.tree()
    }

    /// Link the file stored at `file_path` to the metadata entry `meta_path`
    pub fn associate_file_with_path(&mut self, file_path: &str, meta_path: &str) -> Result<(), Error> {
        let stored = path::normalize(file_path)?;
        let file_id = self.store.owner_of_path(&stored).ok_or_else(|| {
            Error::validation(
                "file not found at specified path",
                "path",
                &stored,
                "existing file path",
            )
        })?;
        if !self.hierarchy.associate(meta_path, file_id) {
            return Err(Error::validation(
                "path not found",
                "path",
                meta_path,
                "existing path",
            ));
        }
        Ok(())
    }

    pub fn disassociate_file_from_path(&mut self, file_path: &str) -> Result<(), Error> {
        let stored = path::normalize(file_path)?;
        let file_id = self.store.owner_of_path(&stored).ok_or_else(|| {
            Error::validation(
                "file not found at specified path",
                "path",
                &stored,
                "existing file path",
            )
        })?;
        if !self.hierarchy.disassociate(&stored, file_id) {
            return Err(Error::validation(
                "path not associated",
                "path",
                &stored,
                "associated path",
            ));
        }
        Ok(())
    }

    /// Paths of every metadata entry that has at least one file linked
    pub fn associated_paths(&self) -> BTreeSet<&str> {
        self.hierarchy
            .entries()
            .iter()
            .filter(|e| !e.file_ids.is_empty())
            .map(|e| e.path.as_str())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use novuspack_core::ErrorKind;

    use super::*;
    use crate::AddFileOptions;

    fn package() -> Package {
        let mut package = Package::create("p.nvpk").unwrap();
        let options = AddFileOptions::default();
        package
            .add_file_from_memory("docs/guide/intro.md", b"intro".to_vec(), &options)
            .unwrap();
        package
            .add_file_from_memory("bin/tool", b"\x7fELF".to_vec(), &options)
            .unwrap();
        package
    }

    #[test]
    fn adds_file_entries_automatically() {
        let package = package();
        assert_eq!(package.list_paths(), vec!["/bin/tool", "/docs/guide/intro.md"]);
        assert_eq!(
            package.associated_paths().into_iter().collect::<Vec<_>>(),
            vec!["/bin/tool", "/docs/guide/intro.md"]
        );
    }

    #[test]
    fn directory_metadata_lifecycle() {
        let mut package = package();
        package
            .add_directory_metadata(
                "docs",
                Some(Inheritance {
                    enabled: true,
                    priority: 1,
                }),
                None,
            )
            .unwrap();
        assert!(package.path_metadata_entry("/docs/").is_some());

        let err = package.add_directory_metadata("docs/", None, None).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);

        package
            .update_directory_metadata(
                "/docs",
                None,
                Some(DirectoryMetadata {
                    description: "Documentation".into(),
                    ..DirectoryMetadata::default()
                }),
            )
            .unwrap();
        let docs = package.path_metadata_entry("/docs/").unwrap();
        assert!(docs.inheritance.is_none());
        assert_eq!(docs.metadata.as_ref().unwrap().description, "Documentation");

        let info = package.path_info("/docs/").unwrap();
        assert_eq!(info.depth, 1);
        assert!(info.sub_dirs.is_empty());

        package.remove_directory_metadata("docs").unwrap();
        assert!(package.remove_directory_metadata("docs").is_err());
        assert!(package.update_directory_metadata("docs", None, None).is_err());
    }

    #[test]
    fn directories_include_implied_ones() {
        let mut package = package();
        package.add_directory_metadata("assets", None, None).unwrap();
        assert_eq!(
            package.list_directories(),
            vec!["/assets/", "/bin/", "/docs/", "/docs/guide/"]
        );
    }

    #[test]
    fn conflicts_and_validation() {
        let mut package = package();
        let mut entries = package.path_metadata().to_vec();
        entries.push(PathMetadataEntry::file("/bin/tool"));
        package.set_path_metadata(entries).unwrap();
        assert_eq!(package.path_conflicts(), vec!["/bin/tool"]);
        assert!(package.validate_path_metadata().is_err());

        package.remove_path_metadata("/bin/tool").unwrap();
        assert!(package.path_conflicts().is_empty());
        package.validate_path_metadata().unwrap();
    }

    #[test]
    fn association_commands() {
        let mut package = package();
        package.disassociate_file_from_path("bin/tool").unwrap();
        assert!(package.disassociate_file_from_path("bin/tool").is_err());
        assert!(package.path_metadata_entry("/bin/tool").unwrap().file_ids.is_empty());

        package.associate_file_with_path("bin/tool", "/bin/tool").unwrap();
        assert_eq!(package.path_metadata_entry("/bin/tool").unwrap().file_ids.len(), 1);

        assert!(package.associate_file_with_path("missing", "/bin/tool").is_err());
        assert!(package.associate_file_with_path("bin/tool", "/nope").is_err());
    }

    #[test]
    fn tags_drive_header_flags() {
        let mut package = package();
        assert!(!package.info().has_per_file_tags);
        let mut entry = package.path_metadata_entry("/bin/tool").unwrap().clone();
        entry.properties.insert("arch".into(), "x86_64".into());
        entry.filesystem.extended_attrs.insert("user.origin".into(), "ci".into());
        package.update_path_metadata(entry).unwrap();
        assert!(package.info().has_per_file_tags);
        assert!(package.info().has_extended_attrs);
        assert_eq!(
            package.path_metadata_entry("/bin/tool").unwrap().file_ids.len(),
            1
        );
    }
}
