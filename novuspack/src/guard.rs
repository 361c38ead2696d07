//! Read and write capabilities of a package, and a wrapper that only has
//! the first.
use std::path::Path;

use crate::hierarchy::{DirectoryMetadata, Inheritance, PathMetadataEntry};
use crate::info::{FileInfo, PackageInfo};
use crate::options::AddFileOptions;
use crate::{Error, Package};

/// Operations that never change a package
pub trait PackageReader {
    fn read_file(&self, path: &str) -> Result<Vec<u8>, Error>;
    fn list_files(&self) -> Vec<FileInfo>;
    fn info(&self) -> &PackageInfo;
    fn path_metadata(&self) -> &[PathMetadataEntry];
    fn validate(&self) -> Result<(), Error>;
    fn comment(&self) -> &str;
    fn has_comment(&self) -> bool;
    fn vendor_id(&self) -> u32;
    fn app_id(&self) -> u64;
    fn package_identity(&self) -> (u32, u64);
    fn session_base(&self) -> Option<&Path>;
    fn file_count(&self) -> usize;
    fn is_open(&self) -> bool;
    /// Releases the file handle only
    fn close(&mut self);
}

/// Operations that change a package in memory or on disk. Construction is
/// not part of the trait: new packages come from [`Package::create`] or
/// [`Package::create_with_options`].
pub trait PackageWriter: PackageReader {
    fn write(&mut self) -> Result<(), Error>;
    fn safe_write(&mut self, overwrite: bool) -> Result<(), Error>;
    fn fast_write(&mut self) -> Result<(), Error>;
    fn defragment(&mut self) -> Result<(), Error>;
    fn add_file(&mut self, fs_path: &Path, options: &AddFileOptions) -> Result<u64, Error>;
    fn add_file_from_memory(
        &mut self,
        path: &str,
        data: Vec<u8>,
        options: &AddFileOptions,
    ) -> Result<u64, Error>;
    fn add_file_pattern(&mut self, pattern: &str, options: &AddFileOptions) -> Result<Vec<u64>, Error>;
    fn add_directory(&mut self, dir: &Path, options: &AddFileOptions) -> Result<Vec<u64>, Error>;
    fn remove_file(&mut self, path: &str) -> Result<(), Error>;
    fn remove_file_pattern(&mut self, pattern: &str) -> Result<Vec<String>, Error>;
    fn remove_directory(&mut self, path: &str) -> Result<Vec<String>, Error>;
    fn set_comment(&mut self, comment: &str) -> Result<(), Error>;
    fn clear_comment(&mut self) -> Result<(), Error>;
    fn set_vendor_id(&mut self, vendor_id: u32) -> Result<(), Error>;
    fn clear_vendor_id(&mut self) -> Result<(), Error>;
    fn set_app_id(&mut self, app_id: u64) -> Result<(), Error>;
    fn clear_app_id(&mut self) -> Result<(), Error>;
    fn set_package_identity(&mut self, vendor_id: u32, app_id: u64) -> Result<(), Error>;
    fn clear_package_identity(&mut self) -> Result<(), Error>;
    fn set_session_base(&mut self, base: &Path) -> Result<(), Error>;
    fn clear_session_base(&mut self) -> Result<(), Error>;
    fn set_target_path(&mut self, path: &Path) -> Result<(), Error>;
    fn set_path_metadata(&mut self, entries: Vec<PathMetadataEntry>) -> Result<(), Error>;
    fn add_path_metadata(&mut self, entry: PathMetadataEntry) -> Result<(), Error>;
    fn remove_path_metadata(&mut self, path: &str) -> Result<PathMetadataEntry, Error>;
    fn update_path_metadata(&mut self, entry: PathMetadataEntry) -> Result<(), Error>;
    fn add_directory_metadata(
        &mut self,
        path: &str,
        inheritance: Option<Inheritance>,
        metadata: Option<DirectoryMetadata>,
    ) -> Result<(), Error>;
    fn remove_directory_metadata(&mut self, path: &str) -> Result<PathMetadataEntry, Error>;
    fn update_directory_metadata(
        &mut self,
        path: &str,
        inheritance: Option<Inheritance>,
        metadata: Option<DirectoryMetadata>,
    ) -> Result<(), Error>;
    fn associate_file_with_path(&mut self, file_path: &str, meta_path: &str) -> Result<(), Error>;
    fn disassociate_file_from_path(&mut self, file_path: &str) -> Result<(), Error>;
}

impl PackageReader for Package {
    fn read_file(&self, path: &str) -> Result<Vec<u8>, Error> {
        Package::read_file(self, path)
    }

    fn list_files(&self) -> Vec<FileInfo> {
        Package::list_files(self)
    }

    fn info(&self) -> &PackageInfo {
        Package::info(self)
    }

    fn path_metadata(&self) -> &[PathMetadataEntry] {
        Package::path_metadata(self)
    }

    fn validate(&self) -> Result<(), Error> {
        Package::validate(self)
    }

    fn comment(&self) -> &str {
        Package::comment(self)
    }

    fn has_comment(&self) -> bool {
        Package::has_comment(self)
    }

    fn vendor_id(&self) -> u32 {
        Package::vendor_id(self)
    }

    fn app_id(&self) -> u64 {
        Package::app_id(self)
    }

    fn package_identity(&self) -> (u32, u64) {
        Package::package_identity(self)
    }

    fn session_base(&self) -> Option<&Path> {
        Package::session_base(self)
    }

    fn file_count(&self) -> usize {
        Package::file_count(self)
    }

    fn is_open(&self) -> bool {
        Package::is_open(self)
    }

    fn close(&mut self) {
        Package::close(self)
    }
}

impl PackageWriter for Package {
    fn write(&mut self) -> Result<(), Error> {
        Package::write(self)
    }

    fn safe_write(&mut self, overwrite: bool) -> Result<(), Error> {
        Package::safe_write(self, overwrite)
    }

    fn fast_write(&mut self) -> Result<(), Error> {
        Package::fast_write(self)
    }

    fn defragment(&mut self) -> Result<(), Error> {
        Package::defragment(self)
    }

    fn add_file(&mut self, fs_path: &Path, options: &AddFileOptions) -> Result<u64, Error> {
        Package::add_file(self, fs_path, options)
    }

    fn add_file_from_memory(
        &mut self,
        path: &str,
        data: Vec<u8>,
        options: &AddFileOptions,
    ) -> Result<u64, Error> {
        Package::add_file_from_memory(self, path, data, options)
    }

    fn add_file_pattern(&mut self, pattern: &str, options: &AddFileOptions) -> Result<Vec<u64>, Error> {
        Package::add_file_pattern(self, pattern, options)
    }

    fn add_directory(&mut self, dir: &Path, options: &AddFileOptions) -> Result<Vec<u64>, Error> {
        Package::add_directory(self, dir, options)
    }

    fn remove_file(&mut self, path: &str) -> Result<(), Error> {
        Package::remove_file(self, path)
    }

    fn remove_file_pattern(&mut self, pattern: &str) -> Result<Vec<String>, Error> {
        Package::remove_file_pattern(self, pattern)
    }

    fn remove_directory(&mut self, path: &str) -> Result<Vec<String>, Error> {
        Package::remove_directory(self, path)
    }

    fn set_comment(&mut self, comment: &str) -> Result<(), Error> {
        Package::set_comment(self, comment)
    }

    fn clear_comment(&mut self) -> Result<(), Error> {
        Package::clear_comment(self);
        Ok(())
    }

    fn set_vendor_id(&mut self, vendor_id: u32) -> Result<(), Error> {
        Package::set_vendor_id(self, vendor_id);
        Ok(())
    }

    fn clear_vendor_id(&mut self) -> Result<(), Error> {
        Package::clear_vendor_id(self);
        Ok(())
    }

    fn set_app_id(&mut self, app_id: u64) -> Result<(), Error> {
        Package::set_app_id(self, app_id);
        Ok(())
    }

    fn clear_app_id(&mut self) -> Result<(), Error> {
        Package::clear_app_id(self);
        Ok(())
    }

    fn set_package_identity(&mut self, vendor_id: u32, app_id: u64) -> Result<(), Error> {
        Package::set_package_identity(self, vendor_id, app_id);
        Ok(())
    }

    fn clear_package_identity(&mut self) -> Result<(), Error> {
        Package::clear_package_identity(self);
        Ok(())
    }

    fn set_session_base(&mut self, base: &Path) -> Result<(), Error> {
        Package::set_session_base(self, base)
    }

    fn clear_session_base(&mut self) -> Result<(), Error> {
        Package::clear_session_base(self);
        Ok(())
    }

    fn set_target_path(&mut self, path: &Path) -> Result<(), Error> {
        Package::set_target_path(self, path)
    }

    fn set_path_metadata(&mut self, entries: Vec<PathMetadataEntry>) -> Result<(), Error> {
        Package::set_path_metadata(self, entries)
    }

    fn add_path_metadata(&mut self, entry: PathMetadataEntry) -> Result<(), Error> {
        Package::add_path_metadata(self, entry)
    }

    fn remove_path_metadata(&mut self, path: &str) -> Result<PathMetadataEntry, Error> {
        Package::remove_path_metadata(self, path)
    }

    fn update_path_metadata(&mut self, entry: PathMetadataEntry) -> Result<(), Error> {
        Package::update_path_metadata(self, entry)
    }

    fn add_directory_metadata(
        &mut self,
        path: &str,
        inheritance: Option<Inheritance>,
        metadata: Option<DirectoryMetadata>,
    ) -> Result<(), Error> {
        Package::add_directory_metadata(self, path, inheritance, metadata)
    }

    fn remove_directory_metadata(&mut self, path: &str) -> Result<PathMetadataEntry, Error> {
        Package::remove_directory_metadata(self, path)
    }

    fn update_directory_metadata(
        &mut self,
        path: &str,
        inheritance: Option<Inheritance>,
        metadata: Option<DirectoryMetadata>,
    ) -> Result<(), Error> {
        Package::update_directory_metadata(self, path, inheritance, metadata)
    }

    fn associate_file_with_path(&mut self, file_path: &str, meta_path: &str) -> Result<(), Error> {
        Package::associate_file_with_path(self, file_path, meta_path)
    }

    fn disassociate_file_from_path(&mut self, file_path: &str) -> Result<(), Error> {
        Package::disassociate_file_from_path(self, file_path)
    }
}

/// A package that can be inspected but not changed. Every [`PackageWriter`]
/// method fails with a Security error and leaves the package alone.
#[derive(Debug)]
pub struct ReadOnlyPackage {
    inner: Package,
}

impl ReadOnlyPackage {
    pub fn new(inner: Package) -> ReadOnlyPackage {
        ReadOnlyPackage { inner }
    }
}

fn read_only<T>(operation: &'static str) -> Result<T, Error> {
    Err(Error::ReadOnly { operation })
}

impl PackageReader for ReadOnlyPackage {
    fn read_file(&self, path: &str) -> Result<Vec<u8>, Error> {
        self.inner.read_file(path)
    }

    fn list_files(&self) -> Vec<FileInfo> {
        self.inner.list_files()
    }

    fn info(&self) -> &PackageInfo {
        self.inner.info()
    }

    fn path_metadata(&self) -> &[PathMetadataEntry] {
        self.inner.path_metadata()
    }

    fn validate(&self) -> Result<(), Error> {
        self.inner.validate()
    }

    fn comment(&self) -> &str {
        self.inner.comment()
    }

    fn has_comment(&self) -> bool {
        self.inner.has_comment()
    }

    fn vendor_id(&self) -> u32 {
        self.inner.vendor_id()
    }

    fn app_id(&self) -> u64 {
        self.inner.app_id()
    }

    fn package_identity(&self) -> (u32, u64) {
        self.inner.package_identity()
    }

    fn session_base(&self) -> Option<&Path> {
        self.inner.session_base()
    }

    fn file_count(&self) -> usize {
        self.inner.file_count()
    }

    fn is_open(&self) -> bool {
        self.inner.is_open()
    }

    fn close(&mut self) {
        self.inner.close()
    }
}

impl PackageWriter for ReadOnlyPackage {
    fn write(&mut self) -> Result<(), Error> {
        read_only("write")
    }

    fn safe_write(&mut self, _overwrite: bool) -> Result<(), Error> {
        read_only("safe_write")
    }

    fn fast_write(&mut self) -> Result<(), Error> {
        read_only("fast_write")
    }

    fn defragment(&mut self) -> Result<(), Error> {
        read_only("defragment")
    }

    fn add_file(&mut self, _fs_path: &Path, _options: &AddFileOptions) -> Result<u64, Error> {
        read_only("add_file")
    }

    fn add_file_from_memory(
        &mut self,
        _path: &str,
        _data: Vec<u8>,
        _options: &AddFileOptions,
    ) -> Result<u64, Error> {
        read_only("add_file_from_memory")
    }

    fn add_file_pattern(&mut self, _pattern: &str, _options: &AddFileOptions) -> Result<Vec<u64>, Error> {
        read_only("add_file_pattern")
    }

    fn add_directory(&mut self, _dir: &Path, _options: &AddFileOptions) -> Result<Vec<u64>, Error> {
        read_only("add_directory")
    }

    fn remove_file(&mut self, _path: &str) -> Result<(), Error> {
        read_only("remove_file")
    }

    fn remove_file_pattern(&mut self, _pattern: &str) -> Result<Vec<String>, Error> {
        read_only("remove_file_pattern")
    }

    fn remove_directory(&mut self, _path: &str) -> Result<Vec<String>, Error> {
        read_only("remove_directory")
    }

    fn set_comment(&mut self, _comment: &str) -> Result<(), Error> {
        read_only("set_comment")
    }

    fn clear_comment(&mut self) -> Result<(), Error> {
        read_only("clear_comment")
    }

    fn set_vendor_id(&mut self, _vendor_id: u32) -> Result<(), Error> {
        read_only("set_vendor_id")
    }

    fn clear_vendor_id(&mut self) -> Result<(), Error> {
        read_only("clear_vendor_id")
    }

    fn set_app_id(&mut self, _app_id: u64) -> Result<(), Error> {
        read_only("set_app_id")
    }

    fn clear_app_id(&mut self) -> Result<(), Error> {
        read_only("clear_app_id")
    }

    fn set_package_identity(&mut self, _vendor_id: u32, _app_id: u64) -> Result<(), Error> {
        read_only("set_package_identity")
    }

    fn clear_package_identity(&mut self) -> Result<(), Error> {
        read_only("clear_package_identity")
    }

    fn set_session_base(&mut self, _base: &Path) -> Result<(), Error> {
        read_only("set_session_base")
    }

    fn clear_session_base(&mut self) -> Result<(), Error> {
        read_only("clear_session_base")
    }

    fn set_target_path(&mut self, _path: &Path) -> Result<(), Error> {
        read_only("set_target_path")
    }

    fn set_path_metadata(&mut self, _entries: Vec<PathMetadataEntry>) -> Result<(), Error> {
        read_only("set_path_metadata")
    }

    fn add_path_metadata(&mut self, _entry: PathMetadataEntry) -> Result<(), Error> {
        read_only("add_path_metadata")
    }

    fn remove_path_metadata(&mut self, _path: &str) -> Result<PathMetadataEntry, Error> {
        read_only("remove_path_metadata")
    }

    fn update_path_metadata(&mut self, _entry: PathMetadataEntry) -> Result<(), Error> {
        read_only("update_path_metadata")
    }

    fn add_directory_metadata(
        &mut self,
        _path: &str,
        _inheritance: Option<Inheritance>,
        _metadata: Option<DirectoryMetadata>,
    ) -> Result<(), Error> {
        read_only("add_directory_metadata")
    }

    fn remove_directory_metadata(&mut self, _path: &str) -> Result<PathMetadataEntry, Error> {
        read_only("remove_directory_metadata")
    }

    fn update_directory_metadata(
        &mut self,
        _path: &str,
        _inheritance: Option<Inheritance>,
        _metadata: Option<DirectoryMetadata>,
    ) -> Result<(), Error> {
        read_only("update_directory_metadata")
    }

    fn associate_file_with_path(&mut self, _file_path: &str, _meta_path: &str) -> Result<(), Error> {
        read_only("associate_file_with_path")
    }

    fn disassociate_file_from_path(&mut self, _file_path: &str) -> Result<(), Error> {
        read_only("disassociate_file_from_path")
    }
}

#[cfg(test)]
mod tests {
    use novuspack_core::ErrorKind;

    use super::*;

    #[test]
    fn guard_rejects_mutation() {
        let mut package = Package::create("p.nvpk").unwrap();
        package.set_comment("keep").unwrap();
        let mut guard = ReadOnlyPackage::new(package);

        let err = PackageWriter::set_comment(&mut guard, "changed").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Security);
        assert_eq!(err.to_string(), "set_comment: package is open read-only");
        assert_eq!(guard.comment(), "keep");
    }

    fn describe_docs(writer: &mut dyn PackageWriter) -> Result<(), Error> {
        writer.add_directory_metadata("docs", None, None)?;
        writer.update_directory_metadata(
            "docs",
            None,
            Some(DirectoryMetadata {
                description: "Docs".into(),
                ..DirectoryMetadata::default()
            }),
        )
    }

    #[test]
    fn writer_comes_from_create() {
        let mut package = Package::create("p.nvpk").unwrap();
        describe_docs(&mut package).unwrap();
        assert_eq!(package.list_paths(), vec!["/docs/"]);

        let mut guard = ReadOnlyPackage::new(package);
        let err = describe_docs(&mut guard).unwrap_err();
        assert_eq!(err.to_string(), "add_directory_metadata: package is open read-only");
        assert_eq!(guard.path_metadata().len(), 1);
    }

    fn count_files(reader: &dyn PackageReader) -> usize {
        reader.file_count()
    }

    #[test]
    fn both_implement_reader() {
        let mut package = Package::create("p.nvpk").unwrap();
        PackageWriter::add_file_from_memory(&mut package, "a", b"a".to_vec(), &AddFileOptions::default())
            .unwrap();
        assert_eq!(count_files(&package), 1);
        let guard = ReadOnlyPackage::new(package);
        assert_eq!(count_files(&guard), 1);
    }
}
