//! Engine for NovusPack packages: open, inspect, edit and atomically write
//! `.nvpk` files. The binary layout lives in `novuspack-core`.
mod bin;
mod cancel;
mod entry;
mod error;
pub mod ext;
mod guard;
mod hierarchy;
mod info;
mod options;
mod package;
mod store;
mod transaction;

pub use bin::*;
pub use cancel::CancelToken;
pub use entry::{DataSource, FileEntry};
pub use error::Error;
pub use guard::{PackageReader, PackageWriter, ReadOnlyPackage};
pub use hierarchy::{
    DirectoryMetadata, FilesystemInfo, Inheritance, PathHierarchy, PathInfo, PathKind,
    PathMetadataEntry, PATH_METADATA_FILE_PATH,
};
pub use info::{FileInfo, PackageInfo};
pub use options::{AddFileOptions, CreateOptions};
pub use package::Package;
pub use store::{FileStore, Removal};
pub use transaction::PendingWrite;

pub(crate) const READ_WRITE_CRC_BUF_SIZE: usize = 4 * 1024 * 1024;
