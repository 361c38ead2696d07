//! Whole-package operations behind the `novuspack` command line tool.
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use novuspack_core::path;
use tracing::info;

use crate::ext::HeaderExt;
use crate::{wrap_io_err, AddFileOptions, CreateOptions, Error, Package, PackageReader};

/// Regular files below `dir`, each directory's entries sorted by name
fn folder_files(dir: &Path, files: &mut Vec<PathBuf>) -> Result<(), Error> {
    let mut read_dir = Vec::new();
    for entry in fs::read_dir(dir).map_err(wrap_io_err!(dir, "Reading directory"))? {
        read_dir.push(entry.map_err(wrap_io_err!(dir, "Reading directory entry"))?);
    }
    read_dir.sort_by_key(|entry| entry.file_name());

    for entry in read_dir {
        let entry_path = entry.path();
        let file_type = entry
            .file_type()
            .map_err(wrap_io_err!(entry_path, "Inspecting directory entry"))?;
        if file_type.is_dir() {
            folder_files(&entry_path, files)?;
        } else {
            files.push(entry_path);
        }
    }
    Ok(())
}

/// Package every file below `folder` into a new archive
pub fn create(archive_path: &str, folder: &str, options: &CreateOptions) -> Result<(), Error> {
    let mut package = Package::create_with_options(archive_path, options)?;
    package.set_target_path(archive_path)?;

    let mut files = Vec::new();
    folder_files(Path::new(folder), &mut files)?;
    let add_options = AddFileOptions {
        base_path: Some(PathBuf::from(folder)),
        ..AddFileOptions::default()
    };
    for file in files.iter() {
        package.add_file(file, &add_options)?;
    }

    package.write()?;
    info!("Created {} from {} files", archive_path, files.len());
    Ok(())
}

pub fn list(archive_path: &str, out: &mut impl Write) -> Result<(), Error> {
    let package = Package::open_read_only(archive_path)?;
    for file in package.list_files() {
        for path in file.paths.iter() {
            writeln!(out, "{}", path).map_err(wrap_io_err!("Writing listing"))?;
        }
    }
    Ok(())
}

/// Copy one stored file to `out`
pub fn cat(archive_path: &str, file_path: &str, out: &mut impl Write) -> Result<(), Error> {
    let package = Package::open_read_only(archive_path)?;
    let data = package.read_file(file_path)?;
    out.write_all(&data)
        .map_err(wrap_io_err!("Writing file contents"))
}

pub fn info(archive_path: &str, out: &mut impl Write) -> Result<(), Error> {
    let package = Package::open(archive_path)?;
    let info = package.info();
    let header = package.header();
    let format_time = |time: Option<std::time::SystemTime>| match time {
        Some(time) => format!("{:?}", time),
        None => "unset".to_string(),
    };

    let mut lines = vec![
        format!("Vendor ID: {:#010x}", info.vendor_id),
        format!("App ID: {:#018x}", info.app_id),
        format!("Files: {}", info.file_count),
        format!("Original size: {}", info.total_original_size),
        format!("Stored size: {}", info.total_stored_size),
        format!("Data version: {}", info.package_data_version),
        format!("Metadata version: {}", info.metadata_version),
        format!("Created: {}", format_time(header.created())),
        format!("Modified: {}", format_time(header.modified())),
        format!("Features: {:?}", header.features()),
    ];
    if info.has_comment {
        lines.push(format!("Comment: {}", info.comment));
    }
    for dir in package.list_directories() {
        lines.push(format!("Directory: {}", path::to_display(&dir)));
    }

    for line in lines {
        writeln!(out, "{}", line).map_err(wrap_io_err!("Writing package info"))?;
    }
    Ok(())
}

/// Remove stored paths and rewrite the archive in place
pub fn remove(archive_path: &str, file_paths: &[&str]) -> Result<(), Error> {
    let mut package = Package::open(archive_path)?;
    for file_path in file_paths {
        package.remove_file(file_path)?;
    }
    package.write()
}
