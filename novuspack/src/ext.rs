//! Extension traits for base types defined in `novuspack-core`.
use std::io::{self, Read, Write};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use novuspack_core::{path, EntryMeta, Header};

/// Stream `read` into `write`, returning the byte count and CRC32 of
/// everything copied.
pub fn copy_and_checksum<R: Read, W: Write>(
    mut read: R,
    mut write: W,
    buf: &mut [u8],
) -> io::Result<(u64, u32)> {
    let mut hasher = crc32fast::Hasher::new();
    let mut total = 0;
    loop {
        let count = match read.read(buf) {
            Ok(0) => break,
            Ok(count) => count,
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(err) => return Err(err),
        };
        total += count as u64;
        write.write_all(&buf[..count])?;
        hasher.update(&buf[..count]);
    }
    Ok((total, hasher.finalize()))
}

pub trait EntryMetaExt {
    /// Lexicographically first stored path
    fn primary_path(&self) -> &str;

    /// Stored paths in display form, sorted
    fn display_paths(&self) -> Vec<String>;
}

impl EntryMetaExt for EntryMeta {
    fn primary_path(&self) -> &str {
        self.paths.iter().min().map(String::as_str).unwrap_or("")
    }

    fn display_paths(&self) -> Vec<String> {
        let mut paths = self
            .paths
            .iter()
            .map(|p| path::to_display(p).to_string())
            .collect::<Vec<_>>();
        paths.sort();
        paths
    }
}

pub trait HeaderExt {
    fn created(&self) -> Option<SystemTime>;
    fn modified(&self) -> Option<SystemTime>;
}

impl HeaderExt for Header {
    fn created(&self) -> Option<SystemTime> {
        from_nanos(self.created_time)
    }

    fn modified(&self) -> Option<SystemTime> {
        from_nanos(self.modified_time)
    }
}

/// Zero means unset
pub(crate) fn from_nanos(nanos: u64) -> Option<SystemTime> {
    (nanos != 0).then(|| UNIX_EPOCH + Duration::from_nanos(nanos))
}

pub(crate) fn to_nanos(time: SystemTime) -> u64 {
    time.duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos().min(u64::MAX as u128) as u64)
        .unwrap_or(0)
}
