use alloc::format;
use alloc::string::{String, ToString};
use core::error;
use core::fmt::{self, Display, Formatter};

use crate::path::MAX_PATH_LENGTH;
use crate::{FORMAT_VERSION, MAGIC, MAX_COMMENT_LENGTH};

/// Classification shared by every error in the workspace, so callers can
/// branch without matching on individual variants.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum ErrorKind {
    /// Malformed input, invalid path, bad header field, missing key
    Validation,
    /// Open, read, write, seek, rename or permission failures
    Io,
    /// Read-only rejection or unwritable target
    Security,
    /// Intentionally unimplemented capability
    Unsupported,
    /// Cancellation
    Context,
    /// Structural or checksum mismatch in stored data
    Corruption,
}

impl Display for ErrorKind {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        let name = match self {
            ErrorKind::Validation => "validation",
            ErrorKind::Io => "io",
            ErrorKind::Security => "security",
            ErrorKind::Unsupported => "unsupported",
            ErrorKind::Context => "context",
            ErrorKind::Corruption => "corruption",
        };
        f.write_str(name)
    }
}

/// Offending field, its actual value and the expected shape of that value.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ErrorContext {
    pub field: &'static str,
    pub value: String,
    pub expected: String,
}

impl ErrorContext {
    pub fn new(field: &'static str, value: impl ToString, expected: impl ToString) -> Self {
        ErrorContext {
            field,
            value: value.to_string(),
            expected: expected.to_string(),
        }
    }
}

impl Display for ErrorContext {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(f, "{}={} (expected {})", self.field, self.value, self.expected)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Error {
    Truncated {
        what: &'static str,
        expected: usize,
        actual: usize,
    },
    InvalidMagic(u32),
    UnsupportedVersion(u32),
    ReservedNotZero {
        what: &'static str,
        value: u64,
    },
    CountMismatch {
        what: &'static str,
        count: u64,
        actual: u64,
    },
    ZeroFileId {
        index: usize,
    },
    DuplicateFileId {
        file_id: u64,
        first: usize,
        second: usize,
    },
    OffsetOutOfBounds {
        field: &'static str,
        offset: u64,
        len: u64,
    },
    NoPaths {
        file_id: u64,
    },
    InvalidUtf8 {
        what: &'static str,
    },
    EmptyPath,
    EscapesRoot(String),
    NonCanonicalPath(String),
    RootPath,
    InvalidEncoding(String),
    PathTooLong(usize),
    CommentTooLong(usize),
    CommentNul(usize),
    CommentUnterminated,
    Overflow,
    TryFromInt(core::num::TryFromIntError),
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        use Error::*;

        match self {
            Truncated { .. }
            | OffsetOutOfBounds { .. }
            | InvalidUtf8 { .. }
            | NonCanonicalPath(_)
            | CommentUnterminated
            | Overflow
            | TryFromInt(_) => ErrorKind::Corruption,
            _ => ErrorKind::Validation,
        }
    }

    pub fn context(&self) -> ErrorContext {
        use Error::*;

        match self {
            Truncated {
                what,
                expected,
                actual,
            } => ErrorContext::new(*what, format!("{} bytes", actual), format!("{} bytes", expected)),
            InvalidMagic(magic) => ErrorContext::new(
                "magic",
                format!("{:#010X}", magic),
                format!("{:#010X}", MAGIC),
            ),
            UnsupportedVersion(version) => {
                ErrorContext::new("format_version", version, FORMAT_VERSION)
            }
            ReservedNotZero { what, value } => ErrorContext::new(*what, value, 0),
            CountMismatch {
                what,
                count,
                actual,
            } => ErrorContext::new(*what, count, actual),
            ZeroFileId { index } => ErrorContext::new("file_id", index, "non-zero file id"),
            DuplicateFileId { file_id, .. } => {
                ErrorContext::new("file_id", file_id, "unique file id")
            }
            OffsetOutOfBounds { field, offset, len } => {
                ErrorContext::new(*field, offset, format!("offset below {}", len))
            }
            NoPaths { file_id } => ErrorContext::new("paths", file_id, "at least one path"),
            InvalidUtf8 { what } => ErrorContext::new(*what, "invalid bytes", "utf-8"),
            EmptyPath => ErrorContext::new("path", "", "non-empty path"),
            EscapesRoot(path) => ErrorContext::new("path", path, "path inside package root"),
            NonCanonicalPath(path) => ErrorContext::new("path", path, "canonical package path"),
            RootPath => ErrorContext::new("path", "/", "path below package root"),
            InvalidEncoding(path) => ErrorContext::new("path", path, "valid unicode"),
            PathTooLong(len) => ErrorContext::new(
                "path",
                format!("{} bytes", len),
                format!("<= {} bytes", MAX_PATH_LENGTH),
            ),
            CommentTooLong(len) => ErrorContext::new(
                "comment_length",
                len,
                format!("<= {}", MAX_COMMENT_LENGTH),
            ),
            CommentNul(pos) => ErrorContext::new("comment", pos, "no embedded NUL"),
            CommentUnterminated => ErrorContext::new("comment", "missing NUL", "NUL terminator"),
            Overflow => ErrorContext::new("size", "overflow", "value within range"),
            TryFromInt(err) => ErrorContext::new("size", err, "value within range"),
        }
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        use Error::*;

        let msg = match self {
            Truncated { what, expected, actual } => format!(
                "Truncated {}: expected {} bytes, got {}",
                what, expected, actual
            ),
            InvalidMagic(magic) => format!("Invalid magic number: {:#010X}", magic),
            UnsupportedVersion(version) => format!("Unsupported format version: {}", version),
            ReservedNotZero { what, value } => {
                format!("Reserved field {} must be zero, got {}", what, value)
            }
            CountMismatch { what, count, actual } => {
                format!("{} mismatch: recorded {}, found {}", what, count, actual)
            }
            ZeroFileId { index } => format!("File ID at index {} is zero", index),
            DuplicateFileId {
                file_id,
                first,
                second,
            } => format!(
                "Duplicate file ID {} at indices {} and {}",
                file_id, first, second
            ),
            OffsetOutOfBounds { field, offset, len } => format!(
                "{} offset {} is outside the file ({} bytes)",
                field, offset, len
            ),
            NoPaths { file_id } => format!("File entry {} has no paths", file_id),
            InvalidUtf8 { what } => format!("{} is not valid UTF-8", what),
            EmptyPath => "Path is empty".to_string(),
            EscapesRoot(path) => format!("Path would escape package root: {:?}", path),
            NonCanonicalPath(path) => format!("Stored path is not canonical: {:?}", path),
            RootPath => "Path resolves to the package root".to_string(),
            InvalidEncoding(path) => format!("Path contains invalid encoding: {:?}", path),
            PathTooLong(len) => format!(
                "Path length ({} bytes) exceeds absolute maximum ({} bytes)",
                len, MAX_PATH_LENGTH
            ),
            CommentTooLong(len) => format!(
                "Comment length {} exceeds maximum {}",
                len, MAX_COMMENT_LENGTH
            ),
            CommentNul(pos) => format!("Comment contains embedded NUL at position {}", pos),
            CommentUnterminated => "Comment is not NUL terminated".to_string(),
            Overflow => "Overflow".to_string(),
            TryFromInt(err) => format!("TryFromInt: {}", err),
        };
        write!(f, "{}", msg)
    }
}

impl error::Error for Error {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self {
            Self::TryFromInt(e) => Some(e),
            _ => None,
        }
    }
}

impl From<core::num::TryFromIntError> for Error {
    fn from(err: core::num::TryFromIntError) -> Error {
        Error::TryFromInt(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncation_is_corruption() {
        let err = Error::Truncated {
            what: "header",
            expected: 112,
            actual: 10,
        };
        assert_eq!(err.kind(), ErrorKind::Corruption);
        assert_eq!(err.context().field, "header");
        assert_eq!(err.context().value, "10 bytes");
    }

    #[test]
    fn magic_context_is_hex() {
        let ctx = Error::InvalidMagic(0xDEADBEEF).context();
        assert_eq!(ctx.field, "magic");
        assert_eq!(ctx.value, "0xDEADBEEF");
        assert_eq!(ctx.expected, "0x4E56504B");
        assert_eq!(Error::InvalidMagic(0).kind(), ErrorKind::Validation);
    }
}
