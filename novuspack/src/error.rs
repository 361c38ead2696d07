use std::error::Error as StdError;
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};

use novuspack_core::{ErrorContext, ErrorKind};

/// Wrap an `io::Error` with the operation that failed and, optionally, the
/// filesystem path involved. Expands to a closure for use with `map_err`.
#[macro_export]
macro_rules! wrap_io_err {
    ($path:expr, $context:expr) => {
        |source| $crate::Error::Io {
            source,
            path: Some(::std::path::Path::new(&$path).to_path_buf()),
            context: $context,
        }
    };
    ($context:expr) => {
        |source| $crate::Error::Io {
            source,
            path: None,
            context: $context,
        }
    };
}

fn fmt_path(path: &Option<PathBuf>) -> String {
    match path {
        Some(path) => format!(": {}", path.display()),
        None => String::new(),
    }
}

fn fmt_reason(reason: &Option<String>) -> String {
    match reason {
        Some(reason) => format!(" ({reason})"),
        None => String::new(),
    }
}

#[derive(thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Core(#[from] novuspack_core::Error),

    #[error("{context}{}", fmt_path(.path))]
    Io {
        #[source]
        source: io::Error,
        path: Option<PathBuf>,
        context: &'static str,
    },

    #[error("{message} ({context})")]
    Validation {
        message: String,
        context: ErrorContext,
    },

    #[error("{message} ({context})")]
    Corruption {
        message: String,
        context: ErrorContext,
    },

    #[error("{operation}: package is open read-only")]
    ReadOnly { operation: &'static str },

    #[error("Target directory is not writable: {}", .path.display())]
    NotWritable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("{operation} is not supported")]
    Unsupported { operation: &'static str },

    #[error("{operation} cancelled{}", fmt_reason(.reason))]
    Cancelled {
        operation: &'static str,
        reason: Option<String>,
    },

    #[error("Serializing path metadata")]
    Serialize(#[from] toml::ser::Error),

    #[error("Parsing path metadata")]
    Deserialize(#[from] toml::de::Error),
}

impl Error {
    pub fn validation(
        message: impl Into<String>,
        field: &'static str,
        value: impl ToString,
        expected: impl ToString,
    ) -> Error {
        Error::Validation {
            message: message.into(),
            context: ErrorContext::new(field, value, expected),
        }
    }

    pub fn corruption(
        message: impl Into<String>,
        field: &'static str,
        value: impl ToString,
        expected: impl ToString,
    ) -> Error {
        Error::Corruption {
            message: message.into(),
            context: ErrorContext::new(field, value, expected),
        }
    }

    pub(crate) fn io(source: io::Error, path: &Path, context: &'static str) -> Error {
        Error::Io {
            source,
            path: Some(path.to_path_buf()),
            context,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Core(err) => err.kind(),
            Error::Io { .. } => ErrorKind::Io,
            Error::Validation { .. } | Error::Serialize(_) | Error::Deserialize(_) => {
                ErrorKind::Validation
            }
            Error::Corruption { .. } => ErrorKind::Corruption,
            Error::ReadOnly { .. } | Error::NotWritable { .. } => ErrorKind::Security,
            Error::Unsupported { .. } => ErrorKind::Unsupported,
            Error::Cancelled { .. } => ErrorKind::Context,
        }
    }

    /// Field, value and expectation behind the failure, when known
    pub fn context(&self) -> Option<ErrorContext> {
        match self {
            Error::Core(err) => Some(err.context()),
            Error::Validation { context, .. } | Error::Corruption { context, .. } => {
                Some(context.clone())
            }
            Error::Io {
                path: Some(path),
                context,
                ..
            } => Some(ErrorContext::new("path", path.display(), *context)),
            _ => None,
        }
    }
}

impl fmt::Debug for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "[{}] {self}", self.kind())?;

        let mut source = self.source();
        while let Some(err) = source {
            writeln!(f, "\tCaused by: {err}")?;
            source = err.source();
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_error_carries_path() {
        let path = PathBuf::from("/tmp/missing.nvpk");
        let result: Result<(), io::Error> = Err(io::Error::from(io::ErrorKind::NotFound));
        let err = result.map_err(wrap_io_err!(path, "Opening package")).unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Io);
        assert_eq!(err.to_string(), "Opening package: /tmp/missing.nvpk");
        assert!(format!("{err:?}").contains("Caused by"));
        assert_eq!(err.context().unwrap().field, "path");
    }

    #[test]
    fn kinds() {
        assert_eq!(
            Error::ReadOnly { operation: "write" }.kind(),
            ErrorKind::Security
        );
        assert_eq!(
            Error::Unsupported { operation: "defragment" }.kind(),
            ErrorKind::Unsupported
        );
        let cancelled = Error::Cancelled {
            operation: "write",
            reason: Some("shutdown".into()),
        };
        assert_eq!(cancelled.kind(), ErrorKind::Context);
        assert_eq!(cancelled.to_string(), "write cancelled (shutdown)");
        assert_eq!(
            Error::from(novuspack_core::Error::RootPath).kind(),
            ErrorKind::Validation
        );
    }

    #[test]
    fn validation_context() {
        let err = Error::validation("file not found", "path", "/a.txt", "existing file path");
        let ctx = err.context().unwrap();
        assert_eq!(ctx.field, "path");
        assert_eq!(ctx.value, "/a.txt");
        assert_eq!(ctx.expected, "existing file path");
    }
}
