//! Package path canonicalization.
//!
//! Every path stored in a package goes through [`normalize`]. A canonical
//! path always starts with a single `/` standing for the package root, never
//! contains `.` or `..` segments, and is in Unicode NFC form.

use alloc::string::String;
use alloc::vec::Vec;
use core::fmt::{self, Display, Formatter};

use unicode_normalization::UnicodeNormalization;

use crate::Error;

/// Hard upper bound on a canonical path, in bytes
pub const MAX_PATH_LENGTH: usize = 32_767;
pub const WINDOWS_PATH_LIMIT: usize = 260;
pub const MACOS_PATH_LIMIT: usize = 1024;
pub const LINUX_PATH_LIMIT: usize = 4096;

/// Portability notice for a path that is valid but longer than some host
/// filesystem will accept
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum LengthWarning {
    Windows(usize),
    MacOs(usize),
    Linux(usize),
}

impl LengthWarning {
    pub fn limit(&self) -> usize {
        match self {
            LengthWarning::Windows(_) => WINDOWS_PATH_LIMIT,
            LengthWarning::MacOs(_) => MACOS_PATH_LIMIT,
            LengthWarning::Linux(_) => LINUX_PATH_LIMIT,
        }
    }
}

impl Display for LengthWarning {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        let (platform, len) = match self {
            LengthWarning::Windows(len) => ("Windows default", len),
            LengthWarning::MacOs(len) => ("macOS", len),
            LengthWarning::Linux(len) => ("Linux", len),
        };
        write!(
            f,
            "path length ({} bytes) exceeds {} limit ({} bytes)",
            len,
            platform,
            self.limit()
        )
    }
}

/// Canonicalize a package path.
///
/// Backslashes become separators, empty and `.` segments are dropped and
/// `..` pops the previous segment. Popping past the root is an error, as is
/// a path that resolves to the root itself.
pub fn normalize(path: &str) -> Result<String, Error> {
    if path.is_empty() {
        return Err(Error::EmptyPath);
    }

    let unified = path.replace('\\', "/");
    let mut stack: Vec<&str> = Vec::new();
    for segment in unified.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                if stack.pop().is_none() {
                    return Err(Error::EscapesRoot(String::from(path)));
                }
            }
            _ => stack.push(segment),
        }
    }
    if stack.is_empty() {
        return Err(Error::RootPath);
    }

    let mut joined = String::with_capacity(unified.len() + 1);
    for segment in &stack {
        joined.push('/');
        joined.push_str(segment);
    }
    let canonical: String = joined.nfc().collect();

    if canonical.contains(char::REPLACEMENT_CHARACTER) {
        return Err(Error::InvalidEncoding(String::from(path)));
    }
    check_length(&canonical)?;
    Ok(canonical)
}

/// Reject paths over [`MAX_PATH_LENGTH`]; return the tightest portability
/// warning for paths over a common host limit.
pub fn check_length(path: &str) -> Result<Option<LengthWarning>, Error> {
    let len = path.len();
    if len > MAX_PATH_LENGTH {
        return Err(Error::PathTooLong(len));
    }
    Ok(if len > LINUX_PATH_LIMIT {
        Some(LengthWarning::Linux(len))
    } else if len > MACOS_PATH_LIMIT {
        Some(LengthWarning::MacOs(len))
    } else if len > WINDOWS_PATH_LIMIT {
        Some(LengthWarning::Windows(len))
    } else {
        None
    })
}

/// Like [`normalize`] but also refuses whitespace-only input and discards
/// the result
pub fn validate(path: &str) -> Result<(), Error> {
    if path.trim().is_empty() {
        return Err(Error::EmptyPath);
    }
    normalize(path).map(|_| ())
}

/// Strip the root marker for user-facing output
pub fn to_display(path: &str) -> &str {
    path.strip_prefix('/').unwrap_or(path)
}

/// Parent of a canonical path, or `None` for a top-level entry. A trailing
/// `/` marking a directory is ignored.
pub fn parent(path: &str) -> Option<&str> {
    let trimmed = path.strip_suffix('/').unwrap_or(path);
    match trimmed.rfind('/') {
        Some(0) | None => None,
        Some(pos) => Some(&trimmed[..pos]),
    }
}

/// Final segment of a canonical path
pub fn file_name(path: &str) -> &str {
    let trimmed = path.strip_suffix('/').unwrap_or(path);
    match trimmed.rfind('/') {
        Some(pos) => &trimmed[pos + 1..],
        None => trimmed,
    }
}

#[cfg(test)]
mod tests {
    use alloc::format;
    use alloc::string::ToString;

    use proptest::prelude::*;

    use super::*;

    #[test]
    fn resolves_dot_segments() {
        assert_eq!(normalize("a/b/c/../../d").unwrap(), "/a/d");
        assert_eq!(normalize("./a/./b/../c/d").unwrap(), "/a/c/d");
        assert_eq!(normalize("/a//b/").unwrap(), "/a/b");
        assert_eq!(normalize("docs/readme.txt").unwrap(), "/docs/readme.txt");
    }

    #[test]
    fn backslashes_are_separators() {
        assert_eq!(normalize("a\\b\\..\\c").unwrap(), "/a/c");
    }

    #[test]
    fn rejects_escape() {
        for path in ["../a", "a/../../b", ".."] {
            assert_eq!(
                normalize(path).unwrap_err(),
                Error::EscapesRoot(path.to_string()),
                "{}",
                path
            );
        }
    }

    #[test]
    fn rejects_root() {
        for path in [".", "a/..", "./", "/"] {
            assert_eq!(normalize(path).unwrap_err(), Error::RootPath, "{}", path);
        }
        assert_eq!(normalize("").unwrap_err(), Error::EmptyPath);
    }

    #[test]
    fn composes_unicode() {
        let decomposed = normalize("cafe\u{301}/menu").unwrap();
        let composed = normalize("caf\u{e9}/menu").unwrap();
        assert_eq!(decomposed, composed);
        assert_eq!(composed, "/caf\u{e9}/menu");
    }

    #[test]
    fn rejects_replacement_character() {
        assert!(matches!(
            normalize("bad\u{fffd}name"),
            Err(Error::InvalidEncoding(_))
        ));
    }

    #[test]
    fn length_bands() {
        let path = |len: usize| format!("/{}", "a".repeat(len - 1));
        assert_eq!(check_length(&path(260)).unwrap(), None);
        assert_eq!(
            check_length(&path(261)).unwrap(),
            Some(LengthWarning::Windows(261))
        );
        assert_eq!(
            check_length(&path(1025)).unwrap(),
            Some(LengthWarning::MacOs(1025))
        );
        assert_eq!(
            check_length(&path(4097)).unwrap(),
            Some(LengthWarning::Linux(4097))
        );
        assert!(check_length(&path(MAX_PATH_LENGTH)).is_ok());
        assert_eq!(
            check_length(&path(MAX_PATH_LENGTH + 1)).unwrap_err(),
            Error::PathTooLong(MAX_PATH_LENGTH + 1)
        );
        assert!(normalize(&path(MAX_PATH_LENGTH + 1)).is_err());
    }

    #[test]
    fn validate_rejects_whitespace() {
        assert_eq!(validate("   ").unwrap_err(), Error::EmptyPath);
        assert_eq!(validate("").unwrap_err(), Error::EmptyPath);
        assert!(validate("a/b").is_ok());
        assert!(validate("../a").is_err());
    }

    #[test]
    fn display_form() {
        assert_eq!(to_display("/"), "");
        assert_eq!(to_display("/a/b"), "a/b");
        assert_eq!(to_display("a/b"), "a/b");
    }

    #[test]
    fn parent_and_name() {
        assert_eq!(parent("/a/b/c.txt"), Some("/a/b"));
        assert_eq!(parent("/a/b/"), Some("/a"));
        assert_eq!(parent("/a"), None);
        assert_eq!(file_name("/a/b/c.txt"), "c.txt");
        assert_eq!(file_name("/a/b/"), "b");
    }

    proptest! {
        #[test]
        fn canonical_form(path in "[a-z./\\\\]{1,40}") {
            if let Ok(canonical) = normalize(&path) {
                prop_assert!(canonical.starts_with('/'));
                prop_assert!(!canonical.starts_with("//"));
                prop_assert!(!to_display(&canonical).starts_with('/'));
                prop_assert!(canonical.split('/').skip(1).all(|s| s != "." && s != ".." && !s.is_empty()));
                prop_assert_eq!(normalize(&canonical).unwrap(), canonical);
            }
        }

        #[test]
        fn never_escapes(depth in 1usize..8, tail in "[a-z]{1,8}") {
            let path = format!("{}{}", "../".repeat(depth), tail);
            prop_assert!(matches!(normalize(&path), Err(Error::EscapesRoot(_))));
        }
    }
}
