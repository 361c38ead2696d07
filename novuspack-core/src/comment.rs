use alloc::string::String;
use alloc::vec::Vec;

use crate::{Error, MAX_COMMENT_LENGTH};

/// Package comment block: `u32` length including the NUL terminator, the
/// UTF-8 text, a NUL, then three reserved zero bytes.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Comment {
    text: String,
}

impl Comment {
    /// Build a comment from user text. One trailing NUL is tolerated and
    /// dropped; any other NUL is rejected.
    pub fn new(text: &str) -> Result<Comment, Error> {
        let text = text.strip_suffix('\0').unwrap_or(text);
        if let Some(pos) = text.bytes().position(|b| b == 0) {
            return Err(Error::CommentNul(pos));
        }
        let length = text.len() + 1;
        if length > MAX_COMMENT_LENGTH {
            return Err(Error::CommentTooLong(length));
        }
        Ok(Comment {
            text: String::from(text),
        })
    }

    /// Logical text, never containing the terminator
    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn into_text(self) -> String {
        self.text
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    /// Value of the on-disk length field
    pub fn length(&self) -> u32 {
        (self.text.len() + 1) as u32
    }

    pub fn encoded_size(&self) -> usize {
        4 + self.length() as usize + 3
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(self.encoded_size());
        bytes.extend_from_slice(&self.length().to_le_bytes());
        bytes.extend_from_slice(self.text.as_bytes());
        bytes.push(0);
        bytes.extend_from_slice(&[0; 3]);
        bytes
    }

    pub fn parse(data: &[u8]) -> Result<Comment, Error> {
        let prefix = data.get(..4).ok_or(Error::Truncated {
            what: "comment length",
            expected: 4,
            actual: data.len(),
        })?;
        let length = u32::from_le_bytes([prefix[0], prefix[1], prefix[2], prefix[3]]) as usize;
        if length > MAX_COMMENT_LENGTH {
            return Err(Error::CommentTooLong(length));
        }

        let end = 4 + length + 3;
        let block = data.get(..end).ok_or(Error::Truncated {
            what: "comment",
            expected: end,
            actual: data.len(),
        })?;
        let (body, reserved) = block[4..].split_at(length);

        let text = match body.split_last() {
            Some((0, text)) => text,
            _ => return Err(Error::CommentUnterminated),
        };
        if let Some(pos) = text.iter().position(|&b| b == 0) {
            return Err(Error::CommentNul(pos));
        }
        if reserved.iter().any(|&b| b != 0) {
            return Err(Error::ReservedNotZero {
                what: "comment reserved",
                value: reserved.iter().fold(0u64, |acc, &b| (acc << 8) | b as u64),
            });
        }
        let text = core::str::from_utf8(text).map_err(|_| Error::InvalidUtf8 { what: "comment" })?;
        Ok(Comment {
            text: String::from(text),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout() {
        let comment = Comment::new("hello").unwrap();
        let bytes = comment.to_bytes();
        assert_eq!(comment.length(), 6);
        assert_eq!(bytes.len(), 4 + 6 + 3);
        assert_eq!(&bytes[..4], &6u32.to_le_bytes());
        assert_eq!(&bytes[4..10], b"hello\0");
        assert_eq!(&bytes[10..], &[0, 0, 0]);
    }

    #[test]
    fn terminator_is_stripped() {
        let comment = Comment::new("build 42\0").unwrap();
        assert_eq!(comment.text(), "build 42");
        let decoded = Comment::parse(&comment.to_bytes()).unwrap();
        assert_eq!(decoded.text(), "build 42");
        assert!(!decoded.text().contains('\0'));
    }

    #[test]
    fn unicode_survives() {
        let comment = Comment::new("résumé ✓").unwrap();
        assert_eq!(Comment::parse(&comment.to_bytes()).unwrap(), comment);
    }

    #[test]
    fn rejects_embedded_nul() {
        assert_eq!(Comment::new("a\0b").unwrap_err(), Error::CommentNul(1));
    }

    #[test]
    fn rejects_oversize() {
        let text = "x".repeat(MAX_COMMENT_LENGTH);
        assert_eq!(
            Comment::new(&text).unwrap_err(),
            Error::CommentTooLong(MAX_COMMENT_LENGTH + 1)
        );
        assert!(Comment::new(&text[1..]).is_ok());
    }

    #[test]
    fn rejects_missing_terminator() {
        let mut bytes = Comment::new("abc").unwrap().to_bytes();
        bytes[7] = b'!';
        assert_eq!(Comment::parse(&bytes).unwrap_err(), Error::CommentUnterminated);
    }

    #[test]
    fn truncated_block() {
        let bytes = Comment::new("abc").unwrap().to_bytes();
        assert!(matches!(
            Comment::parse(&bytes[..6]),
            Err(Error::Truncated { .. })
        ));
    }
}
