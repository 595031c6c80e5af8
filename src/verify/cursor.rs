// ABOUTME: Cursor and digest value types threaded between checksum pages
// ABOUTME: Keeps "first page" and "no more pages" as distinct states

use crate::database::{DigestParts, KeyValue};
use serde::Serialize;
use std::fmt;

/// Position of one side of a table scan.
///
/// A cursor is produced by the checksum engine and must be handed back to it
/// unchanged for the next page; only the initial cursor is built from the
/// configured page size.
#[derive(Debug, Clone, PartialEq)]
pub enum PageCursor {
    /// Start of the table
    First { limit: u64 },
    /// Rows strictly after `keys`, at most `limit` of them
    After { keys: Vec<KeyValue>, limit: u64 },
    /// Every row has been covered
    Exhausted,
}

impl PageCursor {
    pub fn first(page_size: u64) -> Self {
        PageCursor::First { limit: page_size }
    }

    /// Rows requested by the next page, zero once exhausted
    pub fn limit(&self) -> u64 {
        match self {
            PageCursor::First { limit } | PageCursor::After { limit, .. } => *limit,
            PageCursor::Exhausted => 0,
        }
    }

    pub fn is_exhausted(&self) -> bool {
        matches!(self, PageCursor::Exhausted)
    }

    /// Key tuple of the last row already covered
    pub fn last_keys(&self) -> Option<&[KeyValue]> {
        match self {
            PageCursor::After { keys, .. } => Some(keys),
            _ => None,
        }
    }
}

/// Order-independent digest of one page: four sums of 32-bit row hash
/// segments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct PageDigest([u64; 4]);

impl PageDigest {
    pub fn new(parts: DigestParts) -> Self {
        PageDigest(parts)
    }

    pub fn parts(&self) -> DigestParts {
        self.0
    }
}

impl fmt::Display for PageDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d] = self.0;
        write!(f, "{}{}{}{}", a, b, c, d)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_cursor_has_no_keys() {
        let cursor = PageCursor::first(20);
        assert_eq!(cursor.limit(), 20);
        assert!(cursor.last_keys().is_none());
        assert!(!cursor.is_exhausted());
    }

    #[test]
    fn test_exhausted_is_not_an_empty_first_page() {
        assert_ne!(PageCursor::Exhausted, PageCursor::first(0));
        assert_eq!(PageCursor::Exhausted.limit(), 0);
        assert!(PageCursor::Exhausted.is_exhausted());
    }

    #[test]
    fn test_after_cursor_exposes_keys() {
        let cursor = PageCursor::After {
            keys: vec![KeyValue::Int(9), KeyValue::Text("b".into())],
            limit: 7,
        };
        assert_eq!(cursor.limit(), 7);
        assert_eq!(cursor.last_keys().map(|k| k.len()), Some(2));
    }

    #[test]
    fn test_digest_display_concatenates_parts() {
        let digest = PageDigest::new([1, 23, 456, 7890]);
        assert_eq!(digest.to_string(), "1234567890");
        assert_eq!(digest.parts(), [1, 23, 456, 7890]);
    }
}
