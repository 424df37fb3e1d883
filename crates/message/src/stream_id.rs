//! Stream identifier type
//!
//! `StreamId` is the numeric handle a stream name resolves to in the
//! bus interning table. It is `Copy` and indexes directly into the
//! frozen stream array, so the routing hot path never touches strings.

use std::fmt;

/// Numeric handle for a named stream
///
/// Ids are assigned sequentially by the interning table. Two ids are
/// reserved at construction time: the wildcard stream `"*"` and the
/// terminal dropped-messages stream `"_DROPPED_"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StreamId(u32);

impl StreamId {
    /// The wildcard stream `"*"`; subscribers see a copy of all traffic
    pub const WILDCARD: StreamId = StreamId(0);

    /// The reserved `"_DROPPED_"` stream; messages routed here are
    /// terminal and never fall back further
    pub const DROPPED: StreamId = StreamId(1);

    /// Create a stream id from its numeric index
    #[inline]
    #[must_use]
    pub const fn new(index: u32) -> Self {
        Self(index)
    }

    /// Get the numeric index of this stream
    #[inline]
    #[must_use]
    pub const fn index(self) -> u32 {
        self.0
    }

    /// Get the index as usize (for array indexing)
    #[inline]
    #[must_use]
    pub const fn as_usize(self) -> usize {
        self.0 as usize
    }

    /// Whether this is one of the two reserved streams
    #[inline]
    #[must_use]
    pub const fn is_reserved(self) -> bool {
        self.0 <= Self::DROPPED.0
    }
}

impl fmt::Display for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "stream:{}", self.0)
    }
}

impl From<u32> for StreamId {
    #[inline]
    fn from(index: u32) -> Self {
        Self::new(index)
    }
}

impl From<StreamId> for usize {
    #[inline]
    fn from(id: StreamId) -> Self {
        id.as_usize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reserved_ids() {
        assert_eq!(StreamId::WILDCARD.index(), 0);
        assert_eq!(StreamId::DROPPED.index(), 1);
        assert!(StreamId::WILDCARD.is_reserved());
        assert!(StreamId::DROPPED.is_reserved());
        assert!(!StreamId::new(2).is_reserved());
    }

    #[test]
    fn test_copy_and_equality() {
        let id = StreamId::new(7);
        let copy = id;
        assert_eq!(id, copy);
        assert_ne!(id, StreamId::new(8));
    }

    #[test]
    fn test_display() {
        assert_eq!(StreamId::new(3).to_string(), "stream:3");
    }

    #[test]
    fn test_array_indexing() {
        let names = ["*", "_DROPPED_", "ingest"];
        assert_eq!(names[StreamId::new(2).as_usize()], "ingest");
    }
}
