//! Accept-everything filter

use weir_bus::Filter;
use weir_message::Message;

/// Filter accepting every message
///
/// The explicit form of an empty filter chain; useful as a placeholder
/// in configs that toggle between filters.
#[derive(Debug, Default)]
pub struct AllFilter;

impl AllFilter {
    /// Create the filter
    pub fn new() -> Self {
        Self
    }
}

impl Filter for AllFilter {
    fn accepts(&self, _msg: &Message) -> bool {
        true
    }

    fn name(&self) -> &'static str {
        "filter.All"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use weir_message::{MessagePool, StreamId};

    #[test]
    fn test_accepts_everything() {
        let pool = Arc::new(MessagePool::new());
        let filter = AllFilter::new();

        let msg = Message::new(&pool, b"anything", StreamId::new(2), 0);
        assert!(filter.accepts(&msg));

        let empty = Message::new(&pool, b"", StreamId::new(2), 1);
        assert!(filter.accepts(&empty));
    }
}
