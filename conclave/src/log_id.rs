use std::fmt;

/// The identity of a point in the replicated log.
///
/// A leadership term and an append position within it. The derived ordering
/// compares terms first and positions second, which is the total order used
/// to decide vote grants and catch-up direction: a log `a` is at least as
/// up-to-date as log `b` iff `a >= b`.
#[derive(Debug, Default, Copy, Clone, PartialOrd, Ord, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct LogId {
    pub term_id: u64,
    pub position: u64,
}

impl LogId {
    pub fn new(term_id: u64, position: u64) -> Self {
        Self { term_id, position }
    }
}

impl fmt::Display for LogId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.term_id, self.position)
    }
}

#[cfg(test)]
mod tests {
    use super::LogId;

    #[test]
    fn test_log_id_order_compares_term_before_position() {
        assert!(LogId::new(2, 0) > LogId::new(1, 100));
        assert!(LogId::new(1, 100) > LogId::new(1, 99));
        assert!(LogId::new(1, 100) >= LogId::new(1, 100));
        assert!(LogId::new(0, 200) < LogId::new(1, 0));
    }
}
