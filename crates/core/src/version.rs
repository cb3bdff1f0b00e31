//! Optimistic concurrency control for event streams.

/// Concurrency expectation for an append to an event stream.
///
/// Stream versions are monotonic and gapless per `(stream_id, stream_type)`;
/// the store assigns `max(existing) + 1` atomically. `ExpectedVersion` lets a
/// writer state what it believes the current version is, and fail fast when a
/// concurrent writer got there first.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ExpectedVersion {
    /// Skip version checking (idempotent appends, cascades, migrations).
    Any,
    /// Require that the stream does not exist yet (creation events).
    NoStream,
    /// Require the stream to be at an exact version.
    Exact(u64),
}

impl ExpectedVersion {
    pub fn matches(self, actual: u64) -> bool {
        match self {
            ExpectedVersion::Any => true,
            ExpectedVersion::NoStream => actual == 0,
            ExpectedVersion::Exact(v) => v == actual,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn any_matches_everything() {
        assert!(ExpectedVersion::Any.matches(0));
        assert!(ExpectedVersion::Any.matches(42));
    }

    #[test]
    fn no_stream_only_matches_empty() {
        assert!(ExpectedVersion::NoStream.matches(0));
        assert!(!ExpectedVersion::NoStream.matches(1));
    }

    #[test]
    fn exact_requires_exact() {
        assert!(ExpectedVersion::Exact(3).matches(3));
        assert!(!ExpectedVersion::Exact(3).matches(4));
    }
}
