//! Metric behavior flags.

use serde::{Deserialize, Serialize};

/// Bitfield of metric behaviors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MetricFlags(u32);

impl MetricFlags {
    pub const NONE: MetricFlags = MetricFlags(0);
    /// Only meaningful for streaming endpoints.
    pub const STREAMING_ONLY: MetricFlags = MetricFlags(1 << 0);
    /// Hidden from console output.
    pub const NO_CONSOLE: MetricFlags = MetricFlags(1 << 1);
    /// Accounts for reasoning tokens.
    pub const SUPPORTS_REASONING: MetricFlags = MetricFlags(1 << 2);
    /// Only requires client-side input tokenization.
    pub const TOKENIZES_INPUT_ONLY: MetricFlags = MetricFlags(1 << 3);
    /// Only requires server-produced token counts.
    pub const PRODUCES_TOKENS_ONLY: MetricFlags = MetricFlags(1 << 4);
    /// Not yet stable.
    pub const EXPERIMENTAL: MetricFlags = MetricFlags(1 << 5);

    pub fn contains(&self, other: MetricFlags) -> bool {
        self.0 & other.0 == other.0
    }
}

impl std::ops::BitOr for MetricFlags {
    type Output = MetricFlags;

    fn bitor(self, rhs: MetricFlags) -> MetricFlags {
        MetricFlags(self.0 | rhs.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flag_composition() {
        let flags = MetricFlags::STREAMING_ONLY | MetricFlags::NO_CONSOLE;
        assert!(flags.contains(MetricFlags::STREAMING_ONLY));
        assert!(flags.contains(MetricFlags::NO_CONSOLE));
        assert!(!flags.contains(MetricFlags::EXPERIMENTAL));
        assert!(MetricFlags::NONE.contains(MetricFlags::NONE));
    }
}
