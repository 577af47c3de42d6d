//! Engine configuration threaded through a [crate::Tree].

use crate::order::ByteOrder;

/// Default bound on chains of computed descriptors.
pub const DEFAULT_RESOLVE_DEPTH: usize = 32;

/// Settings that affect loading and serialization.
///
/// A `Config` is owned by the tree that uses it; nothing reads ambient state.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct Config {
    /// Byte order picked up by [crate::Builder::from_config].
    pub byte_order: ByteOrder,
    /// Fill byte for values shorter than their block size.
    pub padding: u8,
    /// Largest element count an array may request. Zero disables the check.
    pub max_count: usize,
    /// Reject arrays over `max_count` instead of warning.
    pub break_on_max_count: bool,
    /// Longest chain of computed descriptors followed before giving up.
    pub resolve_depth: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            byte_order: ByteOrder::BigEndian,
            padding: 0,
            max_count: 0,
            break_on_max_count: false,
            resolve_depth: DEFAULT_RESOLVE_DEPTH,
        }
    }
}

impl Config {
    /// Sets the default byte order.
    pub fn set_byte_order(&mut self, byte_order: ByteOrder) -> &mut Self {
        self.byte_order = byte_order;
        self
    }

    /// Sets the padding fill byte.
    pub fn set_padding(&mut self, padding: u8) -> &mut Self {
        self.padding = padding;
        self
    }

    /// Sets the array element ceiling and whether exceeding it is fatal.
    pub fn set_max_count(&mut self, max_count: usize, fatal: bool) -> &mut Self {
        self.max_count = max_count;
        self.break_on_max_count = fatal;
        self
    }

    /// Checks a requested element count against the ceiling.
    pub(crate) fn check_count(&self, what: &'static str, count: usize) -> crate::Result<()> {
        if self.max_count == 0 || count <= self.max_count {
            return Ok(());
        }

        if self.break_on_max_count {
            return Err(crate::Error::invalid(
                what,
                format!("count {} exceeds max_count {}", count, self.max_count),
            ));
        }

        tracing::warn!(
            count,
            max_count = self.max_count,
            "{}: requested count is larger than the configured max_count",
            what
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_count_ceiling() {
        let mut config = Config::default();
        assert!(config.check_count("array", 1 << 20).is_ok());

        config.set_max_count(8, false);
        assert!(config.check_count("array", 9).is_ok());

        config.set_max_count(8, true);
        assert!(config.check_count("array", 8).is_ok());
        assert!(matches!(
            config.check_count("array", 9),
            Err(crate::Error::InvalidArgument { .. })
        ));
    }
}
