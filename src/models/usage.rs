use serde::{Deserialize, Serialize};

/// Token counts reported by a backend. Adds up across attempts and sub-calls.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TokenUsage {
    pub input: u64,
    pub cached_input: u64,
    pub output: u64,
}

impl TokenUsage {
    pub const fn zero() -> Self {
        Self {
            input: 0,
            cached_input: 0,
            output: 0,
        }
    }

    #[must_use]
    pub fn adding(self, other: TokenUsage) -> Self {
        Self {
            input: self.input.saturating_add(other.input),
            cached_input: self.cached_input.saturating_add(other.cached_input),
            output: self.output.saturating_add(other.output),
        }
    }

    /// Fold in an optional report; backends without usage contribute nothing.
    #[must_use]
    pub fn adding_opt(self, other: Option<TokenUsage>) -> Self {
        other.map_or(self, |usage| self.adding(usage))
    }

    pub fn total(&self) -> u64 {
        self.input.saturating_add(self.output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_is_identity() {
        let usage = TokenUsage {
            input: 10,
            cached_input: 2,
            output: 5,
        };
        assert_eq!(usage.adding(TokenUsage::zero()), usage);
        assert_eq!(TokenUsage::zero().adding(usage), usage);
    }

    #[test]
    fn accumulates_without_decreasing() {
        let mut total = TokenUsage::zero();
        for step in [
            Some(TokenUsage { input: 3, cached_input: 0, output: 1 }),
            None,
            Some(TokenUsage { input: u64::MAX, cached_input: 1, output: 0 }),
        ] {
            let next = total.adding_opt(step);
            assert!(next.input >= total.input);
            assert!(next.cached_input >= total.cached_input);
            assert!(next.output >= total.output);
            total = next;
        }
        assert_eq!(total.input, u64::MAX);
        assert_eq!(total.output, 1);
    }
}
