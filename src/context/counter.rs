//! Context size measurement
//!
//! Budgets are expressed either in characters or in estimated tokens.
//!
//! # Algorithm
//!
//! Token estimate: 1 token ≈ 4 characters, rounded up
//!
//! ```text
//! estimate_tokens(text) = ⌈chars(text) / 4⌉
//! ```
//!
//! Both measures are monotone in text length, so growing a prefix can only
//! grow its measured size.

use crate::config::BudgetUnit;

/// Token counter with heuristic-based estimation
#[derive(Debug, Clone, Copy, Default)]
pub struct TokenCounter;

impl TokenCounter {
    pub fn new() -> Self {
        Self
    }

    /// Estimate token count for text
    pub fn estimate(&self, text: &str) -> usize {
        let char_count = text.chars().count();
        (char_count + 3) / 4
    }
}

/// Measures text in the configured budget unit
#[derive(Debug, Clone, Copy)]
pub struct SizeMeter {
    unit: BudgetUnit,
    counter: TokenCounter,
}

impl SizeMeter {
    pub fn new(unit: BudgetUnit) -> Self {
        Self {
            unit,
            counter: TokenCounter::new(),
        }
    }

    pub fn unit(&self) -> BudgetUnit {
        self.unit
    }

    /// Size of `text` in this meter's unit
    pub fn measure(&self, text: &str) -> usize {
        match self.unit {
            BudgetUnit::Characters => text.chars().count(),
            BudgetUnit::Tokens => self.counter.estimate(text),
        }
    }
}
