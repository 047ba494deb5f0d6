//! Budgeted context builder
//!
//! Each candidate becomes a labelled block (`[Document i]` followed by its
//! content) and blocks are joined with a blank line, in ranked order. When
//! everything does not fit, candidates are dropped from the lowest-ranked end
//! until the measured text fits the budget; what remains is always a prefix
//! of the ranked input.

use serde::Serialize;

use crate::config::{BudgetUnit, ContextConfig};
use crate::context::counter::SizeMeter;
use crate::types::RankedCandidate;

const BLOCK_SEPARATOR: &str = "\n\n";

/// Grounding text handed to the generator
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Context {
    pub text: String,
    /// Measured size of `text` in `unit`
    pub size: usize,
    pub unit: BudgetUnit,
}

impl Context {
    pub fn empty(unit: BudgetUnit) -> Self {
        Self {
            text: String::new(),
            size: 0,
            unit,
        }
    }

    /// No grounding available
    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }
}

/// Assembles candidates into a context under a size budget
#[derive(Debug, Clone)]
pub struct ContextAssembler {
    budget: usize,
    meter: SizeMeter,
}

impl ContextAssembler {
    pub fn new(config: &ContextConfig) -> Self {
        Self {
            budget: config.budget,
            meter: SizeMeter::new(config.unit),
        }
    }

    /// Build with the configured budget
    pub fn build(&self, ranked: &[RankedCandidate]) -> (Context, Vec<RankedCandidate>) {
        self.build_context(ranked, self.budget)
    }

    /// Build the largest ranked prefix whose text fits `budget`
    pub fn build_context(
        &self,
        ranked: &[RankedCandidate],
        budget: usize,
    ) -> (Context, Vec<RankedCandidate>) {
        let mut text = String::new();
        let mut size = 0;
        let mut sources = Vec::new();

        for (position, candidate) in ranked.iter().enumerate() {
            let mut extended = text.clone();
            if !extended.is_empty() {
                extended.push_str(BLOCK_SEPARATOR);
            }
            extended.push_str(&format_block(position + 1, candidate));

            let extended_size = self.meter.measure(&extended);
            if extended_size > budget {
                tracing::debug!(
                    kept = sources.len(),
                    dropped = ranked.len() - sources.len(),
                    budget,
                    "context budget reached"
                );
                break;
            }

            text = extended;
            size = extended_size;
            sources.push(candidate.clone());
        }

        let context = Context {
            text,
            size,
            unit: self.meter.unit(),
        };
        (context, sources)
    }
}

fn format_block(index: usize, candidate: &RankedCandidate) -> String {
    format!("[Document {}]\n{}", index, candidate.content())
}
