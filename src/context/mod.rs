//! Context assembly
//!
//! Turns ranked candidates into the bounded grounding text handed to the
//! generator, plus the ordered list of sources that made it in.

pub mod builder;
pub mod counter;

pub use builder::{Context, ContextAssembler};
pub use counter::{SizeMeter, TokenCounter};
