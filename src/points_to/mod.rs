//! Flow- and context-sensitive points-to analysis resolving indirect calls.

mod analysis;
mod domains;
mod semantics;

pub use analysis::*;
pub use domains::*;
