//! Process-wide tracing setup shared by the stockflow binaries and tests.

/// Tracing configuration (filters, formatters).
pub mod tracing;

pub use crate::tracing::{init, init_for_tests, init_with_default};
