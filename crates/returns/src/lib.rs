//! Return workflow.
//!
//! Returned goods are either put back on the shelf or recorded against a
//! non-stock disposition (supplier return, disposal, repair, inspection).

pub mod return_order;

pub use return_order::{
    ItemCondition, NewReturn, ProcessStep, Return, ReturnAction, ReturnItem, ReturnSourceType,
    ReturnStatus,
};
