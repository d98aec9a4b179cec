//! Fetch and batch-delete request model.
//!
//! # Responsibility
//! - Describe which objects to target: kind, filter, order and page.
//! - Evaluate requests against in-memory objects so every context shares
//!   one set of filter and ordering rules.
//!
//! # Invariants
//! - Sorting is stable; ties keep candidate (storage) order.
//! - Comparisons across JSON types never match.

pub mod predicate;
pub mod sort;
pub mod spec;
