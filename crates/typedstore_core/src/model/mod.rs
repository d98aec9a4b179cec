//! Object model shared by contexts and typed stores.
//!
//! # Responsibility
//! - Define identity-bearing managed objects and their typed views.
//! - Define the entity registry a context validates kinds against.
//!
//! # Invariants
//! - Every managed object is identified by a stable `EntityId`.
//! - A managed object is owned by at most one context at a time.

pub mod object;
pub mod schema;
