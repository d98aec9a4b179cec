//! Typed CRUD and query façade over a persistence context.
//!
//! # Responsibility
//! - Scope create/lookup/fetch/delete operations to one entity kind.
//! - Finish every mutating call with a save.
//!
//! # Invariants
//! - No error crosses this boundary: failures surface as `false` or `None`
//!   and are logged with their cause.

pub mod typed_store;
