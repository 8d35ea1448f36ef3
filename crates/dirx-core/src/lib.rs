//! # dirx-core
//!
//! Record model, wire messages, and transport traits for dirx.
//!
//! This crate provides the types shared by every dirx crate:
//! - `Object` and `Relation` records plus the `Record` marshalling trait
//! - Record categories and their on-disk names
//! - Export envelopes, export option masks, and directory statistics
//! - Import operations, counters, and statuses (both response shapes)
//! - Pagination cursors and the paged read messages
//! - The `DirectoryClient` transport seam and its error type
//! - An in-memory directory implementing the seam over channels, behind the
//!   `test-support` feature

pub mod category;
pub mod client;
pub mod errors;
pub mod export;
pub mod import;
#[cfg(any(test, feature = "test-support"))]
pub mod memory;
pub mod pagination;
pub mod records;

pub use category::Category;
pub use errors::TransportError;
pub use records::{Object, Record, Relation};
