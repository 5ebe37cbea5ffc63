//! Collision-checked sequential code allocation.
//!
//! This crate provides the [`Allocator`] service: it derives the next
//! sequence number for a [`CodeFormat`](tokenmint_core::CodeFormat) by
//! re-reading the store's current maximum, verifies the candidate is
//! absent, and retries a bounded number of times before falling back to a
//! timestamp-derived [`Allocation::Degraded`] code.

pub mod allocator;
pub mod clock;
pub mod error;

pub use allocator::{Allocation, Allocator, DEFAULT_MAX_ATTEMPTS};
pub use clock::{Clock, SystemClock};
pub use error::AllocError;
