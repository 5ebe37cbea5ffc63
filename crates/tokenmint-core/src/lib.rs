//! Core types and traits for the tokenmint code allocator.
//!
//! This crate provides the shared vocabulary used by the store
//! implementations and the allocator service: the validated [`CodeToken`]
//! newtype, the [`CodeFormat`] settings that render and parse tokens, and
//! the [`CodeStore`] persistence contract.

pub mod error;
pub mod format;
pub mod store;
pub mod token;

pub use error::{CoreError, StorageError};
pub use format::{CodeFormat, DateSegment};
pub use store::{CodeStore, ReadCodeStore};
pub use token::CodeToken;
