//! Store implementations for the tokenmint code allocator.
//!
//! Two backends implement the `CodeStore` contract: an in-memory store for
//! tests and single-process use, and a MySQL store whose primary key on the
//! code column provides the write-time uniqueness guarantee.

pub mod memory;
pub mod mysql;

pub use memory::InMemoryStore;
pub use mysql::MySqlStore;
