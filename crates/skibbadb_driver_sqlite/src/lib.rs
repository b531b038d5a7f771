//! SQLite storage backend: a blocking [`SqliteDriver`] implementation of
//! `skibbadb_core::Driver`.

pub mod driver;
pub mod pragmas;
pub mod sqlite_error;

pub use driver::SqliteDriver;
pub use pragmas::SqliteConfig;
