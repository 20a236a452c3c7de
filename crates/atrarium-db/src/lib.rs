//! Database layer for the Atrarium platform.
//!
//! Provides SQLite connection pooling (via `r2d2`), WAL-mode
//! initialization, embedded SQL migrations, and nothing else. Every table
//! behind the group actors is created through versioned migrations managed
//! by this crate.
//!
//! # Design decisions
//!
//! - **SQLite with WAL mode**: the per-group state is an ordered key-value
//!   problem (feed reads are range scans over `(group_id, created_at)`);
//!   SQLite B-tree indexes give exactly that without an external database
//!   process. WAL allows concurrent readers with a single writer, which
//!   matches the one-writer-per-group access pattern.
//! - **`r2d2` connection pool**: bounded connection reuse without manual
//!   lifetime management.
//! - **Embedded migrations**: SQL files are compiled into the binary via
//!   `include_str!`, so migrations ship with the server and cannot drift
//!   from the code that depends on them.

mod migrations;
mod pool;

pub use migrations::run_migrations;
pub use pool::{create_pool, DbConnection, DbPool, DbSettings};
