// src/datasource/mod.rs
// Concrete `Session`/`DataSource` adapters. `sqlite` is the one this
// crate ships, matching the teacher's `sqlx = { features = ["sqlite", ...] }`
// dependency; additional drivers would live alongside it behind the
// same two traits.

pub mod sqlite;

pub use sqlite::{SqliteDataSource, SqliteSession};
