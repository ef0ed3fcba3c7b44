//! Persistence layer: libSQL storage for the processed set, thread memory,
//! and the records actions create.

pub mod libsql_backend;
pub mod migrations;
pub mod traits;

pub use libsql_backend::LibSqlBackend;
pub use traits::{Database, Meeting, ProcessedRecord, ThreadMemory, Todo};
