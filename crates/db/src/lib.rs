//! plauder-db – Datenbank-Abstraktion
//!
//! Dieses Crate stellt das Repository-Pattern bereit, das die konkrete
//! Datenbank (SQLite via sqlx) hinter einheitlichen Traits verbirgt.
//! Der Signaling-Kern ist generisch ueber diese Traits und kann in Tests
//! gegen eine In-Memory-Datenbank laufen.

pub mod error;
pub mod models;
pub mod repository;
pub mod sqlite;

pub use error::{DbError, DbResult};
pub use repository::{
    AnrufRepository, BenutzerRepository, DatabaseConfig, PraesenzRepository,
};
pub use sqlite::SqliteDb;
