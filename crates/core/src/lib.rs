//! plauder-core – Gemeinsame Typen und Fehlertypen
//!
//! Dieses Crate stellt die fundamentalen Bausteine bereit, die von allen
//! anderen Plauder-Crates gemeinsam genutzt werden.

pub mod error;
pub mod types;

// Re-Exporte fuer bequemen Zugriff
pub use error::{PlauderError, Result};
pub use types::{
    AnrufStatus, CallId, Gender, GenderPraeferenz, PraesenzStatus, ServerId, Stimmung, UserId,
};
