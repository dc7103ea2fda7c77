//! plauder-auth – Token-Validierung fuer den Signaling-Server
//!
//! Token-Ausstellung gehoert dem (ausgeklammerten) REST-Layer; dieses
//! Crate haelt den In-Memory-Token-Store mit TTL und den AuthService,
//! den das Admission Gate des Signaling-Servers konsumiert.

pub mod error;
pub mod service;
pub mod token;

pub use error::{AuthError, AuthResult};
pub use service::AuthService;
pub use token::{TokenStore, ZugangsToken};
