//! Fehlertypen fuer das Auth-Crate

use thiserror::Error;

/// Auth-Fehlertypen
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Token ungueltig")]
    TokenUngueltig,

    #[error("Token abgelaufen")]
    TokenAbgelaufen,

    #[error("Benutzer nicht gefunden")]
    BenutzerNichtGefunden,

    #[error("Benutzer deaktiviert")]
    BenutzerInaktiv,

    #[error("Datenbankfehler: {0}")]
    Datenbank(#[from] plauder_db::DbError),
}

/// Result-Alias fuer Auth-Operationen
pub type AuthResult<T> = Result<T, AuthError>;
