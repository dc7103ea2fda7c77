//! Fehlertypen fuer den Signaling-Service
//!
//! Jede Variante traegt genug Kontext fuer eine benutzerlesbare
//! Fehlermeldung; `error_code()` liefert den zugehoerigen Wire-Code.
//! Kein Fehler bringt den Verbindungs-Task zum Absturz – alles wird
//! als Error-Event an den Client zurueckgemeldet.

use plauder_auth::AuthError;
use plauder_db::DbError;
use plauder_protocol::control::ErrorCode;
use thiserror::Error;

/// Fehlertyp fuer den Signaling-Service
#[derive(Debug, Error)]
pub enum SignalingError {
    /// IO-Fehler (TCP, Socket)
    #[error("IO-Fehler: {0}")]
    Io(#[from] std::io::Error),

    /// Authentifizierungsfehler
    #[error("Authentifizierungsfehler: {0}")]
    Auth(#[from] AuthError),

    /// Datenbankfehler
    #[error("Datenbankfehler: {0}")]
    Db(#[from] DbError),

    /// Zielbenutzer ist nicht verbunden
    #[error("Benutzer nicht erreichbar: {0}")]
    PeerUnreachable(String),

    /// Die Gegenseite hat die Verbindung verloren
    #[error("Gegenseite nicht mehr verbunden")]
    PeerGone,

    /// Benutzer hat bereits eine laufende oder ausstehende Sitzung
    #[error("Bereits in einem Anruf: {0}")]
    AlreadyInCall(String),

    /// Benutzer ist bereits in der Warteschlange
    #[error("Bereits in der Warteschlange")]
    AlreadyInQueue,

    /// Selbstanruf oder sonst ungueltiges Ziel
    #[error("Ungueltiges Anrufziel")]
    InvalidTarget,

    /// Aktion ist fuer diesen Akteur nicht erlaubt
    #[error("Nicht berechtigt fuer diese Aktion")]
    NotAuthorized,

    /// Akteur war kein Teilnehmer des Anrufs
    #[error("Kein Teilnehmer dieses Anrufs")]
    NotParticipant,

    /// Operation passt nicht zum aktuellen Sitzungs-Status
    #[error("Ungueltiger Zustandswechsel: {0}")]
    StateConflict(String),

    /// Sitzung existiert nicht oder ist nicht aktiv
    #[error("Sitzung existiert nicht oder ist nicht aktiv")]
    InvalidSession,

    /// Bewertung ausserhalb von 1..=5
    #[error("Bewertung muss zwischen 1 und 5 liegen")]
    InvalidRating,

    /// Ressource nicht gefunden
    #[error("Nicht gefunden: {0}")]
    NichtGefunden(String),

    /// Interner Fehler
    #[error("Interner Fehler: {0}")]
    Intern(String),
}

impl SignalingError {
    /// Erstellt einen internen Fehler
    pub fn intern(msg: impl Into<String>) -> Self {
        Self::Intern(msg.into())
    }

    /// Gibt den Wire-Fehlercode fuer diesen Fehler zurueck
    pub fn error_code(&self) -> ErrorCode {
        match self {
            Self::Auth(AuthError::TokenAbgelaufen) => ErrorCode::SessionExpired,
            Self::Auth(_) => ErrorCode::AuthFailed,
            Self::PeerUnreachable(_) => ErrorCode::PeerUnreachable,
            Self::PeerGone => ErrorCode::PeerGone,
            Self::AlreadyInCall(_) => ErrorCode::AlreadyInCall,
            Self::AlreadyInQueue => ErrorCode::AlreadyInQueue,
            Self::InvalidTarget => ErrorCode::InvalidTarget,
            Self::NotAuthorized => ErrorCode::NotAuthorized,
            Self::NotParticipant => ErrorCode::NotParticipant,
            Self::StateConflict(_) => ErrorCode::StateConflict,
            Self::InvalidSession => ErrorCode::InvalidSession,
            Self::InvalidRating => ErrorCode::InvalidRating,
            Self::NichtGefunden(_) => ErrorCode::NotFound,
            Self::Io(_) | Self::Db(_) | Self::Intern(_) => ErrorCode::InternalError,
        }
    }
}

/// Result-Typ fuer den Signaling-Service
pub type SignalingResult<T> = Result<T, SignalingError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_codes_stimmen() {
        assert_eq!(
            SignalingError::InvalidRating.error_code(),
            ErrorCode::InvalidRating
        );
        assert_eq!(
            SignalingError::PeerUnreachable("x".into()).error_code(),
            ErrorCode::PeerUnreachable
        );
        assert_eq!(
            SignalingError::Auth(AuthError::TokenAbgelaufen).error_code(),
            ErrorCode::SessionExpired
        );
        assert_eq!(
            SignalingError::intern("x").error_code(),
            ErrorCode::InternalError
        );
    }
}
