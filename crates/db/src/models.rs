//! Datenbankmodelle fuer Plauder
//!
//! Diese Typen repraesentieren Datensaetze aus der Datenbank.
//! Sie sind von den Domain-Typen getrennt und dienen als reine
//! Datenuebertragungsobjekte.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use plauder_core::types::{
    AnrufStatus, CallId, Gender, GenderPraeferenz, PraesenzStatus, Stimmung, UserId,
};

// ---------------------------------------------------------------------------
// Benutzer
// ---------------------------------------------------------------------------

/// Benutzer-Datensatz aus der Datenbank
///
/// Benutzerkonten werden vom (hier ausgeklammerten) REST-Layer angelegt;
/// der Signaling-Kern liest sie nur, um Anruf-Benachrichtigungen mit
/// Username und Gender anzureichern.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BenutzerRecord {
    pub id: UserId,
    pub username: String,
    pub gender: Option<Gender>,
    pub created_at: DateTime<Utc>,
    pub is_active: bool,
}

/// Daten zum Erstellen eines neuen Benutzers
#[derive(Debug, Clone)]
pub struct NeuerBenutzer<'a> {
    pub username: &'a str,
    pub gender: Option<Gender>,
}

// ---------------------------------------------------------------------------
// Praesenz
// ---------------------------------------------------------------------------

/// Praesenz-Datensatz (durable Abbild des Verbindungszustands)
///
/// Invariante: `queue_joined_at` ist genau dann gesetzt wenn
/// `status == InQueue`. Der Upsert in `PraesenzRepository::status_setzen`
/// erzwingt das.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PraesenzRecord {
    pub user_id: UserId,
    pub status: PraesenzStatus,
    pub queue_joined_at: Option<DateTime<Utc>>,
    pub stimmung: Option<Stimmung>,
    pub gender_praeferenz: GenderPraeferenz,
    pub last_activity: DateTime<Utc>,
}

/// Warteschlangen-Metadaten beim Wechsel auf `in_queue`
#[derive(Debug, Clone, Copy)]
pub struct QueueEintrag {
    pub stimmung: Stimmung,
    pub gender_praeferenz: GenderPraeferenz,
}

// ---------------------------------------------------------------------------
// Anrufe
// ---------------------------------------------------------------------------

/// Anruf-Datensatz aus der Datenbank
///
/// Durable Spiegelung einer Call-Session: wird bei `initiate` angelegt
/// und bei jedem Status-Wechsel aktualisiert. Nach Erreichen eines
/// terminalen Status aendern sich nur noch die Bewertungsfelder.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnrufRecord {
    pub id: CallId,
    pub caller_id: UserId,
    pub receiver_id: UserId,
    pub status: AnrufStatus,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub duration_secs: i64,
    pub caller_rating: Option<i64>,
    pub receiver_rating: Option<i64>,
    pub created_at: DateTime<Utc>,
}

/// Daten zum Erstellen eines neuen Anruf-Datensatzes
#[derive(Debug, Clone)]
pub struct NeuerAnruf {
    pub id: CallId,
    pub caller_id: UserId,
    pub receiver_id: UserId,
    pub start_time: DateTime<Utc>,
}

/// Daten zum Aktualisieren eines Anruf-Datensatzes
#[derive(Debug, Clone, Default)]
pub struct AnrufUpdate {
    pub status: Option<AnrufStatus>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub duration_secs: Option<i64>,
    pub caller_rating: Option<i64>,
    pub receiver_rating: Option<i64>,
}
