//! SQLite-Implementierung der Repository-Traits

mod anrufe;
mod benutzer;
mod pool;
mod praesenz;

pub use pool::SqliteDb;

use chrono::{DateTime, SecondsFormat, Utc};

use crate::error::{DbError, DbResult};

/// Serialisiert einen Zeitstempel als RFC 3339 mit fester Mikrosekunden-
/// Praezision. Feste Breite haelt die lexikografische Sortierung in SQLite
/// identisch zur chronologischen (wichtig fuer die Queue-Position).
pub(crate) fn zeit_als_text(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, false)
}

/// Parst einen RFC-3339-Zeitstempel aus der Datenbank
pub(crate) fn zeit_aus_text(s: &str) -> DbResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| DbError::intern(format!("Ungueltiger Zeitstempel '{s}': {e}")))
}

/// Parst eine optionale Zeitstempel-Spalte
pub(crate) fn zeit_aus_text_opt(s: Option<&str>) -> DbResult<Option<DateTime<Utc>>> {
    s.map(zeit_aus_text).transpose()
}
