//! Repository-Trait-Definitionen
//!
//! Das Repository-Pattern entkoppelt den Signaling-Kern von der konkreten
//! Datenbank-Implementierung. Die SQLite-Implementierung liegt in
//! `crate::sqlite`; Tests koennen eine In-Memory-Datenbank verwenden.

use plauder_core::types::{CallId, PraesenzStatus, UserId};

use crate::error::DbResult;
use crate::models::{
    AnrufRecord, AnrufUpdate, BenutzerRecord, NeuerAnruf, NeuerBenutzer, PraesenzRecord,
    QueueEintrag,
};

/// Konfiguration fuer die Datenbankverbindung
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    /// Verbindungs-URL (z.B. "sqlite://plauder.db")
    pub url: String,
    /// Maximale Anzahl gleichzeitiger Verbindungen im Pool
    pub max_verbindungen: u32,
    /// Ob WAL-Modus bei SQLite aktiviert werden soll
    pub sqlite_wal: bool,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://plauder.db".into(),
            max_verbindungen: 5,
            sqlite_wal: true,
        }
    }
}

/// Repository fuer Benutzer-Datenzugriffe
///
/// Der Kern liest Benutzer nur; das Anlegen gehoert dem REST-Layer
/// und existiert hier fuer Tests und Seeding.
#[allow(async_fn_in_trait)]
pub trait BenutzerRepository: Send + Sync {
    /// Einen neuen Benutzer anlegen
    async fn benutzer_erstellen(&self, data: NeuerBenutzer<'_>) -> DbResult<BenutzerRecord>;

    /// Einen Benutzer anhand seiner ID laden
    async fn benutzer_laden(&self, id: UserId) -> DbResult<Option<BenutzerRecord>>;

    /// Einen Benutzer anhand seines Namens laden
    async fn benutzer_laden_nach_name(&self, username: &str) -> DbResult<Option<BenutzerRecord>>;
}

/// Repository fuer Praesenz-Datenzugriffe (Warteschlangen-Store)
///
/// Alle Mutationen sind per-User atomar (ein einzelnes Upsert-Statement).
/// Positions-Abfragen sind Read-only-Snapshots und duerfen gegenueber
/// parallelen Joins leicht veraltet sein (Position ist rein informativ).
#[allow(async_fn_in_trait)]
pub trait PraesenzRepository: Send + Sync {
    /// Upsert des Praesenz-Status
    ///
    /// Wechsel auf `InQueue` verlangt `extra` und stempelt `queue_joined_at`;
    /// jeder andere Status loescht den Stempel. `last_activity` wird immer
    /// aktualisiert.
    async fn status_setzen(
        &self,
        user_id: UserId,
        status: PraesenzStatus,
        extra: Option<QueueEintrag>,
    ) -> DbResult<PraesenzRecord>;

    /// Laedt den Praesenz-Datensatz (None ≙ offline)
    async fn praesenz_laden(&self, user_id: UserId) -> DbResult<Option<PraesenzRecord>>;

    /// 1-basierte Warteschlangen-Position, None wenn nicht in der Queue
    async fn queue_position(&self, user_id: UserId) -> DbResult<Option<i64>>;

    /// Anzahl der Datensaetze mit dem gegebenen Status
    async fn anzahl_mit_status(&self, status: PraesenzStatus) -> DbResult<i64>;

    /// Alle wartenden Benutzer, nach Beitrittszeit aufsteigend sortiert
    async fn alle_in_queue(&self) -> DbResult<Vec<PraesenzRecord>>;

    /// Setzt alle nicht-offline Datensaetze auf offline (Start-Sweep)
    ///
    /// Wird beim Serverstart ausgefuehrt, damit nach einem Neustart der
    /// Registry keine Geister-Eintraege (`in_call` ohne Verbindung) bleiben.
    async fn alle_offline_setzen(&self) -> DbResult<u64>;
}

/// Repository fuer Anruf-Datenzugriffe
#[allow(async_fn_in_trait)]
pub trait AnrufRepository: Send + Sync {
    /// Persistiert einen neuen Anruf (Status pending)
    async fn anruf_erstellen(&self, data: NeuerAnruf) -> DbResult<AnrufRecord>;

    /// Aktualisiert Felder eines bestehenden Anrufs
    async fn anruf_aktualisieren(&self, id: CallId, update: AnrufUpdate) -> DbResult<AnrufRecord>;

    /// Laedt einen Anruf anhand seiner ID
    async fn anruf_laden(&self, id: CallId) -> DbResult<Option<AnrufRecord>>;
}
