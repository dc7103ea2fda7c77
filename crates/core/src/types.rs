//! Gemeinsame Identifikations- und Statustypen fuer Plauder
//!
//! Alle IDs verwenden das Newtype-Pattern um Verwechslungen zwischen
//! verschiedenen ID-Arten zur Compilezeit auszuschliessen. Die Status-
//! und Praeferenz-Enums sind wire-kompatibel (snake_case Strings).

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Eindeutige Benutzer-ID
///
/// Wird extern (vom REST/Registrierungs-Layer) vergeben; der Kern
/// behandelt sie als opaken Primaerschluessel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub Uuid);

impl UserId {
    /// Erstellt eine neue zufaellige UserId
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Gibt die innere UUID zurueck
    pub fn inner(&self) -> Uuid {
        self.0
    }
}

impl Default for UserId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "user:{}", self.0)
    }
}

/// Eindeutige Anruf-ID
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CallId(pub Uuid);

impl CallId {
    /// Erstellt eine neue zufaellige CallId
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Gibt die innere UUID zurueck
    pub fn inner(&self) -> Uuid {
        self.0
    }
}

impl Default for CallId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for CallId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "anruf:{}", self.0)
    }
}

/// Eindeutige Server-ID
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ServerId(pub Uuid);

impl ServerId {
    /// Erstellt eine neue zufaellige ServerId
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Gibt die innere UUID zurueck
    pub fn inner(&self) -> Uuid {
        self.0
    }
}

impl Default for ServerId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ServerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "server:{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Praesenz-Status
// ---------------------------------------------------------------------------

/// Erreichbarkeits-Status eines Benutzers
///
/// Uebergaenge pro Anruf monoton: online -> in_queue -> in_call -> online,
/// bzw. -> offline bei Verbindungsverlust aus jedem Zustand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PraesenzStatus {
    Online,
    InQueue,
    InCall,
    Offline,
}

impl PraesenzStatus {
    pub fn als_str(&self) -> &'static str {
        match self {
            Self::Online => "online",
            Self::InQueue => "in_queue",
            Self::InCall => "in_call",
            Self::Offline => "offline",
        }
    }
}

impl std::str::FromStr for PraesenzStatus {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "online" => Ok(Self::Online),
            "in_queue" => Ok(Self::InQueue),
            "in_call" => Ok(Self::InCall),
            "offline" => Ok(Self::Offline),
            other => Err(format!("Unbekannter Praesenz-Status: {other}")),
        }
    }
}

impl std::fmt::Display for PraesenzStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.als_str())
    }
}

// ---------------------------------------------------------------------------
// Anruf-Status
// ---------------------------------------------------------------------------

/// Lebenszyklus-Status eines Anrufs
///
/// Erlaubte Uebergaenge: pending -> active -> completed,
/// pending -> missed, pending -> rejected, active -> completed.
/// Terminale Zustaende werden nie wieder verlassen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnrufStatus {
    Pending,
    Active,
    Completed,
    Missed,
    Rejected,
}

impl AnrufStatus {
    pub fn als_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Active => "active",
            Self::Completed => "completed",
            Self::Missed => "missed",
            Self::Rejected => "rejected",
        }
    }

    /// Gibt true zurueck wenn der Status nicht mehr verlassen werden kann
    pub fn ist_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Missed | Self::Rejected)
    }
}

impl std::str::FromStr for AnrufStatus {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "active" => Ok(Self::Active),
            "completed" => Ok(Self::Completed),
            "missed" => Ok(Self::Missed),
            "rejected" => Ok(Self::Rejected),
            other => Err(format!("Unbekannter Anruf-Status: {other}")),
        }
    }
}

impl std::fmt::Display for AnrufStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.als_str())
    }
}

// ---------------------------------------------------------------------------
// Matching-Praeferenzen
// ---------------------------------------------------------------------------

/// Aktuelle Stimmung eines Benutzers in der Warteschlange
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stimmung {
    Happy,
    Sad,
    Excited,
    Bored,
    Lonely,
    Drunk,
}

impl Stimmung {
    pub fn als_str(&self) -> &'static str {
        match self {
            Self::Happy => "happy",
            Self::Sad => "sad",
            Self::Excited => "excited",
            Self::Bored => "bored",
            Self::Lonely => "lonely",
            Self::Drunk => "drunk",
        }
    }
}

impl std::str::FromStr for Stimmung {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "happy" => Ok(Self::Happy),
            "sad" => Ok(Self::Sad),
            "excited" => Ok(Self::Excited),
            "bored" => Ok(Self::Bored),
            "lonely" => Ok(Self::Lonely),
            "drunk" => Ok(Self::Drunk),
            other => Err(format!("Unbekannte Stimmung: {other}")),
        }
    }
}

/// Geschlechts-Praeferenz fuer das Matching
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GenderPraeferenz {
    Male,
    Female,
    #[default]
    Any,
}

impl GenderPraeferenz {
    pub fn als_str(&self) -> &'static str {
        match self {
            Self::Male => "male",
            Self::Female => "female",
            Self::Any => "any",
        }
    }
}

impl std::str::FromStr for GenderPraeferenz {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "male" => Ok(Self::Male),
            "female" => Ok(Self::Female),
            "any" => Ok(Self::Any),
            other => Err(format!("Unbekannte Gender-Praeferenz: {other}")),
        }
    }
}

/// Geschlecht eines Benutzers (oeffentlicher Profilteil)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Gender {
    Male,
    Female,
    Other,
}

impl Gender {
    pub fn als_str(&self) -> &'static str {
        match self {
            Self::Male => "male",
            Self::Female => "female",
            Self::Other => "other",
        }
    }
}

impl std::str::FromStr for Gender {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "male" => Ok(Self::Male),
            "female" => Ok(Self::Female),
            "other" => Ok(Self::Other),
            other => Err(format!("Unbekanntes Gender: {other}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn user_id_eindeutig() {
        let a = UserId::new();
        let b = UserId::new();
        assert_ne!(a, b, "Zwei neue UserIds muessen verschieden sein");
    }

    #[test]
    fn call_id_display() {
        let id = CallId(Uuid::nil());
        assert!(id.to_string().starts_with("anruf:"));
    }

    #[test]
    fn ids_sind_serde_transparent() {
        let uid = UserId::new();
        let json = serde_json::to_string(&uid).unwrap();
        // Transparente Serialisierung: nur der UUID-String, kein Objekt
        assert!(json.starts_with('"'));
        let uid2: UserId = serde_json::from_str(&json).unwrap();
        assert_eq!(uid, uid2);
    }

    #[test]
    fn praesenz_status_round_trip() {
        for status in [
            PraesenzStatus::Online,
            PraesenzStatus::InQueue,
            PraesenzStatus::InCall,
            PraesenzStatus::Offline,
        ] {
            let s = status.als_str();
            assert_eq!(PraesenzStatus::from_str(s).unwrap(), status);
        }
    }

    #[test]
    fn praesenz_status_wire_format() {
        let json = serde_json::to_string(&PraesenzStatus::InQueue).unwrap();
        assert_eq!(json, "\"in_queue\"");
    }

    #[test]
    fn stimmung_unbekannt_wird_abgelehnt() {
        assert!(Stimmung::from_str("wuetend").is_err());
    }

    #[test]
    fn anruf_status_terminal_erkennung() {
        assert!(!AnrufStatus::Pending.ist_terminal());
        assert!(!AnrufStatus::Active.ist_terminal());
        assert!(AnrufStatus::Completed.ist_terminal());
        assert!(AnrufStatus::Missed.ist_terminal());
        assert!(AnrufStatus::Rejected.ist_terminal());
    }

    #[test]
    fn anruf_status_round_trip() {
        for status in [
            AnrufStatus::Pending,
            AnrufStatus::Active,
            AnrufStatus::Completed,
            AnrufStatus::Missed,
            AnrufStatus::Rejected,
        ] {
            assert_eq!(AnrufStatus::from_str(status.als_str()).unwrap(), status);
        }
    }

    #[test]
    fn gender_praeferenz_standard_ist_any() {
        assert_eq!(GenderPraeferenz::default(), GenderPraeferenz::Any);
    }
}
