//! Connection-Registry – Wer ist gerade erreichbar?
//!
//! Bildet eine authentifizierte Identitaet auf ihre lebende Send-Queue ab.
//! Einzige Wahrheitsquelle fuer "wer ist jetzt erreichbar"; alle
//! Dauerhaftigkeit liegt im Praesenz-Store.
//!
//! ## Eviction
//! Pro UserId existiert hoechstens ein Eintrag. Ein neuer Login ersetzt
//! den alten Handle; `registrieren` gibt den verdraengten Sender zurueck,
//! damit der Aufrufer ihn sauber schliessen kann. Jede Registrierung
//! traegt eine Generations-Nummer: ein verdraengter Verbindungs-Task kann
//! beim Aufraeumen nie den Eintrag seines Nachfolgers entfernen.

use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

use plauder_core::types::{Gender, UserId};
use plauder_protocol::control::ControlMessage;

/// Groesse der Send-Queue pro Client
const SEND_QUEUE_GROESSE: usize = 64;

// ---------------------------------------------------------------------------
// ClientIdentitaet & ClientSender
// ---------------------------------------------------------------------------

/// Oeffentliche Identitaet eines verbundenen Clients
///
/// Wird beim Login aus der Datenbank geladen und hier gecacht, damit
/// Anruf-Benachrichtigungen den Hot Path nicht mit DB-Zugriffen belasten.
#[derive(Debug, Clone)]
pub struct ClientIdentitaet {
    pub user_id: UserId,
    pub username: String,
    pub gender: Option<Gender>,
}

/// Handle auf die Send-Queue eines verbundenen Clients
#[derive(Debug)]
pub struct ClientSender {
    pub identitaet: ClientIdentitaet,
    pub generation: u64,
    tx: mpsc::Sender<ControlMessage>,
}

impl ClientSender {
    /// Sendet eine Nachricht nicht-blockierend an den Client
    ///
    /// Gibt `false` zurueck wenn die Queue voll oder geschlossen ist.
    pub fn senden(&self, nachricht: ControlMessage) -> bool {
        match self.tx.try_send(nachricht) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                tracing::warn!(
                    user_id = %self.identitaet.user_id,
                    "Send-Queue voll – Nachricht verworfen"
                );
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                tracing::debug!(
                    user_id = %self.identitaet.user_id,
                    "Send-Queue geschlossen (Client getrennt)"
                );
                false
            }
        }
    }
}

// ---------------------------------------------------------------------------
// ConnectionRegistry
// ---------------------------------------------------------------------------

/// Registry aller lebenden Transport-Handles
///
/// Thread-safe via Arc + DashMap. Clone teilt den inneren Zustand.
#[derive(Clone)]
pub struct ConnectionRegistry {
    inner: Arc<ConnectionRegistryInner>,
}

struct ConnectionRegistryInner {
    /// Client-Sender, indiziert nach UserId (hoechstens ein Eintrag pro User)
    clients: DashMap<UserId, ClientSender>,
    /// Monoton steigende Generations-Nummer fuer Eviction-Schutz
    generation: AtomicU64,
}

impl ConnectionRegistry {
    /// Erstellt eine neue leere Registry
    pub fn neu() -> Self {
        Self {
            inner: Arc::new(ConnectionRegistryInner {
                clients: DashMap::new(),
                generation: AtomicU64::new(1),
            }),
        }
    }

    /// Registriert einen Client und gibt seine Empfangs-Queue zurueck
    ///
    /// Ersetzt einen bestehenden Eintrag desselben Users; der verdraengte
    /// Sender wird zurueckgegeben, damit der Aufrufer eine Abschieds-
    /// Nachricht senden und ihn dann fallen lassen kann (das Schliessen
    /// der Queue beendet den alten Verbindungs-Task).
    pub fn registrieren(
        &self,
        identitaet: ClientIdentitaet,
    ) -> (u64, mpsc::Receiver<ControlMessage>, Option<ClientSender>) {
        let generation = self.inner.generation.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::channel(SEND_QUEUE_GROESSE);
        let user_id = identitaet.user_id;

        let sender = ClientSender {
            identitaet,
            generation,
            tx,
        };
        let verdraengt = self.inner.clients.insert(user_id, sender);

        tracing::debug!(
            user_id = %user_id,
            generation,
            verdraengt = verdraengt.is_some(),
            "Client in Registry registriert"
        );
        (generation, rx, verdraengt)
    }

    /// Entfernt einen Eintrag, aber nur wenn die Generation uebereinstimmt
    ///
    /// Gibt `true` zurueck wenn der Eintrag entfernt wurde. Ein verdraengter
    /// Task raeumt mit seiner alten Generation auf und trifft hier ins Leere.
    pub fn abmelden(&self, user_id: &UserId, generation: u64) -> bool {
        let entfernt = self
            .inner
            .clients
            .remove_if(user_id, |_, sender| sender.generation == generation)
            .is_some();
        if entfernt {
            tracing::debug!(user_id = %user_id, generation, "Client aus Registry entfernt");
        }
        entfernt
    }

    /// Prueft ob die gegebene Generation noch die registrierte ist
    pub fn ist_aktuelle_generation(&self, user_id: &UserId, generation: u64) -> bool {
        self.inner
            .clients
            .get(user_id)
            .map(|s| s.generation == generation)
            .unwrap_or(false)
    }

    /// Sendet eine Nachricht an einen einzelnen Client
    ///
    /// Gibt `false` zurueck wenn der Client nicht verbunden ist – das ist
    /// "Empfaenger nicht erreichbar", kein Fehler.
    pub fn senden(&self, user_id: &UserId, nachricht: ControlMessage) -> bool {
        match self.inner.clients.get(user_id) {
            Some(sender) => sender.senden(nachricht),
            None => {
                tracing::trace!(user_id = %user_id, "Senden an nicht verbundenen Client");
                false
            }
        }
    }

    /// Sendet eine Nachricht an alle verbundenen Clients ausser einem
    ///
    /// Best-effort Broadcast (user_status_change); gibt die Anzahl der
    /// erfolgreich eingereihten Nachrichten zurueck.
    pub fn an_alle_ausser_senden(
        &self,
        ausgeschlossen: &UserId,
        nachricht: ControlMessage,
    ) -> usize {
        let mut gesendet = 0;
        self.inner.clients.iter().for_each(|entry| {
            if entry.key() == ausgeschlossen {
                return;
            }
            if entry.value().senden(nachricht.clone()) {
                gesendet += 1;
            }
        });
        gesendet
    }

    /// Gibt die gecachte Identitaet eines verbundenen Clients zurueck
    pub fn identitaet(&self, user_id: &UserId) -> Option<ClientIdentitaet> {
        self.inner
            .clients
            .get(user_id)
            .map(|s| s.identitaet.clone())
    }

    /// Prueft ob ein Client verbunden ist
    pub fn ist_verbunden(&self, user_id: &UserId) -> bool {
        self.inner.clients.contains_key(user_id)
    }

    /// Gibt die Anzahl der verbundenen Clients zurueck
    pub fn anzahl(&self) -> usize {
        self.inner.clients.len()
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::neu()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use plauder_protocol::control::ErrorCode;

    fn identitaet(user_id: UserId, name: &str) -> ClientIdentitaet {
        ClientIdentitaet {
            user_id,
            username: name.to_string(),
            gender: None,
        }
    }

    fn test_nachricht(id: u32) -> ControlMessage {
        ControlMessage::error(id, ErrorCode::InternalError, "test")
    }

    #[tokio::test]
    async fn registrieren_und_senden() {
        let registry = ConnectionRegistry::neu();
        let uid = UserId::new();

        let (_gen, mut rx, verdraengt) = registry.registrieren(identitaet(uid, "alice"));
        assert!(verdraengt.is_none());
        assert!(registry.ist_verbunden(&uid));
        assert_eq!(registry.anzahl(), 1);

        assert!(registry.senden(&uid, test_nachricht(1)));
        let empfangen = rx.try_recv().expect("Nachricht muss vorhanden sein");
        assert_eq!(empfangen.request_id, 1);
    }

    #[tokio::test]
    async fn senden_an_unbekannten_ist_false_kein_fehler() {
        let registry = ConnectionRegistry::neu();
        assert!(!registry.senden(&UserId::new(), test_nachricht(1)));
    }

    #[tokio::test]
    async fn neuer_login_verdraengt_alten_handle() {
        let registry = ConnectionRegistry::neu();
        let uid = UserId::new();

        let (_gen1, mut rx1, _) = registry.registrieren(identitaet(uid, "alice"));
        let (_gen2, mut rx2, verdraengt) = registry.registrieren(identitaet(uid, "alice"));

        let alter_sender = verdraengt.expect("Alter Handle muss verdraengt werden");
        assert!(alter_sender.senden(test_nachricht(9)));
        drop(alter_sender);

        // Abschiedsnachricht landet noch beim alten Empfaenger, danach ist
        // dessen Queue geschlossen
        assert_eq!(rx1.try_recv().unwrap().request_id, 9);
        assert!(rx1.try_recv().is_err());

        // Nachrichten gehen nur noch an die neue Verbindung
        assert!(registry.senden(&uid, test_nachricht(2)));
        assert_eq!(rx2.try_recv().unwrap().request_id, 2);
        assert_eq!(registry.anzahl(), 1);
    }

    #[tokio::test]
    async fn abmelden_mit_alter_generation_trifft_ins_leere() {
        let registry = ConnectionRegistry::neu();
        let uid = UserId::new();

        let (gen1, _rx1, _) = registry.registrieren(identitaet(uid, "alice"));
        let (gen2, _rx2, _) = registry.registrieren(identitaet(uid, "alice"));

        // Der verdraengte Task darf den Nachfolger nicht entfernen
        assert!(!registry.abmelden(&uid, gen1));
        assert!(registry.ist_verbunden(&uid));
        assert!(registry.ist_aktuelle_generation(&uid, gen2));

        assert!(registry.abmelden(&uid, gen2));
        assert!(!registry.ist_verbunden(&uid));
    }

    #[tokio::test]
    async fn broadcast_an_alle_ausser() {
        let registry = ConnectionRegistry::neu();
        let uid1 = UserId::new();
        let uid2 = UserId::new();
        let uid3 = UserId::new();

        let (_g, mut rx1, _) = registry.registrieren(identitaet(uid1, "a"));
        let (_g, mut rx2, _) = registry.registrieren(identitaet(uid2, "b"));
        let (_g, mut rx3, _) = registry.registrieren(identitaet(uid3, "c"));

        let gesendet = registry.an_alle_ausser_senden(&uid1, test_nachricht(5));
        assert_eq!(gesendet, 2);

        assert!(rx1.try_recv().is_err(), "Ausloeser darf nichts empfangen");
        assert!(rx2.try_recv().is_ok());
        assert!(rx3.try_recv().is_ok());
    }

    #[tokio::test]
    async fn identitaet_wird_gecacht() {
        let registry = ConnectionRegistry::neu();
        let uid = UserId::new();
        let (_g, _rx, _) = registry.registrieren(ClientIdentitaet {
            user_id: uid,
            username: "carla".into(),
            gender: Some(Gender::Female),
        });

        let ident = registry.identitaet(&uid).expect("Identitaet erwartet");
        assert_eq!(ident.username, "carla");
        assert_eq!(ident.gender, Some(Gender::Female));
    }
}
