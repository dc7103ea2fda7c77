//! Call-Manager – Lebenszyklus einer Anruf-Sitzung
//!
//! Besitzt die Kern-State-Machine: pending -> active -> completed,
//! pending -> missed, pending -> rejected. Terminale Sitzungen leben nur
//! noch als durable Datensatz; der In-Memory-Index haelt ausschliesslich
//! pending/active Sitzungen.
//!
//! ## Nebenlaeufigkeit
//! Check-and-set passiert synchron unter dem DashMap-Entry-Guard der
//! jeweiligen CallId; Persistenz und Benachrichtigungen folgen nach dem
//! Freigeben des Guards. Verlierende konkurrierende Uebergaenge erhalten
//! einen StateConflict statt den Zustand zu korrumpieren.
//!
//! ## Reverse-Index
//! `benutzer_anrufe` (UserId -> CallIds) begrenzt den Disconnect-Sweep
//! auf die Sitzungen des betroffenen Benutzers und erzwingt gleichzeitig
//! die Invariante "hoechstens eine pending/active Sitzung pro Benutzer".

use chrono::Utc;
use dashmap::DashMap;
use std::sync::Arc;

use plauder_core::types::{AnrufStatus, CallId, UserId};
use plauder_db::models::{AnrufUpdate, NeuerAnruf};
use plauder_db::AnrufRepository;
use plauder_protocol::control::{
    BeendigungsGrund, CallAcceptedEvent, CallEndedEvent, CallRejectedEvent, ControlMessage,
    ControlPayload, IncomingCallEvent, PeerInfo, SignalMessage,
};

use crate::error::{SignalingError, SignalingResult};
use crate::registry::{ClientIdentitaet, ConnectionRegistry};

// ---------------------------------------------------------------------------
// State Machine
// ---------------------------------------------------------------------------

/// Prueft ob ein Status-Uebergang erlaubt ist
///
/// Reine Funktion, getrennt von IO, damit die State Machine ohne
/// laufenden Transport testbar bleibt. Uebergaenge laufen nur vorwaerts;
/// terminale Zustaende werden nie verlassen.
pub fn uebergang_erlaubt(von: AnrufStatus, nach: AnrufStatus) -> bool {
    use AnrufStatus::*;
    matches!(
        (von, nach),
        (Pending, Active) | (Pending, Missed) | (Pending, Rejected) | (Active, Completed)
    )
}

/// Eine lebende (pending oder active) Anruf-Sitzung
#[derive(Debug, Clone)]
struct AktiverAnruf {
    caller_id: UserId,
    receiver_id: UserId,
    status: AnrufStatus,
    /// Provisorisch die Initiierungszeit; wird beim Wechsel auf active
    /// mit der Annahmezeit ueberschrieben, damit die Dauer Gespraechszeit
    /// misst und nicht Klingelzeit
    start_time: chrono::DateTime<Utc>,
}

impl AktiverAnruf {
    fn ist_teilnehmer(&self, user_id: &UserId) -> bool {
        self.caller_id == *user_id || self.receiver_id == *user_id
    }

    fn gegenseite(&self, user_id: &UserId) -> UserId {
        if self.caller_id == *user_id {
            self.receiver_id
        } else {
            self.caller_id
        }
    }
}

/// Ergebnis eines `beenden`-Aufrufs
#[derive(Debug, Clone, Copy)]
pub struct BeendetErgebnis {
    /// Gespraechsdauer in Sekunden (0 wenn der Anruf nie aktiv war)
    pub duration: i64,
    /// Finaler Status des Anrufs
    pub status: AnrufStatus,
}

/// Eine durch Verbindungsabbruch beendete Sitzung
#[derive(Debug, Clone, Copy)]
pub struct GetrennteSitzung {
    pub call_id: CallId,
    /// Der verbliebene Teilnehmer
    pub peer: UserId,
    pub status: AnrufStatus,
    pub duration: i64,
}

// ---------------------------------------------------------------------------
// CallManager
// ---------------------------------------------------------------------------

/// Verwaltet alle lebenden Anruf-Sitzungen
pub struct CallManager<A>
where
    A: AnrufRepository + 'static,
{
    registry: ConnectionRegistry,
    db: Arc<A>,
    /// Lebende Sitzungen, indiziert nach CallId
    anrufe: DashMap<CallId, AktiverAnruf>,
    /// Reverse-Index: UserId -> Sitzungen an denen der User teilnimmt
    benutzer_anrufe: DashMap<UserId, Vec<CallId>>,
}

impl<A> CallManager<A>
where
    A: AnrufRepository + 'static,
{
    /// Erstellt einen neuen CallManager
    pub fn neu(registry: ConnectionRegistry, db: Arc<A>) -> Self {
        Self {
            registry,
            db,
            anrufe: DashMap::new(),
            benutzer_anrufe: DashMap::new(),
        }
    }

    /// Prueft ob ein Benutzer eine pending/active Sitzung hat
    pub fn hat_aktive_sitzung(&self, user_id: &UserId) -> bool {
        self.benutzer_anrufe
            .get(user_id)
            .map(|v| !v.is_empty())
            .unwrap_or(false)
    }

    /// Gibt die Anzahl der lebenden Sitzungen zurueck
    pub fn aktive_anzahl(&self) -> usize {
        self.anrufe.len()
    }

    // -----------------------------------------------------------------------
    // Operationen
    // -----------------------------------------------------------------------

    /// Initiiert einen Anruf vom Anrufer zum Empfaenger
    ///
    /// Gibt die CallId und die Identitaet des Empfaengers zurueck.
    /// Der Empfaenger wird mit `incoming_call` benachrichtigt.
    pub async fn initiieren(
        &self,
        anrufer: &ClientIdentitaet,
        receiver_id: UserId,
    ) -> SignalingResult<(CallId, ClientIdentitaet)> {
        let caller_id = anrufer.user_id;

        if caller_id == receiver_id {
            return Err(SignalingError::InvalidTarget);
        }

        let empfaenger = self
            .registry
            .identitaet(&receiver_id)
            .ok_or_else(|| {
                SignalingError::PeerUnreachable("Benutzer ist nicht online".into())
            })?;

        let call_id = CallId::new();

        // Beide Teilnehmer reservieren (hoechstens eine Sitzung pro User).
        // Zwei-Phasen mit Rollback statt verschachtelter Guards.
        if !self.reservieren(caller_id, call_id) {
            return Err(SignalingError::AlreadyInCall(
                "Du bist bereits in einem Anruf".into(),
            ));
        }
        if !self.reservieren(receiver_id, call_id) {
            self.reservierung_freigeben(&caller_id, &call_id);
            return Err(SignalingError::AlreadyInCall(
                "Gegenseite ist bereits in einem Anruf".into(),
            ));
        }

        let start = Utc::now();
        self.anrufe.insert(
            call_id,
            AktiverAnruf {
                caller_id,
                receiver_id,
                status: AnrufStatus::Pending,
                start_time: start,
            },
        );

        // Durable Spiegelung; bei Fehler alles zurueckrollen
        if let Err(e) = self
            .db
            .anruf_erstellen(NeuerAnruf {
                id: call_id,
                caller_id,
                receiver_id,
                start_time: start,
            })
            .await
        {
            self.anrufe.remove(&call_id);
            self.reservierung_freigeben(&caller_id, &call_id);
            self.reservierung_freigeben(&receiver_id, &call_id);
            return Err(e.into());
        }

        // Angerufenen benachrichtigen (best effort)
        self.registry.senden(
            &receiver_id,
            ControlMessage::event(ControlPayload::IncomingCall(IncomingCallEvent {
                call_id,
                caller: PeerInfo {
                    id: caller_id,
                    username: anrufer.username.clone(),
                    gender: anrufer.gender,
                },
            })),
        );

        tracing::info!(
            call_id = %call_id,
            caller = %caller_id,
            receiver = %receiver_id,
            "Anruf initiiert"
        );

        Ok((call_id, empfaenger))
    }

    /// Nimmt einen ausstehenden Anruf an
    ///
    /// Nur der Angerufene darf annehmen. Gibt die Identitaet des Anrufers
    /// zurueck (fuer das `call_connected`-Event an den Annehmenden); der
    /// Anrufer selbst erhaelt `call_accepted`.
    pub async fn annehmen(
        &self,
        call_id: CallId,
        annehmer: &ClientIdentitaet,
    ) -> SignalingResult<ClientIdentitaet> {
        enum Uebergang {
            Aktiv {
                anrufer: ClientIdentitaet,
                start: chrono::DateTime<Utc>,
            },
            AnruferWeg {
                caller_id: UserId,
                receiver_id: UserId,
            },
        }

        let uebergang = {
            let mut eintrag = self.anrufe.get_mut(&call_id).ok_or_else(|| {
                SignalingError::NichtGefunden(
                    "Anruf existiert nicht oder wurde bereits beendet".into(),
                )
            })?;

            if annehmer.user_id != eintrag.receiver_id {
                return Err(SignalingError::NotAuthorized);
            }
            if !uebergang_erlaubt(eintrag.status, AnrufStatus::Active) {
                return Err(SignalingError::StateConflict(format!(
                    "Anruf ist {}, nicht pending",
                    eintrag.status
                )));
            }

            match self.registry.identitaet(&eintrag.caller_id) {
                Some(anrufer_ident) => {
                    let start = Utc::now();
                    eintrag.status = AnrufStatus::Active;
                    // Dauer misst Gespraechszeit, nicht Klingelzeit
                    eintrag.start_time = start;
                    Uebergang::Aktiv {
                        anrufer: anrufer_ident,
                        start,
                    }
                }
                None => {
                    eintrag.status = AnrufStatus::Missed;
                    Uebergang::AnruferWeg {
                        caller_id: eintrag.caller_id,
                        receiver_id: eintrag.receiver_id,
                    }
                }
            }
        };

        match uebergang {
            Uebergang::Aktiv { anrufer, start } => {
                self.db
                    .anruf_aktualisieren(
                        call_id,
                        AnrufUpdate {
                            status: Some(AnrufStatus::Active),
                            start_time: Some(start),
                            ..Default::default()
                        },
                    )
                    .await?;

                self.registry.senden(
                    &anrufer.user_id,
                    ControlMessage::event(ControlPayload::CallAccepted(CallAcceptedEvent {
                        call_id,
                        receiver: PeerInfo {
                            id: annehmer.user_id,
                            username: annehmer.username.clone(),
                            gender: None,
                        },
                    })),
                );

                tracing::info!(call_id = %call_id, "Anruf angenommen");
                Ok(anrufer)
            }
            Uebergang::AnruferWeg {
                caller_id,
                receiver_id,
            } => {
                // Anrufer ist zwischenzeitlich verschwunden: Sitzung als
                // verpasst abschliessen, Annehmer bekommt PeerGone
                self.anrufe.remove(&call_id);
                self.reservierung_freigeben(&caller_id, &call_id);
                self.reservierung_freigeben(&receiver_id, &call_id);

                self.db
                    .anruf_aktualisieren(
                        call_id,
                        AnrufUpdate {
                            status: Some(AnrufStatus::Missed),
                            end_time: Some(Utc::now()),
                            duration_secs: Some(0),
                            ..Default::default()
                        },
                    )
                    .await?;

                tracing::info!(call_id = %call_id, "Annahme fehlgeschlagen – Anrufer weg");
                Err(SignalingError::PeerGone)
            }
        }
    }

    /// Lehnt einen ausstehenden Anruf ab
    pub async fn ablehnen(
        &self,
        call_id: CallId,
        ablehner: &ClientIdentitaet,
    ) -> SignalingResult<()> {
        let caller_id = {
            let mut eintrag = self.anrufe.get_mut(&call_id).ok_or_else(|| {
                SignalingError::NichtGefunden(
                    "Anruf existiert nicht oder wurde bereits beendet".into(),
                )
            })?;

            if ablehner.user_id != eintrag.receiver_id {
                return Err(SignalingError::NotAuthorized);
            }
            if !uebergang_erlaubt(eintrag.status, AnrufStatus::Rejected) {
                return Err(SignalingError::StateConflict(format!(
                    "Anruf ist {}, nicht pending",
                    eintrag.status
                )));
            }

            eintrag.status = AnrufStatus::Rejected;
            eintrag.caller_id
        };

        self.anrufe.remove(&call_id);
        self.reservierung_freigeben(&caller_id, &call_id);
        self.reservierung_freigeben(&ablehner.user_id, &call_id);

        self.db
            .anruf_aktualisieren(
                call_id,
                AnrufUpdate {
                    status: Some(AnrufStatus::Rejected),
                    end_time: Some(Utc::now()),
                    duration_secs: Some(0),
                    ..Default::default()
                },
            )
            .await?;

        self.registry.senden(
            &caller_id,
            ControlMessage::event(ControlPayload::CallRejected(CallRejectedEvent {
                call_id,
                receiver: PeerInfo {
                    id: ablehner.user_id,
                    username: ablehner.username.clone(),
                    gender: None,
                },
            })),
        );

        tracing::info!(call_id = %call_id, "Anruf abgelehnt");
        Ok(())
    }

    /// Leitet eine opake Signaling-Nachricht an die Gegenseite weiter
    ///
    /// Zustellung ist at-most-once, best effort: ist der Empfaenger nicht
    /// verbunden, wird die Nachricht still verworfen (WebRTC verhandelt
    /// selbst nach). Autorisierung: die Sitzung muss aktiv sein und beide
    /// IDs muessen ihre Teilnehmer sein.
    pub fn signal_weiterleiten(
        &self,
        call_id: CallId,
        from: UserId,
        to: UserId,
        signal: serde_json::Value,
    ) -> SignalingResult<()> {
        {
            let eintrag = self
                .anrufe
                .get(&call_id)
                .ok_or(SignalingError::InvalidSession)?;

            if eintrag.status != AnrufStatus::Active || !eintrag.ist_teilnehmer(&from) {
                return Err(SignalingError::InvalidSession);
            }
            if to != eintrag.gegenseite(&from) {
                return Err(SignalingError::InvalidSession);
            }
        }

        self.registry.senden(
            &to,
            ControlMessage::event(ControlPayload::Signal(SignalMessage {
                call_id,
                to: None,
                from: Some(from),
                signal,
            })),
        );
        Ok(())
    }

    /// Beendet eine Sitzung
    ///
    /// active -> completed (Dauer ab Annahmezeit, nie negativ);
    /// pending -> missed (Grund `cancelled` wenn der Anrufer auflegt).
    /// Idempotent: eine bereits terminale Sitzung liefert die frueher
    /// berechnete Dauer zurueck statt zu scheitern.
    pub async fn beenden(
        &self,
        call_id: CallId,
        ender_id: UserId,
    ) -> SignalingResult<BeendetErgebnis> {
        struct Ende {
            status: AnrufStatus,
            dauer: i64,
            grund: Option<BeendigungsGrund>,
            peer: UserId,
            caller_id: UserId,
            receiver_id: UserId,
        }

        let ende = {
            let mut eintrag = match self.anrufe.get_mut(&call_id) {
                Some(e) => e,
                None => return self.beenden_ohne_sitzung(call_id, ender_id).await,
            };

            if !eintrag.ist_teilnehmer(&ender_id) {
                return Err(SignalingError::NotParticipant);
            }

            match eintrag.status {
                AnrufStatus::Active => {
                    eintrag.status = AnrufStatus::Completed;
                    let dauer = (Utc::now() - eintrag.start_time).num_seconds().max(0);
                    Ende {
                        status: AnrufStatus::Completed,
                        dauer,
                        grund: None,
                        peer: eintrag.gegenseite(&ender_id),
                        caller_id: eintrag.caller_id,
                        receiver_id: eintrag.receiver_id,
                    }
                }
                AnrufStatus::Pending => {
                    eintrag.status = AnrufStatus::Missed;
                    let grund = (ender_id == eintrag.caller_id)
                        .then_some(BeendigungsGrund::Cancelled);
                    Ende {
                        status: AnrufStatus::Missed,
                        dauer: 0,
                        grund,
                        peer: eintrag.gegenseite(&ender_id),
                        caller_id: eintrag.caller_id,
                        receiver_id: eintrag.receiver_id,
                    }
                }
                status => {
                    return Err(SignalingError::StateConflict(format!(
                        "Anruf ist bereits {status}"
                    )));
                }
            }
        };

        self.anrufe.remove(&call_id);
        self.reservierung_freigeben(&ende.caller_id, &call_id);
        self.reservierung_freigeben(&ende.receiver_id, &call_id);

        self.db
            .anruf_aktualisieren(
                call_id,
                AnrufUpdate {
                    status: Some(ende.status),
                    end_time: Some(Utc::now()),
                    duration_secs: Some(ende.dauer),
                    ..Default::default()
                },
            )
            .await?;

        self.registry.senden(
            &ende.peer,
            ControlMessage::event(ControlPayload::CallEnded(CallEndedEvent {
                call_id,
                duration: ende.dauer,
                reason: ende.grund,
            })),
        );

        tracing::info!(
            call_id = %call_id,
            status = %ende.status,
            dauer_sek = ende.dauer,
            "Anruf beendet"
        );

        Ok(BeendetErgebnis {
            duration: ende.dauer,
            status: ende.status,
        })
    }

    /// Beendet-Pfad ohne lebende Sitzung: idempotente Wiederholung oder
    /// Abschluss eines haengenden Datensatzes (z.B. nach Server-Neustart)
    async fn beenden_ohne_sitzung(
        &self,
        call_id: CallId,
        ender_id: UserId,
    ) -> SignalingResult<BeendetErgebnis> {
        let record = self
            .db
            .anruf_laden(call_id)
            .await?
            .ok_or_else(|| SignalingError::NichtGefunden("Anruf existiert nicht".into()))?;

        if record.caller_id != ender_id && record.receiver_id != ender_id {
            return Err(SignalingError::NotParticipant);
        }

        if record.status.ist_terminal() {
            return Ok(BeendetErgebnis {
                duration: record.duration_secs,
                status: record.status,
            });
        }

        let (status, dauer) = match record.status {
            AnrufStatus::Active => (
                AnrufStatus::Completed,
                (Utc::now() - record.start_time).num_seconds().max(0),
            ),
            _ => (AnrufStatus::Missed, 0),
        };

        self.db
            .anruf_aktualisieren(
                call_id,
                AnrufUpdate {
                    status: Some(status),
                    end_time: Some(Utc::now()),
                    duration_secs: Some(dauer),
                    ..Default::default()
                },
            )
            .await?;

        Ok(BeendetErgebnis {
            duration: dauer,
            status,
        })
    }

    /// Setzt die Bewertung des Bewerters (last write wins, 1..=5)
    ///
    /// Nur abgeschlossene Anrufe sind bewertbar; jede Seite schreibt
    /// ausschliesslich ihr eigenes Feld.
    pub async fn bewerten(
        &self,
        call_id: CallId,
        rater_id: UserId,
        rating: i64,
    ) -> SignalingResult<()> {
        if !(1..=5).contains(&rating) {
            return Err(SignalingError::InvalidRating);
        }

        let record = self
            .db
            .anruf_laden(call_id)
            .await?
            .ok_or_else(|| SignalingError::NichtGefunden("Anruf nicht gefunden".into()))?;

        let update = if rater_id == record.caller_id {
            AnrufUpdate {
                caller_rating: Some(rating),
                ..Default::default()
            }
        } else if rater_id == record.receiver_id {
            AnrufUpdate {
                receiver_rating: Some(rating),
                ..Default::default()
            }
        } else {
            return Err(SignalingError::NotParticipant);
        };

        if record.status != AnrufStatus::Completed {
            return Err(SignalingError::StateConflict(format!(
                "Nur abgeschlossene Anrufe sind bewertbar (Status: {})",
                record.status
            )));
        }

        self.db.anruf_aktualisieren(call_id, update).await?;
        tracing::debug!(call_id = %call_id, rater = %rater_id, rating, "Anruf bewertet");
        Ok(())
    }

    /// Schliesst alle Sitzungen eines getrennten Benutzers ab
    ///
    /// pending -> missed, active -> completed (Dauer bis jetzt). Der
    /// verbliebene Teilnehmer erhaelt `call_ended` mit dem Grund
    /// `participant_disconnected`. Ueber den Reverse-Index kostet der
    /// Sweep nur O(Sitzungen dieses Benutzers).
    pub async fn verbindung_getrennt(&self, user_id: UserId) -> Vec<GetrennteSitzung> {
        let call_ids = match self.benutzer_anrufe.remove(&user_id) {
            Some((_, ids)) => ids,
            None => return Vec::new(),
        };

        let mut ergebnisse = Vec::new();
        for call_id in call_ids {
            let anruf = match self.anrufe.remove(&call_id) {
                Some((_, a)) => a,
                None => continue,
            };
            if anruf.status.ist_terminal() {
                // Ein konkurrierender Uebergang hat die Sitzung schon
                // abgeschlossen
                continue;
            }

            let peer = anruf.gegenseite(&user_id);
            self.reservierung_freigeben(&peer, &call_id);

            let (status, dauer) = match anruf.status {
                AnrufStatus::Active => (
                    AnrufStatus::Completed,
                    (Utc::now() - anruf.start_time).num_seconds().max(0),
                ),
                _ => (AnrufStatus::Missed, 0),
            };

            if let Err(e) = self
                .db
                .anruf_aktualisieren(
                    call_id,
                    AnrufUpdate {
                        status: Some(status),
                        end_time: Some(Utc::now()),
                        duration_secs: Some(dauer),
                        ..Default::default()
                    },
                )
                .await
            {
                tracing::error!(
                    call_id = %call_id,
                    fehler = %e,
                    "Anruf-Abschluss nach Disconnect nicht persistierbar"
                );
            }

            self.registry.senden(
                &peer,
                ControlMessage::event(ControlPayload::CallEnded(CallEndedEvent {
                    call_id,
                    duration: dauer,
                    reason: Some(BeendigungsGrund::ParticipantDisconnected),
                })),
            );

            tracing::info!(
                call_id = %call_id,
                user_id = %user_id,
                status = %status,
                "Sitzung nach Disconnect abgeschlossen"
            );

            ergebnisse.push(GetrennteSitzung {
                call_id,
                peer,
                status,
                duration: dauer,
            });
        }

        ergebnisse
    }

    // -----------------------------------------------------------------------
    // Interne Hilfsmethoden
    // -----------------------------------------------------------------------

    /// Reserviert einen Benutzer fuer eine Sitzung
    ///
    /// Gibt `false` zurueck wenn der Benutzer bereits eine Sitzung hat.
    fn reservieren(&self, user_id: UserId, call_id: CallId) -> bool {
        let mut eintrag = self.benutzer_anrufe.entry(user_id).or_default();
        if !eintrag.is_empty() {
            return false;
        }
        eintrag.push(call_id);
        true
    }

    /// Entfernt eine Sitzungs-Reservierung eines Benutzers
    fn reservierung_freigeben(&self, user_id: &UserId, call_id: &CallId) {
        if let Some(mut eintrag) = self.benutzer_anrufe.get_mut(user_id) {
            eintrag.retain(|id| id != call_id);
            let ist_leer = eintrag.is_empty();
            drop(eintrag);
            if ist_leer {
                self.benutzer_anrufe.remove_if(user_id, |_, v| v.is_empty());
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
