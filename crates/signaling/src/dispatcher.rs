//! Message-Dispatcher – Routet ControlMessages an die richtigen Handler
//!
//! Explizites Match ueber die geschlossene Menge der eingehenden
//! Nachrichten-Varianten statt Callback-Registrierung: jede Variante
//! laeuft durch eine Handler-Funktion ueber (Zustand, Nachricht) ->
//! Antwort, damit die State Machine ohne Transport testbar ist.
//!
//! ## Zustandspruefung
//! - `login` nur vor der Authentifizierung
//! - Alle anderen Nachrichten nur nach erfolgreichem Login

use plauder_core::types::{PraesenzStatus, UserId};
use plauder_db::{AnrufRepository, BenutzerRepository, PraesenzRepository};
use plauder_protocol::control::{
    ControlMessage, ControlPayload, ErrorCode, UserStatusChangeEvent,
};
use std::net::SocketAddr;
use std::sync::Arc;

use crate::handlers::{auth_handler, call_handler, queue_handler, signal_handler};
use crate::registry::ClientIdentitaet;
use crate::server_state::SignalingState;

/// Dispatcher-Kontext – Informationen ueber die aktuelle Verbindung
pub struct DispatcherContext {
    /// Peer-IP-Adresse (Logging)
    pub peer_addr: SocketAddr,
    /// Beim Login verwendetes Token (None wenn nicht authentifiziert)
    pub token: Option<String>,
    /// Authentifizierte Identitaet (None wenn nicht authentifiziert)
    pub identitaet: Option<ClientIdentitaet>,
}

impl DispatcherContext {
    /// Erstellt einen frischen, unauthentifizierten Kontext
    pub fn neu(peer_addr: SocketAddr) -> Self {
        Self {
            peer_addr,
            token: None,
            identitaet: None,
        }
    }

    /// Gibt die authentifizierte UserId zurueck, falls vorhanden
    pub fn user_id(&self) -> Option<UserId> {
        self.identitaet.as_ref().map(|i| i.user_id)
    }
}

/// Zentraler Message-Dispatcher
pub struct MessageDispatcher<D>
where
    D: BenutzerRepository + PraesenzRepository + AnrufRepository + 'static,
{
    state: Arc<SignalingState<D>>,
}

impl<D> MessageDispatcher<D>
where
    D: BenutzerRepository + PraesenzRepository + AnrufRepository + 'static,
{
    /// Erstellt einen neuen Dispatcher
    pub fn neu(state: Arc<SignalingState<D>>) -> Self {
        Self { state }
    }

    /// Verarbeitet eine eingehende ControlMessage und gibt die Antwort zurueck
    ///
    /// Gibt `None` zurueck wenn keine Antwort gesendet werden soll
    /// (z.B. akzeptierte Signal-Weiterleitungen oder Pong-Antworten).
    pub async fn dispatch(
        &self,
        message: ControlMessage,
        ctx: &mut DispatcherContext,
    ) -> Option<ControlMessage> {
        let request_id = message.request_id;

        match message.payload {
            // -------------------------------------------------------------------
            // Auth (nur vor dem Login erlaubt)
            // -------------------------------------------------------------------
            ControlPayload::Login(req) => {
                if ctx.identitaet.is_some() {
                    return Some(ControlMessage::error(
                        request_id,
                        ErrorCode::AlreadyLoggedIn,
                        "Bereits angemeldet",
                    ));
                }

                let token = req.token.clone();
                let antwort = auth_handler::handle_login(req, request_id, &self.state).await;

                // Bei Erfolg: Identitaet in den Verbindungskontext uebernehmen
                if let ControlPayload::LoginResponse(ref resp) = antwort.payload {
                    ctx.token = Some(token);
                    ctx.identitaet = Some(ClientIdentitaet {
                        user_id: resp.user_id,
                        username: resp.username.clone(),
                        gender: resp.gender,
                    });
                    tracing::debug!(
                        peer = %ctx.peer_addr,
                        user_id = %resp.user_id,
                        "Verbindung authentifiziert"
                    );
                }

                Some(antwort)
            }

            // -------------------------------------------------------------------
            // Keepalive
            // -------------------------------------------------------------------
            ControlPayload::Ping(ping) => {
                let server_ts = std::time::SystemTime::now()
                    .duration_since(std::time::UNIX_EPOCH)
                    .unwrap_or_default()
                    .as_millis() as u64;
                Some(ControlMessage::pong(request_id, ping.timestamp_ms, server_ts))
            }

            ControlPayload::Pong(_) => {
                tracing::trace!("Pong empfangen (RTT-Messung)");
                None
            }

            // -------------------------------------------------------------------
            // Authentifizierung erfordernde Nachrichten
            // -------------------------------------------------------------------
            payload => {
                let identitaet = match ctx.identitaet.clone() {
                    Some(ident) => ident,
                    None => {
                        return Some(ControlMessage::error(
                            request_id,
                            ErrorCode::AuthFailed,
                            "Nicht authentifiziert – bitte zuerst anmelden",
                        ));
                    }
                };

                self.dispatch_authenticated(payload, request_id, &identitaet)
                    .await
            }
        }
    }

    /// Routet Nachrichten die eine Authentifizierung erfordern
    async fn dispatch_authenticated(
        &self,
        payload: ControlPayload,
        request_id: u32,
        identitaet: &ClientIdentitaet,
    ) -> Option<ControlMessage> {
        match payload {
            // -------------------------------------------------------------------
            // Warteschlange
            // -------------------------------------------------------------------
            ControlPayload::JoinQueue(req) => Some(
                queue_handler::handle_join_queue(req, request_id, identitaet.user_id, &self.state)
                    .await,
            ),

            ControlPayload::LeaveQueue => Some(
                queue_handler::handle_leave_queue(request_id, identitaet.user_id, &self.state)
                    .await,
            ),

            // -------------------------------------------------------------------
            // Anrufe
            // -------------------------------------------------------------------
            ControlPayload::InitiateCall(req) => Some(
                call_handler::handle_initiate(req, request_id, identitaet, &self.state).await,
            ),

            ControlPayload::AcceptCall(req) => {
                Some(call_handler::handle_accept(req, request_id, identitaet, &self.state).await)
            }

            ControlPayload::RejectCall(req) => {
                Some(call_handler::handle_reject(req, request_id, identitaet, &self.state).await)
            }

            ControlPayload::EndCall(req) => {
                Some(call_handler::handle_end(req, request_id, identitaet, &self.state).await)
            }

            ControlPayload::RateCall(req) => Some(
                call_handler::handle_rate(req, request_id, identitaet.user_id, &self.state).await,
            ),

            // -------------------------------------------------------------------
            // Signaling-Relay
            // -------------------------------------------------------------------
            ControlPayload::Signal(req) => {
                signal_handler::handle_signal(req, request_id, identitaet.user_id, &self.state)
            }

            // -------------------------------------------------------------------
            // Unerwartete Server->Client Nachrichten
            // -------------------------------------------------------------------
            ControlPayload::LoginResponse(_)
            | ControlPayload::QueueJoined(_)
            | ControlPayload::QueueLeft(_)
            | ControlPayload::QueuePositionUpdate(_)
            | ControlPayload::CallInitiated(_)
            | ControlPayload::IncomingCall(_)
            | ControlPayload::CallAccepted(_)
            | ControlPayload::CallConnected(_)
            | ControlPayload::CallRejected(_)
            | ControlPayload::CallEnded(_)
            | ControlPayload::RatingSubmitted(_)
            | ControlPayload::RatingError(_)
            | ControlPayload::UserStatusChange(_)
            | ControlPayload::CallError(_)
            | ControlPayload::Error(_) => {
                tracing::warn!(
                    request_id,
                    "Unerwartete Server->Client Nachricht vom Client empfangen"
                );
                Some(ControlMessage::error(
                    request_id,
                    ErrorCode::InvalidRequest,
                    "Unerwartete Nachricht",
                ))
            }

            // Login im authentifizierten Zustand – Fehlermeldung
            ControlPayload::Login(_) => Some(ControlMessage::error(
                request_id,
                ErrorCode::AlreadyLoggedIn,
                "Bereits angemeldet",
            )),

            // Ping/Pong werden oben bereits behandelt
            ControlPayload::Ping(_) | ControlPayload::Pong(_) => None,
        }
    }

    /// Bereinigt alle Ressourcen eines Clients beim Trennen
    ///
    /// Reihenfolge: Registry-Eintrag entfernen (Zustellung stoppt),
    /// Sitzungen des Benutzers abschliessen (Gegenseiten benachrichtigen),
    /// Praesenz auf offline, Status-Broadcast, Queue-Positionen verteilen.
    /// Ein von einem neuen Login verdraengter Task raeumt nichts auf –
    /// der Nachfolger besitzt den Benutzer.
    pub async fn client_cleanup(&self, identitaet: &ClientIdentitaet, generation: u64) {
        let user_id = identitaet.user_id;

        if !self.state.registry.ist_aktuelle_generation(&user_id, generation) {
            tracing::debug!(user_id = %user_id, "Cleanup uebersprungen (verdraengte Verbindung)");
            return;
        }

        let war_in_queue = matches!(
            self.state.db.praesenz_laden(user_id).await,
            Ok(Some(record)) if record.status == PraesenzStatus::InQueue
        );

        self.state.registry.abmelden(&user_id, generation);

        // Sitzungen des Benutzers abschliessen; Gegenseiten kehren zu
        // online zurueck sofern sie noch verbunden sind
        let getrennt = self.state.anrufe.verbindung_getrennt(user_id).await;
        for sitzung in &getrennt {
            if self.state.registry.ist_verbunden(&sitzung.peer) {
                call_handler::praesenz_nach_anrufende(&self.state, sitzung.peer).await;
            }
        }

        if let Err(e) = self
            .state
            .db
            .status_setzen(user_id, PraesenzStatus::Offline, None)
            .await
        {
            tracing::error!(user_id = %user_id, fehler = %e, "Offline-Status nicht persistierbar");
        }

        self.state.registry.an_alle_ausser_senden(
            &user_id,
            ControlMessage::event(ControlPayload::UserStatusChange(UserStatusChangeEvent {
                user_id,
                status: PraesenzStatus::Offline,
            })),
        );

        if war_in_queue {
            queue_handler::positionen_verteilen(&self.state, &user_id).await;
        }

        tracing::debug!(user_id = %user_id, sitzungen = getrennt.len(), "Client-Ressourcen bereinigt");
    }
}
