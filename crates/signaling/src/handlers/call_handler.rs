//! Call-Handler – Initiieren, Annehmen, Ablehnen, Beenden, Bewerten
//!
//! Delegiert die Zustandsuebergaenge an den CallManager und haelt die
//! Praesenz synchron: beide Seiten werden bei Annahme `in_call`, nach
//! dem Ende wieder `online` (sofern noch verbunden).

use plauder_core::types::{PraesenzStatus, UserId};
use plauder_db::{AnrufRepository, BenutzerRepository, PraesenzRepository};
use plauder_protocol::control::{
    AcceptCallRequest, CallConnectedEvent, CallEndedEvent, CallInitiatedResponse, ControlMessage,
    ControlPayload, EndCallRequest, InitiateCallRequest, PeerInfo, RateCallRequest,
    RatingSubmittedResponse, RejectCallRequest,
};
use std::sync::Arc;

use crate::registry::ClientIdentitaet;
use crate::server_state::SignalingState;

/// Verarbeitet eine Initiate-Call-Anfrage
pub async fn handle_initiate<D>(
    request: InitiateCallRequest,
    request_id: u32,
    anrufer: &ClientIdentitaet,
    state: &Arc<SignalingState<D>>,
) -> ControlMessage
where
    D: BenutzerRepository + PraesenzRepository + AnrufRepository + 'static,
{
    match state.anrufe.initiieren(anrufer, request.receiver_id).await {
        Ok((call_id, empfaenger)) => ControlMessage::new(
            request_id,
            ControlPayload::CallInitiated(CallInitiatedResponse {
                call_id,
                receiver: PeerInfo {
                    id: empfaenger.user_id,
                    username: empfaenger.username,
                    gender: None,
                },
            }),
        ),
        Err(e) => {
            tracing::debug!(caller = %anrufer.user_id, fehler = %e, "Anruf-Initiierung abgelehnt");
            ControlMessage::call_error(request_id, e.error_code(), e.to_string())
        }
    }
}

/// Verarbeitet eine Accept-Call-Anfrage
///
/// Der Annehmende erhaelt `call_connected`, der Anrufer (vom Manager)
/// `call_accepted` – zwei verschiedene Event-Formen, damit jede Seite
/// ihre eigene UI-State-Machine treiben kann.
pub async fn handle_accept<D>(
    request: AcceptCallRequest,
    request_id: u32,
    annehmer: &ClientIdentitaet,
    state: &Arc<SignalingState<D>>,
) -> ControlMessage
where
    D: BenutzerRepository + PraesenzRepository + AnrufRepository + 'static,
{
    match state.anrufe.annehmen(request.call_id, annehmer).await {
        Ok(anrufer) => {
            // Beide Seiten sind jetzt im Gespraech
            praesenz_setzen(state, anrufer.user_id, PraesenzStatus::InCall).await;
            praesenz_setzen(state, annehmer.user_id, PraesenzStatus::InCall).await;

            ControlMessage::new(
                request_id,
                ControlPayload::CallConnected(CallConnectedEvent {
                    call_id: request.call_id,
                    caller: PeerInfo {
                        id: anrufer.user_id,
                        username: anrufer.username,
                        gender: None,
                    },
                }),
            )
        }
        Err(e) => {
            tracing::debug!(call_id = %request.call_id, fehler = %e, "Annahme abgelehnt");
            ControlMessage::call_error(request_id, e.error_code(), e.to_string())
        }
    }
}

/// Verarbeitet eine Reject-Call-Anfrage
///
/// Der Anrufer bekommt `call_rejected` (vom Manager); der Ablehnende
/// erhaelt als Bestaetigung ein `call_ended` mit Dauer 0.
pub async fn handle_reject<D>(
    request: RejectCallRequest,
    request_id: u32,
    ablehner: &ClientIdentitaet,
    state: &Arc<SignalingState<D>>,
) -> ControlMessage
where
    D: BenutzerRepository + PraesenzRepository + AnrufRepository + 'static,
{
    match state.anrufe.ablehnen(request.call_id, ablehner).await {
        Ok(()) => ControlMessage::new(
            request_id,
            ControlPayload::CallEnded(CallEndedEvent {
                call_id: request.call_id,
                duration: 0,
                reason: None,
            }),
        ),
        Err(e) => {
            tracing::debug!(call_id = %request.call_id, fehler = %e, "Ablehnung fehlgeschlagen");
            ControlMessage::call_error(request_id, e.error_code(), e.to_string())
        }
    }
}

/// Verarbeitet eine End-Call-Anfrage
pub async fn handle_end<D>(
    request: EndCallRequest,
    request_id: u32,
    ender: &ClientIdentitaet,
    state: &Arc<SignalingState<D>>,
) -> ControlMessage
where
    D: BenutzerRepository + PraesenzRepository + AnrufRepository + 'static,
{
    match state.anrufe.beenden(request.call_id, ender.user_id).await {
        Ok(ergebnis) => {
            // Wer noch in_call steht, kehrt zu online zurueck. Der Manager
            // hat die Gegenseite bereits benachrichtigt.
            praesenz_nach_anrufende(state, ender.user_id).await;
            if let Ok(Some(record)) = state.db.anruf_laden(request.call_id).await {
                let peer = if record.caller_id == ender.user_id {
                    record.receiver_id
                } else {
                    record.caller_id
                };
                if state.registry.ist_verbunden(&peer) {
                    praesenz_nach_anrufende(state, peer).await;
                }
            }

            ControlMessage::new(
                request_id,
                ControlPayload::CallEnded(CallEndedEvent {
                    call_id: request.call_id,
                    duration: ergebnis.duration,
                    reason: None,
                }),
            )
        }
        Err(e) => {
            tracing::debug!(call_id = %request.call_id, fehler = %e, "Beenden fehlgeschlagen");
            ControlMessage::call_error(request_id, e.error_code(), e.to_string())
        }
    }
}

/// Verarbeitet eine Rate-Call-Anfrage
pub async fn handle_rate<D>(
    request: RateCallRequest,
    request_id: u32,
    rater_id: UserId,
    state: &Arc<SignalingState<D>>,
) -> ControlMessage
where
    D: BenutzerRepository + PraesenzRepository + AnrufRepository + 'static,
{
    match state
        .anrufe
        .bewerten(request.call_id, rater_id, request.rating)
        .await
    {
        Ok(()) => ControlMessage::new(
            request_id,
            ControlPayload::RatingSubmitted(RatingSubmittedResponse {
                call_id: request.call_id,
            }),
        ),
        Err(e) => {
            tracing::debug!(call_id = %request.call_id, fehler = %e, "Bewertung abgelehnt");
            ControlMessage::rating_error(request_id, e.error_code(), e.to_string())
        }
    }
}

/// Setzt die Praesenz eines Benutzers (Fehler werden nur geloggt)
async fn praesenz_setzen<D>(state: &Arc<SignalingState<D>>, user_id: UserId, status: PraesenzStatus)
where
    D: BenutzerRepository + PraesenzRepository + AnrufRepository + 'static,
{
    if let Err(e) = state.db.status_setzen(user_id, status, None).await {
        tracing::error!(user_id = %user_id, fehler = %e, "Praesenz-Update fehlgeschlagen");
    }
}

/// Setzt einen Benutzer nach Anrufende von in_call zurueck auf online
///
/// Andere Zustaende (z.B. in_queue beim Abbruch eines nie aktiven
/// Anrufs) bleiben unangetastet.
pub async fn praesenz_nach_anrufende<D>(state: &Arc<SignalingState<D>>, user_id: UserId)
where
    D: BenutzerRepository + PraesenzRepository + AnrufRepository + 'static,
{
    match state.db.praesenz_laden(user_id).await {
        Ok(Some(record)) if record.status == PraesenzStatus::InCall => {
            praesenz_setzen(state, user_id, PraesenzStatus::Online).await;
        }
        Ok(_) => {}
        Err(e) => {
            tracing::warn!(user_id = %user_id, fehler = %e, "Praesenz-Abfrage fehlgeschlagen");
        }
    }
}
