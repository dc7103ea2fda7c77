//! Signal-Handler – WebRTC-Signaling-Relay
//!
//! Zustandslose Weiterleitung auf Basis der Registry. Die einzige Logik
//! ist die Autorisierungspruefung im CallManager: Sender und Empfaenger
//! muessen Teilnehmer der benannten aktiven Sitzung sein – niemand darf
//! Signaling-Verkehr in fremde Anrufe injizieren.

use plauder_core::types::UserId;
use plauder_db::{AnrufRepository, BenutzerRepository, PraesenzRepository};
use plauder_protocol::control::{ControlMessage, ErrorCode, SignalMessage};
use std::sync::Arc;

use crate::server_state::SignalingState;

/// Verarbeitet eine Signal-Nachricht (Offer/Answer/ICE-Candidate)
///
/// Gibt `None` zurueck wenn die Weiterleitung akzeptiert wurde – auch
/// dann, wenn der Empfaenger inzwischen weg ist (at-most-once, still
/// verworfen). Nur Autorisierungsfehler erzeugen eine Antwort.
pub fn handle_signal<D>(
    request: SignalMessage,
    request_id: u32,
    absender: UserId,
    state: &Arc<SignalingState<D>>,
) -> Option<ControlMessage>
where
    D: BenutzerRepository + PraesenzRepository + AnrufRepository + 'static,
{
    let ziel = match request.to {
        Some(ziel) => ziel,
        None => {
            return Some(ControlMessage::call_error(
                request_id,
                ErrorCode::InvalidRequest,
                "Signal ohne Zielbenutzer",
            ));
        }
    };

    match state
        .anrufe
        .signal_weiterleiten(request.call_id, absender, ziel, request.signal)
    {
        Ok(()) => None,
        Err(e) => {
            tracing::debug!(
                call_id = %request.call_id,
                absender = %absender,
                fehler = %e,
                "Signal-Weiterleitung abgelehnt"
            );
            Some(ControlMessage::call_error(
                request_id,
                e.error_code(),
                e.to_string(),
            ))
        }
    }
}
