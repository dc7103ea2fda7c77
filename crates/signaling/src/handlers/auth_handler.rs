//! Auth-Handler – Login und Zulassungspruefung
//!
//! Das Admission Gate: validiert das Token, laedt den Benutzer und setzt
//! die Praesenz auf online. Schlaegt irgendein Schritt fehl, wird nichts
//! registriert (fail closed) – die Registry-Registrierung selbst passiert
//! erst danach im Verbindungs-Task.

use plauder_auth::AuthError;
use plauder_core::types::PraesenzStatus;
use plauder_db::{AnrufRepository, BenutzerRepository, PraesenzRepository};
use plauder_protocol::control::{
    ControlMessage, ControlPayload, ErrorCode, LoginRequest, LoginResponse,
};
use std::sync::Arc;

use crate::server_state::SignalingState;

/// Verarbeitet eine Login-Anfrage
///
/// Bei Erfolg enthaelt die Antwort die Identitaet des Benutzers; der
/// Dispatcher uebernimmt sie in den Verbindungskontext.
pub async fn handle_login<D>(
    request: LoginRequest,
    request_id: u32,
    state: &Arc<SignalingState<D>>,
) -> ControlMessage
where
    D: BenutzerRepository + PraesenzRepository + AnrufRepository + 'static,
{
    let (benutzer, token) = match state.auth_service.validieren(&request.token).await {
        Ok(ergebnis) => ergebnis,
        Err(AuthError::TokenAbgelaufen) => {
            tracing::warn!("Login mit abgelaufenem Token abgelehnt");
            return ControlMessage::error(
                request_id,
                ErrorCode::SessionExpired,
                "Token abgelaufen – bitte neu anmelden",
            );
        }
        Err(AuthError::Datenbank(e)) => {
            tracing::error!(fehler = %e, "Token-Pruefung fehlgeschlagen");
            return ControlMessage::error(request_id, ErrorCode::InternalError, "Interner Fehler");
        }
        Err(e) => {
            tracing::warn!(fehler = %e, "Login abgelehnt");
            return ControlMessage::error(
                request_id,
                ErrorCode::AuthFailed,
                "Ungueltige Anmeldedaten",
            );
        }
    };

    // Praesenz auf online setzen (durable, ueberlebt Registry-Neustarts)
    if let Err(e) = state
        .db
        .status_setzen(benutzer.id, PraesenzStatus::Online, None)
        .await
    {
        tracing::error!(user_id = %benutzer.id, fehler = %e, "Praesenz-Update fehlgeschlagen");
        return ControlMessage::error(request_id, ErrorCode::InternalError, "Interner Fehler");
    }

    tracing::info!(
        user_id = %benutzer.id,
        username = %benutzer.username,
        "Login erfolgreich"
    );

    ControlMessage::new(
        request_id,
        ControlPayload::LoginResponse(LoginResponse {
            user_id: benutzer.id,
            username: benutzer.username,
            gender: benutzer.gender,
            server_id: state.config.server_id,
            expires_at: token.laeuft_ab_am.timestamp() as u64,
        }),
    )
}
