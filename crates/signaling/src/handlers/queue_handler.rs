//! Queue-Handler – Warteschlange betreten und verlassen
//!
//! Matching bleibt in diesem Design beratend: die Position ist reine
//! Information (FIFO nach Beitrittszeit), kein Fairness-Versprechen.
//! Ein externer Matcher darf die Queue ueber den Praesenz-Store abarbeiten.

use chrono::Utc;
use plauder_core::types::{PraesenzStatus, UserId};
use plauder_db::models::QueueEintrag;
use plauder_db::{AnrufRepository, BenutzerRepository, PraesenzRepository};
use plauder_protocol::control::{
    ControlMessage, ControlPayload, ErrorCode, JoinQueueRequest, QueueJoinedResponse,
    QueueLeftResponse, QueuePositionUpdate,
};
use std::sync::Arc;

use crate::server_state::SignalingState;

/// Verarbeitet eine Join-Queue-Anfrage
///
/// Abgelehnt wenn der Benutzer bereits wartet, im Anruf ist oder noch
/// eine pending/active Sitzung haelt (kein Doppel-Queueing neben einem
/// haengenden Anruf).
pub async fn handle_join_queue<D>(
    request: JoinQueueRequest,
    request_id: u32,
    user_id: UserId,
    state: &Arc<SignalingState<D>>,
) -> ControlMessage
where
    D: BenutzerRepository + PraesenzRepository + AnrufRepository + 'static,
{
    match state.db.praesenz_laden(user_id).await {
        Ok(Some(record)) if record.status == PraesenzStatus::InQueue => {
            return ControlMessage::call_error(
                request_id,
                ErrorCode::AlreadyInQueue,
                "Du bist bereits in der Warteschlange",
            );
        }
        Ok(Some(record)) if record.status == PraesenzStatus::InCall => {
            return ControlMessage::call_error(
                request_id,
                ErrorCode::AlreadyInCall,
                "Du bist bereits in einem Anruf",
            );
        }
        Ok(_) => {}
        Err(e) => {
            tracing::error!(user_id = %user_id, fehler = %e, "Praesenz-Abfrage fehlgeschlagen");
            return ControlMessage::error(request_id, ErrorCode::InternalError, "Interner Fehler");
        }
    }

    // Auch eine klingelnde (pending) Sitzung blockiert den Queue-Beitritt
    if state.anrufe.hat_aktive_sitzung(&user_id) {
        return ControlMessage::call_error(
            request_id,
            ErrorCode::AlreadyInCall,
            "Du hast noch einen offenen Anruf",
        );
    }

    let record = match state
        .db
        .status_setzen(
            user_id,
            PraesenzStatus::InQueue,
            Some(QueueEintrag {
                stimmung: request.mood,
                gender_praeferenz: request.gender_preference,
            }),
        )
        .await
    {
        Ok(r) => r,
        Err(e) => {
            tracing::error!(user_id = %user_id, fehler = %e, "Queue-Beitritt fehlgeschlagen");
            return ControlMessage::error(request_id, ErrorCode::InternalError, "Interner Fehler");
        }
    };

    let position = match state.db.queue_position(user_id).await {
        Ok(Some(p)) => p,
        Ok(None) => 1,
        Err(e) => {
            tracing::warn!(user_id = %user_id, fehler = %e, "Queue-Position nicht bestimmbar");
            1
        }
    };

    tracing::info!(user_id = %user_id, position, "Warteschlange betreten");

    // Uebrige Wartende ueber ihre (ggf. unveraenderte) Position informieren
    positionen_verteilen(state, &user_id).await;

    ControlMessage::new(
        request_id,
        ControlPayload::QueueJoined(QueueJoinedResponse {
            timestamp: record.queue_joined_at.unwrap_or_else(Utc::now),
            position,
        }),
    )
}

/// Verarbeitet eine Leave-Queue-Anfrage
///
/// Stiller No-op wenn der Benutzer gar nicht wartet; die Bestaetigung
/// kommt trotzdem, damit der Client seinen Zustand abgleichen kann.
pub async fn handle_leave_queue<D>(
    request_id: u32,
    user_id: UserId,
    state: &Arc<SignalingState<D>>,
) -> ControlMessage
where
    D: BenutzerRepository + PraesenzRepository + AnrufRepository + 'static,
{
    let war_in_queue = matches!(
        state.db.praesenz_laden(user_id).await,
        Ok(Some(record)) if record.status == PraesenzStatus::InQueue
    );

    if war_in_queue {
        if let Err(e) = state
            .db
            .status_setzen(user_id, PraesenzStatus::Online, None)
            .await
        {
            tracing::error!(user_id = %user_id, fehler = %e, "Queue-Austritt fehlgeschlagen");
            return ControlMessage::error(request_id, ErrorCode::InternalError, "Interner Fehler");
        }
        tracing::info!(user_id = %user_id, "Warteschlange verlassen");
        positionen_verteilen(state, &user_id).await;
    }

    ControlMessage::new(
        request_id,
        ControlPayload::QueueLeft(QueueLeftResponse {
            timestamp: Utc::now(),
        }),
    )
}

/// Schiebt allen verbundenen Wartenden ihre aktuelle Position zu
///
/// Best effort: nicht verbundene Wartende werden uebersprungen, Fehler
/// brechen nichts ab.
pub async fn positionen_verteilen<D>(state: &Arc<SignalingState<D>>, ausser: &UserId)
where
    D: BenutzerRepository + PraesenzRepository + AnrufRepository + 'static,
{
    let wartende = match state.db.alle_in_queue().await {
        Ok(w) => w,
        Err(e) => {
            tracing::warn!(fehler = %e, "Warteschlange nicht lesbar");
            return;
        }
    };

    for (index, record) in wartende.iter().enumerate() {
        if record.user_id == *ausser {
            continue;
        }
        state.registry.senden(
            &record.user_id,
            ControlMessage::event(ControlPayload::QueuePositionUpdate(QueuePositionUpdate {
                position: (index + 1) as i64,
            })),
        );
    }
}
