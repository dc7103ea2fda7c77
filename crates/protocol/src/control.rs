//! Control-Protokoll (TCP)
//!
//! Definiert alle Steuerungsnachrichten die ueber die TCP-Verbindung
//! zwischen Client und Server ausgetauscht werden.
//!
//! ## Design
//! - Request/Response Pattern: jede Nachricht hat eine `request_id: u32`
//! - JSON-Serialisierung via serde (TCP, nicht zeitkritisch)
//! - Tagged Enums fuer typsichere Nachrichtentypen
//! - Signal-Payloads (SDP/ICE) bleiben opake `serde_json::Value`s –
//!   der Server interpretiert sie nie, er leitet sie nur weiter

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use plauder_core::types::{CallId, Gender, GenderPraeferenz, PraesenzStatus, ServerId, Stimmung, UserId};

// ---------------------------------------------------------------------------
// Fehler-Codes
// ---------------------------------------------------------------------------

/// Standardisierte Fehler-Codes fuer Error-Responses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // Allgemein
    InternalError,
    InvalidRequest,
    NotFound,
    ServerFull,
    // Auth
    AuthFailed,
    SessionExpired,
    AlreadyLoggedIn,
    // Warteschlange
    AlreadyInQueue,
    AlreadyInCall,
    // Anrufe
    PeerUnreachable,
    PeerGone,
    NotAuthorized,
    NotParticipant,
    StateConflict,
    InvalidSession,
    InvalidRating,
    InvalidTarget,
}

// ---------------------------------------------------------------------------
// Auth-Nachrichten
// ---------------------------------------------------------------------------

/// Login-Anfrage vom Client
///
/// Das Token wird extern (REST-Layer) ausgestellt; der Signaling-Server
/// validiert es nur. Ohne gueltiges Token wird nichts registriert.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginRequest {
    /// Opakes Auth-Token
    pub token: String,
    /// Client-Version fuer Kompatibilitaetspruefung
    pub client_version: Option<String>,
}

/// Erfolgreiche Login-Antwort
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginResponse {
    pub user_id: UserId,
    pub username: String,
    /// Eigenes Profil-Gender (geht in incoming_call-Events an Gegenseiten)
    pub gender: Option<Gender>,
    pub server_id: ServerId,
    /// Ablaufzeit des Tokens (Unix-Timestamp in Sekunden)
    pub expires_at: u64,
}

// ---------------------------------------------------------------------------
// Warteschlangen-Nachrichten
// ---------------------------------------------------------------------------

/// Warteschlange betreten
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JoinQueueRequest {
    pub mood: Stimmung,
    #[serde(default)]
    pub gender_preference: GenderPraeferenz,
}

/// Bestaetigung des Warteschlangen-Beitritts
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueJoinedResponse {
    pub timestamp: DateTime<Utc>,
    /// Position in der Warteschlange (1-basiert, rein informativ)
    pub position: i64,
}

/// Bestaetigung des Warteschlangen-Austritts
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueLeftResponse {
    pub timestamp: DateTime<Utc>,
}

/// Positions-Update fuer wartende Clients (best-effort Push)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueuePositionUpdate {
    pub position: i64,
}

// ---------------------------------------------------------------------------
// Anruf-Nachrichten
// ---------------------------------------------------------------------------

/// Oeffentliche Identitaet eines Gespraechspartners
///
/// `gender` ist nur im `incoming_call`-Event gesetzt, damit der
/// Angerufene den Anrufer einordnen kann.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeerInfo {
    pub id: UserId,
    pub username: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gender: Option<Gender>,
}

/// Anruf initiieren
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InitiateCallRequest {
    pub receiver_id: UserId,
}

/// Bestaetigung an den Anrufer: Anfrage wurde zugestellt
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallInitiatedResponse {
    pub call_id: CallId,
    pub receiver: PeerInfo,
}

/// Eingehender Anruf beim Angerufenen
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IncomingCallEvent {
    pub call_id: CallId,
    pub caller: PeerInfo,
}

/// Anruf annehmen
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AcceptCallRequest {
    pub call_id: CallId,
}

/// An den Anrufer: Gegenseite hat angenommen
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallAcceptedEvent {
    pub call_id: CallId,
    pub receiver: PeerInfo,
}

/// An den Annehmenden: Anruf ist jetzt aktiv
///
/// Bewusst ein anderer Event-Typ als `call_accepted` – beide Seiten
/// treiben damit ihre eigene UI-State-Machine ohne Raten.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallConnectedEvent {
    pub call_id: CallId,
    pub caller: PeerInfo,
}

/// Anruf ablehnen
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RejectCallRequest {
    pub call_id: CallId,
}

/// An den Anrufer: Gegenseite hat abgelehnt
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallRejectedEvent {
    pub call_id: CallId,
    pub receiver: PeerInfo,
}

/// WebRTC-Signaling-Nachricht (Offer/Answer/ICE-Candidate)
///
/// Wird in beide Richtungen verwendet: eingehend traegt sie `to`
/// (Empfaenger), beim Weiterleiten stempelt der Server `from`.
/// Der `signal`-Inhalt ist fuer den Server opak.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalMessage {
    pub call_id: CallId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub to: Option<UserId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from: Option<UserId>,
    pub signal: serde_json::Value,
}

/// Anruf beenden
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndCallRequest {
    pub call_id: CallId,
}

/// Grund fuer ein Anruf-Ende (nur gesetzt wenn nicht regulaer aufgelegt)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BeendigungsGrund {
    /// Die Gegenseite hat die Verbindung verloren (kein bewusstes Auflegen)
    ParticipantDisconnected,
    /// Der Anrufer hat waehrend des Klingelns aufgelegt
    Cancelled,
}

/// Anruf-Ende-Benachrichtigung (an beide Seiten)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallEndedEvent {
    pub call_id: CallId,
    /// Gespraechsdauer in Sekunden (0 wenn der Anruf nie aktiv war)
    pub duration: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<BeendigungsGrund>,
}

/// Anruf bewerten
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateCallRequest {
    pub call_id: CallId,
    pub rating: i64,
}

/// Bewertung angenommen
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RatingSubmittedResponse {
    pub call_id: CallId,
}

// ---------------------------------------------------------------------------
// Praesenz
// ---------------------------------------------------------------------------

/// Status-Aenderung eines anderen Benutzers (Broadcast, best-effort)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserStatusChangeEvent {
    pub user_id: UserId,
    pub status: PraesenzStatus,
}

// ---------------------------------------------------------------------------
// Keepalive
// ---------------------------------------------------------------------------

/// Ping (Client -> Server oder Server -> Client)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PingMessage {
    /// Unix-Timestamp in Millisekunden fuer RTT-Messung
    pub timestamp_ms: u64,
}

/// Pong-Antwort (spiegelt Timestamp zurueck)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PongMessage {
    /// Originaler Timestamp aus dem Ping
    pub echo_timestamp_ms: u64,
    /// Server-eigener Timestamp
    pub server_timestamp_ms: u64,
}

// ---------------------------------------------------------------------------
// Haupt-Enum: ControlPayload
// ---------------------------------------------------------------------------

/// Alle moeglichen Control-Nachrichten (typsicher via Tagged Enum)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ControlPayload {
    // Auth
    Login(LoginRequest),
    LoginResponse(LoginResponse),

    // Warteschlange
    JoinQueue(JoinQueueRequest),
    QueueJoined(QueueJoinedResponse),
    LeaveQueue,
    QueueLeft(QueueLeftResponse),
    QueuePositionUpdate(QueuePositionUpdate),

    // Anrufe
    InitiateCall(InitiateCallRequest),
    CallInitiated(CallInitiatedResponse),
    IncomingCall(IncomingCallEvent),
    AcceptCall(AcceptCallRequest),
    CallAccepted(CallAcceptedEvent),
    CallConnected(CallConnectedEvent),
    RejectCall(RejectCallRequest),
    CallRejected(CallRejectedEvent),
    Signal(SignalMessage),
    EndCall(EndCallRequest),
    CallEnded(CallEndedEvent),
    RateCall(RateCallRequest),
    RatingSubmitted(RatingSubmittedResponse),
    RatingError(ErrorResponse),

    // Praesenz
    UserStatusChange(UserStatusChangeEvent),

    // Keepalive
    Ping(PingMessage),
    Pong(PongMessage),

    // Fehler
    CallError(ErrorResponse),
    Error(ErrorResponse),
}

/// Standardisierte Fehler-Antwort
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub code: ErrorCode,
    pub message: String,
}

// ---------------------------------------------------------------------------
// Control-Frame (Umschlag fuer alle Nachrichten)
// ---------------------------------------------------------------------------

/// Control-Protokoll-Nachricht mit Request/Response-Zuordnung
///
/// Jede Nachricht traegt eine `request_id` die der Client vergibt.
/// Der Server kopiert die ID in die Antwort damit der Client
/// Request und Response zuordnen kann. Server-initiierte Events
/// (incoming_call, signal, user_status_change) tragen request_id 0.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControlMessage {
    /// Eindeutige Nachrichten-ID fuer Request/Response-Zuordnung
    pub request_id: u32,
    /// Inhalt der Nachricht
    pub payload: ControlPayload,
}

impl ControlMessage {
    /// Erstellt eine neue Control-Nachricht
    pub fn new(request_id: u32, payload: ControlPayload) -> Self {
        Self {
            request_id,
            payload,
        }
    }

    /// Erstellt ein Server-Event (request_id 0, nicht anfragegebunden)
    pub fn event(payload: ControlPayload) -> Self {
        Self::new(0, payload)
    }

    /// Erstellt eine Ping-Nachricht
    pub fn ping(request_id: u32, timestamp_ms: u64) -> Self {
        Self::new(
            request_id,
            ControlPayload::Ping(PingMessage { timestamp_ms }),
        )
    }

    /// Erstellt eine Pong-Antwort
    pub fn pong(request_id: u32, echo_timestamp_ms: u64, server_timestamp_ms: u64) -> Self {
        Self::new(
            request_id,
            ControlPayload::Pong(PongMessage {
                echo_timestamp_ms,
                server_timestamp_ms,
            }),
        )
    }

    /// Erstellt eine generische Fehler-Antwort
    pub fn error(request_id: u32, code: ErrorCode, message: impl Into<String>) -> Self {
        Self::new(
            request_id,
            ControlPayload::Error(ErrorResponse {
                code,
                message: message.into(),
            }),
        )
    }

    /// Erstellt eine Anruf-Fehler-Antwort (`call_error`)
    pub fn call_error(request_id: u32, code: ErrorCode, message: impl Into<String>) -> Self {
        Self::new(
            request_id,
            ControlPayload::CallError(ErrorResponse {
                code,
                message: message.into(),
            }),
        )
    }

    /// Erstellt eine Bewertungs-Fehler-Antwort (`rating_error`)
    pub fn rating_error(request_id: u32, code: ErrorCode, message: impl Into<String>) -> Self {
        Self::new(
            request_id,
            ControlPayload::RatingError(ErrorResponse {
                code,
                message: message.into(),
            }),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tagged_enum_wire_format() {
        let msg = ControlMessage::new(
            7,
            ControlPayload::JoinQueue(JoinQueueRequest {
                mood: Stimmung::Lonely,
                gender_preference: GenderPraeferenz::Any,
            }),
        );

        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains("\"type\":\"join_queue\""));
        assert!(json.contains("\"mood\":\"lonely\""));
        assert!(json.contains("\"request_id\":7"));
    }

    #[test]
    fn signal_richtungsfelder_optional() {
        // Eingehend: nur `to` gesetzt
        let eingehend = SignalMessage {
            call_id: CallId::new(),
            to: Some(UserId::new()),
            from: None,
            signal: serde_json::json!({"sdp": "v=0..."}),
        };
        let json = serde_json::to_string(&eingehend).unwrap();
        assert!(json.contains("\"to\""));
        assert!(!json.contains("\"from\""));

        // Weitergeleitet: Server stempelt `from`
        let weitergeleitet = SignalMessage {
            from: Some(UserId::new()),
            to: None,
            ..eingehend
        };
        let json = serde_json::to_string(&weitergeleitet).unwrap();
        assert!(json.contains("\"from\""));
    }

    #[test]
    fn error_helper() {
        let msg = ControlMessage::error(3, ErrorCode::PeerUnreachable, "Benutzer nicht online");
        assert_eq!(msg.request_id, 3);
        match msg.payload {
            ControlPayload::Error(e) => {
                assert_eq!(e.code, ErrorCode::PeerUnreachable);
            }
            _ => panic!("Error-Payload erwartet"),
        }
    }

    #[test]
    fn join_queue_ohne_praeferenz_nutzt_any() {
        let json = r#"{"request_id":1,"payload":{"type":"join_queue","mood":"happy"}}"#;
        let msg: ControlMessage = serde_json::from_str(json).unwrap();
        match msg.payload {
            ControlPayload::JoinQueue(req) => {
                assert_eq!(req.gender_preference, GenderPraeferenz::Any);
            }
            _ => panic!("JoinQueue erwartet"),
        }
    }

    #[test]
    fn call_ended_reason_wire_format() {
        let ev = CallEndedEvent {
            call_id: CallId::new(),
            duration: 30,
            reason: Some(BeendigungsGrund::ParticipantDisconnected),
        };
        let json = serde_json::to_string(&ev).unwrap();
        assert!(json.contains("\"reason\":\"participant_disconnected\""));

        let ohne = CallEndedEvent { reason: None, ..ev };
        let json = serde_json::to_string(&ohne).unwrap();
        assert!(!json.contains("reason"));
    }

    #[test]
    fn payload_round_trip() {
        let original = ControlMessage::event(ControlPayload::UserStatusChange(
            UserStatusChangeEvent {
                user_id: UserId::new(),
                status: PraesenzStatus::InCall,
            },
        ));
        let json = serde_json::to_string(&original).unwrap();
        let decoded: ControlMessage = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded.request_id, 0);
        assert!(matches!(
            decoded.payload,
            ControlPayload::UserStatusChange(_)
        ));
    }
}
