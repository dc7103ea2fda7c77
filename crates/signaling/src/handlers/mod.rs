//! Handler fuer alle Control-Nachrichten
//!
//! Jeder Handler ist fuer einen bestimmten Nachrichtentyp zustaendig
//! und hat Zugriff auf den gemeinsamen SignalingState. Handler sind
//! freie Funktionen ueber (aktueller Zustand, Nachricht) und geben die
//! Antwort-Nachricht zurueck – so bleibt die State Machine ohne
//! laufenden Transport testbar.

pub mod auth_handler;
pub mod call_handler;
pub mod queue_handler;
pub mod signal_handler;
