//! plauder-protocol – Protokoll-Definitionen
//!
//! Definiert die Control-Nachrichten (Warteschlange, Anrufe, Signaling,
//! Praesenz) und das Frame-basierte Wire-Format fuer TCP-Verbindungen.

pub mod control;
pub mod wire;

pub use control::{ControlMessage, ControlPayload, ErrorCode};
pub use wire::FrameCodec;
