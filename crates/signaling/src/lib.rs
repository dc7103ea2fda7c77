//! plauder-signaling – Verbindungs-, Warteschlangen- und Anruf-Koordinator
//!
//! Dieser Crate implementiert den Echtzeit-Kern von Plauder: er verwaltet
//! TCP-Verbindungen, authentifiziert sie, vermittelt Warteschlange und
//! Anrufe und leitet WebRTC-Signaling-Nachrichten zwischen den beiden
//! Teilnehmern einer aktiven Sitzung weiter. Audio selbst fliesst nie
//! durch den Server – nur Signaling-Umschlaege.
//!
//! ## Architektur
//!
//! ```text
//! TCP Listener (SignalingServer)
//!     |
//!     v
//! ClientConnection (pro Verbindung ein Task)
//!     |  login -> registriert -> Cleanup bei Disconnect
//!     |
//!     v
//! MessageDispatcher
//!     |
//!     +-- AuthHandler    (login / Zulassungspruefung)
//!     +-- QueueHandler   (join_queue, leave_queue, Positions-Pushes)
//!     +-- CallHandler    (initiate, accept, reject, end, rate)
//!     +-- SignalHandler  (opake Offer/Answer/Candidate-Weiterleitung)
//!
//! ConnectionRegistry – wer ist jetzt erreichbar (ein Handle pro User)
//! CallManager        – State Machine: pending -> active -> completed,
//!                      pending -> missed/rejected; Reverse-Index fuer
//!                      den Disconnect-Sweep
//! ```

pub mod calls;
pub mod connection;
pub mod dispatcher;
pub mod error;
pub mod handlers;
pub mod registry;
pub mod server_state;
pub mod tcp;

// Bequeme Re-Exporte
pub use calls::CallManager;
pub use connection::ClientConnection;
pub use dispatcher::{DispatcherContext, MessageDispatcher};
pub use error::{SignalingError, SignalingResult};
pub use registry::{ClientIdentitaet, ConnectionRegistry};
pub use server_state::{SignalingConfig, SignalingState};
pub use tcp::SignalingServer;
