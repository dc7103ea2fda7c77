//! Client-Connection – Verwaltet eine einzelne TCP-Verbindung
//!
//! Jede TCP-Verbindung bekommt eine `ClientConnection` in einem eigenen
//! tokio-Task: eine Select-Schleife ueber eingehende Frames, die
//! Registry-Send-Queue, den Keepalive-Timer und das Shutdown-Signal.
//!
//! ## Lebenslauf
//! ```text
//! Verbunden -> login -> registriert (Registry + Praesenz online)
//!     |                     |
//!     +---- Disconnect -----+--> Cleanup (Sitzungen, Praesenz, Broadcast)
//! ```
//!
//! ## Keepalive
//! - Server sendet alle `keepalive_sek` einen Ping
//! - Kommt innerhalb von `verbindungs_timeout_sek` nichts an, wird getrennt
//!
//! ## Verdraengung
//! Meldet sich derselbe Benutzer erneut an, ersetzt die neue Verbindung
//! den Registry-Eintrag. Die Send-Queue der alten Verbindung schliesst
//! sich dadurch; diese Schleife erkennt das und beendet sich, ohne den
//! Zustand des Nachfolgers anzufassen (Generations-Pruefung im Cleanup).

use futures_util::{SinkExt, StreamExt};
use plauder_core::types::PraesenzStatus;
use plauder_db::{AnrufRepository, BenutzerRepository, PraesenzRepository};
use plauder_protocol::control::{
    ControlMessage, ControlPayload, ErrorCode, UserStatusChangeEvent,
};
use plauder_protocol::wire::FrameCodec;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_util::codec::Framed;

use crate::dispatcher::{DispatcherContext, MessageDispatcher};
use crate::server_state::SignalingState;

/// Verarbeitet eine einzelne TCP-Verbindung
///
/// Liest Frames via `FrameCodec`, dispatcht an `MessageDispatcher` und
/// sendet Antworten zurueck. Laeuft in einem eigenen tokio-Task.
pub struct ClientConnection<D>
where
    D: BenutzerRepository + PraesenzRepository + AnrufRepository + 'static,
{
    state: Arc<SignalingState<D>>,
    peer_addr: SocketAddr,
}

impl<D> ClientConnection<D>
where
    D: BenutzerRepository + PraesenzRepository + AnrufRepository + 'static,
{
    /// Erstellt eine neue ClientConnection
    pub fn neu(state: Arc<SignalingState<D>>, peer_addr: SocketAddr) -> Self {
        Self { state, peer_addr }
    }

    /// Startet die Verbindungs-Verarbeitungsschleife
    ///
    /// Laeuft bis die Verbindung getrennt wird, der Client verdraengt
    /// wird oder ein Shutdown-Signal eingeht.
    pub async fn verarbeiten(
        self,
        stream: TcpStream,
        mut shutdown_rx: tokio::sync::watch::Receiver<bool>,
    ) {
        let peer_addr = self.peer_addr;
        let keepalive_intervall = Duration::from_secs(self.state.config.keepalive_sek);
        let timeout_dauer = Duration::from_secs(self.state.config.verbindungs_timeout_sek);

        tracing::info!(peer = %peer_addr, "Neue Verbindung");

        let mut framed = Framed::new(stream, FrameCodec::new());
        let dispatcher = MessageDispatcher::neu(Arc::clone(&self.state));
        let mut ctx = DispatcherContext::neu(peer_addr);

        // Wird nach dem Login gesetzt: Registry-Generation + Empfangs-Queue
        let mut generation: Option<u64> = None;
        let mut sende_rx: Option<mpsc::Receiver<ControlMessage>> = None;
        let mut verdraengt = false;

        let mut letzter_empfang = Instant::now();
        let mut naechster_ping = Instant::now() + keepalive_intervall;
        let mut ping_request_id: u32 = 0;

        loop {
            let jetzt = Instant::now();

            if jetzt.duration_since(letzter_empfang) > timeout_dauer {
                tracing::warn!(peer = %peer_addr, "Verbindungs-Timeout");
                break;
            }

            let ping_verzoegerung = if jetzt < naechster_ping {
                naechster_ping.duration_since(jetzt)
            } else {
                Duration::from_millis(1)
            };

            tokio::select! {
                // Eingehende Nachricht vom Client
                frame = framed.next() => {
                    match frame {
                        Some(Ok(nachricht)) => {
                            letzter_empfang = Instant::now();
                            tracing::trace!(
                                peer = %peer_addr,
                                request_id = nachricht.request_id,
                                "Nachricht empfangen"
                            );

                            if let Some(antwort) = dispatcher.dispatch(nachricht, &mut ctx).await {
                                if let Err(e) = framed.send(antwort).await {
                                    tracing::warn!(
                                        peer = %peer_addr,
                                        fehler = %e,
                                        "Senden fehlgeschlagen"
                                    );
                                    break;
                                }
                            }

                            // Nach erfolgreichem Login: Registry-Eintrag anlegen
                            if generation.is_none() {
                                if let Some(ident) = ctx.identitaet.clone() {
                                    let (gen, rx, alt) =
                                        self.state.registry.registrieren(ident.clone());

                                    // Verdraengten Handle verabschieden; das
                                    // Fallenlassen schliesst dessen Queue und
                                    // beendet den alten Task
                                    if let Some(alter_sender) = alt {
                                        alter_sender.senden(ControlMessage::error(
                                            0,
                                            ErrorCode::AlreadyLoggedIn,
                                            "Verbindung durch neuen Login ersetzt",
                                        ));
                                    }

                                    generation = Some(gen);
                                    sende_rx = Some(rx);

                                    // Praesenz-Broadcast an alle anderen
                                    self.state.registry.an_alle_ausser_senden(
                                        &ident.user_id,
                                        ControlMessage::event(ControlPayload::UserStatusChange(
                                            UserStatusChangeEvent {
                                                user_id: ident.user_id,
                                                status: PraesenzStatus::Online,
                                            },
                                        )),
                                    );
                                }
                            }
                        }
                        Some(Err(e)) => {
                            tracing::warn!(
                                peer = %peer_addr,
                                fehler = %e,
                                "Frame-Lesefehler"
                            );
                            break;
                        }
                        None => {
                            tracing::info!(peer = %peer_addr, "Verbindung vom Client getrennt");
                            break;
                        }
                    }
                }

                // Ausgehende Nachricht aus der Registry-Queue
                ausgehend = empfangen(&mut sende_rx) => {
                    match ausgehend {
                        Some(nachricht) => {
                            if let Err(e) = framed.send(nachricht).await {
                                tracing::warn!(
                                    peer = %peer_addr,
                                    fehler = %e,
                                    "Event-Senden fehlgeschlagen"
                                );
                                break;
                            }
                        }
                        None => {
                            // Queue geschlossen: ein neuer Login desselben
                            // Benutzers hat diesen Handle verdraengt
                            tracing::info!(peer = %peer_addr, "Verbindung verdraengt");
                            verdraengt = true;
                            break;
                        }
                    }
                }

                // Keepalive-Ping
                _ = tokio::time::sleep(ping_verzoegerung) => {
                    if jetzt >= naechster_ping {
                        ping_request_id = ping_request_id.wrapping_add(1);
                        let ts = std::time::SystemTime::now()
                            .duration_since(std::time::UNIX_EPOCH)
                            .unwrap_or_default()
                            .as_millis() as u64;
                        let ping = ControlMessage::ping(ping_request_id, ts);

                        if let Err(e) = framed.send(ping).await {
                            tracing::warn!(
                                peer = %peer_addr,
                                fehler = %e,
                                "Ping-Senden fehlgeschlagen"
                            );
                            break;
                        }
                        naechster_ping = Instant::now() + keepalive_intervall;
                    }
                }

                // Shutdown-Signal
                Ok(()) = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        tracing::info!(peer = %peer_addr, "Shutdown-Signal – Verbindung wird getrennt");
                        let abschied = ControlMessage::error(
                            0,
                            ErrorCode::InternalError,
                            "Server wird heruntergefahren",
                        );
                        let _ = framed.send(abschied).await;
                        break;
                    }
                }
            }
        }

        // Cleanup beim Verbindungsende; verdraengte Tasks lassen den
        // Zustand des Nachfolgers unangetastet
        if let (Some(ident), Some(gen)) = (ctx.identitaet.as_ref(), generation) {
            if !verdraengt {
                dispatcher.client_cleanup(ident, gen).await;
            }
        }

        tracing::info!(peer = %peer_addr, "Verbindungs-Task beendet");
    }
}

/// Wartet auf die naechste ausgehende Nachricht
///
/// Vor dem Login existiert noch keine Queue; dieser Zweig schlaeft dann
/// einfach weiter statt die Select-Schleife zu beschaeftigen.
async fn empfangen(
    sende_rx: &mut Option<mpsc::Receiver<ControlMessage>>,
) -> Option<ControlMessage> {
    match sende_rx.as_mut() {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}
