//! Gemeinsamer Server-Zustand fuer den Signaling-Service
//!
//! Haelt alle geteilten Services und Zustands-Manager als Arc-Referenzen,
//! die sicher zwischen tokio-Tasks geteilt werden koennen. Kein Zustand
//! lebt als Prozess-Global; alles wird beim Serverstart konstruiert und
//! hier injiziert.

use plauder_auth::AuthService;
use plauder_core::types::ServerId;
use plauder_db::{AnrufRepository, BenutzerRepository, PraesenzRepository};
use std::sync::Arc;
use std::time::Instant;

use crate::calls::CallManager;
use crate::registry::ConnectionRegistry;

/// Konfiguration fuer den Signaling-Service
#[derive(Debug, Clone)]
pub struct SignalingConfig {
    /// Server-ID (unveraenderlich nach dem Start)
    pub server_id: ServerId,
    /// Anzeigename des Servers
    pub server_name: String,
    /// Maximale gleichzeitige Clients
    pub max_clients: u32,
    /// Keepalive-Intervall in Sekunden
    pub keepalive_sek: u64,
    /// Timeout fuer inaktive Verbindungen in Sekunden
    pub verbindungs_timeout_sek: u64,
}

impl Default for SignalingConfig {
    fn default() -> Self {
        Self {
            server_id: ServerId::new(),
            server_name: "Plauder Server".to_string(),
            max_clients: 512,
            keepalive_sek: 30,
            verbindungs_timeout_sek: 90,
        }
    }
}

/// Gemeinsamer Server-Zustand (thread-safe, Arc-geteilt)
pub struct SignalingState<D>
where
    D: BenutzerRepository + PraesenzRepository + AnrufRepository + 'static,
{
    /// Server-Konfiguration
    pub config: Arc<SignalingConfig>,
    /// Auth-Service (Token-Validierung fuer das Admission Gate)
    pub auth_service: Arc<AuthService<D>>,
    /// Datenbank-Zugriff (Benutzer, Praesenz, Anrufe)
    pub db: Arc<D>,
    /// Registry der lebenden Transport-Handles
    pub registry: ConnectionRegistry,
    /// Anruf-Sitzungs-Verwaltung (Kern-State-Machine)
    pub anrufe: CallManager<D>,
    /// Startzeitpunkt des Servers (fuer Uptime-Berechnung)
    pub start_time: Instant,
}

impl<D> SignalingState<D>
where
    D: BenutzerRepository + PraesenzRepository + AnrufRepository + 'static,
{
    /// Erstellt einen neuen SignalingState
    pub fn neu(
        config: SignalingConfig,
        auth_service: Arc<AuthService<D>>,
        db: Arc<D>,
    ) -> Arc<Self> {
        let registry = ConnectionRegistry::neu();
        let anrufe = CallManager::neu(registry.clone(), Arc::clone(&db));

        Arc::new(Self {
            config: Arc::new(config),
            auth_service,
            db,
            registry,
            anrufe,
            start_time: Instant::now(),
        })
    }

    /// Gibt die Uptime in Sekunden zurueck
    pub fn uptime_sek(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}
