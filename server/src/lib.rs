//! plauder-server – Bibliotheks-Root
//!
//! Deklariert die Server-Module und verdrahtet beim Start alle
//! Subsysteme: Datenbank, Token-Store, Signaling-State und TCP-Listener.

pub mod config;

use std::sync::Arc;

use anyhow::{Context, Result};
use plauder_auth::{AuthService, TokenStore};
use plauder_db::{DatabaseConfig, PraesenzRepository, SqliteDb};
use plauder_signaling::{SignalingConfig, SignalingServer, SignalingState};

use config::ServerConfig;

/// Haelt den laufenden Server-Zustand zusammen
pub struct Server {
    pub config: ServerConfig,
}

impl Server {
    /// Erstellt einen neuen Server aus der gegebenen Konfiguration
    pub fn neu(config: ServerConfig) -> Self {
        Self { config }
    }

    /// Startet alle Server-Subsysteme und laeuft bis zum Shutdown-Signal
    ///
    /// Reihenfolge:
    /// 1. Datenbankverbindung herstellen, Migrationen ausfuehren
    /// 2. Praesenz-Sweep: Geister-Eintraege des letzten Laufs auf offline
    /// 3. Token-Store und Auth-Service aufbauen
    /// 4. TCP-Listener starten (Signaling-Protokoll)
    /// 5. Auf Ctrl-C warten und Verbindungen sauber trennen
    pub async fn starten(self) -> Result<()> {
        tracing::info!(
            server_name = %self.config.server.name,
            tcp = %self.config.tcp_bind_adresse(),
            "Server startet"
        );

        // Datenbank
        let db_config = DatabaseConfig {
            url: self.config.datenbank.url.clone(),
            max_verbindungen: self.config.datenbank.max_verbindungen,
            sqlite_wal: self.config.datenbank.wal,
        };
        let db = Arc::new(
            SqliteDb::oeffnen(&db_config)
                .await
                .context("Datenbankverbindung fehlgeschlagen")?,
        );

        // Nach einem Neustart existiert die Registry nicht mehr; der
        // Praesenz-Store darf keine in_call/in_queue-Geister behalten
        let bereinigt = db.alle_offline_setzen().await?;
        if bereinigt > 0 {
            tracing::info!(anzahl = bereinigt, "Veraltete Praesenz-Eintraege bereinigt");
        }

        // Auth
        let tokens = TokenStore::mit_cleanup(TokenStore::neu());
        let auth_service = AuthService::neu(Arc::clone(&db), tokens);

        // Signaling-State
        let signaling_config = SignalingConfig {
            server_name: self.config.server.name.clone(),
            max_clients: self.config.server.max_clients,
            keepalive_sek: self.config.signaling.keepalive_sek,
            verbindungs_timeout_sek: self.config.signaling.verbindungs_timeout_sek,
            ..Default::default()
        };
        let state = SignalingState::neu(signaling_config, auth_service, Arc::clone(&db));

        // Shutdown-Signal (Ctrl-C -> watch-Kanal an alle Tasks)
        let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
        tokio::spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => {
                    tracing::info!("Shutdown-Signal empfangen, Server wird beendet");
                    let _ = shutdown_tx.send(true);
                }
                Err(e) => {
                    tracing::error!(fehler = %e, "Ctrl-C-Handler fehlgeschlagen");
                }
            }
        });

        // TCP-Listener (laeuft bis zum Shutdown)
        let bind_addr = self
            .config
            .tcp_bind_adresse()
            .parse()
            .with_context(|| format!("Ungueltige Bind-Adresse '{}'", self.config.tcp_bind_adresse()))?;
        let server = SignalingServer::neu(state, bind_addr);
        server.starten(shutdown_rx).await?;

        tracing::info!("Server beendet");
        Ok(())
    }
}
