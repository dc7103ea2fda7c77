//! Token-Store fuer den Signaling-Zugang
//!
//! Tokens werden vom (hier ausgeklammerten) REST-Layer nach dem Login
//! ausgestellt und vom Signaling-Server nur noch validiert. Der Store
//! haelt sie im Speicher (HashMap mit TTL); ein Hintergrund-Task
//! bereinigt abgelaufene Eintraege automatisch.

use std::{collections::HashMap, sync::Arc, time::Duration};

use chrono::{DateTime, Utc};
use rand::Rng;
use tokio::sync::RwLock;

use plauder_core::types::UserId;

use crate::error::{AuthError, AuthResult};

/// Standard-Token-Lebensdauer: 24 Stunden
const TOKEN_TTL_SEKUNDEN: i64 = 24 * 60 * 60;

/// Intervall fuer den automatischen Cleanup-Task: 15 Minuten
const CLEANUP_INTERVALL: Duration = Duration::from_secs(15 * 60);

/// Ein aktives Zugangs-Token
#[derive(Debug, Clone)]
pub struct ZugangsToken {
    /// Der Token-String (URL-sicheres Base64)
    pub token: String,
    /// ID des Benutzers dem dieses Token gehoert
    pub user_id: UserId,
    /// Zeitpunkt der Ausstellung
    pub erstellt_am: DateTime<Utc>,
    /// Zeitpunkt des Ablaufs
    pub laeuft_ab_am: DateTime<Utc>,
}

impl ZugangsToken {
    /// Gibt `true` zurueck wenn das Token noch gueltig ist
    pub fn ist_gueltig(&self) -> bool {
        Utc::now() < self.laeuft_ab_am
    }
}

/// In-Memory Token-Store mit TTL-Unterstuetzung
#[derive(Debug, Default)]
pub struct TokenStore {
    /// token -> ZugangsToken
    tokens: RwLock<HashMap<String, ZugangsToken>>,
}

impl TokenStore {
    /// Erstellt einen neuen leeren Token-Store
    pub fn neu() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Startet den Cleanup-Task fuer einen bestehenden Store
    pub fn mit_cleanup(store: Arc<Self>) -> Arc<Self> {
        let store_klon = Arc::clone(&store);
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(CLEANUP_INTERVALL).await;
                let entfernt = store_klon.cleanup_abgelaufene().await;
                if entfernt > 0 {
                    tracing::debug!(anzahl = entfernt, "Abgelaufene Tokens bereinigt");
                }
            }
        });
        store
    }

    /// Stellt ein neues Token fuer den angegebenen Benutzer aus
    pub async fn erstellen(&self, user_id: UserId) -> ZugangsToken {
        let token = token_generieren();
        let jetzt = Utc::now();
        let eintrag = ZugangsToken {
            token: token.clone(),
            user_id,
            erstellt_am: jetzt,
            laeuft_ab_am: jetzt + chrono::Duration::seconds(TOKEN_TTL_SEKUNDEN),
        };

        self.tokens.write().await.insert(token, eintrag.clone());
        tracing::debug!(user_id = %user_id, "Neues Zugangs-Token ausgestellt");
        eintrag
    }

    /// Validiert ein Token und gibt den Eintrag zurueck
    ///
    /// Gibt `AuthError::TokenUngueltig` zurueck wenn das Token unbekannt ist,
    /// `AuthError::TokenAbgelaufen` wenn die TTL ueberschritten wurde.
    pub async fn validieren(&self, token: &str) -> AuthResult<ZugangsToken> {
        let tokens = self.tokens.read().await;
        match tokens.get(token) {
            None => Err(AuthError::TokenUngueltig),
            Some(t) if !t.ist_gueltig() => Err(AuthError::TokenAbgelaufen),
            Some(t) => Ok(t.clone()),
        }
    }

    /// Invalidiert (loescht) ein Token
    pub async fn invalidieren(&self, token: &str) {
        self.tokens.write().await.remove(token);
        tracing::debug!("Token invalidiert");
    }

    /// Invalidiert alle Tokens eines Benutzers
    pub async fn alle_invalidieren(&self, user_id: UserId) -> usize {
        let mut tokens = self.tokens.write().await;
        let vorher = tokens.len();
        tokens.retain(|_, t| t.user_id != user_id);
        let entfernt = vorher - tokens.len();
        if entfernt > 0 {
            tracing::debug!(user_id = %user_id, anzahl = entfernt, "Alle Benutzer-Tokens invalidiert");
        }
        entfernt
    }

    /// Bereinigt abgelaufene Tokens und gibt die Anzahl der entfernten zurueck
    pub async fn cleanup_abgelaufene(&self) -> usize {
        let jetzt = Utc::now();
        let mut tokens = self.tokens.write().await;
        let vorher = tokens.len();
        tokens.retain(|_, t| t.laeuft_ab_am > jetzt);
        vorher - tokens.len()
    }

    /// Gibt die Anzahl der aktiven (nicht abgelaufenen) Tokens zurueck
    pub async fn anzahl_aktive(&self) -> usize {
        let jetzt = Utc::now();
        let tokens = self.tokens.read().await;
        tokens.values().filter(|t| t.laeuft_ab_am > jetzt).count()
    }
}

/// Generiert ein kryptografisch sicheres Token (URL-sicheres Base64)
fn token_generieren() -> String {
    let mut bytes = [0u8; 32];
    rand::rng().fill_bytes(&mut bytes);
    base64::Engine::encode(&base64::engine::general_purpose::URL_SAFE_NO_PAD, bytes)
}
