//! Auth-Service – Zulassungspruefung fuer neue Signaling-Verbindungen
//!
//! Validiert Zugangs-Tokens und laedt den zugehoerigen Benutzer.
//! Schlaegt die Pruefung fehl, wird die Verbindung abgewiesen bevor
//! irgendein Zustand angelegt wird (fail closed).

use std::sync::Arc;

use plauder_db::models::BenutzerRecord;
use plauder_db::BenutzerRepository;

use plauder_core::types::UserId;

use crate::error::{AuthError, AuthResult};
use crate::token::{TokenStore, ZugangsToken};

/// Auth-Service fuer den Signaling-Server
///
/// Generisch ueber das Benutzer-Repository, damit Tests eine
/// In-Memory-Datenbank verwenden koennen.
pub struct AuthService<B>
where
    B: BenutzerRepository + 'static,
{
    db: Arc<B>,
    tokens: Arc<TokenStore>,
}

impl<B> AuthService<B>
where
    B: BenutzerRepository + 'static,
{
    /// Erstellt einen neuen AuthService
    pub fn neu(db: Arc<B>, tokens: Arc<TokenStore>) -> Arc<Self> {
        Arc::new(Self { db, tokens })
    }

    /// Stellt ein Token fuer einen bestehenden Benutzer aus
    ///
    /// Gehoert fachlich zum REST-Layer; hier als Kollaborateur-Oberflaeche
    /// fuer Tests und Tools vorhanden.
    pub async fn anmelden(&self, user_id: UserId) -> AuthResult<ZugangsToken> {
        let benutzer = self
            .db
            .benutzer_laden(user_id)
            .await?
            .ok_or(AuthError::BenutzerNichtGefunden)?;

        if !benutzer.is_active {
            return Err(AuthError::BenutzerInaktiv);
        }

        Ok(self.tokens.erstellen(user_id).await)
    }

    /// Validiert ein Token und laedt den Benutzer
    ///
    /// Die Zulassungspruefung des Admission Gate: ungueltige oder
    /// abgelaufene Tokens sowie deaktivierte Benutzer werden abgewiesen.
    pub async fn validieren(&self, token: &str) -> AuthResult<(BenutzerRecord, ZugangsToken)> {
        let eintrag = self.tokens.validieren(token).await?;

        let benutzer = self
            .db
            .benutzer_laden(eintrag.user_id)
            .await?
            .ok_or(AuthError::BenutzerNichtGefunden)?;

        if !benutzer.is_active {
            return Err(AuthError::BenutzerInaktiv);
        }

        Ok((benutzer, eintrag))
    }

    /// Invalidiert ein Token (sauberer Logout)
    pub async fn abmelden(&self, token: &str) {
        self.tokens.invalidieren(token).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use plauder_db::models::NeuerBenutzer;
    use plauder_db::SqliteDb;

    async fn service() -> (Arc<AuthService<SqliteDb>>, Arc<SqliteDb>) {
        let db = Arc::new(SqliteDb::in_memory().await.unwrap());
        let service = AuthService::neu(Arc::clone(&db), TokenStore::neu());
        (service, db)
    }

    #[tokio::test]
    async fn validierung_mit_gueltigem_token() {
        let (service, db) = service().await;
        let benutzer = db
            .benutzer_erstellen(NeuerBenutzer {
                username: "alice",
                gender: None,
            })
            .await
            .unwrap();

        let token = service.anmelden(benutzer.id).await.unwrap();
        let (geladen, _) = service.validieren(&token.token).await.unwrap();
        assert_eq!(geladen.id, benutzer.id);
        assert_eq!(geladen.username, "alice");
    }

    #[tokio::test]
    async fn anmeldung_unbekannter_benutzer_schlaegt_fehl() {
        let (service, _db) = service().await;
        let err = service.anmelden(UserId::new()).await;
        assert!(matches!(err, Err(AuthError::BenutzerNichtGefunden)));
    }

    #[tokio::test]
    async fn validierung_nach_abmeldung_schlaegt_fehl() {
        let (service, db) = service().await;
        let benutzer = db
            .benutzer_erstellen(NeuerBenutzer {
                username: "bob",
                gender: None,
            })
            .await
            .unwrap();

        let token = service.anmelden(benutzer.id).await.unwrap();
        service.abmelden(&token.token).await;

        let err = service.validieren(&token.token).await;
        assert!(matches!(err, Err(AuthError::TokenUngueltig)));
    }
}
