//! Integration-Tests fuer BenutzerRepository (In-Memory SQLite)

use plauder_core::types::Gender;
use plauder_db::{models::NeuerBenutzer, BenutzerRepository, SqliteDb};

async fn db() -> SqliteDb {
    SqliteDb::in_memory()
        .await
        .expect("In-Memory DB konnte nicht erstellt werden")
}

#[tokio::test]
async fn benutzer_erstellen_und_laden() {
    let db = db().await;

    let user = db
        .benutzer_erstellen(NeuerBenutzer {
            username: "alice",
            gender: Some(Gender::Female),
        })
        .await
        .expect("Benutzer erstellen fehlgeschlagen");

    assert_eq!(user.username, "alice");
    assert_eq!(user.gender, Some(Gender::Female));
    assert!(user.is_active);

    let geladen = db
        .benutzer_laden(user.id)
        .await
        .expect("benutzer_laden fehlgeschlagen")
        .expect("Benutzer sollte gefunden werden");

    assert_eq!(geladen.id, user.id);
    assert_eq!(geladen.username, "alice");
    assert_eq!(geladen.gender, Some(Gender::Female));
}

#[tokio::test]
async fn benutzer_nach_name_laden() {
    let db = db().await;

    db.benutzer_erstellen(NeuerBenutzer {
        username: "bob",
        gender: None,
    })
    .await
    .unwrap();

    let gefunden = db
        .benutzer_laden_nach_name("bob")
        .await
        .unwrap()
        .expect("Benutzer 'bob' sollte gefunden werden");

    assert_eq!(gefunden.username, "bob");
    assert_eq!(gefunden.gender, None);

    let nicht_gefunden = db.benutzer_laden_nach_name("unbekannt").await.unwrap();
    assert!(nicht_gefunden.is_none());
}

#[tokio::test]
async fn benutzer_username_unique() {
    let db = db().await;

    db.benutzer_erstellen(NeuerBenutzer {
        username: "charlie",
        gender: None,
    })
    .await
    .unwrap();

    let err = db
        .benutzer_erstellen(NeuerBenutzer {
            username: "charlie",
            gender: Some(Gender::Male),
        })
        .await;

    assert!(err.is_err());
    assert!(err.unwrap_err().ist_eindeutigkeit());
}
