//! Integration-Tests fuer AnrufRepository (In-Memory SQLite)

use chrono::Utc;
use plauder_core::types::{AnrufStatus, CallId, UserId};
use plauder_db::{
    models::{AnrufUpdate, NeuerAnruf, NeuerBenutzer},
    AnrufRepository, BenutzerRepository, SqliteDb,
};

async fn db() -> SqliteDb {
    SqliteDb::in_memory()
        .await
        .expect("In-Memory DB konnte nicht erstellt werden")
}

async fn benutzer(db: &SqliteDb, name: &str) -> UserId {
    db.benutzer_erstellen(NeuerBenutzer {
        username: name,
        gender: None,
    })
    .await
    .unwrap()
    .id
}

async fn neuer_anruf(db: &SqliteDb) -> (CallId, UserId, UserId) {
    let caller = benutzer(db, &format!("caller_{}", uuid::Uuid::new_v4())).await;
    let receiver = benutzer(db, &format!("receiver_{}", uuid::Uuid::new_v4())).await;
    let id = CallId::new();

    db.anruf_erstellen(NeuerAnruf {
        id,
        caller_id: caller,
        receiver_id: receiver,
        start_time: Utc::now(),
    })
    .await
    .expect("Anruf erstellen fehlgeschlagen");

    (id, caller, receiver)
}

#[tokio::test]
async fn anruf_erstellen_und_laden() {
    let db = db().await;
    let (id, caller, receiver) = neuer_anruf(&db).await;

    let geladen = db.anruf_laden(id).await.unwrap().unwrap();
    assert_eq!(geladen.id, id);
    assert_eq!(geladen.caller_id, caller);
    assert_eq!(geladen.receiver_id, receiver);
    assert_eq!(geladen.status, AnrufStatus::Pending);
    assert_eq!(geladen.duration_secs, 0);
    assert!(geladen.end_time.is_none());
    assert!(geladen.caller_rating.is_none());
}

#[tokio::test]
async fn anruf_status_wechsel_persistiert() {
    let db = db().await;
    let (id, _, _) = neuer_anruf(&db).await;

    let jetzt = Utc::now();
    let aktualisiert = db
        .anruf_aktualisieren(
            id,
            AnrufUpdate {
                status: Some(AnrufStatus::Active),
                start_time: Some(jetzt),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    assert_eq!(aktualisiert.status, AnrufStatus::Active);

    let beendet = db
        .anruf_aktualisieren(
            id,
            AnrufUpdate {
                status: Some(AnrufStatus::Completed),
                end_time: Some(Utc::now()),
                duration_secs: Some(42),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    assert_eq!(beendet.status, AnrufStatus::Completed);
    assert_eq!(beendet.duration_secs, 42);
    assert!(beendet.end_time.is_some());
}

#[tokio::test]
async fn bewertungen_pro_seite_getrennt() {
    let db = db().await;
    let (id, _, _) = neuer_anruf(&db).await;

    db.anruf_aktualisieren(
        id,
        AnrufUpdate {
            caller_rating: Some(5),
            ..Default::default()
        },
    )
    .await
    .unwrap();

    let record = db.anruf_laden(id).await.unwrap().unwrap();
    assert_eq!(record.caller_rating, Some(5));
    assert_eq!(record.receiver_rating, None);

    // Zweite Bewertung derselben Seite ueberschreibt (last write wins)
    db.anruf_aktualisieren(
        id,
        AnrufUpdate {
            caller_rating: Some(2),
            ..Default::default()
        },
    )
    .await
    .unwrap();

    let record = db.anruf_laden(id).await.unwrap().unwrap();
    assert_eq!(record.caller_rating, Some(2));
}

#[tokio::test]
async fn update_unbekannter_anruf_schlaegt_fehl() {
    let db = db().await;

    let err = db
        .anruf_aktualisieren(
            CallId::new(),
            AnrufUpdate {
                status: Some(AnrufStatus::Completed),
                ..Default::default()
            },
        )
        .await;

    assert!(err.is_err());
}

#[tokio::test]
async fn leeres_update_laedt_bestehenden_datensatz() {
    let db = db().await;
    let (id, _, _) = neuer_anruf(&db).await;

    let record = db
        .anruf_aktualisieren(id, AnrufUpdate::default())
        .await
        .unwrap();
    assert_eq!(record.id, id);
    assert_eq!(record.status, AnrufStatus::Pending);
}
