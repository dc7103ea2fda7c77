//! Integration-Tests fuer den kompletten Anruf-Fluss
//!
//! Treibt den MessageDispatcher direkt (ohne TCP) gegen eine In-Memory-
//! Datenbank: Login, Warteschlange, Anruf-Lebenszyklus, Signaling-Relay,
//! Bewertung und Disconnect-Verhalten.

use std::net::SocketAddr;
use std::sync::Arc;

use plauder_auth::{AuthService, TokenStore};
use plauder_core::types::{PraesenzStatus, UserId};
use plauder_db::models::NeuerBenutzer;
use plauder_db::{BenutzerRepository, PraesenzRepository, SqliteDb};
use plauder_protocol::control::{
    AcceptCallRequest, ControlMessage, ControlPayload, EndCallRequest, ErrorCode,
    InitiateCallRequest, JoinQueueRequest, LoginRequest, RateCallRequest, SignalMessage,
};
use plauder_signaling::{
    DispatcherContext, MessageDispatcher, SignalingConfig, SignalingState,
};
use plauder_core::types::{CallId, GenderPraeferenz, Stimmung};
use tokio::sync::mpsc;

type TestState = Arc<SignalingState<SqliteDb>>;

struct TestUmgebung {
    state: TestState,
    dispatcher: MessageDispatcher<SqliteDb>,
    db: Arc<SqliteDb>,
}

struct TestVerbindung {
    user_id: UserId,
    ctx: DispatcherContext,
    generation: u64,
    rx: mpsc::Receiver<ControlMessage>,
    request_id: u32,
}

fn test_addr() -> SocketAddr {
    "127.0.0.1:0".parse().expect("gueltige Testadresse")
}

impl TestUmgebung {
    async fn neu() -> Self {
        let db = Arc::new(SqliteDb::in_memory().await.unwrap());
        let auth = AuthService::neu(Arc::clone(&db), TokenStore::neu());
        let state = SignalingState::neu(SignalingConfig::default(), auth, Arc::clone(&db));
        let dispatcher = MessageDispatcher::neu(Arc::clone(&state));
        Self {
            state,
            dispatcher,
            db,
        }
    }

    /// Simuliert den Verbindungsaufbau: Benutzer anlegen, Token holen,
    /// Login dispatchen und den Registry-Eintrag anlegen (das macht sonst
    /// der Verbindungs-Task nach dem Login).
    async fn verbinden(&self, name: &str) -> TestVerbindung {
        let benutzer = self
            .db
            .benutzer_erstellen(NeuerBenutzer {
                username: name,
                gender: None,
            })
            .await
            .unwrap();
        let token = self
            .state
            .auth_service
            .anmelden(benutzer.id)
            .await
            .unwrap();

        let mut ctx = DispatcherContext::neu(test_addr());
        let antwort = self
            .dispatcher
            .dispatch(
                ControlMessage::new(
                    1,
                    ControlPayload::Login(LoginRequest {
                        token: token.token,
                        client_version: None,
                    }),
                ),
                &mut ctx,
            )
            .await
            .expect("Login-Antwort erwartet");
        assert!(
            matches!(antwort.payload, ControlPayload::LoginResponse(_)),
            "Login fehlgeschlagen: {antwort:?}"
        );

        let ident = ctx.identitaet.clone().expect("Identitaet nach Login");
        let (generation, rx, _) = self.state.registry.registrieren(ident);

        TestVerbindung {
            user_id: benutzer.id,
            ctx,
            generation,
            rx,
            request_id: 1,
        }
    }

    async fn anfrage(
        &self,
        verbindung: &mut TestVerbindung,
        payload: ControlPayload,
    ) -> Option<ControlMessage> {
        verbindung.request_id += 1;
        self.dispatcher
            .dispatch(
                ControlMessage::new(verbindung.request_id, payload),
                &mut verbindung.ctx,
            )
            .await
    }
}

fn naechstes_event(verbindung: &mut TestVerbindung) -> ControlPayload {
    verbindung.rx.try_recv().expect("Event erwartet").payload
}

fn events_leeren(verbindung: &mut TestVerbindung) {
    while verbindung.rx.try_recv().is_ok() {}
}

// ---------------------------------------------------------------------------
// Admission Gate
// ---------------------------------------------------------------------------

#[tokio::test]
async fn ungueltiges_token_registriert_nichts() {
    let umg = TestUmgebung::neu().await;

    let mut ctx = DispatcherContext::neu(test_addr());
    let antwort = umg
        .dispatcher
        .dispatch(
            ControlMessage::new(
                1,
                ControlPayload::Login(LoginRequest {
                    token: "gefaelscht".into(),
                    client_version: None,
                }),
            ),
            &mut ctx,
        )
        .await
        .unwrap();

    match antwort.payload {
        ControlPayload::Error(e) => assert_eq!(e.code, ErrorCode::AuthFailed),
        andere => panic!("Error erwartet, war {andere:?}"),
    }

    // Fail closed: keinerlei Zustand angelegt
    assert!(ctx.identitaet.is_none());
    assert_eq!(umg.state.registry.anzahl(), 0);
}

#[tokio::test]
async fn anfragen_ohne_login_werden_abgewiesen() {
    let umg = TestUmgebung::neu().await;

    let mut ctx = DispatcherContext::neu(test_addr());
    let antwort = umg
        .dispatcher
        .dispatch(
            ControlMessage::new(
                1,
                ControlPayload::JoinQueue(JoinQueueRequest {
                    mood: Stimmung::Happy,
                    gender_preference: GenderPraeferenz::Any,
                }),
            ),
            &mut ctx,
        )
        .await
        .unwrap();

    match antwort.payload {
        ControlPayload::Error(e) => assert_eq!(e.code, ErrorCode::AuthFailed),
        andere => panic!("Error erwartet, war {andere:?}"),
    }
}

#[tokio::test]
async fn login_setzt_praesenz_online() {
    let umg = TestUmgebung::neu().await;
    let verbindung = umg.verbinden("alice").await;

    let record = umg
        .db
        .praesenz_laden(verbindung.user_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(record.status, PraesenzStatus::Online);
}

// ---------------------------------------------------------------------------
// Warteschlange
// ---------------------------------------------------------------------------

#[tokio::test]
async fn queue_beitritt_austritt_und_positionen() {
    let umg = TestUmgebung::neu().await;
    let mut a = umg.verbinden("alice").await;
    let mut b = umg.verbinden("bob").await;

    let join = ControlPayload::JoinQueue(JoinQueueRequest {
        mood: Stimmung::Lonely,
        gender_preference: GenderPraeferenz::Any,
    });

    // A betritt die Queue auf Position 1
    let antwort = umg.anfrage(&mut a, join.clone()).await.unwrap();
    match antwort.payload {
        ControlPayload::QueueJoined(r) => assert_eq!(r.position, 1),
        andere => panic!("queue_joined erwartet, war {andere:?}"),
    }

    // B folgt auf Position 2; A bekommt ein Positions-Update
    let antwort = umg.anfrage(&mut b, join.clone()).await.unwrap();
    match antwort.payload {
        ControlPayload::QueueJoined(r) => assert_eq!(r.position, 2),
        andere => panic!("queue_joined erwartet, war {andere:?}"),
    }
    match naechstes_event(&mut a) {
        ControlPayload::QueuePositionUpdate(u) => assert_eq!(u.position, 1),
        andere => panic!("queue_position_update erwartet, war {andere:?}"),
    }

    // Doppelter Beitritt wird abgelehnt
    let antwort = umg.anfrage(&mut a, join.clone()).await.unwrap();
    match antwort.payload {
        ControlPayload::CallError(e) => assert_eq!(e.code, ErrorCode::AlreadyInQueue),
        andere => panic!("call_error erwartet, war {andere:?}"),
    }

    // A verlaesst die Queue; B rueckt auf Position 1 vor
    let antwort = umg.anfrage(&mut a, ControlPayload::LeaveQueue).await.unwrap();
    assert!(matches!(antwort.payload, ControlPayload::QueueLeft(_)));
    match naechstes_event(&mut b) {
        ControlPayload::QueuePositionUpdate(u) => assert_eq!(u.position, 1),
        andere => panic!("queue_position_update erwartet, war {andere:?}"),
    }

    let record = umg.db.praesenz_laden(a.user_id).await.unwrap().unwrap();
    assert_eq!(record.status, PraesenzStatus::Online);
    assert!(record.queue_joined_at.is_none());

    // Austritt ohne Mitgliedschaft ist ein stiller No-op
    let antwort = umg.anfrage(&mut a, ControlPayload::LeaveQueue).await.unwrap();
    assert!(matches!(antwort.payload, ControlPayload::QueueLeft(_)));
}

// ---------------------------------------------------------------------------
// Anruf-Lebenszyklus (Spezifikations-Szenario)
// ---------------------------------------------------------------------------

#[tokio::test]
async fn kompletter_anruf_fluss() {
    let umg = TestUmgebung::neu().await;
    let mut a = umg.verbinden("alice").await;
    let mut b = umg.verbinden("bob").await;

    // A ruft B an
    let antwort = umg
        .anfrage(
            &mut a,
            ControlPayload::InitiateCall(InitiateCallRequest {
                receiver_id: b.user_id,
            }),
        )
        .await
        .unwrap();
    let call_id = match antwort.payload {
        ControlPayload::CallInitiated(r) => {
            assert_eq!(r.receiver.id, b.user_id);
            assert_eq!(r.receiver.username, "bob");
            r.call_id
        }
        andere => panic!("call_initiated erwartet, war {andere:?}"),
    };

    match naechstes_event(&mut b) {
        ControlPayload::IncomingCall(ev) => {
            assert_eq!(ev.call_id, call_id);
            assert_eq!(ev.caller.id, a.user_id);
            assert_eq!(ev.caller.username, "alice");
        }
        andere => panic!("incoming_call erwartet, war {andere:?}"),
    }

    // B nimmt an: B sieht call_connected, A sieht call_accepted
    let antwort = umg
        .anfrage(
            &mut b,
            ControlPayload::AcceptCall(AcceptCallRequest { call_id }),
        )
        .await
        .unwrap();
    match antwort.payload {
        ControlPayload::CallConnected(ev) => {
            assert_eq!(ev.call_id, call_id);
            assert_eq!(ev.caller.id, a.user_id);
        }
        andere => panic!("call_connected erwartet, war {andere:?}"),
    }
    match naechstes_event(&mut a) {
        ControlPayload::CallAccepted(ev) => {
            assert_eq!(ev.call_id, call_id);
            assert_eq!(ev.receiver.id, b.user_id);
        }
        andere => panic!("call_accepted erwartet, war {andere:?}"),
    }

    // Beide Seiten sind in_call
    for uid in [a.user_id, b.user_id] {
        let record = umg.db.praesenz_laden(uid).await.unwrap().unwrap();
        assert_eq!(record.status, PraesenzStatus::InCall);
    }

    // Signaling-Relay: A -> B, `from` wird gestempelt
    let antwort = umg
        .anfrage(
            &mut a,
            ControlPayload::Signal(SignalMessage {
                call_id,
                to: Some(b.user_id),
                from: None,
                signal: serde_json::json!({"type": "offer", "sdp": "v=0..."}),
            }),
        )
        .await;
    assert!(antwort.is_none(), "Akzeptierte Signale haben keine Antwort");
    match naechstes_event(&mut b) {
        ControlPayload::Signal(sig) => {
            assert_eq!(sig.from, Some(a.user_id));
            assert_eq!(sig.call_id, call_id);
        }
        andere => panic!("signal erwartet, war {andere:?}"),
    }

    // A beendet; beide Seiten sehen call_ended mit derselben Dauer
    let antwort = umg
        .anfrage(&mut a, ControlPayload::EndCall(EndCallRequest { call_id }))
        .await
        .unwrap();
    let dauer = match antwort.payload {
        ControlPayload::CallEnded(ev) => {
            assert_eq!(ev.call_id, call_id);
            assert!(ev.duration >= 0);
            assert!(ev.reason.is_none());
            ev.duration
        }
        andere => panic!("call_ended erwartet, war {andere:?}"),
    };
    match naechstes_event(&mut b) {
        ControlPayload::CallEnded(ev) => {
            assert_eq!(ev.duration, dauer);
            assert!(ev.reason.is_none());
        }
        andere => panic!("call_ended erwartet, war {andere:?}"),
    }

    // Beide sind wieder online
    for uid in [a.user_id, b.user_id] {
        let record = umg.db.praesenz_laden(uid).await.unwrap().unwrap();
        assert_eq!(record.status, PraesenzStatus::Online);
    }

    // A bewertet 5 -> angenommen; B bewertet 0 -> InvalidRating,
    // B's Feld bleibt leer
    let antwort = umg
        .anfrage(
            &mut a,
            ControlPayload::RateCall(RateCallRequest { call_id, rating: 5 }),
        )
        .await
        .unwrap();
    assert!(matches!(antwort.payload, ControlPayload::RatingSubmitted(_)));

    let antwort = umg
        .anfrage(
            &mut b,
            ControlPayload::RateCall(RateCallRequest { call_id, rating: 0 }),
        )
        .await
        .unwrap();
    match antwort.payload {
        ControlPayload::RatingError(e) => assert_eq!(e.code, ErrorCode::InvalidRating),
        andere => panic!("rating_error erwartet, war {andere:?}"),
    }

    let record = plauder_db::AnrufRepository::anruf_laden(umg.db.as_ref(), call_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(record.caller_rating, Some(5));
    assert_eq!(record.receiver_rating, None);
}

#[tokio::test]
async fn queue_beitritt_waehrend_offener_sitzung_verboten() {
    let umg = TestUmgebung::neu().await;
    let mut a = umg.verbinden("alice").await;
    let b = umg.verbinden("bob").await;

    // Pending-Sitzung reicht schon um den Queue-Beitritt zu sperren
    umg.anfrage(
        &mut a,
        ControlPayload::InitiateCall(InitiateCallRequest {
            receiver_id: b.user_id,
        }),
    )
    .await
    .unwrap();

    let antwort = umg
        .anfrage(
            &mut a,
            ControlPayload::JoinQueue(JoinQueueRequest {
                mood: Stimmung::Bored,
                gender_preference: GenderPraeferenz::Any,
            }),
        )
        .await
        .unwrap();
    match antwort.payload {
        ControlPayload::CallError(e) => assert_eq!(e.code, ErrorCode::AlreadyInCall),
        andere => panic!("call_error erwartet, war {andere:?}"),
    }
}

#[tokio::test]
async fn signal_ohne_ziel_wird_abgelehnt() {
    let umg = TestUmgebung::neu().await;
    let mut a = umg.verbinden("alice").await;

    let antwort = umg
        .anfrage(
            &mut a,
            ControlPayload::Signal(SignalMessage {
                call_id: CallId::new(),
                to: None,
                from: None,
                signal: serde_json::json!({}),
            }),
        )
        .await
        .unwrap();
    match antwort.payload {
        ControlPayload::CallError(e) => assert_eq!(e.code, ErrorCode::InvalidRequest),
        andere => panic!("call_error erwartet, war {andere:?}"),
    }
}

// ---------------------------------------------------------------------------
// Disconnect-Verhalten (Spezifikations-Szenario)
// ---------------------------------------------------------------------------

#[tokio::test]
async fn disconnect_waehrend_klingeln_ergibt_missed() {
    let umg = TestUmgebung::neu().await;
    let mut a = umg.verbinden("alice").await;
    let mut b = umg.verbinden("bob").await;

    let antwort = umg
        .anfrage(
            &mut a,
            ControlPayload::InitiateCall(InitiateCallRequest {
                receiver_id: b.user_id,
            }),
        )
        .await
        .unwrap();
    let call_id = match antwort.payload {
        ControlPayload::CallInitiated(r) => r.call_id,
        andere => panic!("call_initiated erwartet, war {andere:?}"),
    };

    // B trennt bevor er reagiert
    let b_ident = b.ctx.identitaet.clone().unwrap();
    umg.dispatcher.client_cleanup(&b_ident, b.generation).await;

    // A sieht den Abbruch mit Disconnect-Grund und Dauer 0
    let mut anruf_ende = None;
    let mut status_change = None;
    while let Ok(msg) = a.rx.try_recv() {
        match msg.payload {
            ControlPayload::CallEnded(ev) => anruf_ende = Some(ev),
            ControlPayload::UserStatusChange(ev) => status_change = Some(ev),
            _ => {}
        }
    }
    let ende = anruf_ende.expect("call_ended erwartet");
    assert_eq!(ende.call_id, call_id);
    assert_eq!(ende.duration, 0);
    assert_eq!(
        ende.reason,
        Some(plauder_protocol::control::BeendigungsGrund::ParticipantDisconnected)
    );

    let wechsel = status_change.expect("user_status_change erwartet");
    assert_eq!(wechsel.user_id, b.user_id);
    assert_eq!(wechsel.status, PraesenzStatus::Offline);

    // Durable Abbild: missed, B offline, keine Geister-Registry-Eintraege
    let record = plauder_db::AnrufRepository::anruf_laden(umg.db.as_ref(), call_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(record.status, plauder_core::types::AnrufStatus::Missed);

    let praesenz = umg.db.praesenz_laden(b.user_id).await.unwrap().unwrap();
    assert_eq!(praesenz.status, PraesenzStatus::Offline);
    assert!(!umg.state.registry.ist_verbunden(&b.user_id));

    // A darf sofort wieder initiieren (Reservierung wurde freigegeben)
    events_leeren(&mut a);
    let c = umg.verbinden("carol").await;
    let antwort = umg
        .anfrage(
            &mut a,
            ControlPayload::InitiateCall(InitiateCallRequest {
                receiver_id: c.user_id,
            }),
        )
        .await
        .unwrap();
    assert!(matches!(antwort.payload, ControlPayload::CallInitiated(_)));
}

#[tokio::test]
async fn disconnect_waehrend_aktivem_anruf_schliesst_ab() {
    let umg = TestUmgebung::neu().await;
    let mut a = umg.verbinden("alice").await;
    let mut b = umg.verbinden("bob").await;

    let antwort = umg
        .anfrage(
            &mut a,
            ControlPayload::InitiateCall(InitiateCallRequest {
                receiver_id: b.user_id,
            }),
        )
        .await
        .unwrap();
    let call_id = match antwort.payload {
        ControlPayload::CallInitiated(r) => r.call_id,
        andere => panic!("call_initiated erwartet, war {andere:?}"),
    };
    umg.anfrage(
        &mut b,
        ControlPayload::AcceptCall(AcceptCallRequest { call_id }),
    )
    .await
    .unwrap();
    events_leeren(&mut a);

    // A verliert die Verbindung mitten im Gespraech
    let a_ident = a.ctx.identitaet.clone().unwrap();
    umg.dispatcher.client_cleanup(&a_ident, a.generation).await;

    // B wird benachrichtigt und kehrt zu online zurueck
    let mut anruf_ende = None;
    while let Ok(msg) = b.rx.try_recv() {
        if let ControlPayload::CallEnded(ev) = msg.payload {
            anruf_ende = Some(ev);
        }
    }
    let ende = anruf_ende.expect("call_ended erwartet");
    assert_eq!(
        ende.reason,
        Some(plauder_protocol::control::BeendigungsGrund::ParticipantDisconnected)
    );

    let record = plauder_db::AnrufRepository::anruf_laden(umg.db.as_ref(), call_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(record.status, plauder_core::types::AnrufStatus::Completed);

    let praesenz_b = umg.db.praesenz_laden(b.user_id).await.unwrap().unwrap();
    assert_eq!(praesenz_b.status, PraesenzStatus::Online);
    let praesenz_a = umg.db.praesenz_laden(a.user_id).await.unwrap().unwrap();
    assert_eq!(praesenz_a.status, PraesenzStatus::Offline);
}

// ---------------------------------------------------------------------------
// Verdraengung
// ---------------------------------------------------------------------------

#[tokio::test]
async fn zweiter_login_verdraengt_ersten_handle() {
    let umg = TestUmgebung::neu().await;
    let mut alt = umg.verbinden("alice").await;

    // Derselbe Benutzer verbindet sich erneut (z.B. zweites Geraet):
    // der Verbindungs-Task wuerde neu registrieren und den alten Handle
    // verabschieden
    let ident = alt.ctx.identitaet.clone().unwrap();
    let (neue_generation, mut neue_rx, verdraengt) = umg.state.registry.registrieren(ident.clone());
    let alter_sender = verdraengt.expect("alter Handle muss verdraengt werden");
    alter_sender.senden(ControlMessage::error(
        0,
        ErrorCode::AlreadyLoggedIn,
        "Verbindung durch neuen Login ersetzt",
    ));
    drop(alter_sender);

    match naechstes_event(&mut alt) {
        ControlPayload::Error(e) => assert_eq!(e.code, ErrorCode::AlreadyLoggedIn),
        andere => panic!("Error erwartet, war {andere:?}"),
    }
    assert!(alt.rx.try_recv().is_err(), "alte Queue muss geschlossen sein");

    // Cleanup des verdraengten Tasks laesst den Nachfolger unangetastet
    umg.dispatcher.client_cleanup(&ident, alt.generation).await;
    assert!(umg.state.registry.ist_verbunden(&ident.user_id));
    assert!(umg
        .state
        .registry
        .ist_aktuelle_generation(&ident.user_id, neue_generation));

    let record = umg.db.praesenz_laden(ident.user_id).await.unwrap().unwrap();
    assert_eq!(record.status, PraesenzStatus::Online);

    assert!(neue_rx.try_recv().is_err());
}
