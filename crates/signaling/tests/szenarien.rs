//! Ablaufszenarien ueber den oeffentlichen Dispatcher
//!
//! Jede simulierte Verbindung besteht aus einem `DispatcherContext` und der
//! zugehoerigen Send-Queue; Nachrichten gehen als Rohframes hinein, genau
//! wie aus einer echten TCP-Verbindung.

use murmel_core::types::{ChannelId, SessionId};
use murmel_observability::MurmelMetriken;
use murmel_protocol::control::{
    Acl, AclEintragDaten, Authenticate, ChannelState, Nachricht, RejectTyp, TextMessage, UserRemove,
    UserState,
};
use murmel_registry::{Berechtigung, Identitaet, SessionRegistry, StatischeGruppen};
use murmel_signaling::{
    AuthAblehnung, Authentifizierer, ClientSender, DispatcherContext, Folge, MessageDispatcher,
    SignalingConfig, SignalingState,
};
use murmel_voice::{VoiceRouter, VoiceState};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::mpsc;

// ---------------------------------------------------------------------------
// Aufbau
// ---------------------------------------------------------------------------

/// Kennt einige registrierte Benutzer mit fester ID, alle anderen sind Gaeste
struct TestAuthentifizierer {
    registriert: HashMap<&'static str, u32>,
}

impl Authentifizierer for TestAuthentifizierer {
    fn authentifizieren(
        &self,
        name: &str,
        _passwort: Option<&str>,
    ) -> Result<Identitaet, AuthAblehnung> {
        if name == "SuperUser" {
            return Ok(Identitaet::superuser());
        }
        if name == "gesperrt" {
            return Err(AuthAblehnung::neu(RejectTyp::WrongPassword, "gesperrt"));
        }
        Ok(match self.registriert.get(name) {
            Some(id) => Identitaet::registriert(name, *id),
            None => Identitaet::gast(name),
        })
    }
}

struct Verbindung {
    ctx: DispatcherContext,
    rx: mpsc::Receiver<Nachricht>,
}

impl Verbindung {
    fn session(&self) -> SessionId {
        self.ctx.session.expect("angemeldet")
    }

    fn senden(&mut self, dispatcher: &MessageDispatcher, nachricht: Nachricht) -> Folge {
        let frame = nachricht.kodieren().unwrap();
        dispatcher.dispatch(frame, &mut self.ctx)
    }

    fn empfangen(&mut self) -> Vec<Nachricht> {
        let mut nachrichten = Vec::new();
        while let Ok(n) = self.rx.try_recv() {
            nachrichten.push(n);
        }
        nachrichten
    }
}

fn server() -> (Arc<SignalingState>, MessageDispatcher) {
    let registry = SessionRegistry::neu().geteilt();
    let mut gruppen = StatischeGruppen::default();
    gruppen.mitglied_hinzufuegen("restricted", 7);

    let state = SignalingState::neu(
        SignalingConfig::default(),
        Arc::clone(&registry),
        VoiceRouter::neu(registry),
        VoiceState::neu(),
        MurmelMetriken::neu().unwrap(),
    )
    .mit_gruppen(Arc::new(gruppen))
    .mit_authentifizierer(Arc::new(TestAuthentifizierer {
        registriert: HashMap::from([("bert", 7)]),
    }));

    let state = Arc::new(state);
    let dispatcher = MessageDispatcher::neu(Arc::clone(&state));
    (state, dispatcher)
}

fn verbinden(dispatcher: &MessageDispatcher, name: &str, port: u16) -> (Verbindung, Folge) {
    let peer: SocketAddr = format!("127.0.0.1:{}", port).parse().unwrap();
    let (antwort, rx) = ClientSender::neu(peer, 256);
    let mut verbindung = Verbindung {
        ctx: DispatcherContext {
            peer_addr: peer,
            session: None,
            antwort,
        },
        rx,
    };
    let folge = verbindung.senden(
        dispatcher,
        Nachricht::Authenticate(Authenticate {
            username: name.to_string(),
            password: None,
        }),
    );
    (verbindung, folge)
}

fn anmelden(dispatcher: &MessageDispatcher, name: &str, port: u16) -> Verbindung {
    let (mut verbindung, folge) = verbinden(dispatcher, name, port);
    assert!(matches!(folge, Folge::Weiter), "Anmeldung von {} fehlgeschlagen", name);
    verbindung.empfangen();
    verbindung
}

fn verschieben(session: SessionId, kanal: ChannelId) -> Nachricht {
    Nachricht::UserState(UserState {
        session: Some(session),
        channel_id: Some(kanal),
        ..Default::default()
    })
}

fn gruppen_eintrag(name: &str, grant: u32, deny: u32) -> AclEintragDaten {
    AclEintragDaten {
        user_id: None,
        group: Some(name.to_string()),
        apply_here: true,
        apply_subs: true,
        grant,
        deny,
    }
}

fn kanal_von(state: &SignalingState, session: SessionId) -> ChannelId {
    state.registry.read().client(session).unwrap().kanal()
}

// ---------------------------------------------------------------------------
// Szenarien
// ---------------------------------------------------------------------------

#[tokio::test]
async fn naeheres_verbot_haelt_benutzer_im_kanal() {
    let (state, dispatcher) = server();
    let mut admin = anmelden(&dispatcher, "SuperUser", 41000);
    let mut bert = anmelden(&dispatcher, "bert", 41001);
    let b = bert.session();

    admin.senden(
        &dispatcher,
        Nachricht::ChannelState(ChannelState {
            parent: Some(ChannelId::WURZEL),
            name: Some("C2".into()),
            ..Default::default()
        }),
    );
    let c2 = {
        let registry = state.registry.read();
        registry
            .kanaele_baumordnung()
            .into_iter()
            .find(|id| registry.kanal(*id).unwrap().name == "C2")
            .expect("C2 angelegt")
    };

    // move fuer alle in der Wurzel, Verbot fuer "restricted" in C2
    admin.senden(
        &dispatcher,
        Nachricht::Acl(Acl {
            channel_id: ChannelId::WURZEL,
            inherit_acls: true,
            entries: vec![gruppen_eintrag(
                "all",
                Berechtigung::STANDARD_ALLE | Berechtigung::MOVE,
                0,
            )],
            query: false,
        }),
    );
    admin.senden(
        &dispatcher,
        Nachricht::Acl(Acl {
            channel_id: c2,
            inherit_acls: true,
            entries: vec![gruppen_eintrag("restricted", 0, Berechtigung::MOVE)],
            query: false,
        }),
    );

    admin.senden(&dispatcher, verschieben(b, c2));
    assert_eq!(kanal_von(&state, b), c2);

    // Superuser darf zurueckverschieben
    admin.senden(&dispatcher, verschieben(b, ChannelId::WURZEL));
    assert_eq!(kanal_von(&state, b), ChannelId::WURZEL);

    admin.senden(&dispatcher, verschieben(b, c2));
    bert.empfangen();

    // Eigener Wechsel scheitert am naeheren Verbot in C2
    let folge = bert.senden(&dispatcher, verschieben(b, ChannelId::WURZEL));
    assert!(matches!(folge, Folge::Weiter));
    assert_eq!(kanal_von(&state, b), c2);
    assert!(bert.empfangen().is_empty());
    assert_eq!(
        state
            .metriken
            .verworfene_anfragen_total
            .with_label_values(&["nicht_berechtigt"])
            .get(),
        1
    );
    assert!(state.registry.read().konsistenz_pruefen().is_ok());
}

#[tokio::test]
async fn textnachricht_an_zwei_sitzungen() {
    let (_state, dispatcher) = server();
    let mut absender = anmelden(&dispatcher, "anna", 42000);
    let mut fuenf = anmelden(&dispatcher, "carl", 42001);
    let mut sieben = anmelden(&dispatcher, "dora", 42002);
    let mut unbeteiligt = anmelden(&dispatcher, "emil", 42003);
    absender.empfangen();
    fuenf.empfangen();
    sieben.empfangen();

    let folge = absender.senden(
        &dispatcher,
        Nachricht::TextMessage(TextMessage {
            sessions: vec![fuenf.session(), sieben.session()],
            message: "hallo".into(),
            ..Default::default()
        }),
    );
    assert!(matches!(folge, Folge::Weiter));

    for empfaenger in [&mut fuenf, &mut sieben] {
        let nachrichten = empfaenger.empfangen();
        assert_eq!(nachrichten.len(), 1);
        match &nachrichten[0] {
            Nachricht::TextMessage(text) => {
                assert_eq!(text.actor, Some(absender.session()));
                assert_eq!(text.message, "hallo");
            }
            andere => panic!("unerwartet: {:?}", andere),
        }
    }
    assert!(absender.empfangen().is_empty());
    assert!(unbeteiligt.empfangen().is_empty());
}

#[tokio::test]
async fn selbstbezogene_felder_fuer_andere_verwerfen_ganze_anfrage() {
    let (state, dispatcher) = server();
    let mut admin = anmelden(&dispatcher, "SuperUser", 43000);
    let mut anna = anmelden(&dispatcher, "anna", 43001);
    let a = anna.session();

    admin.senden(
        &dispatcher,
        Nachricht::UserState(UserState {
            session: Some(a),
            self_mute: Some(true),
            comment: Some(String::new()),
            ..Default::default()
        }),
    );

    assert!(anna.empfangen().is_empty());
    let registry = state.registry.read();
    let client = registry.client(a).unwrap();
    assert!(!client.attribute.self_mute);
}

#[tokio::test]
async fn abgelehnte_anmeldung_trennt() {
    let (state, dispatcher) = server();
    let (mut verbindung, folge) = verbinden(&dispatcher, "gesperrt", 44000);
    assert!(matches!(folge, Folge::Trennen(_)));
    match verbindung.empfangen().as_slice() {
        [Nachricht::Reject(reject)] => assert_eq!(reject.typ, RejectTyp::WrongPassword),
        andere => panic!("unerwartet: {:?}", andere),
    }
    assert_eq!(state.registry.read().client_anzahl(), 0);
}

#[tokio::test]
async fn doppelter_name_wird_abgelehnt() {
    let (state, dispatcher) = server();
    let _anna = anmelden(&dispatcher, "anna", 45000);
    let (mut zweite, folge) = verbinden(&dispatcher, "anna", 45001);
    assert!(matches!(folge, Folge::Trennen(_)));
    match zweite.empfangen().as_slice() {
        [Nachricht::Reject(reject)] => assert_eq!(reject.typ, RejectTyp::UsernameInUse),
        andere => panic!("unerwartet: {:?}", andere),
    }
    assert_eq!(state.registry.read().client_anzahl(), 1);
}

#[tokio::test]
async fn gast_registriert_sich_selbst() {
    let (state, dispatcher) = server();
    let mut anna = anmelden(&dispatcher, "anna", 46000);
    let a = anna.session();

    anna.senden(
        &dispatcher,
        Nachricht::UserState(UserState {
            session: Some(a),
            user_id: Some(-1),
            ..Default::default()
        }),
    );

    let benutzer_id = state.registry.read().client(a).unwrap().benutzer_id;
    assert!(matches!(benutzer_id, Some(id) if id >= 1));
    let nachrichten = anna.empfangen();
    assert!(nachrichten.iter().any(|n| matches!(
        n,
        Nachricht::UserState(u) if u.session == Some(a) && u.user_id.is_some()
    )));

    // Zweite Registrierung wird verworfen
    anna.senden(
        &dispatcher,
        Nachricht::UserState(UserState {
            session: Some(a),
            user_id: Some(-1),
            ..Default::default()
        }),
    );
    assert!(anna.empfangen().is_empty());
    assert_eq!(state.registry.read().client(a).unwrap().benutzer_id, benutzer_id);
}

#[tokio::test]
async fn gekickte_verbindung_trifft_nachfolger_mit_gleicher_id_nicht() {
    let (state, dispatcher) = server();
    let mut admin = anmelden(&dispatcher, "SuperUser", 41100);
    let mut bob = anmelden(&dispatcher, "bob", 41101);
    let b = bob.session();

    let folge = admin.senden(
        &dispatcher,
        Nachricht::UserRemove(UserRemove {
            session: b,
            ..Default::default()
        }),
    );
    assert!(matches!(folge, Folge::Weiter));
    assert!(bob.ctx.antwort.ist_abgebaut());

    // Die freie ID geht an die naechste Anmeldung
    let carl = anmelden(&dispatcher, "carl", 41102);
    assert_eq!(carl.session(), b);

    // Bobs Verbindungs-Task hat den Frame noch vor dem Trennsignal gelesen
    let folge = bob.senden(
        &dispatcher,
        Nachricht::UserState(UserState {
            comment: Some("von bob".into()),
            ..Default::default()
        }),
    );
    assert!(matches!(folge, Folge::Trennen(_)));
    assert_eq!(bob.ctx.session, None);

    // Abbau beim Ende von Bobs Verbindung laesst Carl in Ruhe
    assert!(!state.verbindung_abbauen(
        b,
        &bob.ctx.antwort,
        UserRemove {
            session: b,
            ..Default::default()
        },
    ));

    let registry = state.registry.read();
    let carl_client = registry.client(b).unwrap();
    assert_eq!(carl_client.name, "carl");
    assert!(carl_client.attribute.kommentar.is_empty());
    assert!(state.broadcaster.ist_registriert(b));
    assert!(!carl.ctx.antwort.ist_abgebaut());
}
