//! Auth-Handler – Anmeldung und Erstsynchronisation
//!
//! Nach erfolgreicher Pruefung bekommt der neue Client in dieser Reihenfolge:
//! `CryptSetup`, alle Kanaele (Eltern vor Kindern), alle anderen Benutzer,
//! seinen eigenen `UserState` und zuletzt `ServerSync`. Die anderen Sitzungen
//! sehen den neuen Benutzer in derselben Lock-Phase.

use murmel_crypto::CryptState;
use murmel_protocol::control::{
    Authenticate, CryptSetup, Nachricht, Reject, RejectTyp, ServerSync,
};
use murmel_core::types::ChannelId;
use murmel_registry::berechtigungen_ermitteln;
use parking_lot::Mutex;
use std::sync::Arc;

use crate::auth::AuthAblehnung;
use crate::broadcast::TunnelSenke;
use crate::dispatcher::{DispatcherContext, Folge};
use crate::error::SignalingError;
use crate::server_state::SignalingState;

use super::{kanal_state, suppress_aktualisieren, voller_user_state};

/// Verarbeitet eine Anmeldung
///
/// Jede Ablehnung wird als `Reject` gesendet und beendet die Verbindung.
pub fn handle_authenticate(
    anfrage: Authenticate,
    ctx: &mut DispatcherContext,
    state: &SignalingState,
) -> Folge {
    let ip = ctx.peer_addr.ip();

    // Ban-Pruefung nach IP
    if state.ist_gebannt(ip, None) {
        tracing::warn!(ip = %ip, "Anmeldung von gebannter Adresse abgelehnt");
        return ablehnen(ctx, AuthAblehnung::neu(RejectTyp::Banned, "Gebannt"));
    }

    let identitaet = match state
        .authentifizierer
        .authentifizieren(&anfrage.username, anfrage.password.as_deref())
    {
        Ok(identitaet) => identitaet,
        Err(ablehnung) => {
            tracing::warn!(name = %anfrage.username, grund = %ablehnung.grund, "Anmeldung abgelehnt");
            return ablehnen(ctx, ablehnung);
        }
    };

    // Ban-Pruefung nach Benutzer-ID
    if state.ist_gebannt(ip, identitaet.benutzer_id) {
        tracing::warn!(name = %identitaet.name, "Gebannter Benutzer abgelehnt");
        return ablehnen(ctx, AuthAblehnung::neu(RejectTyp::Banned, "Gebannt"));
    }

    let crypt = match CryptState::neu_zufaellig() {
        Ok(crypt) => crypt,
        Err(e) => {
            tracing::error!("Schluesselerzeugung fehlgeschlagen: {}", e);
            return Folge::Trennen(SignalingError::intern(e.to_string()));
        }
    };
    let crypt_setup = CryptSetup {
        key: Some(crypt.schluessel().to_vec()),
        client_nonce: Some(crypt.decrypt_iv().to_vec()),
        server_nonce: Some(crypt.encrypt_iv().to_vec()),
    };
    let crypt = Arc::new(Mutex::new(crypt));

    let mut registry = state.registry.write();

    if registry.name_belegt(&identitaet.name)
        || identitaet
            .benutzer_id
            .is_some_and(|id| registry.clients().any(|c| c.benutzer_id == Some(id)))
    {
        drop(registry);
        return ablehnen(
            ctx,
            AuthAblehnung::neu(RejectTyp::UsernameInUse, "Name bereits verbunden"),
        );
    }
    if registry.client_anzahl() >= state.config.max_clients as usize {
        drop(registry);
        return ablehnen(ctx, AuthAblehnung::neu(RejectTyp::ServerFull, "Server voll"));
    }

    let session = match registry.sitzung_erstellen(identitaet, Some(ctx.peer_addr), crypt) {
        Ok(session) => session,
        Err(e) => {
            drop(registry);
            tracing::error!("Sitzung konnte nicht angelegt werden: {}", e);
            return ablehnen(ctx, AuthAblehnung::neu(RejectTyp::ServerFull, "Server voll"));
        }
    };
    ctx.session = Some(session);

    if let Err(e) = suppress_aktualisieren(&mut registry, state, session) {
        tracing::error!(session = %session, "suppress nicht gesetzt: {}", e);
    }

    // Erstsynchronisation an den neuen Client
    ctx.antwort.senden(Nachricht::CryptSetup(crypt_setup));
    for id in registry.kanaele_baumordnung() {
        if let Ok(kanal) = registry.kanal(id) {
            ctx.antwort.senden(Nachricht::ChannelState(kanal_state(kanal)));
        }
    }
    for client in registry.clients().filter(|c| c.session != session) {
        ctx.antwort
            .senden(Nachricht::UserState(voller_user_state(client)));
    }

    state.broadcaster.client_registrieren(session, ctx.antwort.clone());
    state
        .voice_router
        .senke_setzen(session, Arc::new(TunnelSenke::neu(ctx.antwort.clone())));

    // Neuer Benutzer an alle, einschliesslich sich selbst
    if let Ok(client) = registry.client(session) {
        state
            .broadcaster
            .an_alle_senden(Nachricht::UserState(voller_user_state(client)));
    }

    let permissions =
        berechtigungen_ermitteln(&registry, state.gruppen.as_ref(), session, ChannelId::WURZEL);
    ctx.antwort.senden(Nachricht::ServerSync(ServerSync {
        session,
        max_bandwidth: state.config.max_bandbreite,
        welcome_text: state.config.willkommen.clone(),
        permissions,
    }));

    state
        .metriken
        .connected_clients
        .set(registry.client_anzahl() as i64);

    tracing::info!(
        session = %session,
        peer = %ctx.peer_addr,
        anzahl = registry.client_anzahl(),
        "Client angemeldet"
    );
    Folge::Weiter
}

fn ablehnen(ctx: &DispatcherContext, ablehnung: AuthAblehnung) -> Folge {
    ctx.antwort.senden(Nachricht::Reject(Reject {
        typ: ablehnung.typ,
        reason: ablehnung.grund.clone(),
    }));
    Folge::Trennen(SignalingError::getrennt(ablehnung.grund))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broadcast::ClientSender;
    use crate::handlers::test_hilfe;
    use crate::server_state::{Bann, SignalingConfig};
    use murmel_protocol::control::NachrichtenArt;
    use murmel_registry::Identitaet;

    fn ctx() -> (DispatcherContext, tokio::sync::mpsc::Receiver<Nachricht>) {
        let (antwort, rx) = ClientSender::neu(test_hilfe::peer(), 64);
        (
            DispatcherContext {
                peer_addr: test_hilfe::peer(),
                session: None,
                antwort,
            },
            rx,
        )
    }

    fn anmelden(name: &str) -> Authenticate {
        Authenticate {
            username: name.into(),
            password: None,
        }
    }

    #[tokio::test]
    async fn erstsynchronisation_in_reihenfolge() {
        let state = test_hilfe::state();
        let (_, _, _) = test_hilfe::sitzung(&state, Identitaet::gast("bert"));
        state
            .registry
            .write()
            .kanal_erstellen(ChannelId::WURZEL, "Lobby".into())
            .unwrap();

        let (mut ctx, mut rx) = ctx();
        assert!(matches!(
            handle_authenticate(anmelden("anna"), &mut ctx, &state),
            Folge::Weiter
        ));
        let session = ctx.session.unwrap();

        let arten: Vec<NachrichtenArt> =
            test_hilfe::alle(&mut rx).iter().map(|n| n.art()).collect();
        assert_eq!(
            arten,
            vec![
                NachrichtenArt::CryptSetup,
                NachrichtenArt::ChannelState,
                NachrichtenArt::ChannelState,
                NachrichtenArt::UserState,
                NachrichtenArt::UserState,
                NachrichtenArt::ServerSync,
            ]
        );
        assert!(state.broadcaster.ist_registriert(session));
        assert!(state.voice_router.hat_senke(session));
        assert_eq!(state.metriken.connected_clients.get(), 2);
    }

    #[tokio::test]
    async fn andere_sehen_neuen_benutzer() {
        let state = test_hilfe::state();
        let (_, _, mut rx_bert) = test_hilfe::sitzung(&state, Identitaet::gast("bert"));
        let (mut ctx, _rx) = ctx();
        handle_authenticate(anmelden("anna"), &mut ctx, &state);

        match rx_bert.try_recv().unwrap() {
            Nachricht::UserState(u) => {
                assert_eq!(u.session, ctx.session);
                assert_eq!(u.name.as_deref(), Some("anna"));
            }
            andere => panic!("unerwartet: {:?}", andere),
        }
    }

    #[tokio::test]
    async fn doppelter_name_abgelehnt() {
        let state = test_hilfe::state();
        test_hilfe::sitzung(&state, Identitaet::gast("anna"));
        let (mut ctx, mut rx) = ctx();

        let folge = handle_authenticate(anmelden("anna"), &mut ctx, &state);
        assert!(matches!(folge, Folge::Trennen(_)));
        assert_eq!(ctx.session, None);
        match rx.try_recv().unwrap() {
            Nachricht::Reject(r) => assert_eq!(r.typ, RejectTyp::UsernameInUse),
            andere => panic!("unerwartet: {:?}", andere),
        }
    }

    #[tokio::test]
    async fn server_voll_und_bann() {
        let registry = murmel_registry::SessionRegistry::neu().geteilt();
        let config = SignalingConfig {
            max_clients: 1,
            ..Default::default()
        };
        let state = crate::server_state::SignalingState::neu(
            config,
            Arc::clone(&registry),
            murmel_voice::VoiceRouter::neu(registry),
            murmel_voice::VoiceState::neu(),
            murmel_observability::MurmelMetriken::neu().unwrap(),
        );
        test_hilfe::sitzung(&state, Identitaet::gast("erste"));

        let (mut ctx1, mut rx1) = ctx();
        handle_authenticate(anmelden("zweite"), &mut ctx1, &state);
        match rx1.try_recv().unwrap() {
            Nachricht::Reject(r) => assert_eq!(r.typ, RejectTyp::ServerFull),
            andere => panic!("unerwartet: {:?}", andere),
        }

        state.bann_hinzufuegen(Bann::Adresse(test_hilfe::peer().ip()));
        let (mut ctx2, mut rx2) = ctx();
        handle_authenticate(anmelden("dritte"), &mut ctx2, &state);
        match rx2.try_recv().unwrap() {
            Nachricht::Reject(r) => assert_eq!(r.typ, RejectTyp::Banned),
            andere => panic!("unerwartet: {:?}", andere),
        }
    }
}
