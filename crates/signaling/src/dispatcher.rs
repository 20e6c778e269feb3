//! Message-Dispatcher – Routet Control-Nachrichten an die richtigen Handler
//!
//! Der Dispatcher empfaengt Rohframes von einer ClientConnection, dekodiert
//! sie und ruft den passenden Handler auf. Antworten gehen ueber die
//! Send-Queue der Verbindung, nicht als Rueckgabewert.
//!
//! ## Zustandspruefung
//! - Vor der Anmeldung nur `Version`, `Authenticate` und `Ping`
//! - `Authenticate` genau einmal pro Verbindung
//! - Arten, die nur der Server sendet, werden verworfen
//! - Nach einem Kick ist die Sitzungs-ID der Verbindung ungueltig; sie kann
//!   schon einer neuen Sitzung gehoeren. Jeder weitere Frame trennt.
//!
//! Abgelehnte Anfragen werden still verworfen, protokolliert und gezaehlt.
//! Die Verbindung endet nur bei nicht dekodierbaren Nutzdaten, abgelehnter
//! Anmeldung oder internen Fehlern.

use murmel_core::error::{FehlerKlasse, MurmelError};
use murmel_core::types::SessionId;
use murmel_protocol::control::{Nachricht, NachrichtenArt, Reject, RejectTyp};
use murmel_protocol::wire::RohFrame;
use std::net::SocketAddr;
use std::sync::Arc;

use crate::broadcast::ClientSender;
use crate::error::SignalingError;
use crate::handlers::{
    acl_handler, auth_handler, channel_handler, crypt_handler, text_handler, user_handler,
    voice_handler,
};
use crate::server_state::SignalingState;

/// Dispatcher-Kontext – Informationen ueber die aktuelle Verbindung
pub struct DispatcherContext {
    /// Peer-Adresse fuer Ban-Pruefungen
    pub peer_addr: SocketAddr,
    /// Sitzung nach erfolgreicher Anmeldung
    pub session: Option<SessionId>,
    /// Send-Queue dieser Verbindung
    pub antwort: ClientSender,
}

/// Wie es nach einer Nachricht mit der Verbindung weitergeht
#[derive(Debug)]
pub enum Folge {
    Weiter,
    Trennen(SignalingError),
}

/// Zentraler Message-Dispatcher
pub struct MessageDispatcher {
    state: Arc<SignalingState>,
}

impl MessageDispatcher {
    /// Erstellt einen neuen Dispatcher
    pub fn neu(state: Arc<SignalingState>) -> Self {
        Self { state }
    }

    /// Verarbeitet einen eingehenden Frame
    pub fn dispatch(&self, frame: RohFrame, ctx: &mut DispatcherContext) -> Folge {
        if ctx.session.is_some() && ctx.antwort.ist_abgebaut() {
            tracing::debug!(peer = %ctx.peer_addr, "Frame nach Abbau der Sitzung");
            ctx.session = None;
            return Folge::Trennen(SignalingError::getrennt("Sitzung abgebaut"));
        }

        let Some(art) = NachrichtenArt::from_u16(frame.art) else {
            self.state.verworfen(ctx.session, "unbekannte_art", &frame.art);
            return Folge::Weiter;
        };
        self.state.metriken.nachricht_empfangen(art.name());

        if ctx.session.is_none() && !art.vor_authentifizierung_erlaubt() {
            self.state.verworfen(None, "nicht_angemeldet", &art);
            return Folge::Weiter;
        }

        let nachricht = match Nachricht::dekodieren(&frame) {
            Ok(nachricht) => nachricht,
            Err(e) => {
                tracing::warn!(peer = %ctx.peer_addr, fehler = %e, "Nachricht nicht dekodierbar");
                ctx.antwort.senden(Nachricht::Reject(Reject {
                    typ: RejectTyp::MalformedMessage,
                    reason: format!("{} nicht dekodierbar", art),
                }));
                return Folge::Trennen(SignalingError::Protokoll(e));
            }
        };

        // -------------------------------------------------------------------
        // Vor der Anmeldung erlaubt
        // -------------------------------------------------------------------
        let (nachricht, session) = match (nachricht, ctx.session) {
            (Nachricht::Version(version), _) => {
                tracing::debug!(
                    peer = %ctx.peer_addr,
                    version = version.version,
                    release = ?version.release,
                    os = ?version.os,
                    "Client-Version"
                );
                return Folge::Weiter;
            }
            (Nachricht::Ping(ping), _) => {
                crypt_handler::handle_ping(ping, ctx, &self.state);
                return Folge::Weiter;
            }
            (Nachricht::Authenticate(anfrage), None) => {
                return auth_handler::handle_authenticate(anfrage, ctx, &self.state);
            }
            (Nachricht::Authenticate(_), Some(session)) => {
                self.state.verworfen(Some(session), "bereits_angemeldet", &art);
                return Folge::Weiter;
            }
            (nachricht, Some(session)) => (nachricht, session),
            (_, None) => return Folge::Weiter,
        };

        self.dispatch_angemeldet(nachricht, session, ctx)
    }

    /// Routet Nachrichten die eine Anmeldung erfordern
    fn dispatch_angemeldet(
        &self,
        nachricht: Nachricht,
        session: SessionId,
        ctx: &DispatcherContext,
    ) -> Folge {
        let state = self.state.as_ref();
        let art = nachricht.art();

        let ergebnis = match nachricht {
            Nachricht::UdpTunnel(paket) => {
                voice_handler::handle_udp_tunnel(paket, session, &ctx.antwort, state)
            }
            Nachricht::CryptSetup(anfrage) => {
                crypt_handler::handle_crypt_setup(anfrage, session, &ctx.antwort, state)
            }
            Nachricht::UserState(anfrage) => user_handler::handle_user_state(anfrage, session, state),
            Nachricht::UserRemove(anfrage) => user_handler::handle_user_remove(anfrage, session, state),
            Nachricht::UserStats(anfrage) => {
                user_handler::handle_user_stats(anfrage, session, &ctx.antwort, state)
            }
            Nachricht::TextMessage(anfrage) => {
                text_handler::handle_text_message(anfrage, session, state)
            }
            Nachricht::ChannelState(anfrage) => {
                channel_handler::handle_channel_state(anfrage, session, state)
            }
            Nachricht::ChannelRemove(anfrage) => {
                channel_handler::handle_channel_remove(anfrage, session, state)
            }
            Nachricht::Acl(anfrage) => acl_handler::handle_acl(anfrage, session, &ctx.antwort, state),
            Nachricht::PermissionQuery(anfrage) => {
                acl_handler::handle_permission_query(anfrage, session, &ctx.antwort, state)
            }
            Nachricht::VoiceTarget(anfrage) => {
                voice_handler::handle_voice_target(anfrage, session, state)
            }

            // Nur Server -> Client oder ohne Verarbeitung
            Nachricht::Reject(_) | Nachricht::ServerSync(_) | Nachricht::Unbehandelt(_) => {
                state.verworfen(Some(session), "nicht_unterstuetzt", &art);
                return Folge::Weiter;
            }
            Nachricht::Version(_) | Nachricht::Ping(_) | Nachricht::Authenticate(_) => {
                return Folge::Weiter;
            }
        };

        match ergebnis {
            Ok(()) => Folge::Weiter,
            Err(e) if e.ist_fatal() => {
                tracing::error!(session = %session, art = %art, fehler = %e, "Interner Fehler");
                Folge::Trennen(SignalingError::intern(e.to_string()))
            }
            Err(e) => {
                state.verworfen(Some(session), grund(&e), &format!("{}: {}", art, e));
                Folge::Weiter
            }
        }
    }
}

/// Metrik-Label fuer eine verworfene Anfrage
fn grund(fehler: &MurmelError) -> &'static str {
    match fehler.klasse() {
        FehlerKlasse::FehlerhafteEingabe => "fehlerhafte_eingabe",
        FehlerKlasse::NichtBerechtigt => "nicht_berechtigt",
        FehlerKlasse::Krypto => "krypto",
        FehlerKlasse::Erschoepft => "erschoepft",
        FehlerKlasse::Intern => "intern",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::test_hilfe;
    use bytes::Bytes;
    use murmel_protocol::control::{Authenticate, Ping, TextMessage};
    use murmel_registry::Identitaet;
    use tokio::sync::mpsc;

    fn frame(nachricht: &Nachricht) -> RohFrame {
        nachricht.kodieren().unwrap()
    }

    fn aufbau() -> (MessageDispatcher, Arc<SignalingState>, DispatcherContext, mpsc::Receiver<Nachricht>) {
        let state = Arc::new(test_hilfe::state());
        let (antwort, rx) = ClientSender::neu(test_hilfe::peer(), 64);
        let ctx = DispatcherContext {
            peer_addr: test_hilfe::peer(),
            session: None,
            antwort,
        };
        (MessageDispatcher::neu(Arc::clone(&state)), state, ctx, rx)
    }

    #[tokio::test]
    async fn vor_anmeldung_nur_erlaubte_arten() {
        let (dispatcher, state, mut ctx, mut rx) = aufbau();
        let text = Nachricht::TextMessage(TextMessage {
            message: "hallo".into(),
            ..Default::default()
        });
        assert!(matches!(dispatcher.dispatch(frame(&text), &mut ctx), Folge::Weiter));
        assert!(rx.try_recv().is_err());
        assert_eq!(
            state
                .metriken
                .verworfene_anfragen_total
                .with_label_values(&["nicht_angemeldet"])
                .get(),
            1
        );

        let ping = Nachricht::Ping(Ping {
            timestamp: 5,
            ..Default::default()
        });
        dispatcher.dispatch(frame(&ping), &mut ctx);
        assert!(matches!(rx.try_recv().unwrap(), Nachricht::Ping(_)));
    }

    #[tokio::test]
    async fn unbekannte_art_wird_ignoriert() {
        let (dispatcher, _state, mut ctx, mut rx) = aufbau();
        let unbekannt = RohFrame {
            art: 999,
            nutzdaten: Bytes::from_static(b"{}"),
        };
        assert!(matches!(dispatcher.dispatch(unbekannt, &mut ctx), Folge::Weiter));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn kaputte_nutzdaten_trennen_mit_reject() {
        let (dispatcher, _state, mut ctx, mut rx) = aufbau();
        let kaputt = RohFrame {
            art: NachrichtenArt::Authenticate.als_u16(),
            nutzdaten: Bytes::from_static(b"kein json"),
        };
        let folge = dispatcher.dispatch(kaputt, &mut ctx);
        assert!(matches!(folge, Folge::Trennen(SignalingError::Protokoll(_))));
        match rx.try_recv().unwrap() {
            Nachricht::Reject(r) => assert_eq!(r.typ, RejectTyp::MalformedMessage),
            andere => panic!("unerwartet: {:?}", andere),
        }
    }

    #[tokio::test]
    async fn zweite_anmeldung_verworfen() {
        let (dispatcher, state, mut ctx, mut rx) = aufbau();
        let anmelden = Nachricht::Authenticate(Authenticate {
            username: "anna".into(),
            password: None,
        });
        assert!(matches!(dispatcher.dispatch(frame(&anmelden), &mut ctx), Folge::Weiter));
        let session = ctx.session.unwrap();
        test_hilfe::alle(&mut rx);

        let nochmal = Nachricht::Authenticate(Authenticate {
            username: "bert".into(),
            password: None,
        });
        assert!(matches!(dispatcher.dispatch(frame(&nochmal), &mut ctx), Folge::Weiter));
        assert_eq!(ctx.session, Some(session));
        assert!(rx.try_recv().is_err());
        assert_eq!(state.registry.read().client_anzahl(), 1);
    }

    #[tokio::test]
    async fn abgelehnte_anfrage_haelt_verbindung() {
        let (dispatcher, state, mut ctx, _rx) = aufbau();
        let (b, _, _rx_b) = test_hilfe::sitzung(&state, Identitaet::gast("b"));
        dispatcher.dispatch(
            frame(&Nachricht::Authenticate(Authenticate {
                username: "anna".into(),
                password: None,
            })),
            &mut ctx,
        );

        let kick = Nachricht::UserRemove(murmel_protocol::control::UserRemove {
            session: b,
            ..Default::default()
        });
        assert!(matches!(dispatcher.dispatch(frame(&kick), &mut ctx), Folge::Weiter));
        assert_eq!(
            state
                .metriken
                .verworfene_anfragen_total
                .with_label_values(&["nicht_berechtigt"])
                .get(),
            1
        );
        assert!(state.registry.read().client(b).is_ok());
    }
}
