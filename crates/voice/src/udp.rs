//! UDP Voice Server – Listener, Adressbindung und Ping-Echo
//!
//! ## Architektur
//!
//! ```text
//! UDP Socket (recv_from)
//!     |
//!     v
//! VoiceState::session_von_endpunkt()    <- bekannter Absender?
//!     |  nein: Sitzungen mit gleicher IP und ohne UDP-Adresse durchprobieren
//!     v
//! CryptState::entschluesseln()          <- Fenster, Wiederholung, Tag
//!     |
//!     v
//! datagramm_zerlegen()                  <- Kopf-Byte
//!     |
//!     +--> Ping: verschluesselt zurueck an den Absender
//!     +--> Voice: VoiceRouter::route() --> UdpSenke pro Empfaenger
//! ```

use crate::router::VoiceRouter;
use crate::senke::UdpSenke;
use crate::state::VoiceState;
use bytes::Bytes;
use murmel_core::types::SessionId;
use murmel_crypto::CryptState;
use murmel_observability::MurmelMetriken;
use murmel_protocol::voice::{datagramm_zerlegen, UdpTyp};
use murmel_registry::GeteilteRegistry;
use parking_lot::Mutex;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::UdpSocket;
use tokio::sync::watch;

/// Empfangspuffer; groessere Datagramme werden abgeschnitten und scheitern am Tag
const UDP_BUFFER_SIZE: usize = 2048;

// ---------------------------------------------------------------------------
// VoiceServer-Konfiguration
// ---------------------------------------------------------------------------

/// Konfiguration fuer den UDP Voice Server
#[derive(Debug, Clone)]
pub struct VoiceServerConfig {
    /// Bind-Adresse (z.B. "0.0.0.0:64738")
    pub bind_addr: SocketAddr,
    /// Groesse der Sende-Queue pro Client
    pub send_queue_groesse: usize,
}

impl VoiceServerConfig {
    pub fn neu(bind_addr: SocketAddr) -> Self {
        Self {
            bind_addr,
            send_queue_groesse: 128,
        }
    }
}

// ---------------------------------------------------------------------------
// VoiceServer
// ---------------------------------------------------------------------------

/// UDP Voice Server
pub struct VoiceServer {
    config: VoiceServerConfig,
    socket: Arc<UdpSocket>,
    registry: GeteilteRegistry,
    router: VoiceRouter,
    state: VoiceState,
    metriken: MurmelMetriken,
}

impl VoiceServer {
    /// Bindet den UDP-Socket
    pub async fn binden(
        config: VoiceServerConfig,
        registry: GeteilteRegistry,
        router: VoiceRouter,
        state: VoiceState,
        metriken: MurmelMetriken,
    ) -> std::io::Result<Self> {
        let socket = UdpSocket::bind(config.bind_addr).await?;
        tracing::info!(addr = %config.bind_addr, "UDP Voice Server gebunden");

        Ok(Self {
            config,
            socket: Arc::new(socket),
            registry,
            router,
            state,
            metriken,
        })
    }

    pub fn lokale_adresse(&self) -> std::io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// Empfangs-Loop; endet sobald `shutdown` auf `true` wechselt
    pub async fn empfangs_loop_starten(&self, mut shutdown: watch::Receiver<bool>) {
        let mut buf = [0u8; UDP_BUFFER_SIZE];

        tracing::info!("Voice-Empfangs-Loop gestartet");

        loop {
            tokio::select! {
                result = self.socket.recv_from(&mut buf) => {
                    match result {
                        Ok((len, absender)) => self.datagramm_verarbeiten(&buf[..len], absender),
                        Err(e) => {
                            tracing::error!(fehler = %e, "UDP-Empfangsfehler");
                            // Busy-Loop bei persistentem Fehler vermeiden
                            tokio::time::sleep(std::time::Duration::from_millis(1)).await;
                        }
                    }
                }

                _ = shutdown_abwarten(&mut shutdown) => {
                    tracing::info!("Voice-Server: Shutdown-Signal empfangen");
                    break;
                }
            }
        }

        tracing::info!("Voice-Empfangs-Loop beendet");
    }

    // -----------------------------------------------------------------------
    // Internes Paket-Processing
    // -----------------------------------------------------------------------

    fn datagramm_verarbeiten(&self, daten: &[u8], absender: SocketAddr) {
        let ergebnis = match self.state.session_von_endpunkt(&absender) {
            Some(session) => self.bekannt_entschluesseln(session, daten),
            None => self.absender_zuordnen(daten, absender),
        };
        let Some((session, klartext)) = ergebnis else {
            return;
        };

        let Some((kopf, nutzdaten)) = datagramm_zerlegen(&klartext) else {
            tracing::debug!(session = %session, "Datagramm mit unbekanntem Typ verworfen");
            self.metriken.voice_verworfen("unbekannter_typ");
            return;
        };

        if kopf.typ == UdpTyp::Ping {
            // Ping unveraendert zurueck; dient dem Client als UDP-Erreichbarkeitstest
            self.router.direkt_senden(session, Bytes::from(klartext));
            return;
        }

        let zugestellt = self.router.route(session, kopf, nutzdaten);
        self.metriken
            .voice_weitergeleitet_total
            .inc_by(zugestellt as u64);
    }

    fn bekannt_entschluesseln(&self, session: SessionId, daten: &[u8]) -> Option<(SessionId, Vec<u8>)> {
        let crypt = {
            let registry = self.registry.read();
            registry.client(session).ok().map(|c| Arc::clone(&c.crypt))
        };
        let Some(crypt) = crypt else {
            self.state.sitzung_entfernen(session);
            return None;
        };

        let ergebnis = crypt.lock().entschluesseln(daten);
        match ergebnis {
            Ok(klartext) => Some((session, klartext)),
            Err(e) => {
                tracing::debug!(session = %session, fehler = %e, "Datagramm nicht entschluesselbar");
                self.metriken.krypto_fehler_total.inc();
                None
            }
        }
    }

    /// Ordnet einen unbekannten Absender einer Sitzung zu
    ///
    /// Kandidaten sind Sitzungen ohne UDP-Adresse, deren TCP-Adresse dieselbe
    /// IP hat. Der erste Kandidat, dessen CryptState das Datagramm
    /// entschluesselt, wird an den Absender gebunden.
    fn absender_zuordnen(&self, daten: &[u8], absender: SocketAddr) -> Option<(SessionId, Vec<u8>)> {
        let kandidaten: Vec<(SessionId, Arc<Mutex<CryptState>>)> = {
            let registry = self.registry.read();
            registry
                .clients()
                .filter(|c| c.udp_adresse.is_none())
                .filter(|c| c.tcp_adresse.map(|a| a.ip()) == Some(absender.ip()))
                .map(|c| (c.session, Arc::clone(&c.crypt)))
                .collect()
        };

        for (session, crypt) in kandidaten {
            let ergebnis = crypt.lock().entschluesseln(daten);
            let Ok(klartext) = ergebnis else {
                continue;
            };

            let mut registry = self.registry.write();
            let Ok(client) = registry.client_mut(session) else {
                return None;
            };
            if client.udp_adresse.is_some() {
                // Zwischenzeitlich von einem anderen Datagramm gebunden
                return None;
            }
            client.udp_adresse = Some(absender);
            self.state.endpunkt_binden(session, absender);
            self.router.senke_setzen(
                session,
                Arc::new(UdpSenke::starten(
                    Arc::clone(&self.socket),
                    session,
                    absender,
                    crypt,
                    self.config.send_queue_groesse,
                )),
            );
            drop(registry);

            tracing::info!(session = %session, endpunkt = %absender, "UDP-Adresse gebunden");
            return Some((session, klartext));
        }

        tracing::debug!(absender = %absender, "Unbekannter Absender");
        self.metriken.voice_verworfen("unbekannter_absender");
        None
    }
}

/// Endet sobald `shutdown` auf `true` steht oder der Sender wegfaellt
async fn shutdown_abwarten(shutdown: &mut watch::Receiver<bool>) {
    let _ = shutdown.wait_for(|beenden| *beenden).await;
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
