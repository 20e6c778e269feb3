//! Client-Connection – Verwaltet eine einzelne TCP-Verbindung
//!
//! Jede TCP-Verbindung bekommt eine `ClientConnection` in einem eigenen
//! tokio-Task. Eingehende Frames gehen an den [`MessageDispatcher`],
//! ausgehende Nachrichten kommen aus der begrenzten Send-Queue der
//! Verbindung, in die auch der Broadcaster schreibt.
//!
//! ## Ende einer Verbindung
//! - Client schliesst den Stream oder sendet einen fehlerhaften Frame
//! - Dispatcher verlangt die Trennung (Reject, interner Fehler)
//! - Trennsignal (Kick, Bann, uebergelaufene Send-Queue)
//! - Kein Frame innerhalb von `verbindungs_timeout_sek`
//! - Shutdown des Servers
//!
//! Bereits eingereihte Nachrichten werden vor dem Schliessen noch
//! geschrieben, danach wird die Sitzung abgebaut.

use futures_util::{SinkExt, StreamExt};
use murmel_protocol::control::{Nachricht, Ping, UserRemove};
use murmel_protocol::wire::FrameCodec;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{mpsc, watch};
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::codec::Framed;

use crate::broadcast::ClientSender;
use crate::dispatcher::{DispatcherContext, Folge, MessageDispatcher};
use crate::error::SignalingError;
use crate::server_state::SignalingState;

/// Maximale Zeit fuer das Leeren der Send-Queue beim Trennen
const ABSCHIED_TIMEOUT: Duration = Duration::from_secs(1);

// ---------------------------------------------------------------------------
// ClientConnection
// ---------------------------------------------------------------------------

/// Verarbeitet eine einzelne Verbindung
pub struct ClientConnection {
    state: Arc<SignalingState>,
    peer_addr: SocketAddr,
}

impl ClientConnection {
    /// Erstellt eine neue ClientConnection
    pub fn neu(state: Arc<SignalingState>, peer_addr: SocketAddr) -> Self {
        Self { state, peer_addr }
    }

    /// Startet die Verbindungs-Verarbeitungsschleife
    ///
    /// Laeuft bis die Verbindung aus einem der oben genannten Gruende endet,
    /// und gibt diesen Grund zurueck.
    pub async fn verarbeiten<S>(self, stream: S, mut shutdown: watch::Receiver<bool>) -> SignalingError
    where
        S: AsyncRead + AsyncWrite + Unpin + Send,
    {
        let peer_addr = self.peer_addr;
        let config = Arc::clone(&self.state.config);
        let keepalive_intervall = Duration::from_secs(config.keepalive_sek.max(1));
        let timeout_dauer = Duration::from_secs(config.verbindungs_timeout_sek.max(1));

        tracing::info!(peer = %peer_addr, "Neue Verbindung");

        let mut framed = Framed::new(stream, FrameCodec::new());

        let (antwort, mut sende_rx) = ClientSender::neu(peer_addr, config.send_queue_groesse);
        let trenn_signal = antwort.trenn_signal();
        let mut ctx = DispatcherContext {
            peer_addr,
            session: None,
            antwort,
        };
        let dispatcher = MessageDispatcher::neu(Arc::clone(&self.state));

        let mut letzter_empfang = Instant::now();
        let mut keepalive =
            tokio::time::interval_at(Instant::now() + keepalive_intervall, keepalive_intervall);
        keepalive.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let grund = loop {
            tokio::select! {
                // Eingehender Frame vom Client
                frame = framed.next() => {
                    match frame {
                        Some(Ok(frame)) => {
                            letzter_empfang = Instant::now();
                            tracing::trace!(peer = %peer_addr, art = frame.art, "Frame empfangen");
                            if let Folge::Trennen(grund) = dispatcher.dispatch(frame, &mut ctx) {
                                break grund;
                            }
                        }
                        Some(Err(e)) => {
                            tracing::warn!(peer = %peer_addr, fehler = %e, "Frame-Lesefehler");
                            break SignalingError::Io(e);
                        }
                        None => break SignalingError::VerbindungGetrennt,
                    }
                }

                // Ausgehende Nachricht (Antworten und Broadcasts)
                Some(ausgehend) = sende_rx.recv() => {
                    if let Err(e) = framed.send(ausgehend).await {
                        tracing::warn!(peer = %peer_addr, fehler = %e, "Senden fehlgeschlagen");
                        break SignalingError::Io(e);
                    }
                }

                // Kick, Bann oder volle Send-Queue
                _ = trenn_signal.notified() => {
                    break SignalingError::getrennt("vom Server getrennt");
                }

                _ = tokio::time::sleep_until(letzter_empfang + timeout_dauer) => {
                    tracing::warn!(peer = %peer_addr, "Verbindungs-Timeout");
                    break SignalingError::Timeout;
                }

                // Keepalive-Ping
                _ = keepalive.tick() => {
                    let ping = Ping {
                        timestamp: zeitstempel_ms(),
                        ..Default::default()
                    };
                    if let Err(e) = framed.send(Nachricht::Ping(ping)).await {
                        tracing::warn!(peer = %peer_addr, fehler = %e, "Ping-Senden fehlgeschlagen");
                        break SignalingError::Io(e);
                    }
                }

                _ = shutdown_abwarten(&mut shutdown) => {
                    tracing::info!(peer = %peer_addr, "Shutdown-Signal – Verbindung wird getrennt");
                    break SignalingError::getrennt("Server wird heruntergefahren");
                }
            }
        };

        if !matches!(grund, SignalingError::Io(_)) {
            queue_leeren(&mut framed, &mut sende_rx).await;
        }

        if let Some(session) = ctx.session {
            self.state.verbindung_abbauen(
                session,
                &ctx.antwort,
                UserRemove {
                    session,
                    ..Default::default()
                },
            );
        }

        tracing::info!(peer = %peer_addr, grund = %grund, "Verbindungs-Task beendet");
        grund
    }
}

/// Schreibt bereits eingereihte Nachrichten, z.B. ein Reject vor dem Trennen
async fn queue_leeren<S>(framed: &mut Framed<S, FrameCodec>, sende_rx: &mut mpsc::Receiver<Nachricht>)
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    let leeren = async {
        while let Ok(nachricht) = sende_rx.try_recv() {
            framed.feed(nachricht).await?;
        }
        SinkExt::<Nachricht>::flush(framed).await?;
        Ok::<(), std::io::Error>(())
    };
    match tokio::time::timeout(ABSCHIED_TIMEOUT, leeren).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => tracing::debug!(fehler = %e, "Send-Queue nicht vollstaendig geschrieben"),
        Err(_) => tracing::debug!("Leeren der Send-Queue abgebrochen"),
    }
}

/// Endet sobald `shutdown` auf `true` steht; ein geschlossener Sender zaehlt mit
pub(crate) async fn shutdown_abwarten(shutdown: &mut watch::Receiver<bool>) {
    let _ = shutdown.wait_for(|beenden| *beenden).await;
}

fn zeitstempel_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
