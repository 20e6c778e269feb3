//! TCP-Listener – Bindet Socket, akzeptiert Verbindungen
//!
//! Der `SignalingServer` bindet einen TCP-Socket und startet fuer jede
//! eingehende Verbindung einen eigenen tokio-Task mit einer `ClientConnection`.
//! Das Client-Limit wird erst bei der Anmeldung geprueft, damit der Client
//! ein `Reject` mit Grund bekommt.

use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;

use crate::connection::{shutdown_abwarten, ClientConnection};
use crate::server_state::SignalingState;

/// TCP-Signaling-Server
pub struct SignalingServer {
    state: Arc<SignalingState>,
    listener: TcpListener,
}

impl SignalingServer {
    /// Bindet den TCP-Socket
    pub async fn binden(state: Arc<SignalingState>, bind_addr: SocketAddr) -> std::io::Result<Self> {
        let listener = TcpListener::bind(bind_addr).await?;
        Ok(Self { state, listener })
    }

    /// Tatsaechlich gebundene Adresse (relevant bei Port 0)
    pub fn lokale_adresse(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Akzeptiert Verbindungen bis `shutdown` auf `true` wechselt
    ///
    /// Laufende Verbindungen bekommen das Signal ueber ihren eigenen
    /// Receiver und bauen ihre Sitzung selbst ab.
    pub async fn starten(self, mut shutdown: watch::Receiver<bool>) -> std::io::Result<()> {
        let lokale_addr = self.listener.local_addr()?;
        tracing::info!(adresse = %lokale_addr, "TCP Signaling-Server gestartet");

        loop {
            tokio::select! {
                result = self.listener.accept() => {
                    match result {
                        Ok((stream, peer_addr)) => {
                            if let Err(e) = stream.set_nodelay(true) {
                                tracing::debug!(peer = %peer_addr, fehler = %e, "TCP_NODELAY nicht gesetzt");
                            }
                            tracing::debug!(peer = %peer_addr, "Verbindung akzeptiert");

                            let verbindung = ClientConnection::neu(Arc::clone(&self.state), peer_addr);
                            let shutdown_verbindung = shutdown.clone();
                            tokio::spawn(async move {
                                verbindung.verarbeiten(stream, shutdown_verbindung).await;
                            });
                        }
                        Err(e) => {
                            tracing::error!(fehler = %e, "TCP-Accept-Fehler");
                            // Busy-Loop bei erschoepften File-Deskriptoren vermeiden
                            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
                        }
                    }
                }

                _ = shutdown_abwarten(&mut shutdown) => {
                    tracing::info!("Signaling-Server: Shutdown-Signal empfangen");
                    break;
                }
            }
        }

        tracing::info!("TCP Signaling-Server gestoppt");
        Ok(())
    }
}
