//! Event-Broadcaster – Sendet Nachrichten an verbundene Clients
//!
//! Jede Verbindung besitzt eine begrenzte Send-Queue. Der Broadcaster kennt
//! die Queues aller authentifizierten Sitzungen.
//!
//! ## Ueberlauf
//! - Steuernachrichten: volle Queue trennt den langsamen Client
//!   (Signal an seinen Verbindungs-Task), die Nachricht geht verloren
//! - Voice ueber den Tunnel: volle Queue verwirft nur das Paket
//!
//! Broadcasts werden unter dem Schreib-Lock der Registry eingereiht, damit
//! alle Clients Aenderungen in derselben Reihenfolge sehen.

use bytes::Bytes;
use dashmap::DashMap;
use murmel_core::types::SessionId;
use murmel_protocol::control::Nachricht;
use murmel_voice::VoiceSenke;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, Notify};

// ---------------------------------------------------------------------------
// ClientSender
// ---------------------------------------------------------------------------

/// Handle auf die Send-Queue einer Verbindung
#[derive(Clone, Debug)]
pub struct ClientSender {
    pub peer: SocketAddr,
    tx: mpsc::Sender<Nachricht>,
    trennen: Arc<Notify>,
    /// Gesetzt sobald die Sitzung dieser Verbindung abgebaut wurde
    abgebaut: Arc<AtomicBool>,
}

impl ClientSender {
    /// Erstellt Queue und Trenn-Signal fuer eine neue Verbindung
    pub fn neu(peer: SocketAddr, queue_groesse: usize) -> (Self, mpsc::Receiver<Nachricht>) {
        let (tx, rx) = mpsc::channel(queue_groesse.max(1));
        let sender = Self {
            peer,
            tx,
            trennen: Arc::new(Notify::new()),
            abgebaut: Arc::new(AtomicBool::new(false)),
        };
        (sender, rx)
    }

    /// Reiht eine Steuernachricht ein
    ///
    /// Gibt `false` zurueck wenn die Queue voll oder geschlossen ist.
    /// Eine volle Queue loest die Trennung des Clients aus.
    pub fn senden(&self, nachricht: Nachricht) -> bool {
        match self.tx.try_send(nachricht) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                tracing::warn!(peer = %self.peer, "Send-Queue voll – Client wird getrennt");
                self.trennen();
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                tracing::debug!(peer = %self.peer, "Send-Queue geschlossen (Client getrennt)");
                false
            }
        }
    }

    /// Reiht eine Nachricht ein, die bei voller Queue verworfen werden darf
    pub fn senden_verlustbehaftet(&self, nachricht: Nachricht) -> bool {
        match self.tx.try_send(nachricht) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                tracing::trace!(peer = %self.peer, "Send-Queue voll – Paket verworfen");
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        }
    }

    /// Signalisiert dem Verbindungs-Task, die Verbindung zu schliessen
    pub fn trennen(&self) {
        self.trennen.notify_one();
    }

    /// Signal, auf das der Verbindungs-Task wartet
    pub fn trenn_signal(&self) -> Arc<Notify> {
        Arc::clone(&self.trennen)
    }

    /// Markiert die Sitzung als abgebaut; gilt fuer alle Klone
    ///
    /// Wird unter dem Schreib-Guard der Registry gesetzt. Die Sitzungs-ID
    /// kann danach schon an eine andere Verbindung vergeben sein.
    pub fn als_abgebaut_markieren(&self) {
        self.abgebaut.store(true, Ordering::Release);
    }

    pub fn ist_abgebaut(&self) -> bool {
        self.abgebaut.load(Ordering::Acquire)
    }
}

// ---------------------------------------------------------------------------
// TunnelSenke
// ---------------------------------------------------------------------------

/// Voice-Zustellung ueber den Steuerkanal (UDPTunnel)
///
/// Wird benutzt solange der Client keine UDP-Adresse gebunden hat.
pub struct TunnelSenke {
    sender: ClientSender,
}

impl TunnelSenke {
    pub fn neu(sender: ClientSender) -> Self {
        Self { sender }
    }
}

impl VoiceSenke for TunnelSenke {
    fn senden(&self, paket: Bytes) -> bool {
        self.sender
            .senden_verlustbehaftet(Nachricht::UdpTunnel(paket))
    }
}

// ---------------------------------------------------------------------------
// EventBroadcaster
// ---------------------------------------------------------------------------

/// Zentraler Event-Broadcaster fuer alle authentifizierten Sitzungen
///
/// Thread-safe via Arc + DashMap. Clone teilt den inneren Zustand.
#[derive(Clone, Default)]
pub struct EventBroadcaster {
    inner: Arc<EventBroadcasterInner>,
}

#[derive(Default)]
struct EventBroadcasterInner {
    clients: DashMap<SessionId, ClientSender>,
}

impl EventBroadcaster {
    pub fn neu() -> Self {
        Self::default()
    }

    /// Registriert die Send-Queue einer authentifizierten Sitzung
    pub fn client_registrieren(&self, session: SessionId, sender: ClientSender) {
        self.inner.clients.insert(session, sender);
        tracing::debug!(session = %session, "Client im Broadcaster registriert");
    }

    /// Entfernt eine Sitzung und gibt ihre Send-Queue zurueck
    pub fn client_entfernen(&self, session: SessionId) -> Option<ClientSender> {
        let entfernt = self.inner.clients.remove(&session).map(|(_, s)| s);
        if entfernt.is_some() {
            tracing::debug!(session = %session, "Client aus Broadcaster entfernt");
        }
        entfernt
    }

    /// Sendet eine Nachricht an eine einzelne Sitzung
    pub fn an_sitzung_senden(&self, session: SessionId, nachricht: Nachricht) -> bool {
        match self.inner.clients.get(&session) {
            Some(sender) => sender.senden(nachricht),
            None => {
                tracing::debug!(session = %session, "Senden an unbekannte Sitzung");
                false
            }
        }
    }

    /// Sendet eine Nachricht an alle Sitzungen
    ///
    /// Gibt die Anzahl der erfolgreichen Sendungen zurueck.
    pub fn an_alle_senden(&self, nachricht: Nachricht) -> usize {
        let mut gesendet = 0;
        self.inner.clients.iter().for_each(|entry| {
            if entry.value().senden(nachricht.clone()) {
                gesendet += 1;
            }
        });
        gesendet
    }

    pub fn client_anzahl(&self) -> usize {
        self.inner.clients.len()
    }

    pub fn ist_registriert(&self, session: SessionId) -> bool {
        self.inner.clients.contains_key(&session)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
