//! Voice-State – Zuordnung von UDP-Endpunkten zu Sitzungen
//!
//! Der Endpunkt wird beim ersten erfolgreich entschluesselten Datagramm
//! gebunden und beim Trennen wieder geloest.

use dashmap::DashMap;
use murmel_core::types::SessionId;
use std::net::SocketAddr;
use std::sync::Arc;

/// Endpunkt-Index aller Sitzungen mit gebundener UDP-Adresse
///
/// Thread-safe durch DashMap.
#[derive(Clone, Default)]
pub struct VoiceState {
    inner: Arc<VoiceStateInner>,
}

#[derive(Default)]
struct VoiceStateInner {
    endpunkt_index: DashMap<SocketAddr, SessionId>,
    sitzung_index: DashMap<SessionId, SocketAddr>,
}

impl VoiceState {
    pub fn neu() -> Self {
        Self::default()
    }

    /// Bindet `endpunkt` an `session`; ein vorheriger Endpunkt wird geloest
    pub fn endpunkt_binden(&self, session: SessionId, endpunkt: SocketAddr) {
        if let Some(alt) = self.inner.sitzung_index.insert(session, endpunkt) {
            if alt != endpunkt {
                self.inner.endpunkt_index.remove(&alt);
            }
        }
        self.inner.endpunkt_index.insert(endpunkt, session);
        tracing::debug!(session = %session, endpunkt = %endpunkt, "UDP-Endpunkt gebunden");
    }

    /// Loest den Endpunkt einer Sitzung
    pub fn sitzung_entfernen(&self, session: SessionId) -> Option<SocketAddr> {
        let (_, endpunkt) = self.inner.sitzung_index.remove(&session)?;
        self.inner.endpunkt_index.remove(&endpunkt);
        Some(endpunkt)
    }

    /// Hot Path: Sitzung zu einem Absender
    pub fn session_von_endpunkt(&self, endpunkt: &SocketAddr) -> Option<SessionId> {
        self.inner.endpunkt_index.get(endpunkt).map(|r| *r)
    }

    pub fn endpunkt_von_session(&self, session: SessionId) -> Option<SocketAddr> {
        self.inner.sitzung_index.get(&session).map(|r| *r)
    }

    pub fn anzahl(&self) -> usize {
        self.inner.sitzung_index.len()
    }
}
