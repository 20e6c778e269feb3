//! murmel-voice – Voice-Weiterleitung
//!
//! Leitet Voice-Datagramme an die Zuhoerer eines Sprechers weiter.
//!
//! ## Module
//! - [`udp`] – UDP-Listener, Adressbindung und Ping-Echo
//! - [`router`] – Empfaengerauswahl (Kanal, VoiceTarget, Loopback)
//! - [`senke`] – Zustellung pro Empfaenger (UDP oder Tunnel)
//! - [`state`] – Zuordnung UDP-Endpunkt zu Sitzung

pub mod router;
pub mod senke;
pub mod state;
pub mod udp;

pub use router::VoiceRouter;
pub use senke::{UdpSenke, VoiceSenke};
pub use state::VoiceState;
pub use udp::{VoiceServer, VoiceServerConfig};
