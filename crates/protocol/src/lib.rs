//! murmel-protocol – Netzwerkprotokoll-Definitionen
//!
//! Dieses Crate definiert alle Nachrichtentypen, das Frame-Format der
//! Steuerverbindung und das Kopf-Byte der Voice-Datagramme.

pub mod b64;
pub mod control;
pub mod error;
pub mod voice;
pub mod wire;

pub use control::{Nachricht, NachrichtenArt};
pub use error::{ProtokollFehler, ProtokollResult};
pub use voice::{DatagrammKopf, Sprechziel, UdpTyp};
pub use wire::{FrameCodec, RohFrame};
