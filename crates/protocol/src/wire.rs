//! Wire-Format fuer die Steuerverbindung
//!
//! Frame-basiertes Protokoll: Art(u16 big-endian) + Laenge(u32 big-endian) + Payload.
//!
//! ## Frame-Format
//!
//! ```text
//! +--------+--------+--------+--------+--------+--------+----...----+
//! | Art (u16 BE)    | Laenge (u32 BE)                   | Payload    |
//! +--------+--------+--------+--------+--------+--------+----...----+
//! ```
//!
//! Die Laenge gibt die Anzahl der Payload-Bytes an (ohne die 6 Kopf-Bytes).
//! Der Codec interpretiert die Art nicht; das Dekodieren der Nutzdaten
//! uebernimmt [`crate::control::Nachricht::dekodieren`], damit unbekannte Arten
//! und fehlerhafte Payloads pro Nachricht behandelt werden koennen statt den
//! Stream abzubrechen.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::io;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio_util::codec::{Decoder, Encoder};

use crate::control::Nachricht;

// ---------------------------------------------------------------------------
// Konstanten
// ---------------------------------------------------------------------------

/// Standard-maximale Frame-Groesse (1 MB)
pub const DEFAULT_MAX_FRAME_SIZE: usize = 1024 * 1024;

/// Groesse des Frame-Kopfs (Art + Laenge) in Bytes
pub const KOPF_GROESSE: usize = 6;

// ---------------------------------------------------------------------------
// RohFrame
// ---------------------------------------------------------------------------

/// Ein Frame mit noch nicht interpretierten Nutzdaten
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RohFrame {
    pub art: u16,
    pub nutzdaten: Bytes,
}

// ---------------------------------------------------------------------------
// FrameCodec
// ---------------------------------------------------------------------------

/// tokio-util Codec fuer die frame-basierte Steuerverbindung
///
/// Implementiert `Decoder` (liefert [`RohFrame`]) sowie `Encoder<RohFrame>` und
/// `Encoder<Nachricht>` fuer nahtlose Integration mit `tokio_util::codec::Framed`.
///
/// # Beispiel
///
/// ```rust,no_run
/// use tokio_util::codec::Framed;
/// use murmel_protocol::wire::FrameCodec;
///
/// // let stream = TcpStream::connect(...).await?;
/// // let framed = Framed::new(stream, FrameCodec::new());
/// ```
#[derive(Debug, Clone)]
pub struct FrameCodec {
    /// Maximale erlaubte Payload-Groesse in Bytes
    max_frame_size: usize,
}

impl FrameCodec {
    /// Erstellt einen neuen `FrameCodec` mit Standard-Limits
    pub fn new() -> Self {
        Self {
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
        }
    }

    /// Erstellt einen `FrameCodec` mit benutzerdefinierter maximaler Frame-Groesse
    pub fn with_max_size(max_frame_size: usize) -> Self {
        Self { max_frame_size }
    }

    /// Gibt die konfigurierte maximale Frame-Groesse zurueck
    pub fn max_frame_size(&self) -> usize {
        self.max_frame_size
    }

    fn zu_gross(&self, laenge: usize) -> io::Error {
        io::Error::new(
            io::ErrorKind::InvalidData,
            format!(
                "Frame zu gross: {} Bytes (Maximum: {} Bytes)",
                laenge, self.max_frame_size
            ),
        )
    }
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Decoder-Implementierung
// ---------------------------------------------------------------------------

impl Decoder for FrameCodec {
    type Item = RohFrame;
    type Error = io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        // Warte auf den vollstaendigen Kopf
        if src.len() < KOPF_GROESSE {
            return Ok(None);
        }

        // Kopf lesen ohne den Buffer zu veraendern
        let art = u16::from_be_bytes([src[0], src[1]]);
        let laenge = u32::from_be_bytes([src[2], src[3], src[4], src[5]]) as usize;

        if laenge > self.max_frame_size {
            return Err(self.zu_gross(laenge));
        }

        let gesamt = KOPF_GROESSE + laenge;
        if src.len() < gesamt {
            // Speicher vorbelegen um Reallocations zu vermeiden
            src.reserve(gesamt - src.len());
            return Ok(None);
        }

        src.advance(KOPF_GROESSE);
        let nutzdaten = src.split_to(laenge).freeze();

        Ok(Some(RohFrame { art, nutzdaten }))
    }
}

// ---------------------------------------------------------------------------
// Encoder-Implementierungen
// ---------------------------------------------------------------------------

impl Encoder<RohFrame> for FrameCodec {
    type Error = io::Error;

    fn encode(&mut self, item: RohFrame, dst: &mut BytesMut) -> Result<(), Self::Error> {
        if item.nutzdaten.len() > self.max_frame_size {
            return Err(self.zu_gross(item.nutzdaten.len()));
        }

        dst.reserve(KOPF_GROESSE + item.nutzdaten.len());
        dst.put_u16(item.art);
        dst.put_u32(item.nutzdaten.len() as u32);
        dst.put_slice(&item.nutzdaten);

        Ok(())
    }
}

impl Encoder<Nachricht> for FrameCodec {
    type Error = io::Error;

    fn encode(&mut self, item: Nachricht, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let frame = item
            .kodieren()
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        Encoder::<RohFrame>::encode(self, frame, dst)
    }
}

// ---------------------------------------------------------------------------
// Hilfsfunktionen fuer direktes async Lesen/Schreiben
// ---------------------------------------------------------------------------

/// Liest einen einzelnen Frame aus einem `AsyncRead`
///
/// # Fehler
/// - `UnexpectedEof` wenn die Verbindung vor Abschluss des Frames getrennt wird
/// - `InvalidData` bei zu grossem Frame
pub async fn read_frame<R>(reader: &mut R, max_frame_size: usize) -> io::Result<RohFrame>
where
    R: AsyncRead + Unpin,
{
    let mut kopf = [0u8; KOPF_GROESSE];
    reader.read_exact(&mut kopf).await?;
    let art = u16::from_be_bytes([kopf[0], kopf[1]]);
    let laenge = u32::from_be_bytes([kopf[2], kopf[3], kopf[4], kopf[5]]) as usize;

    if laenge > max_frame_size {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!(
                "Frame zu gross: {} Bytes (Maximum: {} Bytes)",
                laenge, max_frame_size
            ),
        ));
    }

    let mut nutzdaten = vec![0u8; laenge];
    reader.read_exact(&mut nutzdaten).await?;

    Ok(RohFrame {
        art,
        nutzdaten: nutzdaten.into(),
    })
}

/// Schreibt eine Nachricht als einzelnen Frame in einen `AsyncWrite`
///
/// # Fehler
/// - `InvalidData` wenn die Nachricht nicht kodiert werden kann oder zu gross ist
/// - IO-Fehler beim Schreiben
pub async fn write_frame<W>(
    writer: &mut W,
    nachricht: &Nachricht,
    max_frame_size: usize,
) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let frame = nachricht
        .kodieren()
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;

    if frame.nutzdaten.len() > max_frame_size {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!(
                "Nachricht zu gross: {} Bytes (Maximum: {} Bytes)",
                frame.nutzdaten.len(),
                max_frame_size
            ),
        ));
    }

    writer.write_all(&frame.art.to_be_bytes()).await?;
    writer
        .write_all(&(frame.nutzdaten.len() as u32).to_be_bytes())
        .await?;
    writer.write_all(&frame.nutzdaten).await?;

    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
