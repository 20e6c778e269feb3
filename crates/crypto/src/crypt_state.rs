//! Kryptozustand eines Clients fuer den UDP-Tunnel
//!
//! Jeder Client teilt mit dem Server einen 16-Byte-Sitzungsschluessel und
//! zwei 16-Byte-IVs (eines pro Richtung). Jedes Datagramm traegt nur das
//! niederwertigste IV-Byte im Klartext; der Empfaenger rekonstruiert den
//! vollen IV aus seinem erwarteten Wert und erkennt dabei verspaetete,
//! verlorene und wiederholte Pakete.
//!
//! ## Format
//! ```text
//! [iv[0](1)] [ciphertext + auth_tag(16)]
//! ```
//!
//! ## Schluessel
//! Aus dem Sitzungsschluessel werden per HKDF-SHA256 zwei Richtungsschluessel
//! abgeleitet, damit Client und Server nie dasselbe (Schluessel, Nonce)-Paar
//! verwenden. Der volle 16-Byte-IV ist die AES-GCM-Nonce.

use aes_gcm::{
    aead::{
        consts::U16, generic_array::GenericArray, rand_core::RngCore, Aead, KeyInit, OsRng,
    },
    aes::Aes128,
    AesGcm,
};
use hkdf::Hkdf;
use sha2::Sha256;

use crate::error::{CryptoError, CryptoResult};

/// Blockbreite von AES und damit Laenge von Schluessel, IVs und Resync-Nonce
pub const BLOCK_GROESSE: usize = 16;

/// Laenge des Authentifizierungs-Tags
pub const TAG_GROESSE: usize = 16;

/// Kopf eines verschluesselten Datagramms (IV-Byte)
pub const KOPF_GROESSE: usize = 1;

/// Maximaler Abstand fuer als verspaetet akzeptierte Pakete
const SPAET_FENSTER: i32 = 30;

const HKDF_SALZ: &[u8] = b"murmel-udp-tunnel";
const INFO_CLIENT_ZU_SERVER: &[u8] = b"client->server";
const INFO_SERVER_ZU_CLIENT: &[u8] = b"server->client";

/// AES-128-GCM mit 16-Byte-Nonce
type TunnelCipher = AesGcm<Aes128, U16>;

// ---------------------------------------------------------------------------
// Rolle und Statistik
// ---------------------------------------------------------------------------

/// Seite des Tunnels; bestimmt Richtungsschluessel und IV-Zuordnung
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rolle {
    Server,
    Client,
}

/// Paketzaehler der Empfangsrichtung
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CryptStatistik {
    /// In Reihenfolge empfangen
    pub gut: u32,
    /// Verspaetet, aber noch im Fenster
    pub spaet: u32,
    /// Anzahl uebersprungener IVs
    pub verloren: u32,
    /// Erfolgreiche Resyncs
    pub resync: u32,
    /// Verworfene Datagramme (Tag, Wiederholung, Fenster, Laenge)
    pub fehlgeschlagen: u32,
}

/// Ergebnis einer Resync-Anfrage
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResyncErgebnis {
    /// Client hat keinen Nonce geschickt; Antwort ist unser aktueller Sende-IV
    Antwort([u8; BLOCK_GROESSE]),
    /// Nonce des Clients als neuer Empfangs-IV uebernommen
    Uebernommen,
    /// Nonce mit falscher Laenge, Zustand unveraendert
    Ignoriert,
}

// ---------------------------------------------------------------------------
// CryptState
// ---------------------------------------------------------------------------

/// Schluessel, IVs, Wiederholungsschutz und Zaehler eines Tunnels
pub struct CryptState {
    schluessel: [u8; BLOCK_GROESSE],
    encrypt_iv: [u8; BLOCK_GROESSE],
    decrypt_iv: [u8; BLOCK_GROESSE],
    /// iv[1] des zuletzt akzeptierten Pakets pro iv[0]
    verlauf: [Option<u8>; 256],
    sende_cipher: TunnelCipher,
    empfangs_cipher: TunnelCipher,
    statistik: CryptStatistik,
}

impl std::fmt::Debug for CryptState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CryptState")
            .field("encrypt_iv0", &self.encrypt_iv[0])
            .field("decrypt_iv0", &self.decrypt_iv[0])
            .field("statistik", &self.statistik)
            .finish_non_exhaustive()
    }
}

impl CryptState {
    /// Erzeugt einen Server-Zustand mit zufaelligem Schluessel und IVs
    pub fn neu_zufaellig() -> CryptoResult<Self> {
        let mut schluessel = [0u8; BLOCK_GROESSE];
        let mut client_nonce = [0u8; BLOCK_GROESSE];
        let mut server_nonce = [0u8; BLOCK_GROESSE];
        OsRng.fill_bytes(&mut schluessel);
        OsRng.fill_bytes(&mut client_nonce);
        OsRng.fill_bytes(&mut server_nonce);
        Self::aus_parametern(&schluessel, &client_nonce, &server_nonce, Rolle::Server)
    }

    /// Baut einen Zustand aus ausgetauschten Parametern
    ///
    /// Der Server sendet mit `server_nonce` und empfaengt mit `client_nonce`,
    /// der Client umgekehrt.
    pub fn aus_parametern(
        schluessel: &[u8],
        client_nonce: &[u8],
        server_nonce: &[u8],
        rolle: Rolle,
    ) -> CryptoResult<Self> {
        let schluessel: [u8; BLOCK_GROESSE] =
            schluessel
                .try_into()
                .map_err(|_| CryptoError::UngueltigeSchluesselLaenge {
                    erwartet: BLOCK_GROESSE,
                    erhalten: schluessel.len(),
                })?;
        let client_nonce = block_aus(client_nonce)?;
        let server_nonce = block_aus(server_nonce)?;

        let c2s = richtungs_cipher(&schluessel, INFO_CLIENT_ZU_SERVER)?;
        let s2c = richtungs_cipher(&schluessel, INFO_SERVER_ZU_CLIENT)?;

        let (encrypt_iv, decrypt_iv, sende_cipher, empfangs_cipher) = match rolle {
            Rolle::Server => (server_nonce, client_nonce, s2c, c2s),
            Rolle::Client => (client_nonce, server_nonce, c2s, s2c),
        };

        Ok(Self {
            schluessel,
            encrypt_iv,
            decrypt_iv,
            verlauf: [None; 256],
            sende_cipher,
            empfangs_cipher,
            statistik: CryptStatistik::default(),
        })
    }

    /// Erzeugt den passenden Zustand der Gegenseite (Client zu diesem Server)
    pub fn gegenstelle(&self) -> CryptoResult<Self> {
        Self::aus_parametern(
            &self.schluessel,
            &self.decrypt_iv,
            &self.encrypt_iv,
            Rolle::Client,
        )
    }

    pub fn schluessel(&self) -> [u8; BLOCK_GROESSE] {
        self.schluessel
    }

    pub fn encrypt_iv(&self) -> [u8; BLOCK_GROESSE] {
        self.encrypt_iv
    }

    pub fn decrypt_iv(&self) -> [u8; BLOCK_GROESSE] {
        self.decrypt_iv
    }

    pub fn statistik(&self) -> CryptStatistik {
        self.statistik
    }

    // -----------------------------------------------------------------------
    // Verschluesseln
    // -----------------------------------------------------------------------

    /// Verschluesselt ein Datagramm mit dem naechsten Sende-IV
    pub fn verschluesseln(&mut self, klartext: &[u8]) -> CryptoResult<Vec<u8>> {
        iv_erhoehen(&mut self.encrypt_iv, 0);

        let chiffrat = self
            .sende_cipher
            .encrypt(GenericArray::from_slice(&self.encrypt_iv), klartext)
            .map_err(|_| CryptoError::Verschluesselung)?;

        let mut ausgabe = Vec::with_capacity(KOPF_GROESSE + chiffrat.len());
        ausgabe.push(self.encrypt_iv[0]);
        ausgabe.extend_from_slice(&chiffrat);
        Ok(ausgabe)
    }

    // -----------------------------------------------------------------------
    // Entschluesseln
    // -----------------------------------------------------------------------

    /// Entschluesselt ein Datagramm und aktualisiert IV-Fenster und Zaehler
    ///
    /// Bei jedem Fehler bleibt der Empfangs-IV unveraendert und
    /// `fehlgeschlagen` wird erhoeht.
    pub fn entschluesseln(&mut self, daten: &[u8]) -> CryptoResult<Vec<u8>> {
        match self.entschluesseln_intern(daten) {
            Ok(klartext) => Ok(klartext),
            Err(e) => {
                self.statistik.fehlgeschlagen = self.statistik.fehlgeschlagen.wrapping_add(1);
                tracing::trace!(fehler = %e, "Datagramm verworfen");
                Err(e)
            }
        }
    }

    fn entschluesseln_intern(&mut self, daten: &[u8]) -> CryptoResult<Vec<u8>> {
        if daten.len() < KOPF_GROESSE + TAG_GROESSE {
            return Err(CryptoError::ZuKurz { laenge: daten.len() });
        }

        let ivbyte = daten[0];
        let sicherung = self.decrypt_iv;
        let erwartet = self.decrypt_iv[0];
        let mut wiederherstellen = false;
        let mut einordnung = Einordnung::Gut;

        if erwartet.wrapping_add(1) == ivbyte {
            // In Reihenfolge
            if ivbyte < erwartet {
                iv_erhoehen(&mut self.decrypt_iv, 1);
            }
            self.decrypt_iv[0] = ivbyte;
        } else {
            let mut abstand = ivbyte as i32 - erwartet as i32;
            if abstand > 128 {
                abstand -= 256;
            } else if abstand < -128 {
                abstand += 256;
            }

            if abstand > -SPAET_FENSTER && abstand < 0 {
                // Verspaetet; liegt ivbyte oberhalb, stammt es aus der vorigen Runde
                if ivbyte > erwartet {
                    iv_verringern(&mut self.decrypt_iv, 1);
                }
                self.decrypt_iv[0] = ivbyte;
                einordnung = Einordnung::Spaet;
                wiederherstellen = true;
            } else if abstand > 0 {
                // Luecke; liegt ivbyte unterhalb, ist iv[0] uebergelaufen
                if ivbyte < erwartet {
                    iv_erhoehen(&mut self.decrypt_iv, 1);
                }
                einordnung = Einordnung::Verloren((abstand - 1) as u32);
                self.decrypt_iv[0] = ivbyte;
            } else {
                return Err(CryptoError::AusserhalbFenster { ivbyte });
            }

            if self.verlauf[self.decrypt_iv[0] as usize] == Some(self.decrypt_iv[1]) {
                self.decrypt_iv = sicherung;
                return Err(CryptoError::Wiederholung);
            }
        }

        let klartext = match self
            .empfangs_cipher
            .decrypt(GenericArray::from_slice(&self.decrypt_iv), &daten[KOPF_GROESSE..])
        {
            Ok(klartext) => klartext,
            Err(_) => {
                self.decrypt_iv = sicherung;
                return Err(CryptoError::Authentifizierung);
            }
        };

        self.verlauf[self.decrypt_iv[0] as usize] = Some(self.decrypt_iv[1]);
        if wiederherstellen {
            self.decrypt_iv = sicherung;
        }

        match einordnung {
            Einordnung::Gut => self.statistik.gut = self.statistik.gut.wrapping_add(1),
            Einordnung::Spaet => self.statistik.spaet = self.statistik.spaet.wrapping_add(1),
            Einordnung::Verloren(anzahl) => {
                self.statistik.verloren = self.statistik.verloren.wrapping_add(anzahl)
            }
        }

        Ok(klartext)
    }

    // -----------------------------------------------------------------------
    // Resync
    // -----------------------------------------------------------------------

    /// Setzt den Empfangs-IV auf den vom Client gesendeten Nonce
    pub fn decrypt_iv_setzen(&mut self, nonce: &[u8]) -> CryptoResult<()> {
        self.decrypt_iv = block_aus(nonce)?;
        self.verlauf = [None; 256];
        self.statistik.resync = self.statistik.resync.wrapping_add(1);
        Ok(())
    }

    /// Verarbeitet den Nonce einer CryptSetup-Anfrage
    ///
    /// Kein oder leerer Nonce: Antwort mit dem aktuellen Sende-IV.
    /// Nonce mit exakt 16 Bytes: neuer Empfangs-IV. Sonst: ignoriert.
    pub fn resync_verarbeiten(&mut self, client_nonce: Option<&[u8]>) -> ResyncErgebnis {
        match client_nonce {
            None => ResyncErgebnis::Antwort(self.encrypt_iv),
            Some(nonce) if nonce.is_empty() => ResyncErgebnis::Antwort(self.encrypt_iv),
            Some(nonce) => match self.decrypt_iv_setzen(nonce) {
                Ok(()) => ResyncErgebnis::Uebernommen,
                Err(e) => {
                    tracing::debug!(fehler = %e, "Resync-Nonce ignoriert");
                    ResyncErgebnis::Ignoriert
                }
            },
        }
    }
}

// ---------------------------------------------------------------------------
// Hilfsfunktionen
// ---------------------------------------------------------------------------

enum Einordnung {
    Gut,
    Spaet,
    Verloren(u32),
}

fn block_aus(bytes: &[u8]) -> CryptoResult<[u8; BLOCK_GROESSE]> {
    bytes.try_into().map_err(|_| CryptoError::UngueltigeNonce {
        erwartet: BLOCK_GROESSE,
        erhalten: bytes.len(),
    })
}

fn richtungs_cipher(schluessel: &[u8; BLOCK_GROESSE], info: &[u8]) -> CryptoResult<TunnelCipher> {
    let hk = Hkdf::<Sha256>::new(Some(HKDF_SALZ), schluessel);
    let mut abgeleitet = [0u8; BLOCK_GROESSE];
    hk.expand(info, &mut abgeleitet)
        .map_err(|e| CryptoError::KeyDerivation(e.to_string()))?;
    TunnelCipher::new_from_slice(&abgeleitet).map_err(|_| {
        CryptoError::UngueltigeSchluesselLaenge {
            erwartet: BLOCK_GROESSE,
            erhalten: abgeleitet.len(),
        }
    })
}

/// Erhoeht den IV little-endian ab Byte `ab` mit Uebertrag
fn iv_erhoehen(iv: &mut [u8; BLOCK_GROESSE], ab: usize) {
    for byte in iv.iter_mut().skip(ab) {
        *byte = byte.wrapping_add(1);
        if *byte != 0 {
            break;
        }
    }
}

/// Verringert den IV little-endian ab Byte `ab` mit Uebertrag
fn iv_verringern(iv: &mut [u8; BLOCK_GROESSE], ab: usize) {
    for byte in iv.iter_mut().skip(ab) {
        *byte = byte.wrapping_sub(1);
        if *byte != 0xFF {
            break;
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn paar() -> (CryptState, CryptState) {
        let server = CryptState::neu_zufaellig().unwrap();
        let client = server.gegenstelle().unwrap();
        (server, client)
    }

    #[test]
    fn in_reihenfolge_zaehlt_gut() {
        let (mut server, mut client) = paar();
        for i in 0..5u8 {
            let paket = client.verschluesseln(&[i; 20]).unwrap();
            assert_eq!(paket.len(), KOPF_GROESSE + 20 + TAG_GROESSE);
            assert_eq!(server.entschluesseln(&paket).unwrap(), vec![i; 20]);
        }
        let s = server.statistik();
        assert_eq!(s.gut, 5);
        assert_eq!((s.spaet, s.verloren, s.fehlgeschlagen), (0, 0, 0));
    }

    #[test]
    fn beide_richtungen_funktionieren() {
        let (mut server, mut client) = paar();
        let paket = server.verschluesseln(b"an client").unwrap();
        assert_eq!(client.entschluesseln(&paket).unwrap(), b"an client");
        let paket = client.verschluesseln(b"an server").unwrap();
        assert_eq!(server.entschluesseln(&paket).unwrap(), b"an server");
    }

    #[test]
    fn richtungen_verwenden_getrennte_schluessel() {
        let (mut server, client) = paar();
        // Ein vom Server verschluesseltes Paket darf der Server selbst nicht
        // als Client-Paket akzeptieren, auch wenn die IVs zufaellig passen.
        let mut spiegel = CryptState::aus_parametern(
            &server.schluessel(),
            &server.encrypt_iv(),
            &client.encrypt_iv(),
            Rolle::Server,
        )
        .unwrap();
        let paket = server.verschluesseln(b"echo").unwrap();
        assert!(spiegel.entschluesseln(&paket).is_err());
    }

    #[test]
    fn luecke_zaehlt_verlorene_pakete() {
        let (mut server, mut client) = paar();
        let p1 = client.verschluesseln(b"1").unwrap();
        let _p2 = client.verschluesseln(b"2").unwrap();
        let _p3 = client.verschluesseln(b"3").unwrap();
        let p4 = client.verschluesseln(b"4").unwrap();

        server.entschluesseln(&p1).unwrap();
        server.entschluesseln(&p4).unwrap();
        let s = server.statistik();
        assert_eq!(s.gut, 1);
        assert_eq!(s.verloren, 2);
        assert_eq!(s.spaet, 0);
    }

    #[test]
    fn verspaetetes_paket_zaehlt_nur_spaet() {
        let (mut server, mut client) = paar();
        let p1 = client.verschluesseln(b"1").unwrap();
        let p2 = client.verschluesseln(b"2").unwrap();
        let p3 = client.verschluesseln(b"3").unwrap();
        let p4 = client.verschluesseln(b"4").unwrap();

        server.entschluesseln(&p1).unwrap();
        server.entschluesseln(&p3).unwrap();
        let iv_vorher = server.decrypt_iv();
        assert_eq!(server.entschluesseln(&p2).unwrap(), b"2");
        assert_eq!(server.decrypt_iv(), iv_vorher, "IV nach spaetem Paket wiederhergestellt");
        server.entschluesseln(&p4).unwrap();

        let s = server.statistik();
        assert_eq!(s.gut, 2);
        assert_eq!(s.spaet, 1);
        assert_eq!(s.verloren, 1);
    }

    #[test]
    fn wiederholung_wird_abgelehnt() {
        let (mut server, mut client) = paar();
        let p1 = client.verschluesseln(b"1").unwrap();
        let p2 = client.verschluesseln(b"2").unwrap();
        server.entschluesseln(&p1).unwrap();
        server.entschluesseln(&p2).unwrap();

        let iv_vorher = server.decrypt_iv();
        assert_eq!(server.entschluesseln(&p1), Err(CryptoError::Wiederholung));
        assert_eq!(server.decrypt_iv(), iv_vorher);
        assert_eq!(server.statistik().fehlgeschlagen, 1);
    }

    #[test]
    fn manipuliertes_paket_stellt_iv_wieder_her() {
        let (mut server, mut client) = paar();
        let mut p1 = client.verschluesseln(b"hallo welt").unwrap();
        let p2 = client.verschluesseln(b"zweites").unwrap();
        let letztes = p1.len() - 1;
        p1[letztes] ^= 0x01;

        let iv_vorher = server.decrypt_iv();
        assert_eq!(server.entschluesseln(&p1), Err(CryptoError::Authentifizierung));
        assert_eq!(server.decrypt_iv(), iv_vorher);
        assert_eq!(server.statistik().fehlgeschlagen, 1);

        // Folgepaket wird als Luecke von 1 eingeordnet
        assert_eq!(server.entschluesseln(&p2).unwrap(), b"zweites");
        assert_eq!(server.statistik().verloren, 1);
    }

    #[test]
    fn zu_kurzes_datagramm() {
        let (mut server, _) = paar();
        assert_eq!(
            server.entschluesseln(&[1, 2, 3]),
            Err(CryptoError::ZuKurz { laenge: 3 })
        );
        assert_eq!(server.statistik().fehlgeschlagen, 1);
        assert!(server.entschluesseln(&[]).is_err());
    }

    #[test]
    fn ueberlauf_von_iv0_traegt_in_iv1() {
        let (mut server, mut client) = paar();
        for i in 0..600u32 {
            let paket = client.verschluesseln(&i.to_be_bytes()).unwrap();
            assert_eq!(server.entschluesseln(&paket).unwrap(), i.to_be_bytes());
        }
        assert_eq!(server.statistik().gut, 600);
        assert_eq!(server.decrypt_iv(), client.encrypt_iv());
    }

    #[test]
    fn resync_ohne_nonce_antwortet_mit_sende_iv() {
        let (mut server, _) = paar();
        let iv = server.encrypt_iv();
        assert_eq!(server.resync_verarbeiten(None), ResyncErgebnis::Antwort(iv));
        assert_eq!(server.resync_verarbeiten(Some(&[])), ResyncErgebnis::Antwort(iv));
        assert_eq!(server.statistik().resync, 0);
    }

    #[test]
    fn resync_mit_nonce_setzt_decrypt_iv() {
        let (mut server, _) = paar();
        let nonce = [7u8; BLOCK_GROESSE];
        assert_eq!(server.resync_verarbeiten(Some(&nonce)), ResyncErgebnis::Uebernommen);
        assert_eq!(server.decrypt_iv(), nonce);
        assert_eq!(server.statistik().resync, 1);
    }

    #[test]
    fn resync_mit_falscher_laenge_aendert_nichts() {
        let (mut server, _) = paar();
        let vorher = server.decrypt_iv();
        assert_eq!(server.resync_verarbeiten(Some(&[1u8; 15])), ResyncErgebnis::Ignoriert);
        assert_eq!(server.resync_verarbeiten(Some(&[1u8; 17])), ResyncErgebnis::Ignoriert);
        assert_eq!(server.decrypt_iv(), vorher);
        assert_eq!(server.statistik().resync, 0);
    }

    #[test]
    fn resync_stellt_verbindung_nach_iv_verlust_wieder_her() {
        let (mut server, mut client) = paar();
        // Client verschluesselt 200 Pakete, die alle verloren gehen
        for _ in 0..200 {
            client.verschluesseln(b"weg").unwrap();
        }
        server.resync_verarbeiten(Some(&client.encrypt_iv()));
        let paket = client.verschluesseln(b"wieder da").unwrap();
        assert_eq!(server.entschluesseln(&paket).unwrap(), b"wieder da");
    }

    #[test]
    fn ungueltige_parameter() {
        assert!(matches!(
            CryptState::aus_parametern(&[0u8; 8], &[0u8; 16], &[0u8; 16], Rolle::Server),
            Err(CryptoError::UngueltigeSchluesselLaenge { erwartet: 16, erhalten: 8 })
        ));
        assert!(matches!(
            CryptState::aus_parametern(&[0u8; 16], &[0u8; 12], &[0u8; 16], Rolle::Client),
            Err(CryptoError::UngueltigeNonce { erwartet: 16, erhalten: 12 })
        ));
    }

    #[test]
    fn iv_arithmetik() {
        let mut iv = [0u8; BLOCK_GROESSE];
        iv[1] = 0xFF;
        iv_erhoehen(&mut iv, 1);
        assert_eq!(&iv[..3], &[0, 0, 1]);
        iv_verringern(&mut iv, 1);
        assert_eq!(&iv[..3], &[0, 0xFF, 0]);
    }
}
