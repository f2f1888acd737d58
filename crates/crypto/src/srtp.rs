//! Eine Richtung einer SRTP/SRTCP-Session (RFC 3711)
//!
//! Jede Session schuetzt genau eine Richtung eines Links. Die
//! Session-Schluessel werden einmalig im Konstruktor per AES-CM-PRF
//! aus dem Master-Material abgeleitet, danach ist das Master-Material
//! nicht mehr noetig.
//!
//! Rollover-Zaehler werden pro SSRC gefuehrt, damit Audio- und
//! Video-Strom einer Session unabhaengig zaehlen koennen.

use std::collections::HashMap;

use aes::cipher::{KeyIvInit, StreamCipher};
use hmac::{Hmac, Mac};
use sha1::Sha1;

use crate::error::{CryptoError, CryptoResult};
use crate::schluessel::SrtpSchluessel;

type Aes128Ctr = ctr::Ctr128BE<aes::Aes128>;
type HmacSha1 = Hmac<Sha1>;

/// Laenge des Authentisierungs-Tags (80 Bit)
pub const SRTP_AUTH_TAG_LAENGE: usize = 10;

/// Laenge des SRTCP-Index-Felds
const SRTCP_INDEX_LAENGE: usize = 4;

/// E-Bit im SRTCP-Index-Wort: Payload ist verschluesselt
const SRTCP_E_BIT: u32 = 0x8000_0000;

// Ableitungs-Labels aus RFC 3711 Abschnitt 4.3
const LABEL_RTP_KEY: u8 = 0x00;
const LABEL_RTP_AUTH: u8 = 0x01;
const LABEL_RTP_SALT: u8 = 0x02;
const LABEL_RTCP_KEY: u8 = 0x03;
const LABEL_RTCP_AUTH: u8 = 0x04;
const LABEL_RTCP_SALT: u8 = 0x05;

/// Abgeleitete Session-Schluessel fuer RTP oder RTCP
#[derive(Clone)]
struct SessionSchluessel {
    key: [u8; 16],
    salt: [u8; 14],
    auth: [u8; 20],
}

/// Breite des Anti-Replay-Fensters in Paketen
const REPLAY_FENSTER_BITS: u64 = 1024;

/// Gleitendes Anti-Replay-Fenster (RFC 3711 Abschnitt 3.3.2)
///
/// Bit `d` der Maske steht fuer den Index `hoechster - d`. Ein Index
/// wird erst nach erfolgreicher Authentisierung markiert, damit ein
/// Angreifer das Fenster nicht mit Muell verschieben kann.
#[derive(Debug, Clone)]
struct ReplayFenster {
    hoechster: u64,
    maske: [u64; (REPLAY_FENSTER_BITS / 64) as usize],
}

impl Default for ReplayFenster {
    fn default() -> Self {
        Self { hoechster: 0, maske: [0; (REPLAY_FENSTER_BITS / 64) as usize] }
    }
}

impl ReplayFenster {
    /// Prueft ob der Index weder zu alt noch bereits gesehen ist
    fn ist_frisch(&self, index: u64) -> bool {
        if index > self.hoechster {
            return true;
        }
        let abstand = self.hoechster - index;
        if abstand >= REPLAY_FENSTER_BITS {
            return false;
        }
        self.maske[(abstand / 64) as usize] & (1 << (abstand % 64)) == 0
    }

    /// Markiert einen authentisierten Index als gesehen
    fn markieren(&mut self, index: u64) {
        if index > self.hoechster {
            self.verschieben(index - self.hoechster);
            self.hoechster = index;
        }
        let abstand = self.hoechster - index;
        if abstand < REPLAY_FENSTER_BITS {
            self.maske[(abstand / 64) as usize] |= 1 << (abstand % 64);
        }
    }

    /// Schiebt die Maske um `schritte` Indizes in die Vergangenheit
    fn verschieben(&mut self, schritte: u64) {
        if schritte >= REPLAY_FENSTER_BITS {
            self.maske = [0; (REPLAY_FENSTER_BITS / 64) as usize];
            return;
        }
        let worte = (schritte / 64) as usize;
        let bits = (schritte % 64) as u32;
        let mut neu = [0u64; (REPLAY_FENSTER_BITS / 64) as usize];
        for ziel in worte..neu.len() {
            let quelle = ziel - worte;
            let mut wort = self.maske[quelle] << bits;
            if bits > 0 && quelle > 0 {
                wort |= self.maske[quelle - 1] >> (64 - bits);
            }
            neu[ziel] = wort;
        }
        self.maske = neu;
    }
}

/// Rollover-Zustand eines einzelnen RTP-Stroms
#[derive(Debug, Clone, Default)]
struct StromZustand {
    roc: u32,
    letzte_seq: u16,
    initialisiert: bool,
    fenster: ReplayFenster,
}

impl StromZustand {
    /// Schaetzt den ROC fuer eine eingehende Sequenznummer ohne den
    /// Zustand zu veraendern
    fn schaetze_roc(&self, seq: u16) -> u32 {
        if !self.initialisiert {
            return 0;
        }
        let diff = i32::from(seq) - i32::from(self.letzte_seq);
        if diff < -32768 {
            self.roc.wrapping_add(1)
        } else if diff > 32768 {
            self.roc.wrapping_sub(1)
        } else {
            self.roc
        }
    }

    fn uebernehmen(&mut self, seq: u16, roc: u32) {
        let index = paket_index(roc, seq);
        self.fenster.markieren(index);
        // Nachzuegler duerfen den hoechsten Stand nicht zuruecksetzen
        if !self.initialisiert || index >= paket_index(self.roc, self.letzte_seq) {
            self.roc = roc;
            self.letzte_seq = seq;
        }
        self.initialisiert = true;
    }
}

/// SRTP/SRTCP-Kontext fuer eine Richtung eines Links
pub struct SrtpSession {
    rtp: SessionSchluessel,
    rtcp: SessionSchluessel,
    stroeme: HashMap<u32, StromZustand>,
    /// Naechster ausgehender SRTCP-Index (31 Bit)
    srtcp_index: u32,
    /// Replay-Fenster ueber eingehende SRTCP-Indizes
    srtcp_fenster: ReplayFenster,
}

impl std::fmt::Debug for SrtpSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SrtpSession")
            .field("stroeme", &self.stroeme.len())
            .field("srtcp_index", &self.srtcp_index)
            .finish()
    }
}

impl SrtpSession {
    /// Leitet die Session-Schluessel aus dem Master-Material ab
    pub fn neu(schluessel: &SrtpSchluessel) -> Self {
        Self {
            rtp: ableiten_satz(schluessel, LABEL_RTP_KEY, LABEL_RTP_AUTH, LABEL_RTP_SALT),
            rtcp: ableiten_satz(schluessel, LABEL_RTCP_KEY, LABEL_RTCP_AUTH, LABEL_RTCP_SALT),
            stroeme: HashMap::new(),
            srtcp_index: 0,
            srtcp_fenster: ReplayFenster::default(),
        }
    }

    // -----------------------------------------------------------------------
    // SRTP
    // -----------------------------------------------------------------------

    /// Verschluesselt ein RTP-Paket und haengt das Auth-Tag an
    pub fn protect(&mut self, paket: &[u8]) -> CryptoResult<Vec<u8>> {
        let header_laenge = rtp_header_laenge(paket)?;
        let seq = u16::from_be_bytes([paket[2], paket[3]]);
        let ssrc = u32::from_be_bytes([paket[8], paket[9], paket[10], paket[11]]);

        let zustand = self.stroeme.entry(ssrc).or_default();
        let roc = zustand.schaetze_roc(seq);
        zustand.uebernehmen(seq, roc);
        let index = paket_index(roc, seq);

        let mut ausgabe = Vec::with_capacity(paket.len() + SRTP_AUTH_TAG_LAENGE);
        ausgabe.extend_from_slice(paket);

        let iv = keystream_iv(&self.rtp.salt, ssrc, index);
        let mut cipher = Aes128Ctr::new(self.rtp.key.as_slice().into(), iv.as_slice().into());
        cipher.apply_keystream(&mut ausgabe[header_laenge..]);

        let tag = auth_tag(&self.rtp.auth, &ausgabe, Some(roc))?;
        ausgabe.extend_from_slice(&tag);
        Ok(ausgabe)
    }

    /// Prueft das Auth-Tag und entschluesselt ein SRTP-Paket
    pub fn unprotect(&mut self, paket: &[u8]) -> CryptoResult<Vec<u8>> {
        if paket.len() < 12 + SRTP_AUTH_TAG_LAENGE {
            return Err(CryptoError::PaketZuKurz(paket.len()));
        }
        let geschuetzt = &paket[..paket.len() - SRTP_AUTH_TAG_LAENGE];
        let empfangenes_tag = &paket[paket.len() - SRTP_AUTH_TAG_LAENGE..];

        let header_laenge = rtp_header_laenge(geschuetzt)?;
        let seq = u16::from_be_bytes([geschuetzt[2], geschuetzt[3]]);
        let ssrc =
            u32::from_be_bytes([geschuetzt[8], geschuetzt[9], geschuetzt[10], geschuetzt[11]]);

        // ROC erst nach erfolgreicher Authentisierung uebernehmen,
        // sonst kann ein Angreifer den Zaehler verstellen
        let zustand = self.stroeme.entry(ssrc).or_default();
        let roc = zustand.schaetze_roc(seq);

        let erwartetes_tag = auth_tag(&self.rtp.auth, geschuetzt, Some(roc))?;
        if !tags_gleich(empfangenes_tag, &erwartetes_tag) {
            return Err(CryptoError::AuthentisierungFehlgeschlagen);
        }

        let index = paket_index(roc, seq);
        if !zustand.fenster.ist_frisch(index) {
            return Err(CryptoError::Replay(index));
        }
        zustand.uebernehmen(seq, roc);

        let mut ausgabe = geschuetzt.to_vec();
        let iv = keystream_iv(&self.rtp.salt, ssrc, index);
        let mut cipher = Aes128Ctr::new(self.rtp.key.as_slice().into(), iv.as_slice().into());
        cipher.apply_keystream(&mut ausgabe[header_laenge..]);
        Ok(ausgabe)
    }

    // -----------------------------------------------------------------------
    // SRTCP
    // -----------------------------------------------------------------------

    /// Verschluesselt ein RTCP-Paket, haengt Index-Wort und Auth-Tag an
    pub fn protect_rtcp(&mut self, paket: &[u8]) -> CryptoResult<Vec<u8>> {
        if paket.len() < 8 {
            return Err(CryptoError::PaketZuKurz(paket.len()));
        }
        let ssrc = u32::from_be_bytes([paket[4], paket[5], paket[6], paket[7]]);
        let index = self.srtcp_index;
        self.srtcp_index = (self.srtcp_index + 1) & !SRTCP_E_BIT;

        let mut ausgabe =
            Vec::with_capacity(paket.len() + SRTCP_INDEX_LAENGE + SRTP_AUTH_TAG_LAENGE);
        ausgabe.extend_from_slice(paket);

        // Die ersten 8 Bytes (Header + Sender-SSRC) bleiben im Klartext
        let iv = keystream_iv(&self.rtcp.salt, ssrc, u64::from(index));
        let mut cipher = Aes128Ctr::new(self.rtcp.key.as_slice().into(), iv.as_slice().into());
        cipher.apply_keystream(&mut ausgabe[8..]);

        ausgabe.extend_from_slice(&(index | SRTCP_E_BIT).to_be_bytes());
        let tag = auth_tag(&self.rtcp.auth, &ausgabe, None)?;
        ausgabe.extend_from_slice(&tag);
        Ok(ausgabe)
    }

    /// Prueft das Auth-Tag und entschluesselt ein SRTCP-Paket
    pub fn unprotect_rtcp(&mut self, paket: &[u8]) -> CryptoResult<Vec<u8>> {
        if paket.len() < 8 + SRTCP_INDEX_LAENGE + SRTP_AUTH_TAG_LAENGE {
            return Err(CryptoError::PaketZuKurz(paket.len()));
        }
        let tag_start = paket.len() - SRTP_AUTH_TAG_LAENGE;
        let index_start = tag_start - SRTCP_INDEX_LAENGE;

        let erwartetes_tag = auth_tag(&self.rtcp.auth, &paket[..tag_start], None)?;
        if !tags_gleich(&paket[tag_start..], &erwartetes_tag) {
            return Err(CryptoError::AuthentisierungFehlgeschlagen);
        }

        let index_wort = u32::from_be_bytes([
            paket[index_start],
            paket[index_start + 1],
            paket[index_start + 2],
            paket[index_start + 3],
        ]);
        let index = u64::from(index_wort & !SRTCP_E_BIT);
        if !self.srtcp_fenster.ist_frisch(index) {
            return Err(CryptoError::Replay(index));
        }
        self.srtcp_fenster.markieren(index);

        let mut ausgabe = paket[..index_start].to_vec();

        if index_wort & SRTCP_E_BIT != 0 {
            let ssrc = u32::from_be_bytes([paket[4], paket[5], paket[6], paket[7]]);
            let iv = keystream_iv(&self.rtcp.salt, ssrc, index);
            let mut cipher =
                Aes128Ctr::new(self.rtcp.key.as_slice().into(), iv.as_slice().into());
            cipher.apply_keystream(&mut ausgabe[8..]);
        }
        Ok(ausgabe)
    }
}

// ---------------------------------------------------------------------------
// Hilfsfunktionen
// ---------------------------------------------------------------------------

/// Leitet ein Schluessel-Tripel (Key, Auth, Salt) fuer ein Label-Trio ab
fn ableiten_satz(
    schluessel: &SrtpSchluessel,
    label_key: u8,
    label_auth: u8,
    label_salt: u8,
) -> SessionSchluessel {
    let mut satz = SessionSchluessel { key: [0; 16], salt: [0; 14], auth: [0; 20] };
    ableiten(schluessel, label_key, &mut satz.key);
    ableiten(schluessel, label_auth, &mut satz.auth);
    ableiten(schluessel, label_salt, &mut satz.salt);
    satz
}

/// AES-CM-PRF aus RFC 3711: Keystream ueber (Salt XOR Label) als IV
fn ableiten(schluessel: &SrtpSchluessel, label: u8, ausgabe: &mut [u8]) {
    let mut iv = [0u8; 16];
    iv[..14].copy_from_slice(&schluessel.master_salt);
    iv[7] ^= label;

    ausgabe.fill(0);
    let mut cipher =
        Aes128Ctr::new(schluessel.master_key.as_slice().into(), iv.as_slice().into());
    cipher.apply_keystream(ausgabe);
}

/// 48-Bit Paket-Index: ROC || SEQ
fn paket_index(roc: u32, seq: u16) -> u64 {
    (u64::from(roc) << 16) | u64::from(seq)
}

/// IV = (Salt << 16) XOR (SSRC << 64) XOR (Index << 16)
fn keystream_iv(salt: &[u8; 14], ssrc: u32, index: u64) -> [u8; 16] {
    let mut iv = [0u8; 16];
    iv[..14].copy_from_slice(salt);
    for (ziel, quelle) in iv[4..8].iter_mut().zip(ssrc.to_be_bytes()) {
        *ziel ^= quelle;
    }
    for (ziel, quelle) in iv[8..14].iter_mut().zip(&index.to_be_bytes()[2..]) {
        *ziel ^= quelle;
    }
    iv
}

/// HMAC-SHA1-Tag, bei SRTP inklusive angehaengtem ROC
fn auth_tag(
    auth_key: &[u8; 20],
    daten: &[u8],
    roc: Option<u32>,
) -> CryptoResult<[u8; SRTP_AUTH_TAG_LAENGE]> {
    let mut mac = HmacSha1::new_from_slice(auth_key)
        .map_err(|e| CryptoError::Verschluesselung(e.to_string()))?;
    mac.update(daten);
    if let Some(roc) = roc {
        mac.update(&roc.to_be_bytes());
    }
    let ergebnis = mac.finalize().into_bytes();
    let mut tag = [0u8; SRTP_AUTH_TAG_LAENGE];
    tag.copy_from_slice(&ergebnis[..SRTP_AUTH_TAG_LAENGE]);
    Ok(tag)
}

/// Vergleich in konstanter Zeit
fn tags_gleich(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

/// Berechnet die RTP-Header-Laenge inklusive CSRC-Liste und Extension
fn rtp_header_laenge(paket: &[u8]) -> CryptoResult<usize> {
    if paket.len() < 12 {
        return Err(CryptoError::PaketZuKurz(paket.len()));
    }
    if paket[0] >> 6 != 2 {
        return Err(CryptoError::UngueltigesPaket(format!(
            "RTP-Version {} statt 2",
            paket[0] >> 6
        )));
    }
    let csrc_anzahl = usize::from(paket[0] & 0x0f);
    let mut laenge = 12 + 4 * csrc_anzahl;
    if paket[0] & 0x10 != 0 {
        if paket.len() < laenge + 4 {
            return Err(CryptoError::PaketZuKurz(paket.len()));
        }
        let worte =
            usize::from(u16::from_be_bytes([paket[laenge + 2], paket[laenge + 3]]));
        laenge += 4 + 4 * worte;
    }
    if paket.len() < laenge {
        return Err(CryptoError::PaketZuKurz(paket.len()));
    }
    Ok(laenge)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
