//! STUN-Codec fuer die ICE-Konnektivitaetspruefung (RFC 5389)
//!
//! Das Relay agiert als ice-lite-Responder: es beantwortet Binding
//! Requests, stellt aber selbst keine Anfragen. Der Codec deckt genau
//! die dafuer noetige Teilmenge ab: Dekodierung von Binding Requests
//! samt Short-Term-Credential-Pruefung, Erfolgs- und Fehlerantworten
//! sowie ein Request-Builder fuer Tests und Clients.

use std::net::{IpAddr, SocketAddr};

use crc::{Crc, CRC_32_ISO_HDLC};
use hmac::{Hmac, Mac};
use sha1::Sha1;
use thiserror::Error;

type HmacSha1 = Hmac<Sha1>;

/// STUN Magic-Cookie (RFC 5389)
pub const MAGIC_COOKIE: u32 = 0x2112_a442;

/// XOR-Konstante des FINGERPRINT-Attributs, ASCII "STUN"
const FINGERPRINT_XOR: u32 = 0x5354_554e;

const CRC32: Crc<u32> = Crc::<u32>::new(&CRC_32_ISO_HDLC);

/// Laenge des STUN-Headers
pub const HEADER_LAENGE: usize = 20;

/// Methode Binding
const METHODE_BINDING: u16 = 0x0001;

// Attribut-Typen (RFC 5389 + RFC 8445)
const ATTR_USERNAME: u16 = 0x0006;
const ATTR_MESSAGE_INTEGRITY: u16 = 0x0008;
const ATTR_ERROR_CODE: u16 = 0x0009;
const ATTR_UNKNOWN_ATTRIBUTES: u16 = 0x000a;
const ATTR_XOR_MAPPED_ADDRESS: u16 = 0x0020;
const ATTR_PRIORITY: u16 = 0x0024;
const ATTR_USE_CANDIDATE: u16 = 0x0025;
const ATTR_SOFTWARE: u16 = 0x8022;
const ATTR_FINGERPRINT: u16 = 0x8028;
const ATTR_ICE_CONTROLLED: u16 = 0x8029;
const ATTR_ICE_CONTROLLING: u16 = 0x802a;

/// Fehler beim Dekodieren einer STUN-Nachricht
#[derive(Debug, Error, PartialEq, Eq)]
pub enum StunFehler {
    #[error("Nachricht zu kurz: {0} Bytes")]
    ZuKurz(usize),

    #[error("Kein STUN: Cookie oder Typ-Bits passen nicht")]
    KeinStun,

    #[error("Laengenfeld inkonsistent: Header meldet {gemeldet}, Puffer hat {vorhanden}")]
    LaengeInkonsistent { gemeldet: usize, vorhanden: usize },

    #[error("Attribut {typ:#06x} ragt ueber das Nachrichtenende hinaus")]
    AttributUeberlauf { typ: u16 },

    #[error("Attribut {typ:#06x} hat ungueltige Laenge {laenge}")]
    AttributLaenge { typ: u16, laenge: usize },

    #[error("Unbekannte Methode {0:#05x}")]
    UnbekannteMethode(u16),
}

/// Klasse einer STUN-Nachricht
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StunKlasse {
    Anfrage,
    Indikation,
    Erfolg,
    Fehler,
}

/// Dekodierte Sicht auf eine STUN-Nachricht
///
/// Die Offsets von MESSAGE-INTEGRITY und FINGERPRINT werden mitgefuehrt,
/// damit die Pruefungen ueber dem Originalpuffer laufen koennen.
#[derive(Debug, Clone, PartialEq)]
pub struct StunNachricht {
    pub klasse: StunKlasse,
    pub methode: u16,
    pub transaktions_id: [u8; 12],
    pub benutzername: Option<Vec<u8>>,
    pub prioritaet: Option<u32>,
    pub use_candidate: bool,
    pub ice_controlling: bool,
    pub ice_controlled: bool,
    pub xor_adresse: Option<SocketAddr>,
    /// Code aus einem ERROR-CODE-Attribut (nur in Fehlerantworten)
    pub fehler_code: Option<u16>,
    /// Comprehension-required-Attribute die der Codec nicht kennt
    pub unbekannte_attribute: Vec<u16>,
    integritaet: Option<(usize, [u8; 20])>,
    fingerprint: Option<(usize, u32)>,
}

impl StunNachricht {
    /// Dekodiert eine STUN-Nachricht aus einem Datagramm
    pub fn dekodieren(paket: &[u8]) -> Result<Self, StunFehler> {
        if paket.len() < HEADER_LAENGE {
            return Err(StunFehler::ZuKurz(paket.len()));
        }
        let typ = u16::from_be_bytes([paket[0], paket[1]]);
        if typ & 0xc000 != 0 || paket[4..8] != MAGIC_COOKIE.to_be_bytes() {
            return Err(StunFehler::KeinStun);
        }
        let gemeldet = usize::from(u16::from_be_bytes([paket[2], paket[3]]));
        if gemeldet % 4 != 0 || HEADER_LAENGE + gemeldet != paket.len() {
            return Err(StunFehler::LaengeInkonsistent {
                gemeldet,
                vorhanden: paket.len() - HEADER_LAENGE,
            });
        }

        let klasse = match ((typ >> 7) & 0b10) | ((typ >> 4) & 0b01) {
            0b00 => StunKlasse::Anfrage,
            0b01 => StunKlasse::Indikation,
            0b10 => StunKlasse::Erfolg,
            _ => StunKlasse::Fehler,
        };
        let methode = (typ & 0x000f) | ((typ >> 1) & 0x0070) | ((typ >> 2) & 0x0f80);

        let mut transaktions_id = [0u8; 12];
        transaktions_id.copy_from_slice(&paket[8..20]);

        let mut nachricht = StunNachricht {
            klasse,
            methode,
            transaktions_id,
            benutzername: None,
            prioritaet: None,
            use_candidate: false,
            ice_controlling: false,
            ice_controlled: false,
            xor_adresse: None,
            fehler_code: None,
            unbekannte_attribute: Vec::new(),
            integritaet: None,
            fingerprint: None,
        };

        let mut pos = HEADER_LAENGE;
        while pos + 4 <= paket.len() {
            let attr_typ = u16::from_be_bytes([paket[pos], paket[pos + 1]]);
            let laenge = usize::from(u16::from_be_bytes([paket[pos + 2], paket[pos + 3]]));
            let wert_start = pos + 4;
            let wert_ende = wert_start + laenge;
            if wert_ende > paket.len() {
                return Err(StunFehler::AttributUeberlauf { typ: attr_typ });
            }
            let wert = &paket[wert_start..wert_ende];

            match attr_typ {
                ATTR_USERNAME => nachricht.benutzername = Some(wert.to_vec()),
                ATTR_PRIORITY => {
                    if laenge != 4 {
                        return Err(StunFehler::AttributLaenge { typ: attr_typ, laenge });
                    }
                    nachricht.prioritaet =
                        Some(u32::from_be_bytes([wert[0], wert[1], wert[2], wert[3]]));
                }
                ATTR_USE_CANDIDATE => nachricht.use_candidate = true,
                ATTR_ICE_CONTROLLING => nachricht.ice_controlling = true,
                ATTR_ICE_CONTROLLED => nachricht.ice_controlled = true,
                ATTR_XOR_MAPPED_ADDRESS => {
                    nachricht.xor_adresse = xor_adresse_lesen(wert, &transaktions_id);
                }
                ATTR_MESSAGE_INTEGRITY => {
                    if laenge != 20 {
                        return Err(StunFehler::AttributLaenge { typ: attr_typ, laenge });
                    }
                    let mut hmac_wert = [0u8; 20];
                    hmac_wert.copy_from_slice(wert);
                    nachricht.integritaet = Some((pos, hmac_wert));
                }
                ATTR_FINGERPRINT => {
                    if laenge != 4 {
                        return Err(StunFehler::AttributLaenge { typ: attr_typ, laenge });
                    }
                    nachricht.fingerprint = Some((
                        pos,
                        u32::from_be_bytes([wert[0], wert[1], wert[2], wert[3]]),
                    ));
                }
                ATTR_ERROR_CODE => {
                    if laenge < 4 {
                        return Err(StunFehler::AttributLaenge { typ: attr_typ, laenge });
                    }
                    nachricht.fehler_code =
                        Some(u16::from(wert[2] & 0x07) * 100 + u16::from(wert[3]));
                }
                ATTR_UNKNOWN_ATTRIBUTES | ATTR_SOFTWARE => {}
                typ if typ < 0x8000 => nachricht.unbekannte_attribute.push(typ),
                // Comprehension-optional: ignorieren
                _ => {}
            }

            pos = wert_ende + ((4 - laenge % 4) % 4);
        }

        Ok(nachricht)
    }

    /// True wenn ein MESSAGE-INTEGRITY-Attribut vorhanden ist
    pub fn hat_integritaet(&self) -> bool {
        self.integritaet.is_some()
    }

    /// True wenn ein FINGERPRINT-Attribut vorhanden ist
    pub fn hat_fingerprint(&self) -> bool {
        self.fingerprint.is_some()
    }

    /// Prueft das FINGERPRINT-Attribut gegen den Originalpuffer
    pub fn pruefe_fingerprint(&self, paket: &[u8]) -> bool {
        match self.fingerprint {
            Some((offset, wert)) => {
                CRC32.checksum(&paket[..offset]) ^ FINGERPRINT_XOR == wert
            }
            None => false,
        }
    }

    /// Prueft MESSAGE-INTEGRITY mit dem Short-Term-Passwort
    ///
    /// Der HMAC laeuft ueber die Nachricht bis zum Attribut, wobei das
    /// Laengenfeld so angepasst wird als endete die Nachricht direkt
    /// hinter MESSAGE-INTEGRITY (RFC 5389 Abschnitt 15.4).
    pub fn pruefe_integritaet(&self, paket: &[u8], passwort: &[u8]) -> bool {
        let Some((offset, erwartet)) = self.integritaet else {
            return false;
        };
        let mut gedeckt = paket[..offset].to_vec();
        let laenge = (offset - HEADER_LAENGE + 24) as u16;
        gedeckt[2..4].copy_from_slice(&laenge.to_be_bytes());

        let Ok(mut mac) = HmacSha1::new_from_slice(passwort) else {
            return false;
        };
        mac.update(&gedeckt);
        mac.verify_slice(&erwartet).is_ok()
    }
}

// ---------------------------------------------------------------------------
// Antwort- und Anfrage-Builder
// ---------------------------------------------------------------------------

/// Baut eine Binding-Erfolgsantwort mit XOR-MAPPED-ADDRESS
pub fn erfolgs_antwort(
    transaktions_id: &[u8; 12],
    quelle: SocketAddr,
    passwort: &[u8],
) -> Vec<u8> {
    let mut puffer = header(0x0101, transaktions_id);
    attribut_anhaengen(&mut puffer, ATTR_XOR_MAPPED_ADDRESS, &xor_adresse_schreiben(quelle, transaktions_id));
    integritaet_anhaengen(&mut puffer, passwort);
    fingerprint_anhaengen(&mut puffer);
    puffer
}

/// Baut eine Binding-Fehlerantwort
///
/// Bei Code 420 gehoert die Liste der unbekannten Attribute in die
/// Antwort, sonst bleibt `unbekannte` leer.
pub fn fehler_antwort(
    transaktions_id: &[u8; 12],
    code: u16,
    grund: &str,
    unbekannte: &[u16],
) -> Vec<u8> {
    let mut puffer = header(0x0111, transaktions_id);

    let mut fehler_wert = vec![0, 0, (code / 100) as u8, (code % 100) as u8];
    fehler_wert.extend_from_slice(grund.as_bytes());
    attribut_anhaengen(&mut puffer, ATTR_ERROR_CODE, &fehler_wert);

    if !unbekannte.is_empty() {
        let mut liste = Vec::with_capacity(unbekannte.len() * 2);
        for typ in unbekannte {
            liste.extend_from_slice(&typ.to_be_bytes());
        }
        attribut_anhaengen(&mut puffer, ATTR_UNKNOWN_ATTRIBUTES, &liste);
    }

    fingerprint_anhaengen(&mut puffer);
    puffer
}

/// Parameter fuer einen Binding Request (Client-Seite und Tests)
#[derive(Debug, Clone)]
pub struct BindingAnfrage<'a> {
    pub benutzername: &'a [u8],
    pub passwort: &'a [u8],
    pub prioritaet: u32,
    pub use_candidate: bool,
    /// Tie-Breaker fuer ICE-CONTROLLING
    pub controlling: Option<u64>,
    /// Tie-Breaker fuer ICE-CONTROLLED (nur von Fehlkonfigurationen gesendet)
    pub controlled: Option<u64>,
}

/// Baut einen Binding Request mit MESSAGE-INTEGRITY und FINGERPRINT
pub fn binding_anfrage(transaktions_id: &[u8; 12], anfrage: &BindingAnfrage<'_>) -> Vec<u8> {
    let mut puffer = header(METHODE_BINDING, transaktions_id);
    attribut_anhaengen(&mut puffer, ATTR_USERNAME, anfrage.benutzername);
    attribut_anhaengen(&mut puffer, ATTR_PRIORITY, &anfrage.prioritaet.to_be_bytes());
    if let Some(tie_breaker) = anfrage.controlling {
        attribut_anhaengen(&mut puffer, ATTR_ICE_CONTROLLING, &tie_breaker.to_be_bytes());
    }
    if let Some(tie_breaker) = anfrage.controlled {
        attribut_anhaengen(&mut puffer, ATTR_ICE_CONTROLLED, &tie_breaker.to_be_bytes());
    }
    if anfrage.use_candidate {
        attribut_anhaengen(&mut puffer, ATTR_USE_CANDIDATE, &[]);
    }
    integritaet_anhaengen(&mut puffer, anfrage.passwort);
    fingerprint_anhaengen(&mut puffer);
    puffer
}

fn header(typ: u16, transaktions_id: &[u8; 12]) -> Vec<u8> {
    let mut puffer = Vec::with_capacity(128);
    puffer.extend_from_slice(&typ.to_be_bytes());
    puffer.extend_from_slice(&[0, 0]);
    puffer.extend_from_slice(&MAGIC_COOKIE.to_be_bytes());
    puffer.extend_from_slice(transaktions_id);
    puffer
}

/// Haengt ein Attribut samt Padding an und pflegt das Laengenfeld
fn attribut_anhaengen(puffer: &mut Vec<u8>, typ: u16, wert: &[u8]) {
    puffer.extend_from_slice(&typ.to_be_bytes());
    puffer.extend_from_slice(&(wert.len() as u16).to_be_bytes());
    puffer.extend_from_slice(wert);
    while puffer.len() % 4 != 0 {
        puffer.push(0);
    }
    let laenge = (puffer.len() - HEADER_LAENGE) as u16;
    puffer[2..4].copy_from_slice(&laenge.to_be_bytes());
}

/// Haengt MESSAGE-INTEGRITY an; das Laengenfeld deckt das Attribut
/// bereits ab bevor der HMAC gerechnet wird
fn integritaet_anhaengen(puffer: &mut Vec<u8>, passwort: &[u8]) {
    let laenge = (puffer.len() - HEADER_LAENGE + 24) as u16;
    puffer[2..4].copy_from_slice(&laenge.to_be_bytes());

    let mut mac =
        HmacSha1::new_from_slice(passwort).expect("HMAC-SHA1 akzeptiert jede Schluessellaenge");
    mac.update(puffer);
    let hmac_wert = mac.finalize().into_bytes();

    puffer.extend_from_slice(&ATTR_MESSAGE_INTEGRITY.to_be_bytes());
    puffer.extend_from_slice(&20u16.to_be_bytes());
    puffer.extend_from_slice(&hmac_wert);
}

/// Haengt FINGERPRINT an; das Laengenfeld deckt das Attribut bereits ab
fn fingerprint_anhaengen(puffer: &mut Vec<u8>) {
    let laenge = (puffer.len() - HEADER_LAENGE + 8) as u16;
    puffer[2..4].copy_from_slice(&laenge.to_be_bytes());

    let pruefsumme = CRC32.checksum(puffer) ^ FINGERPRINT_XOR;
    puffer.extend_from_slice(&ATTR_FINGERPRINT.to_be_bytes());
    puffer.extend_from_slice(&4u16.to_be_bytes());
    puffer.extend_from_slice(&pruefsumme.to_be_bytes());
}

// ---------------------------------------------------------------------------
// XOR-MAPPED-ADDRESS
// ---------------------------------------------------------------------------

fn xor_adresse_schreiben(adresse: SocketAddr, transaktions_id: &[u8; 12]) -> Vec<u8> {
    let port = adresse.port() ^ (MAGIC_COOKIE >> 16) as u16;
    match adresse.ip() {
        IpAddr::V4(ip) => {
            let mut wert = vec![0, 0x01];
            wert.extend_from_slice(&port.to_be_bytes());
            let oktette = u32::from(ip) ^ MAGIC_COOKIE;
            wert.extend_from_slice(&oktette.to_be_bytes());
            wert
        }
        IpAddr::V6(ip) => {
            let mut wert = vec![0, 0x02];
            wert.extend_from_slice(&port.to_be_bytes());
            let mut maske = [0u8; 16];
            maske[..4].copy_from_slice(&MAGIC_COOKIE.to_be_bytes());
            maske[4..].copy_from_slice(transaktions_id);
            for (oktett, maske) in ip.octets().iter().zip(maske) {
                wert.push(oktett ^ maske);
            }
            wert
        }
    }
}

fn xor_adresse_lesen(wert: &[u8], transaktions_id: &[u8; 12]) -> Option<SocketAddr> {
    if wert.len() < 8 {
        return None;
    }
    let port = u16::from_be_bytes([wert[2], wert[3]]) ^ (MAGIC_COOKIE >> 16) as u16;
    match wert[1] {
        0x01 => {
            let oktette =
                u32::from_be_bytes([wert[4], wert[5], wert[6], wert[7]]) ^ MAGIC_COOKIE;
            Some(SocketAddr::new(IpAddr::V4(oktette.into()), port))
        }
        0x02 if wert.len() >= 20 => {
            let mut maske = [0u8; 16];
            maske[..4].copy_from_slice(&MAGIC_COOKIE.to_be_bytes());
            maske[4..].copy_from_slice(transaktions_id);
            let mut oktette = [0u8; 16];
            for (ziel, (oktett, maske)) in oktette.iter_mut().zip(wert[4..20].iter().zip(maske)) {
                *ziel = oktett ^ maske;
            }
            Some(SocketAddr::new(IpAddr::V6(oktette.into()), port))
        }
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
