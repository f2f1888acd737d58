//! Klassifikation eingehender UDP-Datagramme
//!
//! Der Media-Port empfaengt STUN, RTP und RTCP gemischt auf einem
//! Socket. Die Zuordnung erfolgt rein ueber feste Byte-Offsets, ohne
//! Allokation und ohne vollstaendiges Parsen:
//!
//! - STUN: oberste zwei Bits des ersten Bytes sind 00 und das
//!   Magic-Cookie steht an Offset 4
//! - RTCP: RTP-Version 2 und Payload-Typ 200..=206 im zweiten Byte
//! - RTP: alles uebrige mit Version 2

use crate::stun::MAGIC_COOKIE;

/// Kleinste Laenge ab der ein Datagramm ueberhaupt zugeordnet wird
pub const MIN_PAKET_LAENGE: usize = 8;

/// Ergebnis der Klassifikation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaketArt {
    Stun,
    Rtp,
    Rtcp,
    Unbekannt,
}

/// Ordnet ein Datagramm einer Paketart zu
pub fn klassifiziere(paket: &[u8]) -> PaketArt {
    if paket.len() < MIN_PAKET_LAENGE {
        return PaketArt::Unbekannt;
    }
    if ist_stun(paket) {
        PaketArt::Stun
    } else if ist_rtcp(paket) {
        PaketArt::Rtcp
    } else if paket[0] >> 6 == 2 {
        PaketArt::Rtp
    } else {
        PaketArt::Unbekannt
    }
}

/// Prueft auf eine STUN-Nachricht (RFC 5389)
pub fn ist_stun(paket: &[u8]) -> bool {
    paket.len() >= MIN_PAKET_LAENGE
        && paket[0] & 0xc0 == 0
        && paket[4..8] == MAGIC_COOKIE.to_be_bytes()
}

/// Prueft auf ein RTCP-Paket (RFC 3550, Payload-Typen 200..=206)
pub fn ist_rtcp(paket: &[u8]) -> bool {
    paket.len() >= MIN_PAKET_LAENGE && paket[0] >> 6 == 2 && (200..=206).contains(&paket[1])
}

/// Liest die SSRC eines RTP- oder RTCP-Pakets
///
/// RTCP traegt die Sender-SSRC an Offset 4, RTP an Offset 8. Unter
/// 12 Bytes liefert keines von beiden eine Kennung.
pub fn ssrc(paket: &[u8]) -> Option<u32> {
    if paket.len() < 12 {
        None
    } else if ist_rtcp(paket) {
        Some(u32::from_be_bytes([paket[4], paket[5], paket[6], paket[7]]))
    } else if paket[0] >> 6 == 2 {
        Some(u32::from_be_bytes([paket[8], paket[9], paket[10], paket[11]]))
    } else {
        None
    }
}

/// Liest den RTCP-Pakettyp (zweites Byte)
pub fn rtcp_typ(paket: &[u8]) -> Option<u8> {
    if ist_rtcp(paket) {
        Some(paket[1])
    } else {
        None
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
