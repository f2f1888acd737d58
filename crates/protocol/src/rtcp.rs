//! RTCP-Feedback-Pakete (RFC 4585 / RFC 5104)
//!
//! Das Relay erzeugt selbst nur Full-Intra-Requests: wenn ein neuer
//! Abonnent aufgeloest wird, fordert es beim Publisher einen Keyframe
//! an, damit das Video sofort dekodierbar startet.

/// RTCP-Pakettyp Payload-Specific Feedback
pub const PT_PSFB: u8 = 206;

/// Feedback-Message-Type Full Intra Request
pub const FMT_FIR: u8 = 4;

/// Baut einen Full Intra Request
///
/// Das Media-Source-Feld im Feedback-Header bleibt Null, die
/// Ziel-SSRC steht im FCI-Eintrag (RFC 5104 Abschnitt 4.3.1).
pub fn fir_bauen(sender_ssrc: u32, media_ssrc: u32, sequenz: u8) -> [u8; 20] {
    let mut paket = [0u8; 20];
    paket[0] = 0x80 | FMT_FIR;
    paket[1] = PT_PSFB;
    // Laenge in 32-Bit-Worten minus eins
    paket[2..4].copy_from_slice(&4u16.to_be_bytes());
    paket[4..8].copy_from_slice(&sender_ssrc.to_be_bytes());
    // Media-Source: Null
    paket[12..16].copy_from_slice(&media_ssrc.to_be_bytes());
    paket[16] = sequenz;
    paket
}
