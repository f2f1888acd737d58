//! # kaskade-crypto
//!
//! SRTP/SRTCP Paketverschluesselung fuer das Kaskade-Relay.
//!
//! Implementiert die Suite AES_CM_128_HMAC_SHA1_80 aus RFC 3711:
//! AES-CM Keystream fuer den Payload, HMAC-SHA1 mit 80-Bit-Tag fuer
//! die Authentisierung.
//!
//! ## Module
//! - `schluessel` - Master-Key und Master-Salt (30 Byte, base64 auf dem Draht)
//! - `srtp` - Eine Richtung einer SRTP/SRTCP-Session
//! - `error` - Fehlertypen

pub mod error;
pub mod schluessel;
pub mod srtp;

// Bequeme Re-Exports
pub use error::{CryptoError, CryptoResult};
pub use schluessel::SrtpSchluessel;
pub use srtp::{SrtpSession, SRTP_AUTH_TAG_LAENGE};
