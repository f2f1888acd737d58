//! Master-Schluesselmaterial fuer SRTP
//!
//! Ein Master-Block besteht aus 16 Byte Schluessel und 14 Byte Salt.
//! Auf dem Signalisierungs-Draht wird der Block als base64-kodierte
//! 30-Byte-Folge uebertragen.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use rand::RngCore;

use crate::error::{CryptoError, CryptoResult};

/// Laenge des Master-Keys in Bytes
pub const MASTER_KEY_LAENGE: usize = 16;
/// Laenge des Master-Salts in Bytes
pub const MASTER_SALT_LAENGE: usize = 14;

/// Master-Key und Master-Salt einer SRTP-Richtung
#[derive(Clone, PartialEq, Eq)]
pub struct SrtpSchluessel {
    pub master_key: [u8; MASTER_KEY_LAENGE],
    pub master_salt: [u8; MASTER_SALT_LAENGE],
}

impl std::fmt::Debug for SrtpSchluessel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SrtpSchluessel")
            .field("master_key", &"[GEHEIM]")
            .field("master_salt", &"[GEHEIM]")
            .finish()
    }
}

impl SrtpSchluessel {
    /// Erzeugt frisches Schluesselmaterial aus dem uebergebenen RNG
    pub fn zufaellig(rng: &mut impl RngCore) -> Self {
        let mut master_key = [0u8; MASTER_KEY_LAENGE];
        let mut master_salt = [0u8; MASTER_SALT_LAENGE];
        rng.fill_bytes(&mut master_key);
        rng.fill_bytes(&mut master_salt);
        Self { master_key, master_salt }
    }

    /// Dekodiert einen base64-kodierten 30-Byte-Block
    pub fn aus_base64(kodiert: &str) -> CryptoResult<Self> {
        let bytes = BASE64.decode(kodiert)?;
        Self::aus_bytes(&bytes)
    }

    /// Uebernimmt einen rohen 30-Byte-Block
    pub fn aus_bytes(bytes: &[u8]) -> CryptoResult<Self> {
        if bytes.len() != MASTER_KEY_LAENGE + MASTER_SALT_LAENGE {
            return Err(CryptoError::UngueltigeSchluesselLaenge {
                erwartet: MASTER_KEY_LAENGE + MASTER_SALT_LAENGE,
                erhalten: bytes.len(),
            });
        }
        let mut master_key = [0u8; MASTER_KEY_LAENGE];
        let mut master_salt = [0u8; MASTER_SALT_LAENGE];
        master_key.copy_from_slice(&bytes[..MASTER_KEY_LAENGE]);
        master_salt.copy_from_slice(&bytes[MASTER_KEY_LAENGE..]);
        Ok(Self { master_key, master_salt })
    }

    /// Kodiert Key und Salt als zusammenhaengenden base64-Block
    pub fn als_base64(&self) -> String {
        let mut bytes = [0u8; MASTER_KEY_LAENGE + MASTER_SALT_LAENGE];
        bytes[..MASTER_KEY_LAENGE].copy_from_slice(&self.master_key);
        bytes[MASTER_KEY_LAENGE..].copy_from_slice(&self.master_salt);
        BASE64.encode(bytes)
    }
}
