//! Short-Term-Credentials fuer ice-lite
//!
//! Jeder Link bekommt ein eigenes Credential-Paar. Die lokale Haelfte
//! erzeugt das Relay, die entfernte Haelfte traegt die Signalisierung
//! genau einmal nach. Erst danach steht der Verifizier-Name fest, unter
//! dem eingehende Binding Requests dem Link zugeordnet werden.

use kaskade_core::{KaskadeError, Result};
use rand::RngCore;

/// Laenge des ufrag in Zeichen
pub const UFRAG_LAENGE: usize = 16;
/// Laenge des Passworts in Zeichen
pub const PASSWORT_LAENGE: usize = 24;

/// ice-char-Alphabet aus RFC 8445, 64 Zeichen
const ALPHABET: &[u8; 64] =
    b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789+/";

/// Credential-Paar eines Links
#[derive(Debug, Clone)]
pub struct IceCredentials {
    lokaler_ufrag: String,
    lokales_passwort: String,
    remote_ufrag: Option<String>,
    remote_passwort: Option<String>,
}

impl IceCredentials {
    /// Erzeugt eine frische lokale Haelfte aus dem uebergebenen RNG
    pub fn neu(rng: &mut impl RngCore) -> Self {
        Self {
            lokaler_ufrag: zufalls_zeichenkette(rng, UFRAG_LAENGE),
            lokales_passwort: zufalls_zeichenkette(rng, PASSWORT_LAENGE),
            remote_ufrag: None,
            remote_passwort: None,
        }
    }

    /// Traegt die entfernte Haelfte nach
    ///
    /// Darf genau einmal aufgerufen werden; ein zweiter Aufruf ist ein
    /// interner Fehler der Signalisierung.
    pub fn setze_remote(&mut self, ufrag: impl Into<String>, passwort: impl Into<String>) -> Result<()> {
        if self.remote_ufrag.is_some() {
            return Err(KaskadeError::intern(
                "Remote-Credentials wurden bereits gesetzt",
            ));
        }
        self.remote_ufrag = Some(ufrag.into());
        self.remote_passwort = Some(passwort.into());
        Ok(())
    }

    pub fn lokaler_ufrag(&self) -> &str {
        &self.lokaler_ufrag
    }

    pub fn lokales_passwort(&self) -> &str {
        &self.lokales_passwort
    }

    pub fn remote_ufrag(&self) -> Option<&str> {
        self.remote_ufrag.as_deref()
    }

    /// USERNAME unter dem eingehende Requests diesen Link adressieren:
    /// `lokaler_ufrag ":" remote_ufrag`
    pub fn verifizier_name(&self) -> Option<Vec<u8>> {
        let remote = self.remote_ufrag.as_deref()?;
        Some(format!("{}:{remote}", self.lokaler_ufrag).into_bytes())
    }
}

/// Zeichenkette aus dem ice-char-Alphabet
///
/// 64 teilt 2^32, die Maske erzeugt also keine Verzerrung.
fn zufalls_zeichenkette(rng: &mut impl RngCore, laenge: usize) -> String {
    (0..laenge)
        .map(|_| ALPHABET[(rng.next_u32() & 63) as usize] as char)
        .collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
