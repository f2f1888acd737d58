//! Fehlertypen fuer das Kryptografie-Subsystem

use thiserror::Error;

/// Fehler im Kryptografie-Subsystem
#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("Ungueltige Schluessel-Laenge: erwartet {erwartet}, erhalten {erhalten}")]
    UngueltigeSchluesselLaenge { erwartet: usize, erhalten: usize },

    #[error("Paket zu kurz: {0} Bytes")]
    PaketZuKurz(usize),

    #[error("Ungueltiges Paket: {0}")]
    UngueltigesPaket(String),

    #[error("Authentisierung fehlgeschlagen")]
    AuthentisierungFehlgeschlagen,

    #[error("Paket-Index {0} bereits gesehen")]
    Replay(u64),

    #[error("Verschluesselung fehlgeschlagen: {0}")]
    Verschluesselung(String),

    #[error("Base64-Dekodierung fehlgeschlagen: {0}")]
    Base64(#[from] base64::DecodeError),
}

pub type CryptoResult<T> = Result<T, CryptoError>;
