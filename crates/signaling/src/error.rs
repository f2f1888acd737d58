//! Fehlertypen der Signalisierung

use thiserror::Error;

/// Fehler in der Signalisierungsschicht
#[derive(Debug, Error)]
pub enum SignalingError {
    #[error("Ungueltige Nachricht: {0}")]
    UngueltigeNachricht(#[from] serde_json::Error),

    #[error("Noch nicht beigetreten")]
    NichtBeigetreten,

    #[error("Bereits beigetreten")]
    BereitsBeigetreten,

    #[error("Unbekannter Publisher: {0}")]
    UnbekannterPublisher(String),

    #[error("Schluesselmaterial unbrauchbar: {0}")]
    Schluessel(#[from] kaskade_crypto::CryptoError),

    #[error("Relay nicht erreichbar: {0}")]
    Relay(#[from] kaskade_core::KaskadeError),

    #[error("IO-Fehler: {0}")]
    Io(#[from] std::io::Error),
}

pub type SignalingResult<T> = Result<T, SignalingError>;
