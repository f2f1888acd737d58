//! Fehlertypen fuer Kaskade
//!
//! Zentraler Fehler-Enum der alle moeglichen Fehlerzustaende abdeckt.
//! Untermodule koennen eigene Fehler definieren und via `#[from]` konvertieren.

use thiserror::Error;

/// Globaler Result-Alias fuer Kaskade
pub type Result<T> = std::result::Result<T, KaskadeError>;

/// Alle moeglichen Fehler im Kaskade-System
#[derive(Debug, Error)]
pub enum KaskadeError {
    // --- Verbindung & Netzwerk ---
    #[error("Verbindung fehlgeschlagen: {0}")]
    Verbindung(String),

    #[error("Verbindung getrennt: {0}")]
    Getrennt(String),

    // --- Signalisierung & Protokoll ---
    #[error("Ungueltige Nachricht: {0}")]
    UngueltigeNachricht(String),

    #[error("Authentifizierung fehlgeschlagen: {0}")]
    Authentifizierung(String),

    // --- Relay ---
    #[error("Teilnehmer nicht gefunden: {0}")]
    TeilnehmerNichtGefunden(String),

    #[error("Link nicht gefunden: {0}")]
    LinkNichtGefunden(String),

    #[error("SSRC bereits registriert: {0}")]
    SsrcKollision(u32),

    #[error("ICE-Rollenkonflikt auf Link {0}")]
    RollenKonflikt(String),

    // --- Konfiguration ---
    #[error("Konfigurationsfehler: {0}")]
    Konfiguration(String),

    // --- Intern ---
    #[error("Interner Fehler: {0}")]
    Intern(String),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

impl KaskadeError {
    /// Erstellt einen internen Fehler aus einer beliebigen Nachricht
    pub fn intern(msg: impl Into<String>) -> Self {
        Self::Intern(msg.into())
    }

    /// Gibt true zurueck wenn der Fehler nur den betroffenen Link
    /// beendet und der Reaktor weiterlaufen darf
    pub fn ist_link_fatal(&self) -> bool {
        matches!(self, Self::RollenKonflikt(_) | Self::SsrcKollision(_))
    }
}
