//! Server-Konfiguration
//!
//! Wird beim Start aus einer TOML-Datei geladen. Alle Felder haben
//! sinnvolle Standardwerte, sodass der Server ohne Konfigurationsdatei
//! lauffaehig ist.

use std::net::SocketAddr;

use serde::{Deserialize, Serialize};

/// Vollstaendige Server-Konfiguration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
#[derive(Default)]
pub struct ServerConfig {
    /// Allgemeine Server-Einstellungen
    pub server: ServerEinstellungen,
    /// Netzwerk-Einstellungen
    pub netzwerk: NetzwerkEinstellungen,
    /// Logging-Einstellungen
    pub logging: LoggingEinstellungen,
}

/// Allgemeine Server-Einstellungen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerEinstellungen {
    /// Anzeigename des Relays
    pub name: String,
}

impl Default for ServerEinstellungen {
    fn default() -> Self {
        Self { name: "Kaskade Relay".into() }
    }
}

/// Netzwerk-Einstellungen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetzwerkEinstellungen {
    /// Bind-Adresse fuer alle Sockets
    pub bind_adresse: String,
    /// Port fuer die TCP-Signalisierung
    pub signaling_port: u16,
    /// Port fuer den UDP-Media-Socket (0 = Betriebssystem waehlt)
    pub media_port: u16,
    /// Oeffentliche IP fuer den Host-Kandidaten, falls sie von der
    /// Bind-Adresse abweicht (NAT, Container)
    pub oeffentliche_adresse: Option<String>,
}

impl Default for NetzwerkEinstellungen {
    fn default() -> Self {
        Self {
            bind_adresse: "0.0.0.0".into(),
            signaling_port: 9000,
            media_port: 10000,
            oeffentliche_adresse: None,
        }
    }
}

/// Logging-Einstellungen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingEinstellungen {
    /// Log-Level: "trace", "debug", "info", "warn", "error"
    pub level: String,
    /// Format: "json" oder "text"
    pub format: String,
}

impl Default for LoggingEinstellungen {
    fn default() -> Self {
        Self { level: "info".into(), format: "text".into() }
    }
}

impl ServerConfig {
    /// Laedt die Konfiguration aus einer TOML-Datei.
    /// Gibt die Standardkonfiguration zurueck wenn die Datei nicht existiert.
    pub fn laden(pfad: &str) -> anyhow::Result<Self> {
        match std::fs::read_to_string(pfad) {
            Ok(inhalt) => {
                let config: Self = toml::from_str(&inhalt)
                    .map_err(|e| anyhow::anyhow!("Konfigurationsfehler in '{pfad}': {e}"))?;
                Ok(config)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!(
                    pfad = pfad,
                    "Konfigurationsdatei nicht gefunden, verwende Standardwerte"
                );
                Ok(Self::default())
            }
            Err(e) => Err(anyhow::anyhow!(
                "Konfigurationsdatei '{pfad}' nicht lesbar: {e}"
            )),
        }
    }

    /// Vollstaendige Bind-Adresse der Signalisierung
    pub fn signaling_bind_adresse(&self) -> String {
        format!("{}:{}", self.netzwerk.bind_adresse, self.netzwerk.signaling_port)
    }

    /// Vollstaendige Bind-Adresse des Media-Sockets
    pub fn media_bind_adresse(&self) -> String {
        format!("{}:{}", self.netzwerk.bind_adresse, self.netzwerk.media_port)
    }

    /// Adresse fuer den Host-Kandidaten
    ///
    /// `gebunden` ist die tatsaechlich gebundene Media-Adresse; ist
    /// eine oeffentliche IP konfiguriert, ersetzt sie den Host-Teil.
    pub fn kandidaten_adresse(&self, gebunden: SocketAddr) -> anyhow::Result<SocketAddr> {
        match &self.netzwerk.oeffentliche_adresse {
            Some(ip) => {
                let ip = ip
                    .parse()
                    .map_err(|e| anyhow::anyhow!("Oeffentliche Adresse '{ip}' unlesbar: {e}"))?;
                Ok(SocketAddr::new(ip, gebunden.port()))
            }
            None => Ok(gebunden),
        }
    }
}
