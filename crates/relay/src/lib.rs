//! kaskade-relay – der Kern des Media-Relays
//!
//! Ein einzelner Reaktor-Task besitzt den UDP-Socket und den gesamten
//! Relay-Zustand. Alle anderen Threads (Signalisierung, Verwaltung)
//! mutieren den Zustand ausschliesslich ueber den geordneten
//! Befehlskanal des [`RelayHandle`].
//!
//! ## Module
//! - `ice` - Short-Term-Credentials fuer die Konnektivitaetspruefung
//! - `link` - Ein Medien-Link (Uplink oder Downlink) mit SRTP-Sessions
//! - `registry` - Arena plus Namens- und SSRC-Index ueber alle Links
//! - `raum` - Teilnehmer und deren Link-Besitz
//! - `befehl` - Befehlskanal zwischen Signalisierung und Reaktor
//! - `engine` - Der Reaktor selbst

pub mod befehl;
pub mod engine;
pub mod ice;
pub mod link;
pub mod raum;
pub mod registry;

pub use befehl::{RelayBefehl, RelayHandle};
pub use engine::{RelayConfig, RelayEngine};
pub use ice::IceCredentials;
pub use link::{Link, LinkSsrcs};
pub use registry::{LinkId, LinkRegistry};
