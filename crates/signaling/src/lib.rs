//! kaskade-signaling – Beitritt und Abonnements ueber TCP/JSON
//!
//! Die Signalisierung laeuft getrennt vom Reaktor: Clients verbinden
//! sich ueber TCP, senden zeilenweise JSON-Nachrichten und erhalten
//! darueber ihre ICE-Credentials, SRTP-Schluessel und SSRCs. Alle
//! Aenderungen am Relay-Zustand gehen ausschliesslich ueber das
//! [`kaskade_relay::RelayHandle`].

pub mod error;
pub mod nachricht;
pub mod tcp;
pub mod verbindung;
pub mod zustand;

pub use error::{SignalingError, SignalingResult};
pub use nachricht::{ClientNachricht, ServerNachricht};
pub use tcp::SignalingServer;
pub use zustand::SignalingState;
