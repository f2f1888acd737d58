//! kaskade-protocol – Drahtformate des Media-Ports
//!
//! Dieses Crate definiert die paketnahe Seite des Relays: die
//! Klassifikation eingehender UDP-Datagramme, den STUN-Codec fuer die
//! ICE-Konnektivitaetspruefung und den RTCP-Feedback-Builder.

pub mod klassifizierer;
pub mod rtcp;
pub mod stun;

pub use klassifizierer::{ist_rtcp, ist_stun, rtcp_typ, ssrc, PaketArt};
pub use stun::{StunFehler, StunKlasse, StunNachricht};
