//! Relay-Ereignisse
//!
//! Der Reaktor meldet Zustandsuebergaenge als Ereignisstrom an den
//! Server-Prozess. Die Ereignisse sind rein informativ, der Empfaenger
//! kann sie loggen oder an eine Verwaltungsschicht weiterreichen.

use std::net::SocketAddr;

use serde::{Deserialize, Serialize};

use crate::types::{LinkArt, TeilnehmerId};

/// Alle Ereignisse die der Relay-Reaktor nach aussen meldet
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "typ", rename_all = "camelCase")]
pub enum RelayEvent {
    /// Ein Link hat seine Transportadresse gelernt und ist nun aufgeloest
    LinkAufgeloest {
        teilnehmer_id: TeilnehmerId,
        art: LinkArt,
        partner: Option<TeilnehmerId>,
        adresse: SocketAddr,
    },
    /// Ein Link wurde entfernt (regulaer oder wegen Rollenkonflikt)
    LinkEntfernt {
        teilnehmer_id: TeilnehmerId,
        art: LinkArt,
        grund: String,
    },
    /// Ein Keyframe wurde beim Publisher angefordert
    FirAngefordert {
        publisher: TeilnehmerId,
        abonnent: TeilnehmerId,
        sequenz: u8,
    },
    /// Der Reaktor hat sich beendet
    ReaktorBeendet {
        pakete_weitergeleitet: u64,
        pakete_verworfen: u64,
    },
}
