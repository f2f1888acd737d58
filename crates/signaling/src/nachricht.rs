//! Nachrichtentypen der Signalisierung
//!
//! Zeilenweise JSON ueber TCP, getaggt ueber das Feld `typ`. Die
//! Schluesselbloecke sind base64-kodierte 30-Byte-Folgen (Master-Key
//! plus Master-Salt), die SSRCs rohe 32-Bit-Werte.

use kaskade_core::types::{RaumId, TeilnehmerId};
use serde::{Deserialize, Serialize};

/// Nachrichten vom Client an den Server
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "typ", rename_all = "camelCase")]
pub enum ClientNachricht {
    /// Beitritt: der Client kuendigt seine Uplink-Parameter an
    #[serde(rename_all = "camelCase")]
    AuthAnfrage {
        ice_ufrag: String,
        ice_pwd: String,
        audio_ssrc: u32,
        video_ssrc: u32,
        /// Sende-Schluessel des Clients, base64
        schluessel: String,
    },
    /// Abonnement: der Client moechte einen Publisher empfangen
    #[serde(rename_all = "camelCase")]
    Abonnieren {
        publisher: TeilnehmerId,
        ice_ufrag: String,
        ice_pwd: String,
        audio_ssrc: u32,
        video_ssrc: u32,
        schluessel: String,
    },
    /// Abonnement beenden
    #[serde(rename_all = "camelCase")]
    Abbestellen { publisher: TeilnehmerId },
}

/// Nachrichten vom Server an den Client
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "typ", rename_all = "camelCase")]
pub enum ServerNachricht {
    /// Antwort auf den Beitritt
    #[serde(rename_all = "camelCase")]
    AuthAntwort {
        teilnehmer_id: TeilnehmerId,
        raum_id: RaumId,
        ice_ufrag: String,
        ice_pwd: String,
        /// Sende-Schluessel des Relays fuer diesen Link, base64
        schluessel: String,
        audio_ssrc: u32,
        video_ssrc: u32,
        /// Der einzige Host-Kandidat des Relays
        kandidat: String,
    },
    /// Antwort auf ein Abonnement
    #[serde(rename_all = "camelCase")]
    AboAntwort {
        publisher: TeilnehmerId,
        ice_ufrag: String,
        ice_pwd: String,
        schluessel: String,
        audio_ssrc: u32,
        video_ssrc: u32,
        kandidat: String,
    },
    /// Bestaetigung eines beendeten Abonnements
    #[serde(rename_all = "camelCase")]
    AboBeendet { publisher: TeilnehmerId },
    /// Ablehnung der letzten Anfrage
    #[serde(rename_all = "camelCase")]
    Fehler { grund: String },
}
