//! Geteilter Zustand der Signalisierung
//!
//! Der Reaktor besitzt den Relay-Zustand; die Signalisierung haelt
//! hier nur, was sie selbst braucht: das Befehls-Handle, den
//! SSRC-Zaehler, den RNG fuer Credentials und Schluessel sowie die
//! Menge der beigetretenen Teilnehmer fuer die Abonnement-Pruefung.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, Ordering};

use dashmap::DashSet;
use kaskade_core::types::{RaumId, TeilnehmerId};
use kaskade_crypto::SrtpSchluessel;
use kaskade_relay::{IceCredentials, RelayHandle};
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::SeedableRng;

/// Geteilter Zustand aller Signaling-Verbindungen
pub struct SignalingState {
    pub relay: RelayHandle,
    pub raum_id: RaumId,
    /// Adresse des Media-Ports wie sie Clients erreichen sollen
    pub media_adresse: SocketAddr,
    /// Beigetretene Teilnehmer, fuer die Abonnement-Pruefung
    pub teilnehmer: DashSet<TeilnehmerId>,
    rng: Mutex<StdRng>,
    /// Relay-seitige SSRCs kommen aus einem Zaehler und kollidieren
    /// deshalb nie untereinander
    ssrc_zaehler: AtomicU32,
}

impl SignalingState {
    pub fn neu(relay: RelayHandle, raum_id: RaumId, media_adresse: SocketAddr) -> Self {
        Self {
            relay,
            raum_id,
            media_adresse,
            teilnehmer: DashSet::new(),
            rng: Mutex::new(StdRng::from_entropy()),
            // Oberhalb ueblicher Client-SSRCs angesiedelt
            ssrc_zaehler: AtomicU32::new(0x4b53_0000),
        }
    }

    /// Vergibt die naechste Relay-SSRC
    pub fn neue_ssrc(&self) -> u32 {
        self.ssrc_zaehler.fetch_add(1, Ordering::Relaxed)
    }

    /// Erzeugt eine frische lokale Credential-Haelfte
    pub fn ice_erzeugen(&self) -> IceCredentials {
        IceCredentials::neu(&mut *self.rng.lock())
    }

    /// Erzeugt frisches SRTP-Master-Material
    pub fn schluessel_erzeugen(&self) -> SrtpSchluessel {
        SrtpSchluessel::zufaellig(&mut *self.rng.lock())
    }

    /// Der einzige Host-Kandidat des Relays
    pub fn kandidat(&self) -> String {
        format!(
            "0 1 UDP 2113667327 {} {} typ host",
            self.media_adresse.ip(),
            self.media_adresse.port()
        )
    }
}
