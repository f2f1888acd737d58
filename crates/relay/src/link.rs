//! Ein Medien-Link zwischen Relay und Client
//!
//! Ein Link transportiert genau eine Richtung der Medien eines
//! Teilnehmers: der Uplink empfaengt dessen eigene Stroeme, ein
//! Downlink liefert die Stroeme eines Partners aus. Jeder Link hat
//! eigene ICE-Credentials, eigene SRTP-Sessions je Richtung und lernt
//! seine Transportadresse genau einmal aus der ersten nominierten
//! Konnektivitaetspruefung.

use std::net::SocketAddr;

use kaskade_core::types::{LinkArt, TeilnehmerId};
use kaskade_crypto::{SrtpSchluessel, SrtpSession};

use crate::ice::IceCredentials;

/// Die vier SSRCs eines Links
///
/// `peer_*` sind die vom Client angekuendigten Quellen, `relay_*` die
/// vom Relay vergebenen Kennungen unter denen die Pakete den Link
/// wieder verlassen.
#[derive(Debug, Clone, Copy)]
pub struct LinkSsrcs {
    pub peer_audio: u32,
    pub peer_video: u32,
    pub relay_audio: u32,
    pub relay_video: u32,
}

/// Zustand eines einzelnen Links
pub struct Link {
    pub art: LinkArt,
    pub besitzer: TeilnehmerId,
    /// Publisher dessen Medien dieser Downlink ausliefert
    pub partner: Option<TeilnehmerId>,
    credentials: IceCredentials,
    transport: Option<SocketAddr>,
    pub eingehend: SrtpSession,
    pub ausgehend: SrtpSession,
    pub ssrcs: LinkSsrcs,
    fir_sequenz: u8,
}

impl std::fmt::Debug for Link {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Link")
            .field("art", &self.art)
            .field("besitzer", &self.besitzer)
            .field("partner", &self.partner)
            .field("transport", &self.transport)
            .field("ssrcs", &self.ssrcs)
            .finish()
    }
}

impl Link {
    /// Baut einen Link mit frisch abgeleiteten SRTP-Sessions
    ///
    /// `eingehend` ist das Sende-Material des Clients, `ausgehend` das
    /// vom Relay erzeugte Material fuer die Rueckrichtung.
    pub fn neu(
        art: LinkArt,
        besitzer: TeilnehmerId,
        partner: Option<TeilnehmerId>,
        credentials: IceCredentials,
        eingehend: &SrtpSchluessel,
        ausgehend: &SrtpSchluessel,
        ssrcs: LinkSsrcs,
    ) -> Self {
        Self {
            art,
            besitzer,
            partner,
            credentials,
            transport: None,
            eingehend: SrtpSession::neu(eingehend),
            ausgehend: SrtpSession::neu(ausgehend),
            ssrcs,
            fir_sequenz: 0,
        }
    }

    pub fn credentials(&self) -> &IceCredentials {
        &self.credentials
    }

    /// Transportadresse, sobald der Link aufgeloest ist
    pub fn transport(&self) -> Option<SocketAddr> {
        self.transport
    }

    pub fn ist_aufgeloest(&self) -> bool {
        self.transport.is_some()
    }

    /// Bindet die Transportadresse, first-writer-wins
    ///
    /// Gibt true zurueck wenn der Link damit gerade aufgeloest wurde.
    /// Spaetere Pruefungen von derselben oder einer anderen Adresse
    /// aendern die Bindung nicht mehr.
    pub fn adresse_binden(&mut self, adresse: SocketAddr) -> bool {
        if self.transport.is_some() {
            return false;
        }
        self.transport = Some(adresse);
        true
    }

    /// Naechste Sequenznummer fuer einen Full Intra Request
    pub fn naechste_fir_sequenz(&mut self) -> u8 {
        self.fir_sequenz = self.fir_sequenz.wrapping_add(1);
        self.fir_sequenz
    }

    /// Ordnet eine Peer-SSRC dem Relay-Pendant zu
    pub fn relay_ssrc_fuer(&self, peer_ssrc: u32) -> Option<u32> {
        if peer_ssrc == self.ssrcs.peer_audio {
            Some(self.ssrcs.relay_audio)
        } else if peer_ssrc == self.ssrcs.peer_video {
            Some(self.ssrcs.relay_video)
        } else {
            None
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
