//! Befehlskanal zwischen Signalisierung und Reaktor
//!
//! Der Reaktor ist alleiniger Besitzer des Relay-Zustands. Alles was
//! ihn veraendern will, schickt einen Befehl ueber diesen Kanal; die
//! Reihenfolge der Befehle eines Absenders bleibt erhalten.

use kaskade_core::types::TeilnehmerId;
use kaskade_core::{KaskadeError, Result};
use tokio::sync::mpsc;

use crate::link::Link;

/// Befehle an den Reaktor
#[derive(Debug)]
pub enum RelayBefehl {
    /// Teilnehmer betritt den Raum mit seinem Uplink
    TeilnehmerHinzufuegen { id: TeilnehmerId, uplink: Box<Link> },
    /// Abonnent erhaelt einen Downlink auf einen Publisher
    DownlinkHinzufuegen {
        abonnent: TeilnehmerId,
        publisher: TeilnehmerId,
        link: Box<Link>,
    },
    /// Abonnement beenden
    DownlinkEntfernen {
        abonnent: TeilnehmerId,
        publisher: TeilnehmerId,
    },
    /// Teilnehmer verlaesst den Raum, alle seine Links fallen weg
    TeilnehmerEntfernen { id: TeilnehmerId },
    /// Reaktor beenden
    Beenden,
}

/// Klonbarer Sende-Griff auf den Befehlskanal
#[derive(Debug, Clone)]
pub struct RelayHandle {
    tx: mpsc::UnboundedSender<RelayBefehl>,
}

impl RelayHandle {
    pub(crate) fn neu(tx: mpsc::UnboundedSender<RelayBefehl>) -> Self {
        Self { tx }
    }

    pub fn teilnehmer_hinzufuegen(&self, id: TeilnehmerId, uplink: Link) -> Result<()> {
        self.senden(RelayBefehl::TeilnehmerHinzufuegen { id, uplink: Box::new(uplink) })
    }

    pub fn downlink_hinzufuegen(
        &self,
        abonnent: TeilnehmerId,
        publisher: TeilnehmerId,
        link: Link,
    ) -> Result<()> {
        self.senden(RelayBefehl::DownlinkHinzufuegen {
            abonnent,
            publisher,
            link: Box::new(link),
        })
    }

    pub fn downlink_entfernen(
        &self,
        abonnent: TeilnehmerId,
        publisher: TeilnehmerId,
    ) -> Result<()> {
        self.senden(RelayBefehl::DownlinkEntfernen { abonnent, publisher })
    }

    pub fn teilnehmer_entfernen(&self, id: TeilnehmerId) -> Result<()> {
        self.senden(RelayBefehl::TeilnehmerEntfernen { id })
    }

    pub fn beenden(&self) -> Result<()> {
        self.senden(RelayBefehl::Beenden)
    }

    fn senden(&self, befehl: RelayBefehl) -> Result<()> {
        self.tx
            .send(befehl)
            .map_err(|_| KaskadeError::Getrennt("Reaktor nimmt keine Befehle mehr an".into()))
    }
}
