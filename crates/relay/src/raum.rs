//! Teilnehmer und Link-Besitz eines Raums
//!
//! Der Raum kennt nur die Besitzverhaeltnisse: welcher Teilnehmer
//! welchen Uplink hat und welche Downlinks auf welchen Publisher
//! zeigen. Die Links selbst liegen in der [`crate::LinkRegistry`].

use std::collections::HashMap;

use kaskade_core::types::{RaumId, TeilnehmerId};

use crate::registry::LinkId;

/// Ein Teilnehmer mit seinem Uplink und seinen Downlinks
#[derive(Debug)]
pub struct Teilnehmer {
    pub id: TeilnehmerId,
    pub uplink: LinkId,
    /// Downlinks dieses Teilnehmers, Schluessel ist der Publisher
    pub downlinks: HashMap<TeilnehmerId, LinkId>,
}

/// Besitzverhaeltnisse eines Raums
#[derive(Debug)]
pub struct Raum {
    id: RaumId,
    teilnehmer: HashMap<TeilnehmerId, Teilnehmer>,
}

impl Raum {
    pub fn neu(id: RaumId) -> Self {
        Self { id, teilnehmer: HashMap::new() }
    }

    pub fn id(&self) -> RaumId {
        self.id
    }

    pub fn teilnehmer_hinzufuegen(&mut self, id: TeilnehmerId, uplink: LinkId) {
        self.teilnehmer
            .insert(id, Teilnehmer { id, uplink, downlinks: HashMap::new() });
    }

    pub fn teilnehmer(&self, id: TeilnehmerId) -> Option<&Teilnehmer> {
        self.teilnehmer.get(&id)
    }

    /// Traegt einen Downlink des Abonnenten auf den Publisher ein
    ///
    /// Gibt einen eventuell ersetzten alten Downlink zurueck.
    pub fn downlink_setzen(
        &mut self,
        abonnent: TeilnehmerId,
        publisher: TeilnehmerId,
        link: LinkId,
    ) -> Option<LinkId> {
        self.teilnehmer
            .get_mut(&abonnent)?
            .downlinks
            .insert(publisher, link)
    }

    pub fn downlink_entfernen(
        &mut self,
        abonnent: TeilnehmerId,
        publisher: TeilnehmerId,
    ) -> Option<LinkId> {
        self.teilnehmer.get_mut(&abonnent)?.downlinks.remove(&publisher)
    }

    /// Entfernt einen Teilnehmer und gibt seine Link-Handles zurueck
    pub fn teilnehmer_entfernen(&mut self, id: TeilnehmerId) -> Option<Teilnehmer> {
        self.teilnehmer.remove(&id)
    }

    /// Entfernt bei allen anderen Teilnehmern die Downlinks auf den
    /// genannten Publisher und gibt deren Handles zurueck
    pub fn downlinks_auf_publisher_entfernen(
        &mut self,
        publisher: TeilnehmerId,
    ) -> Vec<(TeilnehmerId, LinkId)> {
        let mut entfernt = Vec::new();
        for teilnehmer in self.teilnehmer.values_mut() {
            if let Some(link) = teilnehmer.downlinks.remove(&publisher) {
                entfernt.push((teilnehmer.id, link));
            }
        }
        entfernt
    }

    /// Sendeziele fuer eine Broadcast-Runde: alle Downlinks die auf den
    /// Publisher zeigen
    ///
    /// Die Menge wird pro Aufruf neu berechnet, damit sie nie hinter
    /// Beitritten oder Abgaengen herlaeuft.
    pub fn sendeziele_fuer(&self, publisher: TeilnehmerId) -> Vec<LinkId> {
        self.teilnehmer
            .values()
            .filter(|teilnehmer| teilnehmer.id != publisher)
            .filter_map(|teilnehmer| teilnehmer.downlinks.get(&publisher).copied())
            .collect()
    }

    pub fn anzahl(&self) -> usize {
        self.teilnehmer.len()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
