//! Link-Registry: Arena plus Namens- und SSRC-Index
//!
//! Die Registry besitzt alle Links des Reaktors. Zwei Indexe zeigen in
//! die Arena: der Verifizier-Name fuer die STUN-Zuordnung und die
//! Peer-SSRCs fuer die Medien-Zuordnung. Einfuegen und Entfernen
//! pflegen beide Indexe als eine Einheit, ein Link ist also entweder
//! vollstaendig registriert oder gar nicht.

use std::collections::HashMap;

use kaskade_core::{KaskadeError, Result};

use crate::link::Link;

/// Handle auf einen Link in der Arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LinkId(u64);

impl std::fmt::Display for LinkId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "link:{}", self.0)
    }
}

/// Arena und Indexe ueber alle Links eines Reaktors
#[derive(Default)]
pub struct LinkRegistry {
    naechste_id: u64,
    links: HashMap<LinkId, Link>,
    nach_name: HashMap<Vec<u8>, LinkId>,
    nach_ssrc: HashMap<u32, LinkId>,
}

impl LinkRegistry {
    pub fn neu() -> Self {
        Self::default()
    }

    /// Fuegt einen Link ein und registriert Name und Peer-SSRCs
    ///
    /// Schlaegt fehl wenn die Remote-Credentials noch fehlen, der Name
    /// schon vergeben ist oder eine Peer-SSRC kollidiert. Im
    /// Fehlerfall bleibt die Registry unveraendert.
    pub fn einfuegen(&mut self, link: Link) -> Result<LinkId> {
        let name = link.credentials().verifizier_name().ok_or_else(|| {
            KaskadeError::intern("Link ohne Remote-Credentials kann nicht registriert werden")
        })?;
        if self.nach_name.contains_key(&name) {
            return Err(KaskadeError::intern(format!(
                "Verifizier-Name bereits vergeben: {}",
                String::from_utf8_lossy(&name)
            )));
        }
        for ssrc in [link.ssrcs.peer_audio, link.ssrcs.peer_video] {
            if self.nach_ssrc.contains_key(&ssrc) {
                return Err(KaskadeError::SsrcKollision(ssrc));
            }
        }

        let id = LinkId(self.naechste_id);
        self.naechste_id += 1;
        self.nach_name.insert(name, id);
        self.nach_ssrc.insert(link.ssrcs.peer_audio, id);
        self.nach_ssrc.insert(link.ssrcs.peer_video, id);
        self.links.insert(id, link);
        Ok(id)
    }

    /// Entfernt einen Link samt aller Indexeintraege
    pub fn entfernen(&mut self, id: LinkId) -> Option<Link> {
        let link = self.links.remove(&id)?;
        if let Some(name) = link.credentials().verifizier_name() {
            self.nach_name.remove(&name);
        }
        self.nach_ssrc.remove(&link.ssrcs.peer_audio);
        self.nach_ssrc.remove(&link.ssrcs.peer_video);
        Some(link)
    }

    pub fn nach_name(&self, name: &[u8]) -> Option<LinkId> {
        self.nach_name.get(name).copied()
    }

    pub fn nach_ssrc(&self, ssrc: u32) -> Option<LinkId> {
        self.nach_ssrc.get(&ssrc).copied()
    }

    pub fn link(&self, id: LinkId) -> Option<&Link> {
        self.links.get(&id)
    }

    pub fn link_mut(&mut self, id: LinkId) -> Option<&mut Link> {
        self.links.get_mut(&id)
    }

    pub fn len(&self) -> usize {
        self.links.len()
    }

    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ice::IceCredentials;
    use crate::link::LinkSsrcs;
    use kaskade_core::types::{LinkArt, TeilnehmerId};
    use kaskade_crypto::SrtpSchluessel;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn link_mit(rng: &mut StdRng, audio: u32, video: u32) -> Link {
        let mut credentials = IceCredentials::neu(rng);
        credentials.setze_remote(format!("fern{audio}"), "passwort").unwrap();
        Link::neu(
            LinkArt::Uplink,
            TeilnehmerId::new(),
            None,
            credentials,
            &SrtpSchluessel::zufaellig(rng),
            &SrtpSchluessel::zufaellig(rng),
            LinkSsrcs {
                peer_audio: audio,
                peer_video: video,
                relay_audio: audio + 1000,
                relay_video: video + 1000,
            },
        )
    }

    #[test]
    fn einfuegen_registriert_beide_indexe() {
        let mut rng = StdRng::seed_from_u64(1);
        let mut registry = LinkRegistry::neu();
        let link = link_mit(&mut rng, 10, 11);
        let name = link.credentials().verifizier_name().unwrap();

        let id = registry.einfuegen(link).unwrap();
        assert_eq!(registry.nach_name(&name), Some(id));
        assert_eq!(registry.nach_ssrc(10), Some(id));
        assert_eq!(registry.nach_ssrc(11), Some(id));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn entfernen_raeumt_beide_indexe() {
        let mut rng = StdRng::seed_from_u64(2);
        let mut registry = LinkRegistry::neu();
        let link = link_mit(&mut rng, 20, 21);
        let name = link.credentials().verifizier_name().unwrap();

        let id = registry.einfuegen(link).unwrap();
        assert!(registry.entfernen(id).is_some());
        assert_eq!(registry.nach_name(&name), None);
        assert_eq!(registry.nach_ssrc(20), None);
        assert_eq!(registry.nach_ssrc(21), None);
        assert!(registry.is_empty());
        assert!(registry.entfernen(id).is_none());
    }

    #[test]
    fn ssrc_kollision_wird_abgelehnt() {
        let mut rng = StdRng::seed_from_u64(3);
        let mut registry = LinkRegistry::neu();
        registry.einfuegen(link_mit(&mut rng, 30, 31)).unwrap();

        let kollision = link_mit(&mut rng, 30, 32);
        let name = kollision.credentials().verifizier_name().unwrap();
        assert!(matches!(
            registry.einfuegen(kollision),
            Err(KaskadeError::SsrcKollision(30))
        ));
        // Fehlgeschlagenes Einfuegen hinterlaesst keine Indexreste
        assert_eq!(registry.nach_name(&name), None);
        assert_eq!(registry.nach_ssrc(32), None);
    }

    #[test]
    fn ohne_remote_credentials_kein_eintrag() {
        let mut rng = StdRng::seed_from_u64(4);
        let mut registry = LinkRegistry::neu();
        let link = Link::neu(
            LinkArt::Uplink,
            TeilnehmerId::new(),
            None,
            IceCredentials::neu(&mut rng),
            &SrtpSchluessel::zufaellig(&mut rng),
            &SrtpSchluessel::zufaellig(&mut rng),
            LinkSsrcs { peer_audio: 1, peer_video: 2, relay_audio: 3, relay_video: 4 },
        );
        assert!(registry.einfuegen(link).is_err());
        assert!(registry.is_empty());
    }

    #[test]
    fn ids_bleiben_eindeutig() {
        let mut rng = StdRng::seed_from_u64(5);
        let mut registry = LinkRegistry::neu();
        let a = registry.einfuegen(link_mit(&mut rng, 40, 41)).unwrap();
        let entfernt = registry.entfernen(a).unwrap();
        drop(entfernt);
        let b = registry.einfuegen(link_mit(&mut rng, 40, 41)).unwrap();
        assert_ne!(a, b, "IDs werden nie wiederverwendet");
    }
}
