//! Der Relay-Reaktor
//!
//! Ein einzelner Task besitzt den UDP-Socket, die Link-Registry und
//! den Raum. Die Empfangsschleife bedient abwechselnd eingehende
//! Datagramme und Befehle der Signalisierung; weil beides ueber eine
//! `select!`-Schleife im selben Task laeuft, braucht der Zustand keine
//! Locks.
//!
//! ## Paketpfade
//!
//! ```text
//! UDP recv_from
//!     |
//!     v
//! klassifiziere()            <- STUN / RTP / RTCP
//!     |
//!     +-- STUN ---> Konnektivitaetspruefung, Adressbindung, FIR
//!     |
//!     +-- Medien -> SSRC-Index -> unprotect -> Fan-out:
//!                   je Downlink SSRC umschreiben, protect, send_to
//! ```
//!
//! Transiente Fehler (unbekannte SSRC, Krypto-Fehler, Sendefehler)
//! werden gezaehlt und geloggt, nie eskaliert.

use std::net::SocketAddr;

use kaskade_core::types::{LinkArt, RaumId, TeilnehmerId};
use kaskade_core::RelayEvent;
use kaskade_protocol::klassifizierer::{self, PaketArt};
use kaskade_protocol::rtcp;
use kaskade_protocol::stun::{self, StunKlasse, StunNachricht};
use tokio::net::UdpSocket;
use tokio::sync::mpsc;

use crate::befehl::{RelayBefehl, RelayHandle};
use crate::raum::Raum;
use crate::registry::{LinkId, LinkRegistry};

/// Empfangspuffer, reicht fuer jede MTU-konforme Paketgroesse
const UDP_PUFFER_GROESSE: usize = 2048;

// ---------------------------------------------------------------------------
// Konfiguration
// ---------------------------------------------------------------------------

/// Konfiguration des Reaktors
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Bind-Adresse des Media-Ports (z.B. "0.0.0.0:10000")
    pub bind_adresse: SocketAddr,
}

impl RelayConfig {
    pub fn neu(bind_adresse: SocketAddr) -> Self {
        Self { bind_adresse }
    }
}

// ---------------------------------------------------------------------------
// Statistik
// ---------------------------------------------------------------------------

/// Laufende Zaehler des Reaktors
#[derive(Debug, Default, Clone, Copy)]
struct Statistik {
    weitergeleitet: u64,
    stun_antworten: u64,
    unbekannte_quelle: u64,
    krypto_verworfen: u64,
    unzustellbar: u64,
}

impl Statistik {
    fn verworfen(&self) -> u64 {
        self.unbekannte_quelle + self.krypto_verworfen + self.unzustellbar
    }
}

// ---------------------------------------------------------------------------
// RelayEngine
// ---------------------------------------------------------------------------

/// Der Reaktor: Socket, Registry und Raum in einem Task
pub struct RelayEngine {
    socket: UdpSocket,
    raum: Raum,
    registry: LinkRegistry,
    befehle: mpsc::UnboundedReceiver<RelayBefehl>,
    ereignisse: mpsc::UnboundedSender<RelayEvent>,
    statistik: Statistik,
}

impl RelayEngine {
    /// Bindet den Media-Port und erstellt Reaktor, Handle und
    /// Ereignisstrom
    pub async fn binden(
        config: RelayConfig,
        raum_id: RaumId,
    ) -> std::io::Result<(Self, RelayHandle, mpsc::UnboundedReceiver<RelayEvent>)> {
        let socket = UdpSocket::bind(config.bind_adresse).await?;
        tracing::info!(adresse = %config.bind_adresse, raum = %raum_id, "Media-Port gebunden");

        let (befehl_tx, befehl_rx) = mpsc::unbounded_channel();
        let (ereignis_tx, ereignis_rx) = mpsc::unbounded_channel();

        let engine = Self {
            socket,
            raum: Raum::neu(raum_id),
            registry: LinkRegistry::neu(),
            befehle: befehl_rx,
            ereignisse: ereignis_tx,
            statistik: Statistik::default(),
        };
        Ok((engine, RelayHandle::neu(befehl_tx), ereignis_rx))
    }

    /// Gibt die gebundene Adresse des Media-Ports zurueck
    pub fn lokale_adresse(&self) -> std::io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// Die Reaktor-Schleife, laeuft bis `Beenden` oder Kanalabriss
    pub async fn laufen(mut self) {
        let mut puffer = [0u8; UDP_PUFFER_GROESSE];
        tracing::info!("Reaktor gestartet");

        loop {
            tokio::select! {
                // Befehle vor Datagrammen abarbeiten: ein marshallierter
                // Abbau muss greifen, bevor spaeter eingetroffene Pakete
                // des betroffenen Teilnehmers weitergeleitet werden
                biased;

                befehl = self.befehle.recv() => {
                    match befehl {
                        Some(RelayBefehl::Beenden) | None => break,
                        Some(befehl) => self.befehl_verarbeiten(befehl),
                    }
                }

                ergebnis = self.socket.recv_from(&mut puffer) => {
                    match ergebnis {
                        Ok((laenge, absender)) => {
                            self.paket_verarbeiten(&puffer[..laenge], absender).await;
                        }
                        Err(e) => {
                            tracing::error!(fehler = %e, "UDP-Empfangsfehler");
                            // Kurze Pause gegen Busy-Loop bei persistentem Fehler
                            tokio::time::sleep(std::time::Duration::from_millis(1)).await;
                        }
                    }
                }
            }
        }

        tracing::info!(
            weitergeleitet = self.statistik.weitergeleitet,
            stun_antworten = self.statistik.stun_antworten,
            unbekannte_quelle = self.statistik.unbekannte_quelle,
            krypto_verworfen = self.statistik.krypto_verworfen,
            "Reaktor beendet"
        );
        let _ = self.ereignisse.send(RelayEvent::ReaktorBeendet {
            pakete_weitergeleitet: self.statistik.weitergeleitet,
            pakete_verworfen: self.statistik.verworfen(),
        });
    }

    // -----------------------------------------------------------------------
    // Paketpfad
    // -----------------------------------------------------------------------

    async fn paket_verarbeiten(&mut self, paket: &[u8], absender: SocketAddr) {
        match klassifizierer::klassifiziere(paket) {
            PaketArt::Stun => self.stun_verarbeiten(paket, absender).await,
            PaketArt::Rtp => self.medien_verarbeiten(paket, false).await,
            PaketArt::Rtcp => self.medien_verarbeiten(paket, true).await,
            PaketArt::Unbekannt => {
                self.statistik.unzustellbar += 1;
                tracing::trace!(absender = %absender, bytes = paket.len(), "Unzustellbares Datagramm");
            }
        }
    }

    // -----------------------------------------------------------------------
    // STUN / Konnektivitaetspruefung
    // -----------------------------------------------------------------------

    async fn stun_verarbeiten(&mut self, paket: &[u8], absender: SocketAddr) {
        let nachricht = match StunNachricht::dekodieren(paket) {
            Ok(nachricht) => nachricht,
            Err(e) => {
                tracing::debug!(fehler = %e, absender = %absender, "Ungueltige STUN-Nachricht");
                return;
            }
        };

        // ice-lite: das Relay stellt keine eigenen Pruefungen, eingehende
        // Indikationen und Antworten werden nur protokolliert
        if nachricht.klasse != StunKlasse::Anfrage {
            tracing::trace!(klasse = ?nachricht.klasse, absender = %absender, "STUN ohne Anfrage-Klasse");
            return;
        }
        let tid = nachricht.transaktions_id;

        if !nachricht.unbekannte_attribute.is_empty() {
            tracing::debug!(
                absender = %absender,
                attribute = ?nachricht.unbekannte_attribute,
                "Binding Request mit unbekannten Pflicht-Attributen"
            );
            let antwort = stun::fehler_antwort(
                &tid,
                420,
                "Unknown Attribute",
                &nachricht.unbekannte_attribute,
            );
            self.antwort_senden(&antwort, absender).await;
            return;
        }

        let vollstaendig = nachricht.methode == 0x0001
            && nachricht.benutzername.is_some()
            && nachricht.hat_integritaet()
            && nachricht.hat_fingerprint()
            && nachricht.pruefe_fingerprint(paket);
        if !vollstaendig {
            tracing::debug!(absender = %absender, "Unvollstaendiger Binding Request");
            let antwort = stun::fehler_antwort(&tid, 400, "Bad Request", &[]);
            self.antwort_senden(&antwort, absender).await;
            return;
        }
        let benutzername = nachricht.benutzername.as_deref().unwrap_or_default();

        let gefunden = self.registry.nach_name(benutzername).and_then(|id| {
            self.registry
                .link(id)
                .map(|link| (id, link.credentials().lokales_passwort().as_bytes().to_vec()))
        });
        let Some((link_id, passwort)) = gefunden else {
            tracing::debug!(
                absender = %absender,
                benutzername = %String::from_utf8_lossy(benutzername),
                "Binding Request fuer unbekannten Link"
            );
            let antwort = stun::fehler_antwort(&tid, 401, "Unauthorized", &[]);
            self.antwort_senden(&antwort, absender).await;
            return;
        };

        if !nachricht.pruefe_integritaet(paket, &passwort) {
            tracing::debug!(absender = %absender, link = %link_id, "MESSAGE-INTEGRITY ungueltig");
            let antwort = stun::fehler_antwort(&tid, 401, "Unauthorized", &[]);
            self.antwort_senden(&antwort, absender).await;
            return;
        }

        // Das Relay ist immer controlled (ice-lite). Ein Peer der sich
        // selbst als controlled meldet, widerspricht der ausgehandelten
        // Rollenverteilung; der Link ist damit nicht zu retten.
        if nachricht.ice_controlled {
            tracing::error!(
                absender = %absender,
                link = %link_id,
                "ICE-Rollenkonflikt, Link wird verworfen"
            );
            let antwort = stun::fehler_antwort(&tid, 487, "Role Conflict", &[]);
            self.antwort_senden(&antwort, absender).await;
            self.link_verwerfen(link_id, "Rollenkonflikt");
            return;
        }

        let antwort = stun::erfolgs_antwort(&tid, absender, &passwort);
        self.antwort_senden(&antwort, absender).await;
        self.statistik.stun_antworten += 1;

        if !nachricht.use_candidate {
            return;
        }

        // Nominierte Pruefung: Adresse binden, beim Uebergang zu
        // "aufgeloest" Ereignis melden und fuer Downlinks einen
        // Keyframe beim Publisher anfordern
        let Some(link) = self.registry.link_mut(link_id) else {
            return;
        };
        if !link.adresse_binden(absender) {
            return;
        }
        let (art, besitzer, partner) = (link.art, link.besitzer, link.partner);
        tracing::info!(link = %link_id, art = %art, adresse = %absender, "Link aufgeloest");
        let _ = self.ereignisse.send(RelayEvent::LinkAufgeloest {
            teilnehmer_id: besitzer,
            art,
            partner,
            adresse: absender,
        });

        if art == LinkArt::Downlink {
            if let Some(publisher) = partner {
                self.fir_senden(publisher, besitzer).await;
            }
        }
    }

    /// Fordert per FIR einen Keyframe beim Publisher an
    async fn fir_senden(&mut self, publisher: TeilnehmerId, abonnent: TeilnehmerId) {
        let Some(uplink_id) = self.raum.teilnehmer(publisher).map(|t| t.uplink) else {
            tracing::warn!(publisher = %publisher, "FIR: Publisher nicht im Raum");
            return;
        };
        let Some(uplink) = self.registry.link_mut(uplink_id) else {
            return;
        };
        let Some(ziel) = uplink.transport() else {
            tracing::debug!(publisher = %publisher, "FIR: Uplink noch nicht aufgeloest");
            return;
        };

        let sequenz = uplink.naechste_fir_sequenz();
        let fir = rtcp::fir_bauen(uplink.ssrcs.relay_video, uplink.ssrcs.peer_video, sequenz);
        match uplink.ausgehend.protect_rtcp(&fir) {
            Ok(geschuetzt) => {
                if let Err(e) = self.socket.send_to(&geschuetzt, ziel).await {
                    tracing::warn!(fehler = %e, ziel = %ziel, "FIR-Sendefehler");
                }
            }
            Err(e) => {
                tracing::warn!(fehler = %e, publisher = %publisher, "FIR konnte nicht geschuetzt werden");
                return;
            }
        }

        tracing::debug!(publisher = %publisher, abonnent = %abonnent, sequenz, "FIR angefordert");
        let _ = self.ereignisse.send(RelayEvent::FirAngefordert { publisher, abonnent, sequenz });
    }

    async fn antwort_senden(&self, antwort: &[u8], ziel: SocketAddr) {
        if let Err(e) = self.socket.send_to(antwort, ziel).await {
            tracing::warn!(fehler = %e, ziel = %ziel, "STUN-Antwort nicht zustellbar");
        }
    }

    // -----------------------------------------------------------------------
    // Medienpfad
    // -----------------------------------------------------------------------

    async fn medien_verarbeiten(&mut self, paket: &[u8], ist_rtcp: bool) {
        let Some(quell_ssrc) = klassifizierer::ssrc(paket) else {
            self.statistik.unzustellbar += 1;
            return;
        };
        let Some(link_id) = self.registry.nach_ssrc(quell_ssrc) else {
            self.statistik.unbekannte_quelle += 1;
            let payload_typ = if ist_rtcp { paket[1] } else { paket[1] & 0x7f };
            tracing::warn!(
                ssrc = quell_ssrc,
                rtcp = ist_rtcp,
                payload_typ,
                "Medienpaket von unbekannter Quelle verworfen"
            );
            return;
        };
        let Some(link) = self.registry.link_mut(link_id) else {
            return;
        };

        let entschluesselt = if ist_rtcp {
            link.eingehend.unprotect_rtcp(paket)
        } else {
            link.eingehend.unprotect(paket)
        };
        let klartext = match entschluesselt {
            Ok(klartext) => klartext,
            Err(e) => {
                self.statistik.krypto_verworfen += 1;
                tracing::debug!(fehler = %e, ssrc = quell_ssrc, link = %link_id, "SRTP-Pruefung fehlgeschlagen");
                return;
            }
        };

        // Rueckkanal eines Downlinks (z.B. Receiver Reports) endet hier
        if link.art == LinkArt::Downlink {
            tracing::trace!(link = %link_id, rtcp = ist_rtcp, "Feedback vom Abonnenten");
            return;
        }

        let besitzer = link.besitzer;
        let ist_audio = quell_ssrc == link.ssrcs.peer_audio;
        let ssrc_offset = if ist_rtcp { 4 } else { 8 };

        for ziel_id in self.raum.sendeziele_fuer(besitzer) {
            let Some(downlink) = self.registry.link_mut(ziel_id) else {
                continue;
            };
            let Some(ziel_adresse) = downlink.transport() else {
                // Noch nicht aufgeloeste Abonnenten bekommen nichts
                continue;
            };

            let relay_ssrc = if ist_audio {
                downlink.ssrcs.relay_audio
            } else {
                downlink.ssrcs.relay_video
            };
            let mut ausgabe = klartext.clone();
            ausgabe[ssrc_offset..ssrc_offset + 4].copy_from_slice(&relay_ssrc.to_be_bytes());

            let geschuetzt = if ist_rtcp {
                downlink.ausgehend.protect_rtcp(&ausgabe)
            } else {
                downlink.ausgehend.protect(&ausgabe)
            };
            match geschuetzt {
                Ok(geschuetzt) => {
                    if let Err(e) = self.socket.send_to(&geschuetzt, ziel_adresse).await {
                        tracing::warn!(fehler = %e, ziel = %ziel_adresse, "Medien-Sendefehler");
                    } else {
                        self.statistik.weitergeleitet += 1;
                    }
                }
                Err(e) => {
                    tracing::warn!(fehler = %e, link = %ziel_id, "Ausgehender SRTP-Schutz fehlgeschlagen");
                }
            }
        }
    }

    // -----------------------------------------------------------------------
    // Befehle
    // -----------------------------------------------------------------------

    fn befehl_verarbeiten(&mut self, befehl: RelayBefehl) {
        match befehl {
            RelayBefehl::TeilnehmerHinzufuegen { id, uplink } => {
                match self.registry.einfuegen(*uplink) {
                    Ok(link_id) => {
                        self.raum.teilnehmer_hinzufuegen(id, link_id);
                        tracing::info!(teilnehmer = %id, link = %link_id, "Teilnehmer beigetreten");
                    }
                    Err(e) => {
                        tracing::error!(fehler = %e, teilnehmer = %id, "Uplink nicht registrierbar");
                    }
                }
            }

            RelayBefehl::DownlinkHinzufuegen { abonnent, publisher, link } => {
                if self.raum.teilnehmer(abonnent).is_none() {
                    tracing::error!(abonnent = %abonnent, "Downlink fuer unbekannten Abonnenten");
                    return;
                }
                match self.registry.einfuegen(*link) {
                    Ok(link_id) => {
                        if let Some(alter_link) =
                            self.raum.downlink_setzen(abonnent, publisher, link_id)
                        {
                            // Ersetztes Abo traegt seine Indexeintraege mit hinaus
                            self.registry.entfernen(alter_link);
                        }
                        tracing::info!(
                            abonnent = %abonnent,
                            publisher = %publisher,
                            link = %link_id,
                            "Downlink eingerichtet"
                        );
                    }
                    Err(e) => {
                        tracing::error!(fehler = %e, abonnent = %abonnent, "Downlink nicht registrierbar");
                    }
                }
            }

            RelayBefehl::DownlinkEntfernen { abonnent, publisher } => {
                if let Some(link_id) = self.raum.downlink_entfernen(abonnent, publisher) {
                    self.link_austragen(link_id, abonnent, LinkArt::Downlink, "abgemeldet");
                }
            }

            RelayBefehl::TeilnehmerEntfernen { id } => self.teilnehmer_entfernen(id),

            // Wird in der Schleife behandelt
            RelayBefehl::Beenden => {}
        }
    }

    /// Entfernt einen Teilnehmer samt Uplink, eigenen Downlinks und
    /// den Downlinks anderer Teilnehmer auf ihn
    fn teilnehmer_entfernen(&mut self, id: TeilnehmerId) {
        let Some(teilnehmer) = self.raum.teilnehmer_entfernen(id) else {
            tracing::warn!(teilnehmer = %id, "Entfernen: Teilnehmer unbekannt");
            return;
        };

        for (_, link_id) in teilnehmer.downlinks {
            self.link_austragen(link_id, id, LinkArt::Downlink, "verlassen");
        }
        self.link_austragen(teilnehmer.uplink, id, LinkArt::Uplink, "verlassen");

        for (abonnent, link_id) in self.raum.downlinks_auf_publisher_entfernen(id) {
            self.link_austragen(link_id, abonnent, LinkArt::Downlink, "Publisher verlassen");
        }
        tracing::info!(teilnehmer = %id, "Teilnehmer entfernt");
    }

    /// Entfernt einen Link aus der Registry und meldet das Ereignis
    fn link_austragen(&mut self, link_id: LinkId, besitzer: TeilnehmerId, art: LinkArt, grund: &str) {
        if self.registry.entfernen(link_id).is_none() {
            return;
        }
        let _ = self.ereignisse.send(RelayEvent::LinkEntfernt {
            teilnehmer_id: besitzer,
            art,
            grund: grund.into(),
        });
    }

    /// Verwirft einen Link nach einem link-fatalen Fehler und pflegt
    /// die Raum-Buchfuehrung nach
    fn link_verwerfen(&mut self, link_id: LinkId, grund: &str) {
        let Some((art, besitzer, partner)) = self
            .registry
            .link(link_id)
            .map(|link| (link.art, link.besitzer, link.partner))
        else {
            return;
        };
        match art {
            // Ohne Uplink ist der Teilnehmer nicht haltbar
            LinkArt::Uplink => self.teilnehmer_entfernen(besitzer),
            LinkArt::Downlink => {
                if let Some(publisher) = partner {
                    self.raum.downlink_entfernen(besitzer, publisher);
                }
                self.link_austragen(link_id, besitzer, LinkArt::Downlink, grund);
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ice::IceCredentials;
    use crate::link::{Link, LinkSsrcs};
    use kaskade_crypto::{SrtpSchluessel, SrtpSession};
    use kaskade_protocol::stun::{binding_anfrage, BindingAnfrage};
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::net::{IpAddr, Ipv4Addr};
    use std::time::Duration;
    use tokio::net::UdpSocket;
    use tokio::sync::mpsc::UnboundedReceiver;
    use tokio::time::timeout;

    fn localhost(port: u16) -> SocketAddr {
        SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), port)
    }

    /// Testseitige Sicht auf einen Link: Credentials und Schluessel
    /// wie sie der Client kennt
    struct ClientSicht {
        benutzername: Vec<u8>,
        passwort: Vec<u8>,
        sende_schluessel: SrtpSchluessel,
        empfangs_schluessel: SrtpSchluessel,
        ssrcs: LinkSsrcs,
    }

    fn link_bauen(
        rng: &mut StdRng,
        art: LinkArt,
        besitzer: TeilnehmerId,
        partner: Option<TeilnehmerId>,
        basis_ssrc: u32,
    ) -> (Link, ClientSicht) {
        let mut credentials = IceCredentials::neu(rng);
        let client_ufrag = format!("client{basis_ssrc}");
        credentials.setze_remote(client_ufrag.as_str(), "clientpasswort").unwrap();

        let benutzername = credentials.verifizier_name().unwrap();
        let passwort = credentials.lokales_passwort().as_bytes().to_vec();
        let eingehend = SrtpSchluessel::zufaellig(rng);
        let ausgehend = SrtpSchluessel::zufaellig(rng);
        let ssrcs = LinkSsrcs {
            peer_audio: basis_ssrc,
            peer_video: basis_ssrc + 1,
            relay_audio: basis_ssrc + 1000,
            relay_video: basis_ssrc + 1001,
        };

        let link = Link::neu(art, besitzer, partner, credentials, &eingehend, &ausgehend, ssrcs);
        let sicht = ClientSicht {
            benutzername,
            passwort,
            sende_schluessel: eingehend,
            empfangs_schluessel: ausgehend,
            ssrcs,
        };
        (link, sicht)
    }

    async fn engine_starten() -> (
        RelayHandle,
        UnboundedReceiver<RelayEvent>,
        SocketAddr,
        tokio::task::JoinHandle<()>,
    ) {
        let (engine, handle, ereignisse) =
            RelayEngine::binden(RelayConfig::neu(localhost(0)), RaumId::new())
                .await
                .expect("Media-Port muss binden");
        let adresse = engine.lokale_adresse().unwrap();
        let task = tokio::spawn(engine.laufen());
        (handle, ereignisse, adresse, task)
    }

    /// Fuehrt eine nominierte Konnektivitaetspruefung durch und liefert
    /// die dekodierte Antwort
    async fn nominieren(
        socket: &UdpSocket,
        relay: SocketAddr,
        sicht: &ClientSicht,
    ) -> StunNachricht {
        let anfrage = binding_anfrage(
            &[7u8; 12],
            &BindingAnfrage {
                benutzername: &sicht.benutzername,
                passwort: &sicht.passwort,
                prioritaet: 0x7e00_0001,
                use_candidate: true,
                controlling: Some(42),
                controlled: None,
            },
        );
        socket.send_to(&anfrage, relay).await.unwrap();

        let mut puffer = [0u8; 1500];
        let (laenge, _) = timeout(Duration::from_secs(2), socket.recv_from(&mut puffer))
            .await
            .expect("Antwort muss kommen")
            .unwrap();
        StunNachricht::dekodieren(&puffer[..laenge]).expect("Antwort muss dekodierbar sein")
    }

    fn rtp_paket(seq: u16, ssrc: u32, payload: &[u8]) -> Vec<u8> {
        let mut paket = vec![0x80, 111, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0];
        paket[2..4].copy_from_slice(&seq.to_be_bytes());
        paket[8..12].copy_from_slice(&ssrc.to_be_bytes());
        paket.extend_from_slice(payload);
        paket
    }

    #[tokio::test]
    async fn media_port_binden() {
        let (engine, _handle, _ereignisse) =
            RelayEngine::binden(RelayConfig::neu(localhost(0)), RaumId::new())
                .await
                .expect("Media-Port muss binden");
        assert_ne!(engine.lokale_adresse().unwrap().port(), 0);
    }

    #[tokio::test]
    async fn handshake_fir_und_weiterleitung() {
        let mut rng = StdRng::seed_from_u64(99);
        let (handle, mut ereignisse, relay, task) = engine_starten().await;

        let publisher = TeilnehmerId::new();
        let abonnent = TeilnehmerId::new();

        let (uplink_p, sicht_p) = link_bauen(&mut rng, LinkArt::Uplink, publisher, None, 100);
        let (uplink_a, sicht_a) = link_bauen(&mut rng, LinkArt::Uplink, abonnent, None, 200);
        let (downlink, sicht_d) =
            link_bauen(&mut rng, LinkArt::Downlink, abonnent, Some(publisher), 300);

        handle.teilnehmer_hinzufuegen(publisher, uplink_p).unwrap();
        handle.teilnehmer_hinzufuegen(abonnent, uplink_a).unwrap();
        handle.downlink_hinzufuegen(abonnent, publisher, downlink).unwrap();

        let socket_p = UdpSocket::bind(localhost(0)).await.unwrap();
        let socket_a = UdpSocket::bind(localhost(0)).await.unwrap();

        // Uplinks nominieren
        let antwort = nominieren(&socket_p, relay, &sicht_p).await;
        assert_eq!(antwort.klasse, StunKlasse::Erfolg);
        assert_eq!(antwort.xor_adresse, Some(socket_p.local_addr().unwrap()));
        let antwort = nominieren(&socket_a, relay, &sicht_a).await;
        assert_eq!(antwort.klasse, StunKlasse::Erfolg);

        // Downlink nominieren: danach muss ein FIR beim Publisher ankommen
        let antwort = nominieren(&socket_a, relay, &sicht_d).await;
        assert_eq!(antwort.klasse, StunKlasse::Erfolg);

        let mut puffer = [0u8; 1500];
        let (laenge, _) = timeout(Duration::from_secs(2), socket_p.recv_from(&mut puffer))
            .await
            .expect("FIR muss kommen")
            .unwrap();
        let mut empfang_p = SrtpSession::neu(&sicht_p.empfangs_schluessel);
        let fir = empfang_p.unprotect_rtcp(&puffer[..laenge]).unwrap();
        assert_eq!(fir[1], 206, "PSFB");
        assert_eq!(&fir[4..8], &sicht_p.ssrcs.relay_video.to_be_bytes());
        assert_eq!(&fir[12..16], &sicht_p.ssrcs.peer_video.to_be_bytes());

        // Publisher sendet Audio, Abonnent muss es unter der
        // Relay-SSRC seines Downlinks empfangen
        let mut sende_p = SrtpSession::neu(&sicht_p.sende_schluessel);
        let klartext = rtp_paket(500, sicht_p.ssrcs.peer_audio, b"medienprobe");
        let geschuetzt = sende_p.protect(&klartext).unwrap();
        socket_p.send_to(&geschuetzt, relay).await.unwrap();

        let (laenge, _) = timeout(Duration::from_secs(2), socket_a.recv_from(&mut puffer))
            .await
            .expect("Medien muessen ankommen")
            .unwrap();
        let mut empfang_d = SrtpSession::neu(&sicht_d.empfangs_schluessel);
        let empfangen = empfang_d.unprotect(&puffer[..laenge]).unwrap();
        assert_eq!(
            &empfangen[8..12],
            &sicht_d.ssrcs.relay_audio.to_be_bytes(),
            "SSRC muss auf die Relay-Kennung umgeschrieben sein"
        );
        assert_eq!(&empfangen[12..], b"medienprobe");
        assert_eq!(&empfangen[2..4], &klartext[2..4], "Sequenznummer bleibt erhalten");

        // Ereignisse: drei Aufloesungen und eine FIR-Anforderung
        let mut aufgeloest = 0;
        let mut fir_ereignis = false;
        while let Ok(ereignis) = ereignisse.try_recv() {
            match ereignis {
                RelayEvent::LinkAufgeloest { .. } => aufgeloest += 1,
                RelayEvent::FirAngefordert { publisher: p, abonnent: a, .. } => {
                    assert_eq!(p, publisher);
                    assert_eq!(a, abonnent);
                    fir_ereignis = true;
                }
                _ => {}
            }
        }
        assert_eq!(aufgeloest, 3);
        assert!(fir_ereignis);

        handle.beenden().unwrap();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn fanout_nur_an_aufgeloeste_abonnenten() {
        let mut rng = StdRng::seed_from_u64(19);
        let (handle, _ereignisse, relay, task) = engine_starten().await;

        let publisher = TeilnehmerId::new();
        let abonnent_a = TeilnehmerId::new();
        let abonnent_b = TeilnehmerId::new();

        let (uplink_p, sicht_p) = link_bauen(&mut rng, LinkArt::Uplink, publisher, None, 100);
        let (uplink_a, sicht_ua) = link_bauen(&mut rng, LinkArt::Uplink, abonnent_a, None, 200);
        let (uplink_b, sicht_ub) = link_bauen(&mut rng, LinkArt::Uplink, abonnent_b, None, 300);
        let (downlink_a, sicht_da) =
            link_bauen(&mut rng, LinkArt::Downlink, abonnent_a, Some(publisher), 400);
        let (downlink_b, sicht_db) =
            link_bauen(&mut rng, LinkArt::Downlink, abonnent_b, Some(publisher), 500);

        handle.teilnehmer_hinzufuegen(publisher, uplink_p).unwrap();
        handle.teilnehmer_hinzufuegen(abonnent_a, uplink_a).unwrap();
        handle.teilnehmer_hinzufuegen(abonnent_b, uplink_b).unwrap();
        handle.downlink_hinzufuegen(abonnent_a, publisher, downlink_a).unwrap();
        handle.downlink_hinzufuegen(abonnent_b, publisher, downlink_b).unwrap();

        let socket_p = UdpSocket::bind(localhost(0)).await.unwrap();
        let socket_a = UdpSocket::bind(localhost(0)).await.unwrap();
        let socket_b = UdpSocket::bind(localhost(0)).await.unwrap();

        nominieren(&socket_p, relay, &sicht_p).await;
        nominieren(&socket_a, relay, &sicht_ua).await;
        nominieren(&socket_b, relay, &sicht_ub).await;
        // Nur Abonnent A nominiert seinen Downlink; B bleibt unaufgeloest
        let antwort = nominieren(&socket_a, relay, &sicht_da).await;
        assert_eq!(antwort.klasse, StunKlasse::Erfolg);

        let mut sende_p = SrtpSession::neu(&sicht_p.sende_schluessel);
        let klartext = rtp_paket(600, sicht_p.ssrcs.peer_audio, b"nur fuer a");
        socket_p.send_to(&sende_p.protect(&klartext).unwrap(), relay).await.unwrap();

        let mut puffer = [0u8; 1500];
        let (laenge, _) = timeout(Duration::from_secs(2), socket_a.recv_from(&mut puffer))
            .await
            .expect("Medien muessen beim aufgeloesten Abonnenten ankommen")
            .unwrap();
        let chiffre = puffer[..laenge].to_vec();

        // Nur der eigene Downlink-Schluessel oeffnet das Paket
        let mut fremd = SrtpSession::neu(&sicht_db.empfangs_schluessel);
        assert!(fremd.unprotect(&chiffre).is_err(), "fremder Schluessel darf nicht passen");
        let mut eigen = SrtpSession::neu(&sicht_da.empfangs_schluessel);
        let empfangen = eigen.unprotect(&chiffre).unwrap();
        assert_eq!(&empfangen[8..12], &sicht_da.ssrcs.relay_audio.to_be_bytes());
        assert_eq!(&empfangen[12..], b"nur fuer a");

        // Genau ein Paket fuer A, kein Paket fuer den unaufgeloesten B
        assert!(
            timeout(Duration::from_millis(300), socket_a.recv_from(&mut puffer)).await.is_err(),
            "es darf nur ein Paket pro Abonnent entstehen"
        );
        assert!(
            timeout(Duration::from_millis(300), socket_b.recv_from(&mut puffer)).await.is_err(),
            "unaufgeloester Downlink darf keine Medien sehen"
        );

        handle.beenden().unwrap();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn falsches_passwort_ergibt_401() {
        let mut rng = StdRng::seed_from_u64(7);
        let (handle, _ereignisse, relay, task) = engine_starten().await;

        let teilnehmer = TeilnehmerId::new();
        let (uplink, mut sicht) = link_bauen(&mut rng, LinkArt::Uplink, teilnehmer, None, 100);
        handle.teilnehmer_hinzufuegen(teilnehmer, uplink).unwrap();

        sicht.passwort = b"voelligfalsch".to_vec();
        let socket = UdpSocket::bind(localhost(0)).await.unwrap();
        let antwort = nominieren(&socket, relay, &sicht).await;
        assert_eq!(antwort.klasse, StunKlasse::Fehler);
        assert_eq!(antwort.fehler_code, Some(401));

        handle.beenden().unwrap();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn unbekannter_benutzername_ergibt_401() {
        let (handle, _ereignisse, relay, task) = engine_starten().await;

        let sicht = ClientSicht {
            benutzername: b"niemand:hier".to_vec(),
            passwort: b"egalwelchespasswort12345".to_vec(),
            sende_schluessel: SrtpSchluessel::zufaellig(&mut StdRng::seed_from_u64(1)),
            empfangs_schluessel: SrtpSchluessel::zufaellig(&mut StdRng::seed_from_u64(2)),
            ssrcs: LinkSsrcs { peer_audio: 1, peer_video: 2, relay_audio: 3, relay_video: 4 },
        };
        let socket = UdpSocket::bind(localhost(0)).await.unwrap();
        let antwort = nominieren(&socket, relay, &sicht).await;
        assert_eq!(antwort.fehler_code, Some(401));

        handle.beenden().unwrap();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn nackter_header_ergibt_400() {
        let (handle, _ereignisse, relay, task) = engine_starten().await;

        // Binding Request ohne jedes Attribut
        let mut anfrage = vec![0x00, 0x01, 0x00, 0x00];
        anfrage.extend_from_slice(&stun::MAGIC_COOKIE.to_be_bytes());
        anfrage.extend_from_slice(&[9u8; 12]);

        let socket = UdpSocket::bind(localhost(0)).await.unwrap();
        socket.send_to(&anfrage, relay).await.unwrap();

        let mut puffer = [0u8; 1500];
        let (laenge, _) = timeout(Duration::from_secs(2), socket.recv_from(&mut puffer))
            .await
            .expect("Antwort muss kommen")
            .unwrap();
        let antwort = StunNachricht::dekodieren(&puffer[..laenge]).unwrap();
        assert_eq!(antwort.fehler_code, Some(400));

        handle.beenden().unwrap();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn unbekanntes_pflicht_attribut_ergibt_420() {
        let (handle, _ereignisse, relay, task) = engine_starten().await;

        // Binding Request mit unbekanntem Attribut 0x0033 von Hand
        let mut anfrage = vec![0x00, 0x01, 0x00, 0x08];
        anfrage.extend_from_slice(&stun::MAGIC_COOKIE.to_be_bytes());
        anfrage.extend_from_slice(&[9u8; 12]);
        anfrage.extend_from_slice(&[0x00, 0x33, 0x00, 0x04, 1, 2, 3, 4]);

        let socket = UdpSocket::bind(localhost(0)).await.unwrap();
        socket.send_to(&anfrage, relay).await.unwrap();

        let mut puffer = [0u8; 1500];
        let (laenge, _) = timeout(Duration::from_secs(2), socket.recv_from(&mut puffer))
            .await
            .expect("Antwort muss kommen")
            .unwrap();
        let antwort = StunNachricht::dekodieren(&puffer[..laenge]).unwrap();
        assert_eq!(antwort.fehler_code, Some(420));

        handle.beenden().unwrap();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn rollenkonflikt_verwirft_link() {
        let mut rng = StdRng::seed_from_u64(11);
        let (handle, mut ereignisse, relay, task) = engine_starten().await;

        let teilnehmer = TeilnehmerId::new();
        let (uplink, sicht) = link_bauen(&mut rng, LinkArt::Uplink, teilnehmer, None, 100);
        handle.teilnehmer_hinzufuegen(teilnehmer, uplink).unwrap();

        let socket = UdpSocket::bind(localhost(0)).await.unwrap();
        let anfrage = binding_anfrage(
            &[3u8; 12],
            &BindingAnfrage {
                benutzername: &sicht.benutzername,
                passwort: &sicht.passwort,
                prioritaet: 1,
                use_candidate: false,
                controlling: None,
                controlled: Some(77),
            },
        );
        socket.send_to(&anfrage, relay).await.unwrap();

        let mut puffer = [0u8; 1500];
        let (laenge, _) = timeout(Duration::from_secs(2), socket.recv_from(&mut puffer))
            .await
            .expect("Antwort muss kommen")
            .unwrap();
        let antwort = StunNachricht::dekodieren(&puffer[..laenge]).unwrap();
        assert_eq!(antwort.fehler_code, Some(487));

        // Der Link ist weg: dieselbe Anfrage ohne Konflikt laeuft in 401
        let antwort = nominieren(&socket, relay, &sicht).await;
        assert_eq!(antwort.fehler_code, Some(401));

        let mut entfernt = false;
        while let Ok(ereignis) = ereignisse.try_recv() {
            if let RelayEvent::LinkEntfernt { teilnehmer_id, grund, .. } = ereignis {
                assert_eq!(teilnehmer_id, teilnehmer);
                assert!(grund.contains("verlassen") || grund.contains("Rollenkonflikt"));
                entfernt = true;
            }
        }
        assert!(entfernt, "LinkEntfernt-Ereignis muss gemeldet werden");

        handle.beenden().unwrap();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn wiederholte_nominierung_bindet_nicht_um() {
        let mut rng = StdRng::seed_from_u64(13);
        let (handle, mut ereignisse, relay, task) = engine_starten().await;

        let teilnehmer = TeilnehmerId::new();
        let (uplink, sicht) = link_bauen(&mut rng, LinkArt::Uplink, teilnehmer, None, 100);
        handle.teilnehmer_hinzufuegen(teilnehmer, uplink).unwrap();

        let socket_a = UdpSocket::bind(localhost(0)).await.unwrap();
        let socket_b = UdpSocket::bind(localhost(0)).await.unwrap();

        let antwort = nominieren(&socket_a, relay, &sicht).await;
        assert_eq!(antwort.klasse, StunKlasse::Erfolg);
        // Zweite Nominierung von anderer Adresse wird beantwortet,
        // aendert die Bindung aber nicht
        let antwort = nominieren(&socket_b, relay, &sicht).await;
        assert_eq!(antwort.klasse, StunKlasse::Erfolg);

        let mut aufloesungen = Vec::new();
        while let Ok(ereignis) = ereignisse.try_recv() {
            if let RelayEvent::LinkAufgeloest { adresse, .. } = ereignis {
                aufloesungen.push(adresse);
            }
        }
        assert_eq!(aufloesungen, vec![socket_a.local_addr().unwrap()]);

        handle.beenden().unwrap();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn teilnehmer_entfernen_raeumt_links() {
        let mut rng = StdRng::seed_from_u64(17);
        let (handle, _ereignisse, relay, task) = engine_starten().await;

        let teilnehmer = TeilnehmerId::new();
        let (uplink, sicht) = link_bauen(&mut rng, LinkArt::Uplink, teilnehmer, None, 100);
        handle.teilnehmer_hinzufuegen(teilnehmer, uplink).unwrap();

        let socket = UdpSocket::bind(localhost(0)).await.unwrap();
        let antwort = nominieren(&socket, relay, &sicht).await;
        assert_eq!(antwort.klasse, StunKlasse::Erfolg);

        handle.teilnehmer_entfernen(teilnehmer).unwrap();
        // Nach dem Entfernen kennt die Registry den Namen nicht mehr
        let antwort = nominieren(&socket, relay, &sicht).await;
        assert_eq!(antwort.fehler_code, Some(401));

        handle.beenden().unwrap();
        task.await.unwrap();
    }
}
