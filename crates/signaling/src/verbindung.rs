//! Client-Verbindung – Verwaltet eine einzelne TCP-Verbindung
//!
//! Jede TCP-Verbindung bekommt eine `ClientVerbindung` in einem eigenen
//! tokio-Task. Das Protokoll ist zeilenweises JSON; die erste Nachricht
//! muss der Beitritt sein.
//!
//! ## State Machine
//! ```text
//! Verbunden -> Beigetreten -> (Abonnieren | Abbestellen)*
//!     |             |
//!     +---- Trennung raeumt alle Links des Teilnehmers ab ----+
//! ```

use std::net::SocketAddr;
use std::sync::Arc;

use futures::{SinkExt, StreamExt};
use kaskade_core::types::{LinkArt, TeilnehmerId};
use kaskade_crypto::SrtpSchluessel;
use kaskade_relay::{Link, LinkSsrcs};
use tokio::net::TcpStream;
use tokio_util::codec::{Framed, LinesCodec};

use crate::error::{SignalingError, SignalingResult};
use crate::nachricht::{ClientNachricht, ServerNachricht};
use crate::zustand::SignalingState;

/// Maximale Zeilenlaenge einer Nachricht in Bytes
const MAX_ZEILEN_LAENGE: usize = 16 * 1024;

// ---------------------------------------------------------------------------
// ClientVerbindung
// ---------------------------------------------------------------------------

/// Verarbeitet eine einzelne TCP-Verbindung
///
/// Liest Zeilen via `LinesCodec`, dekodiert JSON und setzt die
/// Anfragen in Befehle an den Reaktor um. Laeuft in einem eigenen
/// tokio-Task.
pub struct ClientVerbindung {
    state: Arc<SignalingState>,
    peer_addr: SocketAddr,
    /// Gesetzt sobald der Beitritt verarbeitet wurde
    teilnehmer_id: Option<TeilnehmerId>,
}

impl ClientVerbindung {
    pub fn neu(state: Arc<SignalingState>, peer_addr: SocketAddr) -> Self {
        Self { state, peer_addr, teilnehmer_id: None }
    }

    /// Startet die Verbindungs-Verarbeitungsschleife
    ///
    /// Laeuft bis die Verbindung getrennt wird oder ein
    /// Shutdown-Signal eingeht. Beim Verlassen werden alle Links des
    /// Teilnehmers aus dem Relay entfernt.
    pub async fn verarbeiten(
        mut self,
        stream: TcpStream,
        mut shutdown_rx: tokio::sync::watch::Receiver<bool>,
    ) {
        let peer_addr = self.peer_addr;
        tracing::info!(peer = %peer_addr, "Neue Signaling-Verbindung");

        let mut framed =
            Framed::new(stream, LinesCodec::new_with_max_length(MAX_ZEILEN_LAENGE));

        loop {
            tokio::select! {
                zeile = framed.next() => {
                    let zeile = match zeile {
                        Some(Ok(zeile)) => zeile,
                        Some(Err(e)) => {
                            tracing::warn!(peer = %peer_addr, fehler = %e, "Lesefehler");
                            break;
                        }
                        None => break,
                    };

                    let antwort = match serde_json::from_str::<ClientNachricht>(&zeile) {
                        Ok(nachricht) => match self.nachricht_verarbeiten(nachricht) {
                            Ok(antwort) => antwort,
                            Err(e) => {
                                tracing::debug!(peer = %peer_addr, fehler = %e, "Anfrage abgelehnt");
                                ServerNachricht::Fehler { grund: e.to_string() }
                            }
                        },
                        Err(e) => {
                            tracing::debug!(peer = %peer_addr, fehler = %e, "Unlesbare Nachricht");
                            ServerNachricht::Fehler {
                                grund: SignalingError::from(e).to_string(),
                            }
                        }
                    };

                    let json = match serde_json::to_string(&antwort) {
                        Ok(json) => json,
                        Err(e) => {
                            tracing::error!(peer = %peer_addr, fehler = %e, "Antwort nicht serialisierbar");
                            break;
                        }
                    };
                    if let Err(e) = framed.send(json).await {
                        tracing::warn!(peer = %peer_addr, fehler = %e, "Sendefehler");
                        break;
                    }
                }
                geaendert = shutdown_rx.changed() => {
                    // Ein abgerissener Sender zaehlt als Shutdown
                    if geaendert.is_err() || *shutdown_rx.borrow() {
                        tracing::debug!(peer = %peer_addr, "Shutdown, Verbindung wird geschlossen");
                        break;
                    }
                }
            }
        }

        self.aufraeumen();
        tracing::info!(peer = %peer_addr, "Signaling-Verbindung beendet");
    }

    // -----------------------------------------------------------------------
    // Nachrichtenverarbeitung
    // -----------------------------------------------------------------------

    fn nachricht_verarbeiten(
        &mut self,
        nachricht: ClientNachricht,
    ) -> SignalingResult<ServerNachricht> {
        match nachricht {
            ClientNachricht::AuthAnfrage {
                ice_ufrag,
                ice_pwd,
                audio_ssrc,
                video_ssrc,
                schluessel,
            } => self.beitritt(ice_ufrag, ice_pwd, audio_ssrc, video_ssrc, &schluessel),
            ClientNachricht::Abonnieren {
                publisher,
                ice_ufrag,
                ice_pwd,
                audio_ssrc,
                video_ssrc,
                schluessel,
            } => self.abonnieren(publisher, ice_ufrag, ice_pwd, audio_ssrc, video_ssrc, &schluessel),
            ClientNachricht::Abbestellen { publisher } => self.abbestellen(publisher),
        }
    }

    /// Beitritt: legt den Teilnehmer samt Uplink im Relay an
    fn beitritt(
        &mut self,
        ice_ufrag: String,
        ice_pwd: String,
        audio_ssrc: u32,
        video_ssrc: u32,
        schluessel: &str,
    ) -> SignalingResult<ServerNachricht> {
        if self.teilnehmer_id.is_some() {
            return Err(SignalingError::BereitsBeigetreten);
        }

        let id = TeilnehmerId::new();
        let (link, relay_ufrag, relay_pwd, relay_schluessel, ssrcs) = self.link_bauen(
            LinkArt::Uplink,
            id,
            None,
            ice_ufrag,
            ice_pwd,
            audio_ssrc,
            video_ssrc,
            schluessel,
        )?;

        self.state.relay.teilnehmer_hinzufuegen(id, link)?;
        self.state.teilnehmer.insert(id);
        self.teilnehmer_id = Some(id);

        tracing::info!(peer = %self.peer_addr, teilnehmer = %id, "Teilnehmer beigetreten");

        Ok(ServerNachricht::AuthAntwort {
            teilnehmer_id: id,
            raum_id: self.state.raum_id,
            ice_ufrag: relay_ufrag,
            ice_pwd: relay_pwd,
            schluessel: relay_schluessel,
            audio_ssrc: ssrcs.relay_audio,
            video_ssrc: ssrcs.relay_video,
            kandidat: self.state.kandidat(),
        })
    }

    /// Abonnement: legt einen Downlink auf den Publisher an
    fn abonnieren(
        &mut self,
        publisher: TeilnehmerId,
        ice_ufrag: String,
        ice_pwd: String,
        audio_ssrc: u32,
        video_ssrc: u32,
        schluessel: &str,
    ) -> SignalingResult<ServerNachricht> {
        let id = self.teilnehmer_id.ok_or(SignalingError::NichtBeigetreten)?;
        if !self.state.teilnehmer.contains(&publisher) {
            return Err(SignalingError::UnbekannterPublisher(publisher.to_string()));
        }

        let (link, relay_ufrag, relay_pwd, relay_schluessel, ssrcs) = self.link_bauen(
            LinkArt::Downlink,
            id,
            Some(publisher),
            ice_ufrag,
            ice_pwd,
            audio_ssrc,
            video_ssrc,
            schluessel,
        )?;

        self.state.relay.downlink_hinzufuegen(id, publisher, link)?;

        tracing::info!(
            peer = %self.peer_addr,
            abonnent = %id,
            publisher = %publisher,
            "Abonnement angelegt"
        );

        Ok(ServerNachricht::AboAntwort {
            publisher,
            ice_ufrag: relay_ufrag,
            ice_pwd: relay_pwd,
            schluessel: relay_schluessel,
            audio_ssrc: ssrcs.relay_audio,
            video_ssrc: ssrcs.relay_video,
            kandidat: self.state.kandidat(),
        })
    }

    fn abbestellen(&mut self, publisher: TeilnehmerId) -> SignalingResult<ServerNachricht> {
        let id = self.teilnehmer_id.ok_or(SignalingError::NichtBeigetreten)?;
        self.state.relay.downlink_entfernen(id, publisher)?;
        Ok(ServerNachricht::AboBeendet { publisher })
    }

    /// Baut einen Link samt frischer Relay-Haelfte
    ///
    /// Gibt neben dem Link die Werte zurueck, die der Client fuer
    /// seine Seite der Verbindung braucht: ufrag, Passwort, das
    /// Sende-Material des Relays und die Relay-SSRCs.
    #[allow(clippy::too_many_arguments)]
    fn link_bauen(
        &self,
        art: LinkArt,
        besitzer: TeilnehmerId,
        partner: Option<TeilnehmerId>,
        ice_ufrag: String,
        ice_pwd: String,
        audio_ssrc: u32,
        video_ssrc: u32,
        schluessel: &str,
    ) -> SignalingResult<(Link, String, String, String, LinkSsrcs)> {
        let eingehend = SrtpSchluessel::aus_base64(schluessel)?;
        let ausgehend = self.state.schluessel_erzeugen();

        let mut credentials = self.state.ice_erzeugen();
        credentials.setze_remote(ice_ufrag, ice_pwd)?;
        let relay_ufrag = credentials.lokaler_ufrag().to_string();
        let relay_pwd = credentials.lokales_passwort().to_string();

        let ssrcs = LinkSsrcs {
            peer_audio: audio_ssrc,
            peer_video: video_ssrc,
            relay_audio: self.state.neue_ssrc(),
            relay_video: self.state.neue_ssrc(),
        };

        let link = Link::neu(art, besitzer, partner, credentials, &eingehend, &ausgehend, ssrcs);
        Ok((link, relay_ufrag, relay_pwd, ausgehend.als_base64(), ssrcs))
    }

    // -----------------------------------------------------------------------
    // Aufraeumen
    // -----------------------------------------------------------------------

    /// Entfernt den Teilnehmer beim Trennen der Verbindung
    fn aufraeumen(&mut self) {
        let Some(id) = self.teilnehmer_id.take() else {
            return;
        };
        self.state.teilnehmer.remove(&id);
        if let Err(e) = self.state.relay.teilnehmer_entfernen(id) {
            tracing::warn!(teilnehmer = %id, fehler = %e, "Reaktor nicht erreichbar");
        }
    }
}
