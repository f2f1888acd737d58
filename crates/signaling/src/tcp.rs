//! TCP-Listener – Bindet Socket, akzeptiert Verbindungen
//!
//! Der `SignalingServer` bindet einen TCP-Socket und startet fuer jede
//! eingehende Verbindung einen eigenen tokio-Task mit einer
//! [`ClientVerbindung`]. Der Relay-Zustand selbst wird nie direkt
//! angefasst, alle Aenderungen gehen ueber den Befehlskanal.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;

use crate::verbindung::ClientVerbindung;
use crate::zustand::SignalingState;

/// TCP-Signaling-Server
///
/// Bindet einen TCP-Socket und akzeptiert Verbindungen in einer Loop.
pub struct SignalingServer {
    state: Arc<SignalingState>,
    listener: TcpListener,
}

impl SignalingServer {
    /// Bindet den Listener, akzeptiert aber noch nichts
    pub async fn binden(
        state: Arc<SignalingState>,
        bind_addr: SocketAddr,
    ) -> std::io::Result<Self> {
        let listener = TcpListener::bind(bind_addr).await?;
        tracing::info!(adresse = %listener.local_addr()?, "TCP Signaling-Server gebunden");
        Ok(Self { state, listener })
    }

    /// Tatsaechlich gebundene Adresse, nuetzlich bei Port 0
    pub fn lokale_adresse(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Akzeptiert Verbindungen bis `shutdown_rx` ein `true` liefert
    pub async fn starten(
        self,
        mut shutdown_rx: tokio::sync::watch::Receiver<bool>,
    ) -> std::io::Result<()> {
        loop {
            tokio::select! {
                result = self.listener.accept() => {
                    match result {
                        Ok((stream, peer_addr)) => {
                            let verbindung =
                                ClientVerbindung::neu(Arc::clone(&self.state), peer_addr);
                            let verbindungs_shutdown = shutdown_rx.clone();
                            tokio::spawn(async move {
                                verbindung.verarbeiten(stream, verbindungs_shutdown).await;
                            });
                        }
                        Err(e) => {
                            tracing::warn!(fehler = %e, "Accept fehlgeschlagen");
                        }
                    }
                }
                geaendert = shutdown_rx.changed() => {
                    if geaendert.is_err() || *shutdown_rx.borrow() {
                        tracing::info!("Signaling-Server wird beendet");
                        return Ok(());
                    }
                }
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
    use crate::nachricht::{ClientNachricht, ServerNachricht};
    use futures::{SinkExt, StreamExt};
    use kaskade_core::types::{RaumId, TeilnehmerId};
    use kaskade_crypto::SrtpSchluessel;
    use kaskade_relay::{RelayConfig, RelayEngine};
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use tokio::net::TcpStream;
    use tokio_util::codec::{Framed, LinesCodec};

    async fn testumgebung() -> (SocketAddr, tokio::sync::watch::Sender<bool>) {
        let (engine, handle, _ereignisse) = RelayEngine::binden(
            RelayConfig::neu("127.0.0.1:0".parse().unwrap()),
            RaumId::new(),
        )
        .await
        .unwrap();
        let media_adresse = engine.lokale_adresse().unwrap();
        tokio::spawn(engine.laufen());

        let state = Arc::new(SignalingState::neu(handle, RaumId::new(), media_adresse));
        let server = SignalingServer::binden(state, "127.0.0.1:0".parse().unwrap())
            .await
            .unwrap();
        let adresse = server.lokale_adresse().unwrap();

        let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
        tokio::spawn(server.starten(shutdown_rx));

        (adresse, shutdown_tx)
    }

    async fn verbinden(adresse: SocketAddr) -> Framed<TcpStream, LinesCodec> {
        let stream = TcpStream::connect(adresse).await.unwrap();
        Framed::new(stream, LinesCodec::new())
    }

    async fn anfragen(
        framed: &mut Framed<TcpStream, LinesCodec>,
        nachricht: &ClientNachricht,
    ) -> ServerNachricht {
        framed.send(serde_json::to_string(nachricht).unwrap()).await.unwrap();
        let zeile = tokio::time::timeout(std::time::Duration::from_secs(2), framed.next())
            .await
            .expect("Timeout beim Warten auf die Antwort")
            .expect("Verbindung wurde geschlossen")
            .unwrap();
        serde_json::from_str(&zeile).unwrap()
    }

    fn auth_anfrage(rng: &mut StdRng, ufrag: &str) -> ClientNachricht {
        ClientNachricht::AuthAnfrage {
            ice_ufrag: ufrag.to_string(),
            ice_pwd: "clientpasswort1234567890".to_string(),
            audio_ssrc: 1111,
            video_ssrc: 2222,
            schluessel: SrtpSchluessel::zufaellig(rng).als_base64(),
        }
    }

    #[tokio::test]
    async fn beitritt_liefert_credentials_und_kandidat() {
        let (adresse, _shutdown) = testumgebung().await;
        let mut rng = StdRng::seed_from_u64(10);
        let mut client = verbinden(adresse).await;

        let antwort = anfragen(&mut client, &auth_anfrage(&mut rng, "clienteins")).await;
        match antwort {
            ServerNachricht::AuthAntwort { ice_ufrag, ice_pwd, schluessel, kandidat, .. } => {
                assert_eq!(ice_ufrag.len(), 16);
                assert_eq!(ice_pwd.len(), 24);
                assert!(SrtpSchluessel::aus_base64(&schluessel).is_ok());
                assert!(kandidat.starts_with("0 1 UDP 2113667327 "));
                assert!(kandidat.ends_with(" typ host"));
            }
            andere => panic!("unerwartete Antwort: {andere:?}"),
        }
    }

    #[tokio::test]
    async fn doppelter_beitritt_wird_abgelehnt() {
        let (adresse, _shutdown) = testumgebung().await;
        let mut rng = StdRng::seed_from_u64(11);
        let mut client = verbinden(adresse).await;

        let erste = anfragen(&mut client, &auth_anfrage(&mut rng, "clienteins")).await;
        assert!(matches!(erste, ServerNachricht::AuthAntwort { .. }));

        let zweite = anfragen(&mut client, &auth_anfrage(&mut rng, "clientzwei")).await;
        assert!(matches!(zweite, ServerNachricht::Fehler { .. }));
    }

    #[tokio::test]
    async fn abonnement_vor_beitritt_wird_abgelehnt() {
        let (adresse, _shutdown) = testumgebung().await;
        let mut rng = StdRng::seed_from_u64(12);
        let mut client = verbinden(adresse).await;

        let anfrage = ClientNachricht::Abonnieren {
            publisher: TeilnehmerId::new(),
            ice_ufrag: "clienteins".to_string(),
            ice_pwd: "clientpasswort1234567890".to_string(),
            audio_ssrc: 3333,
            video_ssrc: 4444,
            schluessel: SrtpSchluessel::zufaellig(&mut rng).als_base64(),
        };
        let antwort = anfragen(&mut client, &anfrage).await;
        match antwort {
            ServerNachricht::Fehler { grund } => {
                assert!(grund.contains("beigetreten"), "grund: {grund}");
            }
            andere => panic!("unerwartete Antwort: {andere:?}"),
        }
    }

    #[tokio::test]
    async fn abonnement_auf_unbekannten_publisher_wird_abgelehnt() {
        let (adresse, _shutdown) = testumgebung().await;
        let mut rng = StdRng::seed_from_u64(13);
        let mut client = verbinden(adresse).await;

        let beitritt = anfragen(&mut client, &auth_anfrage(&mut rng, "clienteins")).await;
        assert!(matches!(beitritt, ServerNachricht::AuthAntwort { .. }));

        let anfrage = ClientNachricht::Abonnieren {
            publisher: TeilnehmerId::new(),
            ice_ufrag: "clientzwei".to_string(),
            ice_pwd: "clientpasswort1234567890".to_string(),
            audio_ssrc: 3333,
            video_ssrc: 4444,
            schluessel: SrtpSchluessel::zufaellig(&mut rng).als_base64(),
        };
        let antwort = anfragen(&mut client, &anfrage).await;
        match antwort {
            ServerNachricht::Fehler { grund } => {
                assert!(grund.contains("Publisher"), "grund: {grund}");
            }
            andere => panic!("unerwartete Antwort: {andere:?}"),
        }
    }

    #[tokio::test]
    async fn abonnement_und_abbestellung() {
        let (adresse, _shutdown) = testumgebung().await;
        let mut rng = StdRng::seed_from_u64(14);

        let mut publisher = verbinden(adresse).await;
        let beitritt = anfragen(&mut publisher, &auth_anfrage(&mut rng, "publisher1234567")).await;
        let publisher_id = match beitritt {
            ServerNachricht::AuthAntwort { teilnehmer_id, .. } => teilnehmer_id,
            andere => panic!("unerwartete Antwort: {andere:?}"),
        };

        let mut abonnent = verbinden(adresse).await;
        let beitritt = anfragen(&mut abonnent, &auth_anfrage(&mut rng, "abonnent12345678")).await;
        assert!(matches!(beitritt, ServerNachricht::AuthAntwort { .. }));

        let abo = ClientNachricht::Abonnieren {
            publisher: publisher_id,
            ice_ufrag: "abodownlink12345".to_string(),
            ice_pwd: "clientpasswort1234567890".to_string(),
            audio_ssrc: 3333,
            video_ssrc: 4444,
            schluessel: SrtpSchluessel::zufaellig(&mut rng).als_base64(),
        };
        let antwort = anfragen(&mut abonnent, &abo).await;
        match antwort {
            ServerNachricht::AboAntwort { publisher, audio_ssrc, video_ssrc, .. } => {
                assert_eq!(publisher, publisher_id);
                assert_ne!(audio_ssrc, video_ssrc);
            }
            andere => panic!("unerwartete Antwort: {andere:?}"),
        }

        let antwort =
            anfragen(&mut abonnent, &ClientNachricht::Abbestellen { publisher: publisher_id })
                .await;
        match antwort {
            ServerNachricht::AboBeendet { publisher } => assert_eq!(publisher, publisher_id),
            andere => panic!("unerwartete Antwort: {andere:?}"),
        }
    }

    #[tokio::test]
    async fn unlesbares_json_liefert_fehler() {
        let (adresse, _shutdown) = testumgebung().await;
        let mut client = verbinden(adresse).await;

        client.send("kein json".to_string()).await.unwrap();
        let zeile = tokio::time::timeout(std::time::Duration::from_secs(2), client.next())
            .await
            .expect("Timeout beim Warten auf die Antwort")
            .expect("Verbindung wurde geschlossen")
            .unwrap();
        let antwort: ServerNachricht = serde_json::from_str(&zeile).unwrap();
        assert!(matches!(antwort, ServerNachricht::Fehler { .. }));
    }
}
