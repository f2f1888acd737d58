//! kaskade-server – Bibliotheks-Root
//!
//! Verdrahtet Reaktor und Signalisierung und stellt den
//! Einstiegspunkt fuer Integrationstests bereit.

pub mod config;

use std::sync::Arc;

use anyhow::{Context, Result};
use kaskade_core::types::RaumId;
use kaskade_core::RelayEvent;
use kaskade_relay::{RelayConfig, RelayEngine};
use kaskade_signaling::{SignalingServer, SignalingState};
use tokio::sync::{mpsc, watch};

use config::ServerConfig;

/// Haelt den laufenden Server-Zustand zusammen
pub struct Server {
    pub config: ServerConfig,
}

impl Server {
    pub fn neu(config: ServerConfig) -> Self {
        Self { config }
    }

    /// Startet Reaktor und Signalisierung und laeuft bis zum Shutdown
    ///
    /// Reihenfolge:
    /// 1. UDP-Media-Socket binden, Reaktor starten
    /// 2. TCP-Signalisierung binden und starten
    /// 3. Relay-Ereignisse ins Log abfliessen lassen
    /// 4. Auf Ctrl-C warten, dann beide Schichten stoppen
    pub async fn starten(self) -> Result<()> {
        let media_adresse = self
            .config
            .media_bind_adresse()
            .parse()
            .context("Media-Bind-Adresse unlesbar")?;
        let raum_id = RaumId::new();

        let (engine, handle, ereignisse) =
            RelayEngine::binden(RelayConfig::neu(media_adresse), raum_id)
                .await
                .context("Media-Socket nicht bindbar")?;
        let gebunden = engine.lokale_adresse()?;
        let kandidat_adresse = self.config.kandidaten_adresse(gebunden)?;
        let reaktor = tokio::spawn(engine.laufen());

        let state = Arc::new(SignalingState::neu(handle.clone(), raum_id, kandidat_adresse));
        let signaling_adresse = self
            .config
            .signaling_bind_adresse()
            .parse()
            .context("Signaling-Bind-Adresse unlesbar")?;
        let signaling = SignalingServer::binden(state, signaling_adresse)
            .await
            .context("Signaling-Socket nicht bindbar")?;

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let signaling_task = tokio::spawn(signaling.starten(shutdown_rx));
        let ereignis_task = tokio::spawn(ereignisse_abfliessen(ereignisse));

        tracing::info!(
            server_name = %self.config.server.name,
            raum = %raum_id,
            media = %gebunden,
            kandidat = %kandidat_adresse,
            signaling = %signaling_adresse,
            "Server laeuft. Warte auf Shutdown-Signal (Ctrl-C)..."
        );

        tokio::signal::ctrl_c().await?;
        tracing::info!("Shutdown-Signal empfangen, Server wird beendet");

        // Signalisierung zuerst stoppen, dann den Reaktor
        let _ = shutdown_tx.send(true);
        if let Err(e) = handle.beenden() {
            tracing::warn!(fehler = %e, "Reaktor war bereits beendet");
        }

        reaktor.await.context("Reaktor-Task abgestuerzt")?;
        signaling_task
            .await
            .context("Signaling-Task abgestuerzt")?
            .context("Signaling-Server-Fehler")?;
        ereignis_task.await.context("Ereignis-Task abgestuerzt")?;

        Ok(())
    }
}

/// Loggt alle Relay-Ereignisse bis der Kanal schliesst
async fn ereignisse_abfliessen(mut ereignisse: mpsc::UnboundedReceiver<RelayEvent>) {
    while let Some(ereignis) = ereignisse.recv().await {
        match serde_json::to_string(&ereignis) {
            Ok(json) => tracing::info!(ereignis = %json, "Relay-Ereignis"),
            Err(e) => tracing::warn!(fehler = %e, "Ereignis nicht serialisierbar"),
        }
    }
}
