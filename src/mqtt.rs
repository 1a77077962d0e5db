use crate::config::Config;
use crate::ingest::MeterIngestor;
use anyhow::Result;
use rumqttc::{AsyncClient, Event, Incoming, MqttOptions, QoS};
use tokio::sync::watch;
use tokio::time::{sleep, Duration};

/// Subscribes to the meter's telemetry topic and feeds every publish to the
/// ingestor. Connection loss tears the client down and reconnects after a
/// short sleep; the stop request is observed between messages and returns
/// cleanly without cutting off an in-flight dispatch.
pub async fn run_listener(
    config: Config,
    ingestor: MeterIngestor,
    mut shutdown_rx: watch::Receiver<bool>,
) -> Result<()> {
    loop {
        if *shutdown_rx.borrow() {
            return Ok(());
        }

        let mut mqttoptions = MqttOptions::new(
            config.mqtt_client_id.clone(),
            config.mqtt_host.clone(),
            config.mqtt_port,
        );
        mqttoptions.set_keep_alive(config.mqtt_keepalive());
        if let Some(username) = &config.mqtt_username {
            mqttoptions.set_credentials(
                username.clone(),
                config.mqtt_password.clone().unwrap_or_default(),
            );
        }

        let (client, mut eventloop) = AsyncClient::new(mqttoptions, 32);
        match client
            .subscribe(config.mqtt_topic.clone(), QoS::AtLeastOnce)
            .await
        {
            Ok(_) => {
                tracing::info!(topic = %config.mqtt_topic, "subscribed to meter feed");
            }
            Err(err) => {
                tracing::warn!(error = %err, "failed to subscribe to MQTT; retrying");
                sleep(Duration::from_secs(2)).await;
                continue;
            }
        }

        loop {
            tokio::select! {
                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        tracing::info!("stop requested; mqtt listener exiting");
                        return Ok(());
                    }
                }
                event = eventloop.poll() => match event {
                    Ok(Event::Incoming(Incoming::Publish(publish))) => {
                        let mut payload = publish.payload.to_vec();
                        if let Err(err) = ingestor.handle_payload(&mut payload) {
                            tracing::warn!(
                                error = %err,
                                topic = %publish.topic,
                                payload = %String::from_utf8_lossy(&publish.payload),
                                "failed to decode meter payload; dropping"
                            );
                        }
                    }
                    Ok(_) => {}
                    Err(err) => {
                        tracing::warn!(error = %err, "MQTT connection dropped; reconnecting");
                        break;
                    }
                }
            }
        }

        sleep(Duration::from_secs(1)).await;
    }
}
