use anyhow::{anyhow, Context, Result};
use dotenvy::dotenv;
use std::env;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Config {
    pub mqtt_host: String,
    pub mqtt_port: u16,
    pub mqtt_username: Option<String>,
    pub mqtt_password: Option<String>,
    pub mqtt_topic: String,
    pub mqtt_client_id: String,
    pub mqtt_keepalive_secs: u64,

    pub output_dir: PathBuf,
    pub flush_interval_secs: u64,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenv().ok();

        let mqtt_host = env_string("METER_MQTT_HOST", Some("127.0.0.1".to_string()))?;
        let mqtt_port = env_u64("METER_MQTT_PORT", Some(1883))? as u16;
        let mqtt_username = env_optional("METER_MQTT_USERNAME");
        let mqtt_password = env_optional("METER_MQTT_PASSWORD");
        let mqtt_topic = env_string(
            "METER_MQTT_TOPIC",
            Some("tele/tasmota_EB7D9F/SENSOR".to_string()),
        )?;
        let mqtt_client_id = env_string(
            "METER_MQTT_CLIENT_ID",
            Some(format!("meter-ingest-{}", std::process::id())),
        )?;
        let mqtt_keepalive_secs = env_u64("METER_MQTT_KEEPALIVE_SECS", Some(30))?;

        let output_dir = PathBuf::from(env_string("METER_OUTPUT_DIR", Some(".".to_string()))?);
        let flush_interval_secs = env_u64("METER_FLUSH_INTERVAL_SECS", Some(60))?;
        if flush_interval_secs == 0 {
            return Err(anyhow!("METER_FLUSH_INTERVAL_SECS must be positive"));
        }

        Ok(Self {
            mqtt_host,
            mqtt_port,
            mqtt_username,
            mqtt_password,
            mqtt_topic,
            mqtt_client_id,
            mqtt_keepalive_secs,
            output_dir,
            flush_interval_secs,
        })
    }

    pub fn flush_interval(&self) -> Duration {
        Duration::from_secs(self.flush_interval_secs)
    }

    pub fn mqtt_keepalive(&self) -> Duration {
        Duration::from_secs(self.mqtt_keepalive_secs)
    }

    /// Summary output file for the day `stamp` (`YYYYMMDD`).
    pub fn summary_path(&self, stamp: &str) -> PathBuf {
        self.output_dir.join(format!("summary_{stamp}.csv"))
    }

    /// Aggregate output file for the day `stamp` (`YYYYMMDD`).
    pub fn aggregate_path(&self, stamp: &str) -> PathBuf {
        self.output_dir.join(format!("aggregate_{stamp}.csv"))
    }
}

fn env_string(key: &str, default: Option<String>) -> Result<String> {
    match env::var(key) {
        Ok(value) => Ok(value.trim().to_string()),
        Err(_) => default.ok_or_else(|| anyhow!("missing env var {key}")),
    }
}

fn env_u64(key: &str, default: Option<u64>) -> Result<u64> {
    match env::var(key) {
        Ok(value) => value
            .trim()
            .parse::<u64>()
            .with_context(|| format!("invalid {key}")),
        Err(_) => default.ok_or_else(|| anyhow!("missing env var {key}")),
    }
}

fn env_optional(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
