//! Zenoh session for the split deployment
//!
//! `publish` and `serve` run as separate processes and meet through one
//! router. Both connect in client mode with discovery switched off, so the
//! configured endpoint is the only way in.

use crate::config::Config;
use std::sync::Arc;

/// Zenoh settings for a client connected to `endpoint` only
pub fn client_config(endpoint: &str) -> anyhow::Result<zenoh::Config> {
    let settings = [
        ("mode", r#""client""#.to_string()),
        ("connect/endpoints", format!(r#"["{}"]"#, endpoint)),
        ("scouting/multicast/enabled", "false".to_string()),
        ("scouting/gossip/enabled", "false".to_string()),
    ];

    let mut config = zenoh::Config::default();
    for (key, value) in &settings {
        config
            .insert_json5(key, value)
            .map_err(|e| anyhow::anyhow!("Invalid Zenoh setting {} = {}: {}", key, value, e))?;
    }
    Ok(config)
}

/// Open a session against the router named by `config.zenoh_endpoint`
pub async fn open_session(config: &Config) -> anyhow::Result<Arc<zenoh::Session>> {
    log::info!("Connecting to Zenoh at: {}", config.zenoh_endpoint);

    let session = zenoh::open(client_config(&config.zenoh_endpoint)?)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to open Zenoh session: {}", e))?;

    log::info!("Connected to Zenoh");
    Ok(Arc::new(session))
}
