use anyhow::Result;
use skybridge_link::{is_supported_rate, SUPPORTED_RATES_HZ};

use crate::config::TelemetryConfig;

pub fn check_rates(cfg: &TelemetryConfig) -> Result<()> {
    anyhow::ensure!(
        is_supported_rate(cfg.active_hz()),
        "telemetry.active_hz must be one of {:?}",
        SUPPORTED_RATES_HZ
    );
    anyhow::ensure!(
        is_supported_rate(cfg.velocity_hz()),
        "telemetry.velocity_hz must be one of {:?}",
        SUPPORTED_RATES_HZ
    );
    Ok(())
}

pub fn check_endpoint(endpoint: &str) -> Result<()> {
    let ok = ["ipc://", "tcp://", "inproc://"].iter().any(|p| endpoint.starts_with(p));
    anyhow::ensure!(ok, "transport.endpoint must be ipc://, tcp:// or inproc://: {}", endpoint);
    if let Some(path) = endpoint.strip_prefix("ipc://") {
        anyhow::ensure!(path.starts_with('/'), "ipc endpoint should be an absolute path: {}", endpoint);
    }
    Ok(())
}
