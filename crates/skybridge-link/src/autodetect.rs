use anyhow::Result;
use tracing::{info, warn};
use std::time::Instant;

use crate::mav::FcLink;
use crate::LinkConfig;

#[derive(Debug, Clone)]
pub struct ProbeResult {
    pub dev: String,
    pub baud: u32,
    pub hb_seen: bool,
    pub elapsed_ms: u64,
    pub note: String,
}

#[derive(Debug, Clone)]
pub struct AutodetectResult {
    pub chosen: Option<(String, u32)>,
    pub probes: Vec<ProbeResult>,
}

pub fn default_candidate_devs() -> Vec<String> {
    vec![
        "/dev/serial0".into(),
        "/dev/ttyAMA0".into(),
        "/dev/ttyS0".into(),
        "/dev/ttyUSB0".into(),
        "/dev/ttyUSB1".into(),
        "/dev/ttyACM0".into(),
        "/dev/ttyACM1".into(),
    ]
}

pub fn default_candidate_bauds() -> Vec<u32> {
    vec![57600, 115200, 230400, 921600]
}

/// Tries every device/baud pair in order and stops at the first one that
/// delivers a heartbeat from the configured target system.
pub fn autodetect_fc(candidate_devs: Vec<String>, candidate_bauds: Vec<u32>, cfg: &LinkConfig) -> Result<AutodetectResult> {
    let mut probes = Vec::new();
    let timeout = cfg.heartbeat_timeout();

    for dev in candidate_devs {
        for baud in &candidate_bauds {
            let start = Instant::now();
            let (hb_seen, note) = match FcLink::open(&dev, *baud, cfg) {
                Ok(link) => {
                    if link.wait_heartbeat(timeout) {
                        (true, "heartbeat".to_string())
                    } else {
                        (false, "no heartbeat".to_string())
                    }
                }
                Err(e) => {
                    warn!("fc autodetect probe failed dev={} baud={} err={:#}", dev, baud, e);
                    (false, format!("open/connect failed: {:#}", e))
                }
            };

            probes.push(ProbeResult {
                dev: dev.clone(),
                baud: *baud,
                hb_seen,
                elapsed_ms: start.elapsed().as_millis() as u64,
                note,
            });

            if hb_seen {
                info!("fc autodetect: OK {} @ {}", dev, baud);
                return Ok(AutodetectResult { chosen: Some((dev, *baud)), probes });
            }
        }
    }

    Ok(AutodetectResult { chosen: None, probes })
}
